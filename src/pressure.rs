//! Memory Pressure Module
//!
//! Samples process memory usage and sheds cache entries when usage crosses
//! the configured thresholds.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::cache::CacheManager;
use crate::error::{CacheError, Result};

// == Pressure Policy ==
/// Thresholds for the proactive shed and the emergency flush.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressurePolicy {
    /// Above this ratio the oldest entries are shed
    pub soft_ratio: f64,
    /// Above this ratio every cache is cleared
    pub critical_ratio: f64,
    /// Share of each cache, in percent, shed under soft pressure
    pub shed_percent: u8,
}

impl Default for PressurePolicy {
    fn default() -> Self {
        Self {
            soft_ratio: 0.80,
            critical_ratio: 0.90,
            shed_percent: 30,
        }
    }
}

impl PressurePolicy {
    pub fn validate(&self) -> Result<()> {
        let in_range = |r: f64| r > 0.0 && r <= 1.0;
        if !in_range(self.soft_ratio) || !in_range(self.critical_ratio) {
            return Err(CacheError::Configuration(
                "pressure ratios must be within (0, 1]".to_string(),
            ));
        }
        if self.soft_ratio >= self.critical_ratio {
            return Err(CacheError::Configuration(format!(
                "soft pressure ratio {} must be below critical ratio {}",
                self.soft_ratio, self.critical_ratio
            )));
        }
        if self.shed_percent == 0 || self.shed_percent > 100 {
            return Err(CacheError::Configuration(
                "shed percent must be within 1..=100".to_string(),
            ));
        }
        Ok(())
    }

    pub fn level(&self, ratio: f64) -> PressureLevel {
        if ratio > self.critical_ratio {
            PressureLevel::Critical
        } else if ratio > self.soft_ratio {
            PressureLevel::Soft
        } else {
            PressureLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Normal,
    Soft,
    Critical,
}

// == Memory Probe ==
/// One memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl MemoryUsage {
    pub fn ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.total_bytes as f64
        }
    }
}

/// Source of memory samples.
pub trait MemoryProbe: Send + Sync {
    /// Returns `None` when usage cannot be determined.
    fn sample(&self) -> Option<MemoryUsage>;
}

/// Reads the resident set size from `/proc/self/status` and compares it to a
/// budget, or to `MemTotal` from `/proc/meminfo` when no budget is set.
#[derive(Debug, Clone, Default)]
pub struct ProcessMemoryProbe {
    budget_bytes: Option<u64>,
}

impl ProcessMemoryProbe {
    pub fn new(budget_mb: u64) -> Self {
        Self {
            budget_bytes: (budget_mb > 0).then(|| budget_mb * 1024 * 1024),
        }
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn sample(&self) -> Option<MemoryUsage> {
        let status = fs::read_to_string("/proc/self/status").ok()?;
        let used_bytes = parse_kb_field(&status, "VmRSS:")? * 1024;

        let total_bytes = match self.budget_bytes {
            Some(budget) => budget,
            None => {
                let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
                parse_kb_field(&meminfo, "MemTotal:")? * 1024
            }
        };

        Some(MemoryUsage {
            used_bytes,
            total_bytes,
        })
    }
}

/// Extracts a `Name:   1234 kB` value.
fn parse_kb_field(text: &str, field: &str) -> Option<u64> {
    text.lines()
        .find(|line| line.starts_with(field))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

/// Probe reporting a settable ratio. Used by tests and operational drills.
#[derive(Debug, Default)]
pub struct FixedMemoryProbe {
    ratio_bits: AtomicU64,
}

impl FixedMemoryProbe {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio_bits: AtomicU64::new(ratio.to_bits()),
        }
    }

    pub fn set_ratio(&self, ratio: f64) {
        self.ratio_bits.store(ratio.to_bits(), Ordering::Relaxed);
    }
}

impl MemoryProbe for FixedMemoryProbe {
    fn sample(&self) -> Option<MemoryUsage> {
        let ratio = f64::from_bits(self.ratio_bits.load(Ordering::Relaxed));
        let total_bytes = 1_000_000;
        Some(MemoryUsage {
            used_bytes: (ratio.clamp(0.0, 1.0) * total_bytes as f64).round() as u64,
            total_bytes,
        })
    }
}

// == Pressure Monitor ==
/// Outcome of a single pressure check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureCheck {
    pub ratio: f64,
    pub level: PressureLevel,
    pub entries_removed: usize,
}

pub struct MemoryPressureMonitor {
    manager: Arc<CacheManager>,
    probe: Arc<dyn MemoryProbe>,
    policy: PressurePolicy,
}

impl MemoryPressureMonitor {
    pub fn new(manager: Arc<CacheManager>, probe: Arc<dyn MemoryProbe>, policy: PressurePolicy) -> Self {
        Self {
            manager,
            probe,
            policy,
        }
    }

    pub fn policy(&self) -> &PressurePolicy {
        &self.policy
    }

    // == Check ==
    /// Samples memory once and sheds or flushes the managed caches as needed.
    ///
    /// Returns `None` when the probe could not produce a sample.
    pub async fn check(&self) -> Option<PressureCheck> {
        let Some(usage) = self.probe.sample() else {
            debug!("Memory sample unavailable, skipping pressure check");
            return None;
        };

        let ratio = usage.ratio();
        let level = self.policy.level(ratio);
        let entries_removed = self.respond(level).await;

        match level {
            PressureLevel::Critical => error!(
                ratio,
                entries_removed, "Critical memory pressure: caches flushed"
            ),
            PressureLevel::Soft => warn!(
                ratio,
                entries_removed,
                shed_percent = self.policy.shed_percent,
                "Memory pressure: shed oldest cache entries"
            ),
            PressureLevel::Normal => debug!(ratio, "Memory pressure normal"),
        }

        Some(PressureCheck {
            ratio,
            level,
            entries_removed,
        })
    }

    async fn respond(&self, level: PressureLevel) -> usize {
        let mut removed = 0;
        for cache in self.manager.caches() {
            removed += match level {
                PressureLevel::Normal => 0,
                PressureLevel::Soft => cache.shed_oldest(self.policy.shed_percent).await,
                PressureLevel::Critical => cache.clear().await,
            };
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::stats::StatsCollector;

    async fn monitor_with_entries(count: usize) -> (MemoryPressureMonitor, Arc<FixedMemoryProbe>, Arc<CacheManager>) {
        let manager = Arc::new(CacheManager::new(Arc::new(StatsCollector::new())));
        let cache = manager
            .create_cache::<usize>("entity-lookup", CacheConfig::new(true, 300, 1000))
            .unwrap();
        for i in 0..count {
            cache.set(format!("node:{}", i), i).await;
        }

        let probe = Arc::new(FixedMemoryProbe::new(0.5));
        let monitor = MemoryPressureMonitor::new(manager.clone(), probe.clone(), PressurePolicy::default());
        (monitor, probe, manager)
    }

    #[test]
    fn test_policy_levels() {
        let policy = PressurePolicy::default();
        assert_eq!(policy.level(0.5), PressureLevel::Normal);
        assert_eq!(policy.level(0.80), PressureLevel::Normal);
        assert_eq!(policy.level(0.85), PressureLevel::Soft);
        assert_eq!(policy.level(0.90), PressureLevel::Soft);
        assert_eq!(policy.level(0.95), PressureLevel::Critical);
    }

    #[test]
    fn test_policy_validation() {
        assert!(PressurePolicy::default().validate().is_ok());
        let inverted = PressurePolicy {
            soft_ratio: 0.9,
            critical_ratio: 0.8,
            shed_percent: 30,
        };
        assert!(inverted.validate().is_err());
        let no_shed = PressurePolicy {
            shed_percent: 0,
            ..PressurePolicy::default()
        };
        assert!(no_shed.validate().is_err());
    }

    #[test]
    fn test_parse_kb_field() {
        let status = "Name:\tcatalog\nVmRSS:\t  20480 kB\nThreads:\t4\n";
        assert_eq!(parse_kb_field(status, "VmRSS:"), Some(20480));
        assert_eq!(parse_kb_field(status, "VmSwap:"), None);
    }

    #[test]
    fn test_fixed_probe_ratio() {
        let probe = FixedMemoryProbe::new(0.85);
        let ratio = probe.sample().unwrap().ratio();
        assert!((ratio - 0.85).abs() < 1e-9);
        probe.set_ratio(0.2);
        assert!((probe.sample().unwrap().ratio() - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_normal_pressure_keeps_entries() {
        let (monitor, _probe, manager) = monitor_with_entries(100).await;
        let check = monitor.check().await.unwrap();

        assert_eq!(check.level, PressureLevel::Normal);
        assert_eq!(check.entries_removed, 0);
        assert_eq!(manager.get("entity-lookup").unwrap().len().await, 100);
    }

    #[tokio::test]
    async fn test_soft_pressure_sheds_oldest_thirty_percent() {
        let (monitor, probe, manager) = monitor_with_entries(100).await;
        probe.set_ratio(0.85);

        let check = monitor.check().await.unwrap();

        assert_eq!(check.level, PressureLevel::Soft);
        assert_eq!(check.entries_removed, 30);
        let cache = manager.get("entity-lookup").unwrap();
        assert_eq!(cache.len().await, 70);
        assert_eq!(cache.stats().evictions, 30);
    }

    #[tokio::test]
    async fn test_critical_pressure_clears_everything() {
        let (monitor, probe, manager) = monitor_with_entries(100).await;
        probe.set_ratio(0.95);

        let check = monitor.check().await.unwrap();

        assert_eq!(check.level, PressureLevel::Critical);
        assert_eq!(check.entries_removed, 100);
        assert_eq!(manager.get("entity-lookup").unwrap().len().await, 0);
    }

    #[tokio::test]
    async fn test_unavailable_sample_skips_check() {
        struct Blind;
        impl MemoryProbe for Blind {
            fn sample(&self) -> Option<MemoryUsage> {
                None
            }
        }

        let manager = Arc::new(CacheManager::new(Arc::new(StatsCollector::new())));
        let monitor = MemoryPressureMonitor::new(manager, Arc::new(Blind), PressurePolicy::default());
        assert!(monitor.check().await.is_none());
    }
}
