//! Cache Health Reporting
//!
//! Coarse per-cache footprint and hit rate, sync freshness and tuning hints
//! for operational tooling.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::invalidation::engine::{EventStats, InvalidationEngine};
use crate::invalidation::rule::SyncSummary;
use crate::stats::NamedPoolStatus;

/// Flat per-entry size estimate. Values are opaque, so this is only a signal.
pub const ESTIMATED_ENTRY_BYTES: usize = 1024;
/// Hit rates below this are flagged once enough lookups were made
pub const LOW_HIT_RATE: f64 = 0.5;
pub const MIN_LOOKUPS_FOR_HIT_RATE: u64 = 20;
/// Estimated footprints above this are flagged
pub const LARGE_FOOTPRINT_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub name: String,
    pub enabled: bool,
    pub entries: usize,
    pub max_entries: usize,
    pub estimated_memory_bytes: usize,
    pub hit_rate: f64,
    pub lookups: u64,
    pub evictions: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub generated_at: DateTime<Utc>,
    pub caches: Vec<CacheHealth>,
    pub total_entries: usize,
    pub estimated_memory_bytes: usize,
    pub overall_hit_rate: f64,
    pub pools: Vec<NamedPoolStatus>,
    pub slow_operations: u64,
    pub auto_invalidation: bool,
    pub last_bulk_sync: Option<DateTime<Utc>>,
    pub last_sync_summary: Option<SyncSummary>,
    pub events: EventStats,
    pub recommendations: Vec<String>,
    pub warnings: Vec<String>,
}

impl InvalidationEngine {
    // == Health Report ==
    pub async fn health_report(&self) -> HealthReport {
        let mut caches = Vec::new();
        for cache in self.manager().caches() {
            let stats = cache.stats();
            let config = *cache.config();
            let entries = cache.len().await;
            caches.push(CacheHealth {
                name: cache.name().to_string(),
                enabled: config.enabled,
                entries,
                max_entries: config.max_entries,
                estimated_memory_bytes: entries * ESTIMATED_ENTRY_BYTES,
                hit_rate: stats.hit_rate(),
                lookups: stats.lookups(),
                evictions: stats.evictions,
            });
        }

        let sync = *self.sync.read().await;
        let now = Utc::now();
        let recommendations = recommendations(&caches);
        let warnings = sync_warnings(sync.last_bulk_sync, now, self.staleness);
        let collector = self.manager().stats().snapshot();

        HealthReport {
            status: if warnings.is_empty() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            generated_at: now,
            total_entries: caches.iter().map(|c| c.entries).sum(),
            estimated_memory_bytes: caches.iter().map(|c| c.estimated_memory_bytes).sum(),
            overall_hit_rate: collector.overall_hit_rate,
            pools: collector.pools,
            slow_operations: collector.slow_operations,
            auto_invalidation: self.auto_invalidation(),
            last_bulk_sync: sync.last_bulk_sync,
            last_sync_summary: sync.last_summary,
            events: self.event_stats(),
            caches,
            recommendations,
            warnings,
        }
    }
}

/// Tuning hints derived from per-cache numbers.
pub(crate) fn recommendations(caches: &[CacheHealth]) -> Vec<String> {
    let mut hints = Vec::new();
    for cache in caches.iter().filter(|c| c.enabled) {
        if cache.lookups >= MIN_LOOKUPS_FOR_HIT_RATE && cache.hit_rate < LOW_HIT_RATE {
            hints.push(format!(
                "Cache '{}' hit rate is {:.1}%: consider a longer TTL or warming frequently read keys",
                cache.name,
                cache.hit_rate * 100.0
            ));
        }
        if cache.estimated_memory_bytes > LARGE_FOOTPRINT_BYTES {
            hints.push(format!(
                "Cache '{}' holds about {} MiB: consider lowering its max entries",
                cache.name,
                cache.estimated_memory_bytes / (1024 * 1024)
            ));
        }
        if cache.entries >= cache.max_entries && cache.evictions > 0 {
            hints.push(format!(
                "Cache '{}' is at capacity and evicting: consider raising its max entries",
                cache.name
            ));
        }
    }
    hints
}

pub(crate) fn sync_warnings(
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    staleness: chrono::Duration,
) -> Vec<String> {
    match last_sync {
        None => vec!["No catalog bulk sync has been observed".to_string()],
        Some(at) if now - at > staleness => vec![format!(
            "Last catalog bulk sync was {} hours ago; cached data may be stale",
            (now - at).num_hours()
        )],
        Some(_) => Vec::new(),
    }
}
