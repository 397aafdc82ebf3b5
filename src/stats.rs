//! Statistics Collector Module
//!
//! Process-wide hit/miss/eviction counters per named cache, timing samples
//! for pooled operations, and pool occupancy gauges.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of a single cache's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted by capacity or memory pressure
    pub evictions: u64,
    /// Number of entries removed because their TTL elapsed
    pub expirations: u64,
    /// Number of entries removed by invalidation rules or explicit clears
    pub invalidations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of lookups served.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

// == Cache Counters ==
/// Live counters for one cache. Shared between the cache and the collector.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
    entries: AtomicUsize,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: usize) {
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Updates the entry gauge.
    pub fn set_entries(&self, count: usize) {
        self.entries.store(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            total_entries: self.entries.load(Ordering::Relaxed),
        }
    }
}

// == Timing ==
/// Accumulated timing samples for one operation name.
#[derive(Debug, Default)]
struct TimingCounters {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
    slow: AtomicU64,
}

/// Snapshot of the timing samples for one operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TimingStats {
    pub count: u64,
    pub total_micros: u64,
    pub max_micros: u64,
    pub slow_count: u64,
}

impl TimingStats {
    /// Mean duration in milliseconds, 0.0 when nothing was recorded.
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_micros as f64 / self.count as f64 / 1000.0
        }
    }
}

// == Pool Gauges ==
/// Occupancy gauges published by a connection pool.
#[derive(Debug, Default)]
pub struct PoolGauges {
    max_size: AtomicUsize,
    created: AtomicUsize,
    in_use: AtomicUsize,
    available: AtomicUsize,
}

impl PoolGauges {
    pub fn set(&self, max_size: usize, in_use: usize, available: usize) {
        self.max_size.store(max_size, Ordering::Relaxed);
        self.in_use.store(in_use, Ordering::Relaxed);
        self.available.store(available, Ordering::Relaxed);
        self.created.store(in_use + available, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolStatus {
        PoolStatus {
            max_size: self.max_size.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            available: self.available.load(Ordering::Relaxed),
        }
    }
}

/// Pool occupancy as seen by health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub created: usize,
    pub in_use: usize,
    pub available: usize,
}

// == Stats Snapshot ==
/// Everything the collector knows, ready for serialization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub caches: Vec<NamedCacheStats>,
    pub operations: Vec<NamedTimingStats>,
    pub pools: Vec<NamedPoolStatus>,
    pub overall_hit_rate: f64,
    pub slow_operations: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedCacheStats {
    pub name: String,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedTimingStats {
    pub operation: String,
    #[serde(flatten)]
    pub timing: TimingStats,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedPoolStatus {
    pub name: String,
    #[serde(flatten)]
    pub status: PoolStatus,
}

// == Stats Collector ==
/// Process-wide registry of counters. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct StatsCollector {
    caches: DashMap<String, Arc<CacheCounters>>,
    timings: DashMap<String, TimingCounters>,
    pools: DashMap<String, Arc<PoolGauges>>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counters for `name`, creating them on first use.
    pub fn cache_counters(&self, name: &str) -> Arc<CacheCounters> {
        self.caches
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Returns the gauges for pool `name`, creating them on first use.
    pub fn pool_gauges(&self, name: &str) -> Arc<PoolGauges> {
        self.pools
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    // == Record Timing ==
    /// Adds one timing sample for `operation`.
    pub fn record_timing(&self, operation: &str, elapsed: Duration, slow: bool) {
        let micros = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let entry = self.timings.entry(operation.to_string()).or_default();
        let timing = entry.value();
        timing.count.fetch_add(1, Ordering::Relaxed);
        timing.total_micros.fetch_add(micros, Ordering::Relaxed);
        timing.max_micros.fetch_max(micros, Ordering::Relaxed);
        if slow {
            timing.slow.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Stats for a single cache, if registered.
    pub fn cache_stats(&self, name: &str) -> Option<CacheStats> {
        self.caches.get(name).map(|c| c.snapshot())
    }

    /// Timing samples for a single operation, if any were recorded.
    pub fn timing(&self, operation: &str) -> Option<TimingStats> {
        self.timings.get(operation).map(|t| snapshot_timing(t.value()))
    }

    /// Sum of slow operations across every recorded operation.
    pub fn slow_operations(&self) -> u64 {
        self.timings
            .iter()
            .map(|t| t.value().slow.load(Ordering::Relaxed))
            .sum()
    }

    /// Hit rate aggregated over every registered cache.
    pub fn overall_hit_rate(&self) -> f64 {
        let (hits, misses) = self.caches.iter().fold((0u64, 0u64), |acc, c| {
            let s = c.value().snapshot();
            (acc.0 + s.hits, acc.1 + s.misses)
        });
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut caches: Vec<NamedCacheStats> = self
            .caches
            .iter()
            .map(|c| {
                let stats = c.value().snapshot();
                NamedCacheStats {
                    name: c.key().clone(),
                    hit_rate: stats.hit_rate(),
                    stats,
                }
            })
            .collect();
        caches.sort_by(|a, b| a.name.cmp(&b.name));

        let mut operations: Vec<NamedTimingStats> = self
            .timings
            .iter()
            .map(|t| {
                let timing = snapshot_timing(t.value());
                NamedTimingStats {
                    operation: t.key().clone(),
                    mean_ms: timing.mean_ms(),
                    timing,
                }
            })
            .collect();
        operations.sort_by(|a, b| a.operation.cmp(&b.operation));

        let mut pools: Vec<NamedPoolStatus> = self
            .pools
            .iter()
            .map(|p| NamedPoolStatus {
                name: p.key().clone(),
                status: p.value().snapshot(),
            })
            .collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));

        StatsSnapshot {
            slow_operations: operations.iter().map(|o| o.timing.slow_count).sum(),
            overall_hit_rate: self.overall_hit_rate(),
            caches,
            operations,
            pools,
        }
    }
}

fn snapshot_timing(t: &TimingCounters) -> TimingStats {
    TimingStats {
        count: t.count.load(Ordering::Relaxed),
        total_micros: t.total_micros.load(Ordering::Relaxed),
        max_micros: t.max_micros.load(Ordering::Relaxed),
        slow_count: t.slow.load(Ordering::Relaxed),
    }
}
