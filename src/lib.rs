//! Catalog Cache - in-process caching for a catalog service
//!
//! TTL + LRU caches managed by name, rule-driven invalidation on catalog
//! changes, memory pressure shedding and an instrumented connection pool.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod pool;
pub mod pressure;
pub mod stats;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheManager, ManagedCache};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use invalidation::{ChangeObserver, InvalidationEngine};
pub use pool::{ConnectionPool, PoolConfig};
pub use pressure::MemoryPressureMonitor;
pub use stats::StatsCollector;
pub use tasks::{spawn_cleanup_task, spawn_pressure_task, spawn_time_based_task};
