//! Background Tasks Module
//!
//! Periodic work started alongside the caches and stopped by
//! `CacheManager::shutdown`.
//!
//! # Tasks
//! - TTL Sweep: removes expired entries from every managed cache
//! - Memory Pressure: sheds or flushes caches when memory runs high
//! - Time-Based Invalidation: applies `time_based` rules on a timer

mod cleanup;
mod invalidation;
mod pressure;

pub use cleanup::spawn_cleanup_task;
pub use invalidation::spawn_time_based_task;
pub use pressure::spawn_pressure_task;
