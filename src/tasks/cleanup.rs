//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from every
//! cache the manager knows about.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheManager;

/// Spawns a background task that sweeps expired entries out of every managed cache.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. Caches registered after the task starts are picked up on
/// the next sweep.
///
/// # Arguments
/// * `manager` - Shared cache manager
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task. Hand it to
/// [`CacheManager::track_task`] so `shutdown` can stop it.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(manager.clone(), 60);
/// manager.track_task(handle);
/// ```
pub fn spawn_cleanup_task(manager: Arc<CacheManager>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting TTL sweep task with interval of {} seconds",
            sweep_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let mut removed = 0;
            for cache in manager.caches() {
                let expired = cache.cleanup_expired().await;
                if expired > 0 {
                    debug!(cache = cache.name(), expired, "Swept expired entries");
                }
                removed += expired;
            }

            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::stats::StatsCollector;

    fn manager() -> Arc<CacheManager> {
        Arc::new(CacheManager::new(Arc::new(StatsCollector::new())))
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let manager = manager();
        let cache = manager
            .create_cache::<String>("entity-lookup", CacheConfig::new(true, 300, 100))
            .unwrap();
        cache
            .set_with_ttl("node:soon", "value".to_string(), Duration::from_millis(200))
            .await;

        let handle = spawn_cleanup_task(manager.clone(), 1);

        // Wait for entry to expire and the sweep to run
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.len().await, 0, "Expired entry should have been swept");
        assert_eq!(cache.stats().expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let manager = manager();
        let cache = manager
            .create_cache::<String>("search-results", CacheConfig::new(true, 3600, 100))
            .unwrap();
        cache.set("search:rust", "value".to_string()).await;

        let handle = spawn_cleanup_task(manager.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("search:rust").await.as_deref(), Some("value"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_stopped_by_shutdown() {
        let manager = manager();
        manager.track_task(spawn_cleanup_task(manager.clone(), 1));
        assert_eq!(manager.running_tasks(), 1);

        assert_eq!(Arc::strong_count(&manager), 2);

        manager.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.running_tasks(), 0);
        assert_eq!(Arc::strong_count(&manager), 1, "aborted task releases the manager");
    }
}
