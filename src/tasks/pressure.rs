//! Memory Pressure Task
//!
//! Runs the pressure monitor on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::pressure::MemoryPressureMonitor;

/// Spawns a background task that calls [`MemoryPressureMonitor::check`]
/// every `check_interval_secs` seconds.
pub fn spawn_pressure_task(
    monitor: Arc<MemoryPressureMonitor>,
    check_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(check_interval_secs);

    tokio::spawn(async move {
        info!(
            soft_ratio = monitor.policy().soft_ratio,
            critical_ratio = monitor.policy().critical_ratio,
            "Starting memory pressure task with interval of {} seconds",
            check_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;
            monitor.check().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::CacheConfig;
    use crate::pressure::{FixedMemoryProbe, PressurePolicy};
    use crate::stats::StatsCollector;

    #[tokio::test]
    async fn test_pressure_task_sheds_under_pressure() {
        let manager = Arc::new(CacheManager::new(Arc::new(StatsCollector::new())));
        let cache = manager
            .create_cache::<u32>("search-results", CacheConfig::new(true, 3600, 1000))
            .unwrap();
        for i in 0..100 {
            cache.set(format!("search:{i}"), i).await;
        }

        let probe = Arc::new(FixedMemoryProbe::new(0.50));
        let monitor = Arc::new(MemoryPressureMonitor::new(
            manager.clone(),
            probe.clone(),
            PressurePolicy::default(),
        ));
        let handle = spawn_pressure_task(monitor, 1);

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(cache.len().await, 100, "Normal pressure leaves caches alone");

        probe.set_ratio(0.95);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(cache.len().await, 0, "Critical pressure flushes caches");

        handle.abort();
    }
}
