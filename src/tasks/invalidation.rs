//! Time-Based Invalidation Task

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::invalidation::InvalidationEngine;

/// Spawns a background task that applies the engine's `time_based` rules
/// every `interval_secs` seconds.
pub fn spawn_time_based_task(engine: Arc<InvalidationEngine>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting time-based invalidation task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let outcome = engine.run_time_based().await;
            debug!(
                rules_applied = outcome.rules_applied,
                entries_removed = outcome.entries_removed,
                "Time-based invalidation pass"
            );
        }
    })
}
