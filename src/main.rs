//! Catalog Cache - in-process caching for a catalog service
//!
//! Runs the catalog caches with their background tasks and serves the ops
//! API for health, statistics and invalidation events.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_cache::api::create_router;
use catalog_cache::cache::CacheManager;
use catalog_cache::pressure::{MemoryPressureMonitor, ProcessMemoryProbe};
use catalog_cache::{
    spawn_cleanup_task, spawn_pressure_task, spawn_time_based_task, AppState, Config,
};

/// Main entry point for the catalog cache service.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Create the catalog caches and the invalidation engine
/// 4. Start TTL sweep, memory pressure and time-based invalidation tasks
/// 5. Serve the ops API on the configured port
/// 6. On SIGINT/SIGTERM stop the background tasks and shut down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting catalog cache service");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        enabled = config.entity_cache.enabled,
        sweep_interval = config.sweep_interval,
        pressure_check_interval = config.pressure_check_interval,
        auto_invalidation = config.auto_invalidation,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to create caches")?;
    let manager = Arc::clone(&state.manager);

    manager.track_task(spawn_cleanup_task(manager.clone(), config.sweep_interval));

    let monitor = Arc::new(MemoryPressureMonitor::new(
        manager.clone(),
        Arc::new(ProcessMemoryProbe::new(config.memory_budget_mb)),
        config.pressure,
    ));
    manager.track_task(spawn_pressure_task(monitor, config.pressure_check_interval));

    if config.time_based_interval > 0 {
        manager.track_task(spawn_time_based_task(
            state.engine.clone(),
            config.time_based_interval,
        ));
    }
    info!(tasks = manager.running_tasks(), "Background tasks started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the background tasks.
async fn shutdown_signal(manager: Arc<CacheManager>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    manager.shutdown();
}
