//! Bounded Connection Pool
//!
//! Hands out at most `max_size` connections. Callers beyond that wait on a
//! semaphore and are woken as soon as a handle is returned.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::pool::connection::{Connection, ConnectionFactory};
use crate::pool::handle::PooledConnection;
use crate::stats::{PoolGauges, PoolStatus, StatsCollector};

// == Pool Config ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Used in logs and as the timing prefix, e.g. `catalog-db.query`
    pub name: String,
    pub max_size: usize,
    /// Operations at or above this duration are logged as slow
    pub slow_threshold: Duration,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, max_size: usize) -> Self {
        Self {
            name: name.into(),
            max_size,
            slow_threshold: Duration::from_millis(100),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &Config) -> Self {
        Self {
            name: name.into(),
            max_size: config.pool_max_size,
            slow_threshold: config.slow_operation_threshold(),
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CacheError::Configuration("pool name must not be empty".to_string()));
        }
        if self.max_size == 0 {
            return Err(CacheError::Configuration(
                "pool max size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// == Shared State ==
struct Idle<C> {
    id: u64,
    conn: C,
}

/// `available.len() + in_use.len()` is the number of live connections.
struct PoolState<C> {
    available: Vec<Idle<C>>,
    in_use: HashSet<u64>,
    /// Bumped by `close_all`; handles from an older generation are retired on return
    generation: u64,
}

pub(crate) struct PoolShared<F: ConnectionFactory> {
    config: PoolConfig,
    factory: F,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<F::Connection>>,
    stats: Arc<StatsCollector>,
    gauges: Arc<PoolGauges>,
    next_id: AtomicU64,
}

impl<F: ConnectionFactory> PoolShared<F> {
    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    fn state(&self) -> MutexGuard<'_, PoolState<F::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PoolState<F::Connection>) {
        self.gauges
            .set(self.config.max_size, state.in_use.len(), state.available.len());
    }

    /// Returns a connection from a dropped handle.
    pub(crate) fn check_in(&self, id: u64, generation: u64, conn: F::Connection) {
        let retired = {
            let mut state = self.state();
            if !state.in_use.remove(&id) {
                warn!(
                    pool = %self.config.name,
                    handle = id,
                    "{}",
                    CacheError::HandleMisuse(format!("handle {id} was not checked out"))
                );
                return;
            }

            let retired = if generation == state.generation {
                state.available.push(Idle { id, conn });
                debug!(pool = %self.config.name, handle = id, "Connection released");
                None
            } else {
                Some(conn)
            };
            self.publish(&state);
            retired
        };

        if let Some(mut conn) = retired {
            debug!(pool = %self.config.name, handle = id, "Retiring connection from closed generation");
            // Without a runtime the connection is simply dropped
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let pool = self.config.name.clone();
                runtime.spawn(async move {
                    if let Err(e) = conn.close().await {
                        warn!(pool = %pool, handle = id, error = %e, "Error closing connection");
                    }
                });
            }
        }
    }

    fn unreserve(&self, id: u64) {
        let mut state = self.state();
        state.in_use.remove(&id);
        self.publish(&state);
    }
}

/// Holds a slot for a connection that is still being opened.
struct Reservation<'a, F: ConnectionFactory> {
    shared: &'a PoolShared<F>,
    id: u64,
    armed: bool,
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.unreserve(self.id);
        }
    }
}

enum Checkout<C> {
    Reused(Idle<C>, u64),
    Create(u64, u64),
}

// == Connection Pool ==
/// A bounded pool of connections produced by a [`ConnectionFactory`].
pub struct ConnectionPool<F: ConnectionFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: ConnectionFactory> Clone for ConnectionPool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(config: PoolConfig, factory: F, stats: Arc<StatsCollector>) -> Result<Self> {
        config.validate()?;
        let gauges = stats.pool_gauges(&config.name);
        gauges.set(config.max_size, 0, 0);

        info!(pool = %config.name, max_size = config.max_size, "Connection pool created");
        Ok(Self {
            shared: Arc::new(PoolShared {
                permits: Arc::new(Semaphore::new(config.max_size)),
                config,
                factory,
                state: Mutex::new(PoolState {
                    available: Vec::new(),
                    in_use: HashSet::new(),
                    generation: 0,
                }),
                stats,
                gauges,
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    // == Acquire ==
    /// Checks out a connection, waiting while the pool is at capacity.
    pub async fn acquire(&self) -> Result<PooledConnection<F>> {
        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| CacheError::Internal("pool semaphore closed".to_string()))?;
        self.checkout(permit).await
    }

    /// Checks out a connection only if one can be had without waiting.
    pub async fn try_acquire(&self) -> Result<PooledConnection<F>> {
        let permit = match Arc::clone(&self.shared.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(CacheError::CapacityExhausted(format!(
                    "pool '{}' has all {} connections in use",
                    self.shared.config.name, self.shared.config.max_size
                )))
            }
            Err(TryAcquireError::Closed) => {
                return Err(CacheError::Internal("pool semaphore closed".to_string()))
            }
        };
        self.checkout(permit).await
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::CapacityExhausted(format!(
                "timed out after {}ms waiting for pool '{}'",
                timeout.as_millis(),
                self.shared.config.name
            ))),
        }
    }

    async fn checkout(&self, permit: OwnedSemaphorePermit) -> Result<PooledConnection<F>> {
        let checkout = {
            let mut state = self.shared.state();
            let generation = state.generation;
            let checkout = match state.available.pop() {
                Some(idle) => {
                    state.in_use.insert(idle.id);
                    Checkout::Reused(idle, generation)
                }
                None => {
                    let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
                    state.in_use.insert(id);
                    Checkout::Create(id, generation)
                }
            };
            self.shared.publish(&state);
            checkout
        };

        match checkout {
            Checkout::Reused(idle, generation) => {
                debug!(pool = %self.shared.config.name, handle = idle.id, "Connection reused");
                Ok(PooledConnection::new(
                    idle.id,
                    generation,
                    idle.conn,
                    Arc::clone(&self.shared),
                    permit,
                ))
            }
            Checkout::Create(id, generation) => {
                let mut reservation = Reservation {
                    shared: &self.shared,
                    id,
                    armed: true,
                };
                let conn = self.shared.factory.connect().await.map_err(|e| {
                    warn!(pool = %self.shared.config.name, error = %e, "Failed to open connection");
                    e
                })?;
                reservation.armed = false;

                debug!(pool = %self.shared.config.name, handle = id, "Connection opened");
                Ok(PooledConnection::new(
                    id,
                    generation,
                    conn,
                    Arc::clone(&self.shared),
                    permit,
                ))
            }
        }
    }

    // == Release ==
    /// Returns a handle to the pool and wakes one waiter.
    ///
    /// Returns false for a handle checked out of a different pool. That
    /// handle still goes back to the pool that issued it.
    pub fn release(&self, handle: PooledConnection<F>) -> bool {
        let ours = handle.belongs_to(&self.shared);
        if !ours {
            warn!(
                pool = %self.shared.config.name,
                handle = handle.id(),
                "{}",
                CacheError::HandleMisuse("handle released to a pool that did not issue it".to_string())
            );
        }
        drop(handle);
        ours
    }

    /// Runs `work` with a checked-out connection, releasing it on every exit path.
    pub async fn with_connection<T, W>(&self, work: W) -> Result<T>
    where
        W: for<'c> FnOnce(&'c mut PooledConnection<F>) -> BoxFuture<'c, Result<T>>,
    {
        let mut handle = self.acquire().await?;
        let result = work(&mut handle).await;
        self.release(handle);
        result
    }

    // == Close All ==
    /// Closes every idle connection. Handles still checked out are closed
    /// when they come back. Returns the number closed now.
    pub async fn close_all(&self) -> usize {
        let (idle, in_use) = {
            let mut state = self.shared.state();
            state.generation += 1;
            let idle = std::mem::take(&mut state.available);
            self.shared.publish(&state);
            (idle, state.in_use.len())
        };

        let closed = idle.len();
        for mut entry in idle {
            if let Err(e) = entry.conn.close().await {
                warn!(pool = %self.shared.config.name, handle = entry.id, error = %e, "Error closing connection");
            }
        }

        info!(pool = %self.shared.config.name, closed, in_use, "Connection pool closed");
        closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state();
        PoolStatus {
            max_size: self.shared.config.max_size,
            created: state.in_use.len() + state.available.len(),
            in_use: state.in_use.len(),
            available: state.available.len(),
        }
    }
}
