//! Pooled Connection Handle
//!
//! Wraps a checked-out connection, times every delegated operation and
//! returns the connection to its pool when dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

use crate::error::{CacheError, Result};
use crate::pool::connection::{Connection, ConnectionFactory};
use crate::pool::connection_pool::PoolShared;

// == Pooled Connection ==
/// A connection checked out of a [`super::ConnectionPool`].
pub struct PooledConnection<F: ConnectionFactory> {
    id: u64,
    generation: u64,
    conn: Option<F::Connection>,
    shared: Arc<PoolShared<F>>,
    /// Released after the connection is back in the pool
    _permit: OwnedSemaphorePermit,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(
        id: u64,
        generation: u64,
        conn: F::Connection,
        shared: Arc<PoolShared<F>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            id,
            generation,
            conn: Some(conn),
            shared,
            _permit: permit,
        }
    }

    /// Pool-unique handle id. Stable across check-outs of the same connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<PoolShared<F>>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    // == Delegated Operations ==
    pub async fn prepare(&mut self, statement: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.conn_mut()?.prepare(statement).await;
        self.record("prepare", statement, started.elapsed());
        result
    }

    pub async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64> {
        let started = Instant::now();
        let result = self.conn_mut()?.execute(statement, params).await;
        self.record("execute", statement, started.elapsed());
        result
    }

    pub async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<<F::Connection as Connection>::Row>> {
        let started = Instant::now();
        let result = self.conn_mut()?.query(statement, params).await;
        self.record("query", statement, started.elapsed());
        result
    }

    fn conn_mut(&mut self) -> Result<&mut F::Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| CacheError::Internal(format!("handle {} already released", self.id)))
    }

    fn record(&self, operation: &str, statement: &str, elapsed: Duration) {
        let config = self.shared.config();
        let slow = elapsed >= config.slow_threshold;
        self.shared.stats().record_timing(
            &format!("{}.{}", config.name, operation),
            elapsed,
            slow,
        );

        if slow {
            warn!(
                pool = %config.name,
                handle = self.id,
                operation,
                statement,
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = config.slow_threshold.as_millis() as u64,
                "Slow pooled operation"
            );
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.check_in(self.id, self.generation, conn);
        }
    }
}
