//! Connection Traits
//!
//! The seams between the pool and the underlying store.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A live connection to the backing store.
///
/// Rows and parameters are opaque to the pool.
#[async_trait]
pub trait Connection: Send + 'static {
    type Row: Send;

    async fn prepare(&mut self, statement: &str) -> Result<()>;

    /// Runs a statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64>;

    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Self::Row>>;

    /// Called once when the pool retires the connection.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens new connections on demand.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    async fn connect(&self) -> Result<Self::Connection>;
}
