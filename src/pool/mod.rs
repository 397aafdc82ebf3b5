//! Connection Pool Module
//!
//! A bounded pool of store connections with per-operation timing.

mod connection;
mod connection_pool;
mod handle;

pub use connection::{Connection, ConnectionFactory};
pub use connection_pool::{ConnectionPool, PoolConfig};
pub use handle::PooledConnection;
