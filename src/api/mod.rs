//! API Module
//!
//! HTTP handlers and routing for the cache ops surface.
//!
//! # Endpoints
//! - `GET /health` - Health report
//! - `GET /stats` - Statistics snapshot
//! - `POST /events/entity`, `/events/sync`, `/events/manual` - Change events
//! - `PUT /invalidation/auto` - Toggle auto invalidation
//! - `GET /rules`, `PUT|DELETE /rules/:name` - Rule management
//! - `DELETE /caches/:name` - Clear one cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
