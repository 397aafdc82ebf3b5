//! API Routes
//!
//! Configures the Axum router with all ops endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    auto_invalidation_handler, bulk_sync_handler, clear_cache_handler, delete_rule_handler,
    entity_change_handler, health_handler, list_rules_handler, manual_invalidation_handler,
    put_rule_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health report
/// - `GET /stats` - Statistics snapshot
/// - `POST /events/entity` - Entity change event
/// - `POST /events/sync` - Bulk sync event
/// - `POST /events/manual` - Manual invalidation
/// - `PUT /invalidation/auto` - Toggle auto invalidation
/// - `GET /rules` - List rules
/// - `PUT /rules/:name` / `DELETE /rules/:name` - Store or remove a rule
/// - `DELETE /caches/:name` - Clear one cache
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/events/entity", post(entity_change_handler))
        .route("/events/sync", post(bulk_sync_handler))
        .route("/events/manual", post(manual_invalidation_handler))
        .route("/invalidation/auto", put(auto_invalidation_handler))
        .route("/rules", get(list_rules_handler))
        .route("/rules/:name", put(put_rule_handler).delete(delete_rule_handler))
        .route("/caches/:name", delete(clear_cache_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
