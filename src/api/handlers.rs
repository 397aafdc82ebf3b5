//! API Handlers
//!
//! HTTP request handlers for each ops endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::cache::{CacheManager, DERIVED_ARTIFACTS, ENTITY_LOOKUP, SEARCH_RESULTS};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::{
    default_rules, HealthReport, InvalidationEngine, InvalidationRule, SyncSummary,
};
use crate::models::{
    AutoInvalidationRequest, AutoInvalidationResponse, ClearCacheResponse, EntityChangeRequest,
    InvalidationResponse, ManualInvalidationRequest, RemoveRuleResponse, RuleResponse,
};
use crate::stats::{StatsCollector, StatsSnapshot};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,
    pub engine: Arc<InvalidationEngine>,
}

impl AppState {
    /// Creates a new AppState around an engine and the manager it invalidates.
    pub fn new(engine: Arc<InvalidationEngine>) -> Self {
        Self {
            manager: Arc::clone(engine.manager()),
            engine,
        }
    }

    /// Creates the catalog caches, the engine and its default rules from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manager = Arc::new(CacheManager::new(Arc::new(StatsCollector::new())));
        manager.create_cache::<Value>(ENTITY_LOOKUP, config.entity_cache)?;
        manager.create_cache::<Value>(SEARCH_RESULTS, config.search_cache)?;
        manager.create_cache::<Value>(DERIVED_ARTIFACTS, config.artifact_cache)?;

        let engine = InvalidationEngine::new(manager).with_staleness(config.sync_staleness());
        engine.add_rules(default_rules()).await?;
        engine.set_auto_invalidation(config.auto_invalidation);

        Ok(Self::new(Arc::new(engine)))
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.engine.health_report().await)
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.manager.stats().snapshot())
}

/// Handler for POST /events/entity
pub async fn entity_change_handler(
    State(state): State<AppState>,
    Json(req): Json<EntityChangeRequest>,
) -> Result<Json<InvalidationResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let outcome = state.engine.on_entity_change(&req.key, req.kind).await;
    Ok(Json(InvalidationResponse::new("entity_change", outcome)))
}

/// Handler for POST /events/sync
pub async fn bulk_sync_handler(
    State(state): State<AppState>,
    Json(summary): Json<SyncSummary>,
) -> Json<InvalidationResponse> {
    let outcome = state.engine.on_bulk_sync(summary).await;
    Json(InvalidationResponse::new("bulk_sync", outcome))
}

/// Handler for POST /events/manual
pub async fn manual_invalidation_handler(
    State(state): State<AppState>,
    Json(req): Json<ManualInvalidationRequest>,
) -> Result<Json<InvalidationResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let outcome = state.engine.invalidate_manual(req.key.as_deref()).await;
    Ok(Json(InvalidationResponse::new("manual", outcome)))
}

/// Handler for PUT /invalidation/auto
pub async fn auto_invalidation_handler(
    State(state): State<AppState>,
    Json(req): Json<AutoInvalidationRequest>,
) -> Json<AutoInvalidationResponse> {
    state.engine.set_auto_invalidation(req.enabled);
    Json(AutoInvalidationResponse::new(req.enabled))
}

/// Handler for GET /rules
pub async fn list_rules_handler(State(state): State<AppState>) -> Json<Vec<InvalidationRule>> {
    Json(state.engine.rules().await)
}

/// Handler for PUT /rules/:name
///
/// The path names the rule. A body `name`, if present, must agree with it.
pub async fn put_rule_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(mut rule): Json<InvalidationRule>,
) -> Result<Json<RuleResponse>> {
    if !rule.name.is_empty() && rule.name != name {
        return Err(CacheError::InvalidRequest(format!(
            "Rule name '{}' does not match path '{}'",
            rule.name, name
        )));
    }
    rule.name = name;

    let replaced = state.engine.add_rule(rule.clone()).await?.is_some();
    info!(rule = %rule.name, replaced, "Rule stored via API");
    Ok(Json(RuleResponse::new(rule, replaced)))
}

/// Handler for DELETE /rules/:name
pub async fn delete_rule_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RemoveRuleResponse>> {
    if !state.engine.remove_rule(&name).await {
        return Err(CacheError::NotFound(format!("rule '{}'", name)));
    }
    Ok(Json(RemoveRuleResponse::new(name)))
}

/// Handler for DELETE /caches/:name
pub async fn clear_cache_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClearCacheResponse>> {
    let cache = state
        .manager
        .get(&name)
        .ok_or_else(|| CacheError::NotFound(format!("cache '{}'", name)))?;

    let removed = cache.clear().await;
    info!(cache = %name, removed, "Cache cleared via API");
    Ok(Json(ClearCacheResponse::new(name, removed)))
}
