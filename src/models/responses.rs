//! Response DTOs for the ops API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::invalidation::{InvalidationOutcome, InvalidationRule};

/// Response body for the event endpoints (POST /events/*)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationResponse {
    /// Event type that was processed
    pub event: String,
    #[serde(flatten)]
    pub outcome: InvalidationOutcome,
}

impl InvalidationResponse {
    pub fn new(event: impl Into<String>, outcome: InvalidationOutcome) -> Self {
        Self {
            event: event.into(),
            outcome,
        }
    }
}

/// Response body for PUT /invalidation/auto
#[derive(Debug, Clone, Serialize)]
pub struct AutoInvalidationResponse {
    pub enabled: bool,
    pub message: String,
}

impl AutoInvalidationResponse {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            message: format!(
                "Auto invalidation {}",
                if enabled { "enabled" } else { "disabled" }
            ),
        }
    }
}

/// Response body for PUT /rules/:name
#[derive(Debug, Clone, Serialize)]
pub struct RuleResponse {
    pub message: String,
    /// True when a rule with the same name was replaced
    pub replaced: bool,
    pub rule: InvalidationRule,
}

impl RuleResponse {
    pub fn new(rule: InvalidationRule, replaced: bool) -> Self {
        Self {
            message: format!(
                "Rule '{}' {}",
                rule.name,
                if replaced { "replaced" } else { "added" }
            ),
            replaced,
            rule,
        }
    }
}

/// Response body for DELETE /rules/:name
#[derive(Debug, Clone, Serialize)]
pub struct RemoveRuleResponse {
    pub message: String,
    pub name: String,
}

impl RemoveRuleResponse {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            message: format!("Rule '{}' removed", name),
            name,
        }
    }
}

/// Response body for DELETE /caches/:name
#[derive(Debug, Clone, Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub cache: String,
    pub entries_removed: usize,
}

impl ClearCacheResponse {
    pub fn new(cache: impl Into<String>, entries_removed: usize) -> Self {
        let cache = cache.into();
        Self {
            message: format!("Cache '{}' cleared", cache),
            cache,
            entries_removed,
        }
    }
}
