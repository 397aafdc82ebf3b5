//! Invalidation Rules
//!
//! Declarative mappings from a change trigger to a cache-clearing action,
//! and the change events they react to.

use serde::{Deserialize, Serialize};

use crate::cache::{DERIVED_ARTIFACTS, ENTITY_LOOKUP, SEARCH_RESULTS};

/// What kind of event fires a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    EntityChange,
    BulkSync,
    Manual,
    TimeBased,
}

/// How much of the target caches a rule clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Exactly one key, derived from the pattern and the event
    Specific,
    /// Every key matching the pattern
    Pattern,
    /// Everything
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Counts reported by one full catalog refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    #[serde(default)]
    pub added: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub removed: u64,
}

// == Change Event ==
/// An observed change, as fed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    EntityChange { key: String, kind: ChangeKind },
    BulkSync { summary: SyncSummary },
    Manual { key: Option<String> },
    Tick,
}

impl ChangeEvent {
    pub fn trigger(&self) -> Trigger {
        match self {
            ChangeEvent::EntityChange { .. } => Trigger::EntityChange,
            ChangeEvent::BulkSync { .. } => Trigger::BulkSync,
            ChangeEvent::Manual { .. } => Trigger::Manual,
            ChangeEvent::Tick => Trigger::TimeBased,
        }
    }

    /// The entity identifier carried by the event, if any.
    pub fn entity_key(&self) -> Option<&str> {
        match self {
            ChangeEvent::EntityChange { key, .. } => Some(key),
            ChangeEvent::Manual { key } => key.as_deref(),
            ChangeEvent::BulkSync { .. } | ChangeEvent::Tick => None,
        }
    }
}

// == Invalidation Rule ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationRule {
    /// Unique rule name
    #[serde(default)]
    pub name: String,
    /// Key or glob with a single `*`
    pub pattern: String,
    pub trigger: Trigger,
    pub scope: Scope,
    /// Target caches; empty means every registered cache
    #[serde(default)]
    pub caches: Vec<String>,
    /// Opaque data for operators, never interpreted
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl InvalidationRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, trigger: Trigger, scope: Scope) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            trigger,
            scope,
            caches: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Restricts the rule to the named caches.
    pub fn for_caches<I, S>(mut self, caches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.caches = caches.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Rules a catalog deployment starts with.
pub fn default_rules() -> Vec<InvalidationRule> {
    vec![
        InvalidationRule::new("entity-lookup-by-key", "node:*", Trigger::EntityChange, Scope::Specific)
            .for_caches([ENTITY_LOOKUP]),
        InvalidationRule::new("search-on-entity-change", "search:*", Trigger::EntityChange, Scope::Pattern)
            .for_caches([SEARCH_RESULTS]),
        InvalidationRule::new("artifacts-by-entity", "artifact:*", Trigger::EntityChange, Scope::Specific)
            .for_caches([DERIVED_ARTIFACTS]),
        InvalidationRule::new("flush-on-bulk-sync", "*", Trigger::BulkSync, Scope::All),
        InvalidationRule::new("manual-flush", "*", Trigger::Manual, Scope::All),
    ]
}
