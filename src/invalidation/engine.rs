//! Invalidation Engine
//!
//! Applies named rules to the managed caches when change events arrive.
//! Rules are independent: one failing rule is logged and the rest still run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, KeyPattern, ManagedCache};
use crate::error::{CacheError, Result};
use crate::invalidation::rule::{
    ChangeEvent, ChangeKind, InvalidationRule, Scope, SyncSummary, Trigger,
};

// == Change Observer ==
/// Typed interface a catalog-sync collaborator reports changes through.
#[async_trait]
pub trait ChangeObserver: Send + Sync {
    async fn entity_changed(&self, entity_key: &str, kind: ChangeKind) -> InvalidationOutcome;

    async fn bulk_synced(&self, summary: SyncSummary) -> InvalidationOutcome;
}

// == Outcome ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    pub rule: String,
    pub reason: String,
}

/// What one event did to the caches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationOutcome {
    /// Rules whose trigger matched the event
    pub rules_matched: usize,
    /// Rules applied without error
    pub rules_applied: usize,
    pub entries_removed: usize,
    pub failures: Vec<RuleFailure>,
    /// True when auto invalidation was off and nothing was cleared
    pub skipped: bool,
}

// == Event Stats ==
#[derive(Debug, Default)]
struct EventCounters {
    entity_changes: AtomicU64,
    bulk_syncs: AtomicU64,
    manual: AtomicU64,
    time_based: AtomicU64,
    rule_failures: AtomicU64,
    entries_removed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventStats {
    pub entity_changes: u64,
    pub bulk_syncs: u64,
    pub manual: u64,
    pub time_based: u64,
    pub rule_failures: u64,
    pub entries_removed: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SyncState {
    pub(crate) last_bulk_sync: Option<DateTime<Utc>>,
    pub(crate) last_summary: Option<SyncSummary>,
}

// == Invalidation Engine ==
pub struct InvalidationEngine {
    manager: Arc<CacheManager>,
    rules: RwLock<HashMap<String, InvalidationRule>>,
    auto_invalidation: AtomicBool,
    pub(crate) sync: RwLock<SyncState>,
    events: EventCounters,
    pub(crate) staleness: chrono::Duration,
}

impl InvalidationEngine {
    pub fn new(manager: Arc<CacheManager>) -> Self {
        Self {
            manager,
            rules: RwLock::new(HashMap::new()),
            auto_invalidation: AtomicBool::new(true),
            sync: RwLock::new(SyncState::default()),
            events: EventCounters::default(),
            staleness: chrono::Duration::hours(24),
        }
    }

    /// Sets the age after which the last bulk sync is reported stale.
    pub fn with_staleness(mut self, staleness: chrono::Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    // == Rule Management ==
    /// Adds a rule, replacing any rule with the same name.
    ///
    /// Returns the replaced rule. Patterns with more than one wildcard are rejected.
    pub async fn add_rule(&self, rule: InvalidationRule) -> Result<Option<InvalidationRule>> {
        if rule.name.trim().is_empty() {
            return Err(CacheError::InvalidRequest("rule name cannot be empty".to_string()));
        }
        KeyPattern::parse(&rule.pattern)?;

        debug!(rule = %rule.name, trigger = ?rule.trigger, scope = ?rule.scope, "Invalidation rule added");
        Ok(self.rules.write().await.insert(rule.name.clone(), rule))
    }

    pub async fn add_rules(&self, rules: impl IntoIterator<Item = InvalidationRule>) -> Result<()> {
        for rule in rules {
            self.add_rule(rule).await?;
        }
        Ok(())
    }

    pub async fn remove_rule(&self, name: &str) -> bool {
        self.rules.write().await.remove(name).is_some()
    }

    /// Every rule, ordered by name.
    pub async fn rules(&self) -> Vec<InvalidationRule> {
        let mut rules: Vec<_> = self.rules.read().await.values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    // == Auto Invalidation ==
    pub fn set_auto_invalidation(&self, enabled: bool) {
        let previous = self.auto_invalidation.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            info!(enabled, "Auto invalidation toggled");
        }
    }

    pub fn auto_invalidation(&self) -> bool {
        self.auto_invalidation.load(Ordering::Relaxed)
    }

    // == Events ==
    pub async fn on_entity_change(&self, entity_key: &str, kind: ChangeKind) -> InvalidationOutcome {
        self.events.entity_changes.fetch_add(1, Ordering::Relaxed);
        self.dispatch(ChangeEvent::EntityChange {
            key: entity_key.to_string(),
            kind,
        })
        .await
    }

    /// Records the sync for health reporting, then applies bulk-sync rules.
    pub async fn on_bulk_sync(&self, summary: SyncSummary) -> InvalidationOutcome {
        self.events.bulk_syncs.fetch_add(1, Ordering::Relaxed);
        {
            let mut sync = self.sync.write().await;
            sync.last_bulk_sync = Some(Utc::now());
            sync.last_summary = Some(summary);
        }
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "Catalog bulk sync observed"
        );
        self.dispatch(ChangeEvent::BulkSync { summary }).await
    }

    /// Applies manual rules, optionally scoped to one entity.
    pub async fn invalidate_manual(&self, entity_key: Option<&str>) -> InvalidationOutcome {
        self.events.manual.fetch_add(1, Ordering::Relaxed);
        self.dispatch(ChangeEvent::Manual {
            key: entity_key.map(str::to_string),
        })
        .await
    }

    /// Applies time-based rules. Driven by the periodic invalidation task.
    pub async fn run_time_based(&self) -> InvalidationOutcome {
        self.events.time_based.fetch_add(1, Ordering::Relaxed);
        self.dispatch(ChangeEvent::Tick).await
    }

    pub async fn last_bulk_sync(&self) -> Option<DateTime<Utc>> {
        self.sync.read().await.last_bulk_sync
    }

    pub fn event_stats(&self) -> EventStats {
        EventStats {
            entity_changes: self.events.entity_changes.load(Ordering::Relaxed),
            bulk_syncs: self.events.bulk_syncs.load(Ordering::Relaxed),
            manual: self.events.manual.load(Ordering::Relaxed),
            time_based: self.events.time_based.load(Ordering::Relaxed),
            rule_failures: self.events.rule_failures.load(Ordering::Relaxed),
            entries_removed: self.events.entries_removed.load(Ordering::Relaxed),
        }
    }

    // == Dispatch ==
    async fn dispatch(&self, event: ChangeEvent) -> InvalidationOutcome {
        let trigger = event.trigger();
        let mut matching: Vec<InvalidationRule> = self
            .rules
            .read()
            .await
            .values()
            .filter(|rule| rule.trigger == trigger)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));

        let mut outcome = InvalidationOutcome {
            rules_matched: matching.len(),
            ..InvalidationOutcome::default()
        };

        if !self.auto_invalidation() {
            debug!(?event, rules = matching.len(), "Auto invalidation disabled, event observed only");
            outcome.skipped = true;
            return outcome;
        }

        for rule in &matching {
            match self.apply(rule, &event).await {
                Ok(removed) => {
                    debug!(rule = %rule.name, removed, "Invalidation rule applied");
                    outcome.rules_applied += 1;
                    outcome.entries_removed += removed;
                }
                Err(err) => {
                    warn!(rule = %rule.name, caches = ?rule.caches, ?event, error = %err, "Invalidation rule failed");
                    self.events.rule_failures.fetch_add(1, Ordering::Relaxed);
                    outcome.failures.push(RuleFailure {
                        rule: rule.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.events
            .entries_removed
            .fetch_add(outcome.entries_removed as u64, Ordering::Relaxed);
        if outcome.entries_removed > 0 {
            info!(
                trigger = ?trigger,
                rules = outcome.rules_applied,
                removed = outcome.entries_removed,
                "Caches invalidated"
            );
        }
        outcome
    }

    // == Apply ==
    async fn apply(&self, rule: &InvalidationRule, event: &ChangeEvent) -> Result<usize> {
        let pattern = KeyPattern::parse(&rule.pattern)
            .map_err(|e| CacheError::invalidation(&rule.name, e.to_string()))?;
        let targets = self.targets(rule)?;

        let mut removed = 0;
        match rule.scope {
            Scope::Specific => {
                let key = if pattern.has_wildcard() {
                    let entity = event.entity_key().ok_or_else(|| {
                        CacheError::invalidation(
                            &rule.name,
                            format!("pattern '{}' needs an entity key", rule.pattern),
                        )
                    })?;
                    pattern.resolve(entity)
                } else {
                    rule.pattern.clone()
                };
                for cache in &targets {
                    if cache.delete(&key).await {
                        removed += 1;
                    }
                }
            }
            Scope::Pattern => {
                for cache in &targets {
                    removed += cache.remove_matching(&pattern).await;
                }
            }
            Scope::All => {
                for cache in &targets {
                    removed += cache.clear().await;
                }
            }
        }
        Ok(removed)
    }

    fn targets(&self, rule: &InvalidationRule) -> Result<Vec<Arc<dyn ManagedCache>>> {
        if rule.caches.is_empty() {
            return Ok(self.manager.caches());
        }

        rule.caches
            .iter()
            .map(|name| {
                self.manager.get(name).ok_or_else(|| {
                    CacheError::invalidation(&rule.name, format!("unknown cache '{}'", name))
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChangeObserver for InvalidationEngine {
    async fn entity_changed(&self, entity_key: &str, kind: ChangeKind) -> InvalidationOutcome {
        self.on_entity_change(entity_key, kind).await
    }

    async fn bulk_synced(&self, summary: SyncSummary) -> InvalidationOutcome {
        self.on_bulk_sync(summary).await
    }
}
