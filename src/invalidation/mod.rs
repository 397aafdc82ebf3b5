//! Invalidation Module
//!
//! Rule-based cache invalidation driven by catalog change events, plus the
//! health report consumed by operational tooling.

mod engine;
mod health;
mod rule;

pub use engine::{ChangeObserver, EventStats, InvalidationEngine, InvalidationOutcome, RuleFailure};
pub use health::{
    CacheHealth, HealthReport, HealthStatus, ESTIMATED_ENTRY_BYTES, LARGE_FOOTPRINT_BYTES,
    LOW_HIT_RATE,
};
pub use rule::{
    default_rules, ChangeEvent, ChangeKind, InvalidationRule, Scope, SyncSummary, Trigger,
};
