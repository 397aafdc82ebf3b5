//! Cache Module
//!
//! In-memory caching with TTL expiration, LRU eviction and pressure shedding.

mod entry;
mod lru;
mod manager;
mod named;
mod pattern;
mod store;


// Re-export public types
pub use entry::{CacheEntry, EntryInfo};
pub use lru::LruTracker;
pub use manager::{CacheManager, DERIVED_ARTIFACTS, ENTITY_LOOKUP, SEARCH_RESULTS};
pub use named::{Cache, ManagedCache};
pub use pattern::KeyPattern;
pub use store::{CacheStore, Insertion, Lookup};
