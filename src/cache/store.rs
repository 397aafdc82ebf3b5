//! Cache Store Module
//!
//! Single-owner cache engine combining HashMap storage with LRU tracking and
//! TTL expiration. Thread-safe access is layered on top by [`super::Cache`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::cache::pattern::KeyPattern;
use crate::cache::{CacheEntry, EntryInfo, LruTracker};

/// Result of a lookup against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    Hit(V),
    Miss,
    /// The entry existed but its TTL had elapsed; it has been removed.
    Expired,
}

impl<V> Lookup<V> {
    pub fn into_option(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

/// What a `set` had to remove to make room for a new key.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// Live entry dropped by LRU eviction
    pub evicted: Option<String>,
    /// Expired entries purged before eviction was considered
    pub expired: usize,
}

// == Cache Store ==
/// Cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL for entries stored without an explicit one
    default_ttl: Duration,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_entries,
            default_ttl,
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing entry for the key.
    ///
    /// When a new key arrives at capacity, expired entries are purged first.
    /// The least recently used live entry is evicted only if that freed no slot.
    pub fn set(&mut self, key: String, value: V, ttl: Option<Duration>) -> Insertion {
        let is_overwrite = self.entries.contains_key(&key);

        let mut outcome = Insertion::default();
        if !is_overwrite && self.entries.len() >= self.max_entries {
            outcome.expired = self.cleanup_expired();
            if self.entries.len() >= self.max_entries {
                if let Some(oldest) = self.lru.evict_oldest() {
                    self.entries.remove(&oldest);
                    outcome.evicted = Some(oldest);
                }
            }
        }

        let entry = CacheEntry::new(value, ttl.unwrap_or(self.default_ttl));
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);

        outcome
    }

    // == Get ==
    /// Retrieves a value, refreshing its recency and access metadata.
    ///
    /// Expired entries are removed on the way out.
    pub fn get(&mut self, key: &str) -> Lookup<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(Instant::now()),
            None => return Lookup::Miss,
        };
        if expired {
            self.remove(key);
            return Lookup::Expired;
        }

        let value = match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch();
                entry.value.clone()
            }
            None => return Lookup::Miss,
        };
        self.lru.touch(key);
        Lookup::Hit(value)
    }

    // == Probe ==
    /// Liveness check that leaves recency untouched. Purges expired entries.
    pub fn probe(&mut self, key: &str) -> Lookup<()> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return Lookup::Miss,
        };
        if expired {
            self.remove(key);
            Lookup::Expired
        } else {
            Lookup::Hit(())
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove(key)
    }

    /// Removes every entry. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        count
    }

    /// Removes every entry whose key matches `pattern`.
    pub fn remove_matching(&mut self, pattern: &KeyPattern) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();

        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    /// Removes the `count` least recently used entries.
    pub fn shed_oldest(&mut self, count: usize) -> usize {
        let victims = self.lru.oldest(count);
        for key in &victims {
            self.remove(key);
        }
        victims.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove(key);
        }
        expired_keys.len()
    }

    /// Metadata for a live entry, without touching it.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(EntryInfo::from)
    }

    /// Keys currently stored, including ones that expired but were not yet swept.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.lru.remove(key);
            true
        } else {
            false
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    const TTL: Duration = Duration::from_secs(300);

    fn store(max: usize) -> CacheStore<String> {
        CacheStore::new(max, TTL)
    }

    fn set(store: &mut CacheStore<String>, key: &str) -> Option<String> {
        store.set(key.to_string(), format!("value_{}", key), None).evicted
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100);
        set(&mut store, "key1");

        assert_eq!(store.get("key1"), Lookup::Hit("value_key1".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("nonexistent"), Lookup::Miss);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = store(100);
        store.set("key1".into(), "value1".into(), None);
        store.set("key1".into(), "value2".into(), None);

        assert_eq!(store.get("key1").into_option().as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = store(100);
        set(&mut store, "key1");

        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = store(100);
        store.set("key1".into(), "value1".into(), Some(Duration::from_millis(50)));
        assert!(matches!(store.get("key1"), Lookup::Hit(_)));

        sleep(Duration::from_millis(80));

        assert_eq!(store.get("key1"), Lookup::Expired);
        assert_eq!(store.get("key1"), Lookup::Miss);
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3);
        set(&mut store, "key1");
        set(&mut store, "key2");
        set(&mut store, "key3");

        assert_eq!(set(&mut store, "key4"), Some("key1".to_string()));
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("key1"), Lookup::Miss);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let mut store = store(3);
        set(&mut store, "A");
        set(&mut store, "B");
        set(&mut store, "C");
        store.get("A");

        assert_eq!(set(&mut store, "D"), Some("B".to_string()));
        for key in ["A", "C", "D"] {
            assert!(matches!(store.get(key), Lookup::Hit(_)), "{} should remain", key);
        }
    }

    #[test]
    fn test_store_overwrite_at_capacity_does_not_evict() {
        let mut store = store(2);
        set(&mut store, "a");
        set(&mut store, "b");

        assert_eq!(set(&mut store, "a"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_expired_entry_frees_slot_before_lru_eviction() {
        let mut store = store(2);
        set(&mut store, "live");
        store.set("dead".into(), "gone".into(), Some(Duration::from_millis(10)));

        sleep(Duration::from_millis(30));

        let outcome = store.set("new".into(), "N".into(), None);
        assert_eq!(outcome, Insertion { evicted: None, expired: 1 });
        assert_eq!(store.len(), 2);
        assert!(matches!(store.get("live"), Lookup::Hit(_)));
        assert_eq!(store.get("new"), Lookup::Hit("N".to_string()));
        assert_eq!(store.get("dead"), Lookup::Miss);
    }

    #[test]
    fn test_lru_eviction_when_nothing_expired() {
        let mut store = store(2);
        set(&mut store, "a");
        set(&mut store, "b");

        let outcome = store.set("c".into(), "C".into(), None);
        assert_eq!(outcome, Insertion { evicted: Some("a".to_string()), expired: 0 });
    }

    #[test]
    fn test_probe_does_not_refresh_recency() {
        let mut store = store(2);
        set(&mut store, "a");
        set(&mut store, "b");

        assert_eq!(store.probe("a"), Lookup::Hit(()));
        assert_eq!(set(&mut store, "c"), Some("a".to_string()));
    }

    #[test]
    fn test_get_updates_access_count() {
        let mut store = store(10);
        set(&mut store, "a");
        store.get("a");
        store.get("a");

        assert_eq!(store.entry_info("a").unwrap().access_count, 2);
    }

    #[test]
    fn test_remove_matching() {
        let mut store = store(10);
        for key in ["node:a", "node:b", "search:foo"] {
            set(&mut store, key);
        }

        let pattern = KeyPattern::parse("node:*").unwrap();
        assert_eq!(store.remove_matching(&pattern), 2);
        assert_eq!(store.keys(), vec!["search:foo".to_string()]);
    }

    #[test]
    fn test_shed_oldest() {
        let mut store = store(10);
        for key in ["a", "b", "c", "d"] {
            set(&mut store, key);
        }
        store.get("a");

        assert_eq!(store.shed_oldest(2), 2);
        assert_eq!(store.get("b"), Lookup::Miss);
        assert_eq!(store.get("c"), Lookup::Miss);
        assert!(matches!(store.get("a"), Lookup::Hit(_)));
        assert!(matches!(store.get("d"), Lookup::Hit(_)));
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = store(100);
        store.set("key1".into(), "value1".into(), Some(Duration::from_millis(50)));
        store.set("key2".into(), "value2".into(), Some(Duration::from_secs(10)));

        sleep(Duration::from_millis(80));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("key2"), Lookup::Hit(_)));
    }

    #[test]
    fn test_clear_returns_count() {
        let mut store = store(10);
        set(&mut store, "a");
        set(&mut store, "b");
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(set(&mut store, "c"), None);
    }
}
