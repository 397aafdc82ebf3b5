//! Named Cache Module
//!
//! Thread-safe, named cache instances built on [`CacheStore`], and the
//! object-safe [`ManagedCache`] view used by the manager, the pressure
//! monitor and the invalidation engine.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex as SyncMutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::cache::pattern::KeyPattern;
use crate::cache::store::{CacheStore, Lookup};
use crate::cache::EntryInfo;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::stats::{CacheCounters, CacheStats, StatsCollector};

// == Managed Cache ==
/// Value-agnostic operations over a named cache.
#[async_trait]
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &CacheConfig;

    fn stats(&self) -> CacheStats;

    async fn len(&self) -> usize;

    async fn delete(&self, key: &str) -> bool;

    async fn clear(&self) -> usize;

    async fn remove_matching(&self, pattern: &KeyPattern) -> usize;

    /// Drops the oldest `percent` of entries by last access.
    async fn shed_oldest(&self, percent: u8) -> usize;

    async fn cleanup_expired(&self) -> usize;
}

// == Cache ==
/// A named TTL + LRU cache shared across tasks.
///
/// Individual operations take the store lock for their whole duration, so
/// they are atomic with respect to each other. `get_or_set` releases the lock
/// while the value is computed.
pub struct Cache<V> {
    name: String,
    config: CacheConfig,
    store: RwLock<CacheStore<V>>,
    counters: Arc<CacheCounters>,
    /// Per-key guards collapsing concurrent populators onto one computation
    in_flight: InFlight,
}

type InFlight = SyncMutex<HashMap<String, Arc<Mutex<()>>>>;

/// A caller's claim on a key's in-flight slot. Dropping the last claim
/// removes the slot, including when the caller's future is cancelled.
struct InFlightClaim<'a> {
    in_flight: &'a InFlight,
    key: &'a str,
    key_lock: Arc<Mutex<()>>,
}

impl<'a> InFlightClaim<'a> {
    fn join(in_flight: &'a InFlight, key: &'a str) -> Self {
        let key_lock = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();
        Self {
            in_flight,
            key,
            key_lock,
        }
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // The map holds one reference and this claim the other
        if in_flight
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.key_lock) && Arc::strong_count(current) <= 2)
        {
            in_flight.remove(self.key);
        }
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    // == Constructor ==
    /// Creates a cache, failing fast on an invalid configuration.
    pub fn new(name: impl Into<String>, config: CacheConfig, stats: &StatsCollector) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        Ok(Self {
            counters: stats.cache_counters(&name),
            store: RwLock::new(CacheStore::new(config.max_entries, config.ttl())),
            in_flight: SyncMutex::new(HashMap::new()),
            config,
            name,
        })
    }

    // == Get ==
    /// Returns the value if present and unexpired.
    pub async fn get(&self, key: &str) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let mut store = self.store.write().await;
        let lookup = store.get(key);
        match &lookup {
            Lookup::Hit(_) => self.counters.record_hit(),
            Lookup::Miss => self.counters.record_miss(),
            Lookup::Expired => {
                self.counters.record_miss();
                self.counters.record_expirations(1);
                self.counters.set_entries(store.len());
            }
        }
        lookup.into_option()
    }

    // == Set ==
    /// Stores a value with the cache's default TTL.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.insert(key.into(), value, None).await;
    }

    /// Stores a value with an explicit TTL.
    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.insert(key.into(), value, Some(ttl)).await;
    }

    async fn insert(&self, key: String, value: V, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }

        let mut store = self.store.write().await;
        let outcome = store.set(key, value, ttl);
        if outcome.expired > 0 {
            self.counters.record_expirations(outcome.expired);
        }
        if let Some(evicted) = outcome.evicted {
            debug!(cache = %self.name, key = %evicted, "LRU eviction");
            self.counters.record_evictions(1);
        }
        self.counters.set_entries(store.len());
    }

    // == Has ==
    /// Liveness check without hit/miss accounting or recency refresh.
    pub async fn has(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let mut store = self.store.write().await;
        match store.probe(key) {
            Lookup::Hit(()) => true,
            Lookup::Miss => false,
            Lookup::Expired => {
                self.counters.record_expirations(1);
                self.counters.set_entries(store.len());
                false
            }
        }
    }

    // == Get Or Set ==
    /// Returns the cached value, or computes, stores and returns it.
    pub async fn get_or_set<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_set_with_ttl(key, None, compute).await
    }

    pub async fn get_or_set_with_ttl<F, Fut>(&self, key: &str, ttl: Option<Duration>, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let result = self
            .try_get_or_set_with_ttl(key, ttl, || async move {
                Ok::<V, Infallible>(compute().await)
            })
            .await;
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Fallible `get_or_set`. Errors are returned to the caller and not cached.
    pub async fn try_get_or_set<F, Fut, E>(&self, key: &str, compute: F) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        self.try_get_or_set_with_ttl(key, None, compute).await
    }

    /// Concurrent callers for the same key wait on one in-flight computation
    /// and then read its stored result.
    pub async fn try_get_or_set_with_ttl<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if !self.config.enabled {
            return compute().await;
        }
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let claim = InFlightClaim::join(&self.in_flight, key);
        let _turn = claim.key_lock.lock().await;

        // Populated by the caller we waited behind
        if let Some(value) = self.populated(key).await {
            return Ok(value);
        }

        let computed = compute().await;
        if let Ok(value) = &computed {
            self.insert(key.to_string(), value.clone(), ttl).await;
        }
        computed
    }

    /// Re-check after waiting for the key's turn. A miss here is not counted,
    /// the caller already recorded one.
    async fn populated(&self, key: &str) -> Option<V> {
        let mut store = self.store.write().await;
        match store.get(key) {
            Lookup::Hit(value) => {
                self.counters.record_hit();
                Some(value)
            }
            Lookup::Miss => None,
            Lookup::Expired => {
                self.counters.record_expirations(1);
                self.counters.set_entries(store.len());
                None
            }
        }
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> bool {
        let mut store = self.store.write().await;
        let removed = store.delete(key);
        if removed {
            self.counters.record_invalidations(1);
            self.counters.set_entries(store.len());
        }
        removed
    }

    /// Removes every entry. Statistics are kept.
    pub async fn clear(&self) -> usize {
        let mut store = self.store.write().await;
        let removed = store.clear();
        self.counters.record_invalidations(removed);
        self.counters.set_entries(0);
        removed
    }

    pub async fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        let mut store = self.store.write().await;
        let removed = store.remove_matching(pattern);
        self.counters.record_invalidations(removed);
        self.counters.set_entries(store.len());
        removed
    }

    pub async fn shed_oldest(&self, percent: u8) -> usize {
        let mut store = self.store.write().await;
        let count = store.len() * usize::from(percent.min(100)) / 100;
        let removed = store.shed_oldest(count);
        self.counters.record_evictions(removed);
        self.counters.set_entries(store.len());
        removed
    }

    pub async fn cleanup_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let removed = store.cleanup_expired();
        self.counters.record_expirations(removed);
        self.counters.set_entries(store.len());
        removed
    }

    pub async fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.store.read().await.entry_info(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        self.store.read().await.keys()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> ManagedCache for Cache<V> {
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn config(&self) -> &CacheConfig {
        Cache::config(self)
    }

    fn stats(&self) -> CacheStats {
        Cache::stats(self)
    }

    async fn len(&self) -> usize {
        Cache::len(self).await
    }

    async fn delete(&self, key: &str) -> bool {
        Cache::delete(self, key).await
    }

    async fn clear(&self) -> usize {
        Cache::clear(self).await
    }

    async fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        Cache::remove_matching(self, pattern).await
    }

    async fn shed_oldest(&self, percent: u8) -> usize {
        Cache::shed_oldest(self, percent).await
    }

    async fn cleanup_expired(&self) -> usize {
        Cache::cleanup_expired(self).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(max_entries: usize) -> Cache<String> {
        let stats = StatsCollector::new();
        Cache::new("entity-lookup", CacheConfig::new(true, 300, max_entries), &stats).unwrap()
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let stats = StatsCollector::new();
        assert!(Cache::<String>::new("bad", CacheConfig::new(true, 300, 0), &stats).is_err());
        assert!(Cache::<String>::new("bad", CacheConfig::new(true, 0, 10), &stats).is_err());
    }

    #[tokio::test]
    async fn test_set_get_records_stats() {
        let cache = cache(10);
        cache.set("node:a", "A".to_string()).await;

        assert_eq!(cache.get("node:a").await.as_deref(), Some("A"));
        assert_eq!(cache.get("node:b").await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_lru_scenario() {
        let cache = cache(3);
        for key in ["A", "B", "C"] {
            cache.set(key, key.to_string()).await;
        }
        cache.get("A").await;
        cache.set("D", "D".to_string()).await;

        assert!(cache.get("B").await.is_none());
        for key in ["A", "C", "D"] {
            assert_eq!(cache.get(key).await.as_deref(), Some(key));
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_absent_without_sweep() {
        let cache = cache(10);
        cache
            .set_with_ttl("k", "v".to_string(), Duration::from_millis(50))
            .await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get("k").await.is_none());
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_has_does_not_count_lookups() {
        let cache = cache(10);
        cache.set("k", "v".to_string()).await;

        assert!(cache.has("k").await);
        assert!(!cache.has("missing").await);
        let stats = cache.stats();
        assert_eq!(stats.lookups(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = cache(10);
        cache.set("a", "1".to_string()).await;
        cache.set("b", "2".to_string()).await;

        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);
        cache.get("b").await;
        assert_eq!(cache.clear().await, 1);
        assert!(cache.is_empty().await);
        assert_eq!(cache.stats().hits, 1, "clear keeps statistics");
    }

    #[tokio::test]
    async fn test_get_or_set_populates_once() {
        let cache = cache(10);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set("search:foo", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "result".to_string()
                })
                .await;
            assert_eq!(value, "result");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.has("search:foo").await);
    }

    #[tokio::test]
    async fn test_get_or_set_collapses_concurrent_callers() {
        let cache = Arc::new(cache(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("node:slow", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "computed".to_string()
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "computed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().unwrap().is_empty());
        let stats = cache.stats();
        assert_eq!(stats.misses, 8);
        assert_eq!(stats.hits, 7, "waiters read the stored value");
    }

    #[tokio::test]
    async fn test_cancelled_get_or_set_releases_in_flight_slot() {
        let cache = cache(100);

        for i in 0..20 {
            let attempt = tokio::time::timeout(
                Duration::from_millis(1),
                cache.get_or_set(&format!("node:{}", i), || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late".to_string()
                }),
            )
            .await;
            assert!(attempt.is_err());
        }

        assert!(cache.in_flight.lock().unwrap().is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_slot_for_populator() {
        let cache = Arc::new(cache(10));

        let populator = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("search:slow", || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        "computed".to_string()
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(5),
            cache.get_or_set("search:slow", || async { "unused".to_string() }),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(cache.in_flight.lock().unwrap().len(), 1);

        assert_eq!(populator.await.unwrap(), "computed");
        assert!(cache.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_slot_reused_before_eviction() {
        let cache = cache(2);
        cache.set("live", "L".to_string()).await;
        cache
            .set_with_ttl("dead", "D".to_string(), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        cache.set("new", "N".to_string()).await;

        assert_eq!(cache.get("live").await.as_deref(), Some("L"));
        assert_eq!(cache.get("new").await.as_deref(), Some("N"));
        let stats = cache.stats();
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.total_entries, 2);
    }

    #[tokio::test]
    async fn test_try_get_or_set_does_not_cache_errors() {
        let cache = cache(10);

        let failed: std::result::Result<String, &str> =
            cache.try_get_or_set("k", || async { Err("upstream down") }).await;
        assert_eq!(failed, Err("upstream down"));
        assert!(!cache.has("k").await);

        let ok: std::result::Result<String, &str> =
            cache.try_get_or_set("k", || async { Ok("v".to_string()) }).await;
        assert_eq!(ok.as_deref(), Ok("v"));
        assert!(cache.has("k").await);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_pass_through() {
        let stats = StatsCollector::new();
        let cache: Cache<String> =
            Cache::new("off", CacheConfig::new(false, 300, 10), &stats).unwrap();
        let calls = AtomicUsize::new(0);

        cache.set("k", "v".to_string()).await;
        assert!(cache.get("k").await.is_none());

        for _ in 0..2 {
            cache
                .get_or_set("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "v".to_string()
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shed_oldest_percent() {
        let cache = cache(200);
        for i in 0..100 {
            cache.set(format!("k{}", i), i.to_string()).await;
        }
        cache.get("k0").await;

        assert_eq!(cache.shed_oldest(30).await, 30);
        assert_eq!(cache.len().await, 70);
        assert!(cache.has("k0").await, "recently read entry survives");
        assert!(!cache.has("k1").await);
        assert!(cache.has("k31").await);
    }

    #[tokio::test]
    async fn test_managed_cache_trait_object() {
        let cache: Arc<dyn ManagedCache> = Arc::new(cache(10));
        let pattern = KeyPattern::parse("node:*").unwrap();

        assert_eq!(cache.name(), "entity-lookup");
        assert_eq!(cache.remove_matching(&pattern).await, 0);
        assert_eq!(cache.len().await, 0);
    }
}
