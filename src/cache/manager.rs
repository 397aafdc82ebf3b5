//! Cache Manager Module
//!
//! Registry of the named caches a process runs with. Constructed once at
//! startup and shared by `Arc` with every consumer; owns the background
//! tasks and stops them on [`CacheManager::shutdown`]. Tracked tasks hold the
//! manager alive, so shutdown must be called explicitly.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{Cache, ManagedCache};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::stats::StatsCollector;

/// Cache name for individual catalog entity lookups
pub const ENTITY_LOOKUP: &str = "entity-lookup";
/// Cache name for search result pages
pub const SEARCH_RESULTS: &str = "search-results";
/// Cache name for artifacts derived from catalog entries
pub const DERIVED_ARTIFACTS: &str = "derived-artifacts";

// == Cache Manager ==
pub struct CacheManager {
    caches: DashMap<String, Arc<dyn ManagedCache>>,
    stats: Arc<StatsCollector>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheManager {
    pub fn new(stats: Arc<StatsCollector>) -> Self {
        Self {
            caches: DashMap::new(),
            stats,
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Create Cache ==
    /// Builds a typed cache and registers it under `name`.
    pub fn create_cache<V>(&self, name: &str, config: CacheConfig) -> Result<Arc<Cache<V>>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let cache = Arc::new(Cache::new(name, config, &self.stats)?);
        self.register(cache.clone())?;
        Ok(cache)
    }

    /// Registers an existing cache. Names must be unique.
    pub fn register(&self, cache: Arc<dyn ManagedCache>) -> Result<()> {
        match self.caches.entry(cache.name().to_string()) {
            Entry::Occupied(existing) => Err(CacheError::Configuration(format!(
                "cache '{}' is already registered",
                existing.key()
            ))),
            Entry::Vacant(slot) => {
                let config = *cache.config();
                info!(
                    cache = %slot.key(),
                    enabled = config.enabled,
                    ttl_secs = config.default_ttl,
                    max_entries = config.max_entries,
                    "Cache registered"
                );
                slot.insert(cache);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
        self.caches.get(name).map(|c| c.value().clone())
    }

    /// Every registered cache, ordered by name.
    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        let mut caches: Vec<_> = self.caches.iter().map(|c| c.value().clone()).collect();
        caches.sort_by(|a, b| a.name().cmp(b.name()));
        caches
    }

    pub fn names(&self) -> Vec<String> {
        self.caches().iter().map(|c| c.name().to_string()).collect()
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    /// Clears every registered cache. Returns the number of entries dropped.
    pub async fn clear_all(&self) -> usize {
        let mut removed = 0;
        for cache in self.caches() {
            removed += cache.clear().await;
        }
        removed
    }

    // == Background Tasks ==
    /// Keeps `handle` alive until shutdown.
    pub fn track_task(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    pub fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    // == Shutdown ==
    /// Stops every background task started for this manager.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        if handles.is_empty() {
            return;
        }
        for handle in &handles {
            handle.abort();
        }
        warn!(tasks = handles.len(), "Cache background tasks aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(StatsCollector::new()))
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let manager = manager();
        let entities = manager
            .create_cache::<String>(ENTITY_LOOKUP, CacheConfig::new(true, 300, 100))
            .unwrap();
        manager
            .create_cache::<Vec<String>>(SEARCH_RESULTS, CacheConfig::new(true, 60, 10))
            .unwrap();

        entities.set("node:a", "A".to_string()).await;

        let managed = manager.get(ENTITY_LOOKUP).unwrap();
        assert_eq!(managed.len().await, 1);
        assert!(manager.get("unknown").is_none());
        assert_eq!(manager.names(), vec![ENTITY_LOOKUP, SEARCH_RESULTS]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let manager = manager();
        manager
            .create_cache::<String>(ENTITY_LOOKUP, CacheConfig::default())
            .unwrap();
        let err = manager
            .create_cache::<String>(ENTITY_LOOKUP, CacheConfig::default())
            .unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_concurrent_registration_admits_one() {
        let manager = Arc::new(manager());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    manager
                        .create_cache::<String>(ENTITY_LOOKUP, CacheConfig::default())
                        .is_ok()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(manager.names(), vec![ENTITY_LOOKUP]);
    }

    #[tokio::test]
    async fn test_clear_all() {
        let manager = manager();
        let a = manager
            .create_cache::<u32>("a", CacheConfig::default())
            .unwrap();
        let b = manager
            .create_cache::<u32>("b", CacheConfig::default())
            .unwrap();
        a.set("x", 1).await;
        b.set("y", 2).await;
        b.set("z", 3).await;

        assert_eq!(manager.clear_all().await, 3);
        assert!(a.is_empty().await && b.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_tasks() {
        let manager = manager();
        manager.track_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));
        assert_eq!(manager.running_tasks(), 1);

        manager.shutdown();
        assert_eq!(manager.running_tasks(), 0);
    }
}
