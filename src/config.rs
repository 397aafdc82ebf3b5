//! Configuration Module
//!
//! Handles loading and validating cache, pool and server configuration from
//! environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::pressure::PressurePolicy;

// == Cache Config ==
/// Per-cache policy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false the cache stores nothing and every lookup misses
    pub enabled: bool,
    /// TTL in seconds for entries stored without an explicit one
    pub default_ttl: u64,
    /// Maximum number of live entries
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn new(enabled: bool, default_ttl: u64, max_entries: usize) -> Self {
        Self {
            enabled,
            default_ttl,
            max_entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_ttl == 0 {
            return Err(CacheError::Configuration(
                "default TTL must be at least one second".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(CacheError::Configuration(
                "max entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(true, 300, 1000)
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Individual catalog entity lookups
    pub entity_cache: CacheConfig,
    /// Search result pages
    pub search_cache: CacheConfig,
    /// Artifacts derived from catalog entries
    pub artifact_cache: CacheConfig,
    /// TTL sweep interval in seconds
    pub sweep_interval: u64,
    /// Memory pressure check interval in seconds
    pub pressure_check_interval: u64,
    /// Interval for applying time-based rules in seconds (0 = never)
    pub time_based_interval: u64,
    /// Pressure thresholds and shed size
    pub pressure: PressurePolicy,
    /// Memory budget in megabytes the pressure ratio is measured against (0 = host total)
    pub memory_budget_mb: u64,
    /// Maximum pooled connections
    pub pool_max_size: usize,
    /// Pooled operations slower than this are logged, in milliseconds
    pub slow_operation_ms: u64,
    /// A bulk sync older than this is reported stale, in hours
    pub sync_staleness_hours: u64,
    /// Whether change events clear caches
    pub auto_invalidation: bool,
    /// HTTP server port for the ops surface
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENABLED` - Master switch for every cache (default: true)
    /// - `ENTITY_CACHE_TTL` / `ENTITY_CACHE_MAX_ENTRIES` (default: 3600 / 5000)
    /// - `SEARCH_CACHE_TTL` / `SEARCH_CACHE_MAX_ENTRIES` (default: 300 / 1000)
    /// - `ARTIFACT_CACHE_TTL` / `ARTIFACT_CACHE_MAX_ENTRIES` (default: 1800 / 500)
    /// - `SWEEP_INTERVAL` - TTL sweep frequency in seconds (default: 60)
    /// - `PRESSURE_CHECK_INTERVAL` - Pressure check frequency in seconds (default: 30)
    /// - `TIME_BASED_INTERVAL` - Time-based rule frequency in seconds, 0 disables (default: 0)
    /// - `PRESSURE_SOFT_RATIO` / `PRESSURE_CRITICAL_RATIO` (default: 0.80 / 0.90)
    /// - `PRESSURE_SHED_PERCENT` - Share of entries shed under soft pressure (default: 30)
    /// - `MEMORY_BUDGET_MB` - Memory budget, 0 uses host memory (default: 0)
    /// - `POOL_MAX_SIZE` - Maximum pooled connections (default: 8)
    /// - `SLOW_OPERATION_MS` - Slow pooled operation threshold (default: 100)
    /// - `SYNC_STALENESS_HOURS` - Bulk sync freshness window (default: 24)
    /// - `AUTO_INVALIDATION` - Apply rules on change events (default: true)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = env_or("CACHE_ENABLED", true);

        Self {
            entity_cache: CacheConfig::new(
                enabled,
                env_or("ENTITY_CACHE_TTL", defaults.entity_cache.default_ttl),
                env_or("ENTITY_CACHE_MAX_ENTRIES", defaults.entity_cache.max_entries),
            ),
            search_cache: CacheConfig::new(
                enabled,
                env_or("SEARCH_CACHE_TTL", defaults.search_cache.default_ttl),
                env_or("SEARCH_CACHE_MAX_ENTRIES", defaults.search_cache.max_entries),
            ),
            artifact_cache: CacheConfig::new(
                enabled,
                env_or("ARTIFACT_CACHE_TTL", defaults.artifact_cache.default_ttl),
                env_or("ARTIFACT_CACHE_MAX_ENTRIES", defaults.artifact_cache.max_entries),
            ),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            pressure_check_interval: env_or(
                "PRESSURE_CHECK_INTERVAL",
                defaults.pressure_check_interval,
            ),
            time_based_interval: env_or("TIME_BASED_INTERVAL", defaults.time_based_interval),
            pressure: PressurePolicy {
                soft_ratio: env_or("PRESSURE_SOFT_RATIO", defaults.pressure.soft_ratio),
                critical_ratio: env_or(
                    "PRESSURE_CRITICAL_RATIO",
                    defaults.pressure.critical_ratio,
                ),
                shed_percent: env_or("PRESSURE_SHED_PERCENT", defaults.pressure.shed_percent),
            },
            memory_budget_mb: env_or("MEMORY_BUDGET_MB", defaults.memory_budget_mb),
            pool_max_size: env_or("POOL_MAX_SIZE", defaults.pool_max_size),
            slow_operation_ms: env_or("SLOW_OPERATION_MS", defaults.slow_operation_ms),
            sync_staleness_hours: env_or("SYNC_STALENESS_HOURS", defaults.sync_staleness_hours),
            auto_invalidation: env_or("AUTO_INVALIDATION", defaults.auto_invalidation),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    // == Validate ==
    /// Rejects configurations the caches, monitor or pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.entity_cache.validate()?;
        self.search_cache.validate()?;
        self.artifact_cache.validate()?;
        self.pressure.validate()?;

        if self.sweep_interval == 0 || self.pressure_check_interval == 0 {
            return Err(CacheError::Configuration(
                "background task intervals must be at least one second".to_string(),
            ));
        }
        if self.pool_max_size == 0 {
            return Err(CacheError::Configuration(
                "pool max size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn slow_operation_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_operation_ms)
    }

    pub fn sync_staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(self.sync_staleness_hours.min(1_000_000) as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity_cache: CacheConfig::new(true, 3600, 5000),
            search_cache: CacheConfig::new(true, 300, 1000),
            artifact_cache: CacheConfig::new(true, 1800, 500),
            sweep_interval: 60,
            pressure_check_interval: 30,
            time_based_interval: 0,
            pressure: PressurePolicy::default(),
            memory_budget_mb: 0,
            pool_max_size: 8,
            slow_operation_ms: 100,
            sync_staleness_hours: 24,
            auto_invalidation: true,
            server_port: 3000,
        }
    }
}

/// Parses `name` from the environment, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.entity_cache, CacheConfig::new(true, 3600, 5000));
        assert_eq!(config.sweep_interval, 60);
        assert_eq!(config.pressure_check_interval, 30);
        assert_eq!(config.pressure.shed_percent, 30);
        assert_eq!(config.slow_operation_threshold(), Duration::from_millis(100));
        assert_eq!(config.sync_staleness(), chrono::Duration::hours(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        for name in [
            "CACHE_ENABLED",
            "ENTITY_CACHE_TTL",
            "SWEEP_INTERVAL",
            "POOL_MAX_SIZE",
            "SERVER_PORT",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert!(config.entity_cache.enabled);
        assert_eq!(config.entity_cache.default_ttl, 3600);
        assert_eq!(config.sweep_interval, 60);
        assert_eq!(config.pool_max_size, 8);
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        env::set_var("CATALOG_CACHE_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("CATALOG_CACHE_TEST_GARBAGE", 7u64), 7);
        env::set_var("CATALOG_CACHE_TEST_GARBAGE", " 42 ");
        assert_eq!(env_or("CATALOG_CACHE_TEST_GARBAGE", 7u64), 42);
        env::remove_var("CATALOG_CACHE_TEST_GARBAGE");
    }

    #[test]
    fn test_cache_config_validation() {
        assert!(CacheConfig::new(true, 0, 10).validate().is_err());
        assert!(CacheConfig::new(true, 10, 0).validate().is_err());
        assert!(CacheConfig::new(false, 10, 10).validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.pool_max_size = 0;
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));

        let mut config = Config::default();
        config.pressure.soft_ratio = 0.95;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sweep_interval = 0;
        assert!(config.validate().is_err());
    }
}
