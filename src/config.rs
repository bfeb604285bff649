//! Configuration Module
//!
//! Handles loading, validating and defaulting cache engine configuration.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Eviction Strategy ==
/// Policy used to pick a victim when a new key arrives at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionStrategy {
    /// Oldest recency first
    #[default]
    Lru,
    /// Oldest insertion first; reads never change the order
    Fifo,
    /// Newest recency first
    Mfu,
    /// Caller-supplied victim selection
    Custom,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "LRU",
            EvictionStrategy::Fifo => "FIFO",
            EvictionStrategy::Mfu => "MFU",
            EvictionStrategy::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LRU" => Ok(EvictionStrategy::Lru),
            "FIFO" => Ok(EvictionStrategy::Fifo),
            "MFU" => Ok(EvictionStrategy::Mfu),
            "CUSTOM" => Ok(EvictionStrategy::Custom),
            other => Err(CacheError::Configuration(format!(
                "unknown eviction strategy: {}",
                other
            ))),
        }
    }
}

/// Cache engine configuration parameters.
///
/// Namespaces created from an engine inherit a copy of its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of live entries before eviction triggers
    pub limit: usize,
    /// TTL applied when a write specifies none
    pub default_ttl: Option<Duration>,
    /// Whether `get` refreshes recency
    pub update_on_get: bool,
    /// Whether `has` refreshes recency
    pub update_on_has: bool,
    /// Whether `set` may replace an existing key
    pub over_write: bool,
    /// Eviction policy
    pub strategy: EvictionStrategy,
    /// Period of the background prune task, None = disabled
    pub auto_prune_interval: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_LIMIT` - Maximum live entries (default: 100)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds, 0 = none (default: none)
    /// - `CACHE_UPDATE_ON_GET` - Refresh recency on get (default: true)
    /// - `CACHE_UPDATE_ON_HAS` - Refresh recency on has (default: false)
    /// - `CACHE_OVERWRITE` - Allow overwriting existing keys (default: true)
    /// - `CACHE_STRATEGY` - One of LRU, FIFO, MFU, CUSTOM (default: LRU)
    /// - `CACHE_AUTO_PRUNE_MS` - Auto-prune interval in milliseconds, 0 = off (default: off)
    ///
    /// Unlike a missing variable, a variable that is set but unparseable is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            limit: env_parse("CACHE_LIMIT")?.unwrap_or(defaults.limit),
            default_ttl: env_parse::<u64>("CACHE_DEFAULT_TTL_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            update_on_get: env_parse("CACHE_UPDATE_ON_GET")?.unwrap_or(defaults.update_on_get),
            update_on_has: env_parse("CACHE_UPDATE_ON_HAS")?.unwrap_or(defaults.update_on_has),
            over_write: env_parse("CACHE_OVERWRITE")?.unwrap_or(defaults.over_write),
            strategy: env_parse("CACHE_STRATEGY")?.unwrap_or(defaults.strategy),
            auto_prune_interval: env_parse::<u64>("CACHE_AUTO_PRUNE_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        };

        config.validate()?;
        Ok(config)
    }

    // == Builder Helpers ==
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_update_on_get(mut self, enabled: bool) -> Self {
        self.update_on_get = enabled;
        self
    }

    pub fn with_update_on_has(mut self, enabled: bool) -> Self {
        self.update_on_has = enabled;
        self
    }

    pub fn with_over_write(mut self, enabled: bool) -> Self {
        self.over_write = enabled;
        self
    }

    pub fn with_auto_prune(mut self, interval: Duration) -> Self {
        self.auto_prune_interval = Some(interval);
        self
    }

    // == Validate ==
    /// Checks the invariants that do not depend on a custom evictor.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(CacheError::Configuration(
                "limit must be a positive integer".to_string(),
            ));
        }
        if matches!(self.auto_prune_interval, Some(interval) if interval.is_zero()) {
            return Err(CacheError::Configuration(
                "auto-prune interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            default_ttl: None,
            update_on_get: true,
            update_on_has: false,
            over_write: true,
            strategy: EvictionStrategy::Lru,
            auto_prune_interval: None,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            CacheError::Configuration(format!("invalid value for {}: {:?}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.limit, 100);
        assert!(config.default_ttl.is_none());
        assert!(config.update_on_get);
        assert!(!config.update_on_has);
        assert!(config.over_write);
        assert_eq!(config.strategy, EvictionStrategy::Lru);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        // All env manipulation lives in this one test to avoid races between tests
        for name in [
            "CACHE_LIMIT",
            "CACHE_DEFAULT_TTL_MS",
            "CACHE_UPDATE_ON_GET",
            "CACHE_UPDATE_ON_HAS",
            "CACHE_OVERWRITE",
            "CACHE_STRATEGY",
            "CACHE_AUTO_PRUNE_MS",
        ] {
            env::remove_var(name);
        }

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config, CacheConfig::default());

        env::set_var("CACHE_LIMIT", "5");
        env::set_var("CACHE_STRATEGY", "fifo");
        env::set_var("CACHE_DEFAULT_TTL_MS", "1500");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.limit, 5);
        assert_eq!(config.strategy, EvictionStrategy::Fifo);
        assert_eq!(config.default_ttl, Some(Duration::from_millis(1500)));

        env::set_var("CACHE_STRATEGY", "random");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(CacheError::Configuration(_))
        ));
        env::remove_var("CACHE_STRATEGY");

        env::set_var("CACHE_LIMIT", "0");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(CacheError::Configuration(_))
        ));

        env::set_var("CACHE_LIMIT", "lots");
        assert!(matches!(
            CacheConfig::from_env(),
            Err(CacheError::Configuration(_))
        ));

        env::remove_var("CACHE_LIMIT");
        env::remove_var("CACHE_DEFAULT_TTL_MS");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("LRU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" mfu ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Mfu);
        assert_eq!(
            "Custom".parse::<EvictionStrategy>().unwrap(),
            EvictionStrategy::Custom
        );
        assert!("LFU".parse::<EvictionStrategy>().is_err());
        assert_eq!(EvictionStrategy::Fifo.to_string(), "FIFO");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = CacheConfig::default().with_limit(0);
        assert!(matches!(config.validate(), Err(CacheError::Configuration(_))));
    }
}
