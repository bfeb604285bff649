//! Shared Cache Handle
//!
//! Cloneable handle that lets several tasks drive one engine, plus the on/off
//! switch for the auto-prune task.

use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheEngine;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_auto_prune_task;

/// Running auto-prune task. Aborted when dropped.
#[derive(Debug)]
struct AutoPruneHandle(JoinHandle<()>);

impl Drop for AutoPruneHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// == Shared Cache ==
/// `Arc<RwLock<CacheEngine>>` handle. Every mutation goes through the write
/// lock, so auto-prune ticks and writers never interleave.
#[derive(Debug)]
pub struct SharedCache<K = String, V = String> {
    engine: Arc<RwLock<CacheEngine<K, V>>>,
    auto_prune: Arc<Mutex<Option<AutoPruneHandle>>>,
}

impl<K, V> Clone for SharedCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            auto_prune: Arc::clone(&self.auto_prune),
        }
    }
}

impl<K, V> SharedCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Wraps an engine. When its configuration carries an auto-prune interval
    /// and a tokio runtime is available, the task starts right away.
    pub fn new(engine: CacheEngine<K, V>) -> Self {
        let interval = engine.config().auto_prune_interval;
        let shared = Self {
            engine: Arc::new(RwLock::new(engine)),
            auto_prune: Arc::new(Mutex::new(None)),
        };

        if let Some(interval) = interval {
            if let Err(err) = shared.start_auto_prune(interval) {
                warn!(error = %err, "auto-prune not started");
            }
        }
        shared
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, CacheEngine<K, V>> {
        self.engine.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, CacheEngine<K, V>> {
        self.engine.write().await
    }

    /// The underlying lock, for callers that manage guards themselves.
    pub fn engine(&self) -> Arc<RwLock<CacheEngine<K, V>>> {
        Arc::clone(&self.engine)
    }

    // == Auto-Prune ==
    /// Starts the periodic prune task. Returns `Ok(false)` when it is already
    /// running.
    ///
    /// Fails with `Configuration` for a zero interval or when called outside a
    /// tokio runtime.
    pub fn start_auto_prune(&self, interval: Duration) -> Result<bool> {
        if interval.is_zero() {
            return Err(CacheError::Configuration(
                "auto-prune interval must be greater than 0".to_string(),
            ));
        }
        Handle::try_current().map_err(|err| {
            CacheError::Configuration(format!("auto-prune needs a tokio runtime: {}", err))
        })?;

        let mut running = self
            .auto_prune
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if running.is_some() {
            return Ok(false);
        }

        *running = Some(AutoPruneHandle(spawn_auto_prune_task(
            self.engine(),
            interval,
        )));
        debug!("auto-prune started");
        Ok(true)
    }

    /// Stops the periodic prune task. Returns whether one was running.
    pub fn stop_auto_prune(&self) -> bool {
        let stopped = self
            .auto_prune
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        if stopped {
            debug!("auto-prune stopped");
        }
        stopped
    }

    pub fn is_auto_pruning(&self) -> bool {
        self.auto_prune
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::config::CacheConfig;

    fn engine(config: CacheConfig) -> CacheEngine<String, String> {
        CacheEngine::new(config).unwrap()
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let shared = SharedCache::new(engine(CacheConfig::default()));

        let result = shared.start_auto_prune(Duration::from_millis(10));
        assert!(matches!(result, Err(CacheError::Configuration(_))));
        assert!(!shared.is_auto_pruning());
    }

    #[test]
    fn test_configured_interval_outside_runtime_is_skipped() {
        let config = CacheConfig::default().with_auto_prune(Duration::from_millis(10));
        let shared = SharedCache::new(engine(config));
        assert!(!shared.is_auto_pruning());
    }

    #[test]
    fn test_clones_share_the_engine() {
        let shared = SharedCache::new(engine(CacheConfig::default()));
        let other = shared.clone();

        tokio_test::block_on(async {
            shared
                .write()
                .await
                .set("k".to_string(), "v".to_string(), SetOptions::default())
                .unwrap();
            assert_eq!(other.read().await.peek("k"), Some(&"v".to_string()));
        });
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let shared = SharedCache::new(engine(CacheConfig::default()));

        assert!(shared.start_auto_prune(Duration::from_millis(10)).unwrap());
        assert!(!shared.start_auto_prune(Duration::from_millis(10)).unwrap());
        assert!(shared.is_auto_pruning());
        assert!(shared.clone().is_auto_pruning());

        assert!(shared.stop_auto_prune());
        assert!(!shared.stop_auto_prune());
        assert!(!shared.is_auto_pruning());
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let shared = SharedCache::new(engine(CacheConfig::default()));
        assert!(shared.start_auto_prune(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn test_configured_interval_prunes() {
        let config = CacheConfig::default().with_auto_prune(Duration::from_millis(20));
        let shared = SharedCache::new(engine(config));
        assert!(shared.is_auto_pruning());

        shared
            .write()
            .await
            .set(
                "short".to_string(),
                "v".to_string(),
                SetOptions::new().with_ttl(Duration::from_millis(10)),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(shared.read().await.len(), 0);
        shared.stop_auto_prune();
    }
}
