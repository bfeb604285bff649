//! Auto-Prune Task
//!
//! Background task that periodically removes expired entries from a shared engine.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheEngine;

/// Spawns a task that calls `CacheEngine::auto_prune` every `interval`.
///
/// Each tick holds the write lock for the whole pass, so ticks never overlap
/// with each other or with other writers. The task runs until its handle is
/// aborted.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(RwLock::new(CacheEngine::new(CacheConfig::default())?));
/// let handle = spawn_auto_prune_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_auto_prune_task<K, V>(
    cache: Arc<RwLock<CacheEngine<K, V>>>,
    interval: Duration,
) -> JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "starting auto-prune task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = {
                let mut engine = cache.write().await;
                engine.auto_prune()
            };

            if removed > 0 {
                info!("auto-prune: removed {} expired entries", removed);
            } else {
                debug!("auto-prune: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SetOptions;
    use crate::config::CacheConfig;
    use crate::events::{CacheEvent, EventKind};
    use std::sync::Mutex;

    fn shared() -> Arc<RwLock<CacheEngine<String, String>>> {
        Arc::new(RwLock::new(CacheEngine::new(CacheConfig::default()).unwrap()))
    }

    #[tokio::test]
    async fn test_auto_prune_removes_expired_entries() {
        let cache = shared();
        {
            let mut engine = cache.write().await;
            let short = SetOptions::new().with_ttl(Duration::from_millis(20));
            engine
                .set("expire_soon".to_string(), "v".to_string(), short.clone())
                .unwrap();
            engine
                .namespace("ns")
                .unwrap()
                .set("nested".to_string(), "v".to_string(), short)
                .unwrap();
        }

        let handle = spawn_auto_prune_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        {
            let engine = cache.read().await;
            assert_eq!(engine.len(), 0, "expired entry should have been pruned");
            assert_eq!(engine.get_namespace("ns").unwrap().len(), 0);
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_auto_prune_preserves_live_entries_and_emits() {
        let cache = shared();
        let counts = Arc::new(Mutex::new(Vec::new()));
        {
            let mut engine = cache.write().await;
            engine
                .set("long_lived".to_string(), "v".to_string(), SetOptions::default())
                .unwrap();
            let sink = counts.clone();
            engine.on(EventKind::AutoPrune, move |event| {
                if let CacheEvent::AutoPrune { count } = event {
                    sink.lock().unwrap().push(*count);
                }
                Ok(())
            });
        }

        let handle = spawn_auto_prune_task(cache.clone(), Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(cache.read().await.peek("long_lived").is_some());
        let counts = counts.lock().unwrap();
        assert!(!counts.is_empty(), "auto-prune should have ticked");
        assert!(counts.iter().all(|count| *count == 0));
    }

    #[tokio::test]
    async fn test_auto_prune_task_can_be_aborted() {
        let handle = spawn_auto_prune_task(shared(), Duration::from_millis(10));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished(), "task should be finished after abort");
    }
}
