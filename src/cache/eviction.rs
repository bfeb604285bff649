//! Eviction Policy Module
//!
//! Selects exactly one victim among the current entries when a new key arrives
//! at capacity.

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use crate::cache::CacheEntry;
use crate::config::EvictionStrategy;
use crate::error::{CacheError, Result};

// == Candidate ==
/// Read-only view of one entry offered to the eviction policy.
#[derive(Debug)]
pub struct Candidate<'a, K, V> {
    pub key: &'a K,
    pub value: &'a V,
    /// Last recency timestamp (Unix milliseconds)
    pub recorded_at: u64,
    /// Deadline (Unix milliseconds), if any
    pub expires_at: Option<u64>,
    pub priority: i64,
    touched: u64,
    inserted: u64,
}

impl<'a, K, V> Candidate<'a, K, V> {
    pub(crate) fn from_entry(key: &'a K, entry: &'a CacheEntry<V>) -> Self {
        Self {
            key,
            value: &entry.value,
            recorded_at: entry.recorded_at,
            expires_at: entry.expires_at,
            priority: entry.priority,
            touched: entry.touched,
            inserted: entry.inserted,
        }
    }
}

/// Caller-supplied victim selection for `EvictionStrategy::Custom`.
///
/// Receives every entry in insertion order and returns the key to evict.
pub type CustomEvictFn<K, V> =
    Arc<dyn for<'a> Fn(&[Candidate<'a, K, V>]) -> Option<K> + Send + Sync>;

// == Eviction Policy ==
/// Victim selection for one engine and its namespaces.
///
/// Built-in strategies rank by ascending priority first; recency only breaks
/// ties among equal priorities. Remaining ties go to the oldest insertion.
pub struct EvictionPolicy<K, V> {
    strategy: EvictionStrategy,
    custom: Option<CustomEvictFn<K, V>>,
}

impl<K, V> Clone for EvictionPolicy<K, V> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy,
            custom: self.custom.clone(),
        }
    }
}

impl<K, V> fmt::Debug for EvictionPolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvictionPolicy")
            .field("strategy", &self.strategy)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl<K: Clone, V> EvictionPolicy<K, V> {
    // == Constructor ==
    /// Fails when `Custom` is requested without a callback.
    pub fn new(strategy: EvictionStrategy, custom: Option<CustomEvictFn<K, V>>) -> Result<Self> {
        if strategy == EvictionStrategy::Custom && custom.is_none() {
            return Err(CacheError::Configuration(
                "CUSTOM strategy requires a custom evict function".to_string(),
            ));
        }
        Ok(Self { strategy, custom })
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    // == Select ==
    /// Picks the victim key, or None when there is nothing to evict or a custom
    /// policy declines.
    pub fn select(&self, candidates: &[Candidate<'_, K, V>]) -> Option<K> {
        let victim = match self.strategy {
            EvictionStrategy::Lru => candidates
                .iter()
                .min_by_key(|c| (c.priority, c.recorded_at, c.touched)),
            EvictionStrategy::Fifo => candidates.iter().min_by_key(|c| (c.priority, c.inserted)),
            EvictionStrategy::Mfu => candidates
                .iter()
                .min_by_key(|c| (c.priority, Reverse(c.recorded_at), Reverse(c.touched))),
            EvictionStrategy::Custom => {
                return self.custom.as_ref().and_then(|custom| custom(candidates));
            }
        };
        victim.map(|c| c.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(recorded_at: u64, priority: i64, touched: u64, inserted: u64) -> CacheEntry<i32> {
        let mut entry = CacheEntry::new(0, recorded_at, None, inserted);
        entry.priority = priority;
        entry.touched = touched;
        entry
    }

    fn pick(strategy: EvictionStrategy, entries: &[(&'static str, CacheEntry<i32>)]) -> String {
        let policy = EvictionPolicy::<&'static str, i32>::new(strategy, None).unwrap();
        let candidates: Vec<_> = entries
            .iter()
            .map(|(key, entry)| Candidate::from_entry(key, entry))
            .collect();
        policy.select(&candidates).unwrap().to_string()
    }

    #[test]
    fn test_lru_picks_oldest_recency() {
        let entries = [
            ("a", entry(100, 0, 5, 1)),
            ("b", entry(50, 0, 2, 2)),
            ("c", entry(200, 0, 6, 3)),
        ];
        assert_eq!(pick(EvictionStrategy::Lru, &entries), "b");
    }

    #[test]
    fn test_lru_same_millisecond_uses_sequence() {
        let entries = [("a", entry(100, 0, 4, 1)), ("b", entry(100, 0, 2, 2))];
        assert_eq!(pick(EvictionStrategy::Lru, &entries), "b");
    }

    #[test]
    fn test_mfu_picks_newest_recency() {
        let entries = [
            ("a", entry(100, 0, 1, 1)),
            ("b", entry(300, 0, 3, 2)),
            ("c", entry(200, 0, 2, 3)),
        ];
        assert_eq!(pick(EvictionStrategy::Mfu, &entries), "b");
    }

    #[test]
    fn test_fifo_ignores_reads() {
        // "a" was read recently but was written first
        let entries = [("a", entry(900, 0, 9, 1)), ("b", entry(100, 0, 2, 2))];
        assert_eq!(pick(EvictionStrategy::Fifo, &entries), "a");
    }

    #[test]
    fn test_priority_is_a_hard_floor() {
        let entries = [
            ("old_important", entry(10, 5, 1, 1)),
            ("fresh_unimportant", entry(999, -1, 9, 9)),
        ];
        assert_eq!(pick(EvictionStrategy::Lru, &entries), "fresh_unimportant");
        assert_eq!(pick(EvictionStrategy::Fifo, &entries), "fresh_unimportant");

        let entries = [
            ("fresh_important", entry(999, 5, 9, 9)),
            ("old_unimportant", entry(10, 0, 1, 1)),
        ];
        assert_eq!(pick(EvictionStrategy::Mfu, &entries), "old_unimportant");
    }

    #[test]
    fn test_custom_requires_callback() {
        let result = EvictionPolicy::<String, i32>::new(EvictionStrategy::Custom, None);
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    fn first_z<'a>(candidates: &[Candidate<'a, &'static str, i32>]) -> Option<&'static str> {
        candidates
            .iter()
            .find(|c| c.key.starts_with('z'))
            .map(|c| *c.key)
    }

    #[test]
    fn test_custom_delegates() {
        let custom: CustomEvictFn<&'static str, i32> = Arc::new(first_z);
        let policy = EvictionPolicy::new(EvictionStrategy::Custom, Some(custom)).unwrap();

        let a = entry(1, 0, 1, 1);
        let z = entry(2, 0, 2, 2);
        let candidates = vec![Candidate::from_entry(&"a", &a), Candidate::from_entry(&"zed", &z)];
        assert_eq!(policy.select(&candidates), Some("zed"));
        assert_eq!(policy.select(&candidates[..1]), None);
    }

    #[test]
    fn test_empty_candidates() {
        let policy = EvictionPolicy::<String, i32>::new(EvictionStrategy::Lru, None).unwrap();
        assert!(policy.select(&[]).is_none());
    }
}
