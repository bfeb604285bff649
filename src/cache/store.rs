//! Entry Store Module
//!
//! Backing key/entry table with insertion order and a monotonic sequence clock.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use crate::cache::entry::deadline;
use crate::cache::{CacheEntry, InsertionOrder};

// == Entry Store ==
/// Key/value storage with per-entry metadata.
///
/// Knows nothing about tags, counters or events; the engine pairs every mutation
/// here with the matching tag index update.
#[derive(Debug)]
pub struct EntryStore<K, V> {
    /// Key-entry storage
    entries: HashMap<K, CacheEntry<V>>,
    /// Insertion order of live keys
    order: InsertionOrder<K>,
    /// Last issued sequence stamp
    seq: u64,
}

impl<K, V> Default for EntryStore<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: InsertionOrder::default(),
            seq: 0,
        }
    }
}

impl<K: Hash + Eq + Clone, V> EntryStore<K, V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_key_value(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    // == Upsert ==
    /// Writes a value, creating the entry or overwriting it in place.
    ///
    /// Overwrites keep the insertion position, reset recency and the deadline, and
    /// only change the priority when one is supplied. Returns true for a new key.
    pub fn upsert(
        &mut self,
        key: K,
        value: V,
        now: u64,
        ttl: Option<Duration>,
        priority: Option<i64>,
    ) -> bool {
        let seq = self.next_seq();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.recorded_at = now;
            entry.expires_at = deadline(now, ttl);
            entry.touched = seq;
            entry.inserted = seq;
            if let Some(priority) = priority {
                entry.priority = priority;
            }
            return false;
        }

        let mut entry = CacheEntry::new(value, now, ttl, seq);
        if let Some(priority) = priority {
            entry.priority = priority;
        }
        self.order.push(key.clone());
        self.entries.insert(key, entry);
        true
    }

    // == Insert Entry ==
    /// Inserts a prebuilt entry under a key that is not present yet.
    ///
    /// Used by rename and restore, which carry metadata over.
    pub fn insert_entry(&mut self, key: K, entry: CacheEntry<V>) {
        self.seq = self.seq.max(entry.touched).max(entry.inserted);
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push(key);
        }
    }

    // == Touch ==
    /// Refreshes the recency of a key. Returns false if the key is absent.
    pub fn touch<Q>(&mut self, key: &Q, now: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let seq = self.next_seq();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.touch(now, seq);
                true
            }
            None => false,
        }
    }

    // == Remove ==
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.remove_entry(key)?;
        self.order.remove(key);
        Some(removed)
    }

    // == Take Expired ==
    /// Removes the entry only if its deadline has passed at `now`.
    pub fn take_expired<Q>(&mut self, key: &Q, now: u64) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_expired_at(now));
        if expired {
            self.remove(key)
        } else {
            None
        }
    }

    /// Keys whose deadline has passed at `now`, in insertion order.
    pub fn expired_keys(&self, now: u64) -> Vec<K> {
        self.iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Iter ==
    /// Iterates entries from oldest to newest insertion.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &CacheEntry<V>)> {
        self.order
            .iter()
            .filter_map(move |key| self.entries.get_key_value(key))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn keys(store: &EntryStore<String, i32>) -> Vec<&str> {
        store.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_store_new() {
        let store: EntryStore<String, i32> = EntryStore::new();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_upsert_new_and_overwrite() {
        let mut store = EntryStore::new();

        assert!(store.upsert("a".to_string(), 1, 100, None, Some(5)));
        assert!(store.upsert("b".to_string(), 2, 100, None, None));
        assert!(!store.upsert("a".to_string(), 3, 200, None, None));

        let entry = store.get("a").unwrap();
        assert_eq!(entry.value, 3);
        assert_eq!(entry.recorded_at, 200);
        assert_eq!(entry.priority, 5, "priority kept when not supplied");
        assert_eq!(keys(&store), vec!["a", "b"], "overwrite keeps position");
    }

    #[test]
    fn test_upsert_clears_prior_deadline() {
        let mut store = EntryStore::new();

        store.upsert("a".to_string(), 1, 100, Some(Duration::from_millis(50)), None);
        assert_eq!(store.get("a").unwrap().expires_at, Some(150));

        store.upsert("a".to_string(), 2, 120, None, None);
        assert!(store.get("a").unwrap().expires_at.is_none());
    }

    #[test]
    fn test_touch_moves_recency_only() {
        let mut store = EntryStore::new();
        store.upsert("a".to_string(), 1, 100, None, None);
        let inserted = store.get("a").unwrap().inserted;

        assert!(store.touch("a", 300));
        assert!(!store.touch("missing", 300));

        let entry = store.get("a").unwrap();
        assert_eq!(entry.recorded_at, 300);
        assert_eq!(entry.inserted, inserted);
        assert!(entry.touched > inserted);
    }

    #[test]
    fn test_remove_and_order() {
        let mut store = EntryStore::new();
        store.upsert("a".to_string(), 1, 1, None, None);
        store.upsert("b".to_string(), 2, 1, None, None);
        store.upsert("c".to_string(), 3, 1, None, None);

        let (key, entry) = store.remove("b").unwrap();
        assert_eq!(key, "b");
        assert_eq!(entry.value, 2);
        assert!(store.remove("b").is_none());
        assert_eq!(keys(&store), vec!["a", "c"]);
    }

    #[test]
    fn test_take_expired_only_when_due() {
        let mut store = EntryStore::new();
        store.upsert("a".to_string(), 1, 100, Some(Duration::from_millis(10)), None);
        store.upsert("b".to_string(), 2, 100, None, None);

        assert!(store.take_expired("a", 105).is_none());
        assert!(store.take_expired("b", 10_000).is_none());
        assert_eq!(store.expired_keys(110), vec!["a".to_string()]);
        assert!(store.take_expired("a", 110).is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_entry_advances_clock() {
        let mut store = EntryStore::new();
        let mut entry = CacheEntry::new(9, 100, None, 40);
        entry.priority = -2;
        store.insert_entry("z".to_string(), entry);

        store.upsert("y".to_string(), 1, 100, None, None);
        assert!(store.get("y").unwrap().touched > 40);
        assert_eq!(keys(&store), vec!["z", "y"]);
    }

    #[test]
    fn test_clear() {
        let mut store = EntryStore::new();
        store.upsert("a".to_string(), 1, 1, None, None);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.iter().count(), 0);
    }
}
