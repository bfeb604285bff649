//! Snapshot Codec Module
//!
//! Denormalized, serializable form of an engine's entries, tags and counters.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, CacheStats, EntryStore, TagIndex};
use crate::error::{CacheError, Result};

// == Cache Snapshot ==
/// Exchange format produced by `CacheEngine::export`.
///
/// Entry lists follow the store's insertion order. `priorities`, `recencyOrder`
/// and `writeOrder` are optional on input: missing priorities restore at 0, and
/// missing orders fall back to `meta` timestamps and `data` position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot<K, V> {
    /// Key/value pairs
    pub data: Vec<(K, V)>,
    /// Key/recency pairs (Unix milliseconds)
    pub meta: Vec<(K, u64)>,
    /// Key/deadline pairs (Unix milliseconds)
    pub ttl_map: Vec<(K, u64)>,
    /// Tag/key-list pairs, tags sorted
    pub tag_map: Vec<(String, Vec<K>)>,
    /// Key/tag-list pairs
    pub key_tags: Vec<(K, Vec<String>)>,
    /// Counters at export time
    pub stats: CacheStats,
    /// Key/priority pairs for non-default priorities
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<(K, i64)>,
    /// Keys from least to most recently used; orders recency ties inside one millisecond
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub recency_order: Vec<K>,
    /// Keys from oldest to newest write; FIFO victim order
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub write_order: Vec<K>,
}

impl<K, V> CacheSnapshot<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Capture ==
    /// Copies every entry that is not expired at `now`.
    pub(crate) fn capture(
        store: &EntryStore<K, V>,
        tags: &TagIndex<K>,
        stats: CacheStats,
        now: u64,
    ) -> Self {
        let live: Vec<(&K, &CacheEntry<V>)> = store
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .collect();
        let position: HashMap<&K, usize> = live
            .iter()
            .enumerate()
            .map(|(index, (key, _))| (*key, index))
            .collect();

        let data = live
            .iter()
            .map(|(key, entry)| ((*key).clone(), entry.value.clone()))
            .collect();
        let meta = live
            .iter()
            .map(|(key, entry)| ((*key).clone(), entry.recorded_at))
            .collect();
        let ttl_map = live
            .iter()
            .filter_map(|(key, entry)| entry.expires_at.map(|at| ((*key).clone(), at)))
            .collect();
        let priorities = live
            .iter()
            .filter(|(_, entry)| entry.priority != 0)
            .map(|(key, entry)| ((*key).clone(), entry.priority))
            .collect();

        let mut by_recency = live.clone();
        by_recency.sort_by_key(|(_, entry)| entry.touched);
        let recency_order = by_recency.into_iter().map(|(key, _)| key.clone()).collect();
        let mut by_write = live.clone();
        by_write.sort_by_key(|(_, entry)| entry.inserted);
        let write_order = by_write.into_iter().map(|(key, _)| key.clone()).collect();

        let tag_map = tags
            .iter()
            .filter_map(|(tag, keys)| {
                let mut tagged: Vec<&K> = keys.iter().filter(|k| position.contains_key(k)).collect();
                if tagged.is_empty() {
                    return None;
                }
                tagged.sort_by_key(|k| position.get(k).copied());
                Some((tag.clone(), tagged.into_iter().cloned().collect()))
            })
            .collect();
        let key_tags = live
            .iter()
            .filter_map(|(key, _)| {
                tags.tags_of(*key)
                    .map(|set| ((*key).clone(), set.iter().cloned().collect()))
            })
            .collect();

        Self {
            data,
            meta,
            ttl_map,
            tag_map,
            key_tags,
            stats,
            priorities,
            recency_order,
            write_order,
        }
    }

    // == Validate ==
    /// Rejects snapshots that would break store or index invariants.
    pub fn validate(&self, limit: usize) -> Result<()> {
        if self.data.len() > limit {
            return Err(CacheError::InvalidArgument(format!(
                "snapshot holds {} entries but the limit is {}",
                self.data.len(),
                limit
            )));
        }

        let known: HashSet<&K> = self.data.iter().map(|(key, _)| key).collect();
        if known.len() != self.data.len() {
            return Err(CacheError::InvalidArgument(
                "snapshot data contains duplicate keys".to_string(),
            ));
        }

        let mut referenced = self
            .meta
            .iter()
            .map(|(key, _)| key)
            .chain(self.ttl_map.iter().map(|(key, _)| key))
            .chain(self.priorities.iter().map(|(key, _)| key))
            .chain(self.key_tags.iter().map(|(key, _)| key))
            .chain(self.recency_order.iter())
            .chain(self.write_order.iter())
            .chain(self.tag_map.iter().flat_map(|(_, keys)| keys.iter()));
        if !referenced.all(|key| known.contains(key)) {
            return Err(CacheError::InvalidArgument(
                "snapshot references a key missing from data".to_string(),
            ));
        }

        let mut tag_names = self
            .tag_map
            .iter()
            .map(|(tag, _)| tag)
            .chain(self.key_tags.iter().flat_map(|(_, tags)| tags.iter()));
        if tag_names.any(|tag| tag.is_empty()) {
            return Err(CacheError::InvalidArgument(
                "snapshot contains an empty tag name".to_string(),
            ));
        }

        Ok(())
    }

    // == Rebuild ==
    /// Validates, then builds a fresh store and tag index from the snapshot.
    ///
    /// Recency ties inside one millisecond follow `recency_order`. Entries without
    /// a recorded recency are stamped with `now`.
    pub(crate) fn rebuild(self, limit: usize, now: u64) -> Result<(EntryStore<K, V>, TagIndex<K>)> {
        self.validate(limit)?;

        let recorded: HashMap<K, u64> = self.meta.into_iter().collect();
        let deadlines: HashMap<K, u64> = self.ttl_map.into_iter().collect();
        let priorities: HashMap<K, i64> = self.priorities.into_iter().collect();
        let recency_rank = rank(self.recency_order);
        let write_rank = rank(self.write_order);

        let recency_of = |key: &K| recorded.get(key).copied().unwrap_or(now);
        let touched = sequence_stamps(self.data.len(), |index| {
            let key = &self.data[index].0;
            let tie = recency_rank.get(key).copied().unwrap_or(usize::MAX);
            (recency_of(key), tie, index)
        });
        let inserted = sequence_stamps(self.data.len(), |index| {
            let key = &self.data[index].0;
            (write_rank.get(key).copied().unwrap_or(usize::MAX), index)
        });

        let mut store = EntryStore::new();
        for (index, (key, value)) in self.data.into_iter().enumerate() {
            let mut entry = CacheEntry::new(value, recency_of(&key), None, inserted[index]);
            entry.touched = touched[index];
            entry.expires_at = deadlines.get(&key).copied();
            entry.priority = priorities.get(&key).copied().unwrap_or(0);
            store.insert_entry(key, entry);
        }

        let mut associations: HashMap<K, BTreeSet<String>> = HashMap::new();
        for (key, tags) in self.key_tags {
            associations.entry(key).or_default().extend(tags);
        }
        for (tag, keys) in self.tag_map {
            for key in keys {
                associations.entry(key).or_default().insert(tag.clone());
            }
        }
        let mut index = TagIndex::new();
        for (key, tags) in associations {
            index.attach(&key, tags);
        }

        Ok((store, index))
    }
}

fn rank<K: Hash + Eq>(keys: Vec<K>) -> HashMap<K, usize> {
    keys.into_iter()
        .enumerate()
        .map(|(position, key)| (key, position))
        .collect()
}

/// Stamps `1..=len` assigned to positions in ascending `sort_key` order.
fn sequence_stamps<T: Ord>(len: usize, sort_key: impl Fn(usize) -> T) -> Vec<u64> {
    let mut ordered: Vec<usize> = (0..len).collect();
    ordered.sort_by_key(|&index| sort_key(index));
    let mut stamps = vec![0u64; len];
    for (position, index) in ordered.into_iter().enumerate() {
        stamps[index] = position as u64 + 1;
    }
    stamps
}
