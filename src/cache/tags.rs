//! Tag Index Module
//!
//! Bidirectional tag <-> key mapping kept consistent with the entry store.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

// == Tag Index ==
/// Two mutually consistent mappings: tag -> keys and key -> tags.
///
/// Invariant: `key ∈ tag_keys[tag]` iff `tag ∈ key_tags[key]`, and neither side
/// ever holds an empty set.
#[derive(Debug)]
pub struct TagIndex<K> {
    tag_keys: BTreeMap<String, HashSet<K>>,
    key_tags: HashMap<K, BTreeSet<String>>,
}

impl<K> Default for TagIndex<K> {
    fn default() -> Self {
        Self {
            tag_keys: BTreeMap::new(),
            key_tags: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> TagIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Attach ==
    /// Replaces the whole tag set of `key`.
    ///
    /// An empty `tags` detaches the key from every tag.
    pub fn attach<I>(&mut self, key: &K, tags: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.remove_key(key);

        let tags: BTreeSet<String> = tags.into_iter().collect();
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            self.tag_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.key_tags.insert(key.clone(), tags);
    }

    // == Remove Key ==
    /// Drops every association of `key` and returns the tags it had.
    pub fn remove_key<Q>(&mut self, key: &Q) -> BTreeSet<String>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(tags) = self.key_tags.remove(key) else {
            return BTreeSet::new();
        };
        for tag in &tags {
            if let Some(keys) = self.tag_keys.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_keys.remove(tag);
                }
            }
        }
        tags
    }

    // == Remove Tag ==
    /// Drops a tag entirely and returns the keys that carried it.
    pub fn remove_tag(&mut self, tag: &str) -> HashSet<K> {
        let Some(keys) = self.tag_keys.remove(tag) else {
            return HashSet::new();
        };
        for key in &keys {
            if let Some(tags) = self.key_tags.get_mut(key) {
                tags.remove(tag);
                if tags.is_empty() {
                    self.key_tags.remove(key);
                }
            }
        }
        keys
    }

    // == Lookups ==
    pub fn keys_for(&self, tag: &str) -> Option<&HashSet<K>> {
        self.tag_keys.get(tag)
    }

    pub fn tags_of<Q>(&self, key: &Q) -> Option<&BTreeSet<String>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.key_tags.get(key)
    }

    /// Tags in sorted order with their keys.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HashSet<K>)> {
        self.tag_keys.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tag_keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.tag_keys.clear();
        self.key_tags.clear();
    }

    /// Checks both directions of the index against each other.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward = self.tag_keys.iter().all(|(tag, keys)| {
            !keys.is_empty()
                && keys
                    .iter()
                    .all(|key| self.key_tags.get(key).is_some_and(|t| t.contains(tag)))
        });
        let backward = self.key_tags.iter().all(|(key, tags)| {
            !tags.is_empty()
                && tags
                    .iter()
                    .all(|tag| self.tag_keys.get(tag).is_some_and(|k| k.contains(key)))
        });
        forward && backward
    }
}
