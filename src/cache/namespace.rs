//! Namespace Registry Module
//!
//! Named, data-isolated sibling engines owned by a parent engine.

use std::collections::BTreeMap;

use crate::cache::CacheEngine;

// == Namespace Registry ==
/// Maps a name to its sibling engine. Each name is created once; asking again
/// returns the same instance.
#[derive(Debug)]
pub struct NamespaceRegistry<K, V> {
    children: BTreeMap<String, CacheEngine<K, V>>,
}

impl<K, V> Default for NamespaceRegistry<K, V> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }
}

impl<K, V> NamespaceRegistry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sibling registered under `name`, creating it with `make` if needed.
    pub fn get_or_create<F>(&mut self, name: &str, make: F) -> &mut CacheEngine<K, V>
    where
        F: FnOnce() -> CacheEngine<K, V>,
    {
        self.children.entry(name.to_string()).or_insert_with(make)
    }

    pub fn get(&self, name: &str) -> Option<&CacheEngine<K, V>> {
        self.children.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut CacheEngine<K, V>> {
        self.children.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<CacheEngine<K, V>> {
        self.children.remove(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CacheEngine<K, V>> {
        self.children.values_mut()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
