//! Insertion Order Module
//!
//! Tracks the order in which keys entered the store, for deterministic iteration.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// == Insertion Order ==
/// Tracks key insertion order.
///
/// Each key gets a slot number when pushed; iterating slots in ascending order
/// yields oldest to newest insertion. Removal is a map lookup, not a scan.
///
/// Overwriting an existing key does not move it.
#[derive(Debug)]
pub struct InsertionOrder<K> {
    /// Slot -> key, ascending = oldest first
    slots: BTreeMap<u64, K>,
    /// Key -> slot
    positions: HashMap<K, u64>,
    next_slot: u64,
}

impl<K> Default for InsertionOrder<K> {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
            positions: HashMap::new(),
            next_slot: 0,
        }
    }
}

impl<K: Hash + Eq + Clone> InsertionOrder<K> {
    // == Constructor ==
    /// Creates a new empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Push ==
    /// Appends a newly inserted key at the back.
    ///
    /// Callers only push keys that are not tracked yet.
    pub fn push(&mut self, key: K) {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.positions.insert(key.clone(), slot);
        self.slots.insert(slot, key);
    }

    // == Remove ==
    /// Removes a key from the tracker in O(log n).
    pub fn remove<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(slot) = self.positions.remove(key) {
            self.slots.remove(&slot);
        }
    }

    // == Iter ==
    /// Iterates keys from oldest to newest insertion.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.slots.values()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.positions.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
