//! Cache Statistics Module
//!
//! Hit, miss and eviction counters shared by an engine's read and write paths.

use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Engine counters as exported in snapshots. They only move forward until
/// `CacheEngine::reset_stats` zeroes them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// `get` calls that found a live entry
    pub hits: u64,
    /// `get` calls on absent or expired keys
    pub misses: u64,
    /// Entries removed to make room for a new key
    pub evictions: u64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `get` calls observed.
    pub fn lookups(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// Share of lookups that hit, 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }

    pub(crate) fn record_hit(&mut self) {
        self.hits = self.hits.saturating_add(1);
    }

    pub(crate) fn record_miss(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    pub(crate) fn record_eviction(&mut self) {
        self.evictions = self.evictions.saturating_add(1);
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
