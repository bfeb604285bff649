//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and priority metadata.

use std::time::Duration;

use chrono::Utc;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Last recency timestamp (Unix milliseconds)
    pub recorded_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Eviction priority, higher survives longer
    pub priority: i64,
    /// Recency sequence stamp, breaks ties inside one millisecond
    pub(crate) touched: u64,
    /// Write sequence stamp, used by FIFO and never moved by reads
    pub(crate) inserted: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry recorded at `now` with optional TTL.
    pub fn new(value: V, now: u64, ttl: Option<Duration>, seq: u64) -> Self {
        Self {
            value,
            recorded_at: now,
            expires_at: deadline(now, ttl),
            priority: 0,
            touched: seq,
            inserted: seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// An entry is expired once `now` reaches the deadline, so a deadline rewritten
    /// to the current instant is already past.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Time To Live ==
    /// Returns the remaining TTL, or None if there is no deadline or it has passed.
    pub fn ttl_remaining_at(&self, now: u64) -> Option<Duration> {
        match self.expires_at {
            Some(expires) if expires > now => Some(Duration::from_millis(expires - now)),
            _ => None,
        }
    }

    /// Refreshes the recency metadata without touching the write stamp.
    pub(crate) fn touch(&mut self, now: u64, seq: u64) {
        self.recorded_at = now;
        self.touched = seq;
    }
}

/// Absolute deadline for a TTL starting at `now`; a zero TTL means none.
pub(crate) fn deadline(now: u64, ttl: Option<Duration>) -> Option<u64> {
    ttl.filter(|ttl| !ttl.is_zero())
        .map(|ttl| now.saturating_add(ttl.as_millis().min(u64::MAX as u128) as u64))
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value", current_timestamp_ms(), None, 1);

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert_eq!(entry.priority, 0);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_zero_ttl_means_no_deadline() {
        let entry = CacheEntry::new(1, current_timestamp_ms(), Some(Duration::ZERO), 1);
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(
            "test_value",
            current_timestamp_ms(),
            Some(Duration::from_millis(30)),
            1,
        );

        assert!(!entry.is_expired());

        sleep(Duration::from_millis(50));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_ttl_remaining() {
        let now = current_timestamp_ms();
        let entry = CacheEntry::new("v", now, Some(Duration::from_secs(10)), 1);

        let remaining = entry.ttl_remaining_at(now + 1_000).unwrap();
        assert_eq!(remaining, Duration::from_millis(9_000));
        assert!(entry.ttl_remaining_at(now + 10_000).is_none());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let mut entry = CacheEntry::new("test", now, None, 1);
        entry.expires_at = Some(now);

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }

    #[test]
    fn test_touch_keeps_insert_stamp() {
        let mut entry = CacheEntry::new("v", 100, None, 1);
        entry.touch(200, 7);

        assert_eq!(entry.recorded_at, 200);
        assert_eq!(entry.touched, 7);
        assert_eq!(entry.inserted, 1);
    }
}
