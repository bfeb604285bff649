//! Cache Module
//!
//! In-memory cache engine with TTL expiration, priority-aware eviction, tag
//! index, namespaces and snapshots.

mod engine;
mod entry;
mod eviction;
mod namespace;
mod order;
mod snapshot;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use engine::{CacheEngine, SetOptions};
pub use entry::{current_timestamp_ms, CacheEntry};
pub use eviction::{Candidate, CustomEvictFn, EvictionPolicy};
pub use namespace::NamespaceRegistry;
pub use order::InsertionOrder;
pub use snapshot::CacheSnapshot;
pub use stats::CacheStats;
pub use store::EntryStore;
pub use tags::TagIndex;
