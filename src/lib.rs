//! Tagged Cache - An embeddable in-memory cache engine
//!
//! Bounded key/value store with TTL expiration, priority-aware eviction
//! (LRU, FIFO, MFU or a custom policy), tag grouping, namespaces, lifecycle
//! events and snapshot export.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod shared;
pub mod tasks;

pub use cache::{CacheEngine, CacheSnapshot, CacheStats, Candidate, SetOptions};
pub use config::{CacheConfig, EvictionStrategy};
pub use error::{CacheError, Result};
pub use events::{CacheEvent, EventKind, ListenerId};
pub use shared::SharedCache;
pub use tasks::spawn_auto_prune_task;
