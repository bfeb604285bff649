//! Cache Engine Module
//!
//! Public cache operations. Every mutation of the entry store is paired with the
//! matching tag index update before any event goes out.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{
    CacheEntry, CacheSnapshot, CacheStats, Candidate, CustomEvictFn, EntryStore, EvictionPolicy,
    NamespaceRegistry, TagIndex,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::events::{CacheEvent, EventBus, EventKind, ListenerId};

// == Set Options ==
/// Per-write options for `CacheEngine::set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry TTL, overrides the configured default. Zero means no TTL.
    pub ttl: Option<Duration>,
    /// Eviction priority; left unchanged on overwrite when None
    pub priority: Option<i64>,
    /// Replacement tag set; left unchanged on overwrite when None
    pub tags: Option<Vec<String>>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

// == Cache Engine ==
/// Bounded key/value cache with TTL, priorities, tags, namespaces and snapshots.
///
/// The engine is single-owner: every operation takes `&mut self`. Wrap it in
/// `SharedCache` to share it across tasks.
#[derive(Debug)]
pub struct CacheEngine<K = String, V = String> {
    config: CacheConfig,
    policy: EvictionPolicy<K, V>,
    events: Arc<EventBus<K, V>>,
    store: EntryStore<K, V>,
    tags: TagIndex<K>,
    stats: CacheStats,
    namespaces: NamespaceRegistry<K, V>,
}

impl<K, V> CacheEngine<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructors ==
    /// Creates an engine for a built-in strategy.
    ///
    /// Fails with `Configuration` for a zero limit or for `Custom` without an
    /// evictor.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Creates an engine whose `Custom` strategy delegates to `evictor`.
    pub fn with_evictor<F>(config: CacheConfig, evictor: F) -> Result<Self>
    where
        F: for<'a> Fn(&[Candidate<'a, K, V>]) -> Option<K> + Send + Sync + 'static,
    {
        let evictor: CustomEvictFn<K, V> = Arc::new(evictor);
        Self::build(config, Some(evictor))
    }

    fn build(config: CacheConfig, evictor: Option<CustomEvictFn<K, V>>) -> Result<Self> {
        config.validate()?;
        let policy = EvictionPolicy::new(config.strategy, evictor)?;
        Ok(Self::from_parts(config, policy, Arc::new(EventBus::new())))
    }

    fn from_parts(
        config: CacheConfig,
        policy: EvictionPolicy<K, V>,
        events: Arc<EventBus<K, V>>,
    ) -> Self {
        Self {
            config,
            policy,
            events,
            store: EntryStore::new(),
            tags: TagIndex::new(),
            stats: CacheStats::new(),
            namespaces: NamespaceRegistry::new(),
        }
    }

    // == Set ==
    /// Stores a value.
    ///
    /// Returns `Ok(false)` without touching anything when overwriting is disabled
    /// and the key is live. A new key at capacity evicts exactly one entry first.
    pub fn set(&mut self, key: K, value: V, options: SetOptions) -> Result<bool> {
        if let Some(tags) = &options.tags {
            validate_tags(tags)?;
        }

        let now = current_timestamp_ms();
        self.expire_if_due(&key, now);

        let exists = self.store.contains(&key);
        if exists && !self.config.over_write {
            debug!("set skipped: key exists and overwrite is disabled");
            return Ok(false);
        }
        if !exists && self.store.len() >= self.config.limit {
            self.evict_one()?;
        }

        let ttl = options
            .ttl
            .or(self.config.default_ttl)
            .filter(|ttl| !ttl.is_zero());
        self.store
            .upsert(key.clone(), value, now, ttl, options.priority);
        if let Some(tags) = &options.tags {
            self.tags.attach(&key, tags.iter().cloned());
        }

        if self.events.is_listening(EventKind::Set) {
            if let Some((stored_key, entry)) = self.store.get_key_value(&key) {
                self.events.emit(&CacheEvent::Set {
                    key: stored_key,
                    value: &entry.value,
                    ttl,
                    tags: options.tags.as_deref(),
                    priority: options.priority,
                });
            }
        }
        Ok(true)
    }

    // == Get ==
    /// Retrieves a value, counting a hit or a miss.
    ///
    /// An entry whose deadline has passed is removed and counted as a miss.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = current_timestamp_ms();
        self.expire_if_due(key, now);

        if !self.store.contains(key) {
            self.stats.record_miss();
            if self.events.is_listening(EventKind::Get) {
                self.events.emit(&CacheEvent::Get {
                    key: &key.to_owned(),
                    hit: false,
                    value: None,
                });
            }
            return None;
        }

        if self.config.update_on_get {
            self.store.touch(key, now);
        }
        self.stats.record_hit();

        let (stored_key, entry) = self.store.get_key_value(key)?;
        self.events.emit(&CacheEvent::Get {
            key: stored_key,
            hit: true,
            value: Some(&entry.value),
        });
        Some(&entry.value)
    }

    /// Like `get`, but returns an owned copy instead of the live value.
    pub fn get_cloned<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        V: Clone,
    {
        self.get(key).cloned()
    }

    // == Peek ==
    /// Reads a live value without counters, recency updates or events.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.peek_entry(key).map(|entry| &entry.value)
    }

    /// Reads a live entry with its metadata, side-effect free.
    pub fn peek_entry<Q>(&self, key: &Q) -> Option<&CacheEntry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = current_timestamp_ms();
        self.store
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
    }

    // == Has ==
    /// Checks for a live key. Same lazy expiry as `get`, without counters.
    pub fn has<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let now = current_timestamp_ms();
        self.expire_if_due(key, now);

        let found = self.store.contains(key);
        if found && self.config.update_on_has {
            self.store.touch(key, now);
        }

        if self.events.is_listening(EventKind::Has) {
            match self.store.get_key_value(key) {
                Some((stored_key, _)) => self.events.emit(&CacheEvent::Has {
                    key: stored_key,
                    found,
                }),
                None => self.events.emit(&CacheEvent::Has {
                    key: &key.to_owned(),
                    found,
                }),
            }
        }
        found
    }

    // == Delete ==
    /// Removes a key and its tag associations. Returns whether it existed.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let removed = self.remove_entry(key);
        let success = removed.is_some();

        if self.events.is_listening(EventKind::Delete) {
            match &removed {
                Some((stored_key, _)) => self.events.emit(&CacheEvent::Delete {
                    key: stored_key,
                    success,
                }),
                None => self.events.emit(&CacheEvent::Delete {
                    key: &key.to_owned(),
                    success,
                }),
            }
        }
        success
    }

    // == Rename ==
    /// Moves an entry to a new key, carrying value, recency, deadline and tags.
    ///
    /// Fails when `old` is absent or `new` is taken. The renamed entry restarts at
    /// priority 0 and takes the newest insertion position.
    pub fn rename<Q>(&mut self, old: &Q, new: K) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = current_timestamp_ms();
        self.expire_if_due(old, now);
        self.expire_if_due::<K>(&new, now);

        if self.store.contains::<K>(&new) {
            return false;
        }
        let Some((_, mut entry)) = self.store.remove(old) else {
            return false;
        };
        let tags = self.tags.remove_key(old);

        entry.priority = 0;
        self.store.insert_entry(new.clone(), entry);
        self.tags.attach(&new, tags);
        true
    }

    // == Flush ==
    /// Removes every entry, tag, deadline and priority. Counters are kept.
    pub fn flush(&mut self) {
        self.store.clear();
        self.tags.clear();
        self.events.emit(&CacheEvent::Flush);
    }

    // == TTL ==
    /// Time left before the key expires.
    ///
    /// None when the key is absent, has no deadline, or its deadline has passed.
    pub fn remaining_ttl<Q>(&self, key: &Q) -> Option<Duration>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = current_timestamp_ms();
        self.store
            .get(key)
            .and_then(|entry| entry.ttl_remaining_at(now))
    }

    /// Moves an existing deadline to the current instant.
    ///
    /// The entry stays in place until the next read or prune observes it.
    /// Returns false when the key is absent or has no deadline.
    pub fn expire<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = current_timestamp_ms();
        match self.store.get_mut(key) {
            Some(entry) => match entry.expires_at {
                Some(deadline) => {
                    entry.expires_at = Some(deadline.min(now));
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    // == Prune ==
    /// Removes every entry whose deadline has passed and returns the count.
    pub fn prune(&mut self) -> usize {
        let count = self.prune_expired();
        self.events.emit(&CacheEvent::Prune { count });
        count
    }

    /// Prune pass for periodic drivers: covers this engine and all of its
    /// namespaces and reports the total as one `autoPrune` event.
    pub fn auto_prune(&mut self) -> usize {
        let count = self.prune_tree();
        self.events.emit(&CacheEvent::AutoPrune { count });
        count
    }

    fn prune_tree(&mut self) -> usize {
        let own = self.prune_expired();
        own + self
            .namespaces
            .iter_mut()
            .map(|child| child.prune_tree())
            .sum::<usize>()
    }

    fn prune_expired(&mut self) -> usize {
        let expired = self.store.expired_keys(current_timestamp_ms());
        for key in &expired {
            self.remove_entry(key);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "pruned expired entries");
        }
        expired.len()
    }

    // == Tags ==
    /// Live values tagged with `tag`, in insertion order of their keys.
    ///
    /// Each key is read through `get`, so counters, recency, events and lazy
    /// expiry apply.
    pub fn by_tag(&mut self, tag: &str) -> Vec<&V> {
        let keys = self.tagged_keys(tag);
        for key in &keys {
            self.get(key);
        }
        keys.iter()
            .filter_map(|key| self.store.get(key))
            .map(|entry| &entry.value)
            .collect()
    }

    /// Deletes every key carrying `tag`, then the tag. Returns the count removed.
    pub fn delete_by_tag(&mut self, tag: &str) -> usize {
        let keys = self.tagged_keys(tag);
        let mut removed = 0;
        for key in &keys {
            if self.delete(key) {
                removed += 1;
            }
        }
        self.tags.remove_tag(tag);
        removed
    }

    /// Tags with at least one non-expired key, sorted.
    pub fn list_tags(&self) -> Vec<&str> {
        let now = current_timestamp_ms();
        self.tags
            .iter()
            .filter(|(_, keys)| {
                keys.iter().any(|key| {
                    self.store
                        .get(key)
                        .is_some_and(|entry| !entry.is_expired_at(now))
                })
            })
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    /// Tags attached to one key, sorted.
    pub fn tags_of<Q>(&self, key: &Q) -> Vec<&str>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.tags
            .tags_of(key)
            .map(|tags| tags.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn tagged_keys(&self, tag: &str) -> Vec<K> {
        let Some(tagged) = self.tags.keys_for(tag) else {
            return Vec::new();
        };
        self.store
            .iter()
            .filter(|(key, _)| tagged.contains(*key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Namespaces ==
    /// Returns the namespace `name`, creating it on first use.
    ///
    /// A namespace shares this engine's configuration, eviction policy and event
    /// listeners, and nothing else.
    pub fn namespace(&mut self, name: &str) -> Result<&mut CacheEngine<K, V>> {
        if name.is_empty() {
            return Err(CacheError::InvalidArgument(
                "namespace name must not be empty".to_string(),
            ));
        }
        let config = &self.config;
        let policy = &self.policy;
        let events = &self.events;
        Ok(self.namespaces.get_or_create(name, || {
            CacheEngine::from_parts(config.clone(), policy.clone(), Arc::clone(events))
        }))
    }

    pub fn get_namespace(&self, name: &str) -> Option<&CacheEngine<K, V>> {
        self.namespaces.get(name)
    }

    /// Deregisters and discards a namespace.
    pub fn remove_namespace(&mut self, name: &str) -> bool {
        self.namespaces.remove(name).is_some()
    }

    /// Flushes every namespace but keeps them registered.
    pub fn flush_namespaces(&mut self) {
        for child in self.namespaces.iter_mut() {
            child.flush();
        }
    }

    pub fn namespace_names(&self) -> Vec<&str> {
        self.namespaces.names().collect()
    }

    // == Events ==
    /// Registers a listener; shared with every namespace of this engine.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: for<'a> Fn(&CacheEvent<'a, K, V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.events.subscribe(kind, listener)
    }

    /// Registers a listener by event name (`set`, `get`, `autoPrune`, ...).
    pub fn on_named<F>(&self, name: &str, listener: F) -> Result<ListenerId>
    where
        F: for<'a> Fn(&CacheEvent<'a, K, V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let kind: EventKind = name.parse()?;
        Ok(self.events.subscribe(kind, listener))
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.events.unsubscribe(kind, id)
    }

    pub fn events(&self) -> &EventBus<K, V> {
        &self.events
    }

    // == Snapshot ==
    /// Exports live entries, tags and counters.
    pub fn export(&self) -> CacheSnapshot<K, V>
    where
        V: Clone,
    {
        CacheSnapshot::capture(&self.store, &self.tags, self.stats, current_timestamp_ms())
    }

    /// Replaces the whole state with a snapshot.
    ///
    /// The snapshot is validated before anything is cleared; on error the engine
    /// is unchanged. A snapshot holding more entries than this engine's `limit`
    /// is rejected with `InvalidArgument` rather than trimmed. Namespaces are not
    /// part of a snapshot and are kept.
    pub fn restore(&mut self, snapshot: CacheSnapshot<K, V>) -> Result<()>
    where
        V: Clone,
    {
        let stats = snapshot.stats;
        let (store, tags) = snapshot.rebuild(self.config.limit, current_timestamp_ms())?;
        self.store = store;
        self.tags = tags;
        self.stats = stats;
        debug!(entries = self.store.len(), "restored snapshot");
        Ok(())
    }

    pub fn export_json(&self) -> Result<String>
    where
        K: Serialize,
        V: Clone + Serialize,
    {
        Ok(serde_json::to_string(&self.export())?)
    }

    /// Parses and restores a JSON snapshot. Malformed JSON leaves the engine untouched.
    pub fn restore_json(&mut self, json: &str) -> Result<()>
    where
        K: DeserializeOwned,
        V: Clone + DeserializeOwned,
    {
        let snapshot: CacheSnapshot<K, V> = serde_json::from_str(json)?;
        self.restore(snapshot)
    }

    // == Introspection ==
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of stored entries, including expired ones not yet observed.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Live entries in insertion order, side-effect free.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let now = current_timestamp_ms();
        self.store
            .iter()
            .filter(move |(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key, &entry.value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    // == Internals ==
    fn evict_one(&mut self) -> Result<()> {
        let victim = {
            let candidates: Vec<Candidate<'_, K, V>> = self
                .store
                .iter()
                .map(|(key, entry)| Candidate::from_entry(key, entry))
                .collect();
            self.policy.select(&candidates)
        };

        let Some(victim) = victim else {
            return Err(CacheError::CacheFull(format!(
                "{} eviction selected no victim",
                self.policy.strategy()
            )));
        };
        if self.remove_entry(&victim).is_none() {
            return Err(CacheError::CacheFull(
                "eviction victim is not in the cache".to_string(),
            ));
        }

        self.stats.record_eviction();
        debug!(strategy = %self.policy.strategy(), "evicted one entry");
        Ok(())
    }

    fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, CacheEntry<V>)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.store.remove(key)?;
        self.tags.remove_key::<K>(&removed.0);
        Some(removed)
    }

    fn expire_if_due<Q>(&mut self, key: &Q, now: u64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.store.take_expired(key, now) {
            Some((expired, _)) => {
                self.tags.remove_key::<K>(&expired);
                debug!("lazily expired entry");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn tag_index(&self) -> &TagIndex<K> {
        &self.tags
    }
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.iter().any(|tag| tag.is_empty()) {
        return Err(CacheError::InvalidArgument(
            "tag names must not be empty".to_string(),
        ));
    }
    Ok(())
}
