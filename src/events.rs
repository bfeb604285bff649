//! Cache Events Module
//!
//! Publish/subscribe bus for cache lifecycle notifications.
//!
//! Listeners receive borrowed payloads and return `anyhow::Result<()>`. A listener
//! that returns an error or panics is logged and counted; the operation that
//! triggered it and the remaining listeners are unaffected.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{CacheError, Result};

// == Event Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Set,
    Get,
    Has,
    Delete,
    Flush,
    Prune,
    AutoPrune,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Set => "set",
            EventKind::Get => "get",
            EventKind::Has => "has",
            EventKind::Delete => "delete",
            EventKind::Flush => "flush",
            EventKind::Prune => "prune",
            EventKind::AutoPrune => "autoPrune",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "set" => Ok(EventKind::Set),
            "get" => Ok(EventKind::Get),
            "has" => Ok(EventKind::Has),
            "delete" => Ok(EventKind::Delete),
            "flush" => Ok(EventKind::Flush),
            "prune" => Ok(EventKind::Prune),
            "autoPrune" => Ok(EventKind::AutoPrune),
            other => Err(CacheError::InvalidArgument(format!(
                "unknown event name: {:?}",
                other
            ))),
        }
    }
}

// == Cache Event ==
/// Payload delivered to listeners. Borrowed from the engine for the duration of
/// the notification.
#[derive(Debug)]
pub enum CacheEvent<'a, K, V> {
    Set {
        key: &'a K,
        value: &'a V,
        ttl: Option<Duration>,
        tags: Option<&'a [String]>,
        priority: Option<i64>,
    },
    Get {
        key: &'a K,
        hit: bool,
        value: Option<&'a V>,
    },
    Has {
        key: &'a K,
        found: bool,
    },
    Delete {
        key: &'a K,
        success: bool,
    },
    Flush,
    Prune {
        count: usize,
    },
    AutoPrune {
        count: usize,
    },
}

impl<K, V> CacheEvent<'_, K, V> {
    pub fn kind(&self) -> EventKind {
        match self {
            CacheEvent::Set { .. } => EventKind::Set,
            CacheEvent::Get { .. } => EventKind::Get,
            CacheEvent::Has { .. } => EventKind::Has,
            CacheEvent::Delete { .. } => EventKind::Delete,
            CacheEvent::Flush => EventKind::Flush,
            CacheEvent::Prune { .. } => EventKind::Prune,
            CacheEvent::AutoPrune { .. } => EventKind::AutoPrune,
        }
    }
}

/// Listener callback.
pub type Listener<K, V> =
    Arc<dyn for<'a> Fn(&CacheEvent<'a, K, V>) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// == Event Bus ==
/// Listener registry shared by an engine and all of its namespaces.
pub struct EventBus<K, V> {
    listeners: RwLock<HashMap<EventKind, Vec<(ListenerId, Listener<K, V>)>>>,
    next_id: AtomicU64,
    failures: AtomicU64,
}

impl<K, V> Default for EventBus<K, V> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            failures: AtomicU64::new(0),
        }
    }
}

impl<K, V> fmt::Debug for EventBus<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("failures", &self.failed_deliveries())
            .finish()
    }
}

impl<K, V> EventBus<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    // == Subscribe ==
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: for<'a> Fn(&CacheEvent<'a, K, V>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    // == Unsubscribe ==
    pub fn unsubscribe(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|(listener_id, _)| *listener_id != id);
        let removed = registered.len() != before;
        if registered.is_empty() {
            listeners.remove(&kind);
        }
        removed
    }

    /// Whether anyone listens to `kind`; lets callers skip building payloads.
    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&kind)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Number of listener invocations that returned an error or panicked.
    pub fn failed_deliveries(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    // == Emit ==
    /// Delivers an event to every listener of its kind, in subscription order.
    pub fn emit(&self, event: &CacheEvent<'_, K, V>) {
        let kind = event.kind();
        // Listeners run outside the lock
        let targets: Vec<(ListenerId, Listener<K, V>)> = {
            let listeners = self
                .listeners
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match listeners.get(&kind) {
                Some(registered) => registered.clone(),
                None => return,
            }
        };

        for (id, listener) in targets {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(event = %kind, listener = id.0, error = %err, "cache listener failed");
                }
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(event = %kind, listener = id.0, "cache listener panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Bus = EventBus<String, i32>;

    #[test]
    fn test_event_kind_parse() {
        assert_eq!("autoPrune".parse::<EventKind>().unwrap(), EventKind::AutoPrune);
        assert_eq!("delete".parse::<EventKind>().unwrap(), EventKind::Delete);
        assert!(matches!(
            "expire".parse::<EventKind>(),
            Err(CacheError::InvalidArgument(_))
        ));
        assert_eq!(EventKind::AutoPrune.to_string(), "autoPrune");
    }

    #[test]
    fn test_emit_reaches_matching_listeners_only() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe(EventKind::Prune, move |event| {
            if let CacheEvent::Prune { count } = event {
                sink.lock().unwrap().push(*count);
            }
            Ok(())
        });

        bus.emit(&CacheEvent::Prune { count: 3 });
        bus.emit(&CacheEvent::Flush);

        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let bus = Bus::new();
        let delivered = Arc::new(AtomicU64::new(0));

        bus.subscribe(EventKind::Flush, |_| anyhow::bail!("listener broke"));
        bus.subscribe(EventKind::Flush, |_| panic!("listener panicked"));
        let counter = delivered.clone();
        bus.subscribe(EventKind::Flush, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(&CacheEvent::Flush);

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert_eq!(bus.failed_deliveries(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = Bus::new();
        let id = bus.subscribe(EventKind::Get, |_| Ok(()));

        assert!(bus.is_listening(EventKind::Get));
        assert!(!bus.unsubscribe(EventKind::Set, id));
        assert!(bus.unsubscribe(EventKind::Get, id));
        assert!(!bus.is_listening(EventKind::Get));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_event_kind_of_payload() {
        let key = "k".to_string();
        let event: CacheEvent<'_, String, i32> = CacheEvent::Has {
            key: &key,
            found: true,
        };
        assert_eq!(event.kind(), EventKind::Has);
    }
}
