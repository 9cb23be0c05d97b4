//! Listener registries with panic isolation
//!
//! Venue clients fan events out to registered listeners synchronously
//! inside the receive task. A listener that panics is logged and skipped;
//! it must never prevent delivery to its siblings. Concurrent add/remove
//! while a notification is in flight is safe: delivery iterates over a
//! snapshot of the registered callbacks.

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Opaque handle returned by `add`; used to remove the listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: ListenerId,
    /// When set, only events whose key matches are delivered.
    filter: Option<String>,
    callback: Callback<T>,
}

/// Id-keyed set of event listeners with optional per-key filtering.
pub struct ListenerSet<T> {
    entries: RwLock<Vec<Entry<T>>>,
    next_id: RwLock<u64>,
    /// Tag used in log lines when a listener panics.
    tag: &'static str,
}

impl<T> ListenerSet<T> {
    pub fn new(tag: &'static str) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
            tag,
        }
    }

    /// Register a listener. `filter = None` receives every event.
    pub fn add(&self, filter: Option<String>, callback: Callback<T>) -> ListenerId {
        let mut next = self.next_id.write();
        let id = ListenerId(*next);
        *next += 1;
        drop(next);

        self.entries.write().push(Entry {
            id,
            filter,
            callback,
        });
        id
    }

    /// Remove a listener. Removing an unknown id is a no-op.
    pub fn remove(&self, id: ListenerId) {
        self.entries.write().retain(|e| e.id != id);
    }

    /// Drop all listeners.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Deliver `event` to every listener whose filter matches `key`.
    ///
    /// Panics inside a callback are caught so that remaining listeners
    /// still receive the event.
    pub fn notify(&self, key: &str, event: &T) {
        let callbacks: Vec<Callback<T>> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|e| e.filter.as_deref().map_or(true, |f| f == key))
                .map(|e| Arc::clone(&e.callback))
                .collect()
        };

        for cb in callbacks {
            if catch_unwind(AssertUnwindSafe(|| cb(event))).is_err() {
                warn!("[{}] Listener panicked; continuing fan-out", self.tag);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_add_remove_notify() {
        let set: ListenerSet<u64> = ListenerSet::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = Arc::clone(&hits);
        let a = set.add(None, Arc::new(move |_| {
            hits_a.fetch_add(1, Ordering::SeqCst);
        }));

        set.notify("any", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        set.remove(a);
        set.notify("any", &2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_filter_matching() {
        let set: ListenerSet<u64> = ListenerSet::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        set.add(
            Some("asset-1".to_string()),
            Arc::new(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        set.notify("asset-2", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        set.notify("asset-1", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_break_siblings() {
        let set: ListenerSet<u64> = ListenerSet::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        set.add(None, Arc::new(|_| panic!("listener bug")));

        let hits_clone = Arc::clone(&hits);
        set.add(None, Arc::new(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        set.notify("any", &1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let set: ListenerSet<u64> = ListenerSet::new("test");
        let id = set.add(None, Arc::new(|_| {}));
        set.remove(id);
        set.remove(id);
        assert!(set.is_empty());
    }
}
