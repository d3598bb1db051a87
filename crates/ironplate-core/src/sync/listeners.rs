// ============================================================================
// Listener Registry - explicit subscribe / unsubscribe
// ============================================================================

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Set of callbacks that each receive every published value, in
/// subscription order
pub struct ListenerRegistry<T> {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Callback<T>>>,
}

impl<T: Clone + 'static> ListenerRegistry<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn subscribe(self: &Arc<Self>, listener: impl Fn(T) + Send + Sync + 'static) -> Subscription<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        Subscription {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver `value` to every listener. Callbacks run outside the lock, so a
    /// listener may subscribe or unsubscribe while being notified.
    pub fn notify(&self, value: T) {
        let snapshot: Vec<Callback<T>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in snapshot {
            listener(value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) -> bool {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

/// Handle returned by `subscribe`. Dropping it does not unsubscribe.
pub struct Subscription<T> {
    registry: Weak<ListenerRegistry<T>>,
    id: u64,
}

impl<T: Clone + 'static> Subscription<T> {
    /// Stop receiving values. Safe to call repeatedly or after the owning
    /// registry is gone.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_listener_gets_every_value() {
        let registry = ListenerRegistry::<u32>::new();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));

        let a = seen_a.clone();
        registry.subscribe(move |v| a.lock().unwrap().push(v));
        let b = seen_b.clone();
        registry.subscribe(move |v| b.lock().unwrap().push(v));

        registry.notify(1);
        registry.notify(2);

        assert_eq!(*seen_a.lock().unwrap(), vec![1, 2]);
        assert_eq!(*seen_b.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let registry = ListenerRegistry::<u32>::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        let sub = registry.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        registry.notify(1);
        sub.unsubscribe();
        sub.unsubscribe();
        registry.notify(2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let registry = ListenerRegistry::<u32>::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let registry = ListenerRegistry::<u32>::new();
        let slot: Arc<Mutex<Option<Subscription<u32>>>> = Arc::new(Mutex::new(None));

        let inner = slot.clone();
        let sub = registry.subscribe(move |_| {
            if let Some(sub) = inner.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        registry.notify(1);
        assert_eq!(registry.len(), 0);
    }
}
