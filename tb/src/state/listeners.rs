//! Snapshot listeners
//!
//! Listeners are plain callbacks invoked with the current snapshot after each
//! applied mutation and after the initial load. A panicking listener is
//! logged and skipped; the rest still receive the notification.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::{debug, error};

use super::snapshot::Snapshot;

/// Callback receiving the current snapshot
pub type Listener = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Registered listeners, in subscription order
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(listener_id = id, "ListenerRegistry::add");
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        debug!(listener_id = id, "ListenerRegistry::remove");
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Invoke every listener with `snapshot`, returning how many completed
    ///
    /// The registry lock is released before any listener runs, so a listener
    /// may subscribe or unsubscribe from inside its callback.
    pub(crate) fn notify(&self, snapshot: &Snapshot) -> usize {
        let listeners: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();
        debug!(count = listeners.len(), "ListenerRegistry::notify");

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(snapshot))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".to_string());
                    error!(listener_id = id, %message, "Snapshot listener panicked");
                }
            }
        }
        delivered
    }
}

/// Handle for a registered listener
///
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// deregisters exactly the listener it was returned for.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: u64, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> Listener {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Snapshot| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_notify_reaches_all_listeners() {
        let registry = ListenerRegistry::default();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        registry.add(counting(&a));
        registry.add(counting(&b));

        assert_eq!(registry.notify(&Snapshot::default()), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let registry = ListenerRegistry::default();
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        registry.add(counting(&before));
        registry.add(Arc::new(|_: &Snapshot| panic!("listener bug")));
        registry.add(counting(&after));

        assert_eq!(registry.notify(&Snapshot::default()), 2);
        assert_eq!(before.load(Ordering::SeqCst), 1);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_subscription_removes_only_that_listener() {
        let registry = Arc::new(ListenerRegistry::default());
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let sub_a = Subscription::new(registry.add(counting(&a)), &registry);
        let _sub_b = Subscription::new(registry.add(counting(&b)), &registry);

        sub_a.unsubscribe();
        registry.notify(&Snapshot::default());

        assert_eq!(registry.len(), 1);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_callback_subscribed_twice_is_independent() {
        let registry = Arc::new(ListenerRegistry::default());
        let counter = Arc::new(AtomicUsize::new(0));
        let listener = counting(&counter);
        let first = Subscription::new(registry.add(Arc::clone(&listener)), &registry);
        let _second = Subscription::new(registry.add(listener), &registry);

        registry.notify(&Snapshot::default());
        drop(first);
        registry.notify(&Snapshot::default());

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
