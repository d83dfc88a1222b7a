// ── Observer registry ──
//
// Synchronous callback fan-out shared by the loading coordinator and the
// notification channel. Delivery is in registration order. `notify`
// iterates a snapshot, so observers may subscribe or unsubscribe (even
// themselves) while a broadcast is in progress. A panicking observer is
// logged and skipped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::warn;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered set of callbacks receiving `&T`.
pub(crate) struct ObserverRegistry<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T: 'static> ObserverRegistry<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push((id, Arc::new(observer)));
            id
        };

        let slots: Arc<dyn Detach> = self.slots.clone();
        Subscription {
            registry: Arc::downgrade(&slots),
            id,
        }
    }

    /// Deliver `value` to every observer registered at the time of the call.
    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clone();

        for (id, observer) in snapshot {
            if !self.is_registered(id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| observer(value))).is_err() {
                warn!(observer = id, "observer panicked; continuing delivery");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    fn is_registered(&self, id: u64) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .any(|(entry, _)| *entry == id)
    }
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T> Detach for Mutex<Slots<T>> {
    fn detach(&self, id: u64) {
        self.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|(entry, _)| *entry != id);
    }
}

/// Handle returned by every `subscribe`/`add_listener` call.
///
/// Dropping the handle does *not* unsubscribe; call [`Subscription::unsubscribe`].
/// Unsubscribing is idempotent and safe from inside a callback.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    registry: Weak<dyn Detach>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_in_registration_order() {
        let registry = ObserverRegistry::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            let _sub = registry.subscribe(move |v: &u32| seen.lock().unwrap().push(format!("{tag}{v}")));
        }
        registry.notify(&7);

        assert_eq!(*seen.lock().unwrap(), ["a7", "b7", "c7"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = ObserverRegistry::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = registry.subscribe(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        sub.unsubscribe();
        sub.unsubscribe();
        registry.notify(&());

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn observer_may_unsubscribe_a_later_one_mid_broadcast() {
        let registry = ObserverRegistry::<()>::new();
        let later: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let later_hits = Arc::new(AtomicUsize::new(0));

        let slot = later.clone();
        let _first = registry.subscribe(move |()| {
            if let Some(sub) = slot.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        let h = later_hits.clone();
        *later.lock().unwrap() = Some(registry.subscribe(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        registry.notify(&());
        registry.notify(&());

        assert_eq!(later_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_observer_does_not_block_the_rest() {
        let registry = ObserverRegistry::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let _bad = registry.subscribe(|()| panic!("listener bug"));
        let h = hits.clone();
        let _good = registry.subscribe(move |()| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&());
        registry.notify(&());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn subscription_outliving_registry_is_harmless() {
        let registry = ObserverRegistry::<()>::new();
        let sub = registry.subscribe(|()| {});
        drop(registry);
        sub.unsubscribe();
    }
}
