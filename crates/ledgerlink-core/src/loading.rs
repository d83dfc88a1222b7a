// ── Global loading state ──
//
// Reference-counted busy/idle broadcaster. Every `acquire` returns a
// `LoadingGuard`; the count drops exactly once when the guard is released
// or dropped, so an early return or a failed request cannot leave the
// indicator stuck on.
//
// Each transition gets a sequence number under the state lock. Delivery
// happens under a separate lock that remembers the last sequence handed to
// observers, so a snapshot that lost the race to a newer one is dropped
// instead of overwriting it. Observers must not acquire from inside their
// callback.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::trace;

use crate::observer::{ObserverRegistry, Subscription};

/// Snapshot delivered to observers on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingState {
    /// Number of unreleased acquisitions.
    pub outstanding: usize,
    /// Most recent message supplied to `acquire`; reset when idle.
    pub message: Option<String>,
}

impl LoadingState {
    pub fn is_busy(&self) -> bool {
        self.outstanding > 0
    }
}

struct Counter {
    state: LoadingState,
    seq: u64,
}

struct Inner {
    state: Mutex<Counter>,
    /// Sequence of the last snapshot delivered to observers.
    delivered: Mutex<u64>,
    observers: ObserverRegistry<LoadingState>,
    watch: watch::Sender<LoadingState>,
}

/// Shared busy counter. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LoadingCoordinator {
    inner: Arc<Inner>,
}

impl Default for LoadingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingCoordinator {
    pub fn new() -> Self {
        let (watch, _) = watch::channel(LoadingState::default());
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(Counter {
                    state: LoadingState::default(),
                    seq: 0,
                }),
                delivered: Mutex::new(0),
                observers: ObserverRegistry::new(),
                watch,
            }),
        }
    }

    /// Mark one more operation as outstanding.
    pub fn acquire(&self, message: Option<&str>) -> LoadingGuard {
        let (seq, snapshot) = self.update(|state| {
            state.outstanding += 1;
            if let Some(msg) = message {
                state.message = Some(msg.to_owned());
            }
        });
        trace!(outstanding = snapshot.outstanding, "loading acquired");
        self.publish(seq, &snapshot);

        LoadingGuard {
            coordinator: Some(self.clone()),
        }
    }

    fn release_one(&self) {
        let (seq, snapshot) = self.update(|state| {
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.outstanding == 0 {
                state.message = None;
            }
        });
        trace!(outstanding = snapshot.outstanding, "loading released");
        self.publish(seq, &snapshot);
    }

    fn update(&self, f: impl FnOnce(&mut LoadingState)) -> (u64, LoadingState) {
        let mut counter = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut counter.state);
        counter.seq += 1;
        let snapshot = counter.state.clone();
        self.inner.watch.send_replace(snapshot.clone());
        (counter.seq, snapshot)
    }

    fn publish(&self, seq: u64, snapshot: &LoadingState) {
        let mut delivered = self
            .inner
            .delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if seq <= *delivered {
            trace!(seq, latest = *delivered, "stale loading snapshot dropped");
            return;
        }
        *delivered = seq;
        self.inner.observers.notify(snapshot);
    }

    /// Current state.
    pub fn state(&self) -> LoadingState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Register a synchronous observer called on every transition.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&LoadingState) + Send + Sync + 'static,
    {
        self.inner.observers.subscribe(observer)
    }

    /// Async-friendly view of the same state.
    pub fn watch(&self) -> watch::Receiver<LoadingState> {
        self.inner.watch.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }
}

// ── LoadingGuard ─────────────────────────────────────────────────────

/// One outstanding acquisition. Released on drop.
#[must_use = "dropping the guard releases the loading state immediately"]
pub struct LoadingGuard {
    coordinator: Option<LoadingCoordinator>,
}

impl LoadingGuard {
    /// Release now rather than at end of scope.
    pub fn release(mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.release_one();
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.release_one();
        }
    }
}

impl std::fmt::Debug for LoadingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingGuard")
            .field("released", &self.coordinator.is_none())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recorder(coordinator: &LoadingCoordinator) -> (Arc<Mutex<Vec<LoadingState>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = coordinator.subscribe(move |s| sink.lock().unwrap().push(s.clone()));
        (seen, sub)
    }

    #[test]
    fn busy_until_last_release() {
        let loading = LoadingCoordinator::new();
        let a = loading.acquire(Some("Fetching loans..."));
        let b = loading.acquire(None);
        assert!(loading.is_busy());
        assert_eq!(loading.state().message.as_deref(), Some("Fetching loans..."));

        a.release();
        assert!(loading.is_busy());
        drop(b);
        assert!(!loading.is_busy());
        assert_eq!(loading.state(), LoadingState::default());
    }

    #[test]
    fn observers_see_every_transition() {
        let loading = LoadingCoordinator::new();
        let (seen, _sub) = recorder(&loading);

        let guard = loading.acquire(Some("Applying"));
        drop(guard);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                LoadingState {
                    outstanding: 1,
                    message: Some("Applying".into())
                },
                LoadingState::default(),
            ]
        );
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn failing(loading: &LoadingCoordinator) -> Result<u32, &'static str> {
            let _guard = loading.acquire(None);
            let amount: u32 = "12.50".parse().map_err(|_| "bad amount")?;
            Ok(amount)
        }

        let loading = LoadingCoordinator::new();
        assert!(failing(&loading).is_err());
        assert!(!loading.is_busy());
    }

    #[test]
    fn counter_never_negative_under_interleaving() {
        let loading = LoadingCoordinator::new();
        let (seen, _sub) = recorder(&loading);

        let guards: Vec<_> = (0..5).map(|_| loading.acquire(None)).collect();
        for g in guards.into_iter().rev() {
            g.release();
        }

        let seen = seen.lock().unwrap();
        let counts: Vec<usize> = seen.iter().map(|s| s.outstanding).collect();
        assert_eq!(counts, [1, 2, 3, 4, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn unsubscribe_during_broadcast() {
        let loading = LoadingCoordinator::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        *slot.lock().unwrap() = Some(loading.subscribe(move |_| {
            if let Some(sub) = inner.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        }));

        drop(loading.acquire(None));
        assert_eq!(loading.observer_count(), 0);
    }

    #[test]
    fn last_delivery_matches_final_state_across_threads() {
        let loading = LoadingCoordinator::new();
        let (seen, _sub) = recorder(&loading);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let loading = loading.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let guard = loading.acquire(Some("Syncing"));
                        std::thread::yield_now();
                        drop(guard);
                    }
                });
            }
        });

        assert!(!loading.is_busy());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&LoadingState::default()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_requests_leave_observers_idle() {
        let loading = LoadingCoordinator::new();
        let (seen, _sub) = recorder(&loading);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let loading = loading.clone();
                tokio::spawn(async move {
                    let _guard = loading.acquire(None);
                    tokio::task::yield_now().await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(seen.lock().unwrap().last(), Some(&LoadingState::default()));
    }

    #[tokio::test]
    async fn watch_tracks_state() {
        let loading = LoadingCoordinator::new();
        let rx = loading.watch();
        let guard = loading.acquire(Some("Working"));
        assert!(rx.borrow().is_busy());
        drop(guard);
        assert!(!rx.borrow().is_busy());
    }
}
