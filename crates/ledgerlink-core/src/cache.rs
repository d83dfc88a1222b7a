// ── Request cache ──
//
// Settled values keyed by canonical request key, plus a map of in-flight
// reads so concurrent callers for the same key share one network call.
//
// Each flight runs on its own task: a caller that stops awaiting (dropped
// future, unmounted view) does not cancel the call for other joiners. The
// flight stores its value only if it is still the registered flight for
// that key when it settles, so an invalidation that lands mid-flight is
// never undone by a late response.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use ledgerlink_api::Method;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::error::CoreError;

type Outcome = Result<Arc<Value>, CoreError>;

// ── CacheKey ─────────────────────────────────────────────────────────

/// Canonical identifier for a request.
///
/// Rendered as `path[?sorted-query] METHOD[ #body]` so that path-prefix
/// invalidation is a plain `starts_with` on the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(method: &Method, path: &str, query: &[(String, String)], body: Option<&Value>) -> Self {
        let mut key = path.to_owned();

        if !query.is_empty() {
            let mut pairs: Vec<_> = query.iter().collect();
            pairs.sort();
            key.push('?');
            for (i, (k, v)) in pairs.into_iter().enumerate() {
                if i > 0 {
                    key.push('&');
                }
                key.push_str(k);
                key.push('=');
                key.push_str(v);
            }
        }

        key.push(' ');
        key.push_str(method.as_str());

        if let Some(body) = body.filter(|b| !b.is_null()) {
            key.push_str(" #");
            key.push_str(&body.to_string());
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Entries ──────────────────────────────────────────────────────────

struct CacheEntry {
    value: Arc<Value>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

struct InFlight {
    id: u64,
    outcome: Shared<BoxFuture<'static, Outcome>>,
}

struct CacheInner {
    entries: DashMap<String, CacheEntry>,
    in_flight: DashMap<String, InFlight>,
    next_flight: AtomicU64,
}

impl CacheInner {
    /// Called by the flight task once its producer settles.
    fn settle(&self, key: &str, id: u64, ttl: Duration, result: &Outcome) {
        // The in-flight shard stays locked while the value is stored, so a
        // concurrent `invalidate_prefix` either removes this flight first
        // (nothing stored) or runs after the store and evicts it.
        if let Entry::Occupied(flight) = self.in_flight.entry(key.to_owned()) {
            if flight.get().id != id {
                return;
            }
            if let Ok(value) = result {
                self.entries.insert(
                    key.to_owned(),
                    CacheEntry {
                        value: value.clone(),
                        stored_at: Instant::now(),
                        ttl,
                    },
                );
            }
            flight.remove();
        } else {
            debug!(key, "flight invalidated before settling; result not cached");
        }
    }
}

// ── RequestCache ─────────────────────────────────────────────────────

/// Shared request cache. Cheap to clone; clones share entries.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<CacheInner>,
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: DashMap::new(),
                in_flight: DashMap::new(),
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Fresh value for `key`, evicting it if its TTL has lapsed.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Value>> {
        let now = Instant::now();
        {
            let entry = self.inner.entries.get(key.as_str())?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        self.inner
            .entries
            .remove_if(key.as_str(), |_, entry| entry.is_expired(now));
        None
    }

    pub fn put(&self, key: &CacheKey, value: Value, ttl: Duration) {
        self.inner.entries.insert(
            key.as_str().to_owned(),
            CacheEntry {
                value: Arc::new(value),
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value for `key`, or run `producer` exactly once no
    /// matter how many callers ask concurrently. Every caller gets the same
    /// settled outcome. Failures are never stored.
    pub async fn fetch_or_join<F>(&self, key: &CacheKey, ttl: Duration, producer: F) -> Outcome
    where
        F: Future<Output = Result<Value, CoreError>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            debug!(%key, "cache hit");
            return Ok(value);
        }

        let outcome = match self.inner.in_flight.entry(key.as_str().to_owned()) {
            Entry::Occupied(flight) => {
                debug!(%key, "joining in-flight request");
                flight.get().outcome.clone()
            }
            Entry::Vacant(slot) => {
                // A flight may have settled between the miss above and
                // taking this slot.
                if let Some(value) = self.get(key) {
                    return Ok(value);
                }

                debug!(%key, "cache miss");
                let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let flight_key = key.as_str().to_owned();
                let task = tokio::spawn(async move {
                    let result = producer.await.map(Arc::new);
                    inner.settle(&flight_key, id, ttl, &result);
                    result
                });

                let outcome = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(CoreError::Unavailable {
                            message: format!("request task failed: {e}"),
                        })
                    })
                }
                .boxed()
                .shared();

                slot.insert(InFlight {
                    id,
                    outcome: outcome.clone(),
                });
                outcome
            }
        };

        outcome.await
    }

    /// Drop every entry and in-flight registration whose key starts with
    /// `prefix`. Returns the number of settled entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.inner.in_flight.retain(|key, _| !key.starts_with(prefix));

        let before = self.inner.entries.len();
        self.inner.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before.saturating_sub(self.inner.entries.len());
        debug!(prefix, removed, "cache invalidated");
        removed
    }

    pub fn clear(&self) {
        self.inner.in_flight.clear();
        self.inner.entries.clear();
    }

    /// Evict every expired entry. Reads evict lazily; this is for callers
    /// that want to bound memory between reads.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.inner.entries.retain(|_, entry| !entry.is_expired(now));
    }

    /// Settled entries currently held (fresh or not yet evicted).
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn key(path: &str) -> CacheKey {
        CacheKey::new(&Method::GET, path, &[], None)
    }

    const TTL: Duration = Duration::from_secs(30);

    #[test]
    fn key_is_canonical() {
        let a = CacheKey::new(
            &Method::GET,
            "/api/transaction/ACC1",
            &[("size".into(), "20".into()), ("page".into(), "2".into())],
            None,
        );
        let b = CacheKey::new(
            &Method::GET,
            "/api/transaction/ACC1",
            &[("page".into(), "2".into()), ("size".into(), "20".into())],
            None,
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "/api/transaction/ACC1?page=2&size=20 GET");
        assert!(a.has_prefix("/api/transaction"));

        let with_body = CacheKey::new(&Method::POST, "/api/x", &[], Some(&json!({ "b": 1, "a": 2 })));
        assert_eq!(with_body.as_str(), r#"/api/x POST #{"a":2,"b":1}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_by_ttl() {
        let cache = RequestCache::new();
        cache.put(&key("/api/loan/my/A"), json!([1]), TTL);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get(&key("/api/loan/my/A")).is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get(&key("/api/loan/my/A")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_call() {
        let cache = RequestCache::new();
        let account = key("/api/account/A");
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let c = calls.clone();
        let first = cache.fetch_or_join(&account, TTL, async move {
            c.fetch_add(1, Ordering::SeqCst);
            gate.await.ok();
            Ok(json!({ "balance": 10 }))
        });
        let c = calls.clone();
        let second = cache.fetch_or_join(&account, TTL, async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "balance": 99 }))
        });

        let (a, b, ()) = tokio::join!(first, second, async {
            tokio::task::yield_now().await;
            release.send(()).unwrap();
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_shared_but_not_stored() {
        let cache = RequestCache::new();
        let tickets = key("/api/support/my");
        let err = CoreError::Unavailable {
            message: "connection refused".into(),
        };

        let (a, b) = tokio::join!(
            cache.fetch_or_join(&tickets, TTL, {
                let err = err.clone();
                async move {
                    tokio::task::yield_now().await;
                    Err(err)
                }
            }),
            cache.fetch_or_join(&tickets, TTL, async { Ok(json!("unused")) }),
        );
        assert_eq!(a.unwrap_err(), err);
        assert_eq!(b.unwrap_err(), err);
        assert!(cache.is_empty());

        let retried = cache
            .fetch_or_join(&tickets, TTL, async { Ok(json!([])) })
            .await
            .unwrap();
        assert_eq!(*retried, json!([]));
    }

    #[tokio::test]
    async fn invalidation_mid_flight_discards_late_result() {
        let cache = RequestCache::new();
        let loans = key("/api/loan/my/A");
        let (release, gate) = oneshot::channel::<()>();

        let (result, ()) = tokio::join!(
            cache.fetch_or_join(&loans, TTL, async move {
                gate.await.ok();
                Ok(json!(["stale"]))
            }),
            async {
                tokio::task::yield_now().await;
                cache.invalidate_prefix("/api/loan");
                release.send(()).unwrap();
            }
        );

        assert_eq!(*result.unwrap(), json!(["stale"]));
        assert!(cache.get(&loans).is_none());
    }

    #[tokio::test]
    async fn abandoned_caller_does_not_cancel_the_call() {
        let cache = RequestCache::new();
        let analytics = key("/api/analytics/loans");
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let c = calls.clone();
        let abandoned = cache.fetch_or_join(&analytics, TTL, async move {
            c.fetch_add(1, Ordering::SeqCst);
            gate.await.ok();
            Ok(json!({ "total": 3 }))
        });
        // Poll once so the flight is registered, then drop it.
        assert!(futures_util::poll!(Box::pin(abandoned)).is_pending());

        release.send(()).unwrap();
        let value = cache
            .fetch_or_join(&analytics, TTL, async {
                Ok(json!({ "total": -1 }))
            })
            .await
            .unwrap();

        assert_eq!(*value, json!({ "total": 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefix_invalidation_is_scoped() {
        let cache = RequestCache::new();
        cache.put(&key("/api/loan/my/A"), json!(1), TTL);
        cache.put(&key("/api/loan/5"), json!(2), TTL);
        cache.put(&key("/api/support/my"), json!(3), TTL);

        assert_eq!(cache.invalidate_prefix("/api/loan"), 2);
        assert!(cache.get(&key("/api/support/my")).is_some());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = RequestCache::new();
        cache.put(&key("/short"), json!(1), Duration::from_secs(5));
        cache.put(&key("/long"), json!(2), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(10)).await;
        cache.purge_expired();

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("/long")).is_some());
    }
}
