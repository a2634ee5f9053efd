//! In-memory response cache with per-lookup TTL and request coalescing.
//!
//! Every key is in one of two states:
//!
//! - **Pending**: a fetch is in flight. Later callers for the same key
//!   attach to it instead of starting their own, so the producer runs at
//!   most once concurrently per key.
//! - **Ready**: the fetch succeeded. The value is served until it is older
//!   than the TTL passed to the lookup; the next lookup after that starts a
//!   fresh fetch.
//!
//! Failures are never stored. A failed (or panicked) fetch removes its
//! Pending entry and every waiter receives the same error; the next lookup
//! retries.
//!
//! In-flight fetches run on a detached task, so a caller going away does not
//! cancel work that other waiters, or the next caller, still need.
//!
//! Expiry is checked lazily on access; there is no sweeper. Every miss also
//! drops Ready entries that have outlived the lookup's TTL, so keys that are
//! never requested again don't accumulate.

pub mod clock;

pub use clock::{Clock, SystemClock};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tracing::debug;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

enum Entry<V, E> {
    Pending { fetch: SharedFetch<V, E>, id: u64 },
    Ready { value: V, stored_at: Instant },
}

struct Inner<K, V, E> {
    entries: Mutex<HashMap<K, Entry<V, E>>>,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
}

impl<K, V, E> Inner<K, V, E> {
    fn lock(&self) -> MutexGuard<'_, HashMap<K, Entry<V, E>>> {
        // Entries are only ever replaced whole, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe, cloneable handle to a shared cache.
pub struct CacheStore<K, V, E> {
    inner: Arc<Inner<K, V, E>>,
}

impl<K, V, E> Clone for CacheStore<K, V, E> {
    fn clone(&self) -> Self {
        CacheStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, E> CacheStore<K, V, E>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        CacheStore {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                clock,
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Return the cached value for `key`, joining or starting a fetch when
    /// there is no fresh one.
    ///
    /// `producer` is called at most once, and only on a miss. It should
    /// just build the future; the future itself is driven on a spawned
    /// task, so this must run inside a tokio runtime.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl: Duration, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let fetch = {
            let mut entries = self.inner.lock();
            let now = self.inner.clock.now();

            match entries.get(&key) {
                Some(Entry::Ready { value, stored_at })
                    if now.saturating_duration_since(*stored_at) <= ttl =>
                {
                    debug!("cache hit: {}", key);
                    return Ok(value.clone());
                }
                Some(Entry::Pending { fetch, .. }) => {
                    debug!("cache coalesced onto in-flight fetch: {}", key);
                    fetch.clone()
                }
                _ => {
                    debug!("cache miss: {}", key);
                    let purged = purge_expired(&mut *entries, now, ttl);
                    if purged > 0 {
                        debug!("cache purged {} expired entries", purged);
                    }
                    let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let fetch = self.start_fetch(key.clone(), id, producer());
                    entries.insert(
                        key,
                        Entry::Pending {
                            fetch: fetch.clone(),
                            id,
                        },
                    );
                    tokio::spawn(fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Number of entries, pending or ready (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_fetch<Fut>(&self, key: K, id: u64, fut: Fut) -> SharedFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut guard = Completion {
            store: Arc::downgrade(&self.inner),
            key,
            id,
            settled: false,
        };

        async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => {
                    guard.settle(&result);
                    result
                }
                Err(panic) => {
                    drop(guard);
                    std::panic::resume_unwind(panic)
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Drop Ready entries older than `ttl`. Pending entries are left to their fetch.
fn purge_expired<K, V, E>(
    entries: &mut HashMap<K, Entry<V, E>>,
    now: Instant,
    ttl: Duration,
) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| match entry {
        Entry::Ready { stored_at, .. } => now.saturating_duration_since(*stored_at) <= ttl,
        Entry::Pending { .. } => true,
    });
    before - entries.len()
}

/// Moves a Pending entry to its final state. Dropping it unsettled
/// (panic, runtime shutdown) evicts the entry so the key can't stay stuck.
struct Completion<K: Eq + Hash, V, E> {
    store: Weak<Inner<K, V, E>>,
    key: K,
    id: u64,
    settled: bool,
}

impl<K: Eq + Hash, V: Clone, E> Completion<K, V, E> {
    fn settle(&mut self, result: &Result<V, E>) {
        self.settled = true;
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        let mut entries = inner.lock();
        if !is_own_pending(&entries, &self.key, self.id) {
            return;
        }
        match result {
            Ok(value) => {
                let stored_at = inner.clock.now();
                if let Some(entry) = entries.get_mut(&self.key) {
                    *entry = Entry::Ready {
                        value: value.clone(),
                        stored_at,
                    };
                }
            }
            Err(_) => {
                entries.remove(&self.key);
            }
        }
    }
}

impl<K: Eq + Hash, V, E> Drop for Completion<K, V, E> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            let mut entries = inner.lock();
            if is_own_pending(&entries, &self.key, self.id) {
                entries.remove(&self.key);
            }
        }
    }
}

fn is_own_pending<K: Eq + Hash, V, E>(entries: &HashMap<K, Entry<V, E>>, key: &K, id: u64) -> bool {
    matches!(entries.get(key), Some(Entry::Pending { id: current, .. }) if *current == id)
}

#[cfg(test)]
mod tests {
    use super::clock::ManualClock;
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    const TTL: Duration = Duration::from_secs(120);

    fn store_with_clock() -> (CacheStore<String, u32, String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (CacheStore::new(clock.clone()), clock)
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, String>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_hit_within_ttl_calls_producer_once() {
        let (store, clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = store.get_or_fetch("k".into(), TTL, counting(&calls, 1)).await;
        clock.advance(Duration::from_secs(60));
        let second = store.get_or_fetch("k".into(), TTL, counting(&calls, 2)).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_miss_purges_expired_entries() {
        let (store, clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        for key in ["league=71", "league=72", "league=73"] {
            store.get_or_fetch(key.into(), TTL, counting(&calls, 1)).await.unwrap();
        }
        assert_eq!(store.len(), 3);

        clock.advance(TTL + Duration::from_secs(1));
        store.get_or_fetch("league=500".into(), TTL, counting(&calls, 2)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        store.get_or_fetch("league=501".into(), TTL, counting(&calls, 3)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get_or_fetch("league=500".into(), TTL, counting(&calls, 9)).await,
            Ok(2)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_purge_keeps_pending_entries() {
        let (store, clock) = store_with_clock();
        let (tx, rx) = oneshot::channel::<u32>();

        let slow = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_or_fetch("slow".into(), TTL, move || async move {
                        rx.await.map_err(|e| e.to_string())
                    })
                    .await
            })
        };
        while store.is_empty() {
            tokio::task::yield_now().await;
        }

        clock.advance(TTL * 2);
        let calls = Arc::new(AtomicUsize::new(0));
        store.get_or_fetch("other".into(), TTL, counting(&calls, 1)).await.unwrap();
        assert_eq!(store.len(), 2);

        tx.send(4).unwrap();
        assert_eq!(slow.await.unwrap(), Ok(4));
    }

    #[tokio::test]
    async fn test_entry_at_exact_ttl_is_still_fresh() {
        let (store, clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        store.get_or_fetch("k".into(), TTL, counting(&calls, 1)).await.unwrap();
        clock.advance(TTL);
        store.get_or_fetch("k".into(), TTL, counting(&calls, 2)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetch_after_ttl() {
        let (store, clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        store.get_or_fetch("k".into(), TTL, counting(&calls, 1)).await.unwrap();
        clock.advance(TTL + Duration::from_secs(1));
        let refreshed = store.get_or_fetch("k".into(), TTL, counting(&calls, 2)).await;
        let again = store.get_or_fetch("k".into(), TTL, counting(&calls, 3)).await;

        assert_eq!(refreshed, Ok(2));
        assert_eq!(again, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (store, _clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = store.get_or_fetch("a".into(), TTL, counting(&calls, 1)).await;
        let b = store.get_or_fetch("b".into(), TTL, counting(&calls, 2)).await;

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_coalesce() {
        let (store, _clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..16).map(|_| {
            let store = store.clone();
            let calls = Arc::clone(&calls);
            async move {
                store
                    .get_or_fetch("k".into(), TTL, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, String>(42)
                        }
                    })
                    .await
            }
        });
        let results = futures_util::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 16);
        assert!(results.iter().all(|r| *r == Ok(42)));
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter_and_is_not_kept() {
        let (store, _clock) = store_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));

        let lookups = (0..4).map(|_| {
            let store = store.clone();
            let calls = Arc::clone(&calls);
            async move {
                store
                    .get_or_fetch("k".into(), TTL, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Err::<u32, _>("upstream 503".to_string())
                        }
                    })
                    .await
            }
        });
        let results = futures_util::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Err("upstream 503".to_string())));
        assert!(store.is_empty());

        let retried = store.get_or_fetch("k".into(), TTL, counting(&calls, 7)).await;
        assert_eq!(retried, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let (store, _clock) = store_with_clock();
        let (tx, rx) = oneshot::channel::<u32>();

        let caller = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_or_fetch("k".into(), TTL, move || async move {
                        rx.await.map_err(|e| e.to_string())
                    })
                    .await
            })
        };
        while store.is_empty() {
            tokio::task::yield_now().await;
        }
        caller.abort();
        let _ = caller.await;

        tx.send(9).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let value = store.get_or_fetch("k".into(), TTL, counting(&calls, 1)).await;
        assert_eq!(value, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_producer_is_evicted() {
        let (store, _clock) = store_with_clock();

        let crashed = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .get_or_fetch("k".into(), TTL, || async {
                        if true {
                            panic!("producer blew up");
                        }
                        Ok::<u32, String>(0)
                    })
                    .await
            })
        };
        assert!(crashed.await.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let value = store.get_or_fetch("k".into(), TTL, counting(&calls, 5)).await;
        assert_eq!(value, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
