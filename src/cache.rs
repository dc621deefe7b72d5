//! Short-TTL cache with single-flight coalescing.
//!
//! Concurrent cache misses for the same key share one upstream fetch via a
//! one-shot `broadcast` channel; a fetch that fails drops its channel
//! without sending, so waiters retry (one of them becoming the new
//! leader) rather than being poisoned by a single failed attempt.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};

use crate::error::Error;

enum CachedValue<T> {
    Present(Arc<T>),
    Absent,
}

impl<T> Clone for CachedValue<T> {
    fn clone(&self) -> Self {
        match self {
            CachedValue::Present(v) => CachedValue::Present(v.clone()),
            CachedValue::Absent => CachedValue::Absent,
        }
    }
}

enum Slot<T> {
    Ready {
        value: CachedValue<T>,
        expires_at: Instant,
    },
    Pending(Arc<broadcast::Sender<CachedValue<T>>>),
}

/// A keyed, short-TTL, single-flight cache for cacheable public endpoints.
/// `T` is the cached value type for one cache instance; the REST layer
/// keeps one `Cache<T>` per response shape it wants to cache.
pub struct Cache<T> {
    default_ttl: Duration,
    negative_ttl: Duration,
    entries: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Cache<T> {
    pub fn new(default_ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            default_ttl,
            negative_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value for `key` if fresh; otherwise calls `fetch`
    /// exactly once across all concurrent callers racing on the same key,
    /// caching `Ok(Some(_))` for `default_ttl` and `Ok(None)` for
    /// `negative_ttl`. A fetch that errors is not cached and is surfaced to
    /// every caller that was waiting on it.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Option<Arc<T>>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, Error>>,
    {
        let mut fetch = Some(fetch);
        loop {
            let wait_on = {
                let mut guard = self.entries.lock().await;
                match guard.get(key) {
                    Some(Slot::Ready { value, expires_at }) if Instant::now() < *expires_at => {
                        return Ok(as_option(value.clone()));
                    }
                    Some(Slot::Pending(tx)) => Some(tx.subscribe()),
                    _ => {
                        let (tx, _rx) = broadcast::channel(1);
                        guard.insert(key.to_string(), Slot::Pending(Arc::new(tx)));
                        None
                    }
                }
            };

            if let Some(mut rx) = wait_on {
                match rx.recv().await {
                    Ok(value) => return Ok(as_option(value)),
                    // Leader's fetch failed without caching anything; loop
                    // around and race to become the new leader.
                    Err(_) => continue,
                }
            }

            // We inserted the Pending slot above, so we lead this fetch.
            let fetch_fn = fetch.take().expect("leader path runs fetch exactly once");
            let result = fetch_fn().await;
            let mut guard = self.entries.lock().await;
            let tx = match guard.remove(key) {
                Some(Slot::Pending(tx)) => tx,
                _ => unreachable!("leader always owns the pending slot it inserted"),
            };

            return match result {
                Ok(value) => {
                    let cached = match value {
                        Some(v) => CachedValue::Present(Arc::new(v)),
                        None => CachedValue::Absent,
                    };
                    let ttl = match cached {
                        CachedValue::Present(_) => self.default_ttl,
                        CachedValue::Absent => self.negative_ttl,
                    };
                    guard.insert(
                        key.to_string(),
                        Slot::Ready {
                            value: cached.clone(),
                            expires_at: Instant::now() + ttl,
                        },
                    );
                    drop(guard);
                    let _ = tx.send(cached.clone());
                    Ok(as_option(cached))
                }
                Err(e) => {
                    drop(guard);
                    drop(tx);
                    Err(e)
                }
            };
        }
    }

    /// Evicts a key, forcing the next `get_or_fetch` to miss.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

fn as_option<T>(value: CachedValue<T>) -> Option<Arc<T>> {
    match value {
        CachedValue::Present(v) => Some(v),
        CachedValue::Absent => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_misses_coalesce_into_one_fetch() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(2), Duration::from_secs(1));
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Some(42u32))
        };

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("k", {
                let calls = fetch_calls.clone();
                || fetch(calls)
            }),
            cache.get_or_fetch("k", {
                let calls = fetch_calls.clone();
                || fetch(calls)
            }),
            cache.get_or_fetch("k", {
                let calls = fetch_calls.clone();
                || fetch(calls)
            }),
        );

        assert_eq!(*a.unwrap().unwrap(), 42);
        assert_eq!(*b.unwrap().unwrap(), 42);
        assert_eq!(*c.unwrap().unwrap(), 42);
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn third_call_within_ttl_issues_no_fetch_but_after_ttl_does() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(2), Duration::from_secs(1));
        let fetch_calls = Arc::new(AtomicUsize::new(0));

        let call = |cache: &Cache<u32>, calls: Arc<AtomicUsize>| {
            cache.get_or_fetch("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(1u32))
            })
        };

        call(&cache, fetch_calls.clone()).await.unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        call(&cache, fetch_calls.clone()).await.unwrap();
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        call(&cache, fetch_calls.clone()).await.unwrap();
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(2), Duration::from_secs(1));
        let first = cache
            .get_or_fetch("k", || async { Err(Error::Transient("boom".into())) })
            .await;
        assert!(first.is_err());

        let second = cache.get_or_fetch("k", || async { Ok(Some(7u32)) }).await;
        assert_eq!(*second.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn negative_result_is_cached_as_none() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(2), Duration::from_secs(5));
        let fetch_calls = Arc::new(AtomicUsize::new(0));
        let call = || {
            let calls = fetch_calls.clone();
            cache.get_or_fetch("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
        };
        assert!(call().await.unwrap().is_none());
        assert!(call().await.unwrap().is_none());
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    }
}
