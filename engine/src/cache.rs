//! Request-scoped fetch deduplication.
//!
//! One slot per key, written once. The first requester runs the fetch and
//! every concurrent or later requester for the same key awaits and shares
//! its outcome. A cache lives exactly as long as one top-level request.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

pub(crate) struct FetchCache<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> FetchCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Outcome for `key`, running `fetch` only if no one has yet.
    ///
    /// If the running fetch is dropped before completing, the next waiter
    /// takes over with its own `fetch`.
    pub(crate) async fn get_or_fetch<Fut>(&self, key: K, fetch: Fut) -> V
    where
        Fut: Future<Output = V>,
    {
        let slot = self.slot(key);
        slot.get_or_init(|| fetch).await.clone()
    }

    /// Number of distinct keys requested so far.
    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, key: K) -> Arc<OnceCell<V>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let cache: FetchCache<&str, u32> = FetchCache::new();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let fetch = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            7
        };
        let results = join_all((0..5).map(|_| cache.get_or_fetch("env", fetch()))).await;

        assert_eq!(results, vec![7; 5]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_fetch_independently() {
        let cache: FetchCache<String, String> = FetchCache::new();

        let a = cache.get_or_fetch("a".into(), async { "first".to_string() }).await;
        let b = cache.get_or_fetch("b".into(), async { "second".to_string() }).await;
        let again = cache.get_or_fetch("a".into(), async { "ignored".to_string() }).await;

        assert_eq!((a.as_str(), b.as_str(), again.as_str()), ("first", "second", "first"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn failures_are_shared_outcomes_too() {
        let cache: FetchCache<&str, Option<u32>> = FetchCache::new();

        assert_eq!(cache.get_or_fetch("x", async { None }).await, None);
        assert_eq!(cache.get_or_fetch("x", async { Some(1) }).await, None);
    }
}
