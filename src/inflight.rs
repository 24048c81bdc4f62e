//! Coalescing of concurrent `get` calls for the same key

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use tracing::debug;

use crate::cache::Cache;
use crate::error::CacheResult;

type GetFuture<V> = BoxFuture<'static, CacheResult<Option<V>>>;

struct InflightEntry<V> {
    generation: u64,
    task: WeakShared<GetFuture<V>>,
}

type Registry<K, V> = Arc<Mutex<HashMap<K, InflightEntry<V>>>>;

/// Wrapper ensuring at most one concurrent `get` per key reaches the inner
/// cache, with every concurrent caller receiving the same result
///
/// The registry holds the in-flight fetch weakly: waiters keep the shared
/// future alive, and a guard inside the fetch removes the entry on every
/// exit path, so neither completion, failure, nor cancellation can leave a
/// stale entry that would wedge later callers. Mutations pass straight
/// through; only `get` is coalesced.
pub(crate) struct ReuseInflight<K, V> {
    inner: Arc<dyn Cache<K, V>>,
    registry: Registry<K, V>,
    generation: AtomicU64,
}

impl<K, V> ReuseInflight<K, V> {
    pub(crate) fn new(inner: Arc<dyn Cache<K, V>>) -> Self {
        Self {
            inner,
            registry: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K, V> fmt::Debug for ReuseInflight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReuseInflight")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the registry entry when the fetch finishes or is dropped.
///
/// The generation check keeps a late-running guard from evicting a successor
/// entry registered after this fetch was cancelled.
struct InflightGuard<K, V>
where
    K: Eq + Hash,
{
    registry: Registry<K, V>,
    key: Option<K>,
    generation: u64,
}

impl<K, V> Drop for InflightGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut registry = lock(&self.registry);
            let matches = registry
                .get(&key)
                .is_some_and(|entry| entry.generation == self.generation);
            if matches {
                registry.remove(&key);
            }
        }
    }
}

impl<K, V> ReuseInflight<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Joins the in-flight fetch for `key`, starting one if none is live.
    fn attach(&self, key: &K) -> Shared<GetFuture<V>> {
        let mut registry = lock(&self.registry);

        if let Some(task) = registry.get(key).and_then(|entry| entry.task.upgrade()) {
            debug!("joining in-flight get");
            return task;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let cleanup_registry = Arc::clone(&self.registry);
        let owned_key = key.clone();

        let task = async move {
            let _cleanup = InflightGuard {
                registry: cleanup_registry,
                key: Some(owned_key.clone()),
                generation,
            };
            inner.get(&owned_key).await
        }
        .boxed()
        .shared();

        if let Some(weak) = task.downgrade() {
            registry.insert(key.clone(), InflightEntry { generation, task: weak });
        }

        task
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for ReuseInflight<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.attach(key).await
    }

    async fn set(&self, key: K, value: V) -> CacheResult<()> {
        self.inner.set(key, value).await
    }

    async fn evict(&self, key: &K) -> CacheResult<()> {
        self.inner.evict(key).await
    }

    async fn evict_all(&self) -> CacheResult<()> {
        self.inner.evict_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::mock::MockStore;
    use crate::error::CacheError;
    use crate::handle::CacheHandle;

    type Store = MockStore<String, String>;

    fn coalesced(store: Store) -> (Arc<Store>, CacheHandle<String, String>) {
        let store = Arc::new(store);
        let handle = CacheHandle::from_arc(store.clone())
            .reuse_inflight()
            .unwrap();
        (store, handle)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_underlying_call() {
        let (store, cache) = coalesced(
            Store::new()
                .with_entry(key("k"), key("v"))
                .with_get_delay(Duration::from_millis(100)),
        );

        let k = key("k");
        let (first, second, third) =
            tokio::join!(cache.get(&k), cache.get(&k), cache.get(&k));

        assert_eq!(store.get_calls(), 1);
        assert_eq!(first.unwrap(), Some(key("v")));
        assert_eq!(second.unwrap(), Some(key("v")));
        assert_eq!(third.unwrap(), Some(key("v")));
    }

    #[tokio::test]
    async fn test_get_after_completion_starts_fresh() {
        let (store, cache) = coalesced(Store::new().with_entry(key("k"), key("v")));

        cache.get(&key("k")).await.unwrap();
        cache.get(&key("k")).await.unwrap();

        assert_eq!(store.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_are_not_coalesced() {
        let (store, cache) = coalesced(
            Store::new()
                .with_entry(key("a"), key("1"))
                .with_entry(key("b"), key("2"))
                .with_get_delay(Duration::from_millis(100)),
        );

        let a = key("a");
        let b = key("b");
        let (first, second) = tokio::join!(cache.get(&a), cache.get(&b));

        assert_eq!(store.get_calls(), 2);
        assert_eq!(first.unwrap(), Some(key("1")));
        assert_eq!(second.unwrap(), Some(key("2")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_shared_and_registry_recovers() {
        let (store, cache) = coalesced(
            Store::new()
                .with_get_error("backend down")
                .with_get_delay(Duration::from_millis(100)),
        );

        let k = key("k");
        let (first, second) = tokio::join!(cache.get(&k), cache.get(&k));

        assert_eq!(store.get_calls(), 1);
        assert_eq!(first.unwrap_err().to_string(), "store error: backend down");
        assert_eq!(second.unwrap_err().to_string(), "store error: backend down");

        // The failed entry was removed; a later call issues a fresh fetch.
        let error = cache.get(&key("k")).await.unwrap_err();
        assert!(matches!(error, CacheError::Store { .. }));
        assert_eq!(store.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_fetch_does_not_wedge_later_callers() {
        let (store, cache) = coalesced(
            Store::new()
                .with_entry(key("k"), key("v"))
                .with_get_delay(Duration::from_millis(200)),
        );

        let k = key("k");
        tokio::select! {
            _ = cache.get(&k) => panic!("get should still be in flight"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        // The cancelled fetch cleaned up after itself.
        let value = cache.get(&key("k")).await.unwrap();
        assert_eq!(value, Some(key("v")));
        assert_eq!(store.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_waiter_survives_sibling_drop() {
        let (store, cache) = coalesced(
            Store::new()
                .with_entry(key("k"), key("v"))
                .with_get_delay(Duration::from_millis(200)),
        );

        let survivor = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(&key("k")).await })
        };
        tokio::task::yield_now().await;

        // A second waiter joins the same fetch, then drops out mid-flight.
        let k = key("k");
        tokio::select! {
            _ = cache.get(&k) => panic!("get should still be in flight"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        // The surviving waiter kept the fetch alive and got the value.
        let value = survivor.await.unwrap().unwrap();
        assert_eq!(value, Some(key("v")));
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_mutations_pass_through() {
        let (store, cache) = coalesced(Store::new());

        cache.set(key("k"), key("v")).await.unwrap();
        assert_eq!(store.entry(&key("k")), Some(key("v")));

        cache.evict(&key("k")).await.unwrap();
        assert_eq!(store.entry(&key("k")), None);

        cache.evict_all().await.unwrap();
        assert_eq!(store.evict_all_calls(), 1);
    }

    #[tokio::test]
    async fn test_stacking_the_coalescer_fails_fast() {
        let (_, cache) = coalesced(Store::new());

        let error = cache.reuse_inflight().unwrap_err();
        assert!(matches!(error, CacheError::Configuration { .. }));
    }
}
