//! Read-only data sources
//!
//! A [`Fetcher`] is a cache whose data cannot be written back: network
//! calls, RPC lookups, anything the pipeline can only read from. Adapters
//! present fetchers as full [`Cache`] implementations whose mutators are
//! defined no-ops, so they slot into any pipeline position.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::CacheResult;

/// A read-only source of values
#[async_trait]
pub trait Fetcher<K, V>: Send + Sync + fmt::Debug {
    /// Fetches the value for `key`, if the source has one
    async fn fetch(&self, key: &K) -> CacheResult<Option<V>>;
}

/// Presents a [`Fetcher`] as a [`Cache`] with no-op mutators.
#[derive(Debug)]
pub(crate) struct FetcherCache<F> {
    fetcher: F,
}

impl<F> FetcherCache<F> {
    pub(crate) fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl<F, K, V> Cache<K, V> for FetcherCache<F>
where
    F: Fetcher<K, V>,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.fetcher.fetch(key).await
    }

    async fn set(&self, _key: K, _value: V) -> CacheResult<()> {
        Ok(())
    }

    async fn evict(&self, _key: &K) -> CacheResult<()> {
        Ok(())
    }

    async fn evict_all(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Closure-based read-only source, for ad-hoc fetchers.
pub(crate) struct FetchFn<F> {
    fetch: F,
}

impl<F> FetchFn<F> {
    pub(crate) fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> fmt::Debug for FetchFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, K, V> Cache<K, V> for FetchFn<F>
where
    F: Fn(K) -> Fut + Send + Sync,
    Fut: Future<Output = CacheResult<Option<V>>> + Send,
    K: Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        (self.fetch)(key.clone()).await
    }

    async fn set(&self, _key: K, _value: V) -> CacheResult<()> {
        Ok(())
    }

    async fn evict(&self, _key: &K) -> CacheResult<()> {
        Ok(())
    }

    async fn evict_all(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::CacheError;
    use crate::handle::CacheHandle;

    #[derive(Debug)]
    struct UpperCaser;

    #[async_trait]
    impl Fetcher<String, String> for UpperCaser {
        async fn fetch(&self, key: &String) -> CacheResult<Option<String>> {
            Ok(Some(key.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_fetcher_adapter_reads_and_ignores_writes() {
        let cache = CacheHandle::from_fetcher(UpperCaser);

        let value = cache.get(&"hello".to_string()).await.unwrap();
        assert_eq!(value, Some("HELLO".to_string()));

        // Mutators are defined no-ops.
        cache.set("hello".to_string(), "ignored".to_string()).await.unwrap();
        let value = cache.get(&"hello".to_string()).await.unwrap();
        assert_eq!(value, Some("HELLO".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_fn_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let cache: CacheHandle<String, usize> = CacheHandle::from_fn(move |key: String| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(Some(key.len()))
            }
        });

        assert_eq!(cache.get(&"four".to_string()).await.unwrap(), Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.evict(&"four".to_string()).await.unwrap();
        cache.evict_all().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_fn_errors_propagate() {
        let cache: CacheHandle<String, String> = CacheHandle::from_fn(|_key: String| async {
            Err(CacheError::store("origin unreachable"))
        });

        let error = cache.get(&"k".to_string()).await.unwrap_err();
        assert_eq!(error.to_string(), "store error: origin unreachable");
    }
}
