//! The composition surface for building cache pipelines

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::compose::Composed;
use crate::error::{CacheError, CacheResult};
use crate::fetch::{FetchFn, Fetcher, FetcherCache};
use crate::inflight::ReuseInflight;
use crate::topology::Topology;
use crate::transform::{KeyTransform, ValueFetchTransform, ValueTransform};

/// A cheaply clonable pipeline of caches
///
/// Wraps any [`Cache`] implementation and offers the combinators that build
/// pipelines: [`compose`](CacheHandle::compose),
/// [`reuse_inflight`](CacheHandle::reuse_inflight),
/// [`key_transform`](CacheHandle::key_transform), and the value transforms.
/// Every combinator returns a new handle implementing the same contract, so
/// pipelines nest arbitrarily deep.
///
/// The handle tracks which base caches the pipeline was built from. Base
/// identity follows the shared allocation: handles cloned from one handle
/// (or built with [`from_arc`](CacheHandle::from_arc) over one `Arc`) refer
/// to the same base cache, which is what lets `compose` reject circular
/// pipelines at construction time.
pub struct CacheHandle<K, V> {
    inner: Arc<dyn Cache<K, V>>,
    topology: Topology,
    coalesced: bool,
}

impl<K, V> Clone for CacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            topology: self.topology.clone(),
            coalesced: self.coalesced,
        }
    }
}

impl<K, V> fmt::Debug for CacheHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle")
            .field("inner", &self.inner)
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Wraps a cache implementation in a handle.
    pub fn new<C>(cache: C) -> Self
    where
        C: Cache<K, V> + 'static,
    {
        Self::from_arc(Arc::new(cache))
    }

    /// Wraps an already shared cache.
    ///
    /// Handles built from clones of the same `Arc` count as the same base
    /// cache for cycle detection.
    pub fn from_arc<C>(cache: Arc<C>) -> Self
    where
        C: Cache<K, V> + 'static,
    {
        let inner: Arc<dyn Cache<K, V>> = cache;
        let topology = Topology::leaf(&inner);
        Self {
            inner,
            topology,
            coalesced: false,
        }
    }

    /// Wraps a [`Fetcher`] as a read-only pipeline stage.
    pub fn from_fetcher<F>(fetcher: F) -> Self
    where
        F: Fetcher<K, V> + 'static,
    {
        Self::new(FetcherCache::new(fetcher))
    }

    /// Wraps an async closure as a read-only pipeline stage.
    pub fn from_fn<F, Fut>(fetch: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<Option<V>>> + Send + 'static,
    {
        Self::new(FetchFn::new(fetch))
    }

    /// Chains this cache in front of `fallback`.
    ///
    /// `get` prefers this cache and populates it from `fallback` on a miss;
    /// mutations fan out to both sides concurrently with failures
    /// aggregated.
    ///
    /// Fails with a configuration error when the combined pipeline would
    /// reach any base cache through more than one path, including composing
    /// a cache with itself through an arbitrary chain of transforms,
    /// coalescers, and other composes. Nothing is constructed on failure.
    pub fn compose(self, fallback: CacheHandle<K, V>) -> CacheResult<CacheHandle<K, V>> {
        let topology = Topology::node(vec![self.topology, fallback.topology]);
        if topology.has_duplicate_leaves() {
            return Err(CacheError::configuration(
                "cache creates a circular reference",
            ));
        }

        let inner: Arc<dyn Cache<K, V>> =
            Arc::new(Composed::new(self.inner, fallback.inner));
        Ok(CacheHandle {
            inner,
            topology,
            coalesced: false,
        })
    }

    /// Alias for [`compose`](CacheHandle::compose).
    pub fn plus(self, fallback: CacheHandle<K, V>) -> CacheResult<CacheHandle<K, V>> {
        self.compose(fallback)
    }

    /// Deduplicates concurrent `get` calls for the same key.
    ///
    /// At most one concurrent `get` per key reaches the wrapped pipeline;
    /// every concurrent caller receives the same result. Mutations pass
    /// through unchanged.
    ///
    /// Fails with a configuration error when applied directly on an
    /// already-coalesced handle, since stacking the coalescer on itself is
    /// meaningless and signals a usage mistake.
    pub fn reuse_inflight(self) -> CacheResult<CacheHandle<K, V>> {
        if self.coalesced {
            return Err(CacheError::configuration(
                "get calls are already coalesced; remove the extra reuse_inflight",
            ));
        }

        let topology = Topology::node(vec![self.topology]);
        let inner: Arc<dyn Cache<K, V>> = Arc::new(ReuseInflight::new(self.inner));
        Ok(CacheHandle {
            inner,
            topology,
            coalesced: true,
        })
    }

    /// Presents the pipeline under a different key type.
    ///
    /// `map` translates every outer key before delegating; returning `None`
    /// makes the operation fail with a validation error. `evict_all` needs
    /// no key and delegates unchanged.
    pub fn key_transform<K2, F>(self, map: F) -> CacheHandle<K2, V>
    where
        K2: Clone + Eq + Hash + Send + Sync + 'static,
        F: Fn(&K2) -> Option<K> + Send + Sync + 'static,
    {
        let topology = Topology::node(vec![self.topology]);
        let inner: Arc<dyn Cache<K2, V>> =
            Arc::new(KeyTransform::new(self.inner, Arc::new(map)));
        CacheHandle {
            inner,
            topology,
            coalesced: false,
        }
    }

    /// Presents the pipeline under a different value type, two-way.
    ///
    /// `map` is applied to values read out, `unmap` to values written in;
    /// eviction passes straight through. Transform errors propagate
    /// uncaught.
    pub fn value_transform<V2, F, G>(self, map: F, unmap: G) -> CacheHandle<K, V2>
    where
        V2: Clone + Send + Sync + 'static,
        F: Fn(V) -> CacheResult<V2> + Send + Sync + 'static,
        G: Fn(V2) -> CacheResult<V> + Send + Sync + 'static,
    {
        let topology = Topology::node(vec![self.topology]);
        let inner: Arc<dyn Cache<K, V2>> =
            Arc::new(ValueTransform::new(self.inner, Arc::new(map), Arc::new(unmap)));
        CacheHandle {
            inner,
            topology,
            coalesced: false,
        }
    }

    /// Presents the pipeline under a different value type, one-way.
    ///
    /// The result is read-only: `get` maps values out, mutators are defined
    /// no-ops per the fetcher contract.
    pub fn value_transform_fetch<V2, F>(self, map: F) -> CacheHandle<K, V2>
    where
        V2: Clone + Send + Sync + 'static,
        F: Fn(V) -> CacheResult<V2> + Send + Sync + 'static,
    {
        let topology = Topology::node(vec![self.topology]);
        let inner: Arc<dyn Cache<K, V2>> =
            Arc::new(ValueFetchTransform::new(self.inner, Arc::new(map)));
        CacheHandle {
            inner,
            topology,
            coalesced: false,
        }
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for CacheHandle<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.inner.get(key).await
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
