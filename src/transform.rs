//! Key and value adapter views
//!
//! Lazy, stateless remappings of an existing cache: nothing is copied, every
//! operation maps its arguments and delegates. Transform failures propagate
//! to the caller untouched.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::{CacheError, CacheResult};

/// Presents a `Cache<K, V>` under a different key type.
///
/// `evict_all` needs no mapping and delegates unchanged.
pub(crate) struct KeyTransform<K2, K, V> {
    inner: Arc<dyn Cache<K, V>>,
    map: Arc<dyn Fn(&K2) -> Option<K> + Send + Sync>,
}

impl<K2, K, V> KeyTransform<K2, K, V> {
    pub(crate) fn new(
        inner: Arc<dyn Cache<K, V>>,
        map: Arc<dyn Fn(&K2) -> Option<K> + Send + Sync>,
    ) -> Self {
        Self { inner, map }
    }

    fn map_key(&self, key: &K2) -> CacheResult<K> {
        (self.map)(key)
            .ok_or_else(|| CacheError::validation("key transform produced no key"))
    }
}

impl<K2, K, V> fmt::Debug for KeyTransform<K2, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTransform")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<K2, K, V> Cache<K2, V> for KeyTransform<K2, K, V>
where
    K2: Send + Sync + 'static,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &K2) -> CacheResult<Option<V>> {
        let mapped = self.map_key(key)?;
        self.inner.get(&mapped).await
    }

    async fn set(&self, key: K2, value: V) -> CacheResult<()> {
        let mapped = self.map_key(&key)?;
        self.inner.set(mapped, value).await
    }

    async fn evict(&self, key: &K2) -> CacheResult<()> {
        let mapped = self.map_key(key)?;
        self.inner.evict(&mapped).await
    }

    async fn evict_all(&self) -> CacheResult<()> {
        self.inner.evict_all().await
    }
}

/// Two-way value view: `get` maps out, `set` maps back in.
pub(crate) struct ValueTransform<K, V, V2> {
    inner: Arc<dyn Cache<K, V>>,
    map: Arc<dyn Fn(V) -> CacheResult<V2> + Send + Sync>,
    unmap: Arc<dyn Fn(V2) -> CacheResult<V> + Send + Sync>,
}

impl<K, V, V2> ValueTransform<K, V, V2> {
    pub(crate) fn new(
        inner: Arc<dyn Cache<K, V>>,
        map: Arc<dyn Fn(V) -> CacheResult<V2> + Send + Sync>,
        unmap: Arc<dyn Fn(V2) -> CacheResult<V> + Send + Sync>,
    ) -> Self {
        Self { inner, map, unmap }
    }
}

impl<K, V, V2> fmt::Debug for ValueTransform<K, V, V2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueTransform")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<K, V, V2> Cache<K, V2> for ValueTransform<K, V, V2>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    V2: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V2>> {
        match self.inner.get(key).await? {
            Some(value) => Ok(Some((self.map)(value)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: K, value: V2) -> CacheResult<()> {
        let unmapped = (self.unmap)(value)?;
        self.inner.set(key, unmapped).await
    }

    async fn evict(&self, key: &K) -> CacheResult<()> {
        self.inner.evict(key).await
    }

    async fn evict_all(&self) -> CacheResult<()> {
        self.inner.evict_all().await
    }
}

/// One-way value view: a read-only fetcher whose mutators are no-ops.
pub(crate) struct ValueFetchTransform<K, V, V2> {
    inner: Arc<dyn Cache<K, V>>,
    map: Arc<dyn Fn(V) -> CacheResult<V2> + Send + Sync>,
}

impl<K, V, V2> ValueFetchTransform<K, V, V2> {
    pub(crate) fn new(
        inner: Arc<dyn Cache<K, V>>,
        map: Arc<dyn Fn(V) -> CacheResult<V2> + Send + Sync>,
    ) -> Self {
        Self { inner, map }
    }
}

impl<K, V, V2> fmt::Debug for ValueFetchTransform<K, V, V2> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFetchTransform")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<K, V, V2> Cache<K, V2> for ValueFetchTransform<K, V, V2>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
    V2: Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V2>> {
        match self.inner.get(key).await? {
            Some(value) => Ok(Some((self.map)(value)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, _key: K, _value: V2) -> CacheResult<()> {
        Ok(())
    }

    async fn evict(&self, _key: &K) -> CacheResult<()> {
        Ok(())
    }

    async fn evict_all(&self) -> CacheResult<()> {
        Ok(())
    }
}
