//! The cache contract and batch extension

use std::fmt::Debug;

use async_trait::async_trait;
use futures::future;

use crate::error::{CacheError, CacheResult};

/// Generic asynchronous cache over owned keys and values
///
/// Absence is not an error: `get` resolves to `Ok(None)` for a missing key.
/// Combinators implement this trait themselves, so pipelines can be nested
/// arbitrarily deep. Implementations must not reach into each other's state;
/// all cross-cache communication goes through these four operations.
#[async_trait]
pub trait Cache<K, V>: Send + Sync + Debug {
    /// Gets the value cached under `key`, if any
    async fn get(&self, key: &K) -> CacheResult<Option<V>>;

    /// Stores `value` under `key`
    async fn set(&self, key: K, value: V) -> CacheResult<()>;

    /// Removes the entry for `key`, if present
    async fn evict(&self, key: &K) -> CacheResult<()>;

    /// Removes every entry
    async fn evict_all(&self) -> CacheResult<()>;
}

/// Extension trait providing batch operations over any [`Cache`]
///
/// Both methods fan out one task per key, wait for every task to settle, and
/// only then report failure. Multiple failures are aggregated so that no
/// cause is lost.
#[async_trait]
pub trait CacheExt<K, V>: Cache<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Gets every key concurrently.
    ///
    /// The returned values are positionally stable: `result[i]` corresponds
    /// to `keys[i]` no matter which fetch finished first.
    async fn batch_get(&self, keys: &[K]) -> CacheResult<Vec<Option<V>>> {
        let results = future::join_all(keys.iter().map(|key| self.get(key))).await;

        let mut values = Vec::with_capacity(results.len());
        let mut failures = Vec::new();

        for result in results {
            match result {
                Ok(value) => values.push(value),
                Err(error) => failures.push(error),
            }
        }

        match CacheError::from_failures("batch get failed", failures) {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    /// Sets every entry concurrently, waiting for all writes to settle.
    async fn batch_set(&self, entries: Vec<(K, V)>) -> CacheResult<()> {
        let results = future::join_all(
            entries.into_iter().map(|(key, value)| self.set(key, value)),
        )
        .await;

        let failures: Vec<CacheError> =
            results.into_iter().filter_map(Result::err).collect();

        match CacheError::from_failures("batch set failed", failures) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<T, K, V> CacheExt<K, V> for T
where
    T: Cache<K, V> + ?Sized,
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
}
