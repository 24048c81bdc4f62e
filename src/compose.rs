//! Read-through composition of two caches

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::cache::Cache;
use crate::error::{CacheError, CacheResult};

/// A cache that prefers `primary` and falls back to `secondary`, populating
/// `primary` from `secondary` on a miss
///
/// Mutations fan out to both sides concurrently; both sides always run to
/// completion before the combined operation resolves, and parallel failures
/// are aggregated rather than dropped.
pub(crate) struct Composed<K, V> {
    primary: Arc<dyn Cache<K, V>>,
    secondary: Arc<dyn Cache<K, V>>,
}

impl<K, V> Composed<K, V> {
    pub(crate) fn new(
        primary: Arc<dyn Cache<K, V>>,
        secondary: Arc<dyn Cache<K, V>>,
    ) -> Self {
        Self { primary, secondary }
    }
}

impl<K, V> fmt::Debug for Composed<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed")
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .finish()
    }
}

/// Reports the combined outcome of a two-sided fan-out.
///
/// Outcomes are in start order: the primary cache's failure becomes the
/// primary cause when both sides fail.
fn merge_outcomes(
    operation: &str,
    primary: CacheResult<()>,
    secondary: CacheResult<()>,
) -> CacheResult<()> {
    let failures: Vec<CacheError> = [primary.err(), secondary.err()]
        .into_iter()
        .flatten()
        .collect();

    match CacheError::from_failures(
        format!("{operation} failed in both the primary and secondary cache"),
        failures,
    ) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[async_trait]
impl<K, V> Cache<K, V> for Composed<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> CacheResult<Option<V>> {
        // A primary failure propagates untouched; it is never masked by
        // reading the secondary.
        if let Some(value) = self.primary.get(key).await? {
            trace!("primary cache hit");
            return Ok(Some(value));
        }

        debug!("primary cache miss, reading through to secondary");
        match self.secondary.get(key).await? {
            Some(value) => {
                self.primary.set(key.clone(), value.clone()).await?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: K, value: V) -> CacheResult<()> {
        let (primary, secondary) = tokio::join!(
            self.primary.set(key.clone(), value.clone()),
            self.secondary.set(key, value),
        );
        merge_outcomes("set", primary, secondary)
    }

    async fn evict(&self, key: &K) -> CacheResult<()> {
        let (primary, secondary) =
            tokio::join!(self.primary.evict(key), self.secondary.evict(key));
        merge_outcomes("evict", primary, secondary)
    }

    async fn evict_all(&self) -> CacheResult<()> {
        let (primary, secondary) =
            tokio::join!(self.primary.evict_all(), self.secondary.evict_all());
        merge_outcomes("evict all", primary, secondary)
    }
}
