//! Composable cache primitives
//!
//! A small set of generic building blocks for assembling cache pipelines:
//! - A four-operation [`Cache`] contract shared by stores and combinators
//! - Read-through composition with write-back on miss ([`CacheHandle::compose`])
//! - Coalescing of concurrent fetches for the same key
//!   ([`CacheHandle::reuse_inflight`])
//! - Lazy key and value adapter views
//! - Concurrent batch operations ([`CacheExt`])
//!
//! Pipelines are built by chaining combinators on a [`CacheHandle`]; each
//! combinator returns a new handle implementing the same contract, so any
//! stage can itself be wrapped again.
//!
//! ```
//! use cascade_cache::{Cache, CacheHandle, MemoryCache};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cascade_cache::CacheError> {
//! let memory = CacheHandle::new(MemoryCache::new());
//! let origin = CacheHandle::from_fn(|key: String| async move {
//!     Ok(Some(format!("value for {key}")))
//! });
//!
//! let cache = memory.compose(origin)?.reuse_inflight()?;
//!
//! let value = cache.get(&"user:1".to_string()).await?;
//! assert_eq!(value, Some("value for user:1".to_string()));
//! # Ok(())
//! # }
//! ```

mod cache;
mod compose;
mod error;
mod fetch;
mod handle;
mod inflight;
mod memory;
mod topology;
mod transform;

pub use cache::{Cache, CacheExt};
pub use error::{CacheError, CacheResult, CompositeError};
pub use fetch::Fetcher;
pub use handle::CacheHandle;
pub use memory::{MemoryCache, MemoryCacheConfig};
