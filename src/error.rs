//! Error types for cache operations

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors produced by caches and their combinators
///
/// `Clone` is required so that coalesced waiters can all receive the same
/// failure from a single shared fetch.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("store error: {message}")]
    Store { message: String },

    #[error(transparent)]
    Composite(#[from] CompositeError),
}

impl CacheError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Collapses the failures of a parallel fan-out into a single error.
    ///
    /// Returns `None` when nothing failed, the sole error when one side
    /// failed, and a [`CompositeError`] retaining every cause when several
    /// did. `failures` must be in the order the child operations were
    /// started; the first becomes the primary cause.
    pub(crate) fn from_failures(
        message: impl Into<String>,
        mut failures: Vec<CacheError>,
    ) -> Option<CacheError> {
        match failures.len() {
            0 => None,
            1 => failures.pop(),
            _ => Some(CacheError::Composite(CompositeError {
                message: message.into(),
                causes: failures,
            })),
        }
    }
}

/// An aggregate failure from a parallel fan-out
///
/// Carries every contributing error: the first cause is primary (exposed as
/// [`std::error::Error::source`]), the rest are suppressed secondary causes,
/// so no diagnostic from a partial failure is lost.
#[derive(Debug, Clone)]
pub struct CompositeError {
    message: String,
    causes: Vec<CacheError>,
}

impl CompositeError {
    /// Creates an aggregate error from a non-empty list of causes.
    ///
    /// An empty cause list is a usage mistake and is rejected with a
    /// [`CacheError::Configuration`] error.
    pub fn new(
        message: impl Into<String>,
        causes: Vec<CacheError>,
    ) -> Result<Self, CacheError> {
        if causes.is_empty() {
            return Err(CacheError::configuration(
                "a composite error requires at least one cause",
            ));
        }

        Ok(Self {
            message: message.into(),
            causes,
        })
    }

    /// The first contributing error.
    pub fn primary_cause(&self) -> &CacheError {
        &self.causes[0]
    }

    /// Every contributing error after the primary one.
    pub fn suppressed(&self) -> &[CacheError] {
        &self.causes[1..]
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} causes)", self.message, self.causes.len())
    }
}

impl StdError for CompositeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.causes.first().map(|cause| cause as &(dyn StdError + 'static))
    }
}
