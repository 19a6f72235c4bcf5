//! Error types for the store, the cache and fetch closures.
//!
//! Only [`CacheError::Unavailable`] and [`CacheError::StaleServed`] are meant
//! for consumers. Quota failures are recovered inside the cache; serialization
//! failures are programmer errors and propagate.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a [`PersistentStore`](crate::persistent::PersistentStore)
/// and the layers that write through it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The medium has no room for the value.
    #[error("Storage quota exceeded writing {key}: need {needed} bytes, {available} available")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Bytes the write would occupy.
        needed: usize,
        /// Bytes left in the budget before the write.
        available: usize,
    },

    /// A value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is unreadable.
    #[error("Corrupt value at {key}: {reason}")]
    Corrupt {
        /// Key holding the value.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The key cannot be represented by the medium.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The medium failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this is a capacity failure that eviction may fix.
    #[must_use]
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Failure reported by a consumer-supplied fetch closure.
///
/// Opaque to the cache beyond success or failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetch failed with a message.
    #[error("{0}")]
    Failed(String),

    /// The fetch gave up waiting.
    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The fetch failed with an underlying error.
    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Create a failure from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap an underlying error.
    #[must_use]
    pub fn from_source(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(error))
    }
}

/// Errors surfaced by [`TtlCache`](crate::cache::TtlCache).
#[derive(Debug, Error)]
pub enum CacheError {
    /// No valid or stale data exists and the fetch failed.
    #[error("{key} is unavailable: {source}")]
    Unavailable {
        /// Storage key that was resolved.
        key: String,
        /// Why the fetch failed.
        #[source]
        source: FetchError,
    },

    /// The fetch failed and an expired entry was served instead.
    ///
    /// Non-fatal: carried as a warning next to the stale value.
    #[error("Serving stale {key} cached at {cached_at}: {source}")]
    StaleServed {
        /// Storage key that was resolved.
        key: String,
        /// When the served entry was written.
        cached_at: DateTime<Utc>,
        /// Why the fetch failed.
        #[source]
        source: FetchError,
    },

    /// A payload could not be converted to or from its stored form.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The background fetch task panicked or was cancelled by the runtime.
    #[error("Fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CacheError {
    /// Whether the caller still received data.
    #[must_use]
    pub const fn is_stale_served(&self) -> bool {
        matches!(self, Self::StaleServed { .. })
    }
}
