//! TTL cache for fetched resources.
//!
//! [`TtlCache::resolve`] answers from the store while an entry is younger
//! than its TTL and calls the fetch closure otherwise. Fetched payloads are
//! only written when they differ from what is stored (see [`has_changed`]),
//! after being shaped by the resource's [`ResourcePolicy`].
//!
//! A full medium never fails a resolve: the cache sweeps its own namespace,
//! retries once, and otherwise hands the value back uncached.

mod diff;
mod policy;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use larder_core::{CacheEntry, StoreKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{Instrument as _, Span, debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::{CacheError, FetchError, StoreError};
use crate::events::{EventBus, StoreEvent};
use crate::persistent::{PersistentStore, evict_prefix};

pub use diff::has_changed;
pub use policy::{
    CachePolicies, DEFAULT_MAX_ENTRIES, DEFAULT_TTL, NOTIFICATION_TEXT_FIELDS,
    NOTIFICATIONS_MAX_ENTRIES, NOTIFICATIONS_RESOURCE, ResourcePolicy,
};

/// Default namespace for cache keys in the medium.
pub const DEFAULT_KEY_PREFIX: &str = "cache:";

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A valid entry; no fetch happened.
    Cache,
    /// The fetch closure succeeded.
    Fetched,
    /// The fetch failed and an older entry was served.
    Stale,
}

/// A resolved value plus how it was obtained.
#[derive(Debug)]
pub struct Resolved<T> {
    /// The value.
    pub value: T,
    /// Where it came from.
    pub origin: Origin,
    /// Set to [`CacheError::StaleServed`] when a stale entry was served.
    pub warning: Option<CacheError>,
}

impl<T> Resolved<T> {
    const fn new(value: T, origin: Origin) -> Self {
        Self {
            value,
            origin,
            warning: None,
        }
    }

    /// Whether the value is a stale fallback.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self.origin, Origin::Stale)
    }

    /// Discard the origin and warning.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Result of offering a fetched payload to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Written,
    Unchanged,
    Uncached,
}

// =============================================================================
// TtlCache
// =============================================================================

/// Shared TTL cache over a [`PersistentStore`].
///
/// Cheaply cloneable; clones share the same store, policies and event bus.
#[derive(Debug, Clone)]
pub struct TtlCache {
    inner: Arc<TtlCacheInner>,
}

#[derive(Debug)]
struct TtlCacheInner {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    policies: CachePolicies,
    prefix: String,
    events: EventBus,
}

/// Builder for [`TtlCache`].
#[derive(Debug)]
pub struct TtlCacheBuilder {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    policies: CachePolicies,
    prefix: String,
    events: EventBus,
}

impl TtlCacheBuilder {
    /// Use a specific clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use specific per-resource policies.
    #[must_use]
    pub fn policies(mut self, policies: CachePolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Namespace for cache keys. Quota sweeps remove every key under it, so
    /// it must not be shared with data that cannot be re-fetched.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Publish changes on an existing bus.
    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Build the cache.
    #[must_use]
    pub fn build(self) -> TtlCache {
        TtlCache {
            inner: Arc::new(TtlCacheInner {
                store: self.store,
                clock: self.clock,
                policies: self.policies,
                prefix: self.prefix,
                events: self.events,
            }),
        }
    }
}

impl TtlCache {
    /// Start building a cache over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn PersistentStore>) -> TtlCacheBuilder {
        TtlCacheBuilder {
            store,
            clock: Arc::new(SystemClock),
            policies: CachePolicies::default(),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            events: EventBus::default(),
        }
    }

    /// The physical key used for `key` in the medium.
    #[must_use]
    pub fn storage_key(&self, key: &StoreKey) -> String {
        format!("{}{key}", self.inner.prefix)
    }

    /// The cache namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// Per-resource policies.
    #[must_use]
    pub fn policies(&self) -> &CachePolicies {
        &self.inner.policies
    }

    /// Subscribe to write/clear/evict notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// The stored entry for `key`, expired or not.
    #[must_use]
    pub fn peek(&self, key: &StoreKey) -> Option<CacheEntry> {
        self.inner.read_entry(&self.storage_key(key))
    }

    /// Resolve `key`: a valid entry if there is one, else the result of
    /// `fetch`, else a stale entry, else an error.
    ///
    /// On a valid hit `fetch` is not called. The fetch and the write that
    /// follows run on a spawned task, so dropping the returned future does not
    /// stop the cache from being populated. Must be called inside a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Unavailable`] if the fetch failed and nothing is cached.
    /// - [`CacheError::Serialization`] if the fetched value cannot be serialized.
    /// - [`CacheError::Task`] if the fetch task panicked.
    ///
    /// A stale fallback is not an error: it returns `Ok` with
    /// [`Resolved::warning`] set to [`CacheError::StaleServed`].
    #[instrument(skip(self, fetch), fields(key = %key, ttl_secs = ttl.as_secs()))]
    pub async fn resolve<T, F, Fut>(
        &self,
        key: &StoreKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Resolved<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let storage_key = self.storage_key(key);

        if let Some(entry) = self.inner.read_entry(&storage_key)
            && entry.is_fresh(self.inner.clock.now(), ttl)
        {
            match serde_json::from_value::<T>(entry.payload) {
                Ok(value) => {
                    debug!("Cache hit");
                    return Ok(Resolved::new(value, Origin::Cache));
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Cached payload does not match the requested type, refetching"
                    );
                }
            }
        }

        debug!("Cache miss");
        let inner = Arc::clone(&self.inner);
        let policy = self.inner.policies.for_resource(key.resource()).clone();
        let task = tokio::spawn(
            async move { inner.refresh(storage_key, &policy, fetch).await }
                .instrument(Span::current()),
        );
        task.await?
    }

    /// [`resolve`](Self::resolve) with the TTL from the resource's policy.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_with_policy<T, F, Fut>(
        &self,
        key: &StoreKey,
        fetch: F,
    ) -> Result<Resolved<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let ttl = self.inner.policies.for_resource(key.resource()).ttl;
        self.resolve(key, ttl, fetch).await
    }

    /// Remove the entry for `key` immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    #[instrument(skip(self), fields(key = %key))]
    pub fn clear(&self, key: &StoreKey) -> Result<(), StoreError> {
        let storage_key = self.storage_key(key);
        self.inner.store.remove(&storage_key)?;
        debug!("Cleared cache entry");
        self.inner
            .events
            .publish(StoreEvent::CacheCleared { key: storage_key });
        Ok(())
    }

    /// Remove every entry in the cache namespace.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let count = evict_prefix(self.inner.store.as_ref(), &self.inner.prefix, None)?;
        info!(count, "Cleared all cache entries");
        self.inner.events.publish(StoreEvent::CacheEvicted { count });
        Ok(count)
    }
}

impl TtlCacheInner {
    /// Read and decode an entry. Unreadable entries count as missing.
    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key) {
            Ok(Some(bytes)) => match codec::decode(&bytes) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    async fn refresh<T, F, Fut>(
        &self,
        key: String,
        policy: &ResourcePolicy,
        fetch: F,
    ) -> Result<Resolved<T>, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        match fetch().await {
            Ok(value) => {
                let payload = serde_json::to_value(&value)?;
                let outcome = self.store_fetched(&key, policy.prepare(payload))?;
                debug!(?outcome, "Fetched fresh value");
                Ok(Resolved::new(value, Origin::Fetched))
            }
            Err(source) => self.fall_back(key, source),
        }
    }

    fn fall_back<T: DeserializeOwned>(
        &self,
        key: String,
        source: FetchError,
    ) -> Result<Resolved<T>, CacheError> {
        let Some(entry) = self.read_entry(&key) else {
            warn!(key, error = %source, "Fetch failed with nothing cached");
            return Err(CacheError::Unavailable { key, source });
        };

        let value = match serde_json::from_value::<T>(entry.payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Stale entry does not match the requested type");
                return Err(CacheError::Unavailable { key, source });
            }
        };

        warn!(
            key,
            cached_at = %entry.cached_at,
            error = %source,
            "Fetch failed, serving stale entry"
        );
        Ok(Resolved {
            value,
            origin: Origin::Stale,
            warning: Some(CacheError::StaleServed {
                key,
                cached_at: entry.cached_at,
                source,
            }),
        })
    }

    /// Write a prepared payload unless it matches what is stored.
    fn store_fetched(&self, key: &str, payload: Value) -> Result<WriteOutcome, CacheError> {
        if let Some(current) = self.read_entry(key)
            && !has_changed(&current.payload, &payload)
        {
            debug!(key, "Fetched payload unchanged, skipping write");
            return Ok(WriteOutcome::Unchanged);
        }

        let cached_at = self.clock.now();
        let bytes = codec::encode(&CacheEntry::new(payload, cached_at))?;

        match self.store.set(key, &bytes) {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                warn!(key, error = %e, "Storage full, evicting cache entries");
                if !self.retry_after_eviction(key, &bytes) {
                    return Ok(WriteOutcome::Uncached);
                }
            }
            Err(StoreError::Serialization(e)) => return Err(e.into()),
            Err(e) => {
                warn!(key, error = %e, "Failed to persist cache entry, value left uncached");
                return Ok(WriteOutcome::Uncached);
            }
        }

        self.events.publish(StoreEvent::CacheWritten {
            key: key.to_owned(),
            cached_at,
        });
        Ok(WriteOutcome::Written)
    }

    /// Sweep the namespace (sparing `key`) and try the write once more.
    fn retry_after_eviction(&self, key: &str, bytes: &[u8]) -> bool {
        match evict_prefix(self.store.as_ref(), &self.prefix, Some(key)) {
            Ok(count) => {
                info!(count, "Evicted cache entries to recover space");
                self.events.publish(StoreEvent::CacheEvicted { count });
            }
            Err(e) => warn!(error = %e, "Eviction sweep failed"),
        }

        match self.store.set(key, bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Write failed after eviction, value left uncached");
                false
            }
        }
    }
}
