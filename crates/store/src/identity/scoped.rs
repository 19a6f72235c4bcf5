//! Small sets namespaced by identity.
//!
//! A set for `resource` lives at `{resource}_{identity key}`: the user ID when
//! authenticated, `guest_{guest id}` otherwise. No TTL applies; every write is
//! durable as soon as it returns.

use std::sync::Arc;

use larder_core::{Identity, IdentityKey, ScopedSet};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::persistent::{PersistentStore, evict_prefix};

/// Reads and writes [`ScopedSet`]s through a [`PersistentStore`].
#[derive(Debug, Clone)]
pub struct IdentityScopedStore {
    store: Arc<dyn PersistentStore>,
    cache_prefix: String,
    events: EventBus,
}

impl IdentityScopedStore {
    /// Scope sets in `store`. On a full medium, entries under `cache_prefix`
    /// are swept before giving up.
    #[must_use]
    pub fn new(
        store: Arc<dyn PersistentStore>,
        cache_prefix: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            cache_prefix: cache_prefix.into(),
            events,
        }
    }

    /// Storage key of `resource` for `identity`.
    #[must_use]
    pub fn scoped_key(resource: &str, identity: &IdentityKey) -> String {
        format!("{resource}_{identity}")
    }

    /// The set for `resource` under `identity`, empty if none is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the stored set cannot be decoded, or
    /// an error if the medium fails.
    pub fn read<S: ScopedSet>(&self, resource: &str, identity: &Identity) -> Result<S, StoreError> {
        self.read_key(resource, &identity.key())
    }

    /// [`read`](Self::read) by identity key.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub fn read_key<S: ScopedSet>(
        &self,
        resource: &str,
        identity: &IdentityKey,
    ) -> Result<S, StoreError> {
        Ok(self.load(&Self::scoped_key(resource, identity))?.unwrap_or_default())
    }

    /// Whether a set is stored for `resource` under `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    pub fn contains_key(&self, resource: &str, identity: &IdentityKey) -> Result<bool, StoreError> {
        Ok(self.store.get(&Self::scoped_key(resource, identity))?.is_some())
    }

    pub(crate) fn load<S: ScopedSet>(&self, key: &str) -> Result<Option<S>, StoreError> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Replace the set for `resource` under `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] if the medium is still full after
    /// sweeping the cache namespace, or another error if it fails.
    pub fn write<S: ScopedSet>(
        &self,
        resource: &str,
        identity: &Identity,
        set: &S,
    ) -> Result<(), StoreError> {
        self.write_key(resource, &identity.key(), set)
    }

    /// [`write`](Self::write) by identity key.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    #[instrument(skip(self, set))]
    pub fn write_key<S: ScopedSet>(
        &self,
        resource: &str,
        identity: &IdentityKey,
        set: &S,
    ) -> Result<(), StoreError> {
        let key = Self::scoped_key(resource, identity);
        let bytes = serde_json::to_vec(set)?;

        match self.store.set(&key, &bytes) {
            Err(e) if e.is_quota_exceeded() => {
                warn!(key, error = %e, "Storage full, sweeping cache entries for scoped write");
                let count = evict_prefix(self.store.as_ref(), &self.cache_prefix, None)?;
                self.events.publish(StoreEvent::CacheEvicted { count });
                self.store.set(&key, &bytes)?;
            }
            other => other?,
        }

        debug!(key, items = set.len(), "Wrote scoped set");
        self.events.publish(StoreEvent::ScopedSetChanged { key });
        Ok(())
    }

    /// Read, modify and write back the set for `resource` under `identity`.
    ///
    /// Returns whatever `f` returns.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read) and [`write`](Self::write).
    pub fn update<S, R>(
        &self,
        resource: &str,
        identity: &Identity,
        f: impl FnOnce(&mut S) -> R,
    ) -> Result<R, StoreError>
    where
        S: ScopedSet,
    {
        let key = identity.key();
        let mut set: S = self.read_key(resource, &key)?;
        let result = f(&mut set);
        self.write_key(resource, &key, &set)?;
        Ok(result)
    }

    /// Remove the set for `resource` under `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    pub fn clear(&self, resource: &str, identity: &Identity) -> Result<(), StoreError> {
        self.remove_key(resource, &identity.key())
    }

    /// [`clear`](Self::clear) by identity key.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    pub fn remove_key(&self, resource: &str, identity: &IdentityKey) -> Result<(), StoreError> {
        let key = Self::scoped_key(resource, identity);
        self.store.remove(&key)?;
        debug!(key, "Removed scoped set");
        self.events.publish(StoreEvent::ScopedSetChanged { key });
        Ok(())
    }
}
