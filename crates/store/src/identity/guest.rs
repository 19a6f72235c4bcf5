//! Per-device guest identifier.

use std::sync::Arc;

use larder_core::GuestId;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::persistent::PersistentStore;

/// Default key holding the guest ID.
pub const DEFAULT_GUEST_ID_KEY: &str = "guest_id";

/// Loads the device's guest ID, creating and persisting one on first use.
///
/// The ID lives under its own key, outside every resource key, so it
/// survives sign-in, sign-out and cache sweeps.
#[derive(Debug, Clone)]
pub struct GuestIdentity {
    store: Arc<dyn PersistentStore>,
    key: String,
}

impl GuestIdentity {
    /// Use `key` in `store` for the guest ID.
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The stored guest ID, if one exists and is readable.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    pub fn current(&self) -> Result<Option<GuestId>, StoreError> {
        let Some(bytes) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        let parsed = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|raw| raw.parse::<GuestId>().ok());
        if parsed.is_none() {
            warn!(key = %self.key, "Stored guest id is unreadable");
        }
        Ok(parsed)
    }

    /// The guest ID, generating and persisting a new one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read or written.
    pub fn get_or_create(&self) -> Result<GuestId, StoreError> {
        if let Some(id) = self.current()? {
            return Ok(id);
        }

        let id = GuestId::generate();
        self.store.set(&self.key, id.to_string().as_bytes())?;
        info!(guest_id = %id, "Created guest id");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::MemoryStore;

    #[test]
    fn test_guest_id_is_stable() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::unbounded());
        let guest = GuestIdentity::new(Arc::clone(&store), DEFAULT_GUEST_ID_KEY);

        let first = guest.get_or_create().unwrap();
        let second = GuestIdentity::new(store, DEFAULT_GUEST_ID_KEY)
            .get_or_create()
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_unreadable_guest_id_is_replaced() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::unbounded());
        store.set(DEFAULT_GUEST_ID_KEY, b"undefined").unwrap();
        let guest = GuestIdentity::new(Arc::clone(&store), DEFAULT_GUEST_ID_KEY);

        assert_eq!(guest.current().unwrap(), None);
        let id = guest.get_or_create().unwrap();
        assert_eq!(guest.current().unwrap(), Some(id));
    }
}
