//! The shared handle owning the medium and everything built on it.

use std::sync::Arc;

use larder_core::{Basket, BasketItem, GuestId, Identity, IdentitySignal, ItemId, Wishlist};
use tracing::info;

use crate::cache::TtlCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, LarderConfig};
use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::identity::{
    BASKET, GuestIdentity, IdentityMigrator, IdentityScopedStore, IdentityWatcher, WISHLIST,
};
use crate::persistent::{FileStore, MemoryStore, PersistentStore};

/// Error opening a [`Larder`].
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The medium could not be opened or the guest ID not loaded.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Store, cache and identity-scoped state over one medium.
///
/// This struct is cheaply cloneable via `Arc`; every clone shares the same
/// medium, cache and event bus.
#[derive(Debug, Clone)]
pub struct Larder {
    inner: Arc<LarderInner>,
}

#[derive(Debug)]
struct LarderInner {
    config: LarderConfig,
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    cache: TtlCache,
    scoped: IdentityScopedStore,
    migrator: IdentityMigrator,
    guest_id: GuestId,
}

impl Larder {
    /// Open the medium named by `config`: a [`FileStore`] when `store_dir` is
    /// set, an in-memory store otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the medium cannot
    /// be opened.
    pub fn open(config: LarderConfig) -> Result<Self, OpenError> {
        let store: Arc<dyn PersistentStore> = match &config.store_dir {
            Some(dir) => Arc::new(FileStore::open(dir.clone(), config.capacity_bytes)?),
            None => Arc::new(MemoryStore::new(config.capacity_bytes)),
        };
        Self::with_store(config, store, Arc::new(SystemClock))
    }

    /// Build on an existing medium and clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the guest ID
    /// cannot be loaded or created.
    pub fn with_store(
        config: LarderConfig,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, OpenError> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let cache = TtlCache::builder(Arc::clone(&store))
            .clock(Arc::clone(&clock))
            .policies(config.policies.clone())
            .prefix(config.key_prefix.clone())
            .events(events.clone())
            .build();
        let scoped = IdentityScopedStore::new(
            Arc::clone(&store),
            config.key_prefix.clone(),
            events.clone(),
        );
        let migrator = IdentityMigrator::new(scoped.clone(), events.clone());
        let guest_id =
            GuestIdentity::new(Arc::clone(&store), config.guest_id_key.clone()).get_or_create()?;

        info!(store = store.name(), guest_id = %guest_id, "Opened larder");

        Ok(Self {
            inner: Arc::new(LarderInner {
                config,
                store,
                clock,
                events,
                cache,
                scoped,
                migrator,
                guest_id,
            }),
        })
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &LarderConfig {
        &self.inner.config
    }

    /// Get a reference to the underlying medium.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.inner.store
    }

    /// Get a reference to the clock.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Get a reference to the TTL cache.
    #[must_use]
    pub fn cache(&self) -> &TtlCache {
        &self.inner.cache
    }

    /// Get a reference to the identity-scoped store.
    #[must_use]
    pub fn scoped(&self) -> &IdentityScopedStore {
        &self.inner.scoped
    }

    /// Get a reference to the migrator.
    #[must_use]
    pub fn migrator(&self) -> &IdentityMigrator {
        &self.inner.migrator
    }

    /// This device's guest ID.
    #[must_use]
    pub fn guest_id(&self) -> GuestId {
        self.inner.guest_id
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// The identity a signal resolves to: the authenticated user, else this
    /// device's guest.
    #[must_use]
    pub fn identity(&self, signal: &IdentitySignal) -> Identity {
        Identity::resolve(signal.authenticated_user(), self.inner.guest_id)
    }

    /// A watcher migrating the wishlist and basket on sign-in.
    #[must_use]
    pub fn watcher(&self) -> IdentityWatcher {
        IdentityWatcher::new(self.inner.migrator.clone(), self.inner.guest_id)
            .register::<Wishlist>(WISHLIST)
            .register::<Basket>(BASKET)
    }

    // =========================================================================
    // Wishlist / basket
    // =========================================================================

    /// The wishlist for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored wishlist is unreadable.
    pub fn wishlist(&self, identity: &Identity) -> Result<Wishlist, StoreError> {
        self.inner.scoped.read(WISHLIST, identity)
    }

    /// Add or remove `id` from the wishlist. Returns `true` if it was added.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist cannot be read or written.
    pub fn toggle_wishlist(
        &self,
        identity: &Identity,
        id: impl Into<ItemId>,
    ) -> Result<bool, StoreError> {
        self.inner
            .scoped
            .update(WISHLIST, identity, |set: &mut Wishlist| set.toggle(id))
    }

    /// The basket for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored basket is unreadable.
    pub fn basket(&self, identity: &Identity) -> Result<Basket, StoreError> {
        self.inner.scoped.read(BASKET, identity)
    }

    /// Add one unit of `id` to the basket, timestamped now. Returns `true` if
    /// it created a new line.
    ///
    /// # Errors
    ///
    /// Returns an error if the basket cannot be read or written.
    pub fn add_to_basket(
        &self,
        identity: &Identity,
        id: impl Into<ItemId>,
    ) -> Result<bool, StoreError> {
        let item = BasketItem::new(id, self.inner.clock.now());
        self.inner
            .scoped
            .update(BASKET, identity, |basket: &mut Basket| basket.add(item))
    }

    /// Set the quantity of a basket line; zero removes it. Returns `false` if
    /// the item is not in the basket.
    ///
    /// # Errors
    ///
    /// Returns an error if the basket cannot be read or written.
    pub fn set_basket_quantity(
        &self,
        identity: &Identity,
        id: &ItemId,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        self.inner
            .scoped
            .update(BASKET, identity, |basket: &mut Basket| basket.set_quantity(id, quantity))
    }
}

#[cfg(test)]
mod tests {
    use larder_core::{ScopedSet, StoreKey};
    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::FetchError;

    fn larder() -> Larder {
        Larder::with_store(
            LarderConfig::default(),
            Arc::new(MemoryStore::unbounded()),
            Arc::new(ManualClock::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_guest_id_survives_reopen() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::unbounded());
        let first =
            Larder::with_store(LarderConfig::default(), Arc::clone(&store), Arc::new(SystemClock))
                .unwrap();
        let second =
            Larder::with_store(LarderConfig::default(), store, Arc::new(SystemClock)).unwrap();

        assert_eq!(first.guest_id(), second.guest_id());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = LarderConfig {
            key_prefix: String::new(),
            ..LarderConfig::default()
        };

        let err = Larder::with_store(
            config,
            Arc::new(MemoryStore::unbounded()),
            Arc::new(SystemClock),
        )
        .unwrap_err();
        assert!(matches!(err, OpenError::Config(_)));
    }

    #[test]
    fn test_identity_resolution() {
        let larder = larder();

        assert_eq!(
            larder.identity(&IdentitySignal::anonymous()),
            Identity::Guest(larder.guest_id())
        );
        assert!(!larder.identity(&IdentitySignal::authenticated("alice")).is_guest());
    }

    #[test]
    fn test_basket_helpers() {
        let larder = larder();
        let guest = larder.identity(&IdentitySignal::anonymous());

        assert!(larder.add_to_basket(&guest, "sku-1").unwrap());
        assert!(!larder.add_to_basket(&guest, "sku-1").unwrap());
        assert!(larder.set_basket_quantity(&guest, &ItemId::from("sku-1"), 4).unwrap());

        let basket = larder.basket(&guest).unwrap();
        assert_eq!(basket.len(), 1);
        assert_eq!(basket.total_quantity(), 4);
    }

    #[test]
    fn test_sign_in_moves_guest_wishlist() {
        let larder = larder();
        let guest = larder.identity(&IdentitySignal::anonymous());
        larder.toggle_wishlist(&guest, "7").unwrap();

        let mut watcher = larder.watcher();
        watcher.observe(&IdentitySignal::anonymous());
        watcher.observe(&IdentitySignal::authenticated("alice"));

        let alice = larder.identity(&IdentitySignal::authenticated("alice"));
        assert!(larder.wishlist(&alice).unwrap().contains(&ItemId::from("7")));
        assert!(larder.wishlist(&guest).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_and_sets_share_one_medium() {
        let larder = larder();
        larder
            .cache()
            .resolve(&StoreKey::new("listings"), crate::cache::DEFAULT_TTL, || async {
                Ok::<_, FetchError>(json!([{"id": 1}]))
            })
            .await
            .unwrap();

        let mut keys = larder.store().keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["cache:listings".to_string(), "guest_id".to_string()]);
    }
}
