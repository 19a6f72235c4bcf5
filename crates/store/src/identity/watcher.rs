//! Runs guest-to-user migrations on the sign-in edge.
//!
//! The watcher reacts to transitions, not levels: it migrates when the
//! signal goes from "no user" to a user, or from one user to another. Every
//! edge migrates every registered resource, so guest items added while
//! signed out reach the user on the next sign-in. Migration is a no-op when
//! the guest set is absent, and a failed one is retried on the next edge.

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use larder_core::{GuestId, Identity, IdentityKey, IdentitySignal, ScopedSet, UserId};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::migrate::{IdentityMigrator, MigrationOutcome};
use crate::error::StoreError;

/// Migration progress of one resource for the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// No successful migration yet.
    NotMigrated,
    /// The guest set has been folded into the user's set.
    Migrated,
}

/// Result of migrating one resource on a sign-in edge.
#[derive(Debug)]
pub struct MigrationReport {
    /// Resource that was migrated.
    pub resource: String,
    /// User receiving the guest set.
    pub user: UserId,
    /// What happened.
    pub outcome: Result<MigrationOutcome, StoreError>,
}

/// A registered resource with its set type erased.
trait MigrateResource: Send + Sync + fmt::Debug {
    fn resource(&self) -> &str;

    fn migrate(
        &self,
        migrator: &IdentityMigrator,
        guest: &IdentityKey,
        user: &IdentityKey,
    ) -> Result<MigrationOutcome, StoreError>;
}

struct Registered<S> {
    resource: String,
    _set: PhantomData<fn() -> S>,
}

impl<S> fmt::Debug for Registered<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registered")
            .field("resource", &self.resource)
            .finish()
    }
}

impl<S: ScopedSet> MigrateResource for Registered<S> {
    fn resource(&self) -> &str {
        &self.resource
    }

    fn migrate(
        &self,
        migrator: &IdentityMigrator,
        guest: &IdentityKey,
        user: &IdentityKey,
    ) -> Result<MigrationOutcome, StoreError> {
        migrator.migrate::<S>(&self.resource, guest, user)
    }
}

/// Edge-triggered driver for [`IdentityMigrator`].
#[derive(Debug)]
pub struct IdentityWatcher {
    migrator: IdentityMigrator,
    guest: IdentityKey,
    resources: Vec<Box<dyn MigrateResource>>,
    current: Option<UserId>,
    migrated: HashSet<(String, UserId)>,
}

impl IdentityWatcher {
    /// Watch on behalf of the device's `guest` identity.
    #[must_use]
    pub fn new(migrator: IdentityMigrator, guest: GuestId) -> Self {
        Self {
            migrator,
            guest: Identity::Guest(guest).key(),
            resources: Vec::new(),
            current: None,
            migrated: HashSet::new(),
        }
    }

    /// Migrate `resource`, holding sets of type `S`, on every sign-in edge.
    #[must_use]
    pub fn register<S: ScopedSet>(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(Box::new(Registered::<S> {
            resource: resource.into(),
            _set: PhantomData,
        }));
        self
    }

    /// Names of the registered resources.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.resource())
    }

    /// The user from the last observed signal.
    #[must_use]
    pub const fn current_user(&self) -> Option<&UserId> {
        self.current.as_ref()
    }

    /// Migration state of `resource` for the current user.
    ///
    /// [`MigrationState::Migrated`] once a migration into the current user
    /// has succeeded; a later failure resets it. Always
    /// [`MigrationState::NotMigrated`] while signed out.
    #[must_use]
    pub fn state(&self, resource: &str) -> MigrationState {
        match &self.current {
            Some(user) if self.migrated.contains(&(resource.to_owned(), user.clone())) => {
                MigrationState::Migrated
            }
            _ => MigrationState::NotMigrated,
        }
    }

    /// Feed one signal observation.
    ///
    /// Returns one report per resource migrated on this observation; empty
    /// when the observation is not a sign-in edge. A failing resource is
    /// logged and does not stop the others.
    #[instrument(skip(self, signal))]
    pub fn observe(&mut self, signal: &IdentitySignal) -> Vec<MigrationReport> {
        let next = signal.authenticated_user();
        let edge = match (&self.current, &next) {
            (None, Some(_)) => true,
            (Some(previous), Some(user)) => previous != user,
            (_, None) => false,
        };
        self.current = next;

        let Some(user) = self.current.clone().filter(|_| edge) else {
            return Vec::new();
        };

        info!(user = %user, "Sign-in detected, migrating guest state");
        let user_key = Identity::User(user.clone()).key();
        let mut reports = Vec::new();

        for registered in &self.resources {
            let resource = registered.resource().to_owned();
            let pair = (resource.clone(), user.clone());

            let outcome = registered.migrate(&self.migrator, &self.guest, &user_key);
            match &outcome {
                Ok(_) => {
                    self.migrated.insert(pair);
                }
                Err(e) => {
                    self.migrated.remove(&pair);
                    warn!(resource, error = %e, "Migration failed, will retry on next sign-in");
                }
            }
            reports.push(MigrationReport {
                resource,
                user: user.clone(),
                outcome,
            });
        }

        reports
    }

    /// Observe every value published on `signals` until the sender is dropped.
    ///
    /// The value current at the time of the call counts as the first
    /// observation.
    pub async fn run(&mut self, mut signals: watch::Receiver<IdentitySignal>) {
        loop {
            let signal = signals.borrow_and_update().clone();
            self.observe(&signal);
            if signals.changed().await.is_err() {
                debug!("Identity signal closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use larder_core::Wishlist;

    use super::*;
    use crate::events::EventBus;
    use crate::identity::scoped::IdentityScopedStore;
    use crate::persistent::MemoryStore;

    struct Fixture {
        scoped: IdentityScopedStore,
        guest: Identity,
        watcher: IdentityWatcher,
    }

    fn fixture() -> Fixture {
        let events = EventBus::default();
        let scoped = IdentityScopedStore::new(
            Arc::new(MemoryStore::unbounded()),
            "cache:",
            events.clone(),
        );
        let guest_id = GuestId::generate();
        let watcher = IdentityWatcher::new(IdentityMigrator::new(scoped.clone(), events), guest_id)
            .register::<Wishlist>("wishlist");
        Fixture {
            scoped,
            guest: Identity::Guest(guest_id),
            watcher,
        }
    }

    fn alice() -> Identity {
        Identity::User(UserId::parse("alice").unwrap())
    }

    #[test]
    fn test_anonymous_signals_do_nothing() {
        let mut f = fixture();
        assert!(f.watcher.observe(&IdentitySignal::anonymous()).is_empty());
        assert!(f.watcher.observe(&IdentitySignal::anonymous()).is_empty());
    }

    #[test]
    fn test_sign_in_edge_migrates_once() {
        let mut f = fixture();
        f.scoped
            .write("wishlist", &f.guest, &Wishlist::from_iter(["1"]))
            .unwrap();

        f.watcher.observe(&IdentitySignal::anonymous());
        let reports = f.watcher.observe(&IdentitySignal::authenticated("alice"));
        let repeat = f.watcher.observe(&IdentitySignal::authenticated("alice"));

        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].outcome,
            Ok(MigrationOutcome::Merged { total: 1, .. })
        ));
        assert!(repeat.is_empty());
        assert_eq!(f.watcher.state("wishlist"), MigrationState::Migrated);
        let merged: Wishlist = f.scoped.read("wishlist", &alice()).unwrap();
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_invalid_credential_is_not_a_sign_in() {
        let mut f = fixture();
        let signal = IdentitySignal {
            user_id: Some("alice".to_string()),
            has_valid_credential: false,
        };

        assert!(f.watcher.observe(&signal).is_empty());
        assert_eq!(f.watcher.current_user(), None);
    }

    #[test]
    fn test_switching_user_starts_a_new_cycle() {
        let mut f = fixture();
        f.watcher.observe(&IdentitySignal::authenticated("alice"));
        let reports = f.watcher.observe(&IdentitySignal::authenticated("bob"));

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].user.as_str(), "bob");
        assert!(matches!(
            reports[0].outcome,
            Ok(MigrationOutcome::NothingToMigrate)
        ));
    }

    #[test]
    fn test_sign_in_again_merges_items_added_while_signed_out() {
        let mut f = fixture();
        f.scoped
            .write("wishlist", &f.guest, &Wishlist::from_iter(["1"]))
            .unwrap();
        f.watcher.observe(&IdentitySignal::authenticated("alice"));
        f.watcher.observe(&IdentitySignal::anonymous());
        assert_eq!(f.watcher.state("wishlist"), MigrationState::NotMigrated);

        f.scoped
            .write("wishlist", &f.guest, &Wishlist::from_iter(["late"]))
            .unwrap();
        let reports = f.watcher.observe(&IdentitySignal::authenticated("alice"));

        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].outcome,
            Ok(MigrationOutcome::Merged { total: 2, .. })
        ));
        assert_eq!(f.watcher.state("wishlist"), MigrationState::Migrated);
        let merged: Wishlist = f.scoped.read("wishlist", &alice()).unwrap();
        assert_eq!(merged, Wishlist::from_iter(["1", "late"]));
        assert!(!f.scoped.contains_key("wishlist", &f.guest.key()).unwrap());
    }

    #[test]
    fn test_sign_in_again_without_guest_items_is_a_no_op() {
        let mut f = fixture();
        f.watcher.observe(&IdentitySignal::authenticated("alice"));
        f.watcher.observe(&IdentitySignal::anonymous());

        let reports = f.watcher.observe(&IdentitySignal::authenticated("alice"));
        assert_eq!(reports.len(), 1);
        assert!(matches!(
            reports[0].outcome,
            Ok(MigrationOutcome::NothingToMigrate)
        ));
    }

    #[tokio::test]
    async fn test_run_follows_watch_channel() {
        let mut f = fixture();
        f.scoped
            .write("wishlist", &f.guest, &Wishlist::from_iter(["1", "2"]))
            .unwrap();
        let (tx, rx) = watch::channel(IdentitySignal::anonymous());

        let driver = tokio::spawn(async move {
            f.watcher.run(rx).await;
            f
        });
        tx.send(IdentitySignal::authenticated("alice")).unwrap();
        drop(tx);

        let f = driver.await.unwrap();
        assert_eq!(f.watcher.state("wishlist"), MigrationState::Migrated);
        let merged: Wishlist = f.scoped.read("wishlist", &alice()).unwrap();
        assert_eq!(merged.len(), 2);
    }
}
