//! Folding a guest's sets into a user's sets on sign-in.

use larder_core::{IdentityKey, ScopedSet};
use tracing::{debug, info, instrument};

use super::scoped::IdentityScopedStore;
use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};

/// What a migration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// No guest set existed; nothing was written.
    NothingToMigrate,
    /// The guest set was merged into the user's set and removed.
    Merged {
        /// Items in the guest set.
        guest_items: usize,
        /// Items in the user's set afterwards.
        total: usize,
    },
}

/// Merges guest-scoped sets into user-scoped ones.
///
/// Idempotent: the guest set is deleted after the merge, so running the same
/// migration again finds nothing to do.
#[derive(Debug, Clone)]
pub struct IdentityMigrator {
    scoped: IdentityScopedStore,
    events: EventBus,
}

impl IdentityMigrator {
    /// Migrate through `scoped`, announcing merges on `events`.
    #[must_use]
    pub const fn new(scoped: IdentityScopedStore, events: EventBus) -> Self {
        Self { scoped, events }
    }

    /// Merge the `guest` set for `resource` into the `user` set, then delete
    /// the guest set.
    ///
    /// The user's copy wins on collisions (see [`ScopedSet::absorb`]). The
    /// user set is written before the guest set is removed, so an interrupted
    /// migration leaves the guest set behind for the next attempt rather than
    /// losing items.
    ///
    /// # Errors
    ///
    /// Returns an error if either set is unreadable or the medium fails.
    #[instrument(skip(self))]
    pub fn migrate<S: ScopedSet>(
        &self,
        resource: &str,
        guest: &IdentityKey,
        user: &IdentityKey,
    ) -> Result<MigrationOutcome, StoreError> {
        if guest == user {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let guest_key = IdentityScopedStore::scoped_key(resource, guest);
        let Some(guest_set) = self.scoped.load::<S>(&guest_key)? else {
            debug!("No guest set to migrate");
            return Ok(MigrationOutcome::NothingToMigrate);
        };

        let guest_items = guest_set.len();
        let mut merged: S = self.scoped.read_key(resource, user)?;
        merged.absorb(guest_set);
        let total = merged.len();

        self.scoped.write_key(resource, user, &merged)?;
        self.scoped.remove_key(resource, guest)?;

        info!(guest_items, total, "Migrated guest set");
        self.events.publish(StoreEvent::Migrated {
            resource: resource.to_owned(),
            user: user.to_string(),
        });

        Ok(MigrationOutcome::Merged { guest_items, total })
    }
}
