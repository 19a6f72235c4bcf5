//! Identity-scoped local state.
//!
//! - [`guest`] - the per-device guest ID
//! - [`scoped`] - wishlist/basket storage keyed by identity
//! - [`migrate`] - folding guest sets into a user's sets on sign-in
//! - [`watcher`] - running migrations on the sign-in edge

pub mod guest;
pub mod migrate;
pub mod scoped;
pub mod watcher;

pub use guest::{DEFAULT_GUEST_ID_KEY, GuestIdentity};
pub use migrate::{IdentityMigrator, MigrationOutcome};
pub use scoped::IdentityScopedStore;
pub use watcher::{IdentityWatcher, MigrationReport, MigrationState};

/// Resource name of the wishlist set.
pub const WISHLIST: &str = "wishlist";

/// Resource name of the basket set.
pub const BASKET: &str = "basket";

/// Resources whose sets a [`Larder`](crate::Larder) keeps and migrates.
pub const SCOPED_RESOURCES: [&str; 2] = [WISHLIST, BASKET];
