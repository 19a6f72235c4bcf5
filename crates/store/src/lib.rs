//! Larder Store - client-side response cache and identity-scoped state.
//!
//! # Architecture
//!
//! - [`persistent`] - Synchronous, capacity-limited key/value medium
//!   (`MemoryStore`, `FileStore`)
//! - [`codec`] - Byte representation of cache entries
//! - [`cache`] - `TtlCache`: read cache, else fetch, else fail
//! - [`identity`] - Guest IDs, identity-scoped sets, sign-in migration
//! - [`state`] - `Larder`, the single owner of the medium and its users
//!
//! Only [`cache::TtlCache::resolve`] suspends. Everything touching the
//! medium is synchronous and never performs network I/O.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod persistent;
pub mod state;

pub use cache::{CachePolicies, Origin, ResourcePolicy, Resolved, TtlCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, LarderConfig};
pub use error::{CacheError, FetchError, StoreError};
pub use events::{EventBus, StoreEvent};
pub use identity::{
    IdentityMigrator, IdentityScopedStore, IdentityWatcher, MigrationOutcome, MigrationReport,
    MigrationState,
};
pub use persistent::{FileStore, MemoryStore, PersistentStore};
pub use state::{Larder, OpenError};
