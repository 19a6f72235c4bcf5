//! Synchronous, capacity-limited key/value medium.
//!
//! Every byte Larder keeps goes through a [`PersistentStore`]. Writes replace
//! whole values; the last writer for a key wins.

mod file;
mod memory;

use std::fmt;

use tracing::debug;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Default byte budget, matching a typical browser local-storage quota.
pub const DEFAULT_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

/// A durable, synchronous key/value store with a byte budget.
///
/// Implementations must report a full medium as
/// [`StoreError::QuotaExceeded`] so callers can tell it apart from other
/// failures.
pub trait PersistentStore: Send + Sync + fmt::Debug {
    /// A name for logging (e.g. "memory", "file").
    fn name(&self) -> &'static str;

    /// Read the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the value at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QuotaExceeded`] when the budget would be
    /// exceeded, or another error if the medium fails.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium fails.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently stored, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be listed.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Bytes a key/value pair counts against the budget.
pub(crate) const fn footprint(key: &str, value_len: usize) -> usize {
    key.len() + value_len
}

/// Remove every key starting with `prefix`, except `keep`.
///
/// Returns the number of keys removed.
///
/// # Errors
///
/// Returns an error if listing or removing fails.
pub fn evict_prefix(
    store: &dyn PersistentStore,
    prefix: &str,
    keep: Option<&str>,
) -> Result<usize, StoreError> {
    let mut removed = 0;
    for key in store.keys()? {
        if key.starts_with(prefix) && Some(key.as_str()) != keep {
            store.remove(&key)?;
            removed += 1;
        }
    }
    debug!(store = store.name(), prefix, removed, "Evicted keys by prefix");
    Ok(removed)
}
