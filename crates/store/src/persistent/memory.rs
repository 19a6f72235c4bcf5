//! In-process store with a byte budget.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{PersistentStore, footprint};
use crate::error::StoreError;

/// In-memory [`PersistentStore`].
///
/// Lives as long as the process. Useful as the default medium, and in tests
/// where a small budget makes quota behavior easy to trigger.
#[derive(Debug)]
pub struct MemoryStore {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, Vec<u8>>,
    used: usize,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` bytes of keys and values.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    /// Create a store with no practical budget.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Bytes currently counted against the budget.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.lock().used
    }

    /// The configured budget.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PersistentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let previous = inner
            .entries
            .get(key)
            .map_or(0, |old| footprint(key, old.len()));
        let needed = footprint(key, value.len());
        let available = self.capacity.saturating_sub(inner.used - previous);

        if needed > available {
            return Err(StoreError::QuotaExceeded {
                key: key.to_owned(),
                needed,
                available,
            });
        }

        inner.used = inner.used - previous + needed;
        inner.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(old) = inner.entries.remove(key) {
            inner.used -= footprint(key, old.len());
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock().entries.keys().cloned().collect())
    }
}
