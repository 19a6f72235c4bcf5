//! Integration tests for Larder.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p larder-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cache_flow` - TTL hits, diff suppression, stale fallback, quota recovery
//! - `identity_flow` - guest scoping, migration, the sign-in watcher
//! - `file_store` - durability of the file-backed medium across reopen
//!
//! Shared fixtures live here: a [`FlakyStore`] for failure injection, a
//! [`FetchCounter`] for asserting how often the network was hit, and a
//! [`Harness`] wiring both into a [`Larder`] on a manual clock.

use std::fmt;
use std::future::{Ready, ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use larder_store::{
    FetchError, Larder, LarderConfig, ManualClock, MemoryStore, PersistentStore, StoreError,
};

// =============================================================================
// FlakyStore
// =============================================================================

/// In-memory store whose next writes can be made to fail.
#[derive(Debug)]
pub struct FlakyStore {
    inner: MemoryStore,
    quota_failures: AtomicUsize,
    io_failures: AtomicUsize,
    writes: AtomicUsize,
}

impl FlakyStore {
    /// An unbounded store that fails nothing until told to.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::unbounded(),
            quota_failures: AtomicUsize::new(0),
            io_failures: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` writes with a quota error.
    pub fn fail_next_writes_with_quota(&self, n: usize) {
        self.quota_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` writes with an I/O error.
    pub fn fail_next_writes_with_io(&self, n: usize) {
        self.io_failures.store(n, Ordering::SeqCst);
    }

    /// Successful writes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Sorted snapshot of the stored keys.
    #[must_use]
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys = self.inner.keys().unwrap_or_default();
        keys.sort();
        keys
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl PersistentStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if take_one(&self.quota_failures) {
            return Err(StoreError::QuotaExceeded {
                key: key.to_owned(),
                needed: value.len(),
                available: 0,
            });
        }
        if take_one(&self.io_failures) {
            return Err(StoreError::Io(std::io::Error::other("injected failure")));
        }
        self.inner.set(key, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.inner.keys()
    }
}

// =============================================================================
// FetchCounter
// =============================================================================

/// Builds fetch closures that count their invocations.
#[derive(Clone, Default)]
pub struct FetchCounter {
    calls: Arc<AtomicUsize>,
}

impl fmt::Debug for FetchCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCounter")
            .field("calls", &self.calls())
            .finish()
    }
}

impl FetchCounter {
    /// A counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many closures built by this counter have been called.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A fetch returning `value`.
    pub fn ok<T: Send + 'static>(
        &self,
        value: T,
    ) -> impl FnOnce() -> Ready<Result<T, FetchError>> + Send + 'static {
        self.respond(Ok(value))
    }

    /// A fetch failing with `message`.
    pub fn fail<T: Send + 'static>(
        &self,
        message: &str,
    ) -> impl FnOnce() -> Ready<Result<T, FetchError>> + Send + 'static {
        self.respond(Err(FetchError::new(message)))
    }

    fn respond<T: Send + 'static>(
        &self,
        result: Result<T, FetchError>,
    ) -> impl FnOnce() -> Ready<Result<T, FetchError>> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(result)
        }
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A [`Larder`] over a [`FlakyStore`] and a [`ManualClock`].
#[derive(Debug)]
pub struct Harness {
    pub larder: Larder,
    pub store: Arc<FlakyStore>,
    pub clock: ManualClock,
}

impl Harness {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LarderConfig::default())
    }

    /// A custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn with_config(config: LarderConfig) -> Self {
        let store = Arc::new(FlakyStore::new());
        let clock = ManualClock::default();
        let larder = Larder::with_store(config, store.clone(), Arc::new(clock.clone()))
            .expect("failed to open larder");
        Self {
            larder,
            store,
            clock,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
