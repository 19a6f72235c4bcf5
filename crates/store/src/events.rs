//! Change notifications for other open views.
//!
//! Writers publish typed [`StoreEvent`]s on a broadcast channel; views that
//! want to stay in sync subscribe and re-read. Publishing with no subscribers
//! is not an error.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Something observable changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A cache entry was (re)written.
    CacheWritten {
        /// Storage key of the entry.
        key: String,
        /// Timestamp of the new entry.
        cached_at: DateTime<Utc>,
    },
    /// A cache entry was removed by `clear`.
    CacheCleared {
        /// Storage key of the entry.
        key: String,
    },
    /// Cache entries were swept to recover from a full medium.
    CacheEvicted {
        /// Number of entries removed.
        count: usize,
    },
    /// An identity-scoped set was written or removed.
    ScopedSetChanged {
        /// Storage key of the set.
        key: String,
    },
    /// Guest state was merged into a user's scope.
    Migrated {
        /// Resource that was migrated.
        resource: String,
        /// Identity key of the receiving user.
        user: String,
    },
}

/// Broadcast channel for [`StoreEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to current subscribers.
    pub fn publish(&self, event: StoreEvent) {
        // No receivers is fine; nobody is watching.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
