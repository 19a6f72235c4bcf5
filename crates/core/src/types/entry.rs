//! Cached payload with its write timestamp.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload and the time it was last written.
///
/// Entries are always replaced whole. Validity depends on a TTL owned by the
/// cache policy, not by the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached resource (a list, an object, a scalar).
    pub payload: serde_json::Value,
    /// Time of the last successful write.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry written at `cached_at`.
    #[must_use]
    pub const fn new(payload: serde_json::Value, cached_at: DateTime<Utc>) -> Self {
        Self { payload, cached_at }
    }

    /// How long ago the entry was written. Negative ages (clock moved back)
    /// are reported as zero.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the entry may be used without re-fetching: `now - cached_at < ttl`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}
