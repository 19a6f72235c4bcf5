//! Byte representation of a [`CacheEntry`].
//!
//! Entries are stored as a small JSON envelope:
//!
//! ```json
//! {"v":1,"cached_at":"2025-01-01T00:00:00Z","payload":[...]}
//! ```
//!
//! Envelopes without `v` are read as version 1.

use chrono::{DateTime, Utc};
use larder_core::CacheEntry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current envelope version.
pub const FORMAT_VERSION: u8 = 1;

/// Errors decoding a stored entry.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes are not a valid envelope.
    #[error("malformed cache entry: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The envelope was written by an incompatible version.
    #[error("unsupported cache entry version {0}")]
    UnsupportedVersion(u8),
}

const fn current_version() -> u8 {
    FORMAT_VERSION
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    v: u8,
    cached_at: DateTime<Utc>,
    payload: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default = "current_version")]
    v: u8,
    cached_at: DateTime<Utc>,
    payload: serde_json::Value,
}

/// Serialize an entry for storage.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode(entry: &CacheEntry) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&EnvelopeRef {
        v: FORMAT_VERSION,
        cached_at: entry.cached_at,
        payload: &entry.payload,
    })
}

/// Deserialize a stored entry.
///
/// # Errors
///
/// Returns an error if the bytes are malformed or from another version.
pub fn decode(bytes: &[u8]) -> Result<CacheEntry, CodecError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    if envelope.v != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(envelope.v));
    }
    Ok(CacheEntry::new(envelope.payload, envelope.cached_at))
}
