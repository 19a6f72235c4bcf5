//! Larder configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `LARDER_STORE_DIR` - Directory for the file-backed store (default: in-memory)
//! - `LARDER_CAPACITY_BYTES` - Storage budget in bytes (default: 5 MiB)
//! - `LARDER_KEY_PREFIX` - Namespace for cache keys (default: `cache:`)
//! - `LARDER_DEFAULT_TTL_SECS` - Default cache TTL in seconds (default: 3600)
//! - `LARDER_MAX_ENTRIES` - Default cap on cached list length (default: 50)
//! - `LARDER_GUEST_ID_KEY` - Key holding the guest ID (default: `guest_id`)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{
    CachePolicies, DEFAULT_KEY_PREFIX, DEFAULT_MAX_ENTRIES, DEFAULT_TTL, ResourcePolicy,
};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::identity::{DEFAULT_GUEST_ID_KEY, SCOPED_RESOURCES};
use crate::persistent::DEFAULT_CAPACITY_BYTES;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Larder configuration.
#[derive(Debug, Clone)]
pub struct LarderConfig {
    /// Directory for the file-backed store; `None` keeps everything in memory
    pub store_dir: Option<PathBuf>,
    /// Storage budget in bytes
    pub capacity_bytes: usize,
    /// Namespace for cache keys; swept on quota failures
    pub key_prefix: String,
    /// Key holding the guest ID
    pub guest_id_key: String,
    /// Per-resource cache policies
    pub policies: CachePolicies,
    /// Events buffered per subscriber
    pub event_capacity: usize,
}

impl Default for LarderConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            guest_id_key: DEFAULT_GUEST_ID_KEY.to_string(),
            policies: CachePolicies::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LarderConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store_dir = lookup("LARDER_STORE_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);
        let capacity_bytes =
            parse_or(&lookup, "LARDER_CAPACITY_BYTES", DEFAULT_CAPACITY_BYTES)?;
        let key_prefix =
            lookup("LARDER_KEY_PREFIX").unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string());
        let ttl_secs = parse_or(&lookup, "LARDER_DEFAULT_TTL_SECS", DEFAULT_TTL.as_secs())?;
        let max_entries = parse_or(&lookup, "LARDER_MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?;
        let guest_id_key =
            lookup("LARDER_GUEST_ID_KEY").unwrap_or_else(|| DEFAULT_GUEST_ID_KEY.to_string());

        let config = Self {
            store_dir,
            capacity_bytes,
            key_prefix,
            guest_id_key,
            policies: CachePolicies::new(ResourcePolicy::new(
                Duration::from_secs(ttl_secs),
                Some(max_entries),
            )),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check invariants between settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the cache prefix is empty or
    /// overlaps a scoped-set namespace, or if the guest ID key falls inside
    /// the cache namespace. Any of these would let a quota sweep delete data
    /// that cannot be re-fetched, or let cache keys land on set keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() {
            return Err(ConfigError::InvalidEnvVar(
                "LARDER_KEY_PREFIX".to_string(),
                "must not be empty".to_string(),
            ));
        }
        if let Some(resource) = overlapping_resource(&self.key_prefix) {
            return Err(ConfigError::InvalidEnvVar(
                "LARDER_KEY_PREFIX".to_string(),
                format!("overlaps the '{resource}_' set namespace"),
            ));
        }
        if self.guest_id_key.is_empty() || self.guest_id_key.starts_with(&self.key_prefix) {
            return Err(ConfigError::InvalidEnvVar(
                "LARDER_GUEST_ID_KEY".to_string(),
                format!(
                    "must be non-empty and outside the '{}' namespace",
                    self.key_prefix
                ),
            ));
        }
        if self.capacity_bytes == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "LARDER_CAPACITY_BYTES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// The scoped resource whose keys could share a prefix with `prefix`.
///
/// Set keys are `{resource}_{identity}`. A key can start with both `prefix`
/// and `{resource}_` only if one of the two starts with the other.
fn overlapping_resource(prefix: &str) -> Option<&'static str> {
    SCOPED_RESOURCES.into_iter().find(|resource| {
        let namespace = format!("{resource}_");
        prefix.starts_with(&namespace) || namespace.starts_with(prefix)
    })
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LarderConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.store_dir, None);
        assert_eq!(config.capacity_bytes, DEFAULT_CAPACITY_BYTES);
        assert_eq!(config.key_prefix, "cache:");
        assert_eq!(config.guest_id_key, "guest_id");
        assert_eq!(config.policies.default_policy().ttl, DEFAULT_TTL);
    }

    #[test]
    fn test_overrides() {
        let config = LarderConfig::from_lookup(lookup(&[
            ("LARDER_STORE_DIR", "/tmp/larder"),
            ("LARDER_CAPACITY_BYTES", "1024"),
            ("LARDER_DEFAULT_TTL_SECS", "60"),
            ("LARDER_MAX_ENTRIES", "5"),
        ]))
        .unwrap();

        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/larder")));
        assert_eq!(config.capacity_bytes, 1024);
        assert_eq!(config.policies.for_resource("listings").ttl, Duration::from_secs(60));
        assert_eq!(config.policies.for_resource("listings").max_entries, Some(5));
        assert_eq!(
            config.policies.for_resource("notifications").ttl,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_invalid_number() {
        let err =
            LarderConfig::from_lookup(lookup(&[("LARDER_CAPACITY_BYTES", "lots")])).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "LARDER_CAPACITY_BYTES")
        );
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let err = LarderConfig::from_lookup(lookup(&[("LARDER_KEY_PREFIX", "")])).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "LARDER_KEY_PREFIX")
        );
    }

    #[test]
    fn test_prefix_overlapping_set_keys_rejected() {
        for prefix in ["wish", "w", "wishlist_", "wishlist_guest_", "basket_a:", "b"] {
            let err = LarderConfig::from_lookup(lookup(&[("LARDER_KEY_PREFIX", prefix)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "LARDER_KEY_PREFIX"),
                "{prefix:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_prefix_beside_set_keys_accepted() {
        for prefix in ["wishlist:", "basket-cache:", "c"] {
            let config = LarderConfig::from_lookup(lookup(&[("LARDER_KEY_PREFIX", prefix)]));
            assert!(config.is_ok(), "{prefix:?} should be accepted");
        }
    }

    #[test]
    fn test_guest_key_inside_cache_namespace_rejected() {
        let err = LarderConfig::from_lookup(lookup(&[("LARDER_GUEST_ID_KEY", "cache:guest")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar(ref key, _) if key == "LARDER_GUEST_ID_KEY")
        );
    }
}
