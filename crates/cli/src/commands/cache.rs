//! Key listing and cache maintenance.

use larder_core::StoreKey;
use larder_store::{Clock, Larder, PersistentStore, SystemClock, codec};
use tracing::{info, warn};

use super::CliError;

/// Print stored keys, sorted, optionally filtered by prefix.
///
/// # Errors
///
/// Returns an error if the store cannot be listed.
#[allow(clippy::print_stdout)]
pub fn keys(store: &dyn PersistentStore, prefix: Option<&str>) -> Result<(), CliError> {
    let mut keys = store.keys()?;
    keys.retain(|key| prefix.is_none_or(|prefix| key.starts_with(prefix)));
    keys.sort();

    for key in &keys {
        println!("{key}");
    }
    info!(count = keys.len(), "Listed keys");
    Ok(())
}

/// Print the value at a raw key.
///
/// Keys under `cache_prefix` are decoded as cache entries and shown with
/// their age; anything else is printed as JSON when it parses as JSON.
///
/// # Errors
///
/// Returns [`CliError::NotFound`] if nothing is stored at `key`.
#[allow(clippy::print_stdout)]
pub fn inspect(
    store: &dyn PersistentStore,
    cache_prefix: &str,
    key: &str,
) -> Result<(), CliError> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| CliError::NotFound(key.to_owned()))?;

    if key.starts_with(cache_prefix) {
        match codec::decode(&bytes) {
            Ok(entry) => {
                let age = entry.age(SystemClock.now());
                println!("cached_at: {}", entry.cached_at);
                println!("age:       {}s", age.as_secs());
                println!("{}", serde_json::to_string_pretty(&entry.payload)?);
                return Ok(());
            }
            Err(e) => warn!(key, error = %e, "Not a readable cache entry, showing raw value"),
        }
    }

    match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}

/// Remove the cache entry for `resource` and `components`.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn clear(larder: &Larder, resource: &str, components: &[String]) -> Result<(), CliError> {
    let key = components
        .iter()
        .fold(StoreKey::new(resource), |key, component| key.with(component));
    larder.cache().clear(&key)?;
    info!(key = %larder.cache().storage_key(&key), "Cleared cache entry");
    Ok(())
}

/// Remove every cache entry.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn clear_all(larder: &Larder) -> Result<(), CliError> {
    let count = larder.cache().clear_all()?;
    info!(count, "Cleared cache");
    Ok(())
}
