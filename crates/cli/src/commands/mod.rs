//! Command implementations.

pub mod cache;
pub mod identity;

use std::path::PathBuf;

use larder_core::UserIdError;
use larder_store::{ConfigError, FileStore, Larder, LarderConfig, OpenError, StoreError};
use thiserror::Error;

/// Errors that can occur running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The store could not be opened.
    #[error("{0}")]
    Open(#[from] OpenError),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No store directory was given.
    #[error("No store directory: set LARDER_STORE_DIR or pass --store-dir")]
    NoStoreDir,

    /// The user ID is not usable.
    #[error("Invalid user id: {0}")]
    InvalidUser(#[from] UserIdError),

    /// Nothing is stored at the key.
    #[error("No value at {0}")]
    NotFound(String),

    /// Some resources failed to migrate.
    #[error("{0} resource(s) failed to migrate")]
    MigrationFailed(usize),

    /// Output could not be rendered.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which identity-scoped set a command works on.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Resource {
    /// Saved items
    Wishlist,
    /// Items in the basket
    Basket,
}

/// Load configuration, with `store_dir` overriding `LARDER_STORE_DIR`.
///
/// An in-memory store would start empty every run, so a directory is required.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or no directory is set.
pub fn config(store_dir: Option<PathBuf>) -> Result<LarderConfig, CliError> {
    let mut config = LarderConfig::from_env()?;
    if let Some(dir) = store_dir {
        config.store_dir = Some(dir);
    }
    if config.store_dir.is_none() {
        return Err(CliError::NoStoreDir);
    }
    Ok(config)
}

/// Open a [`Larder`] over a configuration from [`config`].
///
/// Creates the guest ID if the store has none.
///
/// # Errors
///
/// Returns an error if the store cannot be opened.
pub fn open(config: LarderConfig) -> Result<Larder, CliError> {
    Ok(Larder::open(config)?)
}

/// Open the configured directory as a bare medium, writing nothing to it.
///
/// # Errors
///
/// Returns an error if no directory is configured or it cannot be read.
pub fn open_read_only(config: &LarderConfig) -> Result<FileStore, CliError> {
    let dir = config.store_dir.clone().ok_or(CliError::NoStoreDir)?;
    Ok(FileStore::open(dir, config.capacity_bytes)?)
}
