//! Directory-backed store that survives restarts.
//!
//! Each key is one file named by the base64url encoding of the key. Writes go
//! to a temporary file first and are renamed into place, so a reader never
//! sees a half-written value.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::{debug, warn};

use super::{PersistentStore, footprint};
use crate::error::StoreError;

const VALUE_SUFFIX: &str = ".val";
const TEMP_SUFFIX: &str = ".tmp";

/// Longest encoded file name accepted; common filesystems stop at 255 bytes.
const MAX_FILE_NAME: usize = 240;

/// File-backed [`PersistentStore`].
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    capacity: usize,
    used: Mutex<usize>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// Existing values are counted against `capacity`; leftover temporary
    /// files from an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read.
    pub fn open(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut used = 0;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            if name.ends_with(TEMP_SUFFIX) {
                debug!(file = name, "Removing interrupted write");
                fs::remove_file(entry.path())?;
                continue;
            }
            if let Some(key) = decode_file_name(name) {
                let len = usize::try_from(entry.metadata()?.len()).unwrap_or(usize::MAX);
                used += footprint(&key, len);
            }
        }

        debug!(dir = %dir.display(), used, capacity, "Opened file store");
        Ok(Self {
            dir,
            capacity,
            used: Mutex::new(used),
        })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bytes currently counted against the budget.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let name = format!("{}{VALUE_SUFFIX}", URL_SAFE_NO_PAD.encode(key));
        if name.len() > MAX_FILE_NAME {
            return Err(StoreError::InvalidKey(format!(
                "key of {} bytes is too long for a file name",
                key.len()
            )));
        }
        Ok(self.dir.join(name))
    }
}

fn decode_file_name(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(VALUE_SUFFIX)?;
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

fn existing_len(path: &Path) -> Result<Option<usize>, StoreError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(usize::try_from(meta.len()).unwrap_or(usize::MAX))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl PersistentStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let mut used = self.lock();

        let previous = existing_len(&path)?.map_or(0, |len| footprint(key, len));
        let needed = footprint(key, value.len());
        let others = used.saturating_sub(previous);
        let available = self.capacity.saturating_sub(others);

        if needed > available {
            return Err(StoreError::QuotaExceeded {
                key: key.to_owned(),
                needed,
                available,
            });
        }

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp_name);

        let write = (|| -> io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&temp, &path)
        })();

        if let Err(e) = write {
            if let Err(cleanup) = fs::remove_file(&temp)
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(error = %cleanup, "Failed to remove temporary file");
            }
            return Err(e.into());
        }

        *used = others + needed;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let mut used = self.lock();

        let Some(len) = existing_len(&path)? else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        *used = used.saturating_sub(footprint(key, len));
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            if let Some(key) = name.to_str().and_then(decode_file_name) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), 1024).unwrap();
            store.set("cache:listings", b"[1,2]").unwrap();
        }

        let store = FileStore::open(dir.path(), 1024).unwrap();
        assert_eq!(store.get("cache:listings").unwrap(), Some(b"[1,2]".to_vec()));
        assert_eq!(store.used_bytes(), "cache:listings".len() + 5);
        assert_eq!(store.keys().unwrap(), vec!["cache:listings".to_string()]);
    }

    #[test]
    fn test_quota_exceeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 16).unwrap();
        store.set("a", b"0123456789").unwrap();

        let err = store.set("b", b"0123456789").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_remove_frees_budget() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 16).unwrap();
        store.set("a", b"0123456789").unwrap();
        store.remove("a").unwrap();
        store.remove("a").unwrap();

        assert_eq!(store.used_bytes(), 0);
        store.set("b", b"0123456789").unwrap();
    }

    #[test]
    fn test_keys_with_special_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 1024).unwrap();
        store.set("cache:a/b%3Ac", b"x").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["cache:a/b%3Ac".to_string()]);
    }

    #[test]
    fn test_interrupted_write_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("abc.val.tmp"), b"partial").unwrap();

        let store = FileStore::open(dir.path(), 1024).unwrap();

        assert!(store.keys().unwrap().is_empty());
        assert!(!dir.path().join("abc.val.tmp").exists());
    }

    #[test]
    fn test_overlong_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), 1024).unwrap();
        let key = "k".repeat(400);
        assert!(matches!(
            store.set(&key, b"x"),
            Err(StoreError::InvalidKey(_))
        ));
    }
}
