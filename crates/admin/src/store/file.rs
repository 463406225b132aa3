//! File-backed key-value store.
//!
//! All keys live in one JSON object on disk. Every write rewrites the file
//! through a temporary sibling and a rename so a crash never leaves a
//! half-written document behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{KeyValueStore, StoreError};

/// File name used inside the state directory.
pub const STATE_FILE_NAME: &str = "local_state.json";

/// A [`KeyValueStore`] persisted as a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Open the store inside a state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn in_dir(dir: &Path) -> Result<Self, StoreError> {
        Self::open(dir.join(STATE_FILE_NAME))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "Wrote local state");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_owned(), value.to_owned());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_store() -> (FileStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("tillwise-store-{}", uuid::Uuid::new_v4()));
        let store = FileStore::in_dir(&dir).unwrap();
        (store, dir)
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let (store, dir) = temp_store();
        assert_eq!(store.get("anything").unwrap(), None);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_values_survive_reopen() {
        let (store, dir) = temp_store();
        store.set("grace:t1", "{\"x\":1}").unwrap();
        drop(store);

        let reopened = FileStore::in_dir(&dir).unwrap();
        assert_eq!(reopened.get("grace:t1").unwrap().as_deref(), Some("{\"x\":1}"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_remove_persists() {
        let (store, dir) = temp_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();

        let reopened = FileStore::in_dir(&dir).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some("2"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let (store, dir) = temp_store();
        fs::write(store.path(), "{not json").unwrap();
        assert!(matches!(store.get("a"), Err(StoreError::Serialization(_))));
        fs::remove_dir_all(dir).ok();
    }
}
