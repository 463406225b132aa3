//! Local key-value side table.
//!
//! Grace-period records, "don't ask again" flags and the offline queue are
//! the only state the console keeps on the device. They live behind the
//! [`KeyValueStore`] trait so production can use a file on disk while tests
//! use [`MemoryStore`].
//!
//! Values are JSON strings. Use [`KeyValueStoreExt`] for typed access.

pub mod file;
pub mod memory;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors that can occur when reading or writing the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be (de)serialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store's internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Key-value storage for small pieces of local state.
///
/// Reads and writes are read-modify-write with no cross-process
/// coordination. Two processes racing on the same key can lose an update.
pub trait KeyValueStore: Send + Sync {
    /// Get the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a raw value under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed JSON helpers for any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    /// Get and deserialize the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored JSON does not
    /// match `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Serialize and store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Flag {
        enabled: bool,
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        store.set_json("flag", &Flag { enabled: true }).unwrap();
        assert_eq!(
            store.get_json::<Flag>("flag").unwrap(),
            Some(Flag { enabled: true })
        );
        assert_eq!(store.get_json::<Flag>("missing").unwrap(), None);
    }

    #[test]
    fn test_get_json_type_mismatch() {
        let store = MemoryStore::new();
        store.set("flag", "\"not an object\"").unwrap();
        assert!(matches!(
            store.get_json::<Flag>("flag"),
            Err(StoreError::Serialization(_))
        ));
    }
}
