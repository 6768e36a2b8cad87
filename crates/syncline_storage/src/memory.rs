//! In-memory key-value store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{KeyValueStore, WriteOptions};
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory key-value store.
///
/// Suitable for unit tests, integration tests and engines that do not need
/// to survive a restart. Values can be shared between two engines in the
/// same process by sharing the store behind an `Arc`, which is how restart
/// scenarios are simulated in tests.
///
/// # Example
///
/// ```rust
/// use syncline_storage::{InMemoryStore, KeyValueStore, WriteOptions};
///
/// let store = InMemoryStore::new();
/// store.set("k", b"v", WriteOptions::default()).unwrap();
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-existing value.
    ///
    /// Useful for testing recovery from a snapshot.
    #[must_use]
    pub fn with_entry(key: impl Into<String>, value: Vec<u8>) -> Self {
        let store = Self::new();
        store.entries.write().insert(key.into(), value);
        store
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every stored value.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8], options: WriteOptions) -> StorageResult<()> {
        if options.encrypt {
            return Err(StorageError::EncryptionUnavailable);
        }
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_set_then_get() {
        let store = InMemoryStore::new();
        store.set("a", b"one", WriteOptions::default()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"one".to_vec()));
        assert!(store.contains("a").unwrap());
    }

    #[test]
    fn memory_set_replaces() {
        let store = InMemoryStore::new();
        store.set("a", b"one", WriteOptions::default()).unwrap();
        store.set("a", b"two", WriteOptions::default()).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_delete() {
        let store = InMemoryStore::new();
        store.set("a", b"one", WriteOptions::default()).unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        // Deleting again is fine
        store.delete("a").unwrap();
    }

    #[test]
    fn memory_rejects_encrypted_write() {
        let store = InMemoryStore::new();
        let result = store.set("a", b"secret", WriteOptions::encrypted());
        assert!(matches!(result, Err(StorageError::EncryptionUnavailable)));
        assert!(store.is_empty());
    }

    #[test]
    fn memory_with_entry() {
        let store = InMemoryStore::with_entry("snapshot", b"{}".to_vec());
        assert_eq!(store.get("snapshot").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn memory_clear() {
        let store = InMemoryStore::new();
        store.set("a", b"1", WriteOptions::default()).unwrap();
        store.set("b", b"2", WriteOptions::default()).unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
