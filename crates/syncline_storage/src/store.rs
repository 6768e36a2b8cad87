//! Key-value store trait definition.

use crate::error::StorageResult;

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Encrypt the value at rest.
    pub encrypt: bool,
}

impl WriteOptions {
    /// Options requesting an encrypted write.
    #[must_use]
    pub fn encrypted() -> Self {
        Self { encrypt: true }
    }
}

/// A key-value store used by the sync engine for durable state.
///
/// Stores are **opaque byte stores**. The engine owns the snapshot format;
/// stores only guarantee that a value read back is exactly the last value
/// written under that key.
///
/// # Invariants
///
/// - `get` after a successful `set` returns the written bytes
/// - `set` replaces the previous value atomically
/// - `delete` of a missing key is not an error
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
/// - [`super::EncryptedStore`] - Encryption wrapper
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EncryptionUnavailable`](crate::StorageError::EncryptionUnavailable)
    /// if `options.encrypt` is set on a store that cannot encrypt, or an
    /// error if the write fails.
    fn set(&self, key: &str, value: &[u8], options: WriteOptions) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Returns true if a value is stored under `key`.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
