//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be interpreted.
    #[error("stored value corrupted for key {key}: {reason}")]
    Corrupted {
        /// The key whose value is corrupted.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The key is not usable by this store.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// An encrypted write was requested from a store without a key.
    #[error("encryption requested but store has no encryption key")]
    EncryptionUnavailable,

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl StorageError {
    pub(crate) fn corrupted(key: &str, reason: impl Into<String>) -> Self {
        Self::Corrupted {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
