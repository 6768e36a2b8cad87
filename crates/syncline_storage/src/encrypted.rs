//! Encrypted key-value store wrapper.
//!
//! Wraps any other store with AES-256-GCM encryption at rest.
//!
//! ## Security Model
//!
//! - Each value is encrypted independently with a fresh random nonce
//! - The key name is bound as associated data, so a sealed value cannot be
//!   replayed under a different key
//! - Stored layout: `marker (1 byte) || nonce (12 bytes) || ciphertext || tag (16 bytes)`
//! - Keys are never stored; they must be provided by the application

use crate::error::{StorageError, StorageResult};
use crate::store::{KeyValueStore, WriteOptions};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

const MARKER_PLAIN: u8 = 0x00;
const MARKER_SEALED: u8 = 0x01;

const HKDF_SALT: &[u8] = b"syncline-storage-salt-v1";
const HKDF_INFO: &[u8] = b"syncline-snapshot-key-v1";

/// Encryption key for the encrypted store.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a configured passphrase using HKDF-SHA256.
    ///
    /// HKDF is not a password hashing function. The passphrase is expected
    /// to carry enough entropy already (a provisioned secret, not a
    /// user-chosen password).
    ///
    /// # Errors
    ///
    /// Returns an error if the passphrase is empty.
    pub fn derive_from_passphrase(passphrase: &str) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        if passphrase.is_empty() {
            return Err(StorageError::Encryption("empty passphrase".to_string()));
        }

        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), passphrase.as_bytes());
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(HKDF_INFO, &mut bytes)
            .map_err(|_| StorageError::Encryption("HKDF expand failed".to_string()))?;
        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// Don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A store that encrypts values before handing them to an inner store.
///
/// Writes with [`WriteOptions::encrypt`] set are sealed with AES-256-GCM;
/// other writes are stored in the clear. Every stored value carries a
/// one-byte marker so reads know which case applies.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use syncline_storage::{EncryptedStore, EncryptionKey, InMemoryStore, KeyValueStore, WriteOptions};
///
/// let inner = Arc::new(InMemoryStore::new());
/// let store = EncryptedStore::new(inner, EncryptionKey::generate());
/// store.set("queue", b"{}", WriteOptions::encrypted()).unwrap();
/// assert_eq!(store.get("queue").unwrap(), Some(b"{}".to_vec()));
/// ```
pub struct EncryptedStore {
    inner: Arc<dyn KeyValueStore>,
    cipher: Aes256Gcm,
}

impl EncryptedStore {
    /// Creates a new encrypted store wrapping `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>, key: EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self { inner, cipher }
    }

    fn seal(&self, key: &str, plaintext: &[u8]) -> StorageResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption("encryption error".to_string()))?;

        let mut sealed = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        sealed.push(MARKER_SEALED);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(sealed)
    }

    fn open(&self, key: &str, sealed: &[u8]) -> StorageResult<Vec<u8>> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorageError::Encryption("ciphertext too short".to_string()));
        }
        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed[NONCE_SIZE..],
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption("decryption error".to_string()))
    }
}

impl std::fmt::Debug for EncryptedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStore")
            .field("cipher", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl KeyValueStore for EncryptedStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let Some(stored) = self.inner.get(key)? else {
            return Ok(None);
        };
        match stored.split_first() {
            Some((&MARKER_PLAIN, rest)) => Ok(Some(rest.to_vec())),
            Some((&MARKER_SEALED, rest)) => self.open(key, rest).map(Some),
            Some((marker, _)) => Err(StorageError::corrupted(
                key,
                format!("unknown value marker {marker:#04x}"),
            )),
            None => Err(StorageError::corrupted(key, "empty value")),
        }
    }

    fn set(&self, key: &str, value: &[u8], options: WriteOptions) -> StorageResult<()> {
        let stored = if options.encrypt {
            self.seal(key, value)?
        } else {
            let mut plain = Vec::with_capacity(value.len() + 1);
            plain.push(MARKER_PLAIN);
            plain.extend_from_slice(value);
            plain
        };
        self.inner.set(key, &stored, WriteOptions::default())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key)
    }
}
