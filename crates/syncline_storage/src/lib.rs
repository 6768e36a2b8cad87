//! # Syncline Storage
//!
//! Key-value storage contract and backends for the Syncline sync engine.
//!
//! The engine persists exactly one logical key (the queue snapshot), so
//! backends here are deliberately small: **opaque byte values addressed by
//! string keys**. They never interpret what they store.
//!
//! ## Design Principles
//!
//! - Stores are `Send + Sync` and take `&self`; locking is internal
//! - A `set` fully replaces the previous value (no partial writes visible)
//! - Encryption is opt-in per write and only honored by [`EncryptedStore`]
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - One file per key with atomic replace
//! - [`EncryptedStore`] - Wrapper that adds AES-256-GCM encryption
//!
//! ## Example
//!
//! ```rust
//! use syncline_storage::{InMemoryStore, KeyValueStore, WriteOptions};
//!
//! let store = InMemoryStore::new();
//! store.set("queue", b"{}", WriteOptions::default()).unwrap();
//! assert_eq!(store.get("queue").unwrap(), Some(b"{}".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod encrypted;
mod error;
mod file;
mod memory;
mod store;

pub use encrypted::{EncryptedStore, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{KeyValueStore, WriteOptions};
