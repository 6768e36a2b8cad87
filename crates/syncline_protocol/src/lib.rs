//! # Syncline Protocol
//!
//! Data model shared by the Syncline sync engine and its collaborators.
//!
//! This crate provides:
//! - [`SyncOperation`], a single queued mutation, and its status state machine
//! - [`SyncBatch`], the ephemeral grouping selected for one sync pass
//! - [`ConflictStrategy`] and [`ConflictData`] for 409 reconciliation
//! - Payload checksums and the `X-Sync-*` header conventions
//! - JSON snapshot encoding for the durable queue
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod checksum;
mod conflict;
mod error;
pub mod headers;
mod operation;
mod snapshot;

pub use batch::{BatchMetadata, BatchProgress, BatchStatus, SyncBatch};
pub use checksum::payload_checksum;
pub use conflict::{ConflictData, ConflictStrategy, ManualResolution};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{
    HttpMethod, OperationError, OperationMetadata, OperationSpec, OperationStatus, OperationType,
    Priority, SyncOperation,
};
pub use snapshot::{decode_snapshot, encode_snapshot, QueueSnapshot};

/// Opaque operation payload. The engine never inspects it except for the
/// shallow merge conflict strategy.
pub type Payload = serde_json::Value;
