//! Error types for the sync engine.

use syncline_protocol::{OperationStatus, ProtocolError};
use syncline_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The queue is at capacity.
    #[error("queue full: {size} operations (max {max})")]
    QueueFull {
        /// Current queue size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server answered with a non-success status.
    #[error("server responded {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message from the response body, or the status itself.
        message: String,
    },

    /// Storage error while persisting or loading the queue.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding error or invalid state transition.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No operation with the given id.
    #[error("operation not found: {0}")]
    NotFound(String),

    /// An operation with the given id already exists.
    #[error("duplicate operation id: {0}")]
    DuplicateId(String),

    /// The operation is in a status that does not allow the request.
    #[error("operation {id} is {status}")]
    InvalidState {
        /// Operation id.
        id: String,
        /// Current status.
        status: OperationStatus,
    },

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The manager has been destroyed.
    #[error("sync manager destroyed")]
    Destroyed,

    /// The engine was constructed outside a tokio runtime.
    #[error("no tokio runtime: {0}")]
    NoRuntime(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a failed attempt with this error should be retried.
    ///
    /// Server errors, request timeouts and rate limiting are retried; other
    /// client errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            SyncError::Timeout | SyncError::NotConnected => true,
            _ => false,
        }
    }

    /// Returns a short machine-readable code for error records.
    pub fn code(&self) -> String {
        match self {
            SyncError::QueueFull { .. } => "QUEUE_FULL".into(),
            SyncError::Transport { .. } => "NETWORK".into(),
            SyncError::Http { status, .. } => format!("HTTP_{status}"),
            SyncError::Storage(_) => "STORAGE".into(),
            SyncError::Protocol(_) => "PROTOCOL".into(),
            SyncError::InvalidConfig(_) => "CONFIG".into(),
            SyncError::NotFound(_) => "NOT_FOUND".into(),
            SyncError::DuplicateId(_) => "DUPLICATE_ID".into(),
            SyncError::InvalidState { .. } => "INVALID_STATE".into(),
            SyncError::Timeout => "TIMEOUT".into(),
            SyncError::NotConnected => "NOT_CONNECTED".into(),
            SyncError::Destroyed => "DESTROYED".into(),
            SyncError::NoRuntime(_) => "NO_RUNTIME".into(),
        }
    }
}
