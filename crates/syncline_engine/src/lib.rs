//! # Syncline Engine
//!
//! Offline-first background synchronization engine.
//!
//! This crate provides:
//! - A bounded, durable operation queue with debounced snapshot persistence
//! - Priority scheduling with retry eligibility
//! - Exponential-backoff retry of transient failures
//! - Four conflict strategies (server-wins, client-wins, merge, manual)
//! - Network-state-driven triggering and optional health checks
//! - A typed event bus for observers
//!
//! ## Architecture
//!
//! ```text
//! caller ──► SyncManager ──► OperationQueue ──► KeyValueStore (snapshot)
//!                │                 ▲
//!                ▼                 │ outcomes
//!          NetworkMonitor ──► SyncExecutor ──► PriorityScheduler
//!                                  │
//!                                  ├──► Transport (one request per operation)
//!                                  ├──► ConflictResolver (409)
//!                                  └──► StatisticsTracker / EventBus
//! ```
//!
//! ## Key Invariants
//!
//! - Operation ids are unique for the lifetime of the queue
//! - Only `pending` operations are selected, cancelled, or retried
//! - At most one sync pass runs at a time
//! - A sync pass never fails because of an individual operation
//! - Storage failures are logged and the engine keeps running in memory

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod conflict;
mod error;
mod events;
mod executor;
mod manager;
mod network;
mod queue;
mod scheduler;
mod stats;
mod timer;
mod transport;

pub use clock::now_millis;
pub use config::{NetworkDetectionConfig, RetryConfig, StorageConfig, SyncConfig};
pub use conflict::{merge_payloads, ConflictOutcome, ConflictResolver, Resolution};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, EventKind, Subscription, SyncEvent};
pub use executor::{PassMode, PassReport, PassSkipped, SyncExecutor};
pub use manager::SyncManager;
pub use network::NetworkMonitor;
pub use queue::{OperationQueue, Origin, QueueOptions};
pub use scheduler::PriorityScheduler;
pub use stats::{StatisticsTracker, SyncStatistics};
pub use timer::Timer;
pub use transport::{MockTransport, Transport, TransportHints, TransportRequest, TransportResponse};

pub use syncline_protocol::{
    BatchProgress, BatchStatus, ConflictData, ConflictStrategy, HttpMethod, ManualResolution,
    OperationError, OperationSpec, OperationStatus, OperationType, Payload, Priority, SyncBatch,
    SyncOperation,
};
