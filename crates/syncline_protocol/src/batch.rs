//! Sync batches.
//!
//! A batch is a scheduling artifact: it is rebuilt every pass and never
//! persisted.

use crate::operation::{Priority, SyncOperation};
use serde::{Deserialize, Serialize};

/// Status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Built but not started.
    Pending,
    /// Being dispatched.
    Syncing,
    /// Every operation completed.
    Completed,
    /// Some operations failed or conflicted.
    Partial,
}

/// Per-batch outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Number of operations in the batch.
    pub total: usize,
    /// Operations accepted by the server.
    pub completed: usize,
    /// Operations that failed this attempt (retrying or terminal).
    pub failed: usize,
    /// Operations that hit a conflict.
    pub conflicts: usize,
}

impl BatchProgress {
    /// Number of operations with an outcome so far.
    pub fn processed(&self) -> usize {
        self.completed + self.failed + self.conflicts
    }

    /// Returns true once every operation has an outcome.
    pub fn is_done(&self) -> bool {
        self.processed() >= self.total
    }
}

/// Batch bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    /// Creation time, milliseconds since the Unix epoch.
    pub created_at: u64,
}

/// An ordered group of operations selected for one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Batch id.
    pub id: String,
    /// Operations in dispatch order.
    pub operations: Vec<SyncOperation>,
    /// Highest priority among the operations.
    pub priority: Priority,
    /// Batch status.
    pub status: BatchStatus,
    /// Outcome counters.
    pub progress: BatchProgress,
    /// Bookkeeping.
    pub metadata: BatchMetadata,
}

impl SyncBatch {
    /// Creates a pending batch. Its priority is the highest member priority,
    /// or `Normal` for an empty batch.
    pub fn new(id: impl Into<String>, operations: Vec<SyncOperation>, now: u64) -> Self {
        let priority = operations
            .iter()
            .map(|op| op.priority)
            .max()
            .unwrap_or_default();
        Self::with_priority(id, operations, priority, now)
    }

    /// Creates a pending batch with an explicit priority.
    pub fn with_priority(
        id: impl Into<String>,
        operations: Vec<SyncOperation>,
        priority: Priority,
        now: u64,
    ) -> Self {
        let total = operations.len();
        Self {
            id: id.into(),
            operations,
            priority,
            status: BatchStatus::Pending,
            progress: BatchProgress {
                total,
                ..BatchProgress::default()
            },
            metadata: BatchMetadata { created_at: now },
        }
    }

    /// Returns the number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the ids of the operations in dispatch order.
    pub fn operation_ids(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.id.as_str()).collect()
    }

    /// Sets the final status from the progress counters.
    pub fn finish(&mut self) {
        self.status = if self.progress.completed == self.progress.total {
            BatchStatus::Completed
        } else {
            BatchStatus::Partial
        };
    }
}
