//! Sync statistics.

use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;

/// A point-in-time view of the engine's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatistics {
    /// Operations ever queued, including those loaded from a snapshot.
    pub total_operations: u64,
    /// Operations waiting for an attempt or in flight.
    pub pending_operations: u64,
    /// Operations accepted by the server.
    pub completed_operations: u64,
    /// Operations given up on.
    pub failed_operations: u64,
    /// Conflicts encountered, whatever the strategy.
    pub conflicted_operations: u64,
    /// Request and response body bytes.
    pub data_transferred: u64,
    /// End of the most recent pass, milliseconds since the Unix epoch.
    pub last_sync_time: Option<u64>,
    /// Failed attempts that were scheduled for retry.
    pub retries: u64,
    /// Sync passes that dispatched at least one operation.
    pub passes_completed: u64,
    /// Mean wall-clock duration of completed passes.
    #[serde(rename = "averagePassDurationMs", serialize_with = "as_millis")]
    pub average_pass_duration: Duration,
    /// Message of the most recent failed attempt.
    pub last_error: Option<String>,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
}

#[derive(Debug, Default)]
struct Counters {
    stats: SyncStatistics,
    total_pass_time: Duration,
}

/// Accumulates engine counters.
///
/// `pending_operations` is not tracked here; it is filled in from the queue
/// when a snapshot is taken.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    inner: RwLock<Counters>,
}

impl StatisticsTracker {
    /// Creates a tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts operations restored from a snapshot.
    pub fn record_loaded(&self, loaded: usize) {
        self.inner.write().stats.total_operations += loaded as u64;
    }

    /// Records a newly queued operation.
    pub fn record_queued(&self) {
        self.inner.write().stats.total_operations += 1;
    }

    /// Records an operation accepted by the server.
    pub fn record_completed(&self) {
        self.inner.write().stats.completed_operations += 1;
    }

    /// Records an operation given up on.
    pub fn record_failed(&self, message: &str) {
        let mut inner = self.inner.write();
        inner.stats.failed_operations += 1;
        inner.stats.last_error = Some(message.to_string());
    }

    /// Records a failed attempt that will be retried.
    pub fn record_retry(&self, message: &str) {
        let mut inner = self.inner.write();
        inner.stats.retries += 1;
        inner.stats.last_error = Some(message.to_string());
    }

    /// Records a detected conflict.
    pub fn record_conflict(&self) {
        self.inner.write().stats.conflicted_operations += 1;
    }

    /// Adds transferred bytes.
    pub fn record_transfer(&self, bytes: usize) {
        self.inner.write().stats.data_transferred += bytes as u64;
    }

    /// Records the end of a pass.
    pub fn record_pass(&self, duration: Duration, finished_at: u64) {
        let mut inner = self.inner.write();
        inner.total_pass_time += duration;
        inner.stats.passes_completed += 1;
        inner.stats.last_sync_time = Some(finished_at);

        let passes = u32::try_from(inner.stats.passes_completed).unwrap_or(u32::MAX);
        inner.stats.average_pass_duration = inner.total_pass_time / passes;
    }

    /// Returns the counters with `pending_operations` set to `pending`.
    pub fn snapshot(&self, pending: usize) -> SyncStatistics {
        let mut stats = self.inner.read().stats.clone();
        stats.pending_operations = pending as u64;
        stats
    }
}
