//! Test fixtures and store helpers.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use syncline_protocol::{
    encode_snapshot, OperationSpec, OperationStatus, Priority, QueueSnapshot, SyncOperation,
};
use syncline_storage::{FileStore, InMemoryStore, KeyValueStore, WriteOptions};
use tempfile::TempDir;

/// Snapshot key used by the engine unless configured otherwise.
pub const DEFAULT_SNAPSHOT_KEY: &str = "syncline:queue";

/// Device id stamped on seeded operations.
pub const TEST_DEVICE: &str = "test-device";

/// A file store in a temporary directory that is removed on drop.
pub struct TempFileStore {
    store: Arc<FileStore>,
    temp_dir: TempDir,
}

impl TempFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(temp_dir.path()).expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            temp_dir,
        }
    }

    /// Returns the store as a shared trait object.
    pub fn shared(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// Opens a second handle on the same directory, as a restarted process
    /// would.
    pub fn reopen(&self) -> Arc<dyn KeyValueStore> {
        Arc::new(FileStore::open(self.temp_dir.path()).expect("Failed to reopen file store"))
    }

    /// Returns the directory backing the store.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TempFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempFileStore {
    type Target = FileStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A `create` spec for `/items` carrying `{"n": n}`.
pub fn sample_spec(n: u64) -> OperationSpec {
    OperationSpec::create("/items", json!({ "n": n, "label": format!("item-{n}") }))
}

/// An `update` spec for `/items/<n>` with the given priority.
pub fn update_spec(n: u64, priority: Priority) -> OperationSpec {
    OperationSpec::update(format!("/items/{n}"), json!({ "n": n, "rev": 2 }))
        .with_priority(priority)
}

/// Builds a pending operation as the engine would have queued it.
pub fn seeded_operation(id: &str, spec: OperationSpec, created_at: u64) -> SyncOperation {
    SyncOperation::from_spec(spec, id, TEST_DEVICE, None, created_at)
        .expect("Failed to build operation")
}

/// Builds queue snapshots for recovery tests.
#[derive(Debug, Default, Clone)]
pub struct SnapshotBuilder {
    snapshot: QueueSnapshot,
}

impl SnapshotBuilder {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation.
    pub fn with(mut self, op: SyncOperation) -> Self {
        self.snapshot.insert(op.id.clone(), op);
        self
    }

    /// Adds a pending operation built from `spec`.
    pub fn with_operation(self, id: &str, spec: OperationSpec, created_at: u64) -> Self {
        self.with(seeded_operation(id, spec, created_at))
    }

    /// Adds a pending operation that has already failed `attempts` times
    /// and is due for another attempt.
    pub fn with_attempts(self, id: &str, spec: OperationSpec, attempts: u32) -> Self {
        let mut op = seeded_operation(id, spec, 1);
        op.metadata.attempt_count = attempts;
        op.metadata.next_retry = Some(1);
        self.with(op)
    }

    /// Adds a pending operation that has failed `attempts` times and waits
    /// for its backoff to elapse at `next_retry` (milliseconds since the
    /// Unix epoch).
    pub fn with_backoff(
        self,
        id: &str,
        spec: OperationSpec,
        attempts: u32,
        next_retry: u64,
    ) -> Self {
        let mut op = seeded_operation(id, spec, 1);
        op.metadata.attempt_count = attempts;
        op.metadata.next_retry = Some(next_retry);
        self.with(op)
    }

    /// Adds an operation that was in flight when the process stopped.
    pub fn with_in_flight(self, id: &str, spec: OperationSpec) -> Self {
        let mut op = seeded_operation(id, spec, 1);
        op.transition(OperationStatus::Syncing, 2)
            .expect("pending -> syncing is always allowed");
        self.with(op)
    }

    /// Returns the snapshot.
    pub fn build(self) -> QueueSnapshot {
        self.snapshot
    }

    /// Returns the encoded snapshot.
    pub fn encode(&self) -> Vec<u8> {
        encode_snapshot(&self.snapshot).expect("Failed to encode snapshot")
    }

    /// Writes the snapshot to `store` under `key`.
    pub fn write_to(&self, store: &dyn KeyValueStore, key: &str) {
        store
            .set(key, &self.encode(), WriteOptions::default())
            .expect("Failed to write snapshot");
    }

    /// Returns an in-memory store holding the snapshot under `key`.
    pub fn into_memory_store(self, key: &str) -> Arc<InMemoryStore> {
        Arc::new(InMemoryStore::with_entry(key, self.encode()))
    }
}
