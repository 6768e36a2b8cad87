//! Durable operation queue.
//!
//! The queue is the single owner of operation state. Every mutation goes
//! through a write lock on the in-memory map, then schedules a full
//! snapshot write. Snapshot writes are debounced and take their snapshot at
//! write time, so a write always reflects every mutation made before it.

use crate::clock::now_millis;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::stats::StatisticsTracker;
use crate::timer::Timer;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncline_protocol::{
    decode_snapshot, encode_snapshot, OperationSpec, OperationStatus, Priority, QueueSnapshot,
    SyncBatch, SyncOperation,
};
use syncline_storage::{KeyValueStore, WriteOptions};
use tracing::{debug, error, warn};

/// Queue settings.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Maximum number of operations held.
    pub max_size: usize,
    /// Storage key of the snapshot.
    pub snapshot_key: String,
    /// Request encryption for snapshot writes.
    pub encrypt: bool,
    /// Delay between a mutation and its snapshot write.
    pub debounce: Duration,
}

impl QueueOptions {
    /// Derives queue settings from the engine configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_size: config.max_queue_size,
            snapshot_key: config.storage.snapshot_key.clone(),
            encrypt: config.storage.encryption_key.is_some(),
            debounce: config.storage.persist_debounce,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Device and user stamped on newly queued operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Device id.
    pub device_id: String,
    /// User id.
    pub user_id: Option<String>,
}

impl Origin {
    /// Creates an origin with no user.
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            user_id: None,
        }
    }
}

struct Snapshotter {
    entries: RwLock<HashMap<String, SyncOperation>>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    write_options: WriteOptions,
    write_lock: Mutex<()>,
    write_scheduled: AtomicBool,
}

impl Snapshotter {
    fn write(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        let snapshot: QueueSnapshot = self
            .entries
            .read()
            .iter()
            .map(|(id, op)| (id.clone(), op.clone()))
            .collect();
        let bytes = encode_snapshot(&snapshot)?;
        self.store.set(&self.key, &bytes, self.write_options)?;
        debug!(operations = snapshot.len(), bytes = bytes.len(), "queue snapshot written");
        Ok(())
    }

    fn write_logged(&self) {
        if let Err(e) = self.write() {
            error!(error = %e, key = %self.key, "failed to persist queue snapshot");
        }
    }
}

/// Bounded, durable collection of sync operations.
pub struct OperationQueue {
    shared: Arc<Snapshotter>,
    events: Arc<EventBus>,
    stats: Arc<StatisticsTracker>,
    persist_timer: Timer,
    max_size: usize,
    debounce: Duration,
}

impl OperationQueue {
    /// Opens the queue, restoring the snapshot stored under
    /// `options.snapshot_key`.
    ///
    /// A missing, unreadable or corrupt snapshot yields an empty queue.
    /// Operations that were in flight when the snapshot was written are
    /// returned to `pending`.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        options: QueueOptions,
        events: Arc<EventBus>,
        stats: Arc<StatisticsTracker>,
    ) -> Self {
        let entries = load_snapshot(store.as_ref(), &options.snapshot_key);
        if entries.len() > options.max_size {
            warn!(
                loaded = entries.len(),
                max = options.max_size,
                "restored queue exceeds capacity"
            );
        }
        stats.record_loaded(entries.len());

        let write_options = WriteOptions {
            encrypt: options.encrypt,
        };
        Self {
            shared: Arc::new(Snapshotter {
                entries: RwLock::new(entries),
                store,
                key: options.snapshot_key,
                write_options,
                write_lock: Mutex::new(()),
                write_scheduled: AtomicBool::new(false),
            }),
            events,
            stats,
            persist_timer: Timer::new(),
            max_size: options.max_size,
            debounce: options.debounce,
        }
    }

    /// Queues a new operation.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::QueueFull`] and emits `queue:full` when the
    /// queue is at capacity.
    pub fn enqueue(&self, spec: OperationSpec, origin: &Origin) -> SyncResult<SyncOperation> {
        let mut entries = self.shared.entries.write();
        let size = entries.len();
        if size >= self.max_size {
            drop(entries);
            warn!(size, max = self.max_size, endpoint = %spec.endpoint, "queue full");
            self.events.emit(SyncEvent::QueueFull {
                size,
                operation: spec,
            });
            return Err(SyncError::QueueFull {
                size,
                max: self.max_size,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        if entries.contains_key(&id) {
            return Err(SyncError::DuplicateId(id));
        }
        let op = SyncOperation::from_spec(
            spec,
            id,
            origin.device_id.clone(),
            origin.user_id.clone(),
            now_millis(),
        )?;
        entries.insert(op.id.clone(), op.clone());
        drop(entries);

        debug!(operation_id = %op.id, priority = %op.priority, endpoint = %op.endpoint, "operation queued");
        self.stats.record_queued();
        self.persist();
        self.events.emit(SyncEvent::OperationQueued {
            operation: op.clone(),
        });
        Ok(op)
    }

    /// Queues every spec with the given priority.
    ///
    /// Stops at the first failure. Operations queued before it stay queued.
    pub fn enqueue_batch(
        &self,
        specs: Vec<OperationSpec>,
        priority: Priority,
        origin: &Origin,
    ) -> SyncResult<SyncBatch> {
        let mut operations = Vec::with_capacity(specs.len());
        for spec in specs {
            operations.push(self.enqueue(spec.with_priority(priority), origin)?);
        }
        Ok(SyncBatch::with_priority(
            uuid::Uuid::new_v4().to_string(),
            operations,
            priority,
            now_millis(),
        ))
    }

    /// Returns the operation with the given id.
    pub fn get(&self, id: &str) -> Option<SyncOperation> {
        self.shared.entries.read().get(id).cloned()
    }

    /// Returns every operation, oldest first.
    pub fn get_all(&self) -> Vec<SyncOperation> {
        let mut all: Vec<SyncOperation> = self.shared.entries.read().values().cloned().collect();
        all.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        all
    }

    /// Returns the number of operations held.
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    /// Returns true if the queue holds no operations.
    pub fn is_empty(&self) -> bool {
        self.shared.entries.read().is_empty()
    }

    /// Returns the number of operations in the given status.
    pub fn count(&self, status: OperationStatus) -> usize {
        self.shared
            .entries
            .read()
            .values()
            .filter(|op| op.status == status)
            .count()
    }

    /// Returns the number of operations waiting for or in an attempt.
    pub fn outstanding(&self) -> usize {
        self.shared
            .entries
            .read()
            .values()
            .filter(|op| {
                matches!(
                    op.status,
                    OperationStatus::Pending | OperationStatus::Syncing
                )
            })
            .count()
    }

    /// Returns true if any operation is eligible for dispatch at `now`.
    pub fn has_eligible(&self, now: u64) -> bool {
        self.shared
            .entries
            .read()
            .values()
            .any(|op| op.is_eligible(now))
    }

    /// Runs `f` over the current operations under a read lock.
    pub fn with_entries<R>(&self, f: impl FnOnce(&HashMap<String, SyncOperation>) -> R) -> R {
        f(&self.shared.entries.read())
    }

    /// Removes an operation regardless of status.
    pub fn remove(&self, id: &str) -> Option<SyncOperation> {
        let removed = self.shared.entries.write().remove(id);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Removes an operation unless it is in flight.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown id and
    /// [`SyncError::InvalidState`] for a `syncing` operation.
    pub fn discard(&self, id: &str) -> SyncResult<SyncOperation> {
        let mut entries = self.shared.entries.write();
        match entries.get(id).map(|op| op.status) {
            None => return Err(SyncError::NotFound(id.to_string())),
            Some(OperationStatus::Syncing) => {
                return Err(SyncError::InvalidState {
                    id: id.to_string(),
                    status: OperationStatus::Syncing,
                })
            }
            Some(_) => {}
        }
        let removed = entries.remove(id);
        drop(entries);

        self.persist();
        removed.ok_or_else(|| SyncError::NotFound(id.to_string()))
    }

    /// Removes an operation if it is still `pending`. Returns false for any
    /// other status or an unknown id.
    pub fn cancel(&self, id: &str) -> bool {
        let mut entries = self.shared.entries.write();
        if entries.get(id).map(|op| op.status) != Some(OperationStatus::Pending) {
            return false;
        }
        entries.remove(id);
        drop(entries);

        debug!(operation_id = %id, "operation cancelled");
        self.persist();
        true
    }

    /// Moves a `pending` operation to `syncing` and returns it.
    ///
    /// Returns `None` if the operation is gone or no longer pending.
    pub fn begin_attempt(&self, id: &str, now: u64) -> Option<SyncOperation> {
        let mut entries = self.shared.entries.write();
        let op = entries.get_mut(id)?;
        if op.status != OperationStatus::Pending {
            return None;
        }
        op.transition(OperationStatus::Syncing, now).ok()?;
        let started = op.clone();
        drop(entries);

        self.persist();
        Some(started)
    }

    /// Applies `f` to the operation with the given id.
    ///
    /// `f` works on a copy. The copy replaces the stored operation only if
    /// `f` returns `Ok`.
    pub fn update<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SyncOperation) -> SyncResult<R>,
    ) -> SyncResult<R> {
        let mut entries = self.shared.entries.write();
        let current = entries
            .get(id)
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let mut updated = current.clone();
        let result = f(&mut updated)?;
        entries.insert(id.to_string(), updated);
        drop(entries);

        self.persist();
        Ok(result)
    }

    /// Applies `f` to every operation matching `predicate`. Returns the
    /// number of operations changed.
    pub fn update_where(
        &self,
        predicate: impl Fn(&SyncOperation) -> bool,
        mut f: impl FnMut(&mut SyncOperation),
    ) -> usize {
        let mut entries = self.shared.entries.write();
        let mut changed = 0;
        for op in entries.values_mut().filter(|op| predicate(op)) {
            f(op);
            changed += 1;
        }
        drop(entries);

        if changed > 0 {
            self.persist();
        }
        changed
    }

    /// Removes every operation matching `predicate`. Returns the number
    /// removed.
    pub fn remove_where(&self, predicate: impl Fn(&SyncOperation) -> bool) -> usize {
        let mut entries = self.shared.entries.write();
        let before = entries.len();
        entries.retain(|_, op| !predicate(op));
        let removed = before - entries.len();
        drop(entries);

        if removed > 0 {
            self.persist();
        }
        removed
    }

    /// Writes the snapshot now, cancelling any pending debounced write.
    pub fn flush(&self) -> SyncResult<()> {
        self.persist_timer.cancel();
        self.shared.write_scheduled.store(false, Ordering::SeqCst);
        self.shared.write()
    }

    /// Returns true if a debounced snapshot write is pending.
    pub fn has_pending_write(&self) -> bool {
        self.shared.write_scheduled.load(Ordering::SeqCst)
    }

    fn persist(&self) {
        if self.debounce.is_zero() {
            self.shared.write_logged();
            return;
        }
        if self.shared.write_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let scheduled = self.persist_timer.schedule(self.debounce, move || {
            shared.write_scheduled.store(false, Ordering::SeqCst);
            shared.write_logged();
        });
        if !scheduled {
            self.shared.write_scheduled.store(false, Ordering::SeqCst);
            self.shared.write_logged();
        }
    }
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("key", &self.shared.key)
            .finish()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        if self.shared.write_scheduled.swap(false, Ordering::SeqCst) {
            self.persist_timer.cancel();
            self.shared.write_logged();
        }
    }
}

fn load_snapshot(store: &dyn KeyValueStore, key: &str) -> HashMap<String, SyncOperation> {
    let bytes = match store.get(key) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return HashMap::new(),
        Err(e) => {
            error!(error = %e, key, "failed to read queue snapshot, starting empty");
            return HashMap::new();
        }
    };

    let snapshot = match decode_snapshot(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!(error = %e, key, "corrupt queue snapshot, starting empty");
            return HashMap::new();
        }
    };

    let now = now_millis();
    snapshot
        .into_iter()
        .map(|(id, mut op)| {
            if op.status == OperationStatus::Syncing {
                debug!(operation_id = %id, "resetting interrupted operation to pending");
                op.status = OperationStatus::Pending;
                op.metadata.updated_at = now;
            }
            (id, op)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use serde_json::json;
    use syncline_storage::{InMemoryStore, StorageError, StorageResult};

    const KEY: &str = "syncline:queue";

    fn options(max_size: usize) -> QueueOptions {
        QueueOptions {
            max_size,
            snapshot_key: KEY.to_string(),
            encrypt: false,
            debounce: Duration::ZERO,
        }
    }

    fn open_with(store: Arc<dyn KeyValueStore>, options: QueueOptions) -> OperationQueue {
        OperationQueue::open(
            store,
            options,
            Arc::new(EventBus::new(64)),
            Arc::new(StatisticsTracker::new()),
        )
    }

    fn origin() -> Origin {
        Origin::device("device-a")
    }

    fn spec(n: u64) -> OperationSpec {
        OperationSpec::create("/orders", json!({ "n": n }))
    }

    fn stored_snapshot(store: &InMemoryStore) -> QueueSnapshot {
        decode_snapshot(&store.get(KEY).unwrap().unwrap()).unwrap()
    }

    #[derive(Default)]
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        fn set(&self, _key: &str, _value: &[u8], _options: WriteOptions) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
        fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn enqueue_assigns_identity() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let a = queue.enqueue(spec(1), &origin()).unwrap();
        let b = queue.enqueue(spec(2), &origin()).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, OperationStatus::Pending);
        assert_eq!(a.metadata.device_id, "device-a");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(&a.id), Some(a));
    }

    #[test]
    fn enqueue_rejects_when_full() {
        let events = Arc::new(EventBus::new(8));
        let mut sub = events.subscribe().only([EventKind::QueueFull]);
        let queue = OperationQueue::open(
            Arc::new(InMemoryStore::new()),
            options(1),
            events,
            Arc::new(StatisticsTracker::new()),
        );

        queue.enqueue(spec(1), &origin()).unwrap();
        let err = queue.enqueue(spec(2), &origin()).unwrap_err();

        assert!(matches!(err, SyncError::QueueFull { size: 1, max: 1 }));
        assert_eq!(queue.len(), 1);
        match sub.try_recv() {
            Some(SyncEvent::QueueFull { size, operation }) => {
                assert_eq!(size, 1);
                assert_eq!(operation.data, json!({ "n": 2 }));
            }
            other => panic!("expected queue:full, got {other:?}"),
        }
    }

    #[test]
    fn enqueue_batch_partial_failure_keeps_inserted() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(2));
        let err = queue
            .enqueue_batch(vec![spec(1), spec(2), spec(3)], Priority::High, &origin())
            .unwrap_err();

        assert!(matches!(err, SyncError::QueueFull { .. }));
        assert_eq!(queue.len(), 2);
        assert!(queue.get_all().iter().all(|op| op.priority == Priority::High));
    }

    #[test]
    fn enqueue_batch_returns_descriptor() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let batch = queue
            .enqueue_batch(vec![spec(1), spec(2)], Priority::Critical, &origin())
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.priority, Priority::Critical);
        assert_eq!(batch.progress.total, 2);
    }

    #[test]
    fn cancel_only_pending() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let a = queue.enqueue(spec(1), &origin()).unwrap();
        let b = queue.enqueue(spec(2), &origin()).unwrap();

        queue.begin_attempt(&b.id, now_millis()).unwrap();

        assert!(queue.cancel(&a.id));
        assert!(!queue.cancel(&a.id));
        assert!(!queue.cancel(&b.id));
        assert!(!queue.cancel("missing"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn discard_rejects_in_flight() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let a = queue.enqueue(spec(1), &origin()).unwrap();
        queue.begin_attempt(&a.id, now_millis()).unwrap();

        assert!(matches!(
            queue.discard(&a.id),
            Err(SyncError::InvalidState { .. })
        ));
        assert!(matches!(queue.discard("nope"), Err(SyncError::NotFound(_))));
    }

    #[test]
    fn begin_attempt_requires_pending() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let a = queue.enqueue(spec(1), &origin()).unwrap();

        let started = queue.begin_attempt(&a.id, now_millis()).unwrap();
        assert_eq!(started.status, OperationStatus::Syncing);
        assert!(queue.begin_attempt(&a.id, now_millis()).is_none());
    }

    #[test]
    fn update_commits_only_on_ok() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        let a = queue.enqueue(spec(1), &origin()).unwrap();

        let result: SyncResult<()> = queue.update(&a.id, |op| {
            op.metadata.attempt_count = 99;
            Err(SyncError::Timeout)
        });
        assert!(result.is_err());
        assert_eq!(queue.get(&a.id).unwrap().metadata.attempt_count, 0);

        queue
            .update(&a.id, |op| {
                op.metadata.attempt_count = 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(queue.get(&a.id).unwrap().metadata.attempt_count, 1);
    }

    #[test]
    fn every_mutation_persists() {
        let store = Arc::new(InMemoryStore::new());
        let queue = open_with(store.clone(), options(10));

        let a = queue.enqueue(spec(1), &origin()).unwrap();
        assert!(stored_snapshot(&store).contains_key(&a.id));

        queue.begin_attempt(&a.id, now_millis()).unwrap();
        assert_eq!(stored_snapshot(&store)[&a.id].status, OperationStatus::Syncing);

        queue.remove(&a.id);
        assert!(stored_snapshot(&store).is_empty());
    }

    #[test]
    fn reopen_restores_and_resets_in_flight() {
        let store = Arc::new(InMemoryStore::new());
        let (a, b) = {
            let queue = open_with(store.clone(), options(10));
            let a = queue.enqueue(spec(1), &origin()).unwrap();
            let b = queue.enqueue(spec(2), &origin()).unwrap();
            queue.begin_attempt(&b.id, now_millis()).unwrap();
            (a, b)
        };

        let stats = Arc::new(StatisticsTracker::new());
        let queue = OperationQueue::open(
            store,
            options(10),
            Arc::new(EventBus::new(8)),
            stats.clone(),
        );
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(&a.id).unwrap().data, a.data);
        assert_eq!(
            queue.get(&b.id).unwrap().status,
            OperationStatus::Pending
        );
        assert_eq!(stats.snapshot(0).total_operations, 2);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let store = Arc::new(InMemoryStore::with_entry(KEY, b"{not json".to_vec()));
        let queue = open_with(store, options(10));
        assert!(queue.is_empty());
    }

    #[test]
    fn storage_failures_are_swallowed() {
        let queue = open_with(Arc::new(FailingStore), options(10));
        assert!(queue.is_empty());

        let a = queue.enqueue(spec(1), &origin()).unwrap();
        assert_eq!(queue.get(&a.id).unwrap().id, a.id);
        assert!(queue.flush().is_err());
    }

    #[test]
    fn bulk_update_and_remove() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        for n in 0..4 {
            queue.enqueue(spec(n), &origin()).unwrap();
        }

        let changed = queue.update_where(
            |op| op.data["n"].as_u64().unwrap_or(0) % 2 == 0,
            |op| op.metadata.attempt_count = 2,
        );
        assert_eq!(changed, 2);

        let removed = queue.remove_where(|op| op.metadata.attempt_count == 2);
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.outstanding(), 2);
        assert_eq!(queue.count(OperationStatus::Pending), 2);
    }

    #[test]
    fn eligibility_follows_status_and_backoff() {
        let queue = open_with(Arc::new(InMemoryStore::new()), options(10));
        assert!(!queue.has_eligible(now_millis()));

        let op = queue.enqueue(spec(1), &origin()).unwrap();
        assert!(queue.has_eligible(now_millis()));

        queue
            .update(&op.id, |op| {
                op.metadata.next_retry = Some(5_000);
                Ok(())
            })
            .unwrap();
        assert!(!queue.has_eligible(4_999));
        assert!(queue.has_eligible(5_000));

        assert!(queue.begin_attempt(&op.id, 6_000).is_some());
        assert!(!queue.has_eligible(6_000));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_writes_coalesce() {
        let store = Arc::new(InMemoryStore::new());
        let mut opts = options(10);
        opts.debounce = Duration::from_millis(100);
        let queue = open_with(store.clone(), opts);

        queue.enqueue(spec(1), &origin()).unwrap();
        queue.enqueue(spec(2), &origin()).unwrap();
        assert!(queue.has_pending_write());
        assert!(store.get(KEY).unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!queue.has_pending_write());
        assert_eq!(stored_snapshot(&store).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately() {
        let store = Arc::new(InMemoryStore::new());
        let mut opts = options(10);
        opts.debounce = Duration::from_secs(60);
        let queue = open_with(store.clone(), opts);

        queue.enqueue(spec(1), &origin()).unwrap();
        queue.flush().unwrap();

        assert!(!queue.has_pending_write());
        assert_eq!(stored_snapshot(&store).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_flushes_pending_write() {
        let store = Arc::new(InMemoryStore::new());
        let mut opts = options(10);
        opts.debounce = Duration::from_secs(60);

        let queue = open_with(store.clone(), opts);
        queue.enqueue(spec(1), &origin()).unwrap();
        drop(queue);

        assert_eq!(stored_snapshot(&store).len(), 1);
    }
}
