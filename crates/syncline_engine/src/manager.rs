//! The public façade of the engine.

use crate::clock::now_millis;
use crate::config::SyncConfig;
use crate::conflict::Resolution;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, Subscription};
use crate::executor::{PassMode, PassReport, PassSkipped, SyncExecutor};
use crate::network::NetworkMonitor;
use crate::queue::{OperationQueue, Origin, QueueOptions};
use crate::scheduler::PriorityScheduler;
use crate::stats::{StatisticsTracker, SyncStatistics};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncline_protocol::{
    ManualResolution, OperationSpec, OperationStatus, Priority, SyncBatch, SyncOperation,
};
use syncline_storage::{EncryptedStore, EncryptionKey, KeyValueStore};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Offline-first sync manager.
///
/// Owns the durable queue and a background driver task that runs sync
/// passes when connectivity returns, when a retry delay elapses, and on the
/// optional auto-sync interval. Must be created inside a tokio runtime.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use syncline_engine::{MockTransport, OperationSpec, SyncConfig, SyncManager};
/// use syncline_storage::InMemoryStore;
///
/// # async fn demo() -> syncline_engine::SyncResult<()> {
/// let manager = SyncManager::new(
///     SyncConfig::new().with_device_id("pos-1"),
///     Arc::new(MockTransport::new()),
///     Arc::new(InMemoryStore::new()),
/// )?;
///
/// manager.queue_operation(OperationSpec::create(
///     "/receipts",
///     serde_json::json!({ "total": 1250 }),
/// ))?;
/// manager.sync_now().await?;
/// manager.destroy().await?;
/// # Ok(())
/// # }
/// ```
pub struct SyncManager<T: Transport> {
    config: SyncConfig,
    origin: Origin,
    transport: Arc<T>,
    queue: Arc<OperationQueue>,
    executor: Arc<SyncExecutor<T>>,
    network: Arc<NetworkMonitor>,
    events: Arc<EventBus>,
    stats: Arc<StatisticsTracker>,
    trigger: Arc<Notify>,
    reschedule: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl<T: Transport> SyncManager<T> {
    /// Creates a manager, restores the queue from `storage` and starts the
    /// background driver.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] for an unusable configuration and
    /// [`SyncError::NoRuntime`] outside a tokio runtime.
    pub fn new(
        config: SyncConfig,
        transport: Arc<T>,
        storage: Arc<dyn KeyValueStore>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::NoRuntime(e.to_string()))?;

        let storage: Arc<dyn KeyValueStore> = match &config.storage.encryption_key {
            Some(passphrase) => Arc::new(EncryptedStore::new(
                storage,
                EncryptionKey::derive_from_passphrase(passphrase)?,
            )),
            None => storage,
        };

        let events = Arc::new(EventBus::new(config.event_capacity));
        let stats = Arc::new(StatisticsTracker::new());
        let queue = Arc::new(OperationQueue::open(
            storage,
            QueueOptions::from_config(&config),
            Arc::clone(&events),
            Arc::clone(&stats),
        ));

        let trigger = Arc::new(Notify::new());
        let network = Arc::new(NetworkMonitor::new(
            config.start_online,
            config.network_detection.reconnect_delay,
            Arc::clone(&events),
            Arc::clone(&trigger),
        ));
        let executor = Arc::new(SyncExecutor::new(
            &config,
            Arc::clone(&queue),
            Arc::clone(&transport),
            Arc::clone(&network),
            Arc::clone(&events),
            Arc::clone(&stats),
        ));

        if network.is_online() && queue.has_eligible(now_millis()) {
            trigger.notify_one();
        }

        let reschedule = Arc::new(Notify::new());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let driver = runtime.spawn(drive(
            Arc::clone(&executor),
            Arc::clone(&queue),
            Driver {
                trigger: Arc::clone(&trigger),
                reschedule: Arc::clone(&reschedule),
                auto_sync_interval: config.auto_sync_interval,
                shutdown: shutdown_rx,
            },
        ));

        if config.network_detection.enabled {
            network.start_health_checks(Arc::clone(&transport), config.network_detection.clone());
        }

        info!(
            device_id = %config.device_id,
            restored = queue.len(),
            online = network.is_online(),
            "sync manager started"
        );

        Ok(Self {
            origin: Origin {
                device_id: config.device_id.clone(),
                user_id: config.user_id.clone(),
            },
            config,
            transport,
            queue,
            executor,
            network,
            events,
            stats,
            trigger,
            reschedule,
            shutdown,
            driver: Mutex::new(Some(driver)),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queues an operation.
    ///
    /// # Errors
    ///
    /// [`SyncError::QueueFull`] when the queue is at capacity.
    pub fn queue_operation(&self, spec: OperationSpec) -> SyncResult<SyncOperation> {
        self.ensure_alive()?;
        self.queue.enqueue(spec, &self.origin)
    }

    /// Queues several operations with one priority.
    ///
    /// If the queue fills part way, the operations queued so far stay
    /// queued and [`SyncError::QueueFull`] is returned.
    pub fn queue_batch(
        &self,
        specs: Vec<OperationSpec>,
        priority: Priority,
    ) -> SyncResult<SyncBatch> {
        self.ensure_alive()?;
        self.queue.enqueue_batch(specs, priority, &self.origin)
    }

    /// Returns an operation by id.
    pub fn get_operation(&self, id: &str) -> Option<SyncOperation> {
        self.queue.get(id)
    }

    /// Returns every queued operation, oldest first.
    pub fn get_all_operations(&self) -> Vec<SyncOperation> {
        self.queue.get_all()
    }

    /// Cancels a `pending` operation. Returns false for any other status.
    pub fn cancel_operation(&self, id: &str) -> bool {
        self.queue.cancel(id)
    }

    /// Removes an operation in any status except `syncing`.
    pub fn remove_operation(&self, id: &str) -> SyncResult<SyncOperation> {
        self.ensure_alive()?;
        self.queue.discard(id)
    }

    /// Resolves an operation parked by the manual conflict strategy.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFound`] for an unknown id and
    /// [`SyncError::InvalidState`] unless the operation is in `conflict`.
    pub fn resolve_conflict(
        &self,
        id: &str,
        resolution: ManualResolution,
    ) -> SyncResult<SyncOperation> {
        self.ensure_alive()?;
        let now = now_millis();
        let resolver = *self.executor.resolver();
        let (op, outcome) = self.queue.update(id, |op| {
            let outcome = resolver.apply_manual(op, resolution, now)?;
            Ok((op.clone(), outcome))
        })?;

        info!(operation_id = %id, resolution = ?outcome, "conflict resolved manually");
        match outcome {
            Resolution::Completed if !self.config.retain_completed => {
                self.queue.remove(id);
            }
            Resolution::Requeued if self.network.is_online() => self.trigger.notify_one(),
            _ => {}
        }
        Ok(op)
    }

    /// Returns the current statistics.
    pub fn get_statistics(&self) -> SyncStatistics {
        self.stats.snapshot(self.queue.outstanding())
    }

    /// Runs a pass now if online.
    pub async fn sync_now(&self) -> SyncResult<PassReport> {
        self.run_pass(PassMode::Normal).await
    }

    /// Runs a pass now even if offline.
    pub async fn force_sync_now(&self) -> SyncResult<PassReport> {
        self.run_pass(PassMode::Forced).await
    }

    async fn run_pass(&self, mode: PassMode) -> SyncResult<PassReport> {
        self.ensure_alive()?;
        let report = self.executor.run_pass(mode).await;
        // The driver recomputes its retry wakeup and replays any trigger
        // that arrived while this pass held the guard.
        self.reschedule.notify_one();
        Ok(report)
    }

    /// Makes failed and backoff-waiting operations eligible again with a
    /// fresh retry budget. Returns the number of operations touched.
    pub fn retry_failed(&self) -> usize {
        let now = now_millis();
        let touched = self.queue.update_where(
            |op| match op.status {
                OperationStatus::Failed => true,
                OperationStatus::Pending => op.metadata.next_retry.is_some(),
                _ => false,
            },
            |op| {
                if op.status == OperationStatus::Failed {
                    if let Err(e) = op.transition(OperationStatus::Pending, now) {
                        warn!(operation_id = %op.id, error = %e, "cannot requeue failed operation");
                        return;
                    }
                }
                op.reset_attempts();
            },
        );
        if touched > 0 {
            info!(operations = touched, "requeued failed operations");
        }
        touched
    }

    /// Removes retained completed operations. Returns the number removed.
    pub fn clear_completed(&self) -> usize {
        self.queue
            .remove_where(|op| op.status == OperationStatus::Completed)
    }

    /// Returns true if the server is believed reachable.
    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Records a connectivity change reported by the platform.
    ///
    /// Coming online schedules a pass after the reconnect delay. Returns
    /// true if the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.network.set_online(online)
    }

    /// Probes the configured health-check endpoints once. Without endpoints
    /// the current state is returned unchanged.
    pub async fn check_network(&self) -> bool {
        self.network
            .check_now(self.transport.as_ref(), &self.config.network_detection)
            .await
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Writes the queue snapshot immediately.
    pub fn flush(&self) -> SyncResult<()> {
        self.queue.flush()
    }

    /// Stops the driver and timers, writes the final snapshot and detaches
    /// all subscribers.
    ///
    /// # Errors
    ///
    /// [`SyncError::Destroyed`] if already destroyed.
    pub async fn destroy(&self) -> SyncResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Err(SyncError::Destroyed);
        }

        let _ = self.shutdown.send(true);
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(e) = driver.await {
                warn!(error = %e, "sync driver ended abnormally");
            }
        }

        self.network.stop();
        if let Err(e) = self.queue.flush() {
            error!(error = %e, "failed to persist queue on shutdown");
        }
        self.events.close();
        info!(remaining = self.queue.len(), "sync manager destroyed");
        Ok(())
    }

    /// Returns true once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_alive(&self) -> SyncResult<()> {
        if self.is_destroyed() {
            return Err(SyncError::Destroyed);
        }
        Ok(())
    }
}

impl<T: Transport> Drop for SyncManager<T> {
    fn drop(&mut self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
        self.network.stop();
        if self.queue.has_pending_write() {
            if let Err(e) = self.queue.flush() {
                error!(error = %e, "failed to persist queue on drop");
            }
        }
        self.events.close();
    }
}

impl<T: Transport> std::fmt::Debug for SyncManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("device_id", &self.config.device_id)
            .field("queued", &self.queue.len())
            .field("online", &self.network.is_online())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

struct Driver {
    trigger: Arc<Notify>,
    reschedule: Arc<Notify>,
    auto_sync_interval: Option<Duration>,
    shutdown: watch::Receiver<bool>,
}

/// Background loop deciding when passes run: on trigger (reconnect, manual
/// resolution, restored work at startup), on the auto-sync tick, and when
/// the earliest retry delay elapses.
///
/// A triggered pass keeps draining while eligible work remains. A trigger
/// that finds another pass running is replayed once that pass ends.
async fn drive<T: Transport>(
    executor: Arc<SyncExecutor<T>>,
    queue: Arc<OperationQueue>,
    driver: Driver,
) {
    let Driver {
        trigger,
        reschedule,
        auto_sync_interval,
        mut shutdown,
    } = driver;
    let mut ticker = auto_sync_interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut retry_at = next_retry(&queue);
    let mut replay = false;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = reschedule.notified() => {
                retry_at = next_retry(&queue);
                if !replay {
                    continue;
                }
            }
            _ = trigger.notified() => {}
            _ = tick(&mut ticker) => {}
            _ = sleep_until(retry_at) => {}
        }

        let mut report = executor.run_pass(PassMode::Normal).await;
        loop {
            let now = now_millis();
            if !made_progress(&report, now) || !queue.has_eligible(now) {
                break;
            }
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }
            debug!("eligible operations remain, continuing sync");
            report = executor.run_pass(PassMode::Normal).await;
        }
        replay = report.skipped == Some(PassSkipped::AlreadyRunning);
        if replay {
            debug!("sync pass already running, replaying trigger when it ends");
        }
        retry_at = next_retry(&queue);
    }
}

/// True if the pass moved at least one operation out of the eligible set.
/// Operations requeued by a conflict stay eligible and do not count.
fn made_progress(report: &PassReport, now: u64) -> bool {
    report
        .batch
        .as_ref()
        .is_some_and(|batch| batch.operations.iter().any(|op| !op.is_eligible(now)))
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn next_retry(queue: &OperationQueue) -> Option<Instant> {
    let now = now_millis();
    let wake_at = queue.with_entries(|entries| PriorityScheduler::next_wakeup(entries.values(), now))?;
    Some(Instant::now() + Duration::from_millis(wake_at.saturating_sub(now)))
}
