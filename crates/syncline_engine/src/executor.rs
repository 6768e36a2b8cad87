//! Sync pass execution.
//!
//! A pass selects a batch, dispatches each operation through the transport
//! and applies the outcome to the queue. Dispatches run concurrently up to
//! the configured limit, but every outcome is applied by the pass itself,
//! one at a time, in completion order.

use crate::clock::now_millis;
use crate::config::{RetryConfig, SyncConfig};
use crate::conflict::{ConflictResolver, Resolution};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::network::NetworkMonitor;
use crate::queue::OperationQueue;
use crate::scheduler::PriorityScheduler;
use crate::stats::StatisticsTracker;
use crate::transport::{Transport, TransportHints, TransportRequest, TransportResponse};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncline_protocol::{
    BatchStatus, OperationError, OperationStatus, Payload, SyncBatch, SyncOperation,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How a pass treats the online flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Skip the pass while offline.
    Normal,
    /// Run even while offline. The online flag is left untouched.
    Forced,
}

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassSkipped {
    /// The monitor reports no connectivity.
    Offline,
    /// Another pass is in progress.
    AlreadyRunning,
    /// Nothing is eligible.
    EmptyQueue,
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// The finished batch, if the pass ran.
    pub batch: Option<SyncBatch>,
    /// Why the pass did not run.
    pub skipped: Option<PassSkipped>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl PassReport {
    fn skipped(reason: PassSkipped) -> Self {
        Self {
            batch: None,
            skipped: Some(reason),
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the pass dispatched a batch.
    pub fn ran(&self) -> bool {
        self.batch.is_some()
    }
}

#[derive(Debug, Clone)]
struct DispatchPolicy {
    batch_size: usize,
    concurrency: usize,
    retry: RetryConfig,
    request_timeout: Duration,
    hints: TransportHints,
    retain_completed: bool,
    retain_failed: bool,
}

enum DispatchOutcome {
    Success(Payload),
    Conflict(Payload),
    Failure(SyncError),
}

impl DispatchOutcome {
    fn classify(result: SyncResult<TransportResponse>) -> Self {
        match result {
            Ok(response) if response.is_success() => DispatchOutcome::Success(response.data),
            Ok(response) if response.is_conflict() => match response.server_version() {
                Some(server_version) => DispatchOutcome::Conflict(server_version.clone()),
                None => DispatchOutcome::Failure(SyncError::Http {
                    status: response.status,
                    message: response.error_message(),
                }),
            },
            Ok(response) => DispatchOutcome::Failure(SyncError::Http {
                status: response.status,
                message: response.error_message(),
            }),
            Err(e) => DispatchOutcome::Failure(e),
        }
    }
}

struct Dispatched {
    id: String,
    sent: usize,
    result: SyncResult<TransportResponse>,
}

struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs sync passes.
pub struct SyncExecutor<T: Transport> {
    queue: Arc<OperationQueue>,
    transport: Arc<T>,
    network: Arc<NetworkMonitor>,
    events: Arc<EventBus>,
    stats: Arc<StatisticsTracker>,
    resolver: ConflictResolver,
    policy: DispatchPolicy,
    running: AtomicBool,
}

impl<T: Transport> SyncExecutor<T> {
    /// Creates an executor.
    pub fn new(
        config: &SyncConfig,
        queue: Arc<OperationQueue>,
        transport: Arc<T>,
        network: Arc<NetworkMonitor>,
        events: Arc<EventBus>,
        stats: Arc<StatisticsTracker>,
    ) -> Self {
        Self {
            queue,
            transport,
            network,
            events,
            stats,
            resolver: ConflictResolver::new(config.default_conflict_strategy),
            policy: DispatchPolicy {
                batch_size: config.batch_size,
                concurrency: config.dispatch_concurrency.max(1),
                retry: config.retry.clone(),
                request_timeout: config.request_timeout,
                hints: TransportHints {
                    compression: config.enable_compression,
                    delta_sync: config.enable_delta_sync,
                },
                retain_completed: config.retain_completed,
                retain_failed: config.retain_failed,
            },
            running: AtomicBool::new(false),
        }
    }

    /// Returns the conflict resolver.
    pub fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    /// Returns true while a pass is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one pass. Individual operation failures never fail the pass.
    pub async fn run_pass(&self, mode: PassMode) -> PassReport {
        if mode == PassMode::Normal && !self.network.is_online() {
            debug!("offline, skipping sync pass");
            return PassReport::skipped(PassSkipped::Offline);
        }
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            debug!("sync pass already running");
            return PassReport::skipped(PassSkipped::AlreadyRunning);
        };

        let now = now_millis();
        let selected = self.queue.with_entries(|entries| {
            PriorityScheduler::next_batch(entries.values(), self.policy.batch_size, now)
        });
        if selected.is_empty() {
            return PassReport::skipped(PassSkipped::EmptyQueue);
        }

        let started = Instant::now();
        let mut batch = SyncBatch::new(uuid::Uuid::new_v4().to_string(), selected, now);
        batch.status = BatchStatus::Syncing;
        info!(batch_id = %batch.id, size = batch.len(), priority = %batch.priority, ?mode, "sync pass started");
        self.events.emit(SyncEvent::SyncStarted {
            batch: batch.clone(),
        });

        self.dispatch_batch(&mut batch).await;

        batch.finish();
        let duration = started.elapsed();
        self.stats.record_pass(duration, now_millis());
        info!(
            batch_id = %batch.id,
            completed = batch.progress.completed,
            failed = batch.progress.failed,
            conflicts = batch.progress.conflicts,
            duration_ms = duration.as_millis() as u64,
            "sync pass finished"
        );
        self.events.emit(SyncEvent::SyncCompleted {
            batch: batch.clone(),
            duration,
        });

        PassReport {
            batch: Some(batch),
            skipped: None,
            duration,
        }
    }

    async fn dispatch_batch(&self, batch: &mut SyncBatch) {
        let ids: Vec<String> = batch.operations.iter().map(|op| op.id.clone()).collect();
        let limit = self.policy.concurrency.min(ids.len()).max(1);
        let mut in_flight: JoinSet<Dispatched> = JoinSet::new();
        let mut unsettled: HashSet<String> = HashSet::new();

        for id in ids {
            while in_flight.len() >= limit {
                self.settle_next(&mut in_flight, &mut unsettled, batch).await;
            }

            let Some(op) = self.queue.begin_attempt(&id, now_millis()) else {
                debug!(operation_id = %id, "operation left the queue before dispatch");
                batch.operations.retain(|o| o.id != id);
                batch.progress.total = batch.operations.len();
                continue;
            };
            replace_in_batch(batch, &op);

            debug!(operation_id = %op.id, attempt = op.metadata.attempt_count + 1, "dispatching operation");
            self.events.emit(SyncEvent::OperationStarted {
                operation: op.clone(),
            });

            let request = self.build_request(&op);
            let transport = Arc::clone(&self.transport);
            unsettled.insert(id.clone());
            in_flight.spawn(async move {
                let sent = request.body_size();
                let result = transport.request(request).await;
                Dispatched { id, sent, result }
            });
        }

        while !in_flight.is_empty() {
            self.settle_next(&mut in_flight, &mut unsettled, batch).await;
        }

        for id in unsettled {
            error!(operation_id = %id, "dispatch task ended without a result");
            self.apply(
                batch,
                &id,
                0,
                Err(SyncError::transport_retryable("dispatch task aborted")),
            );
        }
    }

    async fn settle_next(
        &self,
        in_flight: &mut JoinSet<Dispatched>,
        unsettled: &mut HashSet<String>,
        batch: &mut SyncBatch,
    ) {
        match in_flight.join_next().await {
            Some(Ok(dispatched)) => {
                unsettled.remove(&dispatched.id);
                self.apply(batch, &dispatched.id, dispatched.sent, dispatched.result);
            }
            Some(Err(e)) => error!(error = %e, "dispatch task failed"),
            None => {}
        }
    }

    fn build_request(&self, op: &SyncOperation) -> TransportRequest {
        TransportRequest {
            method: op.method,
            url: op.endpoint.clone(),
            data: (!op.data.is_null()).then(|| op.data.clone()),
            headers: op.outgoing_headers(),
            timeout: Some(self.policy.request_timeout),
            hints: self.policy.hints,
        }
    }

    fn apply(
        &self,
        batch: &mut SyncBatch,
        id: &str,
        sent: usize,
        result: SyncResult<TransportResponse>,
    ) {
        let received = result.as_ref().map_or(0, TransportResponse::body_size);
        self.stats.record_transfer(sent + received);

        let applied = match DispatchOutcome::classify(result) {
            DispatchOutcome::Success(response) => self.on_success(batch, id, response),
            DispatchOutcome::Conflict(server_version) => {
                self.on_conflict(batch, id, server_version)
            }
            DispatchOutcome::Failure(e) => self.on_failure(batch, id, e),
        };

        match applied {
            Ok(op) => {
                replace_in_batch(batch, &op);
                self.events.emit(SyncEvent::SyncProgress {
                    batch: batch.clone(),
                    operation: op,
                });
            }
            Err(e) => {
                warn!(operation_id = %id, error = %e, "could not apply dispatch outcome");
            }
        }
    }

    fn on_success(
        &self,
        batch: &mut SyncBatch,
        id: &str,
        response: Payload,
    ) -> SyncResult<SyncOperation> {
        let now = now_millis();
        let op = self.queue.update(id, |op| {
            op.transition(OperationStatus::Completed, now)?;
            op.error = None;
            op.metadata.next_retry = None;
            Ok(op.clone())
        })?;
        if !self.policy.retain_completed {
            self.queue.remove(id);
        }

        debug!(operation_id = %id, "operation completed");
        self.stats.record_completed();
        batch.progress.completed += 1;
        self.events.emit(SyncEvent::OperationCompleted {
            operation: op.clone(),
            response,
        });
        Ok(op)
    }

    fn on_conflict(
        &self,
        batch: &mut SyncBatch,
        id: &str,
        server_version: Payload,
    ) -> SyncResult<SyncOperation> {
        let now = now_millis();
        let (op, outcome) = self.queue.update(id, |op| {
            let outcome = self.resolver.resolve(op, server_version, now)?;
            Ok((op.clone(), outcome))
        })?;
        if outcome.resolution == Resolution::Completed && !self.policy.retain_completed {
            self.queue.remove(id);
        }

        info!(
            operation_id = %id,
            strategy = %outcome.conflict.strategy,
            resolution = ?outcome.resolution,
            "operation conflicted"
        );
        self.stats.record_conflict();
        batch.progress.conflicts += 1;
        self.events.emit(SyncEvent::OperationConflict {
            operation: op.clone(),
            conflict: outcome.conflict,
        });
        Ok(op)
    }

    fn on_failure(
        &self,
        batch: &mut SyncBatch,
        id: &str,
        error: SyncError,
    ) -> SyncResult<SyncOperation> {
        let now = now_millis();
        let record = OperationError::new(error.code(), error.to_string());
        let retryable = error.is_retryable();
        let retry = &self.policy.retry;

        let (op, will_retry) = self.queue.update(id, |op| {
            op.metadata.attempt_count = op.metadata.attempt_count.saturating_add(1);
            op.error = Some(record.clone());
            let will_retry = retryable && op.metadata.attempt_count < retry.max_retries;
            if will_retry {
                op.transition(OperationStatus::Pending, now)?;
                let delay = retry.delay_for_attempt(op.metadata.attempt_count);
                op.metadata.next_retry =
                    Some(now.saturating_add(delay.as_millis().min(u64::MAX as u128) as u64));
            } else {
                op.transition(OperationStatus::Failed, now)?;
                op.metadata.next_retry = None;
            }
            Ok((op.clone(), will_retry))
        })?;

        if will_retry {
            warn!(
                operation_id = %id,
                attempt = op.metadata.attempt_count,
                next_retry = ?op.metadata.next_retry,
                error = %error,
                "operation failed, will retry"
            );
            self.stats.record_retry(&record.message);
        } else {
            warn!(
                operation_id = %id,
                attempt = op.metadata.attempt_count,
                error = %error,
                "operation failed permanently"
            );
            if !self.policy.retain_failed {
                self.queue.remove(id);
            }
            self.stats.record_failed(&record.message);
        }

        batch.progress.failed += 1;
        self.events.emit(SyncEvent::OperationFailed {
            operation: op.clone(),
            error: record,
            will_retry,
        });
        Ok(op)
    }
}

impl<T: Transport> std::fmt::Debug for SyncExecutor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncExecutor")
            .field("running", &self.is_running())
            .field("batch_size", &self.policy.batch_size)
            .field("concurrency", &self.policy.concurrency)
            .finish()
    }
}

fn replace_in_batch(batch: &mut SyncBatch, op: &SyncOperation) {
    if let Some(slot) = batch.operations.iter_mut().find(|o| o.id == op.id) {
        *slot = op.clone();
    }
}
