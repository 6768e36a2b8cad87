//! Typed event bus for sync lifecycle notifications.
//!
//! Every subscriber gets its own buffered receiver, so emitting never
//! blocks the mutation that raised the event. A subscriber that falls more
//! than the configured capacity behind skips the oldest events.

use parking_lot::RwLock;
use std::time::Duration;
use syncline_protocol::{
    ConflictData, OperationError, OperationSpec, Payload, SyncBatch, SyncOperation,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// A lifecycle event.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// An operation entered the queue.
    OperationQueued {
        /// The queued operation.
        operation: SyncOperation,
    },
    /// An operation is about to be dispatched.
    OperationStarted {
        /// The operation, in `syncing` state.
        operation: SyncOperation,
    },
    /// The server accepted an operation.
    OperationCompleted {
        /// The completed operation.
        operation: SyncOperation,
        /// Response body.
        response: Payload,
    },
    /// An attempt failed.
    OperationFailed {
        /// The operation after the failure was applied.
        operation: SyncOperation,
        /// What went wrong.
        error: OperationError,
        /// Whether the operation will be attempted again.
        will_retry: bool,
    },
    /// The server reported a conflict.
    OperationConflict {
        /// The operation after the strategy was applied.
        operation: SyncOperation,
        /// Both versions and the strategy used.
        conflict: ConflictData,
    },
    /// A sync pass started.
    SyncStarted {
        /// The batch selected for the pass.
        batch: SyncBatch,
    },
    /// An operation in the running pass has an outcome.
    SyncProgress {
        /// The batch with updated progress counters.
        batch: SyncBatch,
        /// The operation that just finished its attempt.
        operation: SyncOperation,
    },
    /// A sync pass finished.
    SyncCompleted {
        /// The finished batch.
        batch: SyncBatch,
        /// Wall-clock duration of the pass.
        duration: Duration,
    },
    /// Connectivity came back.
    NetworkOnline {
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
    /// Connectivity was lost.
    NetworkOffline {
        /// Milliseconds since the Unix epoch.
        timestamp: u64,
    },
    /// An enqueue was rejected because the queue is at capacity.
    QueueFull {
        /// Queue size at the time of the rejection.
        size: usize,
        /// The rejected request.
        operation: OperationSpec,
    },
}

/// Discriminant of [`SyncEvent`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `operation:queued`
    OperationQueued,
    /// `operation:started`
    OperationStarted,
    /// `operation:completed`
    OperationCompleted,
    /// `operation:failed`
    OperationFailed,
    /// `operation:conflict`
    OperationConflict,
    /// `sync:started`
    SyncStarted,
    /// `sync:progress`
    SyncProgress,
    /// `sync:completed`
    SyncCompleted,
    /// `network:online`
    NetworkOnline,
    /// `network:offline`
    NetworkOffline,
    /// `queue:full`
    QueueFull,
}

impl EventKind {
    /// Returns the event name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::OperationQueued => "operation:queued",
            EventKind::OperationStarted => "operation:started",
            EventKind::OperationCompleted => "operation:completed",
            EventKind::OperationFailed => "operation:failed",
            EventKind::OperationConflict => "operation:conflict",
            EventKind::SyncStarted => "sync:started",
            EventKind::SyncProgress => "sync:progress",
            EventKind::SyncCompleted => "sync:completed",
            EventKind::NetworkOnline => "network:online",
            EventKind::NetworkOffline => "network:offline",
            EventKind::QueueFull => "queue:full",
        }
    }
}

impl SyncEvent {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::OperationQueued { .. } => EventKind::OperationQueued,
            SyncEvent::OperationStarted { .. } => EventKind::OperationStarted,
            SyncEvent::OperationCompleted { .. } => EventKind::OperationCompleted,
            SyncEvent::OperationFailed { .. } => EventKind::OperationFailed,
            SyncEvent::OperationConflict { .. } => EventKind::OperationConflict,
            SyncEvent::SyncStarted { .. } => EventKind::SyncStarted,
            SyncEvent::SyncProgress { .. } => EventKind::SyncProgress,
            SyncEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            SyncEvent::NetworkOnline { .. } => EventKind::NetworkOnline,
            SyncEvent::NetworkOffline { .. } => EventKind::NetworkOffline,
            SyncEvent::QueueFull { .. } => EventKind::QueueFull,
        }
    }

    /// Returns the event name, e.g. `"operation:queued"`.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns the operation this event is about, if any.
    pub fn operation(&self) -> Option<&SyncOperation> {
        match self {
            SyncEvent::OperationQueued { operation }
            | SyncEvent::OperationStarted { operation }
            | SyncEvent::OperationCompleted { operation, .. }
            | SyncEvent::OperationFailed { operation, .. }
            | SyncEvent::OperationConflict { operation, .. }
            | SyncEvent::SyncProgress { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

/// Publish/subscribe hub for [`SyncEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    sender: RwLock<Option<broadcast::Sender<SyncEvent>>>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            capacity,
        }
    }

    /// Publishes an event. Returns the number of subscribers it reached.
    pub fn emit(&self, event: SyncEvent) -> usize {
        match self.sender.read().as_ref() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribes to every event emitted from now on.
    ///
    /// Subscribing to a closed bus yields a subscription that is already
    /// finished.
    pub fn subscribe(&self) -> Subscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        };
        Subscription {
            receiver,
            filter: None,
        }
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, |s| s.receiver_count())
    }

    /// Detaches all subscribers. Their pending events can still be read,
    /// after which `recv` returns `None`.
    pub fn close(&self) {
        self.sender.write().take();
    }

    /// Returns true once the bus has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Per-subscriber buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// A receiver of bus events.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: Option<Vec<EventKind>>,
}

impl Subscription {
    /// Restricts this subscription to the given kinds.
    pub fn only(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.filter = Some(kinds.into_iter().collect());
        self
    }

    fn wants(&self, event: &SyncEvent) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&event.kind()))
    }

    /// Waits for the next event. Returns `None` once the bus is closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Returns every buffered event.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stops receiving events.
    pub fn unsubscribe(self) {}
}
