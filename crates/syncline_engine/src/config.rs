//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;
use syncline_protocol::ConflictStrategy;

/// Configuration for the sync manager.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of operations held in the queue.
    pub max_queue_size: usize,
    /// Maximum number of operations attempted per pass.
    pub batch_size: usize,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Transport hint: request compression.
    pub enable_compression: bool,
    /// Transport hint: send deltas where the server supports it.
    pub enable_delta_sync: bool,
    /// Strategy applied to conflicts unless an operation overrides it.
    pub default_conflict_strategy: ConflictStrategy,
    /// Snapshot storage configuration.
    pub storage: StorageConfig,
    /// Connectivity detection configuration.
    pub network_detection: NetworkDetectionConfig,
    /// Device id stamped on every operation.
    pub device_id: String,
    /// User id stamped on every operation.
    pub user_id: Option<String>,
    /// Timeout passed to the transport for each request.
    pub request_timeout: Duration,
    /// Maximum dispatches in flight within one batch.
    pub dispatch_concurrency: usize,
    /// Interval for automatic passes while online.
    pub auto_sync_interval: Option<Duration>,
    /// Whether the engine starts in the online state.
    pub start_online: bool,
    /// Keep completed operations in the queue until `clear_completed`.
    pub retain_completed: bool,
    /// Keep terminally failed operations in the queue until `retry_failed`.
    pub retain_failed: bool,
    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with defaults and a random device id.
    pub fn new() -> Self {
        Self {
            max_queue_size: 10_000,
            batch_size: 10,
            retry: RetryConfig::default(),
            enable_compression: false,
            enable_delta_sync: false,
            default_conflict_strategy: ConflictStrategy::ServerWins,
            storage: StorageConfig::default(),
            network_detection: NetworkDetectionConfig::default(),
            device_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            request_timeout: Duration::from_secs(30),
            dispatch_concurrency: 1,
            auto_sync_interval: None,
            start_online: true,
            retain_completed: false,
            retain_failed: false,
            event_capacity: 1024,
        }
    }

    /// Sets the maximum queue size.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the default conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.default_conflict_strategy = strategy;
        self
    }

    /// Sets the storage configuration.
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the network detection configuration.
    pub fn with_network_detection(mut self, detection: NetworkDetectionConfig) -> Self {
        self.network_detection = detection;
        self
    }

    /// Sets the device id.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the dispatch concurrency.
    pub fn with_dispatch_concurrency(mut self, concurrency: usize) -> Self {
        self.dispatch_concurrency = concurrency;
        self
    }

    /// Enables automatic passes at the given interval.
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Sets the initial online state.
    pub fn with_start_online(mut self, online: bool) -> Self {
        self.start_online = online;
        self
    }

    /// Sets the transport hints.
    pub fn with_transport_hints(mut self, compression: bool, delta_sync: bool) -> Self {
        self.enable_compression = compression;
        self.enable_delta_sync = delta_sync;
        self
    }

    /// Keeps completed and failed operations in the queue.
    pub fn with_retention(mut self, completed: bool, failed: bool) -> Self {
        self.retain_completed = completed;
        self.retain_failed = failed;
        self
    }

    /// Checks the configuration for programmer errors.
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.dispatch_concurrency == 0 {
            return Err(invalid("dispatch_concurrency must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity must be at least 1"));
        }
        if self.device_id.is_empty() {
            return Err(invalid("device_id must not be empty"));
        }
        if self.storage.snapshot_key.is_empty() {
            return Err(invalid("storage.snapshot_key must not be empty"));
        }
        if matches!(self.storage.encryption_key.as_deref(), Some("")) {
            return Err(invalid("storage.encryption_key must not be empty"));
        }
        if self.auto_sync_interval == Some(Duration::ZERO) {
            return Err(invalid("auto_sync_interval must be positive"));
        }
        self.retry.validate()?;
        self.network_detection.validate()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after which a failing operation is given up.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any retry delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a retry configuration with default delays.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before the next attempt after `attempt_count` failures:
    /// `min(base * multiplier^(attempt_count - 1), max)`.
    pub fn delay_for_attempt(&self, attempt_count: u32) -> Duration {
        if attempt_count == 0 {
            return Duration::ZERO;
        }

        let exponent = attempt_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());

        if capped.is_finite() {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    fn validate(&self) -> SyncResult<()> {
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(invalid("retry.backoff_multiplier must be a finite value >= 1.0"));
        }
        if self.base_delay > self.max_delay {
            return Err(invalid("retry.base_delay must not exceed retry.max_delay"));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Configuration for the queue snapshot.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Key under which the snapshot is stored.
    pub snapshot_key: String,
    /// Passphrase for encrypting the snapshot. `None` stores it in the clear.
    pub encryption_key: Option<String>,
    /// Delay between a mutation and the snapshot write it triggers.
    /// `Duration::ZERO` writes synchronously on every mutation.
    pub persist_debounce: Duration,
}

impl StorageConfig {
    /// Sets the snapshot key.
    pub fn with_snapshot_key(mut self, key: impl Into<String>) -> Self {
        self.snapshot_key = key.into();
        self
    }

    /// Enables snapshot encryption with a key derived from `passphrase`.
    pub fn with_encryption_key(mut self, passphrase: impl Into<String>) -> Self {
        self.encryption_key = Some(passphrase.into());
        self
    }

    /// Sets the persistence debounce window.
    pub fn with_persist_debounce(mut self, debounce: Duration) -> Self {
        self.persist_debounce = debounce;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_key: "syncline:queue".to_string(),
            encryption_key: None,
            persist_debounce: Duration::from_millis(100),
        }
    }
}

/// Configuration for connectivity detection.
#[derive(Debug, Clone)]
pub struct NetworkDetectionConfig {
    /// Run periodic health checks.
    pub enabled: bool,
    /// Interval between health checks.
    pub check_interval: Duration,
    /// Endpoints probed with `GET`. Any response from any of them counts as
    /// reachable.
    pub endpoints: Vec<String>,
    /// Timeout for each probe.
    pub timeout: Duration,
    /// Delay between coming online and the sync pass it triggers.
    pub reconnect_delay: Duration,
}

impl NetworkDetectionConfig {
    /// Enables health checks against the given endpoints.
    pub fn with_health_checks(mut self, endpoints: Vec<String>, interval: Duration) -> Self {
        self.enabled = true;
        self.endpoints = endpoints;
        self.check_interval = interval;
        self
    }

    /// Sets the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the reconnect debounce delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn validate(&self) -> SyncResult<()> {
        if self.enabled && self.endpoints.is_empty() {
            return Err(invalid(
                "network_detection.endpoints must not be empty when enabled",
            ));
        }
        if self.enabled && self.check_interval.is_zero() {
            return Err(invalid("network_detection.check_interval must be positive"));
        }
        Ok(())
    }
}

impl Default for NetworkDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            check_interval: Duration::from_secs(30),
            endpoints: Vec::new(),
            timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

fn invalid(message: &str) -> SyncError {
    SyncError::InvalidConfig(message.to_string())
}
