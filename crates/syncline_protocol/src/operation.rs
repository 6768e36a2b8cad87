//! Sync operations and their status state machine.

use crate::checksum::payload_checksum;
use crate::conflict::{ConflictData, ConflictStrategy};
use crate::error::{ProtocolError, ProtocolResult};
use crate::headers;
use crate::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of mutation an operation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A new resource.
    Create,
    /// A change to an existing resource.
    Update,
    /// Removal of a resource.
    Delete,
}

impl OperationType {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

/// Scheduling weight. The derived order is the scheduling order:
/// `Low < Normal < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// User-visible work.
    High,
    /// Must go out before anything else.
    Critical,
}

impl Priority {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method used when dispatching an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the uppercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an operation.
///
/// Allowed transitions:
///
/// ```text
/// pending  -> syncing
/// syncing  -> completed | pending | failed | conflict
/// conflict -> pending | completed      (external resolution)
/// failed   -> pending                  (explicit retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting to be selected.
    Pending,
    /// Owned by an in-flight attempt.
    Syncing,
    /// Accepted by the server.
    Completed,
    /// Retries exhausted or permanently rejected.
    Failed,
    /// Waiting for manual conflict resolution.
    Conflict,
}

impl OperationStatus {
    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Syncing => "syncing",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Conflict => "conflict",
        }
    }

    /// Returns true if the state machine has an edge from `self` to `to`.
    pub fn can_transition_to(&self, to: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, to),
            (Pending, Syncing)
                | (Syncing, Completed)
                | (Syncing, Pending)
                | (Syncing, Failed)
                | (Syncing, Conflict)
                | (Conflict, Pending)
                | (Conflict, Completed)
                | (Failed, Pending)
        )
    }

    /// Returns true for statuses that are never picked up again without an
    /// external call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Conflict
        )
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bookkeeping attached to every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    /// Enqueue time, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Last status change, milliseconds since the Unix epoch.
    pub updated_at: u64,
    /// Failed attempts since the last reset.
    pub attempt_count: u32,
    /// Earliest time the operation may be attempted again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<u64>,
    /// Device that queued the operation.
    pub device_id: String,
    /// Checksum of `data` computed at enqueue time. Never recomputed.
    pub checksum: String,
    /// User that queued the operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Ask the server to overwrite its version on the next attempt.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_update: bool,
}

/// Error recorded from the most recent failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// Machine-readable code (`"NETWORK"`, `"HTTP_503"`, ...).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl OperationError {
    /// Creates a new error record.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// What a caller asks to queue.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    /// Kind of mutation.
    pub op_type: OperationType,
    /// Target resource path, relative to the transport's base URL.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Payload.
    pub data: Payload,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Scheduling priority.
    pub priority: Priority,
    /// Per-operation override of the configured conflict strategy.
    pub conflict_strategy: Option<ConflictStrategy>,
}

impl OperationSpec {
    /// Creates a spec with normal priority and no extra headers.
    pub fn new(
        op_type: OperationType,
        method: HttpMethod,
        endpoint: impl Into<String>,
        data: Payload,
    ) -> Self {
        Self {
            op_type,
            endpoint: endpoint.into(),
            method,
            data,
            headers: BTreeMap::new(),
            priority: Priority::Normal,
            conflict_strategy: None,
        }
    }

    /// A `create` sent as `POST`.
    pub fn create(endpoint: impl Into<String>, data: Payload) -> Self {
        Self::new(OperationType::Create, HttpMethod::Post, endpoint, data)
    }

    /// An `update` sent as `PUT`.
    pub fn update(endpoint: impl Into<String>, data: Payload) -> Self {
        Self::new(OperationType::Update, HttpMethod::Put, endpoint, data)
    }

    /// A `delete` sent as `DELETE` with an empty payload.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(
            OperationType::Delete,
            HttpMethod::Delete,
            endpoint,
            Payload::Null,
        )
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Overrides the conflict strategy for this operation.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = Some(strategy);
        self
    }
}

/// A single pending mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Unique id, assigned at enqueue time.
    pub id: String,
    /// Kind of mutation.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Scheduling priority.
    pub priority: Priority,
    /// Target resource path.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Payload.
    pub data: Payload,
    /// Extra request headers supplied by the caller.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Bookkeeping.
    pub metadata: OperationMetadata,
    /// Error from the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Set once a conflict has been detected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_data: Option<ConflictData>,
    /// Per-operation conflict strategy override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_strategy: Option<ConflictStrategy>,
}

impl SyncOperation {
    /// Builds a pending operation from a caller's spec.
    ///
    /// The checksum is computed here, once, over the serialized payload.
    pub fn from_spec(
        spec: OperationSpec,
        id: impl Into<String>,
        device_id: impl Into<String>,
        user_id: Option<String>,
        now: u64,
    ) -> ProtocolResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProtocolError::Invalid("operation id is empty".into()));
        }
        let checksum = payload_checksum(&spec.data)?;

        Ok(Self {
            id,
            op_type: spec.op_type,
            priority: spec.priority,
            endpoint: spec.endpoint,
            method: spec.method,
            data: spec.data,
            headers: spec.headers,
            status: OperationStatus::Pending,
            metadata: OperationMetadata {
                created_at: now,
                updated_at: now,
                attempt_count: 0,
                next_retry: None,
                device_id: device_id.into(),
                checksum,
                user_id,
                force_update: false,
            },
            error: None,
            conflict_data: None,
            conflict_strategy: spec.conflict_strategy,
        })
    }

    /// Moves the operation to `to`, enforcing the state machine.
    pub fn transition(&mut self, to: OperationStatus, now: u64) -> ProtocolResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(ProtocolError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.metadata.updated_at = now;
        Ok(())
    }

    /// Returns true if the scheduler may select this operation at `now`.
    pub fn is_eligible(&self, now: u64) -> bool {
        self.status == OperationStatus::Pending
            && self.metadata.next_retry.map_or(true, |at| at <= now)
    }

    /// Clears retry bookkeeping so the operation is immediately eligible
    /// with a fresh retry budget.
    pub fn reset_attempts(&mut self) {
        self.metadata.attempt_count = 0;
        self.metadata.next_retry = None;
        self.error = None;
    }

    /// Returns the strategy to apply when this operation conflicts.
    pub fn effective_strategy(&self, default: ConflictStrategy) -> ConflictStrategy {
        self.conflict_strategy.unwrap_or(default)
    }

    /// Returns the caller's headers plus the sync protocol headers.
    ///
    /// Protocol headers win over caller headers with the same name.
    pub fn outgoing_headers(&self) -> BTreeMap<String, String> {
        let mut out = self.headers.clone();
        out.insert(headers::OPERATION_ID.to_string(), self.id.clone());
        out.insert(
            headers::PRIORITY.to_string(),
            self.priority.as_str().to_string(),
        );
        out.insert(
            headers::CHECKSUM.to_string(),
            self.metadata.checksum.clone(),
        );
        if self.metadata.force_update {
            out.insert(headers::FORCE_UPDATE.to_string(), "true".to_string());
        }
        out
    }

    /// Returns the size of the serialized payload in bytes.
    pub fn payload_size(&self) -> usize {
        serde_json::to_vec(&self.data).map(|b| b.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_operation() -> SyncOperation {
        SyncOperation::from_spec(
            OperationSpec::create("/receipts", json!({"total": 1250})),
            "op-1",
            "device-a",
            Some("user-7".into()),
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn priority_order() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::Normal < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn from_spec_sets_metadata() {
        let op = make_operation();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.metadata.created_at, 1_000);
        assert_eq!(op.metadata.updated_at, 1_000);
        assert_eq!(op.metadata.attempt_count, 0);
        assert_eq!(op.metadata.next_retry, None);
        assert_eq!(op.metadata.device_id, "device-a");
        assert_eq!(op.metadata.user_id.as_deref(), Some("user-7"));
        assert_eq!(
            op.metadata.checksum,
            payload_checksum(&json!({"total": 1250})).unwrap()
        );
    }

    #[test]
    fn from_spec_rejects_empty_id() {
        let result = SyncOperation::from_spec(
            OperationSpec::delete("/x"),
            "",
            "device",
            None,
            0,
        );
        assert!(matches!(result, Err(ProtocolError::Invalid(_))));
    }

    #[test]
    fn valid_transitions() {
        let mut op = make_operation();
        op.transition(OperationStatus::Syncing, 2_000).unwrap();
        assert_eq!(op.metadata.updated_at, 2_000);
        op.transition(OperationStatus::Conflict, 2_001).unwrap();
        op.transition(OperationStatus::Pending, 2_002).unwrap();
        op.transition(OperationStatus::Syncing, 2_003).unwrap();
        op.transition(OperationStatus::Completed, 2_004).unwrap();
    }

    #[test]
    fn invalid_transitions() {
        let mut op = make_operation();
        let err = op.transition(OperationStatus::Completed, 2_000).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidTransition {
                from: OperationStatus::Pending,
                to: OperationStatus::Completed
            }
        ));
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.metadata.updated_at, 1_000);

        assert!(!OperationStatus::Completed.can_transition_to(OperationStatus::Pending));
        assert!(!OperationStatus::Syncing.can_transition_to(OperationStatus::Syncing));
    }

    #[test]
    fn eligibility_honors_next_retry() {
        let mut op = make_operation();
        assert!(op.is_eligible(0));

        op.metadata.next_retry = Some(5_000);
        assert!(!op.is_eligible(4_999));
        assert!(op.is_eligible(5_000));

        op.reset_attempts();
        assert!(op.is_eligible(0));

        op.transition(OperationStatus::Syncing, 1).unwrap();
        assert!(!op.is_eligible(u64::MAX));
    }

    #[test]
    fn outgoing_headers_include_protocol_headers() {
        let mut op = SyncOperation::from_spec(
            OperationSpec::update("/items/1", json!({"n": 1}))
                .with_priority(Priority::High)
                .with_header("Authorization", "Bearer t")
                .with_header(headers::PRIORITY, "spoofed"),
            "op-9",
            "device",
            None,
            0,
        )
        .unwrap();

        let out = op.outgoing_headers();
        assert_eq!(out["Authorization"], "Bearer t");
        assert_eq!(out[headers::OPERATION_ID], "op-9");
        assert_eq!(out[headers::PRIORITY], "high");
        assert_eq!(out[headers::CHECKSUM], op.metadata.checksum);
        assert!(!out.contains_key(headers::FORCE_UPDATE));

        op.metadata.force_update = true;
        assert_eq!(op.outgoing_headers()[headers::FORCE_UPDATE], "true");
    }

    #[test]
    fn json_shape_uses_wire_names() {
        let op = make_operation();
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "create");
        assert_eq!(value["method"], "POST");
        assert_eq!(value["priority"], "normal");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["metadata"]["attemptCount"], 0);
        assert!(value["metadata"].get("nextRetry").is_none());
        assert!(value["metadata"].get("forceUpdate").is_none());
    }

    #[test]
    fn effective_strategy_override() {
        let mut op = make_operation();
        assert_eq!(
            op.effective_strategy(ConflictStrategy::ServerWins),
            ConflictStrategy::ServerWins
        );
        op.conflict_strategy = Some(ConflictStrategy::Manual);
        assert_eq!(
            op.effective_strategy(ConflictStrategy::ServerWins),
            ConflictStrategy::Manual
        );
    }

    #[test]
    fn payload_size() {
        let op = make_operation();
        assert_eq!(op.payload_size(), br#"{"total":1250}"#.len());
    }
}
