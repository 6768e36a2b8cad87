//! Conflict resolution for 409 responses.

use crate::error::{SyncError, SyncResult};
use serde_json::{Map, Value};
use syncline_protocol::{
    ConflictData, ConflictStrategy, ManualResolution, OperationStatus, Payload, SyncOperation,
};
use tracing::{debug, warn};

/// What happened to an operation after a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The server version stands; the operation is done.
    Completed,
    /// The operation goes back to `pending` for another attempt.
    Requeued,
    /// The operation waits in `conflict` for a caller.
    Parked,
}

/// Result of applying a conflict strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictOutcome {
    /// Next state of the operation.
    pub resolution: Resolution,
    /// Conflict record, also stored on the operation.
    pub conflict: ConflictData,
}

/// Applies conflict strategies to operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    default_strategy: ConflictStrategy,
}

impl ConflictResolver {
    /// Creates a resolver that falls back to `default_strategy` for
    /// operations without their own.
    pub fn new(default_strategy: ConflictStrategy) -> Self {
        Self { default_strategy }
    }

    /// Returns the default strategy.
    pub fn default_strategy(&self) -> ConflictStrategy {
        self.default_strategy
    }

    /// Resolves a conflict on a `syncing` operation.
    ///
    /// `merge` needs both versions to be JSON objects. When either is not,
    /// the operation is parked as if the strategy were `manual`.
    pub fn resolve(
        &self,
        op: &mut SyncOperation,
        server_version: Payload,
        now: u64,
    ) -> SyncResult<ConflictOutcome> {
        let mut strategy = op.effective_strategy(self.default_strategy);
        let mut merged = None;
        if strategy == ConflictStrategy::Merge {
            merged = merge_payloads(&op.data, &server_version, now);
            if merged.is_none() {
                warn!(
                    operation_id = %op.id,
                    "cannot merge non-object payloads, parking for manual resolution"
                );
                strategy = ConflictStrategy::Manual;
            }
        }

        let conflict = ConflictData {
            local_version: op.data.clone(),
            server_version,
            strategy,
        };
        op.conflict_data = Some(conflict.clone());

        let resolution = match strategy {
            ConflictStrategy::ServerWins => {
                op.transition(OperationStatus::Completed, now)?;
                Resolution::Completed
            }
            ConflictStrategy::ClientWins => {
                op.transition(OperationStatus::Pending, now)?;
                op.reset_attempts();
                op.metadata.force_update = true;
                Resolution::Requeued
            }
            ConflictStrategy::Merge => {
                op.transition(OperationStatus::Pending, now)?;
                op.reset_attempts();
                if let Some(data) = merged {
                    op.data = data;
                }
                Resolution::Requeued
            }
            ConflictStrategy::Manual => {
                op.transition(OperationStatus::Conflict, now)?;
                op.metadata.next_retry = None;
                Resolution::Parked
            }
        };

        debug!(operation_id = %op.id, strategy = %strategy, ?resolution, "conflict resolved");
        Ok(ConflictOutcome {
            resolution,
            conflict,
        })
    }

    /// Applies a caller's decision to an operation parked in `conflict`.
    pub fn apply_manual(
        &self,
        op: &mut SyncOperation,
        resolution: ManualResolution,
        now: u64,
    ) -> SyncResult<Resolution> {
        if op.status != OperationStatus::Conflict {
            return Err(SyncError::InvalidState {
                id: op.id.clone(),
                status: op.status,
            });
        }
        match resolution {
            ManualResolution::KeepServer => {
                op.transition(OperationStatus::Completed, now)?;
                Ok(Resolution::Completed)
            }
            ManualResolution::KeepLocal => {
                op.transition(OperationStatus::Pending, now)?;
                op.reset_attempts();
                op.metadata.force_update = true;
                Ok(Resolution::Requeued)
            }
            ManualResolution::UseData(data) => {
                op.transition(OperationStatus::Pending, now)?;
                op.reset_attempts();
                op.data = data;
                op.metadata.force_update = true;
                Ok(Resolution::Requeued)
            }
        }
    }
}

/// Shallow union of two JSON objects where `local` fields win, tagged with
/// `_merged` and `_mergedAt`. Returns `None` unless both are objects.
pub fn merge_payloads(local: &Payload, server: &Payload, now: u64) -> Option<Payload> {
    let (Value::Object(local), Value::Object(server)) = (local, server) else {
        return None;
    };

    let mut merged: Map<String, Value> = server.clone();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }
    merged.insert("_merged".to_string(), Value::Bool(true));
    merged.insert("_mergedAt".to_string(), Value::from(now));
    Some(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncline_protocol::OperationSpec;

    fn syncing_op(data: Payload, strategy: Option<ConflictStrategy>) -> SyncOperation {
        let mut spec = OperationSpec::update("/docs/1", data);
        if let Some(strategy) = strategy {
            spec = spec.with_conflict_strategy(strategy);
        }
        let mut op = SyncOperation::from_spec(spec, "op-1", "device", None, 10).unwrap();
        op.metadata.attempt_count = 2;
        op.metadata.next_retry = Some(50);
        op.transition(OperationStatus::Syncing, 20).unwrap();
        op
    }

    #[test]
    fn server_wins_completes() {
        let resolver = ConflictResolver::default();
        let mut op = syncing_op(json!({"title": "mine"}), None);

        let outcome = resolver.resolve(&mut op, json!({"title": "theirs"}), 30).unwrap();

        assert_eq!(outcome.resolution, Resolution::Completed);
        assert_eq!(op.status, OperationStatus::Completed);
        assert_eq!(outcome.conflict.local_version, json!({"title": "mine"}));
        assert_eq!(outcome.conflict.server_version, json!({"title": "theirs"}));
        assert_eq!(outcome.conflict.strategy, ConflictStrategy::ServerWins);
        assert_eq!(op.conflict_data, Some(outcome.conflict));
    }

    #[test]
    fn client_wins_requeues_with_force_update() {
        let resolver = ConflictResolver::new(ConflictStrategy::ClientWins);
        let mut op = syncing_op(json!({"title": "mine"}), None);

        let outcome = resolver.resolve(&mut op, json!({"title": "theirs"}), 30).unwrap();

        assert_eq!(outcome.resolution, Resolution::Requeued);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.metadata.attempt_count, 0);
        assert_eq!(op.metadata.next_retry, None);
        assert!(op.metadata.force_update);
        assert_eq!(
            op.outgoing_headers()
                .get(syncline_protocol::headers::FORCE_UPDATE)
                .map(String::as_str),
            Some("true")
        );
        assert_eq!(op.data, json!({"title": "mine"}));
    }

    #[test]
    fn merge_unions_fields() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge);
        let mut op = syncing_op(json!({"title": "mine", "tags": ["a"]}), None);

        let outcome = resolver
            .resolve(&mut op, json!({"title": "theirs", "views": 7}), 30)
            .unwrap();

        assert_eq!(outcome.resolution, Resolution::Requeued);
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.metadata.attempt_count, 0);
        assert_eq!(
            op.data,
            json!({
                "title": "mine",
                "tags": ["a"],
                "views": 7,
                "_merged": true,
                "_mergedAt": 30
            })
        );
        assert_eq!(outcome.conflict.local_version, json!({"title": "mine", "tags": ["a"]}));
    }

    #[test]
    fn merge_of_non_objects_parks() {
        let resolver = ConflictResolver::new(ConflictStrategy::Merge);
        let mut op = syncing_op(json!([1, 2]), None);

        let outcome = resolver.resolve(&mut op, json!({"a": 1}), 30).unwrap();

        assert_eq!(outcome.resolution, Resolution::Parked);
        assert_eq!(outcome.conflict.strategy, ConflictStrategy::Manual);
        assert_eq!(op.status, OperationStatus::Conflict);
        assert_eq!(op.data, json!([1, 2]));
    }

    #[test]
    fn manual_parks() {
        let resolver = ConflictResolver::new(ConflictStrategy::Manual);
        let mut op = syncing_op(json!({"v": 1}), None);

        let outcome = resolver.resolve(&mut op, json!({"v": 2}), 30).unwrap();

        assert_eq!(outcome.resolution, Resolution::Parked);
        assert_eq!(op.status, OperationStatus::Conflict);
        assert!(!op.is_eligible(u64::MAX));
        assert_eq!(op.conflict_data.as_ref().unwrap().server_version, json!({"v": 2}));
    }

    #[test]
    fn operation_override_beats_default() {
        let resolver = ConflictResolver::new(ConflictStrategy::ServerWins);
        let mut op = syncing_op(json!({"v": 1}), Some(ConflictStrategy::Manual));

        let outcome = resolver.resolve(&mut op, json!({"v": 2}), 30).unwrap();
        assert_eq!(outcome.resolution, Resolution::Parked);
    }

    #[test]
    fn resolve_requires_syncing() {
        let resolver = ConflictResolver::default();
        let mut op = syncing_op(json!({}), None);
        op.transition(OperationStatus::Failed, 25).unwrap();

        let result = resolver.resolve(&mut op, json!({}), 30);
        assert!(matches!(result, Err(SyncError::Protocol(_))));
    }

    #[test]
    fn manual_resolutions() {
        let resolver = ConflictResolver::new(ConflictStrategy::Manual);

        let mut op = syncing_op(json!({"v": 1}), None);
        resolver.resolve(&mut op, json!({"v": 2}), 30).unwrap();
        assert_eq!(
            resolver.apply_manual(&mut op, ManualResolution::KeepServer, 40).unwrap(),
            Resolution::Completed
        );
        assert_eq!(op.status, OperationStatus::Completed);

        let mut op = syncing_op(json!({"v": 1}), None);
        resolver.resolve(&mut op, json!({"v": 2}), 30).unwrap();
        resolver
            .apply_manual(&mut op, ManualResolution::UseData(json!({"v": 3})), 40)
            .unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.data, json!({"v": 3}));
        assert!(op.metadata.force_update);
        assert!(op.is_eligible(40));

        let mut op = syncing_op(json!({"v": 1}), None);
        assert!(matches!(
            resolver.apply_manual(&mut op, ManualResolution::KeepLocal, 40),
            Err(SyncError::InvalidState { .. })
        ));
    }

    #[test]
    fn merge_payloads_requires_objects() {
        assert!(merge_payloads(&json!(1), &json!({}), 0).is_none());
        assert!(merge_payloads(&json!({}), &json!(null), 0).is_none());
        assert_eq!(
            merge_payloads(&json!({}), &json!({}), 5),
            Some(json!({"_merged": true, "_mergedAt": 5}))
        );
    }
}
