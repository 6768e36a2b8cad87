//! Queue snapshot encoding.
//!
//! The durable queue is stored as one JSON object mapping operation id to
//! operation.

use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::SyncOperation;
use std::collections::BTreeMap;

/// The full queue state as written to storage.
pub type QueueSnapshot = BTreeMap<String, SyncOperation>;

/// Encodes a snapshot to JSON bytes.
pub fn encode_snapshot(snapshot: &QueueSnapshot) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(snapshot)?)
}

/// Decodes a snapshot, checking that every entry is stored under its own id.
pub fn decode_snapshot(bytes: &[u8]) -> ProtocolResult<QueueSnapshot> {
    let snapshot: QueueSnapshot = serde_json::from_slice(bytes)?;
    if let Some((key, op)) = snapshot.iter().find(|(key, op)| **key != op.id) {
        return Err(ProtocolError::Invalid(format!(
            "snapshot entry {key:?} holds operation {:?}",
            op.id
        )));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationSpec, Priority};
    use serde_json::json;

    fn snapshot_with(ids: &[&str]) -> QueueSnapshot {
        ids.iter()
            .map(|id| {
                let op = SyncOperation::from_spec(
                    OperationSpec::update("/notes", json!({"id": id}))
                        .with_priority(Priority::High),
                    *id,
                    "device",
                    None,
                    42,
                )
                .unwrap();
                (id.to_string(), op)
            })
            .collect()
    }

    #[test]
    fn snapshot_roundtrip() {
        let snapshot = snapshot_with(&["a", "b", "c"]);
        let bytes = encode_snapshot(&snapshot).unwrap();
        let decoded = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn empty_snapshot() {
        let decoded = decode_snapshot(b"{}").unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            decode_snapshot(b"not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(decode_snapshot(b"[1,2,3]").is_err());
    }

    #[test]
    fn mismatched_key_rejected() {
        let mut snapshot = snapshot_with(&["a"]);
        let op = snapshot.remove("a").unwrap();
        snapshot.insert("other".into(), op);
        let bytes = encode_snapshot(&snapshot).unwrap();
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(ProtocolError::Invalid(_))
        ));
    }
}
