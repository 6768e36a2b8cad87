//! Priority scheduling.

use std::cmp::Ordering;
use syncline_protocol::SyncOperation;

/// Selects the operations for the next sync pass.
///
/// Eligible operations are `pending` with no retry delay in the future.
/// They are ordered by priority (highest first), then by creation time
/// (oldest first), then by id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScheduler;

impl PriorityScheduler {
    /// Returns up to `batch_size` eligible operations in dispatch order.
    pub fn next_batch<'a>(
        operations: impl IntoIterator<Item = &'a SyncOperation>,
        batch_size: usize,
        now: u64,
    ) -> Vec<SyncOperation> {
        let mut eligible: Vec<&SyncOperation> = operations
            .into_iter()
            .filter(|op| op.is_eligible(now))
            .collect();
        eligible.sort_by(|a, b| dispatch_order(a, b));
        eligible.into_iter().take(batch_size).cloned().collect()
    }

    /// Returns the earliest time a backoff-waiting operation becomes
    /// eligible, if any is waiting.
    pub fn next_wakeup<'a>(
        operations: impl IntoIterator<Item = &'a SyncOperation>,
        now: u64,
    ) -> Option<u64> {
        operations
            .into_iter()
            .filter(|op| op.status == syncline_protocol::OperationStatus::Pending)
            .filter_map(|op| op.metadata.next_retry)
            .filter(|at| *at > now)
            .min()
    }
}

fn dispatch_order(a: &SyncOperation, b: &SyncOperation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.metadata.created_at.cmp(&b.metadata.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use syncline_protocol::{OperationSpec, OperationStatus, Priority};

    fn op(id: &str, priority: Priority, created_at: u64) -> SyncOperation {
        SyncOperation::from_spec(
            OperationSpec::update("/items", json!({ "id": id })).with_priority(priority),
            id,
            "device",
            None,
            created_at,
        )
        .unwrap()
    }

    fn ids(ops: &[SyncOperation]) -> Vec<&str> {
        ops.iter().map(|op| op.id.as_str()).collect()
    }

    #[test]
    fn priority_then_fifo() {
        let ops = vec![
            op("low", Priority::Low, 1),
            op("normal-late", Priority::Normal, 5),
            op("critical", Priority::Critical, 9),
            op("normal-early", Priority::Normal, 2),
            op("high", Priority::High, 3),
        ];

        let batch = PriorityScheduler::next_batch(&ops, 10, 100);
        assert_eq!(
            ids(&batch),
            vec!["critical", "high", "normal-early", "normal-late", "low"]
        );
    }

    #[test]
    fn respects_batch_size() {
        let ops: Vec<_> = (0..5).map(|i| op(&format!("op-{i}"), Priority::Normal, i)).collect();
        let batch = PriorityScheduler::next_batch(&ops, 2, 100);
        assert_eq!(ids(&batch), vec!["op-0", "op-1"]);
    }

    #[test]
    fn skips_ineligible() {
        let mut waiting = op("waiting", Priority::Critical, 1);
        waiting.metadata.next_retry = Some(200);
        let mut due = op("due", Priority::Low, 2);
        due.metadata.next_retry = Some(100);
        let mut syncing = op("syncing", Priority::High, 3);
        syncing.status = OperationStatus::Syncing;
        let mut failed = op("failed", Priority::High, 4);
        failed.status = OperationStatus::Failed;

        let ops = vec![waiting, due, syncing, failed];
        let batch = PriorityScheduler::next_batch(&ops, 10, 100);
        assert_eq!(ids(&batch), vec!["due"]);
        assert_eq!(PriorityScheduler::next_wakeup(&ops, 100), Some(200));
    }

    #[test]
    fn empty_input() {
        let batch = PriorityScheduler::next_batch(std::iter::empty(), 10, 0);
        assert!(batch.is_empty());
    }

    fn priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn batch_is_sorted_and_bounded(
            entries in prop::collection::vec((priority(), 0u64..50), 0..40),
            batch_size in 1usize..16,
        ) {
            let ops: Vec<_> = entries
                .iter()
                .enumerate()
                .map(|(i, (p, t))| op(&format!("op-{i:03}"), *p, *t))
                .collect();

            let batch = PriorityScheduler::next_batch(&ops, batch_size, 1_000);
            prop_assert_eq!(batch.len(), ops.len().min(batch_size));
            for pair in batch.windows(2) {
                prop_assert!(dispatch_order(&pair[0], &pair[1]) != Ordering::Greater);
            }
            if let Some(first) = batch.first() {
                let max = ops.iter().map(|op| op.priority).max().unwrap();
                prop_assert_eq!(first.priority, max);
            }
        }
    }
}
