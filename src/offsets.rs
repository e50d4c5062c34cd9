//! Tracks the current partition assignment and the next offset to consume
//! per partition.
//!
//! The loop marks offsets as it processes records; the rebalance listener
//! snapshots and clears them when partitions move away. Both sides share one
//! tracker, so all state sits behind a single lock that is only ever held
//! for map operations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use tracing::debug;

use crate::types::{OffsetAndMetadata, OffsetCommitRequest, TopicPartition};

#[derive(Debug, Default)]
struct TrackerState {
    assignment: BTreeSet<TopicPartition>,
    next_offsets: BTreeMap<TopicPartition, i64>,
}

/// Shared ledger of owned partitions and committable offsets.
#[derive(Debug, Default)]
pub struct OffsetTracker {
    state: Mutex<TrackerState>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records partitions granted to this instance.
    pub fn record_assigned(&self, partitions: &[TopicPartition]) {
        let mut state = self.state.lock().unwrap();
        for partition in partitions {
            state.assignment.insert(partition.clone());
        }
    }

    /// Drops revoked partitions from the assignment and forgets their held
    /// offsets. Any commit for them must be snapshotted before this call.
    pub fn record_revoked(&self, partitions: &[TopicPartition]) {
        let mut state = self.state.lock().unwrap();
        for partition in partitions {
            state.assignment.remove(partition);
            if state.next_offsets.remove(partition).is_some() {
                debug!(partition = %partition, "cleared offsets for revoked partition");
            }
        }
    }

    /// Marks a record as processed. `next_offset` is one past the record's
    /// offset. Only ever advances; a lower value is ignored, so late marks
    /// cannot move a partition backwards.
    pub fn mark_processed(&self, partition: &TopicPartition, next_offset: i64) {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .next_offsets
            .entry(partition.clone())
            .or_insert(next_offset);
        if next_offset > *entry {
            *entry = next_offset;
        }
    }

    /// Snapshot of every held offset, ready to submit to a commit call.
    pub fn commit_request(&self) -> OffsetCommitRequest {
        let state = self.state.lock().unwrap();
        OffsetCommitRequest::from_offsets(
            state
                .next_offsets
                .iter()
                .map(|(partition, next)| (partition.clone(), OffsetAndMetadata::new(*next)))
                .collect(),
        )
    }

    /// Snapshot restricted to `partitions`, for the revocation flush.
    pub fn commit_request_for(&self, partitions: &[TopicPartition]) -> OffsetCommitRequest {
        let state = self.state.lock().unwrap();
        OffsetCommitRequest::from_offsets(
            partitions
                .iter()
                .filter_map(|partition| {
                    state
                        .next_offsets
                        .get(partition)
                        .map(|next| (partition.clone(), OffsetAndMetadata::new(*next)))
                })
                .collect(),
        )
    }

    /// Currently owned partitions, in order.
    pub fn assignment(&self) -> Vec<TopicPartition> {
        self.state.lock().unwrap().assignment.iter().cloned().collect()
    }

    /// Next offset held for one partition, if any record was processed.
    pub fn next_offset(&self, partition: &TopicPartition) -> Option<i64> {
        self.state.lock().unwrap().next_offsets.get(partition).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_partition(num: i32) -> TopicPartition {
        TopicPartition::new("my-orders", num)
    }

    #[test]
    fn test_mark_processed_initializes_offset() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);

        tracker.mark_processed(&partition, 100);

        assert_eq!(tracker.next_offset(&partition), Some(100));
    }

    #[test]
    fn test_mark_processed_advances_offset() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);

        tracker.mark_processed(&partition, 100);
        tracker.mark_processed(&partition, 150);

        assert_eq!(tracker.next_offset(&partition), Some(150));
    }

    #[test]
    fn test_mark_processed_never_goes_backwards() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);

        tracker.mark_processed(&partition, 100);
        tracker.mark_processed(&partition, 50);

        assert_eq!(tracker.next_offset(&partition), Some(100));
    }

    #[test]
    fn test_commit_request_covers_all_partitions() {
        let tracker = OffsetTracker::new();

        tracker.mark_processed(&test_partition(0), 100);
        tracker.mark_processed(&test_partition(1), 200);
        tracker.mark_processed(&test_partition(2), 300);

        let request = tracker.commit_request();

        assert_eq!(request.len(), 3);
        assert_eq!(
            request.get(&test_partition(1)),
            Some(&OffsetAndMetadata::new(200))
        );
    }

    #[test]
    fn test_commit_request_for_subset() {
        let tracker = OffsetTracker::new();

        tracker.mark_processed(&test_partition(0), 100);
        tracker.mark_processed(&test_partition(1), 200);

        let request = tracker.commit_request_for(&[test_partition(1), test_partition(9)]);

        assert_eq!(request.len(), 1);
        assert_eq!(
            request.get(&test_partition(1)),
            Some(&OffsetAndMetadata::new(200))
        );
    }

    #[test]
    fn test_revoked_partitions_are_forgotten() {
        let tracker = OffsetTracker::new();
        tracker.record_assigned(&[test_partition(0), test_partition(1)]);
        tracker.mark_processed(&test_partition(0), 100);
        tracker.mark_processed(&test_partition(1), 200);

        tracker.record_revoked(&[test_partition(0)]);

        assert_eq!(tracker.next_offset(&test_partition(0)), None);
        assert_eq!(tracker.next_offset(&test_partition(1)), Some(200));
        assert_eq!(tracker.assignment(), vec![test_partition(1)]);
    }

    #[test]
    fn test_assignment_is_recorded_in_order() {
        let tracker = OffsetTracker::new();

        tracker.record_assigned(&[test_partition(2), test_partition(0)]);
        tracker.record_assigned(&[test_partition(1)]);

        assert_eq!(
            tracker.assignment(),
            vec![test_partition(0), test_partition(1), test_partition(2)]
        );
    }

    #[test]
    fn test_concurrent_marks_keep_highest_offset() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(OffsetTracker::new());
        let partition = test_partition(0);

        let mut handles = vec![];
        for i in 1..=10 {
            let tracker = Arc::clone(&tracker);
            let partition = partition.clone();
            handles.push(thread::spawn(move || {
                tracker.mark_processed(&partition, i * 100);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.next_offset(&partition), Some(1000));
    }
}
