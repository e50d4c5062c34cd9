//! Reactions to partition ownership changes during group rebalancing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::offsets::OffsetTracker;
use crate::source::{CommitOutcome, OffsetCommitter};
use crate::types::TopicPartition;

/// Two-method capability the source invokes while rebalancing.
///
/// The source serializes these callbacks with respect to `poll`, so
/// implementations never race the consume loop. `on_partitions_revoked`
/// runs before ownership actually moves: it is the last moment this
/// process may commit for the revoked partitions.
pub trait RebalanceListener: Send + Sync {
    fn on_partitions_revoked(&self, committer: &dyn OffsetCommitter, revoked: &[TopicPartition]);

    fn on_partitions_assigned(&self, assigned: &[TopicPartition]);
}

/// Listener that keeps an [`OffsetTracker`] in step with the group.
///
/// On revocation it issues a best-effort asynchronous commit of the offsets
/// currently held for the revoked partitions, then forgets them; a failed
/// flush is logged, not fatal, since at-least-once delivery tolerates the
/// reprocessing after the partitions land elsewhere.
pub struct TrackerRebalanceListener {
    tracker: Arc<OffsetTracker>,
}

impl TrackerRebalanceListener {
    pub fn new(tracker: Arc<OffsetTracker>) -> Self {
        Self { tracker }
    }
}

impl RebalanceListener for TrackerRebalanceListener {
    fn on_partitions_revoked(&self, committer: &dyn OffsetCommitter, revoked: &[TopicPartition]) {
        info!(partitions = %join_partitions(revoked), "partitions revoked");

        let held = self.tracker.commit_request_for(revoked);
        if !held.is_empty() {
            committer.commit_async(held, Box::new(log_flush_outcome));
        }
        self.tracker.record_revoked(revoked);
    }

    fn on_partitions_assigned(&self, assigned: &[TopicPartition]) {
        info!(partitions = %join_partitions(assigned), "partitions assigned");
        self.tracker.record_assigned(assigned);
    }
}

fn log_flush_outcome(outcome: CommitOutcome) {
    match outcome {
        Ok(request) => {
            debug!(partitions = request.len(), "revoked offsets committed");
        }
        Err(e) => {
            warn!(error = %e, "offset flush for revoked partitions failed");
        }
    }
}

fn join_partitions(partitions: &[TopicPartition]) -> String {
    partitions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::source::CommitCallback;
    use crate::types::{OffsetAndMetadata, OffsetCommitRequest};

    /// Committer double that records every request and acknowledges it
    /// before returning, so ordering against the callback is observable.
    #[derive(Default)]
    struct RecordingCommitter {
        requests: Mutex<Vec<OffsetCommitRequest>>,
    }

    impl OffsetCommitter for RecordingCommitter {
        fn commit_async(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback) {
            self.requests.lock().unwrap().push(offsets.clone());
            on_complete(Ok(offsets));
        }
    }

    fn test_partition(num: i32) -> TopicPartition {
        TopicPartition::new("my-orders", num)
    }

    #[test]
    fn revocation_commits_held_offsets_before_returning() {
        let tracker = Arc::new(OffsetTracker::new());
        tracker.record_assigned(&[test_partition(0), test_partition(1)]);
        tracker.mark_processed(&test_partition(0), 100);
        tracker.mark_processed(&test_partition(1), 200);

        let listener = TrackerRebalanceListener::new(Arc::clone(&tracker));
        let committer = RecordingCommitter::default();

        listener.on_partitions_revoked(&committer, &[test_partition(0)]);

        let requests = committer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].get(&test_partition(0)),
            Some(&OffsetAndMetadata::new(100))
        );
        assert_eq!(requests[0].len(), 1);
    }

    #[test]
    fn revocation_clears_tracker_state() {
        let tracker = Arc::new(OffsetTracker::new());
        tracker.record_assigned(&[test_partition(0), test_partition(1)]);
        tracker.mark_processed(&test_partition(0), 100);

        let listener = TrackerRebalanceListener::new(Arc::clone(&tracker));
        listener.on_partitions_revoked(&RecordingCommitter::default(), &[test_partition(0)]);

        assert_eq!(tracker.next_offset(&test_partition(0)), None);
        assert_eq!(tracker.assignment(), vec![test_partition(1)]);
    }

    #[test]
    fn revocation_without_held_offsets_commits_nothing() {
        let tracker = Arc::new(OffsetTracker::new());
        tracker.record_assigned(&[test_partition(0)]);

        let listener = TrackerRebalanceListener::new(Arc::clone(&tracker));
        let committer = RecordingCommitter::default();
        listener.on_partitions_revoked(&committer, &[test_partition(0)]);

        assert!(committer.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn assignment_is_recorded() {
        let tracker = Arc::new(OffsetTracker::new());
        let listener = TrackerRebalanceListener::new(Arc::clone(&tracker));

        listener.on_partitions_assigned(&[test_partition(3), test_partition(1)]);

        assert_eq!(tracker.assignment(), vec![test_partition(1), test_partition(3)]);
    }
}
