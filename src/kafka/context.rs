use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance};
use rdkafka::error::KafkaResult;
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, error};

use crate::rebalance::RebalanceListener;
use crate::source::{CommitCallback, CommitError, OffsetCommitter};
use crate::types::OffsetCommitRequest;

use super::{partitions_from_list, request_from_list, to_partition_list};

/// Consumer context bridging transport callbacks onto the rebalance listener
/// and resolving asynchronous commit acknowledgments.
///
/// Completion callbacks are registered with the offsets they were submitted
/// for and resolved oldest-first. An acknowledgment whose offsets are not
/// the oldest registration's leaves the queue untouched; synchronous
/// commits register no callback, so their acknowledgments fall through.
pub struct SourceContext {
    listener: Arc<dyn RebalanceListener>,
    pending_commits: Mutex<VecDeque<(OffsetCommitRequest, CommitCallback)>>,
}

impl SourceContext {
    pub fn new(listener: Arc<dyn RebalanceListener>) -> Self {
        Self {
            listener,
            pending_commits: Mutex::new(VecDeque::new()),
        }
    }

    fn register_commit_callback(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback) {
        self.pending_commits
            .lock()
            .unwrap()
            .push_back((offsets, on_complete));
    }

    /// Takes back the most recently registered callback. Used when a
    /// submission is rejected before reaching the broker.
    fn withdraw_commit_callback(&self) -> Option<CommitCallback> {
        self.pending_commits
            .lock()
            .unwrap()
            .pop_back()
            .map(|(_, on_complete)| on_complete)
    }

    /// Takes the oldest registered callback, but only when the acknowledged
    /// offsets are the ones it was submitted with.
    fn take_acknowledged_callback(&self, acked: &OffsetCommitRequest) -> Option<CommitCallback> {
        let mut pending = self.pending_commits.lock().unwrap();
        let front_matches = pending
            .front()
            .is_some_and(|(submitted, _)| same_positions(submitted, acked));
        if !front_matches {
            return None;
        }
        pending.pop_front().map(|(_, on_complete)| on_complete)
    }
}

/// Whether two requests commit the same partitions to the same positions.
/// The transport echoes positions but not metadata, so metadata is left out
/// of the match.
fn same_positions(a: &OffsetCommitRequest, b: &OffsetCommitRequest) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ap, ao), (bp, bo))| ap == bp && ao.next_offset() == bo.next_offset())
}

impl ClientContext for SourceContext {}

impl ConsumerContext for SourceContext {
    fn pre_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                let revoked = partitions_from_list(partitions);
                let committer = RevocationCommitter {
                    consumer: base_consumer,
                    context: self,
                };
                self.listener.on_partitions_revoked(&committer, &revoked);
            }
            Rebalance::Assign(partitions) => {
                debug!(partitions = partitions.count(), "pre-rebalance assign");
            }
            Rebalance::Error(e) => {
                error!(error = %e, "rebalance failed");
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                let assigned = partitions_from_list(partitions);
                self.listener.on_partitions_assigned(&assigned);
            }
            Rebalance::Revoke(partitions) => {
                debug!(partitions = partitions.count(), "post-rebalance revoke");
            }
            Rebalance::Error(e) => {
                error!(error = %e, "post-rebalance failed");
            }
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        let acked = request_from_list(offsets);
        let Some(on_complete) = self.take_acknowledged_callback(&acked) else {
            // Synchronous commits are acknowledged through here as well;
            // their results were already returned to the caller directly.
            debug!("commit acknowledgment without a registered callback");
            return;
        };
        match result {
            Ok(()) => on_complete(Ok(acked)),
            Err(e) => on_complete(Err(CommitError::new(e.to_string()))),
        }
    }
}

/// Commit handle valid for the duration of one revocation callback. Commits
/// issued through it resolve via the owning context's acknowledgment path.
struct RevocationCommitter<'a> {
    consumer: &'a BaseConsumer<SourceContext>,
    context: &'a SourceContext,
}

impl OffsetCommitter for RevocationCommitter<'_> {
    fn commit_async(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback) {
        submit_async_commit(self.consumer, self.context, offsets, on_complete);
    }
}

/// Shared submission path for loop-issued and revocation-issued commits.
/// An empty request is acknowledged immediately without a broker call.
pub(crate) fn submit_async_commit<C>(
    consumer: &C,
    context: &SourceContext,
    offsets: OffsetCommitRequest,
    on_complete: CommitCallback,
) where
    C: Consumer<SourceContext>,
{
    if offsets.is_empty() {
        on_complete(Ok(offsets));
        return;
    }

    let list = match to_partition_list(&offsets) {
        Ok(list) => list,
        Err(e) => {
            on_complete(Err(CommitError::new(e.to_string())));
            return;
        }
    };

    // Registered before submission; withdrawn again if the submission is
    // rejected outright.
    context.register_commit_callback(offsets, on_complete);
    if let Err(e) = consumer.commit(&list, CommitMode::Async) {
        if let Some(on_complete) = context.withdraw_commit_callback() {
            on_complete(Err(CommitError::new(e.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rdkafka::error::{KafkaError, RDKafkaErrorCode};
    use rdkafka::{Offset, TopicPartitionList};

    use super::*;
    use crate::source::CommitOutcome;
    use crate::types::TopicPartition;

    struct NullListener;

    impl RebalanceListener for NullListener {
        fn on_partitions_revoked(&self, _committer: &dyn OffsetCommitter, _revoked: &[TopicPartition]) {}

        fn on_partitions_assigned(&self, _assigned: &[TopicPartition]) {}
    }

    fn context() -> SourceContext {
        SourceContext::new(Arc::new(NullListener))
    }

    #[test]
    fn acknowledgments_resolve_callbacks_in_submission_order() {
        let context = context();
        let outcomes: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let mut list = TopicPartitionList::new();
        list.add_partition_offset("my-orders", 0, Offset::Offset(5))
            .unwrap();

        for tag in ["first", "second"] {
            let outcomes = outcomes.clone();
            context.register_commit_callback(
                request_from_list(&list),
                Box::new(move |outcome| {
                    outcomes
                        .lock()
                        .unwrap()
                        .push(if outcome.is_ok() { tag } else { "error" });
                }),
            );
        }

        context.commit_callback(Ok(()), &list);
        context.commit_callback(
            Err(KafkaError::Global(RDKafkaErrorCode::OperationTimedOut)),
            &list,
        );

        assert_eq!(*outcomes.lock().unwrap(), vec!["first", "error"]);
    }

    #[test]
    fn unmatched_acknowledgment_leaves_queued_callbacks_in_place() {
        let context = context();
        let resolved: Arc<Mutex<Vec<CommitOutcome>>> = Arc::new(Mutex::new(Vec::new()));

        let mut async_list = TopicPartitionList::new();
        async_list
            .add_partition_offset("my-orders", 0, Offset::Offset(7))
            .unwrap();
        let resolved_in_callback = resolved.clone();
        context.register_commit_callback(
            request_from_list(&async_list),
            Box::new(move |outcome| resolved_in_callback.lock().unwrap().push(outcome)),
        );

        // A synchronous commit for another partition is acknowledged before
        // the pending asynchronous one.
        let mut sync_list = TopicPartitionList::new();
        sync_list
            .add_partition_offset("my-orders", 1, Offset::Offset(4))
            .unwrap();
        context.commit_callback(Ok(()), &sync_list);
        assert!(resolved.lock().unwrap().is_empty());

        context.commit_callback(Ok(()), &async_list);
        let outcomes = resolved.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        let request = outcomes[0]
            .as_ref()
            .expect("matching acknowledgment should resolve ok");
        assert_eq!(
            request
                .get(&TopicPartition::new("my-orders", 0))
                .map(|o| o.next_offset()),
            Some(7)
        );
    }

    #[test]
    fn successful_acknowledgment_carries_committed_offsets() {
        let context = context();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_callback = seen.clone();

        let mut list = TopicPartitionList::new();
        list.add_partition_offset("my-orders", 2, Offset::Offset(11))
            .unwrap();
        context.register_commit_callback(
            request_from_list(&list),
            Box::new(move |outcome| {
                *seen_in_callback.lock().unwrap() = Some(outcome);
            }),
        );
        context.commit_callback(Ok(()), &list);

        let outcome = seen.lock().unwrap().take().expect("callback should run");
        let request = outcome.expect("acknowledged commit should be ok");
        assert_eq!(
            request
                .get(&TopicPartition::new("my-orders", 2))
                .map(|o| o.next_offset()),
            Some(11)
        );
    }

    #[test]
    fn acknowledgment_without_registered_callback_is_ignored() {
        let context = context();
        // Must not panic; sync commits land here with nothing registered.
        context.commit_callback(Ok(()), &TopicPartitionList::new());
    }

    #[test]
    fn withdraw_returns_most_recent_registration() {
        let context = context();
        context.register_commit_callback(OffsetCommitRequest::default(), Box::new(|_| {}));
        assert!(context.withdraw_commit_callback().is_some());
        assert!(context.withdraw_commit_callback().is_none());
    }
}
