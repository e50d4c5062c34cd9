//! Scripted and recording doubles for exercising the consume loop without a
//! broker.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::processor::RecordProcessor;
use crate::rebalance::RebalanceListener;
use crate::source::{
    CommitCallback, CommitError, GroupJoinError, GroupTopicSource, OffsetCommitter, SourceError,
};
use crate::types::{
    DecodeFailure, OffsetCommitRequest, Record, RecordBatch, Timestamp, TopicPartition,
};

/// One observable call made against a [`ScriptedSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceCall {
    Join(Vec<String>),
    Poll,
    CommitAsync(OffsetCommitRequest),
    CommitSync(OffsetCommitRequest),
    Close,
}

/// Shared journal of source calls plus the offsets that were accepted, in
/// the role a broker would play.
#[derive(Default)]
pub struct SourceLog {
    calls: Mutex<Vec<SourceCall>>,
    committed: Mutex<BTreeMap<TopicPartition, i64>>,
}

impl SourceLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, call: SourceCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn accept_offsets(&self, request: &OffsetCommitRequest) {
        let mut committed = self.committed.lock().unwrap();
        for (partition, offset) in request.iter() {
            committed.insert(partition.clone(), offset.next_offset());
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Poll))
    }

    pub fn close_count(&self) -> usize {
        self.count(|call| matches!(call, SourceCall::Close))
    }

    pub fn async_commits(&self) -> Vec<OffsetCommitRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                SourceCall::CommitAsync(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sync_commits(&self) -> Vec<OffsetCommitRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                SourceCall::CommitSync(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// The offset the "broker" holds for a partition after all accepted
    /// commits.
    pub fn committed_offset(&self, partition: &TopicPartition) -> Option<i64> {
        self.committed.lock().unwrap().get(partition).copied()
    }

    fn count(&self, matches: impl Fn(&SourceCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }
}

/// What one scripted poll yields.
pub enum ScriptedPoll {
    /// A batch of records and/or decode failures.
    Batch(RecordBatch<String, i32>),
    /// A timed-out poll.
    Empty,
    /// A timed-out poll, with a side effect run first (arming a shutdown
    /// signal, revoking a partition).
    EmptyThen(Box<dyn FnOnce() + Send>),
    /// Fatal retrieval failure.
    Fail(String),
}

/// [`GroupTopicSource`] driven by a prearranged script.
///
/// Polls consume the script front to back; an exhausted script keeps
/// yielding empty batches. Commit outcomes default to success unless queued
/// otherwise. All calls land in the shared [`SourceLog`].
pub struct ScriptedSource {
    script: Mutex<VecDeque<ScriptedPoll>>,
    async_outcomes: Mutex<VecDeque<Result<(), CommitError>>>,
    sync_outcomes: Mutex<VecDeque<Result<(), CommitError>>>,
    listener: Mutex<Option<Arc<dyn RebalanceListener>>>,
    log: Arc<SourceLog>,
    closed: AtomicBool,
}

impl ScriptedSource {
    pub fn new(log: Arc<SourceLog>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            async_outcomes: Mutex::new(VecDeque::new()),
            sync_outcomes: Mutex::new(VecDeque::new()),
            listener: Mutex::new(None),
            log,
            closed: AtomicBool::new(false),
        }
    }

    pub fn push_poll(&self, poll: ScriptedPoll) {
        self.script.lock().unwrap().push_back(poll);
    }

    /// Queues the outcome for the next `commit_async` call.
    pub fn push_async_outcome(&self, outcome: Result<(), CommitError>) {
        self.async_outcomes.lock().unwrap().push_back(outcome);
    }

    /// Queues the outcome for the next `commit_sync` call.
    pub fn push_sync_outcome(&self, outcome: Result<(), CommitError>) {
        self.sync_outcomes.lock().unwrap().push_back(outcome);
    }

    /// The listener registered at join time, for driving rebalances by hand.
    pub fn listener(&self) -> Option<Arc<dyn RebalanceListener>> {
        self.listener.lock().unwrap().clone()
    }
}

impl OffsetCommitter for ScriptedSource {
    fn commit_async(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback) {
        self.log.record(SourceCall::CommitAsync(offsets.clone()));
        let outcome = self
            .async_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        match outcome {
            Ok(()) => {
                self.log.accept_offsets(&offsets);
                on_complete(Ok(offsets));
            }
            Err(e) => on_complete(Err(e)),
        }
    }
}

#[async_trait]
impl GroupTopicSource for ScriptedSource {
    type Key = String;
    type Value = i32;

    fn join(
        &mut self,
        topics: &[&str],
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), GroupJoinError> {
        self.log.record(SourceCall::Join(
            topics.iter().map(|t| t.to_string()).collect(),
        ));
        *self.listener.lock().unwrap() = Some(listener);
        Ok(())
    }

    async fn poll(
        &mut self,
        _max_wait: Duration,
    ) -> Result<RecordBatch<Self::Key, Self::Value>, SourceError> {
        self.log.record(SourceCall::Poll);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedPoll::Batch(batch)) => Ok(batch),
            Some(ScriptedPoll::Empty) | None => Ok(RecordBatch::new()),
            Some(ScriptedPoll::EmptyThen(side_effect)) => {
                side_effect();
                Ok(RecordBatch::new())
            }
            Some(ScriptedPoll::Fail(reason)) => Err(SourceError::Retrieval(reason)),
        }
    }

    async fn commit_sync(&self, offsets: OffsetCommitRequest) -> Result<(), CommitError> {
        self.log.record(SourceCall::CommitSync(offsets.clone()));
        let outcome = self
            .sync_outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        if outcome.is_ok() {
            self.log.accept_offsets(&offsets);
        }
        outcome
    }

    async fn close(&mut self) {
        self.log.record(SourceCall::Close);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Processor that journals every record it sees; offsets listed as failing
/// return an error from `process`.
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    seen: Arc<Mutex<Vec<(TopicPartition, i64)>>>,
    failing: Arc<Mutex<HashSet<(TopicPartition, i64)>>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, partition: TopicPartition, offset: i64) {
        self.failing.lock().unwrap().insert((partition, offset));
    }

    pub fn seen(&self) -> Vec<(TopicPartition, i64)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordProcessor<String, i32> for RecordingProcessor {
    async fn process(&self, record: &Record<String, i32>) -> anyhow::Result<()> {
        let position = (record.topic_partition().clone(), record.offset());
        self.seen.lock().unwrap().push(position.clone());
        if self.failing.lock().unwrap().contains(&position) {
            return Err(anyhow!("scripted processing failure"));
        }
        Ok(())
    }
}

/// A record on the orders topic with a generated key and the offset as its
/// value.
pub fn order_record(partition: i32, offset: i64) -> Record<String, i32> {
    Record::new(
        TopicPartition::new(crate::config::ORDERS_TOPIC, partition),
        offset,
        Timestamp::CreateTime(1_724_000_000_000 + offset),
        Some(format!("order-{offset}")),
        Some(offset as i32),
    )
}

pub fn batch_of(records: Vec<Record<String, i32>>) -> RecordBatch<String, i32> {
    let mut batch = RecordBatch::new();
    for record in records {
        batch.push_record(record);
    }
    batch
}

pub fn batch_with_failures(
    records: Vec<Record<String, i32>>,
    failures: Vec<DecodeFailure>,
) -> RecordBatch<String, i32> {
    let mut batch = batch_of(records);
    for failure in failures {
        batch.push_failure(failure);
    }
    batch
}
