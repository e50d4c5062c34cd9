//! The contract between the consume loop and whatever provides records.
//!
//! The loop owns its source exclusively: nothing else calls `poll`,
//! `commit_sync`, or `close` concurrently with it. Rebalance callbacks are
//! serialized with respect to `poll` by the source itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::rebalance::RebalanceListener;
use crate::types::{OffsetCommitRequest, RecordBatch};

/// Group membership could not be established. Fatal at startup.
#[derive(Debug, Error)]
#[error("failed to join consumer group: {reason}")]
pub struct GroupJoinError {
    reason: String,
}

impl GroupJoinError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An offset commit was rejected or never acknowledged.
#[derive(Debug, Clone, Error)]
#[error("offset commit failed: {reason}")]
pub struct CommitError {
    reason: String,
}

impl CommitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Retrieval failed in a way the source could not absorb.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source is closed")]
    Closed,

    #[error("record retrieval failed: {0}")]
    Retrieval(String),
}

/// What an asynchronous commit resolved to: the acknowledged request, or the
/// error that sank it.
pub type CommitOutcome = Result<OffsetCommitRequest, CommitError>;

/// Invoked exactly once per `commit_async` call, on source-managed dispatch.
pub type CommitCallback = Box<dyn FnOnce(CommitOutcome) + Send>;

/// The non-blocking commit capability.
///
/// Split out of [`GroupTopicSource`] so the revocation path can hand the
/// rebalance listener a commit handle without exposing poll or close there.
pub trait OffsetCommitter {
    /// Must not block the caller; `on_complete` fires exactly once.
    fn commit_async(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback);
}

/// A group-coordinated record source: join, poll, commit, close.
///
/// `poll` returning an empty batch is the timeout case, not an error. Fatal
/// retrieval failures surface as [`SourceError`]; transient transport noise
/// is absorbed inside the source.
#[async_trait]
pub trait GroupTopicSource: OffsetCommitter + Send + Sync {
    type Key: Send;
    type Value: Send;

    /// Registers group membership and the rebalance listener. The listener
    /// receives revocation and assignment callbacks until `close`.
    fn join(
        &mut self,
        topics: &[&str],
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), GroupJoinError>;

    /// Blocks up to `max_wait` assembling the next batch. Never returns
    /// partial or corrupt records; the batch is consistent up to the
    /// retrieval point.
    async fn poll(
        &mut self,
        max_wait: Duration,
    ) -> Result<RecordBatch<Self::Key, Self::Value>, SourceError>;

    /// Blocks until the broker acknowledges the offsets or the source's
    /// retry/timeout budget is exhausted.
    async fn commit_sync(&self, offsets: OffsetCommitRequest) -> Result<(), CommitError>;

    /// Releases group membership. Idempotent; a second call is a no-op.
    async fn close(&mut self);

    /// Whether `close` has taken effect.
    fn is_closed(&self) -> bool;
}
