//! The poll-process-commit loop.
//!
//! Lifecycle: RUNNING until the shutdown signal is observed at the top of
//! an iteration, then DRAINING (final synchronous commit, source close),
//! then STOPPED with the completion barrier satisfied. The barrier is
//! completed on every exit path, including fatal retrieval errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::offsets::OffsetTracker;
use crate::processor::RecordProcessor;
use crate::shutdown::{CompletionBarrier, ShutdownSignal};
use crate::source::{CommitOutcome, GroupTopicSource};
use crate::types::RecordBatch;

pub struct ConsumeLoop<S, P> {
    source: S,
    processor: P,
    tracker: Arc<OffsetTracker>,
    shutdown: ShutdownSignal,
    barrier: CompletionBarrier,
    max_wait: Duration,
}

impl<S, P> ConsumeLoop<S, P>
where
    S: GroupTopicSource,
    P: RecordProcessor<S::Key, S::Value>,
{
    pub fn new(
        source: S,
        processor: P,
        tracker: Arc<OffsetTracker>,
        shutdown: ShutdownSignal,
        barrier: CompletionBarrier,
        max_wait: Duration,
    ) -> Self {
        Self {
            source,
            processor,
            tracker,
            shutdown,
            barrier,
            max_wait,
        }
    }

    /// Runs to completion. Returns only after the drain has finished and
    /// the barrier is satisfied; an `Err` means record retrieval failed
    /// fatally while running, after which the drain still took place.
    pub async fn run(mut self) -> Result<()> {
        info!(max_wait_ms = self.max_wait.as_millis() as u64, "consume loop started");

        let outcome = self.consume_until_shutdown().await;
        if let Err(e) = &outcome {
            error!(error = format!("{e:#}"), "consume loop failed, draining before exit");
        }

        self.drain().await;
        self.barrier.complete();
        outcome
    }

    async fn consume_until_shutdown(&mut self) -> Result<()> {
        while !self.shutdown.is_requested() {
            let batch = self.source.poll(self.max_wait).await?;

            // Timed-out poll: no progress, so no commit either.
            if batch.is_empty() {
                continue;
            }

            debug!(
                records = batch.records().len(),
                failures = batch.failures().len(),
                "batch retrieved"
            );
            self.process_batch(&batch).await;

            self.source
                .commit_async(self.tracker.commit_request(), Box::new(log_commit_outcome));
        }

        info!("shutdown signal observed");
        Ok(())
    }

    /// Handles the whole batch before the next signal check: failures are
    /// skipped past, records are processed strictly in batch order, and
    /// every offset advances whether or not its record was usable.
    async fn process_batch(&self, batch: &RecordBatch<S::Key, S::Value>) {
        for failure in batch.failures() {
            warn!(
                partition = %failure.topic_partition(),
                offset = failure.offset(),
                error = %failure.error(),
                "skipping undecodable record"
            );
            self.tracker
                .mark_processed(failure.topic_partition(), failure.offset() + 1);
        }

        for record in batch.records() {
            if let Err(e) = self.processor.process(record).await {
                error!(
                    partition = %record.topic_partition(),
                    offset = record.offset(),
                    error = format!("{e:#}"),
                    "record processing failed, skipping"
                );
            }
            self.tracker
                .mark_processed(record.topic_partition(), record.offset() + 1);
        }
    }

    async fn drain(&mut self) {
        info!("shutting down, committing final offsets");

        let request = self.tracker.commit_request();
        if let Err(e) = self.source.commit_sync(request).await {
            // Surfaced but not propagated: blocking exit on a broker-side
            // issue would be its own liveness failure, and at-least-once
            // delivery already covers the reprocessing.
            error!(error = %e, "final offset commit failed");
        }

        self.source.close().await;
        info!(closed = self.source.is_closed(), "consumer group membership released");
    }
}

fn log_commit_outcome(outcome: CommitOutcome) {
    match outcome {
        Ok(request) => {
            for (partition, offset) in request.iter() {
                debug!(
                    partition = %partition,
                    next_offset = offset.next_offset(),
                    "offsets committed"
                );
            }
        }
        Err(e) => {
            // The next iteration's commit carries the latest offsets and
            // supersedes this one, so there is no inline retry.
            warn!(error = %e, "async offset commit failed");
        }
    }
}
