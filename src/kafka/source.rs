use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::codec::Decoder;
use crate::rebalance::RebalanceListener;
use crate::source::{
    CommitCallback, CommitError, GroupJoinError, GroupTopicSource, OffsetCommitter, SourceError,
};
use crate::types::{DecodeFailure, OffsetCommitRequest, Record, RecordBatch, TopicPartition};

use super::context::{submit_async_commit, SourceContext};
use super::to_partition_list;

/// [`GroupTopicSource`] over an rdkafka `StreamConsumer`.
///
/// Built unjoined; `join` creates the consumer with a listener-bearing
/// context and subscribes it. Key and value bytes pass through the decoders,
/// with per-record failures reported inside the batch rather than failing
/// the poll.
pub struct KafkaSource<KD, VD> {
    client_config: ClientConfig,
    consumer: Option<StreamConsumer<SourceContext>>,
    key_decoder: KD,
    value_decoder: VD,
    max_batch_size: usize,
    closed: bool,
}

impl<KD, VD> KafkaSource<KD, VD>
where
    KD: Decoder,
    VD: Decoder,
{
    pub fn new(
        client_config: ClientConfig,
        key_decoder: KD,
        value_decoder: VD,
        max_batch_size: usize,
    ) -> Self {
        Self {
            client_config,
            consumer: None,
            key_decoder,
            value_decoder,
            max_batch_size,
            closed: false,
        }
    }
}

#[async_trait]
impl<KD, VD> GroupTopicSource for KafkaSource<KD, VD>
where
    KD: Decoder,
    VD: Decoder,
    KD::Output: Send,
    VD::Output: Send,
{
    type Key = KD::Output;
    type Value = VD::Output;

    fn join(
        &mut self,
        topics: &[&str],
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<(), GroupJoinError> {
        if self.closed {
            return Err(GroupJoinError::new("source is closed"));
        }
        if self.consumer.is_some() {
            return Err(GroupJoinError::new("group already joined"));
        }

        let context = SourceContext::new(listener);
        let consumer: StreamConsumer<SourceContext> = self
            .client_config
            .create_with_context(context)
            .map_err(|e| GroupJoinError::new(e.to_string()))?;
        consumer
            .subscribe(topics)
            .map_err(|e| GroupJoinError::new(e.to_string()))?;

        info!(topics = topics.join(", "), "consumer group joined");
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn poll(
        &mut self,
        max_wait: Duration,
    ) -> Result<RecordBatch<Self::Key, Self::Value>, SourceError> {
        let consumer = self.consumer.as_ref().ok_or(SourceError::Closed)?;
        let deadline = Instant::now() + max_wait;
        let mut batch = RecordBatch::with_capacity(self.max_batch_size);
        let mut error_streak: u64 = 0;

        while batch.len() < self.max_batch_size {
            let received = tokio::select! {
                received = consumer.recv() => received,
                _ = sleep_until(deadline) => break,
            };

            match received {
                Ok(message) => {
                    error_streak = 0;
                    append_message(&mut batch, &self.key_decoder, &self.value_decoder, &message);
                }
                Err(e) => {
                    error_streak += 1;
                    match classify_transport_error(&e, error_streak) {
                        ErrorDisposition::Fatal => {
                            return Err(SourceError::Retrieval(e.to_string()));
                        }
                        ErrorDisposition::Retry(backoff) => {
                            tokio::select! {
                                _ = sleep(backoff) => {}
                                _ = sleep_until(deadline) => break,
                            }
                        }
                    }
                }
            }
        }

        Ok(batch)
    }

    async fn commit_sync(&self, offsets: OffsetCommitRequest) -> Result<(), CommitError> {
        let Some(consumer) = self.consumer.as_ref() else {
            return Err(CommitError::new("source is closed"));
        };
        if offsets.is_empty() {
            return Ok(());
        }

        let list = to_partition_list(&offsets).map_err(|e| CommitError::new(e.to_string()))?;
        consumer
            .commit(&list, CommitMode::Sync)
            .map_err(|e| CommitError::new(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            // Dropping the handle leaves the group and releases the
            // transport's resources.
            consumer.unsubscribe();
        }
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<KD, VD> OffsetCommitter for KafkaSource<KD, VD>
where
    KD: Decoder,
    VD: Decoder,
{
    fn commit_async(&self, offsets: OffsetCommitRequest, on_complete: CommitCallback) {
        let Some(consumer) = self.consumer.as_ref() else {
            on_complete(Err(CommitError::new("source is closed")));
            return;
        };
        submit_async_commit(consumer, consumer.context(), offsets, on_complete);
    }
}

fn append_message<KD, VD>(
    batch: &mut RecordBatch<KD::Output, VD::Output>,
    key_decoder: &KD,
    value_decoder: &VD,
    message: &BorrowedMessage<'_>,
) where
    KD: Decoder,
    VD: Decoder,
{
    let partition = TopicPartition::new(message.topic(), message.partition());

    let key = match message
        .key()
        .map(|bytes| key_decoder.decode(bytes))
        .transpose()
    {
        Ok(key) => key,
        Err(e) => {
            batch.push_failure(DecodeFailure::new(partition, message.offset(), e));
            return;
        }
    };
    let value = match message
        .payload()
        .map(|bytes| value_decoder.decode(bytes))
        .transpose()
    {
        Ok(value) => value,
        Err(e) => {
            batch.push_failure(DecodeFailure::new(partition, message.offset(), e));
            return;
        }
    };

    batch.push_record(Record::new(
        partition,
        message.offset(),
        message.timestamp().into(),
        key,
        value,
    ));
}

#[derive(Debug, PartialEq, Eq)]
enum ErrorDisposition {
    /// Transient; wait out the backoff and keep receiving.
    Retry(Duration),
    /// Retrieval cannot continue on this consumer.
    Fatal,
}

/// Sorts transport errors into transient noise absorbed inside the poll
/// window and fatal conditions handed back to the loop. Backoffs grow with
/// the current error streak, bounded per error class.
fn classify_transport_error(error: &KafkaError, streak: u64) -> ErrorDisposition {
    match error {
        KafkaError::MessageConsumption(code) => match code {
            RDKafkaErrorCode::PartitionEOF => {
                debug!("reached end of partition");
                ErrorDisposition::Retry(Duration::ZERO)
            }
            RDKafkaErrorCode::OperationTimedOut => {
                debug!("consumer operation timed out");
                ErrorDisposition::Retry(Duration::ZERO)
            }
            RDKafkaErrorCode::OffsetOutOfRange => {
                // auto.offset.reset seeks back to the earliest offset in
                // coordination with the broker.
                warn!("offset out of range, waiting for reset");
                ErrorDisposition::Retry(Duration::from_millis(500))
            }
            code => {
                warn!(code = ?code, "consumer error, retrying");
                ErrorDisposition::Retry(Duration::from_millis(100 * streak.min(10)))
            }
        },

        KafkaError::MessageConsumptionFatal(code) => {
            error!(code = ?code, "fatal consumer error");
            ErrorDisposition::Fatal
        }

        // Connection issues
        KafkaError::Global(code) => match code {
            RDKafkaErrorCode::AllBrokersDown => {
                warn!("all brokers down, waiting for reconnect");
                ErrorDisposition::Retry(Duration::from_secs(streak.min(5)))
            }
            RDKafkaErrorCode::BrokerTransportFailure => {
                warn!("broker transport failure, waiting for reconnect");
                ErrorDisposition::Retry(Duration::from_secs(streak.min(3)))
            }
            RDKafkaErrorCode::Authentication => {
                error!("authentication failed");
                ErrorDisposition::Fatal
            }
            code => {
                warn!(code = ?code, "transport error, retrying");
                ErrorDisposition::Retry(Duration::from_millis(500 * streak.min(6)))
            }
        },

        KafkaError::Canceled => {
            info!("consumer receive canceled");
            ErrorDisposition::Fatal
        }

        error => {
            error!(error = ?error, "unexpected consumer error");
            ErrorDisposition::Fatal
        }
    }
}
