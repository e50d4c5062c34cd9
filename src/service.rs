use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinError;
use tracing::info;

use crate::codec::{I32BeDecoder, Utf8Decoder};
use crate::config::{Config, MAX_BATCH_SIZE, ORDERS_TOPIC, POLL_MAX_WAIT};
use crate::consumer::ConsumeLoop;
use crate::kafka::{ConsumerConfigBuilder, KafkaSource};
use crate::offsets::OffsetTracker;
use crate::processor::RecordLogger;
use crate::rebalance::TrackerRebalanceListener;
use crate::shutdown::{termination_signal, ShutdownCoordinator};
use crate::source::GroupTopicSource;

/// Wires the order consumer together and runs it until a termination
/// request or a fatal retrieval failure.
pub struct OrderConsumerService {
    config: Config,
}

impl OrderConsumerService {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(termination_signal()).await
    }

    /// Runs with a caller-supplied termination future standing in for the
    /// process signal handler.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tracker = Arc::new(OffsetTracker::new());
        let listener = Arc::new(TrackerRebalanceListener::new(tracker.clone()));

        let client_config =
            ConsumerConfigBuilder::new(&self.config.bootstrap_servers, &self.config.group_id)
                .for_group_consumer()
                .build();
        let mut source = KafkaSource::new(client_config, Utf8Decoder, I32BeDecoder, MAX_BATCH_SIZE);
        source
            .join(&[ORDERS_TOPIC], listener)
            .context("failed to join consumer group")?;

        let (coordinator, barrier) = ShutdownCoordinator::new();
        let consume_loop = ConsumeLoop::new(
            source,
            RecordLogger,
            tracker,
            coordinator.signal(),
            barrier,
            POLL_MAX_WAIT,
        );
        let mut loop_task = tokio::spawn(consume_loop.run());

        tokio::select! {
            _ = shutdown => {
                info!("termination requested");
                coordinator.initiate().await;
            }
            // The loop satisfies the barrier on its failure path too, so a
            // loop that stops on its own never leaves a coordinator waiting.
            result = &mut loop_task => {
                return flatten_loop_result(result);
            }
        }

        flatten_loop_result(loop_task.await)
    }
}

fn flatten_loop_result(result: Result<Result<()>, JoinError>) -> Result<()> {
    result.context("consume loop task failed")?
}
