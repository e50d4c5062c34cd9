use anyhow::{Context, Result};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use order_consumer::config::Config;
use order_consumer::service::OrderConsumerService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;

    // stdout logging with a level configured by the RUST_LOG envvar (default=INFO)
    let log_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .boxed();
    tracing_subscriber::registry().with(log_layer).init();

    info!(
        bootstrap_servers = %config.bootstrap_servers,
        group_id = %config.group_id,
        "starting order consumer"
    );

    OrderConsumerService::new(config).run().await
}
