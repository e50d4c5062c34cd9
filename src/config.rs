use std::time::Duration;

use envconfig::Envconfig;

/// The single topic this service consumes.
pub const ORDERS_TOPIC: &str = "my-orders";

/// Upper bound on records assembled into one batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Bounded wait for one retrieval call. Also bounds how long a shutdown
/// request can go unobserved.
pub const POLL_MAX_WAIT: Duration = Duration::from_millis(500);

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BOOTSTRAP_SERVERS", default = "localhost:9092")]
    pub bootstrap_servers: String,

    #[envconfig(from = "GROUP_ID", default = "my_group")]
    pub group_id: String,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }
}
