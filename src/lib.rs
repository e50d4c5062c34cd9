//! A consumer-group client for the `my-orders` topic: joins the group,
//! consumes records in batches, commits progress explicitly, and shuts down
//! without losing the final commit.

pub mod codec;
pub mod config;
pub mod consumer;
pub mod kafka;
pub mod offsets;
pub mod processor;
pub mod rebalance;
pub mod service;
pub mod shutdown;
pub mod source;
pub mod types;

// Used in "mod tests" and the tests/ directory (integration tests)
pub mod test_support;
