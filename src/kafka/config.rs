use rdkafka::config::ClientConfig;

/// Builds the `ClientConfig` for a group consumer.
///
/// Only the bootstrap servers and group id vary per deployment; the
/// remaining operational parameters are fixed. Offsets are committed
/// explicitly by the consume loop, so both auto-commit and auto-offset-store
/// stay disabled.
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id);
        Self { config }
    }

    /// Applies the fixed group-consumer parameters: read from the earliest
    /// available offset on first join, explicit commits only, transactional
    /// reads, and range-based partition assignment.
    pub fn for_group_consumer(mut self) -> Self {
        self.config
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("max.poll.interval.ms", "60000")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "20")
            .set("fetch.min.bytes", "1000")
            .set("isolation.level", "read_committed")
            .set("partition.assignment.strategy", "range");
        self
    }

    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_connection_parameters() {
        let config = ConsumerConfigBuilder::new("broker-1:9092,broker-2:9092", "my_group").build();

        assert_eq!(config.get("bootstrap.servers"), Some("broker-1:9092,broker-2:9092"));
        assert_eq!(config.get("group.id"), Some("my_group"));
    }

    #[test]
    fn group_consumer_profile_applies_fixed_parameters() {
        let config = ConsumerConfigBuilder::new("localhost:9092", "my_group")
            .for_group_consumer()
            .build();

        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("max.poll.interval.ms"), Some("60000"));
        assert_eq!(config.get("session.timeout.ms"), Some("30000"));
        assert_eq!(config.get("heartbeat.interval.ms"), Some("20"));
        assert_eq!(config.get("fetch.min.bytes"), Some("1000"));
        assert_eq!(config.get("isolation.level"), Some("read_committed"));
        assert_eq!(config.get("partition.assignment.strategy"), Some("range"));
    }

    #[test]
    fn explicit_set_overrides_profile() {
        let config = ConsumerConfigBuilder::new("localhost:9092", "my_group")
            .for_group_consumer()
            .set("session.timeout.ms", "10000")
            .build();

        assert_eq!(config.get("session.timeout.ms"), Some("10000"));
    }
}
