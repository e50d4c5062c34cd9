//! rdkafka-backed realization of the group topic source.

pub mod config;
pub mod context;
pub mod source;

use std::collections::BTreeMap;

use rdkafka::error::KafkaResult;
use rdkafka::{Offset, TopicPartitionList};

use crate::types::{OffsetAndMetadata, OffsetCommitRequest, Timestamp, TopicPartition};

pub use config::ConsumerConfigBuilder;
pub use source::KafkaSource;

impl From<rdkafka::Timestamp> for Timestamp {
    fn from(timestamp: rdkafka::Timestamp) -> Self {
        match timestamp {
            rdkafka::Timestamp::NotAvailable => Timestamp::NotAvailable,
            rdkafka::Timestamp::CreateTime(ms) => Timestamp::CreateTime(ms),
            rdkafka::Timestamp::LogAppendTime(ms) => Timestamp::LogAppendTime(ms),
        }
    }
}

/// Renders a commit request as the transport's partition list. The offsets
/// are next-to-consume positions, which is what the commit protocol expects.
pub(crate) fn to_partition_list(request: &OffsetCommitRequest) -> KafkaResult<TopicPartitionList> {
    let mut list = TopicPartitionList::new();
    for (partition, offset) in request.iter() {
        list.add_partition_offset(
            partition.topic(),
            partition.partition(),
            Offset::Offset(offset.next_offset()),
        )?;
    }
    Ok(list)
}

/// Rebuilds the domain commit request from an acknowledged partition list.
pub(crate) fn request_from_list(list: &TopicPartitionList) -> OffsetCommitRequest {
    let mut offsets = BTreeMap::new();
    for elem in list.elements() {
        if let Offset::Offset(next_offset) = elem.offset() {
            offsets.insert(
                TopicPartition::new(elem.topic(), elem.partition()),
                OffsetAndMetadata::new(next_offset),
            );
        }
    }
    OffsetCommitRequest::from_offsets(offsets)
}

pub(crate) fn partitions_from_list(list: &TopicPartitionList) -> Vec<TopicPartition> {
    list.elements()
        .into_iter()
        .map(|elem| TopicPartition::new(elem.topic(), elem.partition()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_request_survives_partition_list_conversion() {
        let mut offsets = BTreeMap::new();
        offsets.insert(
            TopicPartition::new("my-orders", 0),
            OffsetAndMetadata::new(7),
        );
        offsets.insert(
            TopicPartition::new("my-orders", 3),
            OffsetAndMetadata::new(42),
        );
        let request = OffsetCommitRequest::from_offsets(offsets);

        let list = to_partition_list(&request).expect("partition list should build");
        assert_eq!(list.count(), 2);
        assert_eq!(request_from_list(&list), request);
    }

    #[test]
    fn partitions_from_list_keeps_topic_and_partition() {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset("my-orders", 1, Offset::Offset(10))
            .unwrap();
        list.add_partition_offset("my-orders", 4, Offset::Offset(3))
            .unwrap();

        assert_eq!(
            partitions_from_list(&list),
            vec![
                TopicPartition::new("my-orders", 1),
                TopicPartition::new("my-orders", 4),
            ]
        );
    }

    #[test]
    fn transport_timestamps_map_onto_domain_timestamps() {
        assert_eq!(
            Timestamp::from(rdkafka::Timestamp::NotAvailable),
            Timestamp::NotAvailable
        );
        assert_eq!(
            Timestamp::from(rdkafka::Timestamp::CreateTime(1_724_000_000_000)),
            Timestamp::CreateTime(1_724_000_000_000)
        );
        assert_eq!(
            Timestamp::from(rdkafka::Timestamp::LogAppendTime(1_724_000_000_001)),
            Timestamp::LogAppendTime(1_724_000_000_001)
        );
    }
}
