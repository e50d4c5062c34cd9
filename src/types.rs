use std::collections::BTreeMap;
use std::fmt;

use crate::codec::DecodeError;

/// A (topic, partition) pair identifying one partition of a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Broker-assigned record timestamp, distinguishing how it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    NotAvailable,
    CreateTime(i64),
    LogAppendTime(i64),
}

impl Timestamp {
    /// Milliseconds since the epoch, if the broker recorded one.
    pub fn millis(&self) -> Option<i64> {
        match self {
            Timestamp::NotAvailable => None,
            Timestamp::CreateTime(ms) | Timestamp::LogAppendTime(ms) => Some(*ms),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Timestamp::NotAvailable => "NotAvailable",
            Timestamp::CreateTime(_) => "CreateTime",
            Timestamp::LogAppendTime(_) => "LogAppendTime",
        }
    }
}

/// One decoded record as retrieved from the source.
///
/// Key and value are optional: unkeyed records and tombstones are legal on
/// the wire and must not fail retrieval.
#[derive(Debug, Clone)]
pub struct Record<K, V> {
    topic_partition: TopicPartition,
    offset: i64,
    timestamp: Timestamp,
    key: Option<K>,
    value: Option<V>,
}

impl<K, V> Record<K, V> {
    pub fn new(
        topic_partition: TopicPartition,
        offset: i64,
        timestamp: Timestamp,
        key: Option<K>,
        value: Option<V>,
    ) -> Self {
        Self {
            topic_partition,
            offset,
            timestamp,
            key,
            value,
        }
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }
}

/// A record that could not be decoded, reported alongside the records that
/// could. Carries enough position to advance past the bad record.
#[derive(Debug)]
pub struct DecodeFailure {
    topic_partition: TopicPartition,
    offset: i64,
    error: DecodeError,
}

impl DecodeFailure {
    pub fn new(topic_partition: TopicPartition, offset: i64, error: DecodeError) -> Self {
        Self {
            topic_partition,
            offset,
            error,
        }
    }

    pub fn topic_partition(&self) -> &TopicPartition {
        &self.topic_partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn error(&self) -> &DecodeError {
        &self.error
    }
}

/// The result of one retrieval call: decoded records in retrieval order,
/// plus any records from the same window that failed decoding.
#[derive(Debug)]
pub struct RecordBatch<K, V> {
    records: Vec<Record<K, V>>,
    failures: Vec<DecodeFailure>,
}

impl<K, V> RecordBatch<K, V> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            failures: Vec::new(),
        }
    }

    pub fn push_record(&mut self, record: Record<K, V>) {
        self.records.push(record);
    }

    pub fn push_failure(&mut self, failure: DecodeFailure) {
        self.failures.push(failure);
    }

    pub fn records(&self) -> &[Record<K, V>] {
        &self.records
    }

    pub fn failures(&self) -> &[DecodeFailure] {
        &self.failures
    }

    /// Number of records retrieved in this window, decodable or not.
    pub fn len(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.failures.is_empty()
    }
}

impl<K, V> Default for RecordBatch<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Next offset to consume for one partition, with optional commit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetAndMetadata {
    next_offset: i64,
    metadata: Option<String>,
}

impl OffsetAndMetadata {
    pub fn new(next_offset: i64) -> Self {
        Self {
            next_offset,
            metadata: None,
        }
    }

    pub fn with_metadata(next_offset: i64, metadata: impl Into<String>) -> Self {
        Self {
            next_offset,
            metadata: Some(metadata.into()),
        }
    }

    pub fn next_offset(&self) -> i64 {
        self.next_offset
    }

    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }
}

/// An immutable per-partition offset snapshot submitted to a commit call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetCommitRequest {
    offsets: BTreeMap<TopicPartition, OffsetAndMetadata>,
}

impl OffsetCommitRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_offsets(offsets: BTreeMap<TopicPartition, OffsetAndMetadata>) -> Self {
        Self { offsets }
    }

    pub fn get(&self, partition: &TopicPartition) -> Option<&OffsetAndMetadata> {
        self.offsets.get(partition)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TopicPartition, &OffsetAndMetadata)> {
        self.offsets.iter()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
