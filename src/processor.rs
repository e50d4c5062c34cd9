//! Per-record processing injected into the consume loop.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::types::Record;

/// Handles one record at a time, in strict batch order. The loop awaits
/// each call before touching the next record, so implementations see
/// per-partition order exactly as retrieved.
#[async_trait]
pub trait RecordProcessor<K, V>: Send + Sync {
    async fn process(&self, record: &Record<K, V>) -> anyhow::Result<()>;
}

/// Emits every field of the record as one structured event.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordLogger;

#[async_trait]
impl<K, V> RecordProcessor<K, V> for RecordLogger
where
    K: fmt::Display + Send + Sync,
    V: fmt::Display + Send + Sync,
{
    async fn process(&self, record: &Record<K, V>) -> anyhow::Result<()> {
        info!(
            offset = record.offset(),
            partition = record.topic_partition().partition(),
            timestamp = record.timestamp().millis(),
            timestamp_kind = record.timestamp().kind(),
            topic = record.topic_partition().topic(),
            key = %display_or_null(record.key()),
            value = %display_or_null(record.value()),
            "record consumed"
        );
        Ok(())
    }
}

fn display_or_null<T: fmt::Display>(field: Option<&T>) -> DisplayOrNull<'_, T> {
    DisplayOrNull(field)
}

struct DisplayOrNull<'a, T>(Option<&'a T>);

impl<T: fmt::Display> fmt::Display for DisplayOrNull<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str("null"),
        }
    }
}
