//! Destinations for the records produced by the schema layer.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::CdcResult;
use crate::record::SourceRecord;

/// Receives batches of change records in the order they were produced.
pub trait RecordSink {
    fn write_records(
        &self,
        records: Vec<SourceRecord>,
    ) -> impl Future<Output = CdcResult<()>> + Send;
}

/// A sink keeping every record in memory, useful for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<SourceRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the records written so far.
    pub async fn records(&self) -> Vec<SourceRecord> {
        self.records.lock().await.clone()
    }

    /// Returns the records written so far to `topic`.
    pub async fn records_for_topic(&self, topic: &str) -> Vec<SourceRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}

impl RecordSink for MemorySink {
    async fn write_records(&self, records: Vec<SourceRecord>) -> CdcResult<()> {
        let mut stored = self.records.lock().await;
        info!("writing a batch of {} records", records.len());
        for record in &records {
            debug!(topic = %record.topic, lsn = %record.lsn, "  {:?}", record.value);
        }
        stored.extend(records);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cdc_postgres::lsn::Lsn;

    use super::*;
    use crate::conversions::{Datum, PostgresValueConverters};
    use crate::schema::{SchemaNameValidator, TableSchemaBuilder};
    use crate::test_utils::table::customers_table;
    use crate::topic::ByTableTopicMapper;

    #[tokio::test]
    async fn memory_sink_keeps_records_in_order() {
        let schema = TableSchemaBuilder::new(
            Arc::new(PostgresValueConverters::new()),
            SchemaNameValidator::strict(),
            Arc::new(ByTableTopicMapper::new("server1")),
        )
        .create("server1", &customers_table())
            .unwrap();
        let first = schema
            .source_record(
                Lsn::new(10),
                &[Datum::I32(1), Datum::String("alice".to_owned())],
            )
            .unwrap();
        let second = schema
            .source_record(
                Lsn::new(20),
                &[Datum::I32(2), Datum::String("bob".to_owned())],
            )
            .unwrap();

        let sink = MemorySink::new();
        sink.write_records(vec![first]).await.unwrap();
        sink.write_records(vec![second]).await.unwrap();

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lsn, Lsn::new(10));
        assert_eq!(records[1].lsn, Lsn::new(20));
        assert_eq!(
            sink.records_for_topic("server1.public.customers").await.len(),
            2
        );
        assert!(sink.records_for_topic("other").await.is_empty());

        sink.clear().await;
        assert!(sink.records().await.is_empty());
    }
}
