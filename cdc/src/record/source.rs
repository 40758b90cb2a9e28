use std::sync::Arc;

use cdc_postgres::lsn::Lsn;
use cdc_postgres::schema::TableId;
use serde::{Deserialize, Serialize};

use crate::record::schema::Schema;
use crate::record::value::Struct;

/// Resumable position of a replication session.
///
/// Persist it after the records up to `lsn` have been durably written, and pass `lsn` back to
/// `start_streaming` on restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOffset {
    pub slot_name: String,
    pub plugin_name: String,
    pub lsn: Lsn,
}

/// A keyed, schema-described change record routed to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub topic: String,
    pub table_id: TableId,
    pub lsn: Lsn,
    pub key_schema: Option<Arc<Schema>>,
    pub key: Option<Struct>,
    pub value_schema: Arc<Schema>,
    pub value: Struct,
}
