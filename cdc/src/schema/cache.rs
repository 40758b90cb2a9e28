use std::collections::HashMap;
use std::sync::Arc;

use cdc_postgres::schema::TableId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::schema::TableSchema;

#[derive(Debug, Default)]
struct Inner {
    table_schemas: HashMap<TableId, Arc<TableSchema>>,
}

/// Shared store of the current [`TableSchema`] of every known table.
///
/// Entries are replaced as a whole when a table changes, so readers holding an `Arc` keep a
/// consistent view of the version they started with.
#[derive(Debug, Clone, Default)]
pub struct TableSchemaCache {
    inner: Arc<RwLock<Inner>>,
}

impl TableSchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `table_schema`, replacing the previous schema of the same table.
    ///
    /// Fails with [`ErrorKind::DuplicateSchemaName`] if another table already uses the same
    /// value schema name.
    pub async fn insert(&self, table_schema: TableSchema) -> CdcResult<Arc<TableSchema>> {
        let mut inner = self.inner.write().await;

        let name = table_schema.value_schema().name();
        if let Some(other) = inner.table_schemas.values().find(|other| {
            other.table_id() != table_schema.table_id() && other.value_schema().name() == name
        }) {
            bail!(
                ErrorKind::DuplicateSchemaName,
                "Schema name is used by another table",
                format!(
                    "tables {} and {} both produce schema '{}'",
                    other.table_id(),
                    table_schema.table_id(),
                    name.unwrap_or_default()
                )
            );
        }

        let table_schema = Arc::new(table_schema);
        let previous = inner
            .table_schemas
            .insert(table_schema.table_id().clone(), table_schema.clone());
        debug!(
            table_id = %table_schema.table_id(),
            replaced = previous.is_some(),
            "cached table schema"
        );

        Ok(table_schema)
    }

    /// Returns the schema of `table_id`, failing with [`ErrorKind::MissingTableSchema`] when the
    /// table is unknown.
    pub async fn get(&self, table_id: &TableId) -> CdcResult<Arc<TableSchema>> {
        let inner = self.inner.read().await;
        match inner.table_schemas.get(table_id) {
            Some(table_schema) => Ok(table_schema.clone()),
            None => bail!(
                ErrorKind::MissingTableSchema,
                "No schema for table",
                format!("table {table_id} has not been registered")
            ),
        }
    }

    pub async fn contains(&self, table_id: &TableId) -> bool {
        self.inner.read().await.table_schemas.contains_key(table_id)
    }

    pub async fn remove(&self, table_id: &TableId) -> Option<Arc<TableSchema>> {
        self.inner.write().await.table_schemas.remove(table_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.table_schemas.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use cdc_postgres::schema::{Column, Table};
    use cdc_postgres::types::JdbcType;

    use super::*;
    use crate::conversions::JdbcValueConverters;
    use crate::schema::{SchemaNameValidator, TableSchemaBuilder};
    use crate::topic::ByTableTopicMapper;

    fn build(table_id: TableId, columns: &[&str]) -> TableSchema {
        let table = Table::editor()
            .table_id(table_id)
            .add_columns(columns.iter().map(|name| {
                Column::editor()
                    .name(*name)
                    .jdbc_type(JdbcType::Integer)
                    .create()
                    .unwrap()
            }))
            .create()
            .unwrap();

        TableSchemaBuilder::new(
            Arc::new(JdbcValueConverters),
            SchemaNameValidator::permissive(),
            Arc::new(ByTableTopicMapper::default()),
        )
        .create("", &table)
        .unwrap()
    }

    #[tokio::test]
    async fn unknown_table_is_reported() {
        let cache = TableSchemaCache::new();
        let err = cache
            .get(&TableId::new("", "public", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTableSchema);
    }

    #[tokio::test]
    async fn insert_replaces_previous_version() {
        let cache = TableSchemaCache::new();
        let id = TableId::new("", "public", "orders");

        cache.insert(build(id.clone(), &["id"])).await.unwrap();
        let old = cache.get(&id).await.unwrap();

        cache.insert(build(id.clone(), &["id", "total"])).await.unwrap();
        let new = cache.get(&id).await.unwrap();

        assert_eq!(old.value_schema().fields().len(), 1);
        assert_eq!(new.value_schema().fields().len(), 2);
        assert_eq!(cache.len().await, 1);

        assert!(cache.remove(&id).await.is_some());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn schema_names_are_unique_across_tables() {
        let cache = TableSchemaCache::new();
        cache
            .insert(build(TableId::new("", "public", "my-table"), &["id"]))
            .await
            .unwrap();

        // Both ids sanitize to `public.my_table.Value`.
        let err = cache
            .insert(build(TableId::new("", "public", "my_table"), &["id"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateSchemaName);
    }
}
