//! Routing of tables to destination topics.

use std::collections::BTreeMap;
use std::sync::Arc;

use cdc_config::shared::{TopicConfig, TopicMapperConfig};
use cdc_postgres::schema::Table;

use crate::error::CdcResult;
use crate::record::{Schema, SchemaBuilder, Value};

mod by_table;
mod sharded;

pub use by_table::ByTableTopicMapper;
pub use sharded::ByShardedCatalogTopicMapper;

/// Decides the destination topic of a table's records and how their keys stay unique within it.
///
/// When several tables share a topic, primary keys alone no longer identify a row, so a mapper
/// may add fields to the key schema and supply their values.
pub trait TopicMapper: Send + Sync {
    fn topic_name(&self, table: &Table) -> String;

    /// Appends extra fields to the key schema of `table`. They follow the primary key fields.
    fn enhance_key_schema(&self, _table: &Table, _key_schema: &mut SchemaBuilder) {}

    /// Values of the fields added by [`TopicMapper::enhance_key_schema`], by field name.
    fn non_row_fields_to_add_to_key(
        &self,
        _table: &Table,
        _key_schema: &Schema,
    ) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }
}

/// Builds the topic mapper selected by `config`.
pub fn from_config(config: &TopicConfig) -> CdcResult<Arc<dyn TopicMapper>> {
    let mapper: Arc<dyn TopicMapper> = match &config.mapper {
        TopicMapperConfig::ByTable => Arc::new(ByTableTopicMapper::new(config.prefix.clone())),
        mapper @ TopicMapperConfig::ByShardedCatalog { .. } => {
            let pattern = mapper
                .shard_pattern()
                .unwrap_or(cdc_config::shared::DEFAULT_SHARD_PATTERN);
            Arc::new(ByShardedCatalogTopicMapper::new(pattern)?)
        }
    };

    Ok(mapper)
}

#[cfg(test)]
mod tests {
    use cdc_postgres::schema::TableId;

    use super::*;
    use crate::error::ErrorKind;

    fn table() -> Table {
        Table::editor()
            .table_id(TableId::new("shop_12", "public", "orders"))
            .create()
            .unwrap()
    }

    #[test]
    fn default_config_routes_by_table() {
        let config = TopicConfig {
            prefix: "server1".to_string(),
            ..Default::default()
        };
        let mapper = from_config(&config).unwrap();
        assert_eq!(mapper.topic_name(&table()), "server1.shop_12.public.orders");
    }

    #[test]
    fn sharded_config_uses_default_pattern() {
        let config = TopicConfig {
            prefix: "server1".to_string(),
            mapper: TopicMapperConfig::ByShardedCatalog { pattern: None },
        };
        let mapper = from_config(&config).unwrap();
        assert_eq!(mapper.topic_name(&table()), "shop");
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let config = TopicConfig {
            prefix: String::new(),
            mapper: TopicMapperConfig::ByShardedCatalog {
                pattern: Some("(unclosed".to_string()),
            },
        };
        let err = from_config(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
