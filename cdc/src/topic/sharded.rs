use std::collections::BTreeMap;

use cdc_postgres::schema::Table;
use regex::Regex;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::record::{Schema, SchemaBuilder, Value};
use crate::topic::TopicMapper;

const TABLE_NAME_FIELD: &str = "tableName";
const REPLICA_SET_FIELD: &str = "replicaSet";

/// Routes all tables of a sharded catalog family to one topic named after the catalog.
///
/// The first capture group of the pattern is the topic, so with `^(.+)_\d+$` the catalogs
/// `shop_1` and `shop_2` both map to `shop`. Catalogs that do not match are used unchanged.
///
/// Since tables and shards share the topic, keys carry `tableName` and `replicaSet` next to the
/// primary key fields.
#[derive(Debug, Clone)]
pub struct ByShardedCatalogTopicMapper {
    pattern: Regex,
}

impl ByShardedCatalogTopicMapper {
    pub fn new(pattern: &str) -> CdcResult<Self> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            bail!(
                ErrorKind::ConfigError,
                "Shard pattern has no capture group",
                format!("pattern '{pattern}' must capture the topic name")
            );
        }

        Ok(Self { pattern })
    }
}

impl TopicMapper for ByShardedCatalogTopicMapper {
    fn topic_name(&self, table: &Table) -> String {
        let catalog = table.id().catalog();
        self.pattern
            .captures(catalog)
            .and_then(|captures| captures.get(1))
            .map_or(catalog, |group| group.as_str())
            .to_owned()
    }

    fn enhance_key_schema(&self, _table: &Table, key_schema: &mut SchemaBuilder) {
        key_schema.add_field(TABLE_NAME_FIELD, SchemaBuilder::string().build());
        key_schema.add_field(REPLICA_SET_FIELD, SchemaBuilder::string().build());
    }

    fn non_row_fields_to_add_to_key(
        &self,
        table: &Table,
        _key_schema: &Schema,
    ) -> BTreeMap<String, Value> {
        BTreeMap::from([
            (
                TABLE_NAME_FIELD.to_owned(),
                Value::String(table.id().table().to_owned()),
            ),
            (
                REPLICA_SET_FIELD.to_owned(),
                Value::String(table.id().catalog().to_owned()),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use cdc_config::shared::DEFAULT_SHARD_PATTERN;
    use cdc_postgres::schema::TableId;

    use super::*;

    fn table(catalog: &str) -> Table {
        Table::editor()
            .table_id(TableId::new(catalog, "public", "orders"))
            .create()
            .unwrap()
    }

    #[test]
    fn shard_suffix_is_stripped() {
        let mapper = ByShardedCatalogTopicMapper::new(DEFAULT_SHARD_PATTERN).unwrap();
        assert_eq!(mapper.topic_name(&table("etsy_shard_042")), "etsy_shard");
        assert_eq!(mapper.topic_name(&table("inventory")), "inventory");
        assert_eq!(mapper.topic_name(&table("inventory_")), "inventory_");
    }

    #[test]
    fn custom_pattern_selects_first_group() {
        let mapper = ByShardedCatalogTopicMapper::new(r"^(etsy_.*)_\d+$").unwrap();
        assert_eq!(mapper.topic_name(&table("etsy_index_3")), "etsy_index");
        assert_eq!(mapper.topic_name(&table("shop_3")), "shop_3");
    }

    #[test]
    fn pattern_without_group_is_rejected() {
        let err = ByShardedCatalogTopicMapper::new(r"^.+_\d+$").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn key_is_enhanced_with_table_and_replica_set() {
        let mapper = ByShardedCatalogTopicMapper::new(DEFAULT_SHARD_PATTERN).unwrap();
        let table = table("shop_7");

        let mut builder = SchemaBuilder::struct_().field("id", SchemaBuilder::int32().build());
        mapper.enhance_key_schema(&table, &mut builder);
        let schema = builder.build();

        let names: Vec<_> = schema.fields().iter().map(|field| field.name()).collect();
        assert_eq!(names, ["id", "tableName", "replicaSet"]);
        assert!(!schema.field("tableName").unwrap().schema().is_optional());

        let extra = mapper.non_row_fields_to_add_to_key(&table, &schema);
        assert_eq!(extra["tableName"], Value::String("orders".to_string()));
        assert_eq!(extra["replicaSet"], Value::String("shop_7".to_string()));
    }
}
