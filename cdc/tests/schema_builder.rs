#![cfg(feature = "test-utils")]

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use cdc::conversions::{Datum, PostgresValueConverters};
use cdc::error::ErrorKind;
use cdc::record::{LogicalType, SchemaType, Value};
use cdc::schema::{SchemaNameValidator, TableSchema, TableSchemaBuilder, TableSchemaCache};
use cdc::test_utils::table::{column, customers_table, four_column_row, four_column_table};
use cdc::topic::{ByShardedCatalogTopicMapper, ByTableTopicMapper, TopicMapper};
use cdc_config::shared::{TopicConfig, TopicMapperConfig};
use cdc_postgres::lsn::Lsn;
use cdc_postgres::schema::{Table, TableId};
use cdc_postgres::types::JdbcType;
use cdc_telemetry::init_test_tracing;

fn builder_with(topic_mapper: Arc<dyn TopicMapper>) -> TableSchemaBuilder {
    TableSchemaBuilder::new(
        Arc::new(PostgresValueConverters::new()),
        SchemaNameValidator::strict(),
        topic_mapper,
    )
}

fn by_table_builder() -> TableSchemaBuilder {
    builder_with(Arc::new(ByTableTopicMapper::new("server1")))
}

fn build(table: &Table) -> TableSchema {
    by_table_builder().create("server1", table).unwrap()
}

#[test]
fn value_schema_follows_column_order_and_types() {
    init_test_tracing();

    let schema = build(&four_column_table());
    let value_schema = schema.value_schema();

    assert_eq!(value_schema.name(), Some("server1.catalog.schema.table.Value"));
    let names: Vec<_> = value_schema.fields().iter().map(|f| f.name()).collect();
    assert_eq!(names, ["C1", "C2", "C3", "C4"]);
    for (index, field) in value_schema.fields().iter().enumerate() {
        assert_eq!(field.index(), index);
    }

    let c1 = value_schema.field("C1").unwrap().schema();
    assert_eq!(c1.schema_type(), SchemaType::String);
    assert!(!c1.is_optional());

    let c2 = value_schema.field("C2").unwrap().schema();
    assert_eq!(c2.logical_type(), Some(LogicalType::Decimal { scale: 3 }));
    assert!(c2.is_optional());

    let c3 = value_schema.field("C3").unwrap().schema();
    assert_eq!(c3.logical_type(), Some(LogicalType::Date));
    assert!(c3.is_optional());

    let c4 = value_schema.field("C4").unwrap().schema();
    assert_eq!(c4.schema_type(), SchemaType::Int32);
    assert!(c4.is_optional());
}

#[test]
fn key_and_value_are_extracted_from_row() {
    init_test_tracing();

    let schema = build(&four_column_table());
    let row = four_column_row();

    let key_schema = schema.key_schema().unwrap();
    assert_eq!(key_schema.name(), Some("server1.catalog.schema.table.Key"));
    let key_names: Vec<_> = key_schema.fields().iter().map(|f| f.name()).collect();
    assert_eq!(key_names, ["C1", "C2"]);

    let key = schema.key_from_column_data(&row).unwrap().unwrap();
    assert_eq!(key.get("C1"), Some(&Value::String("c1value".to_owned())));
    assert_eq!(
        key.get("C2"),
        Some(&Value::Decimal(BigDecimal::from_str("3.142").unwrap()))
    );

    let value = schema.value_from_column_data(&row).unwrap();
    assert_eq!(
        value.values(),
        &[
            Value::String("c1value".to_owned()),
            Value::Decimal(BigDecimal::from_str("3.142").unwrap()),
            Value::Int32(11626),
            Value::Int32(4),
        ]
    );
}

#[test]
fn unconstrained_numeric_keeps_fractional_digits() {
    let table = Table::editor()
        .table_id(TableId::new("", "public", "payments"))
        .add_column(column("amount", "numeric", JdbcType::Numeric))
        .create()
        .unwrap();
    let schema = build(&table);

    let amount = schema.value_schema().field("amount").unwrap().schema();
    assert_eq!(amount.logical_type(), Some(LogicalType::VariableScaleDecimal));

    let value = schema
        .value_from_column_data(&[Datum::Numeric(BigDecimal::from_str("3.142").unwrap())])
        .unwrap();
    assert_eq!(
        value.get("amount"),
        Some(&Value::Decimal(BigDecimal::from_str("3.142").unwrap()))
    );
}

#[test]
fn value_exceeding_declared_scale_is_rejected() {
    let schema = build(&four_column_table());
    let mut row = four_column_row();
    row[1] = Datum::Numeric(BigDecimal::from_str("3.14159").unwrap());

    let err = schema.value_from_column_data(&row).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionError);
}

#[test]
fn table_without_primary_key_has_no_key() {
    init_test_tracing();

    let table = four_column_table()
        .edit()
        .set_primary_key_names(Vec::<String>::new())
        .create()
        .unwrap();
    let schema = build(&table);

    assert!(schema.key_schema().is_none());
    assert!(schema.key_from_column_data(&four_column_row()).unwrap().is_none());
    assert_eq!(schema.value_schema().fields().len(), 4);
    assert!(schema.value_from_column_data(&four_column_row()).is_ok());
}

#[test]
fn null_in_optional_column_is_kept() {
    let schema = build(&four_column_table());
    let mut row = four_column_row();
    row[2] = Datum::Null;
    row[3] = Datum::Null;

    let value = schema.value_from_column_data(&row).unwrap();
    assert_eq!(value.get("C3"), Some(&Value::Null));
    assert_eq!(value.get("C4"), Some(&Value::Null));
}

#[test]
fn null_in_required_column_is_rejected() {
    let schema = build(&four_column_table());
    let mut row = four_column_row();
    row[0] = Datum::Null;

    let err = schema.value_from_column_data(&row).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NullValueInRequiredField);
}

#[test]
fn short_row_is_rejected() {
    let schema = build(&four_column_table());
    let row = &four_column_row()[..3];

    let err = schema.value_from_column_data(row).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ColumnCountMismatch);
    let err = schema.key_from_column_data(row).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ColumnCountMismatch);
}

#[test]
fn building_twice_gives_equal_schemas() {
    let table = four_column_table();
    let first = build(&table);
    let second = build(&table);

    assert_eq!(first.value_schema(), second.value_schema());
    assert_eq!(first.key_schema(), second.key_schema());
    assert_eq!(first.topic_name(), second.topic_name());
}

#[test]
fn sharded_catalog_routes_to_shard_prefix() {
    init_test_tracing();

    let mapper = Arc::new(ByShardedCatalogTopicMapper::new(r"^(.+)_\d+$").unwrap());
    let builder = builder_with(mapper);

    let sharded = Table::editor()
        .table_id(TableId::new("inventory_7", "public", "orders"))
        .add_columns(customers_table().columns().iter().cloned())
        .set_primary_key_names(["id"])
        .create()
        .unwrap();
    let schema = builder.create("server1", &sharded).unwrap();
    assert_eq!(schema.topic_name(), "inventory");

    let key_schema = schema.key_schema().unwrap();
    let key_names: Vec<_> = key_schema.fields().iter().map(|f| f.name()).collect();
    assert_eq!(key_names, ["id", "tableName", "replicaSet"]);
    assert!(!key_schema.field("tableName").unwrap().schema().is_optional());

    let key = schema
        .key_from_column_data(&[Datum::I32(5), Datum::String("x".to_owned())])
        .unwrap()
        .unwrap();
    assert_eq!(key.get("id"), Some(&Value::Int32(5)));
    assert_eq!(key.get("tableName"), Some(&Value::String("orders".to_owned())));
    assert_eq!(
        key.get("replicaSet"),
        Some(&Value::String("inventory_7".to_owned()))
    );

    let unsharded = sharded
        .edit()
        .table_id(TableId::new("inventory", "public", "orders"))
        .create()
        .unwrap();
    let schema = builder.create("server1", &unsharded).unwrap();
    assert_eq!(schema.topic_name(), "inventory");
}

#[test]
fn builder_from_config_uses_configured_mapper() {
    let config = TopicConfig {
        prefix: "server1".to_owned(),
        mapper: TopicMapperConfig::ByShardedCatalog { pattern: None },
    };
    let builder = TableSchemaBuilder::from_config(&config, SchemaNameValidator::strict()).unwrap();

    let table = four_column_table()
        .edit()
        .table_id(TableId::new("shop_12", "public", "items"))
        .create()
        .unwrap();
    let schema = builder.create(&config.prefix, &table).unwrap();
    assert_eq!(schema.topic_name(), "shop");

    let config = TopicConfig {
        prefix: "server1".to_owned(),
        mapper: TopicMapperConfig::ByShardedCatalog {
            pattern: Some("(unclosed".to_owned()),
        },
    };
    let err = TableSchemaBuilder::from_config(&config, SchemaNameValidator::strict()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test]
async fn cached_schema_produces_source_records() {
    init_test_tracing();

    let cache = TableSchemaCache::default();
    let table = customers_table();
    cache.insert(build(&table)).await.unwrap();

    let missing = TableId::new("", "public", "unknown");
    let err = cache.get(&missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingTableSchema);

    let schema = cache.get(table.id()).await.unwrap();
    let record = schema
        .source_record(
            Lsn::new(0x16B_3748),
            &[Datum::I32(1), Datum::String("alice".to_owned())],
        )
        .unwrap();

    assert_eq!(record.topic, "server1.public.customers");
    assert_eq!(record.lsn, Lsn::new(0x16B_3748));
    assert_eq!(
        record.key.unwrap().get("id"),
        Some(&Value::Int32(1))
    );
    assert_eq!(
        record.value.get("name"),
        Some(&Value::String("alice".to_owned()))
    );
}
