//! Tests against a live Postgres started with `wal_level=logical`.
//!
//! They are ignored by default. Point them at a server with the `PG_HOST`, `PG_PORT`,
//! `PG_DATABASE`, `PG_USER` and `PG_PASSWORD` variables and run them with `--ignored`.

use cdc::conversions::Datum;
use cdc::replication::{ReplicationClient, ReplicationConnection};
use cdc::schema::{SchemaNameValidator, TableSchemaBuilder};
use cdc_config::shared::{IntoConnectOptions, PgConnectionConfig, TopicConfig};
use cdc_postgres::schema::TableId;
use cdc_postgres::types::JdbcType;
use cdc_telemetry::init_test_tracing;
use chrono::NaiveDate;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: env_or("PG_HOST", "localhost"),
        port: env_or("PG_PORT", "5432").parse().unwrap(),
        name: env_or("PG_DATABASE", "postgres"),
        username: env_or("PG_USER", "postgres"),
        password: Some(env_or("PG_PASSWORD", "postgres").into()),
    }
}

async fn connect_regular(config: &PgConnectionConfig) -> Client {
    let options: tokio_postgres::Config = config.with_db();
    let (client, connection) = options.connect(NoTls).await.unwrap();
    tokio::spawn(connection);

    client
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a Postgres server with wal_level=logical"]
async fn streams_inserts_and_drops_slot_on_close() {
    init_test_tracing();

    let config = local_pg_connection_config();
    let database = connect_regular(&config).await;
    let table_name = unique_name("cdc_orders");
    database
        .batch_execute(&format!(
            "create table public.{table_name} (id int4 primary key, note text)"
        ))
        .await
        .unwrap();

    let slot_name = unique_name("cdc_slot");
    let mut connection = ReplicationConnection::builder(config.clone())
        .with_slot(slot_name.clone())
        .with_plugin("test_decoding")
        .build()
        .await
        .unwrap();
    let mut stream = connection.start_streaming(None).await.unwrap();

    database
        .batch_execute(&format!(
            "insert into public.{table_name} values (1, 'first')"
        ))
        .await
        .unwrap();

    let insert = loop {
        let record = stream.read().await.unwrap().unwrap();
        let text = String::from_utf8_lossy(&record.data).into_owned();
        if text.contains("INSERT") {
            break (record, text);
        }
    };
    assert!(insert.1.contains(&table_name));
    stream.flush_lsn(insert.0.lsn).unwrap();

    connection.close().await.unwrap();

    let control = ReplicationConnection::builder(config.clone())
        .build()
        .await
        .unwrap();
    assert!(control.client().get_slot(&slot_name).await.unwrap().is_none());

    database
        .batch_execute(&format!("drop table public.{table_name}"))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "needs a Postgres server with wal_level=logical"]
async fn loaded_table_feeds_schema_builder() {
    init_test_tracing();

    let config = local_pg_connection_config();
    let database = connect_regular(&config).await;
    let table_name = unique_name("cdc_items");
    database
        .batch_execute(&format!(
            "create table public.{table_name} (
                id int8 primary key,
                price numeric(10, 3),
                created date not null default current_date
            )"
        ))
        .await
        .unwrap();

    let connection = ReplicationConnection::builder(config.clone())
        .build()
        .await
        .unwrap();
    let table = connection
        .client()
        .load_table(TableId::new("", "public", table_name.as_str()))
        .await
        .unwrap();

    assert_eq!(table.id().catalog(), config.name);
    assert_eq!(table.retrieve_column_names(), ["id", "price", "created"]);
    assert_eq!(table.primary_key_column_names(), ["id"]);

    let price = table.column_with_name("price").unwrap();
    assert_eq!(price.jdbc_type(), JdbcType::Numeric);
    assert_eq!(price.length(), Some(10));
    assert_eq!(price.scale(), Some(3));
    assert!(price.is_optional());
    assert!(table.column_with_name("created").unwrap().is_required());

    let builder =
        TableSchemaBuilder::from_config(&TopicConfig::default(), SchemaNameValidator::strict())
            .unwrap();
    let schema = builder.create("server1", &table).unwrap();
    let value = schema
        .value_from_column_data(&[
            Datum::I64(1),
            Datum::Null,
            Datum::Date(NaiveDate::from_ymd_opt(2001, 10, 31).unwrap()),
        ])
        .unwrap();
    assert_eq!(value.values().len(), 3);

    database
        .batch_execute(&format!("drop table public.{table_name}"))
        .await
        .unwrap();
}
