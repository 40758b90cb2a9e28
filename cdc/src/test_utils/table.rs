use bigdecimal::BigDecimal;
use cdc_postgres::schema::{Column, Table, TableId};
use cdc_postgres::types::JdbcType;
use chrono::NaiveDate;

use crate::conversions::Datum;

/// A column with the given name and type, nullable unless changed by the caller.
pub fn column(name: &str, type_name: &str, jdbc_type: JdbcType) -> Column {
    Column::editor()
        .name(name)
        .type_name(type_name)
        .jdbc_type(jdbc_type)
        .create()
        .expect("failed to create test column")
}

/// `catalog.schema.table` with a required varchar key `C1`, a `numeric(5,3)` column, a date
/// and an integer.
pub fn four_column_table() -> Table {
    Table::editor()
        .table_id(TableId::new("catalog", "schema", "table"))
        .add_column(
            column("C1", "varchar", JdbcType::Varchar)
                .edit()
                .length(10)
                .optional(false)
                .create()
                .expect("failed to create test column"),
        )
        .add_column(
            column("C2", "numeric", JdbcType::Numeric)
                .edit()
                .length(5)
                .scale(3)
                .create()
                .expect("failed to create test column"),
        )
        .add_column(column("C3", "date", JdbcType::Date))
        .add_column(column("C4", "int4", JdbcType::Integer))
        .set_primary_key_names(["C1", "C2"])
        .create()
        .expect("failed to create test table")
}

/// A row of [`four_column_table`]: `["c1value", 3.142, 2001-10-31, 4]`.
pub fn four_column_row() -> Vec<Datum> {
    vec![
        Datum::String("c1value".to_owned()),
        Datum::Numeric("3.142".parse::<BigDecimal>().expect("valid decimal")),
        Datum::Date(NaiveDate::from_ymd_opt(2001, 10, 31).expect("valid date")),
        Datum::I32(4),
    ]
}

/// `public.customers (id int4 primary key, name text)`.
pub fn customers_table() -> Table {
    Table::editor()
        .table_id(TableId::new("", "public", "customers"))
        .add_column(
            column("id", "int4", JdbcType::Integer)
                .edit()
                .optional(false)
                .auto_incremented(true)
                .create()
                .expect("failed to create test column"),
        )
        .add_column(column("name", "text", JdbcType::Varchar))
        .set_primary_key_names(["id"])
        .create()
        .expect("failed to create test table")
}
