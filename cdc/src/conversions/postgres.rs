use cdc_postgres::schema::Column;
use cdc_postgres::types::JdbcType;

use crate::conversions::jdbc::{
    JdbcValueConverters, ValueConverter, ValueConverterProvider, converter_for_schema,
};
use crate::record::{Field, LogicalType, SchemaBuilder};

/// Converters for Postgres columns.
///
/// Builds on [`JdbcValueConverters`] and additionally maps the Postgres types that surface as
/// [`JdbcType::Other`]: `uuid`, `json` and `jsonb`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresValueConverters {
    jdbc: JdbcValueConverters,
}

impl PostgresValueConverters {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueConverterProvider for PostgresValueConverters {
    fn schema_builder(&self, column: &Column) -> Option<SchemaBuilder> {
        if column.jdbc_type() != JdbcType::Other {
            return self.jdbc.schema_builder(column);
        }

        match column.type_name() {
            "uuid" => Some(SchemaBuilder::logical(LogicalType::Uuid)),
            "json" | "jsonb" => Some(SchemaBuilder::logical(LogicalType::Json)),
            _ => None,
        }
    }

    fn converter(&self, column: &Column, field: &Field) -> Option<ValueConverter> {
        converter_for_schema(column.name(), field.schema())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::conversions::Datum;
    use crate::record::{SchemaBuilder, Value};

    fn column(name: &str, type_name: &str, jdbc_type: JdbcType) -> Column {
        Column::editor()
            .name(name)
            .type_name(type_name)
            .jdbc_type(jdbc_type)
            .create()
            .unwrap()
    }

    fn field_for(column: &Column) -> Field {
        let builder = PostgresValueConverters::new()
            .schema_builder(column)
            .unwrap()
            .optional();
        let schema = SchemaBuilder::struct_()
            .field(column.name(), builder.build())
            .build();
        schema.fields()[0].clone()
    }

    #[test]
    fn uuid_columns_become_uuid_strings() {
        let column = column("id", "uuid", JdbcType::Other);
        let field = field_for(&column);
        assert_eq!(field.schema().logical_type(), Some(LogicalType::Uuid));

        let uuid = Uuid::from_u128(0x67e5_5044_10b1_426f_9247_bb68_0e5f_e0c8);
        let converter = PostgresValueConverters::new()
            .converter(&column, &field)
            .unwrap();
        assert_eq!(
            converter(&Datum::Uuid(uuid)).unwrap(),
            Value::String("67e55044-10b1-426f-9247-bb680e5fe0c8".to_string())
        );
    }

    #[test]
    fn jsonb_columns_are_normalized_to_json_text() {
        let column = column("doc", "jsonb", JdbcType::Other);
        let field = field_for(&column);
        let converter = PostgresValueConverters::new()
            .converter(&column, &field)
            .unwrap();

        assert_eq!(
            converter(&Datum::String(r#"{ "a" : 1 }"#.to_string())).unwrap(),
            Value::String(r#"{"a":1}"#.to_string())
        );
        assert_eq!(converter(&Datum::Null).unwrap(), Value::Null);
    }

    #[test]
    fn other_types_fall_back_to_jdbc_mapping() {
        let provider = PostgresValueConverters::new();
        assert_eq!(
            provider
                .schema_builder(&column("n", "int4", JdbcType::Integer))
                .unwrap()
                .build(),
            SchemaBuilder::int32().build()
        );
        assert!(
            provider
                .schema_builder(&column("p", "point", JdbcType::Other))
                .is_none()
        );
    }
}
