use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use cdc_config::shared::TopicConfig;
use cdc_postgres::lsn::Lsn;
use cdc_postgres::schema::{Table, TableId};
use tracing::debug;

use crate::bail;
use crate::conversions::{Datum, PostgresValueConverters, ValueConverter, ValueConverterProvider};
use crate::error::{CdcResult, ErrorKind};
use crate::record::{Schema, SchemaBuilder, SourceRecord, Struct, Value};
use crate::schema::SchemaNameValidator;
use crate::topic::{self, TopicMapper};

/// Derives [`TableSchema`]s from table definitions.
///
/// The builder holds no per-table state and can be shared between tasks.
#[derive(Clone)]
pub struct TableSchemaBuilder {
    converters: Arc<dyn ValueConverterProvider>,
    validator: SchemaNameValidator,
    topic_mapper: Arc<dyn TopicMapper>,
}

impl TableSchemaBuilder {
    pub fn new(
        converters: Arc<dyn ValueConverterProvider>,
        validator: SchemaNameValidator,
        topic_mapper: Arc<dyn TopicMapper>,
    ) -> Self {
        Self {
            converters,
            validator,
            topic_mapper,
        }
    }

    /// Creates a builder with [`PostgresValueConverters`] and the topic mapper of `config`.
    pub fn from_config(config: &TopicConfig, validator: SchemaNameValidator) -> CdcResult<Self> {
        Ok(Self::new(
            Arc::new(PostgresValueConverters::new()),
            validator,
            topic::from_config(config)?,
        ))
    }

    /// Builds the key and value schemas of `table` and the functions extracting them from rows.
    ///
    /// Schemas are named `<prefix>.<table id>.Key` and `<prefix>.<table id>.Value`; the prefix and
    /// its dot are left out when `prefix` is empty.
    pub fn create(&self, prefix: &str, table: &Table) -> CdcResult<TableSchema> {
        let table_id = table.id();
        let record_name = if prefix.is_empty() {
            table_id.to_string()
        } else {
            format!("{prefix}.{table_id}")
        };

        let value_schema_name = self
            .validator
            .validate_full_name(&format!("{record_name}.Value"))?;
        let mut value_builder = SchemaBuilder::struct_().name(value_schema_name);

        let key_schema_name = self
            .validator
            .validate_full_name(&format!("{record_name}.Key"))?;
        let mut key_builder = SchemaBuilder::struct_().name(key_schema_name);
        let mut key_columns = Vec::new();

        // Final field name to the column it came from.
        let mut field_names: HashMap<String, &str> = HashMap::new();

        for (index, column) in table.columns().iter().enumerate() {
            let Some(builder) = self.converters.schema_builder(column) else {
                bail!(
                    ErrorKind::UnsupportedColumnType,
                    "Column type has no schema mapping",
                    format!(
                        "table {table_id}, column {}, type {} (code {}, {})",
                        column.name(),
                        column.jdbc_type(),
                        column.jdbc_type().code(),
                        column.type_name()
                    )
                );
            };

            let field_name = self.validator.validate_field_name(column.name())?;
            if let Some(previous) = field_names.insert(field_name.clone(), column.name()) {
                bail!(
                    ErrorKind::DuplicateSchemaName,
                    "Columns map to the same field name",
                    format!(
                        "columns '{previous}' and '{}' of table {table_id} are both named '{field_name}'",
                        column.name()
                    )
                );
            }

            let schema = builder.with_optional(column.is_optional()).build();
            if table.is_primary_key_column(column.name()) {
                key_builder.add_field(field_name.clone(), schema.clone());
                key_columns.push(index);
            }
            value_builder.add_field(field_name, schema);
        }

        let value_schema = Arc::new(value_builder.build());
        let value_converters = table
            .columns()
            .iter()
            .zip(value_schema.fields())
            .map(|(column, field)| {
                self.converters.converter(column, field).ok_or_else(|| {
                    crate::cdc_error!(
                        ErrorKind::UnsupportedColumnType,
                        "Column type has no value converter",
                        format!("table {table_id}, column {}", column.name())
                    )
                })
            })
            .collect::<CdcResult<Vec<_>>>()?;

        let key = if table.has_primary_key() {
            Some(self.create_key(table, key_builder, &key_columns, &value_converters)?)
        } else {
            None
        };

        let topic_name = self.topic_mapper.topic_name(table);
        debug!(
            table_id = %table_id,
            topic = %topic_name,
            value_schema = %value_schema,
            has_key = key.is_some(),
            "built table schema"
        );

        let (key_schema, key_generator) = key.unzip();

        Ok(TableSchema {
            table_id: table_id.clone(),
            topic_name,
            key_schema,
            value_schema,
            key_generator,
            value_converters,
        })
    }

    fn create_key(
        &self,
        table: &Table,
        mut key_builder: SchemaBuilder,
        key_columns: &[usize],
        value_converters: &[ValueConverter],
    ) -> CdcResult<(Arc<Schema>, KeyGenerator)> {
        self.topic_mapper.enhance_key_schema(table, &mut key_builder);

        let mut seen = HashSet::new();
        for name in key_builder.field_names() {
            if !seen.insert(name) {
                bail!(
                    ErrorKind::DuplicateSchemaName,
                    "Key field added twice",
                    format!("key of table {} has two fields named '{name}'", table.id())
                );
            }
        }

        let key_schema = Arc::new(key_builder.build());
        let columns = key_columns
            .iter()
            .zip(key_schema.fields())
            .map(|(&index, field)| KeyColumn {
                index,
                field_name: field.name().to_owned(),
                converter: value_converters[index].clone(),
            })
            .collect();
        let extra_fields = self
            .topic_mapper
            .non_row_fields_to_add_to_key(table, &key_schema)
            .into_iter()
            .collect();

        Ok((
            key_schema,
            KeyGenerator {
                columns,
                extra_fields,
            },
        ))
    }
}

impl fmt::Debug for TableSchemaBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchemaBuilder")
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct KeyColumn {
    index: usize,
    field_name: String,
    converter: ValueConverter,
}

#[derive(Clone)]
struct KeyGenerator {
    columns: Vec<KeyColumn>,
    extra_fields: Vec<(String, Value)>,
}

/// Key and value schemas of one table version, with the functions turning its rows into
/// records.
///
/// A table schema is never modified. When the table changes a new one is built and replaces the
/// old one in the [`crate::schema::TableSchemaCache`].
#[derive(Clone)]
pub struct TableSchema {
    table_id: TableId,
    topic_name: String,
    key_schema: Option<Arc<Schema>>,
    value_schema: Arc<Schema>,
    key_generator: Option<KeyGenerator>,
    value_converters: Vec<ValueConverter>,
}

impl TableSchema {
    pub fn table_id(&self) -> &TableId {
        &self.table_id
    }

    pub fn topic_name(&self) -> &str {
        &self.topic_name
    }

    /// Schema of the record key, absent when the table has no primary key.
    pub fn key_schema(&self) -> Option<&Arc<Schema>> {
        self.key_schema.as_ref()
    }

    pub fn value_schema(&self) -> &Arc<Schema> {
        &self.value_schema
    }

    /// Builds the key of a row given in column order.
    ///
    /// Returns `None` when the table has no primary key.
    pub fn key_from_column_data(&self, row: &[Datum]) -> CdcResult<Option<Struct>> {
        let (Some(key_schema), Some(generator)) = (&self.key_schema, &self.key_generator) else {
            return Ok(None);
        };
        self.check_row_len(row)?;

        let mut key = Struct::new(key_schema.clone());
        for column in &generator.columns {
            let value = (column.converter)(&row[column.index])?;
            key.put(&column.field_name, value)?;
        }
        for (name, value) in &generator.extra_fields {
            key.put(name, value.clone())?;
        }
        key.validate()?;

        Ok(Some(key))
    }

    /// Builds the value of a row given in column order.
    pub fn value_from_column_data(&self, row: &[Datum]) -> CdcResult<Struct> {
        self.check_row_len(row)?;

        let mut value = Struct::new(self.value_schema.clone());
        for ((field, converter), datum) in self
            .value_schema
            .fields()
            .iter()
            .zip(&self.value_converters)
            .zip(row)
        {
            value.put(field.name(), converter(datum)?)?;
        }

        Ok(value)
    }

    /// Builds the record for a row changed at `lsn`.
    pub fn source_record(&self, lsn: Lsn, row: &[Datum]) -> CdcResult<SourceRecord> {
        let key = self.key_from_column_data(row)?;
        let value = self.value_from_column_data(row)?;

        Ok(SourceRecord {
            topic: self.topic_name.clone(),
            table_id: self.table_id.clone(),
            lsn,
            key_schema: self.key_schema.clone(),
            key,
            value_schema: self.value_schema.clone(),
            value,
        })
    }

    fn check_row_len(&self, row: &[Datum]) -> CdcResult<()> {
        let expected = self.value_converters.len();
        if row.len() != expected {
            bail!(
                ErrorKind::ColumnCountMismatch,
                "Row does not match table columns",
                format!(
                    "table {} has {expected} columns but the row has {} values",
                    self.table_id,
                    row.len()
                )
            );
        }

        Ok(())
    }
}

impl fmt::Debug for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSchema")
            .field("table_id", &self.table_id)
            .field("topic_name", &self.topic_name)
            .field("key_schema", &self.key_schema)
            .field("value_schema", &self.value_schema)
            .finish_non_exhaustive()
    }
}
