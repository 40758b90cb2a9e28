use std::fmt;
use std::str::FromStr;

use pg_escape::quote_identifier;
use thiserror::Error;

use crate::types::JdbcType;

/// Errors raised when a [`Column`] or [`Table`] editor cannot produce a valid value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableEditError {
    #[error("a column must have a non-empty name")]
    MissingColumnName,

    #[error("a table must have a non-empty table name")]
    MissingTableName,

    #[error("primary key column `{column}` does not exist in table `{table_id}`")]
    UnknownPrimaryKeyColumn { table_id: TableId, column: String },

    #[error("column `{column}` is defined more than once in table `{table_id}`")]
    DuplicateColumn { table_id: TableId, column: String },
}

/// Error returned when a dotted table identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid table identifier `{0}`, expected `[catalog.][schema.]table`")]
pub struct ParseTableIdError(String);

/// A fully qualified table identifier made of catalog, schema and table name.
///
/// For Postgres the catalog is the database name and the schema is the namespace. Empty parts
/// are treated as absent when the identifier is rendered.
#[derive(Debug, Clone, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TableId {
    catalog: String,
    schema: String,
    table: String,
}

impl TableId {
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> TableId {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn catalog(&self) -> &str {
        &self.catalog
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the `schema.table` part as a properly quoted Postgres identifier.
    ///
    /// The catalog is omitted since Postgres does not allow cross-database references.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_name = quote_identifier(&self.table);
        if self.schema.is_empty() {
            return quoted_name.into_owned();
        }

        let quoted_schema = quote_identifier(&self.schema);
        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in [&self.catalog, &self.schema, &self.table] {
            if part.is_empty() {
                continue;
            }
            if !first {
                f.write_str(".")?;
            }
            f.write_str(part)?;
            first = false;
        }

        Ok(())
    }
}

impl FromStr for TableId {
    type Err = ParseTableIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(ParseTableIdError(s.to_owned()));
        }

        match parts.as_slice() {
            [table] => Ok(TableId::new("", "", *table)),
            [schema, table] => Ok(TableId::new("", *schema, *table)),
            [catalog, schema, table] => Ok(TableId::new(*catalog, *schema, *table)),
            _ => Err(ParseTableIdError(s.to_owned())),
        }
    }
}

/// Describes a single column of a relational table.
///
/// Columns are immutable; use [`Column::editor`] to build one and [`Column::edit`] to derive a
/// modified copy.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Column {
    name: String,
    position: usize,
    type_name: String,
    jdbc_type: JdbcType,
    length: Option<u32>,
    scale: Option<u32>,
    optional: bool,
    generated: bool,
    auto_incremented: bool,
}

impl Column {
    pub fn editor() -> ColumnEditor {
        ColumnEditor::default()
    }

    /// Returns an editor seeded with this column's attributes.
    pub fn edit(&self) -> ColumnEditor {
        ColumnEditor {
            name: self.name.clone(),
            position: self.position,
            type_name: self.type_name.clone(),
            jdbc_type: self.jdbc_type,
            length: self.length,
            scale: self.scale,
            optional: self.optional,
            generated: self.generated,
            auto_incremented: self.auto_incremented,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The 1-based position of the column within its table.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The type name as declared by the source database.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn jdbc_type(&self) -> JdbcType {
        self.jdbc_type
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    /// Whether the column accepts `NULL` values.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_required(&self) -> bool {
        !self.optional
    }

    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn is_auto_incremented(&self) -> bool {
        self.auto_incremented
    }
}

/// Builder for [`Column`] values.
///
/// Columns are optional unless stated otherwise.
#[derive(Debug, Clone)]
pub struct ColumnEditor {
    name: String,
    position: usize,
    type_name: String,
    jdbc_type: JdbcType,
    length: Option<u32>,
    scale: Option<u32>,
    optional: bool,
    generated: bool,
    auto_incremented: bool,
}

impl Default for ColumnEditor {
    fn default() -> Self {
        Self {
            name: String::new(),
            position: 1,
            type_name: String::new(),
            jdbc_type: JdbcType::Other,
            length: None,
            scale: None,
            optional: true,
            generated: false,
            auto_incremented: false,
        }
    }
}

impl ColumnEditor {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    pub fn jdbc_type(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type = jdbc_type;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn generated(mut self, generated: bool) -> Self {
        self.generated = generated;
        self
    }

    pub fn auto_incremented(mut self, auto_incremented: bool) -> Self {
        self.auto_incremented = auto_incremented;
        self
    }

    pub fn create(self) -> Result<Column, TableEditError> {
        if self.name.is_empty() {
            return Err(TableEditError::MissingColumnName);
        }

        Ok(Column {
            name: self.name,
            position: self.position,
            type_name: self.type_name,
            jdbc_type: self.jdbc_type,
            length: self.length,
            scale: self.scale,
            optional: self.optional,
            generated: self.generated,
            auto_incremented: self.auto_incremented,
        })
    }
}

/// An immutable description of a relational table.
///
/// The order of [`Table::columns`] is the order of the fields in every record derived from the
/// table. Primary key names always refer to existing columns.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Table {
    id: TableId,
    columns: Vec<Column>,
    primary_key_names: Vec<String>,
}

impl Table {
    pub fn editor() -> TableEditor {
        TableEditor::default()
    }

    /// Returns an editor seeded with the contents of this table.
    ///
    /// The table itself is left untouched, editing always yields a new [`Table`].
    pub fn edit(&self) -> TableEditor {
        TableEditor {
            id: self.id.clone(),
            columns: self.columns.clone(),
            primary_key_names: self.primary_key_names.clone(),
        }
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column with the given name.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is returned.
    pub fn column_with_name(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|column| column.name.eq_ignore_ascii_case(name))
            })
    }

    pub fn primary_key_column_names(&self) -> &[String] {
        &self.primary_key_names
    }

    /// Returns the primary key columns in table order.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| self.is_primary_key_column(&column.name))
    }

    pub fn is_primary_key_column(&self, name: &str) -> bool {
        self.primary_key_names.iter().any(|pk| pk == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key_names.is_empty()
    }

    pub fn retrieve_column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}

/// Builder for [`Table`] values.
#[derive(Debug, Clone, Default)]
pub struct TableEditor {
    id: TableId,
    columns: Vec<Column>,
    primary_key_names: Vec<String>,
}

impl TableEditor {
    pub fn table_id(mut self, id: TableId) -> Self {
        self.id = id;
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn add_columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn set_columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns = columns.into_iter().collect();
        self
    }

    /// Removes the column with the given name, together with its primary key membership.
    pub fn remove_column(mut self, name: &str) -> Self {
        self.columns.retain(|column| column.name != name);
        self.primary_key_names.retain(|pk| pk != name);
        self
    }

    /// Replaces the primary key. Passing an empty iterator removes the primary key.
    pub fn set_primary_key_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn create(self) -> Result<Table, TableEditError> {
        if self.id.table().is_empty() {
            return Err(TableEditError::MissingTableName);
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for (index, column) in self.columns.into_iter().enumerate() {
            if columns.iter().any(|c: &Column| c.name == column.name) {
                return Err(TableEditError::DuplicateColumn {
                    table_id: self.id,
                    column: column.name,
                });
            }

            // Positions always reflect the final column order.
            columns.push(Column {
                position: index + 1,
                ..column
            });
        }

        let mut primary_key_names: Vec<String> = Vec::with_capacity(self.primary_key_names.len());
        for name in self.primary_key_names {
            if !columns.iter().any(|column| column.name == name) {
                return Err(TableEditError::UnknownPrimaryKeyColumn {
                    table_id: self.id,
                    column: name,
                });
            }
            if !primary_key_names.contains(&name) {
                primary_key_names.push(name);
            }
        }

        Ok(Table {
            id: self.id,
            columns,
            primary_key_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, jdbc_type: JdbcType) -> Column {
        Column::editor()
            .name(name)
            .jdbc_type(jdbc_type)
            .create()
            .unwrap()
    }

    fn table() -> Table {
        Table::editor()
            .table_id(TableId::new("db", "public", "users"))
            .add_columns([
                column("id", JdbcType::Integer),
                column("email", JdbcType::Varchar),
                column("tenant", JdbcType::Integer),
            ])
            .set_primary_key_names(["tenant", "id"])
            .create()
            .unwrap()
    }

    #[test]
    fn table_id_display_skips_empty_parts() {
        assert_eq!(TableId::new("db", "public", "users").to_string(), "db.public.users");
        assert_eq!(TableId::new("", "public", "users").to_string(), "public.users");
        assert_eq!(TableId::new("", "", "users").to_string(), "users");
    }

    #[test]
    fn table_id_parses_dotted_names() {
        assert_eq!(
            "db.public.users".parse::<TableId>().unwrap(),
            TableId::new("db", "public", "users")
        );
        assert_eq!(
            "public.users".parse::<TableId>().unwrap(),
            TableId::new("", "public", "users")
        );
        assert!("a.b.c.d".parse::<TableId>().is_err());
        assert!("a..c".parse::<TableId>().is_err());
    }

    #[test]
    fn table_id_quotes_identifiers() {
        let id = TableId::new("db", "My Schema", "users");
        assert_eq!(id.as_quoted_identifier(), "\"My Schema\".users");
    }

    #[test]
    fn column_defaults_to_optional() {
        let column = Column::editor().name("c").create().unwrap();
        assert!(column.is_optional());
        assert!(!column.is_generated());
        assert!(!column.is_auto_incremented());
        assert_eq!(column.length(), None);
        assert_eq!(column.scale(), None);
    }

    #[test]
    fn column_without_name_is_rejected() {
        assert_eq!(
            Column::editor().type_name("TEXT").create(),
            Err(TableEditError::MissingColumnName)
        );
    }

    #[test]
    fn editor_assigns_positions_in_order() {
        let table = table();
        let positions: Vec<_> = table.columns().iter().map(Column::position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn primary_key_columns_follow_table_order() {
        let table = table();
        let names: Vec<_> = table.primary_key_columns().map(Column::name).collect();
        assert_eq!(names, vec!["id", "tenant"]);
        assert_eq!(table.primary_key_column_names(), ["tenant", "id"]);
    }

    #[test]
    fn unknown_primary_key_column_is_rejected() {
        let result = table().edit().set_primary_key_names(["missing"]).create();
        assert!(matches!(
            result,
            Err(TableEditError::UnknownPrimaryKeyColumn { column, .. }) if column == "missing"
        ));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let result = table().edit().add_column(column("id", JdbcType::BigInt)).create();
        assert!(matches!(result, Err(TableEditError::DuplicateColumn { .. })));
    }

    #[test]
    fn editing_does_not_change_the_original() {
        let original = table();
        let edited = original.edit().set_primary_key_names(Vec::<String>::new()).create().unwrap();

        assert!(original.has_primary_key());
        assert!(!edited.has_primary_key());
        assert_eq!(original.columns(), edited.columns());
    }

    #[test]
    fn removing_a_column_drops_it_from_the_primary_key() {
        let table = table().edit().remove_column("tenant").create().unwrap();
        assert_eq!(table.retrieve_column_names(), vec!["id", "email"]);
        assert_eq!(table.primary_key_column_names(), ["id"]);
    }

    #[test]
    fn column_lookup_falls_back_to_case_insensitive_match() {
        let table = table();
        assert_eq!(table.column_with_name("EMAIL").map(Column::name), Some("email"));
        assert!(table.column_with_name("missing").is_none());
    }
}
