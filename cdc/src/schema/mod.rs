//! Derivation of record schemas from table definitions.

mod builder;
mod cache;
mod validator;

pub use builder::{TableSchema, TableSchemaBuilder};
pub use cache::TableSchemaCache;
pub use validator::{ConflictHandler, NameConflict, NameConflictPolicy, SchemaNameValidator};
