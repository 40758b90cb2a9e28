//! Structured records produced from table rows: schemas, values and the envelope handed to sinks.

pub mod schema;
pub mod source;
pub mod value;

pub use schema::{Field, LogicalType, Schema, SchemaBuilder, SchemaType};
pub use source::{SourceOffset, SourceRecord};
pub use value::{Struct, Value};
