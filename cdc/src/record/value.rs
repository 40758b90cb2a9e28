use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::record::schema::{LogicalType, Schema, SchemaType};

/// A typed value conforming to a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(BigDecimal),
    Struct(Struct),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns whether the value can be stored in a field with the given schema.
    pub fn conforms_to(&self, schema: &Schema) -> bool {
        if let Value::Null = self {
            return schema.is_optional();
        }

        match schema.logical_type() {
            Some(LogicalType::Decimal { scale }) => {
                return match self {
                    Value::Decimal(decimal) => decimal.fractional_digit_count() == i64::from(scale),
                    _ => false,
                };
            }
            Some(LogicalType::VariableScaleDecimal) => return matches!(self, Value::Decimal(_)),
            _ => {}
        }

        matches!(
            (self, schema.schema_type()),
            (Value::Boolean(_), SchemaType::Boolean)
                | (Value::Int8(_), SchemaType::Int8)
                | (Value::Int16(_), SchemaType::Int16)
                | (Value::Int32(_), SchemaType::Int32)
                | (Value::Int64(_), SchemaType::Int64)
                | (Value::Float32(_), SchemaType::Float32)
                | (Value::Float64(_), SchemaType::Float64)
                | (Value::String(_), SchemaType::String)
                | (Value::Bytes(_), SchemaType::Bytes)
                | (Value::Struct(_), SchemaType::Struct)
        )
    }
}

/// A structured value: one [`Value`] per field of a struct [`Schema`].
///
/// Fields start out as [`Value::Null`]; [`Struct::put`] checks every value against its field.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Struct {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![Value::Null; schema.fields().len()];
        Self { schema, values }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Sets the value of the field called `name`.
    pub fn put(&mut self, name: &str, value: Value) -> CdcResult<()> {
        let Some(field) = self.schema.field(name) else {
            bail!(
                ErrorKind::InvalidData,
                "Unknown struct field",
                format!("field '{name}' is not part of schema {}", self.schema)
            );
        };

        if !value.conforms_to(field.schema()) {
            let kind = if value.is_null() {
                ErrorKind::NullValueInRequiredField
            } else {
                ErrorKind::ConversionError
            };
            bail!(
                kind,
                "Value does not match field schema",
                format!("field '{name}' of type {} cannot hold {value:?}", field.schema())
            );
        }

        self.values[field.index()] = value;

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema
            .field(name)
            .map(|field| &self.values[field.index()])
    }

    /// Values in field order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Checks that every required field holds a value.
    pub fn validate(&self) -> CdcResult<()> {
        for field in self.schema.fields() {
            let value = &self.values[field.index()];
            if value.is_null() && !field.schema().is_optional() {
                bail!(
                    ErrorKind::NullValueInRequiredField,
                    "Required struct field is missing",
                    format!("field '{}' of schema {} is not set", field.name(), self.schema)
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::record::schema::SchemaBuilder;

    fn schema() -> Arc<Schema> {
        Arc::new(
            SchemaBuilder::struct_()
                .field("id", SchemaBuilder::int32().build())
                .field("price", SchemaBuilder::decimal(2).optional().build())
                .build(),
        )
    }

    #[test]
    fn put_and_get_by_name() {
        let mut value = Struct::new(schema());
        value.put("id", Value::Int32(7)).unwrap();
        value
            .put("price", Value::Decimal(BigDecimal::from_str("1.50").unwrap()))
            .unwrap();

        assert_eq!(value.get("id"), Some(&Value::Int32(7)));
        assert_eq!(value.values().len(), 2);
        assert!(value.validate().is_ok());
    }

    #[test]
    fn put_rejects_mismatched_values() {
        let mut value = Struct::new(schema());
        let err = value.put("id", Value::String("7".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        let err = value.put("id", Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NullValueInRequiredField);

        let err = value
            .put("price", Value::Decimal(BigDecimal::from_str("1.5").unwrap()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        let err = value.put("missing", Value::Int32(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn validate_reports_unset_required_fields() {
        let value = Struct::new(schema());
        assert_eq!(
            value.validate().unwrap_err().kind(),
            ErrorKind::NullValueInRequiredField
        );
    }
}
