use std::fmt;

/// Physical type of a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Struct,
}

/// Semantic type layered on top of a physical [`SchemaType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Arbitrary precision decimal with a fixed scale, carried as [`super::Value::Decimal`].
    Decimal { scale: u32 },
    /// Arbitrary precision decimal keeping the scale of each value, for unconstrained numerics.
    VariableScaleDecimal,
    /// Days since the Unix epoch, as `int32`.
    Date,
    /// Microseconds since midnight, as `int64`.
    Time,
    /// Milliseconds since the Unix epoch, as `int64`.
    Timestamp,
    /// ISO-8601 time with offset, as `string`.
    ZonedTime,
    /// ISO-8601 timestamp with offset, as `string`.
    ZonedTimestamp,
    /// Canonical hyphenated UUID, as `string`.
    Uuid,
    /// JSON document text, as `string`.
    Json,
}

impl LogicalType {
    fn physical_type(self) -> SchemaType {
        match self {
            LogicalType::Decimal { .. } | LogicalType::VariableScaleDecimal => SchemaType::Bytes,
            LogicalType::Date => SchemaType::Int32,
            LogicalType::Time | LogicalType::Timestamp => SchemaType::Int64,
            LogicalType::ZonedTime
            | LogicalType::ZonedTimestamp
            | LogicalType::Uuid
            | LogicalType::Json => SchemaType::String,
        }
    }
}

/// Structural description of a value: a primitive, a logical type or a struct of named fields.
///
/// Schemas are immutable and compared structurally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    schema_type: SchemaType,
    logical_type: Option<LogicalType>,
    name: Option<String>,
    optional: bool,
    fields: Vec<Field>,
}

impl Schema {
    pub fn schema_type(&self) -> SchemaType {
        self.schema_type
    }

    pub fn logical_type(&self) -> Option<LogicalType> {
        self.logical_type
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Fields of a struct schema in index order. Empty for every other type.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.logical_type) {
            (Some(name), _) => write!(f, "{name}")?,
            (None, Some(logical_type)) => write!(f, "{logical_type:?}")?,
            (None, None) => write!(f, "{:?}", self.schema_type)?,
        }
        if self.optional {
            f.write_str("?")?;
        }

        Ok(())
    }
}

/// A named member of a struct [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    index: usize,
    schema: Schema,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Zero-based position of the field within its struct.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Builder for [`Schema`] values.
///
/// Schemas are required unless [`SchemaBuilder::optional`] is called.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema_type: SchemaType,
    logical_type: Option<LogicalType>,
    name: Option<String>,
    optional: bool,
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            logical_type: None,
            name: None,
            optional: false,
            fields: Vec::new(),
        }
    }

    pub fn logical(logical_type: LogicalType) -> Self {
        Self {
            logical_type: Some(logical_type),
            ..Self::new(logical_type.physical_type())
        }
    }

    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    pub fn int8() -> Self {
        Self::new(SchemaType::Int8)
    }

    pub fn int16() -> Self {
        Self::new(SchemaType::Int16)
    }

    pub fn int32() -> Self {
        Self::new(SchemaType::Int32)
    }

    pub fn int64() -> Self {
        Self::new(SchemaType::Int64)
    }

    pub fn float32() -> Self {
        Self::new(SchemaType::Float32)
    }

    pub fn float64() -> Self {
        Self::new(SchemaType::Float64)
    }

    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    pub fn bytes() -> Self {
        Self::new(SchemaType::Bytes)
    }

    pub fn struct_() -> Self {
        Self::new(SchemaType::Struct)
    }

    pub fn decimal(scale: u32) -> Self {
        Self::logical(LogicalType::Decimal { scale })
    }

    pub fn variable_scale_decimal() -> Self {
        Self::logical(LogicalType::VariableScaleDecimal)
    }

    pub fn date() -> Self {
        Self::logical(LogicalType::Date)
    }

    pub fn time() -> Self {
        Self::logical(LogicalType::Time)
    }

    pub fn timestamp() -> Self {
        Self::logical(LogicalType::Timestamp)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    /// Sets optionality from a flag, usually a column's nullability.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Appends a field, consuming the builder.
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.add_field(name, schema);
        self
    }

    /// Appends a field. The field index is its position in the struct.
    pub fn add_field(&mut self, name: impl Into<String>, schema: Schema) {
        let index = self.fields.len();
        self.fields.push(Field {
            name: name.into(),
            index,
            schema,
        });
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn build(self) -> Schema {
        Schema {
            schema_type: self.schema_type,
            logical_type: self.logical_type,
            name: self.name,
            optional: self.optional,
            fields: self.fields,
        }
    }
}
