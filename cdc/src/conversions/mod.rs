use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

pub mod jdbc;
pub mod postgres;

pub use jdbc::{JdbcValueConverters, ValueConverter, ValueConverterProvider};
pub use postgres::PostgresValueConverters;

/// A raw column value as read from the source, before conversion to a record [`crate::record::Value`].
///
/// A row is a slice of datums aligned with the columns of its table.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Numeric(BigDecimal),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Short name of the datum variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Bool(_) => "bool",
            Datum::I16(_) => "int16",
            Datum::I32(_) => "int32",
            Datum::I64(_) => "int64",
            Datum::F32(_) => "float32",
            Datum::F64(_) => "float64",
            Datum::Numeric(_) => "numeric",
            Datum::String(_) => "string",
            Datum::Bytes(_) => "bytes",
            Datum::Date(_) => "date",
            Datum::Time(_) => "time",
            Datum::Timestamp(_) => "timestamp",
            Datum::TimestampTz(_) => "timestamptz",
            Datum::Uuid(_) => "uuid",
            Datum::Json(_) => "json",
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => f.write_str("null"),
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::I16(i) => write!(f, "{i}"),
            Datum::I32(i) => write!(f, "{i}"),
            Datum::I64(i) => write!(f, "{i}"),
            Datum::F32(v) => write!(f, "{v}"),
            Datum::F64(v) => write!(f, "{v}"),
            Datum::Numeric(n) => write!(f, "{n}"),
            Datum::String(s) => f.write_str(s),
            Datum::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Datum::Date(d) => write!(f, "{d}"),
            Datum::Time(t) => write!(f, "{t}"),
            Datum::Timestamp(t) => write!(f, "{t}"),
            Datum::TimestampTz(t) => write!(f, "{}", t.to_rfc3339()),
            Datum::Uuid(u) => write!(f, "{u}"),
            Datum::Json(j) => write!(f, "{j}"),
        }
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::String(value.to_owned())
    }
}

impl From<String> for Datum {
    fn from(value: String) -> Self {
        Datum::String(value)
    }
}

impl From<i32> for Datum {
    fn from(value: i32) -> Self {
        Datum::I32(value)
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::I64(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::F64(value)
    }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self {
        Datum::Bool(value)
    }
}

impl From<NaiveDate> for Datum {
    fn from(value: NaiveDate) -> Self {
        Datum::Date(value)
    }
}

impl<T> From<Option<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Datum::Null)
    }
}
