use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use cdc_postgres::schema::Column;
use cdc_postgres::types::JdbcType;
use chrono::{
    DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Timelike, Utc,
};
use uuid::Uuid;

use crate::cdc_error;
use crate::conversions::Datum;
use crate::error::{CdcResult, ErrorKind};
use crate::record::{Field, LogicalType, Schema, SchemaBuilder, SchemaType, Value};

/// Number of days from 0001-01-01 to 1970-01-01, in chrono's `num_days_from_ce` numbering.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const TIMESTAMPTZ_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Converts a raw [`Datum`] into a [`Value`] matching a field schema.
///
/// Converters handle `NULL` themselves: it becomes [`Value::Null`] for optional fields and an
/// [`ErrorKind::NullValueInRequiredField`] error otherwise.
pub type ValueConverter = Arc<dyn Fn(&Datum) -> CdcResult<Value> + Send + Sync>;

/// Supplies field schemas and value converters for table columns.
pub trait ValueConverterProvider: Send + Sync {
    /// Returns a builder for the field schema of `column`, or `None` when the column type is
    /// not supported.
    ///
    /// The returned builder is required; callers apply the column's nullability.
    fn schema_builder(&self, column: &Column) -> Option<SchemaBuilder>;

    /// Returns the converter producing values for `field` from data of `column`.
    fn converter(&self, column: &Column, field: &Field) -> Option<ValueConverter>;
}

/// Default converters mapping generic JDBC type codes onto record schemas.
#[derive(Debug, Clone, Copy, Default)]
pub struct JdbcValueConverters;

impl JdbcValueConverters {
    pub fn new() -> Self {
        Self
    }
}

impl ValueConverterProvider for JdbcValueConverters {
    fn schema_builder(&self, column: &Column) -> Option<SchemaBuilder> {
        let builder = match column.jdbc_type() {
            JdbcType::Bit | JdbcType::Boolean => SchemaBuilder::boolean(),
            JdbcType::TinyInt => SchemaBuilder::int8(),
            JdbcType::SmallInt => SchemaBuilder::int16(),
            JdbcType::Integer => SchemaBuilder::int32(),
            JdbcType::BigInt => SchemaBuilder::int64(),
            JdbcType::Real => SchemaBuilder::float32(),
            JdbcType::Float | JdbcType::Double => SchemaBuilder::float64(),
            JdbcType::Numeric | JdbcType::Decimal => match column.scale() {
                Some(scale) => SchemaBuilder::decimal(scale),
                None => SchemaBuilder::variable_scale_decimal(),
            },
            JdbcType::Char
            | JdbcType::Varchar
            | JdbcType::LongVarchar
            | JdbcType::NChar
            | JdbcType::NVarchar
            | JdbcType::LongNVarchar
            | JdbcType::Clob
            | JdbcType::NClob
            | JdbcType::SqlXml
            | JdbcType::DataLink => SchemaBuilder::string(),
            JdbcType::Binary | JdbcType::VarBinary | JdbcType::LongVarBinary | JdbcType::Blob => {
                SchemaBuilder::bytes()
            }
            JdbcType::Date => SchemaBuilder::date(),
            JdbcType::Time => SchemaBuilder::time(),
            JdbcType::Timestamp => SchemaBuilder::timestamp(),
            JdbcType::TimeWithTimezone => SchemaBuilder::logical(LogicalType::ZonedTime),
            JdbcType::TimestampWithTimezone => SchemaBuilder::logical(LogicalType::ZonedTimestamp),
            _ => return None,
        };

        Some(builder)
    }

    fn converter(&self, column: &Column, field: &Field) -> Option<ValueConverter> {
        converter_for_schema(column.name(), field.schema())
    }
}

/// Builds a converter targeting `schema` for the column called `column_name`.
///
/// Returns `None` for struct schemas, which no column maps to.
pub fn converter_for_schema(column_name: &str, schema: &Schema) -> Option<ValueConverter> {
    let target = Target::of(schema)?;
    let optional = schema.is_optional();
    let column_name = column_name.to_owned();

    Some(Arc::new(move |datum: &Datum| {
        if datum.is_null() {
            if optional {
                return Ok(Value::Null);
            }
            return Err(cdc_error!(
                ErrorKind::NullValueInRequiredField,
                "Null value in required column",
                format!("column '{column_name}' is not nullable")
            ));
        }

        target.convert(datum).ok_or_else(|| {
            cdc_error!(
                ErrorKind::ConversionError,
                "Column value conversion failed",
                format!(
                    "column '{column_name}': cannot convert {} value '{datum}' to {target:?}",
                    datum.kind_name()
                )
            )
        })
    }))
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
    Decimal(u32),
    VariableScaleDecimal,
    Date,
    Time,
    Timestamp,
    ZonedTime,
    ZonedTimestamp,
    Uuid,
    Json,
}

impl Target {
    fn of(schema: &Schema) -> Option<Target> {
        if let Some(logical_type) = schema.logical_type() {
            return Some(match logical_type {
                LogicalType::Decimal { scale } => Target::Decimal(scale),
                LogicalType::VariableScaleDecimal => Target::VariableScaleDecimal,
                LogicalType::Date => Target::Date,
                LogicalType::Time => Target::Time,
                LogicalType::Timestamp => Target::Timestamp,
                LogicalType::ZonedTime => Target::ZonedTime,
                LogicalType::ZonedTimestamp => Target::ZonedTimestamp,
                LogicalType::Uuid => Target::Uuid,
                LogicalType::Json => Target::Json,
            });
        }

        let target = match schema.schema_type() {
            SchemaType::Boolean => Target::Boolean,
            SchemaType::Int8 => Target::Int8,
            SchemaType::Int16 => Target::Int16,
            SchemaType::Int32 => Target::Int32,
            SchemaType::Int64 => Target::Int64,
            SchemaType::Float32 => Target::Float32,
            SchemaType::Float64 => Target::Float64,
            SchemaType::String => Target::String,
            SchemaType::Bytes => Target::Bytes,
            SchemaType::Struct => return None,
        };

        Some(target)
    }

    /// Converts a non-null datum, returning `None` when the datum is incompatible.
    fn convert(self, datum: &Datum) -> Option<Value> {
        let value = match self {
            Target::Boolean => Value::Boolean(to_bool(datum)?),
            Target::Int8 => Value::Int8(i8::try_from(to_i64(datum)?).ok()?),
            Target::Int16 => Value::Int16(i16::try_from(to_i64(datum)?).ok()?),
            Target::Int32 => Value::Int32(i32::try_from(to_i64(datum)?).ok()?),
            Target::Int64 => Value::Int64(to_i64(datum)?),
            Target::Float32 => Value::Float32(to_f64(datum)? as f32),
            Target::Float64 => Value::Float64(to_f64(datum)?),
            Target::String => Value::String(to_string(datum)?),
            Target::Bytes => Value::Bytes(to_bytes(datum)?),
            Target::Decimal(scale) => {
                let decimal = to_decimal(datum)?;
                let rescaled = decimal.with_scale(i64::from(scale));
                // Values that do not fit the declared scale are rejected, never rounded.
                if rescaled != decimal {
                    return None;
                }
                Value::Decimal(rescaled)
            }
            Target::VariableScaleDecimal => Value::Decimal(to_decimal(datum)?),
            Target::Date => Value::Int32(to_date(datum)?.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
            Target::Time => Value::Int64(time_to_micros(to_time(datum)?)),
            Target::Timestamp => Value::Int64(to_timestamp(datum)?.and_utc().timestamp_millis()),
            Target::ZonedTime => Value::String(to_zoned_time(datum)?),
            Target::ZonedTimestamp => Value::String(
                to_timestamptz(datum)?.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            Target::Uuid => Value::String(to_uuid(datum)?.to_string()),
            Target::Json => Value::String(to_json(datum)?.to_string()),
        };

        Some(value)
    }
}

fn to_bool(datum: &Datum) -> Option<bool> {
    match datum {
        Datum::Bool(b) => Some(*b),
        Datum::I16(i) => Some(*i != 0),
        Datum::I32(i) => Some(*i != 0),
        Datum::I64(i) => Some(*i != 0),
        Datum::String(s) => match s.as_str() {
            "t" | "true" | "1" => Some(true),
            "f" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_i64(datum: &Datum) -> Option<i64> {
    match datum {
        Datum::Bool(b) => Some(i64::from(*b)),
        Datum::I16(i) => Some(i64::from(*i)),
        Datum::I32(i) => Some(i64::from(*i)),
        Datum::I64(i) => Some(*i),
        Datum::F32(f) if f.fract() == 0.0 => f.to_i64(),
        Datum::F64(f) if f.fract() == 0.0 => f.to_i64(),
        Datum::Numeric(n) if n.is_integer() => n.to_i64(),
        Datum::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f64(datum: &Datum) -> Option<f64> {
    match datum {
        Datum::I16(i) => Some(f64::from(*i)),
        Datum::I32(i) => Some(f64::from(*i)),
        Datum::I64(i) => Some(*i as f64),
        Datum::F32(f) => Some(f64::from(*f)),
        Datum::F64(f) => Some(*f),
        Datum::Numeric(n) => n.to_f64(),
        Datum::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_decimal(datum: &Datum) -> Option<BigDecimal> {
    match datum {
        Datum::I16(i) => Some(BigDecimal::from(*i)),
        Datum::I32(i) => Some(BigDecimal::from(*i)),
        Datum::I64(i) => Some(BigDecimal::from(*i)),
        // The shortest round-trip representation keeps `3.142` as `3.142` instead of its
        // binary expansion.
        Datum::F32(f) if f.is_finite() => BigDecimal::from_str(&f.to_string()).ok(),
        Datum::F64(f) if f.is_finite() => BigDecimal::from_str(&f.to_string()).ok(),
        Datum::Numeric(n) => Some(n.clone()),
        Datum::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_string(datum: &Datum) -> Option<String> {
    match datum {
        Datum::Bytes(_) | Datum::Null => None,
        Datum::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn to_bytes(datum: &Datum) -> Option<Vec<u8>> {
    match datum {
        Datum::Bytes(b) => Some(b.clone()),
        Datum::String(s) => Some(s.clone().into_bytes()),
        Datum::Uuid(u) => Some(u.as_bytes().to_vec()),
        _ => None,
    }
}

fn to_date(datum: &Datum) -> Option<NaiveDate> {
    match datum {
        Datum::Date(d) => Some(*d),
        Datum::Timestamp(t) => Some(t.date()),
        Datum::TimestampTz(t) => Some(t.date_naive()),
        Datum::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok(),
        _ => None,
    }
}

fn to_time(datum: &Datum) -> Option<NaiveTime> {
    match datum {
        Datum::Time(t) => Some(*t),
        Datum::Timestamp(t) => Some(t.time()),
        Datum::TimestampTz(t) => Some(t.time()),
        Datum::String(s) => NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok(),
        _ => None,
    }
}

fn time_to_micros(time: NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) * 1_000_000 + i64::from(time.nanosecond() / 1_000)
}

fn to_timestamp(datum: &Datum) -> Option<NaiveDateTime> {
    match datum {
        Datum::Timestamp(t) => Some(*t),
        Datum::TimestampTz(t) => Some(t.naive_utc()),
        Datum::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        Datum::String(s) => TIMESTAMP_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s.trim(), format).ok()),
        _ => None,
    }
}

fn to_timestamptz(datum: &Datum) -> Option<DateTime<Utc>> {
    match datum {
        Datum::TimestampTz(t) => Some(*t),
        // Timestamps without zone are taken to be UTC.
        Datum::Timestamp(t) => Some(t.and_utc()),
        Datum::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .or_else(|| {
                    TIMESTAMPTZ_FORMATS
                        .iter()
                        .find_map(|format| DateTime::parse_from_str(s, format).ok())
                })
                .map(|t| t.with_timezone(&Utc))
        }
        _ => None,
    }
}

fn to_zoned_time(datum: &Datum) -> Option<String> {
    match datum {
        Datum::Time(t) => Some(format!("{}Z", t.format(TIME_FORMAT))),
        Datum::TimestampTz(t) => Some(format!("{}Z", t.time().format(TIME_FORMAT))),
        Datum::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn to_uuid(datum: &Datum) -> Option<Uuid> {
    match datum {
        Datum::Uuid(u) => Some(*u),
        Datum::String(s) => Uuid::parse_str(s.trim()).ok(),
        Datum::Bytes(b) => Uuid::from_slice(b).ok(),
        _ => None,
    }
}

fn to_json(datum: &Datum) -> Option<serde_json::Value> {
    match datum {
        Datum::Json(j) => Some(j.clone()),
        Datum::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}
