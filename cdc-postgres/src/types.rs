use std::fmt;

use serde::{Deserialize, Serialize};
use tokio_postgres::types::{Kind, Type};

/// Size of the header Postgres adds to the type modifier of length constrained types.
const VARHDRSZ: i32 = 4;

/// Generic SQL type codes, numerically identical to the `java.sql.Types` constants.
///
/// Every [`crate::schema::Column`] carries one of these codes, independent of the source
/// database's own type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JdbcType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    LongVarBinary,
    Null,
    Other,
    JavaObject,
    Distinct,
    Struct,
    Array,
    Blob,
    Clob,
    Ref,
    DataLink,
    Boolean,
    RowId,
    NChar,
    NVarchar,
    LongNVarchar,
    NClob,
    SqlXml,
    RefCursor,
    TimeWithTimezone,
    TimestampWithTimezone,
}

impl JdbcType {
    /// Returns the numeric `java.sql.Types` code of this type.
    pub fn code(self) -> i32 {
        match self {
            JdbcType::Bit => -7,
            JdbcType::TinyInt => -6,
            JdbcType::SmallInt => 5,
            JdbcType::Integer => 4,
            JdbcType::BigInt => -5,
            JdbcType::Float => 6,
            JdbcType::Real => 7,
            JdbcType::Double => 8,
            JdbcType::Numeric => 2,
            JdbcType::Decimal => 3,
            JdbcType::Char => 1,
            JdbcType::Varchar => 12,
            JdbcType::LongVarchar => -1,
            JdbcType::Date => 91,
            JdbcType::Time => 92,
            JdbcType::Timestamp => 93,
            JdbcType::Binary => -2,
            JdbcType::VarBinary => -3,
            JdbcType::LongVarBinary => -4,
            JdbcType::Null => 0,
            JdbcType::Other => 1111,
            JdbcType::JavaObject => 2000,
            JdbcType::Distinct => 2001,
            JdbcType::Struct => 2002,
            JdbcType::Array => 2003,
            JdbcType::Blob => 2004,
            JdbcType::Clob => 2005,
            JdbcType::Ref => 2006,
            JdbcType::DataLink => 70,
            JdbcType::Boolean => 16,
            JdbcType::RowId => -8,
            JdbcType::NChar => -15,
            JdbcType::NVarchar => -9,
            JdbcType::LongNVarchar => -16,
            JdbcType::NClob => 2011,
            JdbcType::SqlXml => 2009,
            JdbcType::RefCursor => 2012,
            JdbcType::TimeWithTimezone => 2013,
            JdbcType::TimestampWithTimezone => 2014,
        }
    }

    /// Looks up a type by its numeric code.
    pub fn from_code(code: i32) -> Option<JdbcType> {
        let jdbc_type = match code {
            -7 => JdbcType::Bit,
            -6 => JdbcType::TinyInt,
            5 => JdbcType::SmallInt,
            4 => JdbcType::Integer,
            -5 => JdbcType::BigInt,
            6 => JdbcType::Float,
            7 => JdbcType::Real,
            8 => JdbcType::Double,
            2 => JdbcType::Numeric,
            3 => JdbcType::Decimal,
            1 => JdbcType::Char,
            12 => JdbcType::Varchar,
            -1 => JdbcType::LongVarchar,
            91 => JdbcType::Date,
            92 => JdbcType::Time,
            93 => JdbcType::Timestamp,
            -2 => JdbcType::Binary,
            -3 => JdbcType::VarBinary,
            -4 => JdbcType::LongVarBinary,
            0 => JdbcType::Null,
            1111 => JdbcType::Other,
            2000 => JdbcType::JavaObject,
            2001 => JdbcType::Distinct,
            2002 => JdbcType::Struct,
            2003 => JdbcType::Array,
            2004 => JdbcType::Blob,
            2005 => JdbcType::Clob,
            2006 => JdbcType::Ref,
            70 => JdbcType::DataLink,
            16 => JdbcType::Boolean,
            -8 => JdbcType::RowId,
            -15 => JdbcType::NChar,
            -9 => JdbcType::NVarchar,
            -16 => JdbcType::LongNVarchar,
            2011 => JdbcType::NClob,
            2009 => JdbcType::SqlXml,
            2012 => JdbcType::RefCursor,
            2013 => JdbcType::TimeWithTimezone,
            2014 => JdbcType::TimestampWithTimezone,
            _ => return None,
        };

        Some(jdbc_type)
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Converts a Postgres type OID to a [`Type`] instance.
///
/// Returns a properly constructed [`Type`] for the given OID, or creates an unnamed
/// type as fallback if the OID lookup fails.
pub fn convert_type_oid_to_type(type_oid: u32) -> Type {
    Type::from_oid(type_oid).unwrap_or(Type::new(
        format!("unnamed_type({type_oid})"),
        type_oid,
        Kind::Simple,
        "pg_catalog".to_string(),
    ))
}

/// Maps a Postgres type onto the generic [`JdbcType`] used by the schema builder.
///
/// Array types map to [`JdbcType::Array`]; anything without a direct counterpart, such as
/// `uuid`, `json` or enums, maps to [`JdbcType::Other`].
pub fn convert_type_to_jdbc_type(typ: &Type) -> JdbcType {
    if matches!(typ.kind(), Kind::Array(_)) {
        return JdbcType::Array;
    }

    match *typ {
        Type::BOOL => JdbcType::Bit,
        Type::CHAR | Type::INT2 => JdbcType::SmallInt,
        Type::INT4 | Type::OID => JdbcType::Integer,
        Type::INT8 => JdbcType::BigInt,
        Type::FLOAT4 => JdbcType::Real,
        Type::FLOAT8 | Type::MONEY => JdbcType::Double,
        Type::NUMERIC => JdbcType::Numeric,
        Type::BPCHAR => JdbcType::Char,
        Type::VARCHAR | Type::TEXT | Type::NAME => JdbcType::Varchar,
        Type::DATE => JdbcType::Date,
        Type::TIME => JdbcType::Time,
        Type::TIMETZ => JdbcType::TimeWithTimezone,
        Type::TIMESTAMP => JdbcType::Timestamp,
        Type::TIMESTAMPTZ => JdbcType::TimestampWithTimezone,
        Type::BYTEA => JdbcType::Binary,
        _ => JdbcType::Other,
    }
}

/// Extracts the declared length and scale of a column from its type modifier.
///
/// A modifier of `-1` means no constraint was declared, in which case both values are `None`.
pub fn column_length_and_scale(typ: &Type, modifier: i32) -> (Option<u32>, Option<u32>) {
    if modifier < 0 {
        return (None, None);
    }

    match *typ {
        Type::VARCHAR | Type::BPCHAR => {
            let length = modifier - VARHDRSZ;
            (u32::try_from(length).ok(), None)
        }
        Type::NUMERIC => {
            let modifier = modifier - VARHDRSZ;
            let precision = (modifier >> 16) & 0xffff;
            let scale = modifier & 0xffff;
            (u32::try_from(precision).ok(), u32::try_from(scale).ok())
        }
        Type::TIME | Type::TIMETZ | Type::TIMESTAMP | Type::TIMESTAMPTZ => {
            (None, u32::try_from(modifier).ok())
        }
        _ => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for jdbc_type in [
            JdbcType::Bit,
            JdbcType::BigInt,
            JdbcType::Numeric,
            JdbcType::Varchar,
            JdbcType::Date,
            JdbcType::Other,
            JdbcType::TimestampWithTimezone,
        ] {
            assert_eq!(JdbcType::from_code(jdbc_type.code()), Some(jdbc_type));
        }
        assert_eq!(JdbcType::from_code(424242), None);
    }

    #[test]
    fn well_known_codes_match_sql_types() {
        assert_eq!(JdbcType::Integer.code(), 4);
        assert_eq!(JdbcType::Varchar.code(), 12);
        assert_eq!(JdbcType::Numeric.code(), 2);
        assert_eq!(JdbcType::Date.code(), 91);
    }

    #[test]
    fn postgres_types_map_to_jdbc_types() {
        assert_eq!(convert_type_to_jdbc_type(&Type::INT4), JdbcType::Integer);
        assert_eq!(convert_type_to_jdbc_type(&Type::TEXT), JdbcType::Varchar);
        assert_eq!(convert_type_to_jdbc_type(&Type::NUMERIC), JdbcType::Numeric);
        assert_eq!(convert_type_to_jdbc_type(&Type::INT4_ARRAY), JdbcType::Array);
        assert_eq!(convert_type_to_jdbc_type(&Type::UUID), JdbcType::Other);
    }

    #[test]
    fn type_modifiers_are_decoded() {
        assert_eq!(column_length_and_scale(&Type::VARCHAR, 14), (Some(10), None));
        let numeric_modifier = ((5 << 16) | 3) + VARHDRSZ;
        assert_eq!(
            column_length_and_scale(&Type::NUMERIC, numeric_modifier),
            (Some(5), Some(3))
        );
        assert_eq!(column_length_and_scale(&Type::TIMESTAMP, 3), (None, Some(3)));
        assert_eq!(column_length_and_scale(&Type::TEXT, -1), (None, None));
    }

    #[test]
    fn unknown_oids_produce_unnamed_types() {
        let typ = convert_type_oid_to_type(999_999);
        assert_eq!(typ.name(), "unnamed_type(999999)");
        assert_eq!(convert_type_oid_to_type(23), Type::INT4);
    }
}
