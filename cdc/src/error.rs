use std::error;
use std::fmt;

use cdc_config::shared::ValidationError;
use cdc_postgres::lsn::ParseLsnError;
use cdc_postgres::replication::SlotError;
use cdc_postgres::schema::TableEditError;

/// Convenient result type for CDC operations using [`CdcError`] as the error type.
pub type CdcResult<T> = Result<T, CdcError>;

/// Main error type of the CDC core.
///
/// A [`CdcError`] is either a single error, described by an [`ErrorKind`] plus a static
/// description and optional detail, or an aggregate of several errors. Callers branch on
/// [`CdcError::kind`].
#[derive(Debug, Clone)]
pub struct CdcError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    WithDescription(ErrorKind, &'static str),
    WithDescriptionAndDetail(ErrorKind, &'static str, String),
    Many(Vec<CdcError>),
}

/// Specific categories of errors that can occur while capturing changes.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connectivity
    SourceConnectionFailed,
    SourceConnectionLost,
    SourceIoError,
    SourceQueryFailed,
    SourceDatabaseShutdown,
    SourceDatabaseInRecovery,
    AuthenticationError,

    // Replication slot
    ReplicationSlotNotFound,
    ReplicationSlotInUse,
    ReplicationSlotAlreadyExists,
    ReplicationSlotNotCreated,
    ReplicationLsnNotRetained,

    // Configuration
    ConfigError,
    UnsupportedColumnType,

    // Schema derivation
    SchemaNameConflict,
    DuplicateSchemaName,
    InvalidTableDefinition,
    MissingTableSchema,
    SourceSchemaError,

    // Data
    ColumnCountMismatch,
    ConversionError,
    NullValueInRequiredField,
    InvalidData,
    DeserializationError,

    // Acknowledgement and state
    LsnRegression,
    InvalidState,

    IoError,
    SourceError,
    Unknown,
}

impl ErrorKind {
    /// Returns `true` for failures that may go away when the operation is retried.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::SourceConnectionFailed
                | ErrorKind::SourceIoError
                | ErrorKind::SourceDatabaseShutdown
                | ErrorKind::SourceDatabaseInRecovery
        )
    }
}

impl CdcError {
    /// Creates a [`CdcError`] containing multiple aggregated errors.
    pub fn many(errors: Vec<CdcError>) -> CdcError {
        CdcError {
            repr: ErrorRepr::Many(errors),
        }
    }

    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => kind,
            ErrorRepr::Many(ref errors) => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::WithDescription(kind, _)
            | ErrorRepr::WithDescriptionAndDetail(kind, _, _) => vec![kind],
            ErrorRepr::Many(ref errors) => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the dynamic detail of the error, if any.
    ///
    /// For multiple errors, returns the detail of the first error that has one.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::WithDescriptionAndDetail(_, _, ref detail) => Some(detail.as_str()),
            ErrorRepr::Many(ref errors) => errors.iter().find_map(|e| e.detail()),
            _ => None,
        }
    }
}

impl PartialEq for CdcError {
    fn eq(&self, other: &CdcError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::WithDescription(kind_a, _), ErrorRepr::WithDescription(kind_b, _)) => {
                kind_a == kind_b
            }
            (
                ErrorRepr::WithDescriptionAndDetail(kind_a, _, _),
                ErrorRepr::WithDescriptionAndDetail(kind_b, _, _),
            ) => kind_a == kind_b,
            (ErrorRepr::Many(errors_a), ErrorRepr::Many(errors_b)) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for CdcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.repr {
            ErrorRepr::WithDescription(kind, desc) => write!(f, "{kind:?}: {desc}"),
            ErrorRepr::WithDescriptionAndDetail(kind, desc, ref detail) => {
                write!(f, "{kind:?}: {desc} -> {detail}")
            }
            ErrorRepr::Many(ref errors) => match errors.as_slice() {
                [] => write!(f, "Multiple errors occurred (empty)"),
                [single] => single.fmt(f),
                errors => {
                    write!(f, "Multiple errors occurred ({} total):", errors.len())?;
                    for (i, error) in errors.iter().enumerate() {
                        write!(f, "\n  {}: {}", i + 1, error)?;
                    }
                    Ok(())
                }
            },
        }
    }
}

impl error::Error for CdcError {}

impl From<(ErrorKind, &'static str)> for CdcError {
    fn from((kind, desc): (ErrorKind, &'static str)) -> CdcError {
        CdcError {
            repr: ErrorRepr::WithDescription(kind, desc),
        }
    }
}

impl From<(ErrorKind, &'static str, String)> for CdcError {
    fn from((kind, desc, detail): (ErrorKind, &'static str, String)) -> CdcError {
        CdcError {
            repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail),
        }
    }
}

impl<E> From<Vec<E>> for CdcError
where
    E: Into<CdcError>,
{
    fn from(errors: Vec<E>) -> CdcError {
        CdcError {
            repr: ErrorRepr::Many(errors.into_iter().map(Into::into).collect()),
        }
    }
}

fn with_detail(kind: ErrorKind, desc: &'static str, detail: impl fmt::Display) -> CdcError {
    CdcError {
        repr: ErrorRepr::WithDescriptionAndDetail(kind, desc, detail.to_string()),
    }
}

impl From<std::io::Error> for CdcError {
    fn from(err: std::io::Error) -> CdcError {
        with_detail(ErrorKind::IoError, "I/O error occurred", err)
    }
}

impl From<serde_json::Error> for CdcError {
    fn from(err: serde_json::Error) -> CdcError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        with_detail(kind, description, err)
    }
}

impl From<std::num::ParseIntError> for CdcError {
    fn from(err: std::num::ParseIntError) -> CdcError {
        with_detail(ErrorKind::ConversionError, "Integer parsing failed", err)
    }
}

impl From<std::num::ParseFloatError> for CdcError {
    fn from(err: std::num::ParseFloatError) -> CdcError {
        with_detail(ErrorKind::ConversionError, "Float parsing failed", err)
    }
}

impl From<bigdecimal::ParseBigDecimalError> for CdcError {
    fn from(err: bigdecimal::ParseBigDecimalError) -> CdcError {
        with_detail(ErrorKind::ConversionError, "Decimal parsing failed", err)
    }
}

impl From<chrono::ParseError> for CdcError {
    fn from(err: chrono::ParseError) -> CdcError {
        with_detail(ErrorKind::ConversionError, "Chrono parse failed", err)
    }
}

impl From<uuid::Error> for CdcError {
    fn from(err: uuid::Error) -> CdcError {
        with_detail(ErrorKind::InvalidData, "UUID parsing failed", err)
    }
}

impl From<regex::Error> for CdcError {
    fn from(err: regex::Error) -> CdcError {
        with_detail(ErrorKind::ConfigError, "Invalid regular expression", err)
    }
}

impl From<ValidationError> for CdcError {
    fn from(err: ValidationError) -> CdcError {
        with_detail(ErrorKind::ConfigError, "Invalid configuration", err)
    }
}

impl From<SlotError> for CdcError {
    fn from(err: SlotError) -> CdcError {
        with_detail(ErrorKind::ConfigError, "Invalid replication slot name", err)
    }
}

impl From<TableEditError> for CdcError {
    fn from(err: TableEditError) -> CdcError {
        with_detail(
            ErrorKind::InvalidTableDefinition,
            "Invalid table definition",
            err,
        )
    }
}

impl From<ParseLsnError> for CdcError {
    fn from(err: ParseLsnError) -> CdcError {
        with_detail(ErrorKind::InvalidData, "Invalid log sequence number", err)
    }
}

/// Converts [`tokio_postgres::Error`] to [`CdcError`] by SQLSTATE class.
///
/// Errors without a SQLSTATE come from the client side of the connection: a closed connection
/// maps to [`ErrorKind::SourceConnectionLost`], anything else to
/// [`ErrorKind::SourceConnectionFailed`].
impl From<tokio_postgres::Error> for CdcError {
    fn from(err: tokio_postgres::Error) -> CdcError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
                    | SqlState::TOO_MANY_CONNECTIONS
                    | SqlState::IDLE_SESSION_TIMEOUT => (
                        ErrorKind::SourceConnectionFailed,
                        "PostgreSQL connection error",
                    ),

                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),

                    // The slot is held by another walsender.
                    SqlState::OBJECT_IN_USE => (
                        ErrorKind::ReplicationSlotInUse,
                        "PostgreSQL replication slot in use",
                    ),
                    SqlState::UNDEFINED_OBJECT => (
                        ErrorKind::ReplicationSlotNotFound,
                        "PostgreSQL replication slot not found",
                    ),
                    SqlState::DUPLICATE_OBJECT => (
                        ErrorKind::ReplicationSlotAlreadyExists,
                        "PostgreSQL replication slot already exists",
                    ),
                    // Raised when the requested WAL segment has already been removed.
                    SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE => (
                        ErrorKind::ReplicationLsnNotRetained,
                        "PostgreSQL replication slot cannot serve the requested position",
                    ),

                    SqlState::DATA_EXCEPTION
                    | SqlState::INVALID_TEXT_REPRESENTATION
                    | SqlState::INVALID_DATETIME_FORMAT
                    | SqlState::NUMERIC_VALUE_OUT_OF_RANGE => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion error",
                    ),

                    SqlState::UNDEFINED_TABLE
                    | SqlState::UNDEFINED_COLUMN
                    | SqlState::UNDEFINED_SCHEMA
                    | SqlState::FEATURE_NOT_SUPPORTED => (
                        ErrorKind::SourceSchemaError,
                        "PostgreSQL schema object not found",
                    ),

                    SqlState::SYNTAX_ERROR
                    | SqlState::SYNTAX_ERROR_OR_ACCESS_RULE_VIOLATION
                    | SqlState::INSUFFICIENT_PRIVILEGE
                    | SqlState::PROGRAM_LIMIT_EXCEEDED
                    | SqlState::INTERNAL_ERROR
                    | SqlState::SYSTEM_ERROR => (
                        ErrorKind::SourceQueryFailed,
                        "PostgreSQL query failed",
                    ),

                    SqlState::IO_ERROR | SqlState::DISK_FULL | SqlState::DATA_CORRUPTED => {
                        (ErrorKind::SourceIoError, "PostgreSQL I/O error")
                    }

                    SqlState::ADMIN_SHUTDOWN | SqlState::CRASH_SHUTDOWN => (
                        ErrorKind::SourceDatabaseShutdown,
                        "PostgreSQL shutdown",
                    ),
                    SqlState::CANNOT_CONNECT_NOW => (
                        ErrorKind::SourceDatabaseInRecovery,
                        "PostgreSQL database in recovery",
                    ),

                    SqlState::CONFIG_FILE_ERROR | SqlState::CONFIGURATION_LIMIT_EXCEEDED => {
                        (ErrorKind::ConfigError, "PostgreSQL configuration error")
                    }

                    _ => (ErrorKind::SourceError, "PostgreSQL error"),
                }
            }
            None if err.is_closed() => (
                ErrorKind::SourceConnectionLost,
                "PostgreSQL connection closed",
            ),
            None => (
                ErrorKind::SourceConnectionFailed,
                "PostgreSQL connection failed",
            ),
        };

        with_detail(kind, description, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bail, cdc_error};

    #[test]
    fn test_simple_error_creation() {
        let err = CdcError::from((ErrorKind::SourceConnectionFailed, "Connection failed"));
        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
        assert_eq!(err.detail(), None);
        assert_eq!(err.kinds(), vec![ErrorKind::SourceConnectionFailed]);
    }

    #[test]
    fn test_error_with_detail() {
        let err = cdc_error!(
            ErrorKind::LsnRegression,
            "Flushed position moved backwards",
            "0/10 < 0/20"
        );
        assert_eq!(err.kind(), ErrorKind::LsnRegression);
        assert_eq!(err.detail(), Some("0/10 < 0/20"));
        assert!(err.to_string().contains("LsnRegression"));
        assert!(err.to_string().contains("0/10 < 0/20"));
    }

    #[test]
    fn test_multiple_errors() {
        let err = CdcError::many(vec![
            cdc_error!(ErrorKind::SchemaNameConflict, "Conflict", "a-b"),
            cdc_error!(ErrorKind::DuplicateSchemaName, "Duplicate"),
        ]);

        assert_eq!(err.kind(), ErrorKind::SchemaNameConflict);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::SchemaNameConflict, ErrorKind::DuplicateSchemaName]
        );
        assert_eq!(err.detail(), Some("a-b"));
        assert!(err.to_string().contains("2 total"));
    }

    #[test]
    fn test_empty_multiple_errors() {
        let err = CdcError::many(vec![]);
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.kinds().is_empty());
    }

    #[test]
    fn test_error_equality_compares_kinds() {
        let a = cdc_error!(ErrorKind::InvalidState, "Stream closed");
        let b = cdc_error!(ErrorKind::InvalidState, "Connection closed");
        let c = cdc_error!(ErrorKind::ConfigError, "Stream closed");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_bail_macro() {
        fn fails() -> CdcResult<()> {
            bail!(ErrorKind::ConfigError, "Bad setting", "interval is zero");
        }

        let err = fails().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(err.detail(), Some("interval is zero"));
    }

    #[test]
    fn test_leaf_crate_errors_are_classified() {
        let err: CdcError = TableEditError::MissingColumnName.into();
        assert_eq!(err.kind(), ErrorKind::InvalidTableDefinition);

        let err: CdcError = ValidationError::ZeroStatusUpdateInterval.into();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let err: CdcError = "nope".parse::<cdc_postgres::lsn::Lsn>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::SourceConnectionFailed.is_transient());
        assert!(ErrorKind::SourceDatabaseInRecovery.is_transient());
        assert!(!ErrorKind::ReplicationSlotInUse.is_transient());
        assert!(!ErrorKind::ConfigError.is_transient());
    }
}
