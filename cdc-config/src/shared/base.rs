use cdc_postgres::replication::SlotError;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("`{0}` must not be empty")]
    MissingField(&'static str),

    #[error("invalid `slot_name`: {0}")]
    InvalidSlotName(#[from] SlotError),

    #[error("`status_update_interval_secs` must be greater than zero")]
    ZeroStatusUpdateInterval,

    #[error("`status_update_interval_secs` must be at most {max}, got {interval}")]
    StatusUpdateIntervalTooLong { interval: u64, max: u64 },

    #[error(
        "`connection_timeout_secs` ({timeout}) must be greater than `status_update_interval_secs` ({interval})"
    )]
    ConnectionTimeoutTooShort { timeout: u64, interval: u64 },

    #[error("`retry.max_attempts` cannot be zero")]
    MaxAttemptsZero,

    #[error("`retry.backoff_factor` must be at least 1.0, got {0}")]
    InvalidBackoffFactor(f32),

    #[error("`topic.mapper.pattern` must not be empty")]
    EmptyTopicPattern,
}
