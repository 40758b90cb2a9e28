use std::collections::BTreeMap;
use std::time::Duration;

use cdc_postgres::replication::validate_slot_name;
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{PgConnectionConfig, RetryConfig, TopicConfig, ValidationError};

/// Settings of a logical replication connection.
///
/// Every field except the connection has a default, so a configuration file only needs a
/// `pg_connection` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub pg_connection: PgConnectionConfig,
    #[serde(default = "default_slot_name")]
    pub slot_name: String,
    /// Logical decoding plugin the slot is created with.
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,
    /// Whether the slot is dropped when the connection is closed.
    #[serde(default = "default_true")]
    pub drop_slot_on_close: bool,
    /// Whether the slot is created when it does not exist.
    #[serde(default = "default_true")]
    pub create_slot_if_missing: bool,
    /// Seconds between two standby status updates sent to the server.
    #[serde(default = "default_status_update_interval_secs")]
    pub status_update_interval_secs: u64,
    /// Seconds of silence on the stream after which the connection is considered lost.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// Options passed verbatim to the decoding plugin in `START_REPLICATION`.
    #[serde(default)]
    pub plugin_options: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub topic: TopicConfig,
}

pub const DEFAULT_SLOT_NAME: &str = "debezium";
pub const DEFAULT_PLUGIN_NAME: &str = "decoderbufs";
pub const DEFAULT_STATUS_UPDATE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 60;
/// Upper bound of `status_update_interval_secs`, one day.
pub const MAX_STATUS_UPDATE_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn default_slot_name() -> String {
    DEFAULT_SLOT_NAME.to_string()
}

fn default_plugin_name() -> String {
    DEFAULT_PLUGIN_NAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_status_update_interval_secs() -> u64 {
    DEFAULT_STATUS_UPDATE_INTERVAL_SECS
}

fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

impl ReplicationConfig {
    /// Creates a configuration with default settings for the given connection.
    pub fn new(pg_connection: PgConnectionConfig) -> Self {
        Self {
            pg_connection,
            slot_name: default_slot_name(),
            plugin_name: default_plugin_name(),
            drop_slot_on_close: true,
            create_slot_if_missing: true,
            status_update_interval_secs: DEFAULT_STATUS_UPDATE_INTERVAL_SECS,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            plugin_options: BTreeMap::new(),
            retry: RetryConfig::default(),
            topic: TopicConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pg_connection.validate()?;
        validate_slot_name(&self.slot_name)?;

        if self.plugin_name.is_empty() {
            return Err(ValidationError::MissingField("plugin_name"));
        }
        if self.status_update_interval_secs == 0 {
            return Err(ValidationError::ZeroStatusUpdateInterval);
        }
        if self.status_update_interval_secs > MAX_STATUS_UPDATE_INTERVAL_SECS {
            return Err(ValidationError::StatusUpdateIntervalTooLong {
                interval: self.status_update_interval_secs,
                max: MAX_STATUS_UPDATE_INTERVAL_SECS,
            });
        }
        if self.connection_timeout_secs <= self.status_update_interval_secs {
            return Err(ValidationError::ConnectionTimeoutTooShort {
                timeout: self.connection_timeout_secs,
                interval: self.status_update_interval_secs,
            });
        }

        self.retry.validate()?;
        self.topic.validate()
    }

    pub fn status_update_interval(&self) -> Duration {
        Duration::from_secs(self.status_update_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

/// Root of the configuration files loaded by [`crate::load_config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CdcConfig {
    pub replication: ReplicationConfig,
}

impl CdcConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.replication.validate()
    }
}

impl Config for CdcConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
