use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Shard suffix pattern used when [`TopicMapperConfig::ByShardedCatalog`] has no pattern.
pub const DEFAULT_SHARD_PATTERN: &str = r"^(.+)_\d+$";

/// Destination naming settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Prefix of every topic and schema name. Usually the logical server name.
    pub prefix: String,
    pub mapper: TopicMapperConfig,
}

impl TopicConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let TopicMapperConfig::ByShardedCatalog { pattern: Some(pattern) } = &self.mapper
            && pattern.is_empty()
        {
            return Err(ValidationError::EmptyTopicPattern);
        }

        Ok(())
    }
}

/// Selects how tables are routed to topics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicMapperConfig {
    /// One topic per table.
    #[default]
    ByTable,
    /// One topic per catalog, with the shard suffix of the catalog removed.
    ///
    /// `pattern` must have one capture group holding the topic name.
    ByShardedCatalog {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

impl TopicMapperConfig {
    /// Returns the shard pattern, falling back to [`DEFAULT_SHARD_PATTERN`].
    pub fn shard_pattern(&self) -> Option<&str> {
        match self {
            TopicMapperConfig::ByTable => None,
            TopicMapperConfig::ByShardedCatalog { pattern } => {
                Some(pattern.as_deref().unwrap_or(DEFAULT_SHARD_PATTERN))
            }
        }
    }
}
