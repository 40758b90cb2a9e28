//! Change data capture core for Postgres logical replication.
//!
//! [`replication`] manages the replication slot and streams raw changes with their log sequence
//! numbers. [`schema`] derives key and value schemas from table definitions and turns rows into
//! [`record::SourceRecord`]s routed by a [`topic::TopicMapper`].

pub mod concurrency;
pub mod conversions;
pub mod error;
mod macros;
pub mod record;
pub mod replication;
pub mod schema;
pub mod sink;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod topic;
