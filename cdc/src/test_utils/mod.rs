//! Test doubles and fixtures for the replication and schema layers.
//!
//! [`replication::MemoryReplicationClient`] scripts a replication session without a server and
//! records everything the stream worker sends back. [`table`] holds table definitions and rows
//! shared by tests.

pub mod replication;
pub mod table;
