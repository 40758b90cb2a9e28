//! Postgres metadata model shared by all CDC crates.
//!
//! This crate provides the immutable relational model ([`schema::Table`], [`schema::Column`]),
//! JDBC type codes, log sequence numbers and the few Postgres constants the replication layer
//! needs.

pub mod lsn;
pub mod replication;
pub mod schema;
pub mod time;
pub mod types;
