//! Postgres replication slot helpers.

mod slots;

pub use slots::*;
