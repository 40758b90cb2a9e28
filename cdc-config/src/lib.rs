//! Configuration management for the CDC crates.
//!
//! Provides environment detection, configuration loading from YAML files and `APP_` prefixed
//! environment variables, secret handling, and the shared configuration types used to build a
//! replication connection.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
