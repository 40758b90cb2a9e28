//! Signalling primitives shared by background workers.

pub mod shutdown;
pub mod signal;
