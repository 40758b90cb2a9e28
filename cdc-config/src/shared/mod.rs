mod base;
mod connection;
mod replication;
mod retry;
mod topic;

pub use base::*;
pub use connection::*;
pub use replication::*;
pub use retry::*;
pub use topic::*;
