//! Logical replication sessions on a Postgres slot.
//!
//! A [`ReplicationConnection`] manages the slot and starts a [`ReplicationStream`], whose
//! background worker reads changes and keeps the server informed of the consumer position.
//! The server side is reached through the [`ReplicationClient`] and [`ReplicationTransport`]
//! traits.

mod client;
mod connection;
mod retry;
mod stream;

pub use client::{
    PgReplicationClient, PgReplicationTransport, ReplicationClient, ReplicationTransport,
    SlotState, WalMessage,
};
pub use connection::{ConnectionState, ReplicationConnection, ReplicationConnectionBuilder};
pub use stream::{ChangeRecord, LsnTracker, ReplicationStream, StreamHandle};
