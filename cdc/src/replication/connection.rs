use std::fmt;

use cdc_config::shared::{PgConnectionConfig, ReplicationConfig, RetryConfig};
use cdc_postgres::lsn::{Lsn, format_lsn};
use tracing::{info, warn};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::record::SourceOffset;
use crate::replication::client::{
    PgReplicationClient, ReplicationClient, SlotState, drop_slot_tolerant,
};
use crate::replication::stream::{ReplicationStream, StreamHandle, WorkerSettings};

/// Lifecycle of a [`ReplicationConnection`]. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Streaming,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Created => f.write_str("created"),
            ConnectionState::Streaming => f.write_str("streaming"),
            ConnectionState::Closed => f.write_str("closed"),
        }
    }
}

/// Builder of a [`ReplicationConnection`].
///
/// Starts from the defaults of [`ReplicationConfig`].
#[derive(Debug, Clone)]
pub struct ReplicationConnectionBuilder {
    config: ReplicationConfig,
}

impl ReplicationConnectionBuilder {
    pub fn with_slot(mut self, slot_name: impl Into<String>) -> Self {
        self.config.slot_name = slot_name.into();
        self
    }

    pub fn with_plugin(mut self, plugin_name: impl Into<String>) -> Self {
        self.config.plugin_name = plugin_name.into();
        self
    }

    pub fn drop_slot_on_close(mut self, drop_slot_on_close: bool) -> Self {
        self.config.drop_slot_on_close = drop_slot_on_close;
        self
    }

    pub fn create_slot_if_missing(mut self, create_slot_if_missing: bool) -> Self {
        self.config.create_slot_if_missing = create_slot_if_missing;
        self
    }

    /// Seconds between two status updates.
    ///
    /// Must be positive, at most a day and lower than the connection timeout, which defaults to
    /// 60 seconds. Raise the timeout as well when setting an interval of a minute or more.
    pub fn status_update_interval_secs(mut self, secs: u64) -> Self {
        self.config.status_update_interval_secs = secs;
        self
    }

    pub fn connection_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connection_timeout_secs = secs;
        self
    }

    /// Adds an option passed to the decoding plugin when streaming starts.
    pub fn with_plugin_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.plugin_options.insert(key.into(), value.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Validates the settings and connects to Postgres.
    pub async fn build(self) -> CdcResult<ReplicationConnection<PgReplicationClient>> {
        self.config.validate()?;

        let client =
            PgReplicationClient::connect(self.config.pg_connection.clone(), self.config.retry.clone())
                .await?;

        Ok(ReplicationConnection::new(self.config, client))
    }

    /// Validates the settings and creates a connection on top of an existing client.
    pub fn build_with_client<C: ReplicationClient>(
        self,
        client: C,
    ) -> CdcResult<ReplicationConnection<C>> {
        self.config.validate()?;

        Ok(ReplicationConnection::new(self.config, client))
    }
}

/// A logical replication session on one slot.
///
/// The connection owns the slot lifecycle: it creates the slot on first use when allowed,
/// starts streaming from the requested or confirmed position and drops the slot on close when
/// configured.
pub struct ReplicationConnection<C = PgReplicationClient> {
    config: ReplicationConfig,
    client: C,
    state: ConnectionState,
    stream_handle: Option<StreamHandle>,
    /// Set once this connection created the slot or streamed from it.
    owns_slot: bool,
}

impl ReplicationConnection<PgReplicationClient> {
    /// Returns a builder with default settings for the given database.
    pub fn builder(pg_connection: PgConnectionConfig) -> ReplicationConnectionBuilder {
        ReplicationConnectionBuilder {
            config: ReplicationConfig::new(pg_connection),
        }
    }

    /// Validates `config` and connects to Postgres.
    pub async fn from_config(config: &ReplicationConfig) -> CdcResult<Self> {
        ReplicationConnectionBuilder {
            config: config.clone(),
        }
        .build()
        .await
    }
}

impl<C: ReplicationClient> ReplicationConnection<C> {
    fn new(config: ReplicationConfig, client: C) -> Self {
        Self {
            config,
            client,
            state: ConnectionState::Created,
            stream_handle: None,
            owns_slot: false,
        }
    }

    pub fn slot_name(&self) -> &str {
        &self.config.slot_name
    }

    pub fn plugin_name(&self) -> &str {
        &self.config.plugin_name
    }

    /// The lifecycle state. A stream that ended on its own leaves the connection closed.
    pub fn state(&self) -> ConnectionState {
        match self.state {
            ConnectionState::Streaming
                if self
                    .stream_handle
                    .as_ref()
                    .is_none_or(StreamHandle::is_closed) =>
            {
                ConnectionState::Closed
            }
            state => state,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Whether the connection can still be used. Never blocks.
    pub fn is_connected(&self) -> bool {
        match self.state() {
            ConnectionState::Created => !self.client.is_closed(),
            ConnectionState::Streaming => true,
            ConnectionState::Closed => false,
        }
    }

    /// The position to resume from after a restart.
    ///
    /// Before streaming starts the position is [`Lsn::INVALID`], meaning the slot's own.
    pub fn offset(&self) -> SourceOffset {
        SourceOffset {
            slot_name: self.config.slot_name.clone(),
            plugin_name: self.config.plugin_name.clone(),
            lsn: self
                .stream_handle
                .as_ref()
                .map_or(Lsn::INVALID, StreamHandle::last_flushed_lsn),
        }
    }

    /// Formats a raw WAL position for display.
    pub fn format_lsn(lsn: u64) -> String {
        format_lsn(lsn)
    }

    /// Starts streaming changes.
    ///
    /// Without a valid `from_lsn` streaming resumes at the position confirmed on the slot, which
    /// for a new slot is its consistent point. A `from_lsn` older than that position cannot be
    /// served and fails with [`ErrorKind::ReplicationLsnNotRetained`].
    pub async fn start_streaming(&mut self, from_lsn: Option<Lsn>) -> CdcResult<ReplicationStream> {
        let state = self.state();
        if state != ConnectionState::Created {
            bail!(
                ErrorKind::InvalidState,
                "Replication connection cannot start streaming",
                format!("connection is {state}")
            );
        }

        let slot_name = self.config.slot_name.clone();
        let slot_lsn = self.prepare_slot(&slot_name).await?;

        let start_lsn = match from_lsn.filter(|lsn| lsn.is_valid()) {
            Some(lsn) if lsn < slot_lsn => bail!(
                ErrorKind::ReplicationLsnNotRetained,
                "Requested position is no longer available",
                format!(
                    "slot '{slot_name}' is at {slot_lsn}, requested {lsn} which was already confirmed"
                )
            ),
            Some(lsn) => lsn,
            None => slot_lsn,
        };

        let transport = self
            .client
            .start_replication(&slot_name, start_lsn, &self.config.plugin_options)
            .await?;

        self.owns_slot = true;

        let stream = ReplicationStream::start(
            transport,
            start_lsn,
            WorkerSettings {
                slot_name: slot_name.clone(),
                status_update_interval: self.config.status_update_interval(),
                connection_timeout: self.config.connection_timeout(),
            },
        );
        self.stream_handle = Some(stream.handle());
        self.state = ConnectionState::Streaming;

        info!(
            slot_name = %slot_name,
            plugin_name = %self.config.plugin_name,
            %start_lsn,
            "replication streaming started"
        );

        Ok(stream)
    }

    /// Makes sure the slot exists and can be consumed, returning its confirmed position.
    async fn prepare_slot(&mut self, slot_name: &str) -> CdcResult<Lsn> {
        let slot = match self.client.get_slot(slot_name).await? {
            Some(slot) => slot,
            None if self.config.create_slot_if_missing => {
                match self
                    .client
                    .create_slot(slot_name, &self.config.plugin_name)
                    .await
                {
                    Ok(consistent_point) => {
                        self.owns_slot = true;
                        return Ok(consistent_point);
                    }
                    // Another consumer created it in the meantime.
                    Err(err) if err.kind() == ErrorKind::ReplicationSlotAlreadyExists => {
                        self.existing_slot(slot_name).await?
                    }
                    Err(err) => return Err(err),
                }
            }
            None => bail!(
                ErrorKind::ReplicationSlotNotFound,
                "Replication slot not found",
                format!("slot '{slot_name}' does not exist and slot creation is disabled")
            ),
        };

        self.check_slot(&slot)?;
        info!(
            slot_name,
            confirmed_flush_lsn = %slot.confirmed_flush_lsn,
            "using existing replication slot"
        );

        Ok(slot.confirmed_flush_lsn)
    }

    async fn existing_slot(&self, slot_name: &str) -> CdcResult<SlotState> {
        match self.client.get_slot(slot_name).await? {
            Some(slot) => Ok(slot),
            None => bail!(
                ErrorKind::ReplicationSlotNotFound,
                "Replication slot not found",
                format!("slot '{slot_name}' disappeared after a concurrent creation")
            ),
        }
    }

    fn check_slot(&self, slot: &SlotState) -> CdcResult<()> {
        if slot.plugin != self.config.plugin_name {
            bail!(
                ErrorKind::ConfigError,
                "Replication slot uses another plugin",
                format!(
                    "slot '{}' uses plugin '{}', expected '{}'",
                    slot.slot_name, slot.plugin, self.config.plugin_name
                )
            );
        }
        if slot.active {
            bail!(
                ErrorKind::ReplicationSlotInUse,
                "Replication slot is in use",
                format!("slot '{}' is consumed by another connection", slot.slot_name)
            );
        }
        if slot.wal_lost {
            bail!(
                ErrorKind::ReplicationLsnNotRetained,
                "Replication slot lost required WAL",
                format!("WAL needed by slot '{}' has been removed", slot.slot_name)
            );
        }

        Ok(())
    }

    /// Closes the connection.
    ///
    /// Stops a running stream after its final status update, then drops the slot when
    /// configured. Only a slot this connection created or streamed from is dropped, so a slot
    /// held by another consumer survives. A failure to drop the slot is logged and not returned.
    pub async fn close(&mut self) -> CdcResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }

        let streamed = self.stream_handle.is_some();
        if let Some(handle) = self.stream_handle.as_ref() {
            handle.close().await;
        }

        if self.config.drop_slot_on_close && self.owns_slot {
            // Our walsender may still be shutting down on the server.
            drop_slot_tolerant(&self.client, &self.config.slot_name, streamed).await;
        } else if streamed {
            warn!(
                slot_name = %self.config.slot_name,
                "keeping replication slot, it retains WAL until the next connection"
            );
        }

        self.state = ConnectionState::Closed;
        info!(slot_name = %self.config.slot_name, "replication connection closed");

        Ok(())
    }
}

impl<C> fmt::Debug for ReplicationConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationConnection")
            .field("slot_name", &self.config.slot_name)
            .field("plugin_name", &self.config.plugin_name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
