use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use cdc_config::shared::{IntoConnectOptions, PgConnectionConfig, RetryConfig};
use cdc_postgres::lsn::Lsn;
use cdc_postgres::schema::{Column, Table, TableId};
use cdc_postgres::time::postgres_now_micros;
use cdc_postgres::types::{
    column_length_and_scale, convert_type_oid_to_type, convert_type_to_jdbc_type,
};
use futures::StreamExt;
use pg_escape::{quote_identifier, quote_literal};
use postgres_replication::ReplicationStream as PgWalStream;
use postgres_replication::protocol::ReplicationMessage;
use tokio_postgres::config::ReplicationMode;
use tokio_postgres::{Client, Config, Connection, NoTls, SimpleQueryMessage, SimpleQueryRow, Socket};
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{CdcResult, ErrorKind};
use crate::replication::retry::with_retry;
use crate::{bail, cdc_error};

/// A message read from the replication stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalMessage {
    /// A chunk of decoded changes starting at `wal_start`.
    XLogData {
        wal_start: Lsn,
        wal_end: Lsn,
        data: Bytes,
    },
    /// A server heartbeat. When `reply_requested` is set the server disconnects clients that do
    /// not answer with a status update.
    KeepAlive { wal_end: Lsn, reply_requested: bool },
}

/// Server side state of a replication slot, as read from `pg_replication_slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub slot_name: String,
    pub plugin: String,
    /// Position up to which the consumer has confirmed changes. Streaming resumes from here.
    pub confirmed_flush_lsn: Lsn,
    /// Whether a walsender is currently consuming the slot.
    pub active: bool,
    /// Whether WAL required by the slot has been removed.
    pub wal_lost: bool,
}

/// The bidirectional channel of a running replication session.
pub trait ReplicationTransport: Send + 'static {
    /// Returns the next message, or `None` once the server ended the stream.
    fn next_message(&mut self) -> impl Future<Output = Option<CdcResult<WalMessage>>> + Send;

    /// Reports the consumer position to the server.
    fn send_status_update(
        &mut self,
        write_lsn: Lsn,
        flush_lsn: Lsn,
        apply_lsn: Lsn,
        reply_requested: bool,
    ) -> impl Future<Output = CdcResult<()>> + Send;
}

/// Control operations of a replication capable source.
pub trait ReplicationClient: Send + Sync + 'static {
    type Transport: ReplicationTransport;

    /// Looks up a slot by name, returning `None` when it does not exist.
    fn get_slot(
        &self,
        slot_name: &str,
    ) -> impl Future<Output = CdcResult<Option<SlotState>>> + Send;

    /// Creates a logical slot and returns its consistent point.
    fn create_slot(
        &self,
        slot_name: &str,
        plugin_name: &str,
    ) -> impl Future<Output = CdcResult<Lsn>> + Send;

    /// Drops a slot.
    ///
    /// With `wait` the call blocks until a consumer still holding the slot releases it,
    /// otherwise an active slot fails with [`ErrorKind::ReplicationSlotInUse`].
    fn drop_slot(
        &self,
        slot_name: &str,
        wait: bool,
    ) -> impl Future<Output = CdcResult<()>> + Send;

    /// Starts streaming changes of `slot_name` from `start_lsn`.
    fn start_replication(
        &self,
        slot_name: &str,
        start_lsn: Lsn,
        plugin_options: &BTreeMap<String, String>,
    ) -> impl Future<Output = CdcResult<Self::Transport>> + Send;

    /// Whether the control connection has been closed.
    fn is_closed(&self) -> bool;
}

/// Spawns a background task driving a Postgres connection until it terminates.
fn spawn_postgres_connection(connection: Connection<Socket, tokio_postgres::tls::NoTlsStream>) {
    let span = tracing::Span::current();
    let task = async move {
        if let Err(e) = connection.await {
            error!("an error occurred during the Postgres connection: {}", e);
            return;
        }

        info!("postgres connection terminated successfully")
    }
    .instrument(span);

    tokio::spawn(task);
}

/// Opens a connection in logical replication mode.
///
/// Such a connection accepts replication commands as well as plain SQL over the simple query
/// protocol.
async fn connect_replication(pg_connection_config: &PgConnectionConfig) -> CdcResult<Client> {
    let mut config: Config = pg_connection_config.with_db();
    config.replication_mode(ReplicationMode::Logical);

    let (client, connection) = config.connect(NoTls).await?;
    spawn_postgres_connection(connection);

    Ok(client)
}

/// A [`ReplicationClient`] backed by Postgres.
///
/// Slot management and catalog queries run on a long lived control connection. Every call to
/// [`ReplicationClient::start_replication`] opens a dedicated connection owned by the returned
/// transport, so dropping the transport releases the slot.
#[derive(Debug, Clone)]
pub struct PgReplicationClient {
    client: Arc<Client>,
    pg_connection_config: PgConnectionConfig,
    retry: RetryConfig,
}

impl PgReplicationClient {
    /// Connects to Postgres, retrying transient failures according to `retry`.
    pub async fn connect(
        pg_connection_config: PgConnectionConfig,
        retry: RetryConfig,
    ) -> CdcResult<Self> {
        let client = with_retry(&retry, "connect", || {
            connect_replication(&pg_connection_config)
        })
        .await?;

        info!(
            host = %pg_connection_config.host,
            database = %pg_connection_config.name,
            "successfully connected to postgres"
        );

        Ok(PgReplicationClient {
            client: Arc::new(client),
            pg_connection_config,
            retry,
        })
    }

    /// Reads the definition of a table from the catalog.
    ///
    /// The catalog of the returned table id is the database of the connection.
    pub async fn load_table(&self, table_id: TableId) -> CdcResult<Table> {
        let relation = if table_id.schema().is_empty() {
            quote_identifier(table_id.table()).into_owned()
        } else {
            table_id.as_quoted_identifier()
        };

        let column_info_query = format!(
            "select a.attname,
                a.atttypid,
                a.atttypmod,
                a.attnotnull,
                t.typname,
                coalesce(i.indisprimary, false) as primary,
                a.attgenerated <> '' as generated,
                (a.attidentity <> ''
                    or coalesce(pg_get_expr(d.adbin, d.adrelid), '') like 'nextval(%') as auto_incremented
            from pg_attribute a
            join pg_type t on t.oid = a.atttypid
            left join pg_index i
                on a.attrelid = i.indrelid
                and a.attnum = any(i.indkey)
                and i.indisprimary = true
            left join pg_attrdef d
                on d.adrelid = a.attrelid
                and d.adnum = a.attnum
            where a.attnum > 0::int2
            and not a.attisdropped
            and a.attrelid = {relation}::regclass
            order by a.attnum",
            relation = quote_literal(&relation),
        );

        let mut columns = Vec::new();
        let mut primary_key_names = Vec::new();

        for message in self.client.simple_query(&column_info_query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let name = get_row_value::<String>(&row, "attname", "pg_attribute")?;
                let type_oid = get_row_value::<u32>(&row, "atttypid", "pg_attribute")?;
                let modifier = get_row_value::<i32>(&row, "atttypmod", "pg_attribute")?;
                let not_null = get_row_value::<String>(&row, "attnotnull", "pg_attribute")? == "t";
                let type_name = get_row_value::<String>(&row, "typname", "pg_type")?;
                let primary = get_row_value::<String>(&row, "primary", "pg_index")? == "t";
                let generated = get_row_value::<String>(&row, "generated", "pg_attribute")? == "t";
                let auto_incremented =
                    get_row_value::<String>(&row, "auto_incremented", "pg_attrdef")? == "t";

                let typ = convert_type_oid_to_type(type_oid);
                let (length, scale) = column_length_and_scale(&typ, modifier);

                let mut editor = Column::editor()
                    .name(name.clone())
                    .type_name(type_name)
                    .jdbc_type(convert_type_to_jdbc_type(&typ))
                    .optional(!not_null)
                    .generated(generated)
                    .auto_incremented(auto_incremented);
                if let Some(length) = length {
                    editor = editor.length(length);
                }
                if let Some(scale) = scale {
                    editor = editor.scale(scale);
                }

                if primary {
                    primary_key_names.push(name);
                }
                columns.push(editor.create()?);
            }
        }

        if columns.is_empty() {
            bail!(
                ErrorKind::SourceSchemaError,
                "Table not found",
                format!("table {table_id} has no columns or does not exist")
            );
        }

        let table = Table::editor()
            .table_id(TableId::new(
                self.pg_connection_config.name.clone(),
                table_id.schema(),
                table_id.table(),
            ))
            .add_columns(columns)
            .set_primary_key_names(primary_key_names)
            .create()?;

        Ok(table)
    }

    async fn create_slot_once(&self, slot_name: &str, plugin_name: &str) -> CdcResult<Lsn> {
        // Replication commands must stay upper case, the replication command lexer of Postgres
        // does not accept lower case keywords.
        let query = format!(
            r#"CREATE_REPLICATION_SLOT {} LOGICAL {} NOEXPORT_SNAPSHOT"#,
            quote_identifier(slot_name),
            quote_identifier(plugin_name)
        );

        for message in self.client.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let consistent_point =
                    get_row_value::<Lsn>(&row, "consistent_point", "pg_replication_slots")?;

                return Ok(consistent_point);
            }
        }

        Err(cdc_error!(
            ErrorKind::ReplicationSlotNotCreated,
            "Failed to create replication slot",
            format!("no consistent point returned for slot '{slot_name}'")
        ))
    }
}

impl ReplicationClient for PgReplicationClient {
    type Transport = PgReplicationTransport;

    async fn get_slot(&self, slot_name: &str) -> CdcResult<Option<SlotState>> {
        let query = format!(
            r#"select slot_name, plugin, confirmed_flush_lsn, active,
                coalesce(wal_status = 'lost', false) as wal_lost
            from pg_replication_slots where slot_name = {};"#,
            quote_literal(slot_name)
        );

        for message in self.client.simple_query(&query).await? {
            if let SimpleQueryMessage::Row(row) = message {
                let confirmed_flush_lsn = match row.try_get("confirmed_flush_lsn")? {
                    Some(lsn) => lsn.parse::<Lsn>()?,
                    None => Lsn::INVALID,
                };

                return Ok(Some(SlotState {
                    slot_name: get_row_value(&row, "slot_name", "pg_replication_slots")?,
                    plugin: get_row_value(&row, "plugin", "pg_replication_slots")?,
                    confirmed_flush_lsn,
                    active: get_row_value::<String>(&row, "active", "pg_replication_slots")? == "t",
                    wal_lost: get_row_value::<String>(&row, "wal_lost", "pg_replication_slots")?
                        == "t",
                }));
            }
        }

        Ok(None)
    }

    async fn create_slot(&self, slot_name: &str, plugin_name: &str) -> CdcResult<Lsn> {
        info!(slot_name, plugin_name, "creating replication slot");

        let consistent_point = with_retry(&self.retry, "create_slot", || {
            self.create_slot_once(slot_name, plugin_name)
        })
        .await?;

        info!(slot_name, %consistent_point, "created replication slot");

        Ok(consistent_point)
    }

    async fn drop_slot(&self, slot_name: &str, wait: bool) -> CdcResult<()> {
        info!(slot_name, wait, "dropping replication slot");

        let query = format!(
            r#"DROP_REPLICATION_SLOT {}{};"#,
            quote_identifier(slot_name),
            if wait { " WAIT" } else { "" }
        );
        self.client.simple_query(&query).await?;

        info!(slot_name, "dropped replication slot");

        Ok(())
    }

    async fn start_replication(
        &self,
        slot_name: &str,
        start_lsn: Lsn,
        plugin_options: &BTreeMap<String, String>,
    ) -> CdcResult<PgReplicationTransport> {
        info!(slot_name, %start_lsn, "starting logical replication");

        let options = plugin_options
            .iter()
            .map(|(key, value)| format!("{} {}", quote_identifier(key), quote_literal(value)))
            .collect::<Vec<_>>();
        let options = if options.is_empty() {
            String::new()
        } else {
            format!(" ({})", options.join(", "))
        };

        let query = format!(
            r#"START_REPLICATION SLOT {} LOGICAL {}{}"#,
            quote_identifier(slot_name),
            start_lsn,
            options
        );

        let client = with_retry(&self.retry, "connect", || {
            connect_replication(&self.pg_connection_config)
        })
        .await?;
        let copy_stream = client.copy_both_simple::<Bytes>(&query).await?;

        Ok(PgReplicationTransport {
            stream: Box::pin(PgWalStream::new(copy_stream)),
            _client: client,
        })
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// A [`ReplicationTransport`] over a Postgres `COPY BOTH` stream.
pub struct PgReplicationTransport {
    stream: Pin<Box<PgWalStream>>,
    // Keeps the streaming connection open for as long as the transport lives.
    _client: Client,
}

impl fmt::Debug for PgReplicationTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgReplicationTransport").finish_non_exhaustive()
    }
}

impl ReplicationTransport for PgReplicationTransport {
    async fn next_message(&mut self) -> Option<CdcResult<WalMessage>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(err.into())),
            };

            match message {
                ReplicationMessage::XLogData(body) => {
                    let wal_start = Lsn::new(body.wal_start());
                    let wal_end = Lsn::new(body.wal_end());
                    return Some(Ok(WalMessage::XLogData {
                        wal_start,
                        wal_end,
                        data: body.into_data(),
                    }));
                }
                ReplicationMessage::PrimaryKeepAlive(body) => {
                    return Some(Ok(WalMessage::KeepAlive {
                        wal_end: Lsn::new(body.wal_end()),
                        reply_requested: body.reply() == 1,
                    }));
                }
                _ => debug!("ignoring unknown replication message"),
            }
        }
    }

    async fn send_status_update(
        &mut self,
        write_lsn: Lsn,
        flush_lsn: Lsn,
        apply_lsn: Lsn,
        reply_requested: bool,
    ) -> CdcResult<()> {
        self.stream
            .as_mut()
            .standby_status_update(
                write_lsn.into(),
                flush_lsn.into(),
                apply_lsn.into(),
                postgres_now_micros(),
                u8::from(reply_requested),
            )
            .await?;

        Ok(())
    }
}

/// Extracts and parses a value from a simple query row.
///
/// Fails if the column is missing, `NULL`, or cannot be parsed to `T`.
fn get_row_value<T: std::str::FromStr>(
    row: &SimpleQueryRow,
    column_name: &str,
    table_name: &str,
) -> CdcResult<T>
where
    T::Err: fmt::Debug,
{
    let value = row.try_get(column_name)?.ok_or_else(|| {
        cdc_error!(
            ErrorKind::SourceSchemaError,
            "Column not found",
            format!("Column '{column_name}' not found in table '{table_name}'")
        )
    })?;

    value.parse().map_err(|e: T::Err| {
        cdc_error!(
            ErrorKind::ConversionError,
            "Column parsing failed",
            format!(
                "Failed to parse value from column '{column_name}' in table '{table_name}': {e:?}"
            )
        )
    })
}

/// Logs a failed slot drop instead of returning it.
pub(crate) async fn drop_slot_tolerant<C: ReplicationClient>(
    client: &C,
    slot_name: &str,
    wait: bool,
) {
    if let Err(err) = client.drop_slot(slot_name, wait).await {
        if err.kind() == ErrorKind::ReplicationSlotNotFound {
            warn!(slot_name, "replication slot to drop does not exist");
        } else {
            warn!(slot_name, error = %err, "failed to drop replication slot");
        }
    }
}
