use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cdc_postgres::lsn::Lsn;
use tokio::sync::{Notify, mpsc};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::replication::{ReplicationClient, ReplicationTransport, SlotState, WalMessage};

/// Consistent point reported for slots created by [`MemoryReplicationClient`].
pub const CONSISTENT_POINT: Lsn = Lsn::new(0x0100_0000);

/// A standby status update as sent by the stream worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub write_lsn: Lsn,
    pub flush_lsn: Lsn,
    pub apply_lsn: Lsn,
    pub reply_requested: bool,
}

/// A replication session started on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedReplication {
    pub slot_name: String,
    pub start_lsn: Lsn,
    pub plugin_options: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, SlotState>,
    started: Vec<StartedReplication>,
    dropped_slots: Vec<String>,
    status_updates: Vec<StatusUpdate>,
    fail_drop_slot: bool,
    fail_status_updates: bool,
    wal_sender: Option<mpsc::UnboundedSender<CdcResult<WalMessage>>>,
    wal_receiver: Option<mpsc::UnboundedReceiver<CdcResult<WalMessage>>>,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
    status_notify: Notify,
    slot_released: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory replication client lock poisoned")
    }
}

/// A [`ReplicationClient`] backed by memory.
///
/// Slots live in a map, WAL messages are pushed by the test through [`WalSender`] and status
/// updates are recorded. Clones share their state, so two connections built on clones of the
/// same client see the same slots.
#[derive(Debug, Clone)]
pub struct MemoryReplicationClient {
    shared: Arc<Shared>,
}

/// Pushes messages into the transport of a [`MemoryReplicationClient`].
#[derive(Debug, Clone)]
pub struct WalSender {
    sender: mpsc::UnboundedSender<CdcResult<WalMessage>>,
}

impl WalSender {
    pub fn xlog_data(&self, wal_start: Lsn, data: &'static [u8]) {
        self.send(Ok(WalMessage::XLogData {
            wal_start,
            wal_end: wal_start,
            data: Bytes::from_static(data),
        }));
    }

    pub fn keep_alive(&self, wal_end: Lsn, reply_requested: bool) {
        self.send(Ok(WalMessage::KeepAlive {
            wal_end,
            reply_requested,
        }));
    }

    pub fn send(&self, message: CdcResult<WalMessage>) {
        // The transport may already be gone in tests that close early.
        let _ = self.sender.send(message);
    }
}

impl MemoryReplicationClient {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let inner = Inner {
            wal_sender: Some(sender),
            wal_receiver: Some(receiver),
            ..Inner::default()
        };

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                ..Shared::default()
            }),
        }
    }

    /// Returns a sender for the messages of the next replication session.
    pub fn wal_sender(&self) -> WalSender {
        let inner = self.shared.lock();
        let sender = inner
            .wal_sender
            .clone()
            .expect("the WAL of this client has already been ended");

        WalSender { sender }
    }

    /// Ends the WAL once every outstanding [`WalSender`] is dropped, as a server ending the stream.
    pub fn end_wal(&self) {
        self.shared.lock().wal_sender = None;
    }

    /// Adds or replaces a slot.
    pub fn insert_slot(&self, slot: SlotState) {
        self.shared.lock().slots.insert(slot.slot_name.clone(), slot);
    }

    pub fn slot(&self, slot_name: &str) -> Option<SlotState> {
        self.shared.lock().slots.get(slot_name).cloned()
    }

    pub fn fail_drop_slot(&self, fail: bool) {
        self.shared.lock().fail_drop_slot = fail;
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.shared.lock().fail_status_updates = fail;
    }

    /// Marks the control connection as closed.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn started(&self) -> Vec<StartedReplication> {
        self.shared.lock().started.clone()
    }

    pub fn dropped_slots(&self) -> Vec<String> {
        self.shared.lock().dropped_slots.clone()
    }

    pub fn status_updates(&self) -> Vec<StatusUpdate> {
        self.shared.lock().status_updates.clone()
    }

    /// Waits until at least `count` status updates have been sent and returns all of them.
    pub async fn wait_for_status_updates(&self, count: usize) -> Vec<StatusUpdate> {
        loop {
            let notified = self.shared.status_notify.notified();
            {
                let inner = self.shared.lock();
                if inner.status_updates.len() >= count {
                    return inner.status_updates.clone();
                }
            }
            notified.await;
        }
    }
}

impl Default for MemoryReplicationClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationClient for MemoryReplicationClient {
    type Transport = MemoryTransport;

    async fn get_slot(&self, slot_name: &str) -> CdcResult<Option<SlotState>> {
        Ok(self.slot(slot_name))
    }

    async fn create_slot(&self, slot_name: &str, plugin_name: &str) -> CdcResult<Lsn> {
        let mut inner = self.shared.lock();
        if inner.slots.contains_key(slot_name) {
            bail!(
                ErrorKind::ReplicationSlotAlreadyExists,
                "Replication slot already exists",
                format!("slot '{slot_name}'")
            );
        }

        inner.slots.insert(
            slot_name.to_owned(),
            SlotState {
                slot_name: slot_name.to_owned(),
                plugin: plugin_name.to_owned(),
                confirmed_flush_lsn: CONSISTENT_POINT,
                active: false,
                wal_lost: false,
            },
        );

        Ok(CONSISTENT_POINT)
    }

    async fn drop_slot(&self, slot_name: &str, wait: bool) -> CdcResult<()> {
        loop {
            let released = self.shared.slot_released.notified();
            {
                let mut inner = self.shared.lock();
                if inner.fail_drop_slot {
                    bail!(
                        ErrorKind::SourceIoError,
                        "Failed to drop replication slot",
                        format!("injected failure for slot '{slot_name}'")
                    );
                }

                match inner.slots.get(slot_name) {
                    None => bail!(
                        ErrorKind::ReplicationSlotNotFound,
                        "Replication slot not found",
                        format!("slot '{slot_name}'")
                    ),
                    Some(slot) if slot.active && !wait => bail!(
                        ErrorKind::ReplicationSlotInUse,
                        "Replication slot is in use",
                        format!("slot '{slot_name}' is still streaming")
                    ),
                    Some(slot) if !slot.active => {
                        inner.slots.remove(slot_name);
                        inner.dropped_slots.push(slot_name.to_owned());

                        return Ok(());
                    }
                    // Blocks like `DROP_REPLICATION_SLOT .. WAIT` until the consumer leaves.
                    Some(_) => {}
                }
            }
            released.await;
        }
    }

    async fn start_replication(
        &self,
        slot_name: &str,
        start_lsn: Lsn,
        plugin_options: &BTreeMap<String, String>,
    ) -> CdcResult<MemoryTransport> {
        let mut inner = self.shared.lock();
        let Some(slot) = inner.slots.get_mut(slot_name) else {
            bail!(
                ErrorKind::ReplicationSlotNotFound,
                "Replication slot not found",
                format!("slot '{slot_name}'")
            );
        };
        if slot.active {
            bail!(
                ErrorKind::ReplicationSlotInUse,
                "Replication slot is in use",
                format!("slot '{slot_name}'")
            );
        }
        slot.active = true;

        let Some(receiver) = inner.wal_receiver.take() else {
            bail!(
                ErrorKind::InvalidState,
                "Replication already started on this client"
            );
        };

        inner.started.push(StartedReplication {
            slot_name: slot_name.to_owned(),
            start_lsn,
            plugin_options: plugin_options.clone(),
        });

        Ok(MemoryTransport {
            shared: self.shared.clone(),
            slot_name: slot_name.to_owned(),
            receiver,
        })
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Transport of a [`MemoryReplicationClient`] session.
///
/// The slot is released when the transport is dropped, as when a walsender exits.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    slot_name: String,
    receiver: mpsc::UnboundedReceiver<CdcResult<WalMessage>>,
}

impl ReplicationTransport for MemoryTransport {
    async fn next_message(&mut self) -> Option<CdcResult<WalMessage>> {
        self.receiver.recv().await
    }

    async fn send_status_update(
        &mut self,
        write_lsn: Lsn,
        flush_lsn: Lsn,
        apply_lsn: Lsn,
        reply_requested: bool,
    ) -> CdcResult<()> {
        {
            let mut inner = self.shared.lock();
            if inner.fail_status_updates {
                bail!(
                    ErrorKind::SourceIoError,
                    "Failed to send status update",
                    "injected failure"
                );
            }

            inner.status_updates.push(StatusUpdate {
                write_lsn,
                flush_lsn,
                apply_lsn,
                reply_requested,
            });

            // Flushing moves the slot's confirmed position, as Postgres does.
            if let Some(slot) = inner.slots.get_mut(&self.slot_name) {
                slot.confirmed_flush_lsn = slot.confirmed_flush_lsn.max(flush_lsn);
            }
        }
        self.shared.status_notify.notify_waiters();

        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.inner.lock()
            && let Some(slot) = inner.slots.get_mut(&self.slot_name)
        {
            slot.active = false;
        }
        self.shared.slot_released.notify_waiters();
    }
}
