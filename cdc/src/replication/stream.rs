use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use cdc_postgres::lsn::Lsn;
use futures::Stream;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, debug, error, info, warn};

use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{CdcResult, ErrorKind};
use crate::replication::client::{ReplicationTransport, WalMessage};
use crate::{bail, cdc_error};

/// Number of change records buffered between the worker and the reader.
const CHANGE_BUFFER_SIZE: usize = 1024;

/// One chunk of changes read from the replication slot.
///
/// `data` is the payload produced by the decoding plugin, passed on undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Position of the change in the WAL.
    pub lsn: Lsn,
    /// End of the server's WAL when the change was sent.
    pub wal_end: Lsn,
    pub data: Bytes,
}

/// Positions of a replication session shared between the worker and the consumer.
///
/// `received` is written by the worker only; `flushed` only moves forward.
#[derive(Debug)]
pub struct LsnTracker {
    received: AtomicU64,
    flushed: AtomicU64,
    reported: AtomicU64,
}

impl LsnTracker {
    pub fn new(start_lsn: Lsn) -> Self {
        Self {
            received: AtomicU64::new(start_lsn.as_u64()),
            flushed: AtomicU64::new(start_lsn.as_u64()),
            reported: AtomicU64::new(start_lsn.as_u64()),
        }
    }

    pub fn received(&self) -> Lsn {
        Lsn::new(self.received.load(Ordering::Acquire))
    }

    pub fn flushed(&self) -> Lsn {
        Lsn::new(self.flushed.load(Ordering::Acquire))
    }

    /// Last flushed position sent to the server.
    pub fn reported(&self) -> Lsn {
        Lsn::new(self.reported.load(Ordering::Acquire))
    }

    /// Whether a flushed position has not been reported yet.
    pub fn flush_pending(&self) -> bool {
        self.flushed() > self.reported()
    }

    fn update_received(&self, lsn: Lsn) {
        self.received.fetch_max(lsn.as_u64(), Ordering::AcqRel);
    }

    fn set_reported(&self, lsn: Lsn) {
        self.reported.fetch_max(lsn.as_u64(), Ordering::AcqRel);
    }

    /// Advances the flushed position to `lsn`.
    ///
    /// Returns `false` when `lsn` equals the current position. A lower `lsn` fails with
    /// [`ErrorKind::LsnRegression`] and leaves the position unchanged.
    pub fn flush(&self, lsn: Lsn) -> CdcResult<bool> {
        let mut current = self.flushed.load(Ordering::Acquire);
        loop {
            if lsn.as_u64() == current {
                return Ok(false);
            }
            if lsn.as_u64() < current {
                bail!(
                    ErrorKind::LsnRegression,
                    "Flushed position cannot move backwards",
                    format!("{lsn} is lower than the flushed position {}", Lsn::new(current))
                );
            }

            match self.flushed.compare_exchange_weak(
                current,
                lsn.as_u64(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(true),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Timing settings of the stream worker.
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub slot_name: String,
    pub status_update_interval: Duration,
    pub connection_timeout: Duration,
}

#[derive(Debug)]
struct Shared {
    tracker: LsnTracker,
    flush_notify: Notify,
    shutdown_tx: ShutdownTx,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // The worker may already be gone, in which case nobody listens.
        let _ = self.shutdown_tx.shutdown();

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker
            && let Err(err) = worker.await
        {
            error!(error = %err, "replication stream worker panicked");
        }
    }
}

/// Cloneable control handle of a [`ReplicationStream`].
///
/// Acknowledgements and shutdown can be issued from any task, including while another task
/// waits in [`ReplicationStream::read`].
#[derive(Debug, Clone)]
pub struct StreamHandle {
    shared: Arc<Shared>,
}

impl StreamHandle {
    /// Confirms that all changes up to `lsn` have been durably processed.
    ///
    /// The position is reported to the server with the next status update, which is sent right
    /// away. Confirming a position lower than a previous one fails with
    /// [`ErrorKind::LsnRegression`]; confirming the same position again does nothing.
    pub fn flush_lsn(&self, lsn: Lsn) -> CdcResult<()> {
        if self.shared.is_closed() {
            bail!(
                ErrorKind::InvalidState,
                "Replication stream is closed",
                format!("cannot flush {lsn}")
            );
        }

        if self.shared.tracker.flush(lsn)? {
            self.shared.flush_notify.notify_one();
        }

        Ok(())
    }

    pub fn last_received_lsn(&self) -> Lsn {
        self.shared.tracker.received()
    }

    pub fn last_flushed_lsn(&self) -> Lsn {
        self.shared.tracker.flushed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stops the stream, waiting for the final status update to be sent.
    pub async fn close(&self) {
        self.shared.close().await;
    }
}

/// Ordered stream of [`ChangeRecord`]s of a replication session.
///
/// A background worker owns the server connection. It forwards changes, answers keep-alives and
/// reports the flushed position at every status update interval.
#[derive(Debug)]
pub struct ReplicationStream {
    receiver: mpsc::Receiver<CdcResult<ChangeRecord>>,
    shutdown_rx: ShutdownRx,
    handle: StreamHandle,
    done: bool,
}

impl ReplicationStream {
    /// Spawns the worker reading from `transport`, starting at `start_lsn`.
    pub(crate) fn start<T>(transport: T, start_lsn: Lsn, settings: WorkerSettings) -> Self
    where
        T: ReplicationTransport,
    {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let (sender, receiver) = mpsc::channel(CHANGE_BUFFER_SIZE);

        let shared = Arc::new(Shared {
            tracker: LsnTracker::new(start_lsn),
            flush_notify: Notify::new(),
            shutdown_tx,
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
        });

        let span = tracing::info_span!("replication_stream", slot_name = %settings.slot_name);
        let worker = StreamWorker {
            transport,
            shared: shared.clone(),
            sender,
            shutdown_rx: shutdown_rx.clone(),
            settings,
        };
        let join_handle = tokio::spawn(worker.run().instrument(span));

        // Nothing else can hold the lock before the handle is handed out.
        if let Ok(mut slot) = shared.worker.try_lock() {
            *slot = Some(join_handle);
        }

        Self {
            receiver,
            shutdown_rx,
            handle: StreamHandle { shared },
            done: false,
        }
    }

    /// Waits for the next change.
    ///
    /// Returns `None` once the stream is closed. An error ends the stream; later calls return
    /// `None`.
    pub async fn read(&mut self) -> CdcResult<Option<ChangeRecord>> {
        if self.done || self.shutdown_requested() {
            self.done = true;
            return Ok(None);
        }

        let message = tokio::select! {
            biased;

            _ = self.shutdown_rx.changed() => None,
            message = self.receiver.recv() => message,
        };

        match message {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(err)) => {
                self.done = true;
                Err(err)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    /// See [`StreamHandle::flush_lsn`].
    pub fn flush_lsn(&self, lsn: Lsn) -> CdcResult<()> {
        self.handle.flush_lsn(lsn)
    }

    pub fn last_received_lsn(&self) -> Lsn {
        self.handle.last_received_lsn()
    }

    pub fn last_flushed_lsn(&self) -> Lsn {
        self.handle.last_flushed_lsn()
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_rx.has_changed().unwrap_or(true)
    }

    /// Closes the stream, unblocking a pending [`ReplicationStream::read`].
    pub async fn close(&mut self) {
        self.done = true;
        self.handle.close().await;
    }
}

impl Drop for ReplicationStream {
    fn drop(&mut self) {
        // Without a reader the worker has nothing left to do.
        let _ = self.handle.shared.shutdown_tx.shutdown();
    }
}

impl Stream for ReplicationStream {
    type Item = CdcResult<ChangeRecord>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done || this.shutdown_requested() {
            this.done = true;
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(Ok(record))) => Poll::Ready(Some(Ok(record))),
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

struct StreamWorker<T> {
    transport: T,
    shared: Arc<Shared>,
    sender: mpsc::Sender<CdcResult<ChangeRecord>>,
    shutdown_rx: ShutdownRx,
    settings: WorkerSettings,
}

impl<T: ReplicationTransport> StreamWorker<T> {
    async fn run(mut self) {
        info!(
            start_lsn = %self.shared.tracker.received(),
            "replication stream worker started"
        );

        let result = self.run_loop().await;

        if self.shared.tracker.flush_pending()
            && let Err(err) = self.send_status_update(false).await
        {
            warn!(error = %err, "failed to send final status update");
        }

        self.shared.closed.store(true, Ordering::Release);

        match result {
            Ok(()) => info!(
                flushed_lsn = %self.shared.tracker.flushed(),
                "replication stream worker stopped"
            ),
            Err(err) => {
                error!(error = %err, "replication stream failed");
                // One slot of the buffer is kept free for this.
                let _ = self.sender.try_send(Err(err));
            }
        }
    }

    async fn run_loop(&mut self) -> CdcResult<()> {
        let period = self.settings.status_update_interval;
        let mut status_ticker = interval_at(Instant::now() + period, period);
        status_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_activity = Instant::now();

        loop {
            // Reading pauses while the reader lags behind, keep one slot for a final error.
            let can_forward = self.sender.capacity() > 1;

            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    info!("shutting down replication stream worker");
                    return Ok(());
                }

                _ = status_ticker.tick() => {
                    if !can_forward {
                        last_activity = Instant::now();
                    }

                    let silence = last_activity.elapsed();
                    if silence > self.settings.connection_timeout {
                        return Err(cdc_error!(
                            ErrorKind::SourceConnectionLost,
                            "No message received from the server",
                            format!(
                                "stream silent for {}s, timeout is {}s",
                                silence.as_secs(),
                                self.settings.connection_timeout.as_secs()
                            )
                        ));
                    }

                    self.send_status_update(true).await?;
                }

                _ = self.shared.flush_notify.notified() => {
                    if self.shared.tracker.flush_pending() {
                        self.send_status_update(false).await?;
                    }
                }

                message = self.transport.next_message(), if can_forward => {
                    let Some(message) = message else {
                        info!("server ended the replication stream");
                        return Ok(());
                    };
                    last_activity = Instant::now();

                    match message? {
                        WalMessage::XLogData { wal_start, wal_end, data } => {
                            self.shared.tracker.update_received(wal_start);

                            let record = ChangeRecord { lsn: wal_start, wal_end, data };
                            if self.sender.try_send(Ok(record)).is_err() {
                                info!("replication stream reader is gone");
                                return Ok(());
                            }
                        }
                        WalMessage::KeepAlive { wal_end, reply_requested } => {
                            debug!(%wal_end, reply_requested, "received keep-alive");

                            self.shared.tracker.update_received(wal_end);
                            if reply_requested {
                                self.send_status_update(false).await?;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Reports `(received, flushed, flushed)` to the server.
    async fn send_status_update(&mut self, reply_requested: bool) -> CdcResult<()> {
        let flushed = self.shared.tracker.flushed();
        let write = self.shared.tracker.received().max(flushed);

        self.transport
            .send_status_update(write, flushed, flushed, reply_requested)
            .await?;
        self.shared.tracker.set_reported(flushed);

        debug!(
            write_lsn = %write,
            flush_lsn = %flushed,
            "status update successfully sent"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_only_moves_forward() {
        let tracker = LsnTracker::new(Lsn::new(100));

        assert!(tracker.flush(Lsn::new(200)).unwrap());
        assert!(!tracker.flush(Lsn::new(200)).unwrap());

        let err = tracker.flush(Lsn::new(150)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LsnRegression);
        assert_eq!(tracker.flushed(), Lsn::new(200));
    }

    #[test]
    fn pending_flush_is_cleared_once_reported() {
        let tracker = LsnTracker::new(Lsn::new(100));
        assert!(!tracker.flush_pending());

        tracker.flush(Lsn::new(120)).unwrap();
        assert!(tracker.flush_pending());

        tracker.set_reported(Lsn::new(120));
        assert!(!tracker.flush_pending());
    }

    #[test]
    fn received_never_decreases() {
        let tracker = LsnTracker::new(Lsn::INVALID);
        tracker.update_received(Lsn::new(50));
        tracker.update_received(Lsn::new(40));
        assert_eq!(tracker.received(), Lsn::new(50));
    }
}
