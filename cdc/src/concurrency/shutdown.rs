use tokio::sync::watch;

use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};

/// Sending half of a shutdown signal, shared by everything that may stop a worker.
#[derive(Debug, Clone)]
pub struct ShutdownTx(SignalTx);

impl ShutdownTx {
    /// Signals shutdown to every subscribed [`ShutdownRx`].
    ///
    /// Fails only when no receiver is left, in which case there is nothing to stop.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Receiving half of a shutdown signal. `changed()` resolves once shutdown is requested.
pub type ShutdownRx = SignalRx;

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = create_signal();
    (ShutdownTx(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_wakes_every_subscriber() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut other = tx.subscribe();

        tx.shutdown().unwrap();

        rx.changed().await.unwrap();
        other.changed().await.unwrap();
    }
}
