//! Shutdown coordination for the proxy.
//!
//! Triggering shutdown stops the listener from accepting new CONNECT
//! exchanges. Tunnels that already hold both connections keep relaying until
//! one side ends; the binary only waits for them, bounded by the grace period.

use tokio::sync::broadcast;

/// Broadcasts the stop signal to the HTTPS server.
///
/// Tunnel tasks never subscribe; only the accept side reacts to it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
