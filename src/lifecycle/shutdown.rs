//! Shutdown coordination for background tasks.

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Long-running loops subscribe to the broadcast channel; cancellable work
/// derives child tokens from the root token.
#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    root: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            root: CancellationToken::new(),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// A token cancelled on shutdown or by its own holder.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn trigger(&self) {
        if !self.root.is_cancelled() {
            tracing::info!(subscribers = self.tx.receiver_count(), "Shutdown triggered");
        }
        self.root.cancel();
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Number of loops still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
