//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Represents a connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Cancelled when the server closes this connection (shutdown).
    close: CancellationToken,
    /// Count of messages dropped due to a full or closed channel.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            close: CancellationToken::new(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Send a text payload to the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter. Never blocks — broadcast fan-out must
    /// not stall on one slow peer.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Signal this connection to close.
    ///
    /// Idempotent. The owning session observes the token and runs its own
    /// cleanup path, exactly as it would on a peer disconnect.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether a close has been signalled.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Token the owning session selects on alongside the socket read.
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
