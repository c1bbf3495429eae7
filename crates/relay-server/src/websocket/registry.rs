//! Message fan-out to connected WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::WS_BROADCAST_DROPS_TOTAL;

use super::connection::ClientConnection;

/// The set of currently open connections eligible for broadcast.
///
/// Owned by the server state for the lifetime of the process. A connection
/// appears at most once, keyed by its ID; sessions register themselves after
/// the join announcement and deregister exactly once on the way out.
pub struct Registry {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    ///
    /// A duplicate ID should not occur under single-registration discipline;
    /// if one does, the newer connection wins and a warning is logged.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if let Some(prev) = conns.insert(connection.id.clone(), connection) {
            warn!(conn_id = %prev.id, "registered a connection that was already present");
        }
    }

    /// Remove a connection by ID.
    ///
    /// Idempotent: removing an absent connection is a no-op, tolerating
    /// duplicate-remove attempts during shutdown races.
    pub async fn remove(&self, connection_id: &str) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(connection_id);
    }

    /// Clone out the current members.
    ///
    /// Each member currently joined appears exactly once; no ordering
    /// guarantee. The clone lets callers iterate without holding the lock.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        let conns = self.connections.read().await;
        conns.values().cloned().collect()
    }

    /// Broadcast a text payload to every connection except `exclude`.
    ///
    /// Best-effort, fire-and-forget: a failed send to one target is logged
    /// and counted but never aborts delivery to the remaining targets. The
    /// dead target's own session detects the disconnect and cleans up.
    pub async fn broadcast(&self, text: &str, exclude: Option<&str>) {
        let payload = Arc::new(text.to_owned());
        let conns = self.connections.read().await;
        let mut recipients = 0u32;
        for conn in conns.values() {
            if exclude == Some(conn.id.as_str()) {
                continue;
            }
            recipients += 1;
            if !conn.send(Arc::clone(&payload)) {
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %conn.id,
                    total_drops = conn.drop_count(),
                    "failed to send message to client (channel full or closed)"
                );
            }
        }
        debug!(recipients, "broadcast message");
    }

    /// Signal every registered connection to close.
    ///
    /// Called once at process shutdown. Each session's receive loop observes
    /// its close token and runs its own cleanup path; members are not removed
    /// here since the process is terminating.
    pub async fn close_all(&self) {
        let conns = self.connections.read().await;
        debug!(count = conns.len(), "closing all connections");
        for conn in conns.values() {
            conn.close();
        }
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
