//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for the serve loop to drain before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates shutdown between the signal handler and the serve loop.
///
/// One token fans out to everything that cares: when it fires, the serve
/// loop stops accepting, closes every registered connection, and each
/// session observes its connection's close signal and runs its own cleanup.
/// The coordinator itself only owns the token and the drain wait.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for the server task to drain.
    ///
    /// The relay runs a single long-lived task: the axum serve loop. Once
    /// the token fires that loop closes all registered connections and
    /// finishes when the in-flight sessions have cleaned up, so waiting on
    /// its handle is the whole drain. Waits up to `timeout` before giving
    /// up on a stuck drain; sessions are fire-and-forget past that point.
    pub async fn graceful_shutdown(&self, server_task: JoinHandle<()>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            timeout_secs = timeout.as_secs(),
            "waiting for the server to drain"
        );

        match tokio::time::timeout(timeout, server_task).await {
            Ok(Ok(())) => info!("server drained cleanly"),
            Ok(Err(e)) => warn!(error = %e, "server task failed during shutdown"),
            Err(_) => {
                warn!("shutdown timed out after {timeout:?}, the server task may still be running");
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::Registry;

    #[test]
    fn starts_active() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_flips_the_flag_once() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        // Repeat signals are harmless — ctrl-c can race the drain
        coord.shutdown();
        assert!(coord.is_shutting_down());
    }

    #[test]
    fn every_token_clone_fires() {
        let coord = ShutdownCoordinator::new();
        let serve_token = coord.token();
        let session_token = coord.token();
        coord.shutdown();
        assert!(serve_token.is_cancelled());
        assert!(session_token.is_cancelled());
    }

    #[test]
    fn default_starts_active() {
        let coord = ShutdownCoordinator::default();
        assert!(!coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_the_serve_loop() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        // Stand-in for the serve loop: parks on the token, then drains.
        let serve_loop = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.graceful_shutdown(serve_loop, None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_closes_registered_connections() {
        // The wiring the relay actually runs: the serve loop reacts to the
        // token by closing every registry member before it exits.
        let coord = ShutdownCoordinator::new();
        let registry = Arc::new(Registry::new());

        let (tx, _rx) = mpsc::channel(8);
        let conn = Arc::new(ClientConnection::new("peer_a".into(), tx));
        registry.add(conn.clone()).await;

        let token = coord.token();
        let drain_registry = registry.clone();
        let serve_loop = tokio::spawn(async move {
            token.cancelled().await;
            drain_registry.close_all().await;
        });

        coord.graceful_shutdown(serve_loop, None).await;
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn graceful_shutdown_gives_up_on_a_stuck_drain() {
        let coord = ShutdownCoordinator::new();

        // A serve loop that ignores the token entirely
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        coord
            .graceful_shutdown(stuck, Some(Duration::from_millis(50)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
