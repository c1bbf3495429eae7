//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL,
};

use super::connection::ClientConnection;
use super::registry::Registry;

/// Private greeting sent to a newly joined client, never broadcast.
pub const WELCOME: &str = "Welcome!!!";

/// Announcement broadcast to existing members when a client joins.
pub const JOIN_NOTICE: &str = "Someone joined";

/// Announcement broadcast to remaining members when a client leaves.
pub const DEPART_NOTICE: &str = "Someone disconnected.";

/// Capacity of the per-connection outbound queue.
const SEND_QUEUE_CAPACITY: usize = 1024;

/// Run a WebSocket session for a connected client.
///
/// 1. Sends the private welcome to the new client only
/// 2. Broadcasts the join notice to everyone already registered
/// 3. Registers the connection, then relays each incoming text frame to
///    every other registered connection
/// 4. Any non-text frame or transport error ends the receive loop
/// 5. Cleans up on every exit path: deregister, then announce the departure
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(ws: WebSocket, client_id: String, registry: Arc<Registry>) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let connection_start = Instant::now();
    info!(client_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Private welcome — sent on the socket directly, not via the registry.
    if ws_tx.send(Message::Text(WELCOME.into())).await.is_err() {
        info!(client_id, "client went away before welcome");
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        return;
    }

    // Announce the join before registering: the newcomer is not yet a
    // broadcast target, so it never receives its own join notice.
    registry.broadcast(JOIN_NOTICE, None).await;

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(SEND_QUEUE_CAPACITY);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), send_tx));
    registry.add(connection.clone()).await;

    // Outbound forwarder: drains the send queue into the socket sink. A
    // close signal (process shutdown) starts the close handshake, which the
    // receive loop below observes as its termination condition.
    let close_token = connection.close_token();
    let outbound = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                () = close_token.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Receive loop: text frames are relayed verbatim to everyone else. Any
    // other frame kind is the session's termination signal, not an error.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                registry.broadcast(text.as_str(), Some(&client_id)).await;
            }
            _ => {
                debug!(client_id, "non-text frame received, ending session");
                break;
            }
        }
    }

    // Cleanup runs on every exit path — clean close, bad frame, or transport
    // error. Deregister first so the departure notice never reaches the
    // leaving client.
    info!(client_id, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    registry.remove(&client_id).await;
    registry.broadcast(DEPART_NOTICE, None).await;
}

#[cfg(test)]
mod tests {
    // Full session flow requires real WebSocket connections and is covered
    // by the integration tests in tests/relay_flow.rs. Unit tests here pin
    // down the lifecycle notice conventions.

    use super::*;

    #[test]
    fn notices_are_distinct() {
        assert_ne!(WELCOME, JOIN_NOTICE);
        assert_ne!(JOIN_NOTICE, DEPART_NOTICE);
        assert_ne!(WELCOME, DEPART_NOTICE);
    }

    #[test]
    fn notices_are_plain_text() {
        // Notices share the chat channel with user text — no envelope, no
        // type tag, distinguishable by convention only.
        for notice in [WELCOME, JOIN_NOTICE, DEPART_NOTICE] {
            assert!(!notice.is_empty());
            assert!(serde_json::from_str::<serde_json::Value>(notice).is_err());
        }
    }
}
