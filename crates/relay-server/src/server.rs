//! `RelayServer` — Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::Registry;
use crate::websocket::session::run_ws_session;

/// Static chat page served to clients that request `/` without a WebSocket
/// upgrade. Plain-browser fallback; the relay itself never parses it.
const CHAT_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Relay Chat</title></head>
<body>
  <ul id="messages"></ul>
  <form id="form"><input id="input" autocomplete="off" autofocus><button>Send</button></form>
  <script>
    const proto = location.protocol === "https:" ? "wss:" : "ws:";
    const ws = new WebSocket(proto + "//" + location.host + "/");
    ws.onmessage = (ev) => {
      const li = document.createElement("li");
      li.textContent = ev.data;
      document.getElementById("messages").appendChild(li);
    };
    document.getElementById("form").onsubmit = (ev) => {
      ev.preventDefault();
      const input = document.getElementById("input");
      if (input.value) { ws.send(input.value); input.value = ""; }
    };
  </script>
</body>
</html>
"#;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry for message fan-out.
    pub registry: Arc<Registry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for the `/metrics` endpoint, when installed.
    pub metrics: Option<PrometheusHandle>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

/// The main relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach an installed Prometheus recorder handle for `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", get(chat_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// Bind the configured address and run until shutdown.
    ///
    /// When the shutdown token fires, every registered connection is closed
    /// and the accept loop stops; in-flight sessions observe the close and
    /// run their own cleanup.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "relay server listening");

        let registry = self.registry.clone();
        let token = self.shutdown.token();
        let app = self.router();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                token.cancelled().await;
                info!("shutdown initiated, closing all connections");
                registry.close_all().await;
            })
            .await?;
        Ok(())
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET / — WebSocket upgrade for upgradeable requests, static chat page
/// otherwise.
async fn chat_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
) -> Response {
    match ws {
        Ok(upgrade) => {
            let client_id = Uuid::now_v7().to_string();
            let registry = state.registry.clone();
            upgrade
                .max_message_size(state.max_message_size)
                .on_upgrade(move |socket| run_ws_session(socket, client_id, registry))
        }
        Err(_) => Html(CHAT_PAGE).into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.registry.connection_count().await;
    let resp = health::health_check(state.start_time, connections);
    Json(resp)
}

/// GET /metrics — Prometheus text format, 404 when no recorder is installed.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => metrics::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
