//! # relay
//!
//! Broadcast relay server binary — wires up logging and metrics and starts
//! the HTTP/WebSocket server.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::config::ServerConfig;
use relay_server::server::RelayServer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Real-time broadcast relay server.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Real-time broadcast relay server")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("relay=info,relay_server=info")),
        )
        .init();

    let metrics_handle = relay_server::metrics::install_recorder();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        ..ServerConfig::default()
    };

    let server = RelayServer::new(config).with_metrics(metrics_handle);
    let shutdown = server.shutdown().clone();

    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve().await {
            error!(error = %e, "server exited with error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("ctrl-c received, shutting down");
    shutdown.graceful_shutdown(server_task, None).await;
    Ok(())
}
