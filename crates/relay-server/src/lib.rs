//! # relay-server
//!
//! Axum HTTP + `WebSocket` broadcast relay.
//!
//! - `WebSocket` gateway at `/`: every text message from one client is
//!   relayed to all other connected clients
//! - Static chat page served to non-upgrading requests on the same route
//! - Connection registry with best-effort, sender-excluding fan-out
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken` — closes every registered
//!   connection and lets each session run its own cleanup

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;
