//! WebSocket connection management, session lifecycle, and broadcasting.

pub mod connection;
pub mod registry;
pub mod session;
