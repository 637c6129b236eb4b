//! # jamroom-server
//!
//! Axum HTTP + WebSocket server for session signaling.
//!
//! - Connection Gateway: live connections and explicit room membership
//! - Signaling Relay: `viewer joining` / `viewer leaving` broadcasts
//! - HTTP endpoints over the session directory
//! - Graceful shutdown that drains connections and closes the store

pub mod client;
pub mod config;
pub mod context;
pub mod gateway;
pub mod handlers;
pub mod relay;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use gateway::{ConnectionGateway, TransportError};
pub use relay::{DisconnectReason, LeavePayload, RelayConfig, SignalingRelay};
pub use server::{build_router, start, ServerHandle};
