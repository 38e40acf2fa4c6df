//! Control-plane binary library: process-environment configuration, the
//! WebSocket accept loop, per-subscriber sessions, and the wire messages
//! carried over the live push channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::GatewayServer;
