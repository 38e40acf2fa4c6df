//! Error types for the control-plane binary.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur wiring up or running the control-plane binary.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A process-environment variable was missing or failed to parse.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to bind the WebSocket listener to the configured address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// A WebSocket-level error occurred on a session.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// A client message failed to serialize or deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store gateway rejected or failed a read/write.
    #[error(transparent)]
    Store(#[from] wgctl_store::StoreError),

    /// The telemetry pipeline failed to tick or apply a command.
    #[error(transparent)]
    Telemetry(#[from] wgctl_telemetry::TelemetryError),
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ServerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(err.to_string())
    }
}

/// Result type for control-plane operations.
pub type ServerResult<T> = Result<T, ServerError>;
