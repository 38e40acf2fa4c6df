//! TCP accept loop and WebSocket upgrade for the live push channel.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};

use wgctl_telemetry::TelemetryPipeline;

use crate::error::{ServerError, ServerResult};
use crate::session::run_session;

/// Accepts WebSocket connections and spawns one session task per
/// subscriber, each sharing the same [`TelemetryPipeline`].
pub struct GatewayServer {
    pipeline: Arc<TelemetryPipeline>,
}

impl GatewayServer {
    /// Builds a server over an already-constructed pipeline.
    #[must_use]
    pub fn new(pipeline: Arc<TelemetryPipeline>) -> Self {
        Self { pipeline }
    }

    /// Binds `addr` and accepts connections until the process is
    /// terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BindFailed`] if the address cannot be bound.
    pub async fn serve(&self, addr: SocketAddr) -> ServerResult<()> {
        let listener = TcpListener::bind(addr).await.map_err(|e| ServerError::BindFailed(addr, e))?;

        info!(%addr, "control-plane listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    self.handle_connection(stream, peer_addr);
                }
                Err(err) => {
                    warn!(error = %err, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        debug!(peer = %peer_addr, "new connection");

        let pipeline = self.pipeline.clone();
        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(err) => {
                    warn!(peer = %peer_addr, error = %err, "websocket handshake failed");
                    return;
                }
            };

            info!(peer = %peer_addr, "websocket connection established");

            if let Err(err) = run_session(ws_stream, pipeline).await {
                debug!(peer = %peer_addr, error = %err, "session ended with error");
            }
        });
    }
}
