//! Per-subscriber WebSocket session: relays telemetry snapshots out and
//! demuxes peer-action/request-status commands in.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use wgctl_telemetry::TelemetryPipeline;

use crate::error::ServerResult;
use crate::message::{ClientMessage, ServerMessage};

/// Runs one subscriber's session to completion: sends a `connection_status`
/// greeting, relays every telemetry push as `peer_status_update`, and
/// demuxes inbound `peer_action`/`request_status_update` commands until the
/// socket closes or errors.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake's underlying stream fails
/// irrecoverably; a single malformed inbound message is logged and
/// skipped, not fatal to the session.
pub async fn run_session<S>(ws_stream: S, pipeline: Arc<TelemetryPipeline>) -> ServerResult<()>
where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures::Sink<WsMessage>
        + Unpin
        + Send,
    <S as futures::Sink<WsMessage>>::Error: std::fmt::Display,
{
    let (mut ws_sink, mut ws_read) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(32);

    let greeting = ServerMessage::ConnectionStatus {
        status: "connected",
        message: "subscribed to live status updates".to_string(),
    };
    let _ = outbound_tx.send(greeting).await;

    let (subscriber_id, mut snapshot_rx) = pipeline.subscribe().await;
    info!(%subscriber_id, "telemetry subscriber joined");

    let relay_tx = outbound_tx.clone();
    let relay_task = tokio::spawn(async move {
        while let Some(snapshots) = snapshot_rx.recv().await {
            let message = ServerMessage::status_update(&snapshots);
            if relay_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    let write_task = async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound message");
                    continue;
                }
            };

            if let Err(err) = ws_sink.send(WsMessage::Text(text)).await {
                debug!(error = %err, "write failed, ending session");
                break;
            }
        }
    };

    let command_tx = outbound_tx.clone();
    let read_task = async move {
        while let Some(frame) = ws_read.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(error = %err, "websocket read error");
                    break;
                }
            };

            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };

            let parsed: ClientMessage = match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(error = %err, "malformed client message, ignoring");
                    continue;
                }
            };

            handle_client_message(&pipeline, &command_tx, parsed).await;
        }
    };

    tokio::select! {
        () = write_task => {}
        () = read_task => {}
    }

    relay_task.abort();
    pipeline.unsubscribe(subscriber_id).await;
    info!(%subscriber_id, "telemetry subscriber left");

    Ok(())
}

async fn handle_client_message(
    pipeline: &Arc<TelemetryPipeline>,
    outbound_tx: &mpsc::Sender<ServerMessage>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::PeerAction { peer_id, action } => {
            let typed_peer_id = crate::message::peer_id_from_wire(peer_id);
            let result = pipeline.handle_peer_action(typed_peer_id, action.into_pipeline_action()).await;

            let reply = match result {
                Ok(()) => ServerMessage::PeerActionResult {
                    status: "success",
                    peer_id,
                    action,
                    is_active: Some(action == crate::message::ClientPeerAction::Activate),
                    message: format!("Peer {action}d successfully"),
                },
                Err(err) => ServerMessage::PeerActionResult {
                    status: "error",
                    peer_id,
                    action,
                    is_active: None,
                    message: format!("Error {action}ing peer: {err}"),
                },
            };

            let _ = outbound_tx.send(reply).await;
        }
        ClientMessage::RequestStatusUpdate {} => {
            if let Err(err) = pipeline.force_emit().await {
                warn!(error = %err, "forced status update failed");
                let _ = outbound_tx
                    .send(ServerMessage::ConnectionStatus {
                        status: "error",
                        message: format!("failed to refresh status: {err}"),
                    })
                    .await;
            }
        }
    }
}
