//! Wire messages carried over the live push channel.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wgctl_telemetry::{PeerAction as PipelinePeerAction, PeerSnapshot};
use wgctl_types::PeerId;

/// Inbound messages a subscriber may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request that a peer be activated or deactivated.
    PeerAction {
        /// The target peer.
        peer_id: i64,
        /// `"activate"` or `"deactivate"`.
        action: ClientPeerAction,
    },
    /// Force an immediate snapshot, bypassing change detection.
    RequestStatusUpdate {},
}

/// The two values `ClientMessage::PeerAction.action` may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPeerAction {
    /// Include the peer in the rendered interface and its own chain.
    Activate,
    /// Exclude the peer from the rendered interface and its own chain.
    Deactivate,
}

impl ClientPeerAction {
    /// Maps the wire value onto the pipeline's own action type.
    #[must_use]
    pub fn into_pipeline_action(self) -> PipelinePeerAction {
        match self {
            Self::Activate => PipelinePeerAction::Activate,
            Self::Deactivate => PipelinePeerAction::Deactivate,
        }
    }
}

impl std::fmt::Display for ClientPeerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Activate => write!(f, "activate"),
            Self::Deactivate => write!(f, "deactivate"),
        }
    }
}

/// One peer's rendered view in a `peer_status_update` payload.
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    /// The peer's store identifier.
    pub peer_id: i64,
    /// The peer's display name.
    pub name: String,
    /// The peer's public key, base64-encoded.
    pub public_key: String,
    /// The peer's assigned VPN address.
    pub assigned_ip: String,
    /// Whether the peer participates in the rendered interface.
    pub is_active: bool,
    /// Whether the peer is currently considered connected.
    pub is_connected: bool,
    /// `host:port`, if known.
    pub endpoint: Option<String>,
    /// The host component of `endpoint`.
    pub client_ip: Option<String>,
    /// Humanised "N min ago" / "Never".
    pub latest_handshake: String,
    /// Humanised connection duration, e.g. "2h 5m".
    pub connection_duration: String,
    /// Cumulative bytes received.
    pub transfer_rx: u64,
    /// Cumulative bytes sent.
    pub transfer_tx: u64,
    /// `transfer_rx` as a human-readable string.
    pub transfer_rx_formatted: String,
    /// `transfer_tx` as a human-readable string.
    pub transfer_tx_formatted: String,
    /// Configured persistent keepalive, in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Current receive rate, bytes/second.
    pub rx_rate: f64,
    /// Current send rate, bytes/second.
    pub tx_rate: f64,
    /// `rx_rate` as a human-readable `".../s"` string.
    pub rx_rate_formatted: String,
    /// `tx_rate` as a human-readable `".../s"` string.
    pub tx_rate_formatted: String,
    /// Charting data: one point per retained traffic sample.
    pub graph_data: GraphData,
}

/// Time series suitable for charting a peer's recent traffic.
#[derive(Debug, Clone, Serialize)]
pub struct GraphData {
    /// Sample timestamps, ISO-8601.
    pub timestamps: Vec<DateTime<Utc>>,
    /// Receive rates, one per timestamp.
    pub rx_rates: Vec<f64>,
    /// Send rates, one per timestamp.
    pub tx_rates: Vec<f64>,
}

impl From<&PeerSnapshot> for PeerSummary {
    fn from(snapshot: &PeerSnapshot) -> Self {
        let graph_data = GraphData {
            timestamps: snapshot.samples.iter().map(|s| s.at).collect(),
            rx_rates: snapshot.samples.iter().map(|s| s.rx_rate).collect(),
            tx_rates: snapshot.samples.iter().map(|s| s.tx_rate).collect(),
        };

        Self {
            peer_id: snapshot.peer_id.raw(),
            name: snapshot.name.clone(),
            public_key: snapshot.public_key.clone(),
            assigned_ip: snapshot.assigned_ip.to_string(),
            is_active: snapshot.is_active,
            is_connected: snapshot.is_connected,
            endpoint: snapshot.endpoint.clone(),
            client_ip: snapshot.client_ip.map(|ip| ip.to_string()),
            latest_handshake: snapshot.latest_handshake_text.clone(),
            connection_duration: snapshot.connection_duration_text.clone(),
            transfer_rx: snapshot.transfer_rx,
            transfer_tx: snapshot.transfer_tx,
            transfer_rx_formatted: snapshot.transfer_rx_text.clone(),
            transfer_tx_formatted: snapshot.transfer_tx_text.clone(),
            persistent_keepalive: snapshot.persistent_keepalive,
            rx_rate: snapshot.rx_rate,
            tx_rate: snapshot.tx_rate,
            rx_rate_formatted: snapshot.rx_rate_text.clone(),
            tx_rate_formatted: snapshot.tx_rate_text.clone(),
            graph_data,
        }
    }
}

/// Outbound messages pushed to a subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A (possibly change-gated) snapshot of every peer's status.
    PeerStatusUpdate {
        /// `"success"`, always, for this variant.
        status: &'static str,
        /// Per-peer summaries, keyed by the peer id as a decimal string.
        data: HashMap<String, PeerSummary>,
        /// Total number of peers known to the store.
        total_peers: usize,
        /// Number of peers currently considered connected.
        connected_peers: usize,
        /// When this snapshot was produced.
        timestamp: DateTime<Utc>,
    },
    /// The outcome of a `peer_action` command, replied to its originator.
    PeerActionResult {
        /// `"success"` or `"error"`.
        status: &'static str,
        /// The peer the command targeted.
        peer_id: i64,
        /// The action requested.
        action: ClientPeerAction,
        /// The peer's resulting activation state, if the command succeeded.
        is_active: Option<bool>,
        /// A human-readable outcome message.
        message: String,
    },
    /// A connection-lifecycle notice, sent once on session establishment.
    ConnectionStatus {
        /// `"connected"`.
        status: &'static str,
        /// A human-readable greeting.
        message: String,
    },
}

impl ServerMessage {
    /// Builds a `peer_status_update` message from a snapshot batch.
    #[must_use]
    pub fn status_update(snapshots: &[PeerSnapshot]) -> Self {
        let connected_peers = snapshots.iter().filter(|s| s.is_connected).count();
        let data = snapshots
            .iter()
            .map(|s| (s.peer_id.raw().to_string(), PeerSummary::from(s)))
            .collect();

        Self::PeerStatusUpdate {
            status: "success",
            data,
            total_peers: snapshots.len(),
            connected_peers,
            timestamp: Utc::now(),
        }
    }
}

/// Parses a wire peer id into the store's typed identifier.
#[must_use]
pub fn peer_id_from_wire(raw: i64) -> PeerId {
    PeerId::new(raw)
}
