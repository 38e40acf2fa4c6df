//! Per-peer status snapshots and the change detector that gates emission.

use std::collections::VecDeque;
use std::net::IpAddr;

use wgctl_types::{Peer, PeerId};
use wgctl_status::PeerStatus;

use crate::format::{format_bytes, format_duration, format_rate, format_time_ago};
use crate::ring::TrafficSample;

/// A byte-count delta smaller than this is not considered a significant
/// traffic change for emission purposes.
const TRAFFIC_CHANGE_THRESHOLD: u64 = 1024;

/// One peer's combined store + live status, ready to hand to subscribers.
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    /// The peer's store identifier.
    pub peer_id: PeerId,
    /// The peer's display name.
    pub name: String,
    /// The peer's public key, base64-encoded.
    pub public_key: String,
    /// The peer's assigned VPN address.
    pub assigned_ip: IpAddr,
    /// Whether the peer participates in the rendered interface.
    pub is_active: bool,
    /// Whether the peer is currently considered connected.
    pub is_connected: bool,
    /// `host:port`, if known.
    pub endpoint: Option<String>,
    /// The host component of `endpoint`.
    pub client_ip: Option<IpAddr>,
    /// Humanised "N min ago" / "Never".
    pub latest_handshake_text: String,
    /// Humanised connection duration, e.g. "2h 5m".
    pub connection_duration_text: String,
    /// Cumulative bytes received.
    pub transfer_rx: u64,
    /// Cumulative bytes sent.
    pub transfer_tx: u64,
    /// `transfer_rx` as a human-readable string.
    pub transfer_rx_text: String,
    /// `transfer_tx` as a human-readable string.
    pub transfer_tx_text: String,
    /// Configured persistent keepalive, in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Current receive rate, bytes/second.
    pub rx_rate: f64,
    /// Current send rate, bytes/second.
    pub tx_rate: f64,
    /// `rx_rate` as a human-readable `".../s"` string.
    pub rx_rate_text: String,
    /// `tx_rate` as a human-readable `".../s"` string.
    pub tx_rate_text: String,
    /// The last [`crate::ring::MAX_SAMPLES`] traffic samples, oldest first.
    pub samples: VecDeque<TrafficSample>,
}

impl PeerSnapshot {
    /// Combines a store `Peer` row, its live status (if the kernel reports
    /// one), the current traffic sample, and its history into a snapshot.
    #[must_use]
    pub fn build(
        peer: &Peer,
        live: Option<&PeerStatus>,
        current_sample: TrafficSample,
        history: VecDeque<TrafficSample>,
    ) -> Self {
        let is_connected = live.is_some_and(|s| s.is_connected);
        let endpoint = live.and_then(|s| s.endpoint.as_ref()).map(|e| format!("{}:{}", e.host(), e.port()));
        let client_ip = live.and_then(|s| s.client_ip);
        let latest_handshake = live.and_then(|s| s.latest_handshake);
        let connection_duration = latest_handshake
            .map(|h| chrono::Utc::now().signed_duration_since(h).num_milliseconds() as f64 / 1000.0);

        Self {
            peer_id: peer.id.expect("snapshot built only from persisted peers"),
            name: peer.name.as_str().to_string(),
            public_key: peer.public_key.to_base64(),
            assigned_ip: peer.assigned_ip,
            is_active: peer.is_active,
            is_connected,
            endpoint,
            client_ip,
            latest_handshake_text: format_time_ago(latest_handshake),
            connection_duration_text: format_duration(connection_duration),
            transfer_rx: current_sample.rx_total,
            transfer_tx: current_sample.tx_total,
            transfer_rx_text: format_bytes(current_sample.rx_total as f64),
            transfer_tx_text: format_bytes(current_sample.tx_total as f64),
            persistent_keepalive: live.and_then(|s| s.persistent_keepalive),
            rx_rate: current_sample.rx_rate,
            tx_rate: current_sample.tx_rate,
            rx_rate_text: format_rate(current_sample.rx_rate),
            tx_rate_text: format_rate(current_sample.tx_rate),
            samples: history,
        }
    }
}

/// A lightweight digest of the fields that gate emission, so a full
/// snapshot never needs to be retained just for comparison.
#[derive(Debug, Clone, PartialEq)]
struct ChangeDigest {
    is_connected: bool,
    endpoint: Option<String>,
    client_ip: Option<IpAddr>,
    transfer_rx: u64,
    transfer_tx: u64,
}

impl From<&PeerSnapshot> for ChangeDigest {
    fn from(snapshot: &PeerSnapshot) -> Self {
        Self {
            is_connected: snapshot.is_connected,
            endpoint: snapshot.endpoint.clone(),
            client_ip: snapshot.client_ip,
            transfer_rx: snapshot.transfer_rx,
            transfer_tx: snapshot.transfer_tx,
        }
    }
}

/// Tracks the last emitted snapshot set and decides whether a new tick is
/// worth pushing to subscribers.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    last: Option<std::collections::HashMap<PeerId, ChangeDigest>>,
}

impl ChangeDetector {
    /// Builds an empty detector: the first call to [`Self::should_emit`]
    /// always reports a change.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides whether `current` differs enough from the last recorded set
    /// to warrant emission, per the spec's change-detection rule.
    pub fn should_emit(&mut self, current: &[PeerSnapshot]) -> bool {
        let Some(last) = &self.last else {
            return true;
        };

        if current.len() != last.len() {
            return true;
        }

        current.iter().any(|snapshot| {
            let digest = ChangeDigest::from(snapshot);
            match last.get(&snapshot.peer_id) {
                None => true,
                Some(prev) => {
                    prev.is_connected != digest.is_connected
                        || prev.endpoint != digest.endpoint
                        || prev.client_ip != digest.client_ip
                        || prev.transfer_rx.abs_diff(digest.transfer_rx) > TRAFFIC_CHANGE_THRESHOLD
                        || prev.transfer_tx.abs_diff(digest.transfer_tx) > TRAFFIC_CHANGE_THRESHOLD
                }
            }
        })
    }

    /// Records `current` as the new baseline for future comparisons.
    pub fn record(&mut self, current: &[PeerSnapshot]) {
        self.last = Some(
            current
                .iter()
                .map(|s| (s.peer_id, ChangeDigest::from(s)))
                .collect(),
        );
    }

    /// Clears the baseline, forcing the next comparison to report a change.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
