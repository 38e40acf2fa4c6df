//! Orchestrates the two `wg show` invocations per tick and merges their
//! output into per-peer connection records.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{instrument, warn};
use wgctl_validation::command::{AllowedProgram, SafeCommand};

use crate::error::Result;
use crate::parse::{parse_full_dump, parse_latest_handshakes};

/// How the final `is_connected` verdict was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMethod {
    /// The sole authoritative rule: handshake within the timeout.
    HandshakeRule,
    /// No handshake has ever been recorded.
    NoHandshake,
    /// A stale handshake was overridden connected by a conntrack hit.
    ConntrackOverride,
    /// A stale handshake was overridden connected by a ping reply.
    PingFallback,
}

/// A single peer's live connection record for one tick.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    /// The peer's WireGuard public key, base64-encoded as reported by `wg`.
    pub public_key: String,
    /// `host:port`, if known.
    pub endpoint: Option<wgctl_types::Endpoint>,
    /// The host component of `endpoint`, parsed as an IP if possible.
    pub client_ip: Option<IpAddr>,
    /// Allowed-IPs as reported by the kernel, not the store.
    pub allowed_ips: Vec<String>,
    /// The most recent handshake time, or `None` if never/unknown.
    pub latest_handshake: Option<DateTime<Utc>>,
    /// Cumulative bytes received.
    pub transfer_rx: u64,
    /// Cumulative bytes sent.
    pub transfer_tx: u64,
    /// Configured persistent keepalive, in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Whether this peer is currently considered connected.
    pub is_connected: bool,
    /// Which rule produced `is_connected`.
    pub connection_method: ConnectionMethod,
}

/// Configuration for a [`StatusReader`].
#[derive(Debug, Clone)]
pub struct StatusReaderConfig {
    /// The WireGuard interface to query.
    pub interface: String,
    /// A handshake older than this is considered stale. Default 180s.
    pub handshake_timeout: Duration,
    /// Bound on each external-tool invocation. Default 3s.
    pub tool_deadline: Duration,
    /// Whether to consult `conntrack` to override a stale handshake.
    pub enable_conntrack: bool,
    /// Whether to ping a peer to override a stale handshake.
    pub enable_ping_check: bool,
    /// Bound on the ping probe itself.
    pub ping_timeout: Duration,
    /// The UDP port WireGuard listens on, used for the conntrack filter.
    pub listen_port: u16,
}

impl Default for StatusReaderConfig {
    fn default() -> Self {
        Self {
            interface: "wg0".to_string(),
            handshake_timeout: Duration::from_secs(180),
            tool_deadline: Duration::from_secs(3),
            enable_conntrack: false,
            enable_ping_check: false,
            ping_timeout: Duration::from_millis(500),
            listen_port: 51820,
        }
    }
}

/// Reads live WireGuard status by shelling out to `wg show`.
#[derive(Debug, Clone)]
pub struct StatusReader {
    config: StatusReaderConfig,
}

impl StatusReader {
    /// Builds a reader from the given configuration.
    #[must_use]
    pub fn new(config: StatusReaderConfig) -> Self {
        Self { config }
    }

    /// Reads the current status of every peer on the configured interface.
    ///
    /// A missing `wg` binary or non-zero exit is not fatal: it yields an
    /// empty map, matching the spec's "tool-missing returns empty" rule.
    #[instrument(skip(self))]
    pub async fn read(&self) -> HashMap<String, PeerStatus> {
        let interface = self.config.interface.as_str();

        let handshakes = match self.run_wg(&["show", interface, "latest-handshakes"]).await {
            Ok(output) => parse_latest_handshakes(&output),
            Err(err) => {
                warn!(error = %err, "latest-handshakes query failed");
                return HashMap::new();
            }
        };

        let dump = match self.run_wg(&["show", interface]).await {
            Ok(output) => parse_full_dump(&output),
            Err(err) => {
                warn!(error = %err, "full status dump failed");
                return HashMap::new();
            }
        };

        let conntrack_active = if self.config.enable_conntrack {
            self.conntrack_active_ips().await
        } else {
            Vec::new()
        };

        let mut statuses = HashMap::with_capacity(dump.len());
        for (public_key, peer_dump) in dump {
            let latest_handshake = handshakes.get(&public_key).copied().flatten();
            let client_ip = peer_dump
                .endpoint
                .as_ref()
                .and_then(|e| e.host().parse::<IpAddr>().ok());

            let (is_connected, connection_method) = self
                .resolve_connection(latest_handshake, client_ip, &conntrack_active)
                .await;

            statuses.insert(
                public_key.clone(),
                PeerStatus {
                    public_key,
                    endpoint: peer_dump.endpoint,
                    client_ip,
                    allowed_ips: peer_dump.allowed_ips,
                    latest_handshake,
                    transfer_rx: peer_dump.transfer_rx,
                    transfer_tx: peer_dump.transfer_tx,
                    persistent_keepalive: peer_dump.persistent_keepalive,
                    is_connected,
                    connection_method,
                },
            );
        }

        statuses
    }

    async fn resolve_connection(
        &self,
        latest_handshake: Option<DateTime<Utc>>,
        client_ip: Option<IpAddr>,
        conntrack_active: &[IpAddr],
    ) -> (bool, ConnectionMethod) {
        let Some(handshake) = latest_handshake else {
            return (false, ConnectionMethod::NoHandshake);
        };

        let age = Utc::now().signed_duration_since(handshake);
        let recent = age.to_std().map(|d| d < self.config.handshake_timeout).unwrap_or(false);

        if recent {
            return (true, ConnectionMethod::HandshakeRule);
        }

        if self.config.enable_conntrack {
            if let Some(ip) = client_ip {
                if conntrack_active.contains(&ip) {
                    return (true, ConnectionMethod::ConntrackOverride);
                }
            }
        }

        if self.config.enable_ping_check {
            if let Some(ip) = client_ip {
                if self.ping_reachable(ip).await {
                    return (true, ConnectionMethod::PingFallback);
                }
            }
        }

        (false, ConnectionMethod::HandshakeRule)
    }

    async fn run_wg(&self, args: &[&str]) -> Result<String> {
        let output = tokio::time::timeout(
            self.config.tool_deadline,
            SafeCommand::new(AllowedProgram::Wg).args(args).execute(),
        )
        .await
        .map_err(|_| crate::error::StatusError::Timeout(self.config.tool_deadline))??;

        Ok(output.stdout_lossy())
    }

    async fn ping_reachable(&self, ip: IpAddr) -> bool {
        let deadline_ms = self.config.ping_timeout.as_millis().to_string();
        let ip_str = ip.to_string();

        let result = tokio::time::timeout(
            self.config.ping_timeout + Duration::from_millis(500),
            SafeCommand::new(AllowedProgram::Ping)
                .args(["-c", "1", "-W", deadline_ms.as_str(), ip_str.as_str()])
                .execute(),
        )
        .await;

        matches!(result, Ok(Ok(output)) if output.success())
    }

    async fn conntrack_active_ips(&self) -> Vec<IpAddr> {
        let port = self.config.listen_port.to_string();
        let result = tokio::time::timeout(
            self.config.tool_deadline,
            SafeCommand::new(AllowedProgram::Conntrack)
                .args(["-L", "-p", "udp", "--dport", port.as_str()])
                .execute(),
        )
        .await;

        let Ok(Ok(output)) = result else {
            return Vec::new();
        };

        parse_conntrack_assured_sources(&output.stdout_lossy())
    }
}

fn parse_conntrack_assured_sources(output: &str) -> Vec<IpAddr> {
    let mut ips = Vec::new();
    for line in output.lines() {
        if !line.contains("[ASSURED]") {
            continue;
        }
        if let Some(src) = line.split_whitespace().find_map(|tok| tok.strip_prefix("src=")) {
            if let Ok(ip) = src.parse::<IpAddr>() {
                ips.push(ip);
            }
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conntrack_parsing_picks_up_assured_source() {
        let line = "udp 17 118 src=192.168.3.54 dst=172.24.0.2 sport=54186 dport=51820 src=172.24.0.2 dst=192.168.3.54 sport=51820 dport=54186 [ASSURED] mark=0 use=1";
        let ips = parse_conntrack_assured_sources(line);
        assert_eq!(ips, vec!["192.168.3.54".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn conntrack_ignores_unassured_lines() {
        let line = "udp 17 29 src=192.168.3.54 dst=172.24.0.2 sport=54186 dport=51820 src=172.24.0.2 dst=192.168.3.54 sport=51820 dport=54186 mark=0 use=1";
        assert!(parse_conntrack_assured_sources(line).is_empty());
    }
}
