//! Line-based parsing of `wg show` output.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use wgctl_types::Endpoint;

static TRANSFER_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d.]+)\s*([KMGT]?i?B)\s*received").expect("static pattern"));
static TRANSFER_TX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\d.]+)\s*([KMGT]?i?B)\s*sent").expect("static pattern"));
static KEEPALIVE_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)").expect("static pattern"));

/// Parses `wg show <iface> latest-handshakes` output: one
/// `public_key<TAB>unix_seconds` line per peer.
///
/// A timestamp of `0` means "never handshaked" and is recorded as `None`.
/// A line whose second field does not parse as a non-negative integer is
/// also recorded as `None`: an unrecognised format is treated as unknown,
/// never as "now".
#[must_use]
pub fn parse_latest_handshakes(output: &str) -> HashMap<String, Option<DateTime<Utc>>> {
    let mut handshakes = HashMap::new();

    for line in output.trim().lines() {
        let line = line.trim();
        let Some((public_key, timestamp_str)) = line.split_once('\t') else {
            continue;
        };
        let public_key = public_key.trim().to_string();
        let timestamp_str = timestamp_str.trim();

        let parsed = match timestamp_str.parse::<i64>() {
            Ok(0) => None,
            Ok(seconds) if seconds > 0 => Utc.timestamp_opt(seconds, 0).single(),
            _ => None,
        };

        handshakes.insert(public_key, parsed);
    }

    handshakes
}

/// One peer's fields from the full-dump `wg show <iface>` output.
#[derive(Debug, Clone, Default)]
pub struct PeerDump {
    /// `host:port`, if the peer has a known endpoint.
    pub endpoint: Option<Endpoint>,
    /// The peer's allowed-IPs list, as raw CIDR literals.
    pub allowed_ips: Vec<String>,
    /// Cumulative bytes received.
    pub transfer_rx: u64,
    /// Cumulative bytes sent.
    pub transfer_tx: u64,
    /// Configured persistent keepalive, in seconds.
    pub persistent_keepalive: Option<u16>,
}

/// Parses the full-dump `wg show <iface>` output into a per-peer record,
/// keyed by public key.
#[must_use]
pub fn parse_full_dump(output: &str) -> HashMap<String, PeerDump> {
    let mut peers: HashMap<String, PeerDump> = HashMap::new();
    let mut current: Option<String> = None;

    for raw_line in output.trim().lines() {
        let line = raw_line.trim();

        if let Some(key) = line.strip_prefix("peer:") {
            let key = key.trim().to_string();
            peers.insert(key.clone(), PeerDump::default());
            current = Some(key);
            continue;
        }

        let Some(key) = current.as_ref() else { continue };
        let Some(peer) = peers.get_mut(key) else { continue };

        if let Some(rest) = line.strip_prefix("endpoint:") {
            let rest = rest.trim();
            if let Some((host, port)) = rest.rsplit_once(':') {
                if let Ok(port) = port.parse::<u16>() {
                    peer.endpoint = Some(Endpoint::new(host, port));
                }
            }
        } else if let Some(rest) = line.strip_prefix("allowed ips:") {
            let rest = rest.trim();
            peer.allowed_ips = if rest.is_empty() {
                Vec::new()
            } else {
                rest.split(',').map(|ip| ip.trim().to_string()).collect()
            };
        } else if let Some(rest) = line.strip_prefix("transfer:") {
            let (rx, tx) = parse_transfer(rest.trim());
            peer.transfer_rx = rx;
            peer.transfer_tx = tx;
        } else if let Some(rest) = line.strip_prefix("persistent keepalive:") {
            let rest = rest.trim();
            if rest != "off" {
                peer.persistent_keepalive = KEEPALIVE_SECONDS
                    .captures(rest)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<u16>().ok());
            }
        }
    }

    peers
}

/// Parses a transfer line like `"1.23 MiB received, 456.78 KiB sent"` into
/// `(rx_bytes, tx_bytes)`, honoring both SI (`KB`, `MB`, ...) and IEC
/// (`KiB`, `MiB`, ...) units.
#[must_use]
pub fn parse_transfer(transfer: &str) -> (u64, u64) {
    let rx = TRANSFER_RX
        .captures(transfer)
        .and_then(|caps| parse_quantity(&caps))
        .unwrap_or(0);
    let tx = TRANSFER_TX
        .captures(transfer)
        .and_then(|caps| parse_quantity(&caps))
        .unwrap_or(0);
    (rx, tx)
}

fn parse_quantity(caps: &regex::Captures<'_>) -> Option<u64> {
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str();
    Some(convert_to_bytes(value, unit))
}

fn convert_to_bytes(value: f64, unit: &str) -> u64 {
    let multiplier: f64 = match unit.to_uppercase().as_str() {
        "B" => 1.0,
        "KB" => 1_000.0,
        "KIB" => 1024.0,
        "MB" => 1_000_000.0,
        "MIB" => 1024.0 * 1024.0,
        "GB" => 1_000_000_000.0,
        "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TB" => 1_000_000_000_000.0,
        "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (value * multiplier) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_zero_is_none() {
        let handshakes = parse_latest_handshakes("abc123\t0\n");
        assert_eq!(handshakes.get("abc123"), Some(&None));
    }

    #[test]
    fn handshake_nonzero_parses_to_timestamp() {
        let handshakes = parse_latest_handshakes("abc123\t1700000000\n");
        assert!(handshakes.get("abc123").unwrap().is_some());
    }

    #[test]
    fn handshake_garbage_is_unknown() {
        let handshakes = parse_latest_handshakes("abc123\tnot-a-number\n");
        assert_eq!(handshakes.get("abc123"), Some(&None));
    }

    #[test]
    fn handshake_skips_lines_without_tab() {
        let handshakes = parse_latest_handshakes("no tab here\n");
        assert!(handshakes.is_empty());
    }

    #[test]
    fn transfer_parses_iec_units() {
        let (rx, tx) = parse_transfer("1.00 MiB received, 500.00 KiB sent");
        assert_eq!(rx, 1_048_576);
        assert_eq!(tx, 512_000);
    }

    #[test]
    fn transfer_parses_si_units() {
        let (rx, _) = parse_transfer("2.00 MB received, 0 B sent");
        assert_eq!(rx, 2_000_000);
    }

    #[test]
    fn full_dump_parses_peer_block() {
        let output = "peer: abc123\n  endpoint: 203.0.113.5:51820\n  allowed ips: 10.0.0.2/32\n  transfer: 1.00 MiB received, 2.00 MiB sent\n  persistent keepalive: every 25 seconds\n";
        let peers = parse_full_dump(output);
        let peer = peers.get("abc123").unwrap();
        assert_eq!(peer.endpoint.as_ref().unwrap().host(), "203.0.113.5");
        assert_eq!(peer.endpoint.as_ref().unwrap().port(), 51820);
        assert_eq!(peer.allowed_ips, vec!["10.0.0.2/32"]);
        assert_eq!(peer.transfer_rx, 1_048_576);
        assert_eq!(peer.persistent_keepalive, Some(25));
    }

    #[test]
    fn full_dump_off_keepalive_is_none() {
        let output = "peer: abc123\n  persistent keepalive: off\n";
        let peers = parse_full_dump(output);
        assert_eq!(peers.get("abc123").unwrap().persistent_keepalive, None);
    }
}
