//! The `Peer` entity and the small validated wrappers attached to it.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use regex_lite_name::NAME_PATTERN;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::PeerId;
use crate::keys::{PresharedKey, PublicKey};

/// Peer display name, validated to `[A-Za-z0-9_-]{1,50}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerName(String);

impl PeerName {
    /// Validates and wraps a candidate peer name.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidPeerName`] if the name is empty, longer
    /// than 50 characters, or contains characters outside
    /// `[A-Za-z0-9_-]`.
    pub fn new(candidate: impl Into<String>) -> Result<Self, TypeError> {
        let candidate = candidate.into();
        if candidate.is_empty()
            || candidate.len() > 50
            || !candidate.bytes().all(|b| NAME_PATTERN.contains(b))
        {
            return Err(TypeError::InvalidPeerName(candidate));
        }
        Ok(Self(candidate))
    }

    /// Returns the validated name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PeerName {
    type Error = TypeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerName> for String {
    fn from(value: PeerName) -> Self {
        value.0
    }
}

mod regex_lite_name {
    /// Byte-membership check for `[A-Za-z0-9_-]`, avoiding a regex dependency
    /// for a single fixed character class.
    pub struct NamePattern;

    impl NamePattern {
        pub fn contains(&self, b: u8) -> bool {
            b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
        }
    }

    pub static NAME_PATTERN: NamePattern = NamePattern;
}

/// A remote endpoint in `host:port` form (the peer's last-known public
/// address, or the server's public endpoint in a client config).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Builds an endpoint from a resolved socket address.
    #[must_use]
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self { host: addr.ip().to_string(), port: addr.port() }
    }

    /// Builds an endpoint from a hostname (which may not be a literal IP)
    /// and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    /// The host component (hostname or IP literal).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port component.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Parses the host component as an IP address, if it is one.
    #[must_use]
    pub fn host_ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl FromStr for Endpoint {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TypeError::InvalidEndpoint(s.to_string()))?;
        if host.is_empty() {
            return Err(TypeError::InvalidEndpoint(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| TypeError::InvalidEndpoint(s.to_string()))?;
        Ok(Self { host: host.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Default persistent keepalive (seconds) applied when a peer does not set
/// one explicitly.
pub const DEFAULT_KEEPALIVE: u16 = 25;

/// A remote WireGuard peer and its control-plane metadata.
///
/// Lifecycle: created by an operator (IP auto-allocated by the IPAM
/// component); mutated by an operator; deletion cascades to its
/// [`crate::AllowedIp`] and [`crate::FirewallRule`] rows. `is_active = false`
/// means the peer is omitted from the rendered interface but its rows
/// persist.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    /// Store-assigned identifier. `None` for a peer not yet persisted.
    pub id: Option<PeerId>,
    /// Unique, validated display name.
    pub name: PeerName,
    /// Unique WireGuard public key.
    pub public_key: PublicKey,
    /// Optional preshared key, layered onto the Noise handshake.
    pub preshared_key: Option<PresharedKey>,
    /// Unique IPv4 host address inside the VPN subnet; never the gateway.
    pub assigned_ip: IpAddr,
    /// Optional last-known (or static) `host:port` the peer is reachable at.
    pub endpoint: Option<Endpoint>,
    /// Optional persistent keepalive override, in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Whether this peer is included in the rendered interface.
    pub is_active: bool,
}

impl Peer {
    /// Returns the effective persistent keepalive: the peer's override or
    /// [`DEFAULT_KEEPALIVE`].
    #[must_use]
    pub fn effective_keepalive(&self) -> u16 {
        self.persistent_keepalive.unwrap_or(DEFAULT_KEEPALIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_name_accepts_valid() {
        assert!(PeerName::new("alice").is_ok());
        assert!(PeerName::new("alice_01-b").is_ok());
    }

    #[test]
    fn peer_name_rejects_empty() {
        assert!(PeerName::new("").is_err());
    }

    #[test]
    fn peer_name_rejects_too_long() {
        let long = "a".repeat(51);
        assert!(PeerName::new(long).is_err());
    }

    #[test]
    fn peer_name_rejects_bad_chars() {
        assert!(PeerName::new("alice!").is_err());
        assert!(PeerName::new("alice bob").is_err());
    }

    #[test]
    fn endpoint_parses_host_port() {
        let e: Endpoint = "example.com:51820".parse().unwrap();
        assert_eq!(e.host(), "example.com");
        assert_eq!(e.port(), 51820);
    }

    #[test]
    fn endpoint_rejects_missing_port() {
        assert!("example.com".parse::<Endpoint>().is_err());
    }

    #[test]
    fn endpoint_display_roundtrips() {
        let e: Endpoint = "10.0.0.5:51820".parse().unwrap();
        assert_eq!(e.to_string(), "10.0.0.5:51820");
    }

    #[test]
    fn effective_keepalive_defaults_to_25() {
        let peer = Peer {
            id: None,
            name: PeerName::new("alice").unwrap(),
            public_key: crate::keys::generate_keypair().1,
            preshared_key: None,
            assigned_ip: "10.0.0.2".parse().unwrap(),
            endpoint: None,
            persistent_keepalive: None,
            is_active: true,
        };
        assert_eq!(peer.effective_keepalive(), DEFAULT_KEEPALIVE);
    }
}
