//! The `AllowedIp` entity: a route target reached through a peer.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{AllowedIpId, PeerId};

/// A network routed through a peer, distinct from the peer's own tunnel
/// address (`assigned_ip`).
///
/// Invariant (enforced by the IPAM component, not by this type): no
/// `AllowedIp` of any peer overlaps any other peer's `assigned_ip` or
/// `AllowedIp`, and no `AllowedIp` overlaps the VPN subnet itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedIp {
    /// Store-assigned identifier. `None` for a row not yet persisted.
    pub id: Option<AllowedIpId>,
    /// The owning peer.
    pub peer_id: PeerId,
    /// The routed network, IPv4 or IPv6.
    pub ip_network: IpNet,
    /// Optional free-text annotation.
    pub description: Option<String>,
}

impl AllowedIp {
    /// Builds an `AllowedIp` from a CIDR string.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidCidr`] if `cidr` does not parse.
    pub fn new(peer_id: PeerId, cidr: &str, description: Option<String>) -> Result<Self, TypeError> {
        let ip_network = cidr
            .parse::<IpNet>()
            .map_err(|e| TypeError::InvalidCidr(format!("{cidr}: {e}")))?;
        Ok(Self { id: None, peer_id, ip_network, description })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_cidr() {
        let a = AllowedIp::new(PeerId::new(1), "192.168.1.0/24", None).unwrap();
        assert_eq!(a.ip_network.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn rejects_invalid_cidr() {
        assert!(AllowedIp::new(PeerId::new(1), "not-a-cidr", None).is_err());
    }

    #[test]
    fn accepts_ipv6() {
        assert!(AllowedIp::new(PeerId::new(1), "fd00::/64", None).is_ok());
    }
}
