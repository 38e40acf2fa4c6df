//! The `FirewallRule` entity and its closed enumerations.
//!
//! Fully replaced on peer edit: editing a peer's firewall policy is a *set*
//! operation over its rules, never a merge.

use std::fmt;
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{FirewallRuleId, PeerId};

/// The category a [`FirewallRule`] was authored under, driving the default
/// destination and interface-constraint when the rule leaves them unset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Communication with other peers on the VPN subnet.
    PeerComm,
    /// Unrestricted egress to the public internet.
    Internet,
    /// A specific subnet reachable through the server.
    Subnet,
    /// A specific port irrespective of destination.
    Port,
    /// No implied defaults; `source`/`destination` must be explicit.
    Custom,
}

/// The action a compiled rule takes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleAction {
    /// Permit matching traffic.
    Allow,
    /// Reject matching traffic.
    Deny,
}

/// The transport protocol a rule matches, or `Any` to match all.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
    /// ICMP.
    Icmp,
    /// Match any protocol; no protocol match is emitted for this rule.
    Any,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Any => "any",
        };
        write!(f, "{s}")
    }
}

/// A validated port-range literal: `"any"`, a single port, a dash range
/// (`N-M`), or a comma-separated list of ports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange(String);

impl PortRange {
    /// The literal meaning "no port restriction".
    pub const ANY: &'static str = "any";

    /// Validates and wraps a candidate port-range literal.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidPortRange`] if the literal does not match
    /// any of the accepted forms, or any constituent port is outside
    /// `1..=65535`.
    pub fn new(candidate: impl Into<String>) -> Result<Self, TypeError> {
        let candidate = candidate.into();
        if candidate == Self::ANY {
            return Ok(Self(candidate));
        }
        let valid = if let Some((lo, hi)) = candidate.split_once('-') {
            matches!((parse_port(lo), parse_port(hi)), (Some(lo), Some(hi)) if lo <= hi)
        } else if candidate.contains(',') {
            candidate.split(',').all(|p| parse_port(p).is_some())
        } else {
            parse_port(&candidate).is_some()
        };
        if !valid {
            return Err(TypeError::InvalidPortRange(candidate));
        }
        Ok(Self(candidate))
    }

    /// Returns the validated literal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this range is the unrestricted `"any"` literal.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.0 == Self::ANY
    }
}

fn parse_port(s: &str) -> Option<u16> {
    let n: u32 = s.trim().parse().ok()?;
    if n == 0 || n > 65535 {
        return None;
    }
    Some(n as u16)
}

impl TryFrom<String> for PortRange {
    type Error = TypeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortRange> for String {
    fn from(value: PortRange) -> Self {
        value.0
    }
}

impl FromStr for PortRange {
    type Err = TypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A single compiled-at-apply-time firewall rule attached to a peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Store-assigned identifier. `None` for a row not yet persisted.
    pub id: Option<FirewallRuleId>,
    /// The owning peer.
    pub peer_id: PeerId,
    /// Free-text name, echoed into the `Rule:<name>` packet-filter comment.
    pub name: String,
    /// The rule's authored category.
    pub rule_type: RuleType,
    /// Whether matching traffic is permitted or rejected.
    pub action: RuleAction,
    /// Overrides the implied source; defaults to the peer's `assigned_ip/32`.
    pub source: Option<IpNet>,
    /// Overrides the implied destination (see [`RuleType`] for defaults).
    pub destination: Option<IpNet>,
    /// The transport protocol matched.
    pub protocol: Protocol,
    /// Port match, meaningful only for `protocol ∈ {tcp, udp}`.
    pub port_range: PortRange,
    /// Evaluation order; lower values are evaluated first.
    pub priority: i32,
    /// Whether this rule currently participates in compilation.
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_accepts_any() {
        assert!(PortRange::new("any").unwrap().is_any());
    }

    #[test]
    fn port_range_accepts_single() {
        assert_eq!(PortRange::new("443").unwrap().as_str(), "443");
    }

    #[test]
    fn port_range_accepts_dash_range() {
        assert!(PortRange::new("8000-8080").is_ok());
    }

    #[test]
    fn port_range_rejects_inverted_dash_range() {
        assert!(PortRange::new("8080-8000").is_err());
    }

    #[test]
    fn port_range_accepts_comma_list() {
        assert!(PortRange::new("80,443,8443").is_ok());
    }

    #[test]
    fn port_range_rejects_out_of_bounds() {
        assert!(PortRange::new("70000").is_err());
        assert!(PortRange::new("0").is_err());
    }

    #[test]
    fn port_range_rejects_garbage() {
        assert!(PortRange::new("not-a-port").is_err());
    }

    #[test]
    fn protocol_display() {
        assert_eq!(Protocol::Tcp.to_string(), "tcp");
        assert_eq!(Protocol::Any.to_string(), "any");
    }
}
