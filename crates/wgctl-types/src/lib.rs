//! Core domain types for the WireGuard control plane.
//!
//! Everything here is a pure value type: parsing, validation, and display,
//! with no I/O. The store gateway, IPAM, renderer, and policy compiler all
//! build on these types rather than on raw strings.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod allowed_ip;
mod error;
mod firewall_rule;
mod ids;
mod keys;
mod peer;

pub use allowed_ip::AllowedIp;
pub use error::{Result, TypeError};
pub use firewall_rule::{FirewallRule, PortRange, Protocol, RuleAction, RuleType};
pub use ids::{AllowedIpId, FirewallRuleId, PeerId};
pub use keys::{generate_keypair, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
pub use peer::{Endpoint, Peer, PeerName, DEFAULT_KEEPALIVE};
