//! Error types for IPAM and config rendering.

use wgctl_types::PeerId;

/// A single overlap violation from [`crate::validate::validate_multiple_allowed_ips`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllowedIpViolation {
    /// The candidate did not parse as a CIDR.
    #[error("'{candidate}' is not a valid CIDR")]
    NotACidr {
        /// The raw text that failed to parse.
        candidate: String,
    },

    /// The candidate overlaps the VPN subnet itself.
    #[error("{cidr} overlaps the VPN subnet {subnet}")]
    OverlapsSubnet {
        /// The offending candidate.
        cidr: String,
        /// The VPN subnet it collided with.
        subnet: String,
    },

    /// The candidate overlaps another peer's assigned address or AllowedIPs.
    #[error("{cidr} overlaps peer {other} ({other_cidr})")]
    OverlapsPeer {
        /// The offending candidate.
        cidr: String,
        /// The peer already claiming that space.
        other: PeerId,
        /// The specific network it collided with.
        other_cidr: String,
    },

    /// Two candidates within the same submission overlap each other.
    #[error("{first} overlaps {second} within the same submission")]
    OverlapsSibling {
        /// The first candidate, in submission order.
        first: String,
        /// The second candidate, in submission order.
        second: String,
    },
}

/// Errors from IPAM and the config renderer.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configured VPN subnet is not a valid CIDR, or is not IPv4.
    #[error("invalid subnet: {0}")]
    InvalidSubnet(String),

    /// Every host address in the subnet is already assigned.
    #[error("subnet exhausted: no free host address remains")]
    SubnetExhausted,

    /// One or more operator-supplied AllowedIPs failed validation.
    #[error("{} allowed-ip violation(s)", .0.len())]
    AllowedIps(Vec<AllowedIpViolation>),

    /// Writing the rendered config to disk failed.
    #[error("io error writing {path}: {source}")]
    Io {
        /// The path being written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, ConfigError>;
