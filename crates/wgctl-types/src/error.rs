//! Error types for domain values: keys, addresses, and rule fields.

use thiserror::Error;

/// Errors that can occur constructing or parsing a domain value.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// A decoded key was not exactly 32 bytes.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// A CIDR network string failed to parse.
    #[error("invalid CIDR network: {0}")]
    InvalidCidr(String),

    /// A `host:port` endpoint string failed to parse.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A peer name did not match `[A-Za-z0-9_-]{1,50}`.
    #[error("invalid peer name {0:?}: must be 1-50 characters of letters, digits, '-' or '_'")]
    InvalidPeerName(String),

    /// A port range string did not match any accepted literal form.
    #[error("invalid port range {0:?}: expected \"any\", a single port, \"N-M\", or a comma list")]
    InvalidPortRange(String),

    /// A persistent keepalive value was outside `0..=65535`.
    #[error("invalid persistent keepalive {0}: must be 0-65535")]
    InvalidKeepalive(u32),
}

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, TypeError>;
