//! Error types for the telemetry pipeline.

/// Errors raised while ticking the telemetry pipeline or demuxing a
/// peer-action command.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The store gateway rejected or failed a read/write.
    #[error(transparent)]
    Store(#[from] wgctl_store::StoreError),

    /// Rendering or writing the interface configuration failed.
    #[error(transparent)]
    Config(#[from] wgctl_config::ConfigError),

    /// Reconciling packet-filter state failed.
    #[error(transparent)]
    Firewall(#[from] wgctl_firewall::FirewallError),

    /// The peer named in a peer-action command does not exist.
    #[error("peer {0} not found")]
    PeerNotFound(wgctl_types::PeerId),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, TelemetryError>;
