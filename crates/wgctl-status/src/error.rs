//! Error types for the status reader.

use wgctl_validation::command::CommandError;

/// Errors reading live WireGuard interface status.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// The `wg show` invocation failed.
    #[error("wg show failed: {0}")]
    Command(#[from] CommandError),

    /// The invocation did not complete inside the configured deadline.
    #[error("wg show timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, StatusError>;
