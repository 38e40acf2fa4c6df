//! Error types for the policy compiler and reconciler.

use wgctl_validation::command::CommandError;

/// Errors from compiling or applying firewall policy.
#[derive(Debug, thiserror::Error)]
pub enum FirewallError {
    /// The reconciler does not have permission to modify packet-filter
    /// state.
    #[error("no packet-filter access: {0}")]
    AccessDenied(String),

    /// A shelled-out `iptables`/`iptables-save`/`iptables-restore`
    /// invocation failed.
    #[error("packet-filter command failed: {0}")]
    Command(#[from] CommandError),

    /// Writing or reading the backup file failed.
    #[error("backup I/O error at {path}: {source}")]
    BackupIo {
        /// The backup file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The batch failed to commit and the prior ruleset was restored from
    /// backup. The batch commits as one atomic `iptables-restore` call, so
    /// none of `rules` ever took effect; they are carried for the caller to
    /// report (e.g. surfacing the first two as diagnostic context).
    #[error("reconcile aborted, {} rule(s) rolled back: {reason}", rules.len())]
    Aborted {
        /// Preview representations of every rule in the attempted batch.
        rules: Vec<String>,
        /// The underlying failure.
        reason: String,
    },
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, FirewallError>;
