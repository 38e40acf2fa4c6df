//! Error types for the store gateway.

use wgctl_types::PeerId;

/// Errors returned by the store gateway.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No peer exists with the given id.
    #[error("peer {id} not found")]
    PeerNotFound {
        /// The id that was looked up.
        id: PeerId,
    },

    /// A unique constraint was violated: peer name, public key, or assigned
    /// IP already belongs to another peer.
    #[error("conflict: {reason}")]
    Conflict {
        /// Human-readable description of which uniqueness constraint fired.
        reason: String,
    },

    /// A stored value failed to parse back into its domain type. This means
    /// data was written by something other than this crate, or a migration
    /// changed a column's meaning without a matching type update.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow {
        /// The table the bad row came from.
        table: &'static str,
        /// What about the row failed to parse.
        reason: String,
    },

    /// The underlying database returned an error not otherwise classified.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_not_found_message() {
        let err = StoreError::PeerNotFound { id: PeerId::new(7) };
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn conflict_message_carries_reason() {
        let err = StoreError::Conflict {
            reason: "public key already assigned".into(),
        };
        assert!(err.to_string().contains("already assigned"));
    }
}
