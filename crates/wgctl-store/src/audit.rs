//! The reconcile audit trail: an observability-only record of firewall
//! reconcile attempts, never consulted to gate a reconcile.

use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError};

/// The outcome of a single reconcile attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The compiled rule set was applied and no rollback was needed.
    Applied,
    /// The compiled rule set failed to apply and the prior rules were
    /// restored from backup.
    RolledBack,
    /// The attempt failed before any rules were touched (e.g. the external
    /// tool was unreachable).
    Aborted,
}

impl ReconcileOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::RolledBack => "rolled_back",
            Self::Aborted => "aborted",
        }
    }
}

/// A single row from the reconcile audit trail.
#[derive(Debug, Clone)]
pub struct ReconcileAuditEntry {
    /// Store-assigned row id.
    pub id: i64,
    /// When the attempt was recorded.
    pub occurred_at: DateTime<Utc>,
    /// The attempt's outcome.
    pub outcome: ReconcileOutcome,
    /// Free-text detail, e.g. the number of rules applied or the failure
    /// reason.
    pub detail: String,
}

impl ReconcileAuditEntry {
    pub(crate) fn from_row(
        id: i64,
        occurred_at: &str,
        outcome: &str,
        detail: String,
    ) -> Result<Self> {
        let outcome = match outcome {
            "applied" => ReconcileOutcome::Applied,
            "rolled_back" => ReconcileOutcome::RolledBack,
            "aborted" => ReconcileOutcome::Aborted,
            other => {
                return Err(StoreError::CorruptRow {
                    table: "reconcile_audit",
                    reason: format!("unknown outcome '{other}'"),
                })
            }
        };
        let occurred_at = DateTime::parse_from_str(
            &format!("{occurred_at} +0000"),
            "%Y-%m-%d %H:%M:%S %z",
        )
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            table: "reconcile_audit",
            reason: e.to_string(),
        })?;

        Ok(Self {
            id,
            occurred_at,
            outcome,
            detail,
        })
    }
}
