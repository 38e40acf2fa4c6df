//! The store gateway: the only part of the system that talks SQL.

use std::collections::HashSet;
use std::net::IpAddr;

use sqlx::error::DatabaseError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use wgctl_types::{AllowedIp, FirewallRule, Peer, PeerId};

use crate::audit::ReconcileOutcome;
use crate::error::{Result, StoreError};
use crate::rows::{action_str, rule_type_str, AllowedIpRow, FirewallRuleRow, PeerRow};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// A peer together with its allowed IPs and firewall rules, ordered the way
/// the config renderer and policy compiler expect to consume them.
#[derive(Debug, Clone)]
pub struct PeerDetail {
    /// The peer row itself.
    pub peer: Peer,
    /// This peer's allowed IP entries, in insertion order.
    pub allowed_ips: Vec<AllowedIp>,
    /// This peer's firewall rules, ordered by ascending priority.
    pub firewall_rules: Vec<FirewallRule>,
}

/// Persistent gateway over peers, their allowed IPs, firewall rules, and
/// the reconcile audit trail.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the SQLite database at `database_url` and
    /// applies any outstanding migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be
    /// established, or [`StoreError::Migration`] if a migration fails.
    #[instrument]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options: SqliteConnectOptions = database_url.parse::<SqliteConnectOptions>()?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        MIGRATOR.run(&pool).await?;
        info!("store migrations applied");
        Ok(Self { pool })
    }

    /// Wraps an already-open pool. Used by tests that need an in-memory
    /// database with migrations pre-applied.
    pub(crate) fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every peer whose `is_active` flag is set, without loading
    /// allowed IPs or firewall rules. Used by the config renderer, which
    /// only ever emits active peers into `wg0.conf`.
    #[instrument(skip(self))]
    pub async fn list_active_peers(&self) -> Result<Vec<Peer>> {
        let rows: Vec<PeerRow> = sqlx::query_as(
            "SELECT id, name, public_key, preshared_key, assigned_ip,
                    endpoint_host, endpoint_port, persistent_keepalive, is_active
             FROM peers WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PeerRow::into_peer).collect()
    }

    /// Lists every peer regardless of active state. Used by the status
    /// reader and telemetry pipeline, which need to report on disabled
    /// peers too.
    #[instrument(skip(self))]
    pub async fn list_all_peers(&self) -> Result<Vec<Peer>> {
        let rows: Vec<PeerRow> = sqlx::query_as(
            "SELECT id, name, public_key, preshared_key, assigned_ip,
                    endpoint_host, endpoint_port, persistent_keepalive, is_active
             FROM peers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PeerRow::into_peer).collect()
    }

    /// Loads a single peer with its children, eager, ordered by priority.
    #[instrument(skip(self))]
    pub async fn get_peer(&self, id: PeerId) -> Result<Option<PeerDetail>> {
        let Some(row): Option<PeerRow> = sqlx::query_as(
            "SELECT id, name, public_key, preshared_key, assigned_ip,
                    endpoint_host, endpoint_port, persistent_keepalive, is_active
             FROM peers WHERE id = ?",
        )
        .bind(id.raw())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        let peer = row.into_peer()?;

        let allowed_ip_rows: Vec<AllowedIpRow> = sqlx::query_as(
            "SELECT id, peer_id, ip_network, description FROM allowed_ips
             WHERE peer_id = ? ORDER BY id",
        )
        .bind(id.raw())
        .fetch_all(&self.pool)
        .await?;
        let allowed_ips = allowed_ip_rows
            .into_iter()
            .map(AllowedIpRow::into_allowed_ip)
            .collect::<Result<Vec<_>>>()?;

        let rule_rows: Vec<FirewallRuleRow> = sqlx::query_as(
            "SELECT id, peer_id, name, rule_type, action, source, destination,
                    protocol, port_range, priority, is_active
             FROM firewall_rules WHERE peer_id = ? ORDER BY priority ASC, id ASC",
        )
        .bind(id.raw())
        .fetch_all(&self.pool)
        .await?;
        let firewall_rules = rule_rows
            .into_iter()
            .map(FirewallRuleRow::into_firewall_rule)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(PeerDetail {
            peer,
            allowed_ips,
            firewall_rules,
        }))
    }

    /// Every host address currently assigned to a peer (active or not), for
    /// the IPAM allocator to exclude.
    #[instrument(skip(self))]
    pub async fn assigned_addresses(&self) -> Result<HashSet<IpAddr>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT assigned_ip FROM peers")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(ip,)| {
                ip.parse().map_err(|e| StoreError::CorruptRow {
                    table: "peers",
                    reason: format!("{e}"),
                })
            })
            .collect()
    }

    /// Inserts a new peer and its children in a single transaction. The
    /// returned detail carries store-assigned ids.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the peer's name, public key, or
    /// assigned IP is already taken.
    #[instrument(skip(self, peer, allowed_ips, firewall_rules))]
    pub async fn create_peer(
        &self,
        peer: &Peer,
        allowed_ips: &[AllowedIp],
        firewall_rules: &[FirewallRule],
    ) -> Result<PeerDetail> {
        let mut tx = self.pool.begin().await?;

        let endpoint_host = peer.endpoint.as_ref().map(|e| e.host().to_string());
        let endpoint_port = peer.endpoint.as_ref().map(|e| i64::from(e.port()));

        let insert = sqlx::query(
            "INSERT INTO peers
                (name, public_key, preshared_key, assigned_ip,
                 endpoint_host, endpoint_port, persistent_keepalive, is_active)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(peer.name.to_string())
        .bind(peer.public_key.to_base64())
        .bind(peer.preshared_key.as_ref().map(|k| k.to_base64()))
        .bind(peer.assigned_ip.to_string())
        .bind(endpoint_host)
        .bind(endpoint_port)
        .bind(peer.persistent_keepalive.map(i64::from))
        .bind(peer.is_active)
        .execute(&mut *tx)
        .await
        .map_err(map_conflict)?;

        let peer_id = PeerId::new(insert.last_insert_rowid());

        for ip in allowed_ips {
            sqlx::query(
                "INSERT INTO allowed_ips (peer_id, ip_network, description) VALUES (?, ?, ?)",
            )
            .bind(peer_id.raw())
            .bind(ip.ip_network.to_string())
            .bind(&ip.description)
            .execute(&mut *tx)
            .await?;
        }

        for rule in firewall_rules {
            insert_rule(&mut tx, peer_id, rule).await?;
        }

        tx.commit().await?;

        debug!(peer_id = peer_id.raw(), "peer created");

        self.get_peer(peer_id)
            .await?
            .ok_or(StoreError::PeerNotFound { id: peer_id })
    }

    /// Replaces a peer's allowed IPs and firewall rules wholesale: editing a
    /// peer's policy is a set operation, never a merge. Deletes the
    /// existing children and inserts the replacement set in one
    /// transaction.
    #[instrument(skip(self, allowed_ips, firewall_rules))]
    pub async fn replace_peer_children(
        &self,
        peer_id: PeerId,
        allowed_ips: &[AllowedIp],
        firewall_rules: &[FirewallRule],
    ) -> Result<PeerDetail> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM allowed_ips WHERE peer_id = ?")
            .bind(peer_id.raw())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM firewall_rules WHERE peer_id = ?")
            .bind(peer_id.raw())
            .execute(&mut *tx)
            .await?;

        for ip in allowed_ips {
            sqlx::query(
                "INSERT INTO allowed_ips (peer_id, ip_network, description) VALUES (?, ?, ?)",
            )
            .bind(peer_id.raw())
            .bind(ip.ip_network.to_string())
            .bind(&ip.description)
            .execute(&mut *tx)
            .await?;
        }

        for rule in firewall_rules {
            insert_rule(&mut tx, peer_id, rule).await?;
        }

        tx.commit().await?;

        self.get_peer(peer_id)
            .await?
            .ok_or(StoreError::PeerNotFound { id: peer_id })
    }

    /// Deletes a peer and, via `ON DELETE CASCADE`, its allowed IPs and
    /// firewall rules.
    #[instrument(skip(self))]
    pub async fn delete_peer(&self, peer_id: PeerId) -> Result<()> {
        let result = sqlx::query("DELETE FROM peers WHERE id = ?")
            .bind(peer_id.raw())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PeerNotFound { id: peer_id });
        }
        Ok(())
    }

    /// Flips a peer's `is_active` flag. The caller is responsible for
    /// triggering a config render and firewall reconcile afterward.
    #[instrument(skip(self))]
    pub async fn set_active(&self, peer_id: PeerId, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE peers SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(peer_id.raw())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PeerNotFound { id: peer_id });
        }
        Ok(())
    }

    /// Appends a row to the reconcile audit trail. Best-effort: callers log
    /// a warning and proceed if this fails, since the audit trail never
    /// gates the protocol it observes.
    #[instrument(skip(self, detail))]
    pub async fn append_reconcile_audit(
        &self,
        outcome: ReconcileOutcome,
        detail: impl Into<String>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO reconcile_audit (outcome, detail) VALUES (?, ?)")
            .bind(outcome.as_str())
            .bind(detail.into())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns the `limit` most recent reconcile audit entries, newest
    /// first.
    #[instrument(skip(self))]
    pub async fn recent_reconcile_audit(
        &self,
        limit: u32,
    ) -> Result<Vec<crate::audit::ReconcileAuditEntry>> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, occurred_at, outcome, detail FROM reconcile_audit
             ORDER BY occurred_at DESC, id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, occurred_at, outcome, detail)| {
                crate::audit::ReconcileAuditEntry::from_row(id, &occurred_at, &outcome, detail)
            })
            .collect()
    }
}

async fn insert_rule(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    peer_id: PeerId,
    rule: &FirewallRule,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO firewall_rules
            (peer_id, name, rule_type, action, source, destination,
             protocol, port_range, priority, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(peer_id.raw())
    .bind(&rule.name)
    .bind(rule_type_str(rule.rule_type))
    .bind(action_str(rule.action))
    .bind(rule.source.map(|s| s.to_string()))
    .bind(rule.destination.map(|d| d.to_string()))
    .bind(rule.protocol.to_string())
    .bind(rule.port_range.as_str())
    .bind(i64::from(rule.priority))
    .bind(rule.is_active)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn map_conflict(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Conflict {
            reason: db_err.message().to_string(),
        },
        _ => StoreError::Database(e),
    }
}
