//! Applies compiled policy to the host's packet filter, atomically and
//! with backup/rollback.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use ipnet::IpNet;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use wgctl_types::{FirewallRule, PeerId};
use wgctl_validation::command::{AllowedProgram, SafeCommand};

use crate::compiler::{base_program, compile_peer, CompiledRule};
use crate::error::{FirewallError, Result};

/// The sub-chain this system's rules are grouped under.
pub const SUB_CHAIN: &str = "WIREGUARD_FORWARD";

/// One peer's identity and active policy, as needed to compile its program.
/// Deliberately store-agnostic: the caller assembles this from whatever
/// holds peer state.
#[derive(Debug, Clone)]
pub struct PeerPolicy {
    /// The peer's identifier.
    pub peer_id: PeerId,
    /// The peer's display name, echoed into `Default-Allow`/`Default-Drop`
    /// comments.
    pub name: String,
    /// The peer's assigned VPN address.
    pub assigned_ip: IpAddr,
    /// The peer's active firewall rules, already sorted by priority then
    /// id.
    pub active_rules: Vec<FirewallRule>,
}

/// What a reconcile call recomputes.
#[derive(Debug, Clone)]
pub enum ApplyScope {
    /// Recompute the entire owned rule set from every active peer.
    All(Vec<PeerPolicy>),
    /// Recompute only one peer's own rules, leaving every other peer's
    /// rules untouched.
    Peer(PeerPolicy),
}

/// The outcome of a (possibly dry-run) apply.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// How many rules were appended to the live chain. Zero for dry runs.
    pub applied: usize,
    /// Populated only for dry runs: the human-readable command preview.
    pub preview: Option<Vec<String>>,
}

/// Reconciles compiled policy against the kernel packet filter.
#[derive(Clone)]
pub struct Reconciler {
    vpn_interface: String,
    vpn_subnet: IpNet,
    backup_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Reconciler {
    /// Creates a reconciler targeting the given VPN interface and subnet,
    /// writing backups under `backup_dir`.
    #[must_use]
    pub fn new(vpn_interface: impl Into<String>, vpn_subnet: IpNet, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            vpn_interface: vpn_interface.into(),
            vpn_subnet,
            backup_dir: backup_dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read-only probe that the process can list and modify packet-filter
    /// state.
    pub async fn validate_access(&self) -> Result<()> {
        SafeCommand::new(AllowedProgram::Iptables)
            .args(["-S", "FORWARD"])
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| FirewallError::AccessDenied(e.to_string()))
    }

    /// Serializes the current ruleset to a timestamped file under the
    /// backup directory and returns its path.
    pub async fn backup(&self) -> Result<PathBuf> {
        let dump = self.save_ruleset().await?;

        let filename = format!("iptables_backup_{}.txt", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.backup_dir.join(filename);

        tokio::fs::write(&path, &dump)
            .await
            .map_err(|source| FirewallError::BackupIo {
                path: path.display().to_string(),
                source,
            })?;

        Ok(path)
    }

    /// Returns the current FORWARD chain, one rule per line, in
    /// `iptables -S` form.
    pub async fn current_rules(&self) -> Result<String> {
        let output = SafeCommand::new(AllowedProgram::Iptables)
            .args(["-S", "FORWARD"])
            .execute()
            .await?;
        Ok(output.stdout_lossy())
    }

    async fn save_ruleset(&self) -> Result<String> {
        let output = SafeCommand::new(AllowedProgram::IptablesSave).execute().await?;
        Ok(output.stdout_lossy())
    }

    /// Dumps just the `filter` table in `iptables-restore` input form: the
    /// table this reconciler ever touches.
    async fn filter_dump(&self) -> Result<String> {
        let output = SafeCommand::new(AllowedProgram::IptablesSave)
            .args(["-t", "filter"])
            .execute()
            .await?;
        Ok(output.stdout_lossy())
    }

    /// Restores a prior ruleset snapshot taken by [`Self::backup`].
    pub async fn restore(&self, backup_path: &Path) -> Result<()> {
        let contents = tokio::fs::read_to_string(backup_path)
            .await
            .map_err(|source| FirewallError::BackupIo {
                path: backup_path.display().to_string(),
                source,
            })?;

        SafeCommand::new(AllowedProgram::IptablesRestore)
            .stdin(contents)
            .execute()
            .await?;

        Ok(())
    }

    /// Compiles and applies `scope`. In dry-run mode, returns the preview
    /// program and performs no host mutation.
    ///
    /// The live mutation is a single `iptables-restore` call over the full
    /// `filter` table: the owned rules due for replacement are dropped from
    /// a fresh table dump, the new program is spliced in before `COMMIT`,
    /// and the result is committed in one kernel-visible operation. FORWARD
    /// is never observed holding a partial mix of the old and new rule
    /// sets. A failed commit restores the pre-apply backup and the table is
    /// left exactly as it was.
    #[instrument(skip(self, scope), fields(dry_run))]
    pub async fn apply(&self, scope: ApplyScope, dry_run: bool) -> Result<ApplyReport> {
        let program = self.compile(&scope);

        if dry_run {
            return Ok(ApplyReport {
                applied: 0,
                preview: Some(program.iter().map(CompiledRule::to_preview).collect()),
            });
        }

        let _guard = self.lock.lock().await;

        let backup_path = self.backup().await?;

        self.ensure_subchain().await?;

        let restrict_to_ip = match &scope {
            ApplyScope::Peer(peer) => Some(peer.assigned_ip),
            ApplyScope::All(_) => None,
        };

        let dump = self.filter_dump().await?;
        let staged = stage_filter_table(&dump, &self.vpn_interface, &self.vpn_subnet, restrict_to_ip, &program);

        if let Err(err) = SafeCommand::new(AllowedProgram::IptablesRestore).stdin(staged).execute().await {
            warn!(error = %err, "reconcile failed to commit, rolling back");
            if let Err(restore_err) = self.restore(&backup_path).await {
                warn!(error = %restore_err, "rollback restore also failed");
            }
            return Err(FirewallError::Aborted {
                rules: program.iter().map(CompiledRule::to_preview).collect(),
                reason: err.to_string(),
            });
        }

        info!(applied = program.len(), "reconcile committed");
        Ok(ApplyReport {
            applied: program.len(),
            preview: None,
        })
    }

    fn compile(&self, scope: &ApplyScope) -> Vec<CompiledRule> {
        match scope {
            ApplyScope::All(peers) => {
                let mut program = base_program(&self.vpn_interface);
                for peer in peers {
                    program.extend(compile_peer(
                        &peer.name,
                        peer.assigned_ip,
                        &self.vpn_interface,
                        &self.vpn_subnet,
                        &peer.active_rules,
                    ));
                }
                program
            }
            ApplyScope::Peer(peer) => compile_peer(
                &peer.name,
                peer.assigned_ip,
                &self.vpn_interface,
                &self.vpn_subnet,
                &peer.active_rules,
            ),
        }
    }

    async fn ensure_subchain(&self) -> Result<()> {
        // Ignore failure: the chain already existing is not an error.
        let _ = SafeCommand::new(AllowedProgram::Iptables)
            .args(["-N", SUB_CHAIN])
            .execute_unchecked()
            .await?;

        SafeCommand::new(AllowedProgram::Iptables)
            .args(["-F", SUB_CHAIN])
            .execute()
            .await?;

        Ok(())
    }
}

/// Stages a full `filter` table replacement: drops every owned `-A` line
/// due for replacement from `dump`, splices `program`'s rules in before
/// `COMMIT`, and returns the result as a complete `iptables-restore`
/// payload. `restrict_to_ip` narrows the rules dropped to one peer's own
/// lines (a [`ApplyScope::Peer`] apply); `None` drops every owned line (a
/// full [`ApplyScope::All`] apply).
fn stage_filter_table(
    dump: &str,
    vpn_interface: &str,
    vpn_subnet: &IpNet,
    restrict_to_ip: Option<IpAddr>,
    program: &[CompiledRule],
) -> String {
    let drop_line = |line: &str| {
        line.starts_with("-A ")
            && is_owned_rule(line, vpn_interface, vpn_subnet)
            && restrict_to_ip.is_none_or(|ip| line.contains(&ip.to_string()))
    };

    let kept: Vec<&str> = dump.lines().filter(|line| !drop_line(line)).collect();
    let new_lines: Vec<String> = program.iter().map(CompiledRule::to_restore_line).collect();

    let mut result = Vec::with_capacity(kept.len() + new_lines.len() + 1);
    let mut spliced = false;
    for line in kept {
        if line == "COMMIT" && !spliced {
            result.extend(new_lines.iter().cloned());
            spliced = true;
        }
        result.push(line.to_string());
    }
    if !spliced {
        result.extend(new_lines);
        result.push("COMMIT".to_string());
    }

    let mut text = result.join("\n");
    text.push('\n');
    text
}

fn is_owned_rule(line: &str, vpn_interface: &str, vpn_subnet: &IpNet) -> bool {
    if line.contains(&format!("-i {vpn_interface}")) || line.contains(&format!("-o {vpn_interface}")) {
        return true;
    }

    if line.contains("Rule:") || line.contains("Default-Allow:") || line.contains("Default-Drop:") {
        return true;
    }

    for token in line.split_whitespace() {
        if let Ok(net) = token.trim_end_matches('/').parse::<IpNet>() {
            if vpn_subnet.contains(&net) || net.contains(&vpn_subnet.network()) {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_interface_owned_rule() {
        assert!(is_owned_rule(
            "-A FORWARD -i wg0 -m conntrack --ctstate ESTABLISHED,RELATED -j ACCEPT",
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
        ));
    }

    #[test]
    fn recognizes_comment_tagged_rule() {
        assert!(is_owned_rule(
            r#"-A FORWARD -s 10.0.0.2/32 -j ACCEPT -m comment --comment "Default-Allow:alice""#,
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
        ));
    }

    #[test]
    fn ignores_unrelated_rule() {
        assert!(!is_owned_rule(
            "-A FORWARD -i eth0 -j ACCEPT",
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
        ));
    }

    fn sample_dump() -> &'static str {
        "*filter\n\
         :INPUT ACCEPT [0:0]\n\
         :FORWARD ACCEPT [0:0]\n\
         :OUTPUT ACCEPT [0:0]\n\
         -A FORWARD -i wg0 -m conntrack --ctstate ESTABLISHED,RELATED -j ACCEPT\n\
         -A FORWARD -s 10.0.0.2/32 -j ACCEPT -m comment --comment \"Default-Allow:alice\"\n\
         -A FORWARD -i eth0 -j ACCEPT\n\
         COMMIT\n"
    }

    #[test]
    fn stage_drops_owned_lines_and_splices_new_program_before_commit() {
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let program = base_program("wg0");

        let staged = stage_filter_table(sample_dump(), "wg0", &subnet, None, &program);

        assert!(!staged.contains("Default-Allow:alice"));
        assert!(staged.contains("-A FORWARD -i eth0 -j ACCEPT"));
        assert!(staged.contains("ESTABLISHED,RELATED"));
        assert!(staged.ends_with("COMMIT\n"));

        let commit_pos = staged.find("COMMIT").unwrap();
        let new_rule_pos = staged.find("-A INPUT -i lo -j ACCEPT").unwrap();
        assert!(new_rule_pos < commit_pos);
    }

    #[test]
    fn stage_restricted_to_one_peer_leaves_other_owned_lines_untouched() {
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let ip: IpAddr = "10.0.0.9".parse().unwrap();

        let staged = stage_filter_table(sample_dump(), "wg0", &subnet, Some(ip), &[]);

        assert!(staged.contains("Default-Allow:alice"));
        assert!(staged.contains("ESTABLISHED,RELATED"));
    }

    #[test]
    fn stage_inserts_commit_when_input_has_none() {
        let subnet: IpNet = "10.0.0.0/24".parse().unwrap();
        let program = base_program("wg0");

        let staged = stage_filter_table("*filter\n:FORWARD ACCEPT [0:0]\n", "wg0", &subnet, None, &program);

        assert!(staged.trim_end().ends_with("COMMIT"));
    }
}
