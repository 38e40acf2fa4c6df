//! Ties the store, status reader, and firewall reconciler into a single
//! ticking pipeline: periodic snapshots, change-gated emission, and a
//! peer-action command path that re-renders and re-reconciles on demand.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use wgctl_config::render::{render_server_config, RenderedPeer, ServerInterface};
use wgctl_config::writer::ConfigWriter;
use wgctl_firewall::reconciler::{ApplyScope, PeerPolicy, Reconciler};
use wgctl_firewall::FirewallError;
use wgctl_status::reader::{StatusReader, StatusReaderConfig};
use wgctl_store::{ReconcileOutcome, Store};
use wgctl_types::{PeerId, PrivateKey};

use crate::error::{Result, TelemetryError};
use crate::ring::TrafficRing;
use crate::snapshot::{ChangeDetector, PeerSnapshot};

/// Requested peer activation state, as demuxed from a client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAction {
    /// Include the peer in the rendered interface and its own chain.
    Activate,
    /// Exclude the peer from the rendered interface and its own chain.
    Deactivate,
}

/// The tick interval and server-identity fields the pipeline needs beyond
/// what [`Store`] and [`StatusReader`] already carry.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How often to poll status and evaluate change detection.
    pub tick_interval: Duration,
    /// The VPN gateway address, for rendering.
    pub vpn_server_ip: IpAddr,
    /// The server's private key, for rendering.
    pub server_private_key: PrivateKey,
    /// The UDP port WireGuard listens on.
    pub listen_port: u16,
    /// The VPN subnet, for firewall reconciliation.
    pub vpn_subnet: IpNet,
    /// The VPN interface name, for firewall reconciliation.
    pub vpn_interface: String,
    /// Where the rendered `wg0.conf` working copy is written.
    pub config_working_path: PathBuf,
    /// The privileged system path mirrored on a best-effort basis.
    pub config_system_path: Option<PathBuf>,
    /// Where firewall backups are written.
    pub firewall_backup_dir: PathBuf,
}

struct Subscriber {
    sender: mpsc::Sender<Vec<PeerSnapshot>>,
}

/// Owns the traffic history, change baseline, and subscriber set for the
/// live telemetry feed, and exposes the tick and command-demux entry
/// points a transport layer drives.
pub struct TelemetryPipeline {
    store: Store,
    status_reader: StatusReader,
    reconciler: Reconciler,
    config_writer: ConfigWriter,
    config: PipelineConfig,
    rings: Mutex<HashMap<PeerId, TrafficRing>>,
    detector: Mutex<ChangeDetector>,
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

impl TelemetryPipeline {
    /// Builds a pipeline over an already-open store, using `status_config`
    /// for the `wg show` reader and `config` for rendering and
    /// reconciliation targets.
    #[must_use]
    pub fn new(store: Store, status_config: StatusReaderConfig, config: PipelineConfig) -> Self {
        let reconciler = Reconciler::new(
            config.vpn_interface.clone(),
            config.vpn_subnet,
            config.firewall_backup_dir.clone(),
        );
        let config_writer = ConfigWriter::new(config.config_working_path.clone(), config.config_system_path.clone());

        Self {
            store,
            status_reader: StatusReader::new(status_config),
            reconciler,
            config_writer,
            config,
            rings: Mutex::new(HashMap::new()),
            detector: Mutex::new(ChangeDetector::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new subscriber and returns its id and receiving half.
    /// A join always forces the next tick to emit, even if nothing else
    /// changed, so the new subscriber (and everyone else) gets an
    /// up-to-date picture immediately.
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<Vec<PeerSnapshot>>) {
        let (tx, rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        self.subscribers.lock().await.insert(id, Subscriber { sender: tx });
        self.detector.lock().await.reset();
        (id, rx)
    }

    /// Removes a subscriber. A no-op if it already disconnected.
    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().await.remove(&id);
    }

    /// Whether any subscriber is currently registered. The tick loop is
    /// only worth running while this is true.
    pub async fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().await.is_empty()
    }

    /// Runs the tick loop until `has_subscribers` would otherwise mean
    /// idling forever is fine: callers drive this from a task that is
    /// itself only spawned while at least one subscriber exists.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            interval.tick().await;
            if !self.has_subscribers().await {
                continue;
            }
            if let Err(err) = self.tick().await {
                warn!(error = %err, "telemetry tick failed");
            }
        }
    }

    /// Polls live status, updates traffic rings, and, if the result
    /// differs enough from the last emission (or a subscriber just
    /// joined), pushes a snapshot to every subscriber.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        let snapshots = self.build_snapshots().await?;

        let mut detector = self.detector.lock().await;
        if detector.should_emit(&snapshots) {
            detector.record(&snapshots);
            drop(detector);
            self.broadcast(snapshots).await;
        }

        Ok(())
    }

    /// Forces an emission regardless of change detection, used after a
    /// peer-action command mutates state.
    pub async fn force_emit(&self) -> Result<()> {
        let snapshots = self.build_snapshots().await?;
        self.detector.lock().await.record(&snapshots);
        self.broadcast(snapshots).await;
        Ok(())
    }

    async fn build_snapshots(&self) -> Result<Vec<PeerSnapshot>> {
        let peers = self.store.list_all_peers().await?;
        let live = self.status_reader.read().await;
        let now = chrono::Utc::now();

        let mut rings = self.rings.lock().await;
        let mut snapshots = Vec::with_capacity(peers.len());

        for peer in &peers {
            let Some(peer_id) = peer.id else { continue };
            let status = live.get(&peer.public_key.to_base64());
            let (rx_total, tx_total) = status.map_or((0, 0), |s| (s.transfer_rx, s.transfer_tx));

            let ring = rings.entry(peer_id).or_default();
            let current = ring.push(now, rx_total, tx_total);
            let history = ring.samples().clone();

            snapshots.push(PeerSnapshot::build(peer, status, current, history));
        }

        Ok(snapshots)
    }

    async fn broadcast(&self, snapshots: Vec<PeerSnapshot>) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|_, sub| sub.sender.try_send(snapshots.clone()).is_ok());
    }

    /// Applies a peer activation/deactivation command: flips the peer's
    /// active flag in the store, re-renders and rewrites the interface
    /// config, re-reconciles the packet filter against every active peer,
    /// and force-emits a fresh snapshot.
    #[instrument(skip(self))]
    pub async fn handle_peer_action(&self, peer_id: PeerId, action: PeerAction) -> Result<()> {
        let is_active = action == PeerAction::Activate;

        if self.store.get_peer(peer_id).await?.is_none() {
            return Err(TelemetryError::PeerNotFound(peer_id));
        }

        self.store.set_active(peer_id, is_active).await?;
        info!(%peer_id, is_active, "peer activation changed");

        self.render_and_write().await?;
        self.reconcile_all().await?;
        self.force_emit().await?;

        Ok(())
    }

    async fn render_and_write(&self) -> Result<()> {
        let active = self.store.list_active_peers().await?;

        let mut rendered = Vec::with_capacity(active.len());
        for peer in &active {
            let Some(id) = peer.id else { continue };
            let detail = self.store.get_peer(id).await?;
            let allowed_ips = detail.map(|d| d.allowed_ips.into_iter().map(|a| a.ip_network).collect()).unwrap_or_default();
            rendered.push(RenderedPeer {
                id,
                name: peer.name.as_str().to_string(),
                public_key: peer.public_key.clone(),
                preshared_key: peer.preshared_key.clone(),
                assigned_ip: peer.assigned_ip,
                allowed_ips,
                endpoint: peer.endpoint.clone(),
                persistent_keepalive: peer.persistent_keepalive,
            });
        }

        let interface = ServerInterface {
            vpn_server_ip: self.config.vpn_server_ip,
            server_private_key: self.config.server_private_key.clone(),
            listen_port: self.config.listen_port,
        };

        let contents = render_server_config(&interface, &rendered);
        self.config_writer.write(&contents).await?;

        Ok(())
    }

    async fn reconcile_all(&self) -> Result<()> {
        let active = self.store.list_active_peers().await?;

        let mut policies = Vec::with_capacity(active.len());
        for peer in &active {
            let Some(peer_id) = peer.id else { continue };
            let detail = self.store.get_peer(peer_id).await?;
            let active_rules = detail.map(|d| d.firewall_rules).unwrap_or_default();
            policies.push(PeerPolicy {
                peer_id,
                name: peer.name.as_str().to_string(),
                assigned_ip: peer.assigned_ip,
                active_rules,
            });
        }

        match self.reconciler.apply(ApplyScope::All(policies), false).await {
            Ok(report) => {
                self.record_audit(ReconcileOutcome::Applied, format!("{} rule(s) applied", report.applied))
                    .await;
                Ok(())
            }
            Err(err) => {
                let outcome = match &err {
                    FirewallError::Aborted { .. } => ReconcileOutcome::RolledBack,
                    _ => ReconcileOutcome::Aborted,
                };
                self.record_audit(outcome, err.to_string()).await;
                Err(err.into())
            }
        }
    }

    async fn record_audit(&self, outcome: ReconcileOutcome, detail: String) {
        if let Err(err) = self.store.append_reconcile_audit(outcome, detail).await {
            warn!(error = %err, "failed to record reconcile audit");
        }
    }
}

/// Wraps a [`TelemetryPipeline`] behind an [`Arc`] so it can be shared
/// between the tick task and whatever transport layer drives subscriptions
/// and commands.
pub type SharedPipeline = Arc<TelemetryPipeline>;
