//! Control-plane binary: wires the store, config renderer, firewall
//! reconciler, status reader, and telemetry pipeline into a single
//! WebSocket-served process.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wgctl_server::config::ServerConfig;
use wgctl_server::error::ServerError;
use wgctl_server::server::GatewayServer;
use wgctl_status::reader::StatusReaderConfig;
use wgctl_store::Store;
use wgctl_telemetry::{PipelineConfig, TelemetryPipeline};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!(error = %err, "control-plane exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;

    info!(addr = %config.bind_addr, "starting wgctl control plane");

    let store = Store::connect(&config.database_url).await?;

    let status_config = StatusReaderConfig {
        interface: config.vpn_interface.clone(),
        handshake_timeout: config.wg_handshake_timeout,
        enable_conntrack: config.wg_enable_conntrack,
        enable_ping_check: config.wg_enable_ping_check,
        ping_timeout: config.wg_ping_timeout,
        listen_port: config.listen_port,
        ..StatusReaderConfig::default()
    };

    let system_config_path = PathBuf::from("/etc/wireguard/wg0.conf");
    let config_system_path = system_config_path.parent().filter(|dir| dir.is_dir()).map(|_| system_config_path.clone());

    let pipeline_config = PipelineConfig {
        tick_interval: config.ws_refresh_interval,
        vpn_server_ip: config.vpn_server_ip,
        server_private_key: config.server_private_key.clone(),
        listen_port: config.listen_port,
        vpn_subnet: config.vpn_subnet,
        vpn_interface: config.vpn_interface.clone(),
        config_working_path: PathBuf::from("wg0.conf"),
        config_system_path,
        firewall_backup_dir: PathBuf::from("."),
    };

    let pipeline = Arc::new(TelemetryPipeline::new(store, status_config, pipeline_config));

    let tick_pipeline = pipeline.clone();
    tokio::spawn(async move {
        tick_pipeline.run().await;
    });

    let server = GatewayServer::new(pipeline);
    server.serve(config.bind_addr).await?;

    Ok(())
}
