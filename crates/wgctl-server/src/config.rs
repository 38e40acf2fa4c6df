//! Process-environment configuration: the authoritative source of ambient
//! settings for the control-plane binary.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use ipnet::IpNet;

use wgctl_types::{PrivateKey, PublicKey};

use crate::error::{ServerError, ServerResult};

/// Everything read from the process environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket control channel binds to.
    pub bind_addr: SocketAddr,
    /// Session/cookie signing secret. Not consumed by the WebSocket path
    /// directly; kept so a future HTTP surface has it available.
    pub secret_key: String,
    /// SQLite connection string for the store.
    pub database_url: String,
    /// The server's own WireGuard private key.
    pub server_private_key: PrivateKey,
    /// The server's own WireGuard public key, handed to clients.
    pub server_public_key: PublicKey,
    /// The VPN gateway address, `[Interface] Address` in `wg0.conf`.
    pub vpn_server_ip: IpAddr,
    /// The server's publicly reachable address, used only in client config.
    pub server_public_ip: IpAddr,
    /// The UDP port WireGuard listens on.
    pub listen_port: u16,
    /// The VPN subnet peers are allocated addresses from.
    pub vpn_subnet: IpNet,
    /// The VPN interface name (`wg0` by default).
    pub vpn_interface: String,
    /// Telemetry tick interval.
    pub ws_refresh_interval: Duration,
    /// A handshake older than this is considered stale.
    pub wg_handshake_timeout: Duration,
    /// Whether to consult ICMP reachability to override a stale handshake.
    pub wg_enable_ping_check: bool,
    /// Whether to consult `conntrack` to override a stale handshake.
    pub wg_enable_conntrack: bool,
    /// Bound on the ping probe itself.
    pub wg_ping_timeout: Duration,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl ServerConfig {
    /// Reads configuration from the process environment, applying the
    /// spec's documented defaults for every optional variable.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if a required variable is missing
    /// or any variable fails to parse.
    pub fn from_env() -> ServerResult<Self> {
        let bind_addr = env_or("BIND_ADDR", "0.0.0.0:8080")
            .parse()
            .map_err(|e| ServerError::Config(format!("BIND_ADDR: {e}")))?;

        let secret_key = env_or("SECRET_KEY", "dev-secret-key-change-in-production");
        let database_url = env_or("DATABASE_URL", "sqlite:///instance/wireguard.db");

        let server_private_key = std::env::var("SERVER_PRIVATE_KEY")
            .map_err(|_| ServerError::Config("SERVER_PRIVATE_KEY is required".to_string()))?;
        let server_private_key = PrivateKey::from_base64(&server_private_key)
            .map_err(|e| ServerError::Config(format!("SERVER_PRIVATE_KEY: {e}")))?;

        let server_public_key = std::env::var("SERVER_PUBLIC_KEY")
            .map_err(|_| ServerError::Config("SERVER_PUBLIC_KEY is required".to_string()))?;
        let server_public_key = PublicKey::from_base64(&server_public_key)
            .map_err(|e| ServerError::Config(format!("SERVER_PUBLIC_KEY: {e}")))?;

        let vpn_server_ip = env_or("VPN_SERVER_IP", "10.0.0.1")
            .parse()
            .map_err(|e| ServerError::Config(format!("VPN_SERVER_IP: {e}")))?;

        let server_public_ip = env_or("SERVER_PUBLIC_IP", "127.0.0.1")
            .parse()
            .map_err(|e| ServerError::Config(format!("SERVER_PUBLIC_IP: {e}")))?;

        let listen_port = std::env::var("LISTEN_PORT")
            .map_err(|_| ServerError::Config("LISTEN_PORT is required".to_string()))?
            .parse()
            .map_err(|e| ServerError::Config(format!("LISTEN_PORT: {e}")))?;

        let vpn_subnet = env_or("VPN_SUBNET", "10.0.0.0/24")
            .parse()
            .map_err(|e| ServerError::Config(format!("VPN_SUBNET: {e}")))?;

        let vpn_interface = env_or("VPN_INTERFACE", "wg0");

        let ws_refresh_interval = Duration::from_millis(
            env_or("WS_REFRESH_INTERVAL_MS", "2000")
                .parse()
                .map_err(|e| ServerError::Config(format!("WS_REFRESH_INTERVAL_MS: {e}")))?,
        );

        let wg_handshake_timeout = Duration::from_secs(
            env_or("WG_HANDSHAKE_TIMEOUT", "180")
                .parse()
                .map_err(|e| ServerError::Config(format!("WG_HANDSHAKE_TIMEOUT: {e}")))?,
        );

        let wg_ping_timeout = Duration::from_millis(
            env_or("WG_PING_TIMEOUT", "500")
                .parse()
                .map_err(|e| ServerError::Config(format!("WG_PING_TIMEOUT: {e}")))?,
        );

        Ok(Self {
            bind_addr,
            secret_key,
            database_url,
            server_private_key,
            server_public_key,
            vpn_server_ip,
            server_public_ip,
            listen_port,
            vpn_subnet,
            vpn_interface,
            ws_refresh_interval,
            wg_handshake_timeout,
            wg_enable_ping_check: env_flag("WG_ENABLE_PING_CHECK"),
            wg_enable_conntrack: env_flag("WG_ENABLE_CONNTRACK"),
            wg_ping_timeout,
        })
    }
}
