//! Rendering `wg0.conf` and ad-hoc client configuration text.

use std::fmt::Write as _;
use std::net::IpAddr;

use ipnet::IpNet;

use wgctl_types::{Endpoint, PeerId, PresharedKey, PrivateKey, PublicKey};

/// One active peer's contribution to the rendered interface file.
#[derive(Debug, Clone)]
pub struct RenderedPeer {
    /// The peer's row id, echoed into the `# Peer: <id>, <name>` comment.
    pub id: PeerId,
    /// The peer's name, echoed into the same comment.
    pub name: String,
    /// The peer's public key.
    pub public_key: PublicKey,
    /// The peer's preshared key, if any.
    pub preshared_key: Option<PresharedKey>,
    /// The peer's tunnel address.
    pub assigned_ip: IpAddr,
    /// The peer's operator-supplied AllowedIP networks, in insertion order.
    /// The renderer prepends `assigned_ip/32` ahead of these.
    pub allowed_ips: Vec<IpNet>,
    /// The peer's known endpoint, if any.
    pub endpoint: Option<Endpoint>,
    /// Explicit keepalive; `None` renders as the 25-second default.
    pub persistent_keepalive: Option<u16>,
}

/// Everything the server interface file needs beyond the peer list.
#[derive(Debug, Clone)]
pub struct ServerInterface {
    /// The gateway address, `VPN_SERVER_IP`.
    pub vpn_server_ip: IpAddr,
    /// The server's own private key.
    pub server_private_key: PrivateKey,
    /// The UDP port WireGuard listens on.
    pub listen_port: u16,
}

fn host_prefix(ip: IpAddr) -> u8 {
    if ip.is_ipv4() {
        32
    } else {
        128
    }
}

fn allowed_ips_field(assigned_ip: IpAddr, allowed_ips: &[IpNet]) -> String {
    let host = IpNet::new(assigned_ip, host_prefix(assigned_ip))
        .expect("host prefix is always valid for its address family");
    let mut parts = vec![host.to_string()];
    parts.extend(allowed_ips.iter().map(ToString::to_string));
    parts.join(",")
}

/// Renders the complete `wg0.conf` text: one `[Interface]` block followed by
/// a `[Peer]` block for every entry in `peers`, which the caller must have
/// already filtered to `is_active = true`.
///
/// Byte-for-byte identical inputs always produce identical output.
#[must_use]
pub fn render_server_config(interface: &ServerInterface, peers: &[RenderedPeer]) -> String {
    let mut out = String::new();

    out.push_str("[Interface]\n");
    let _ = writeln!(out, "Address = {}", interface.vpn_server_ip);
    let _ = writeln!(out, "PrivateKey = {}", interface.server_private_key.to_base64());
    let _ = writeln!(out, "ListenPort = {}", interface.listen_port);

    for peer in peers {
        out.push('\n');
        let _ = writeln!(out, "# Peer: {}, {}", peer.id, peer.name);
        out.push_str("[Peer]\n");
        let _ = writeln!(out, "PublicKey = {}", peer.public_key.to_base64());
        if let Some(ref psk) = peer.preshared_key {
            let _ = writeln!(out, "PresharedKey = {}", psk.to_base64());
        }
        let _ = writeln!(
            out,
            "AllowedIPs = {}",
            allowed_ips_field(peer.assigned_ip, &peer.allowed_ips)
        );
        if let Some(ref endpoint) = peer.endpoint {
            let _ = writeln!(out, "Endpoint = {endpoint}");
        }
        let keepalive = peer.persistent_keepalive.unwrap_or(wgctl_types::DEFAULT_KEEPALIVE);
        let _ = writeln!(out, "PersistentKeepalive = {keepalive}");
    }

    out
}

/// Client-facing configuration text for one peer, returned by the config
/// endpoint but never written to disk server-side. The client's own
/// private key is never known to the server, so a placeholder is emitted
/// in its place.
#[must_use]
pub fn render_client_config(
    peer: &RenderedPeer,
    server_public_key: &PublicKey,
    server_public_ip: &str,
    listen_port: u16,
) -> String {
    let mut out = String::new();

    out.push_str("[Interface]\n");
    out.push_str("PrivateKey = <PLACEHOLDER_FOR_CLIENT_PRIVATE_KEY>\n");
    let _ = writeln!(
        out,
        "Address = {}",
        allowed_ips_field(peer.assigned_ip, &peer.allowed_ips)
    );
    out.push('\n');
    out.push_str("[Peer]\n");
    let _ = writeln!(out, "PublicKey = {}", server_public_key.to_base64());
    if let Some(ref psk) = peer.preshared_key {
        let _ = writeln!(out, "PresharedKey = {}", psk.to_base64());
    }
    let _ = writeln!(out, "Endpoint = {server_public_ip}:{listen_port}");
    out.push_str("AllowedIPs = 0.0.0.0/0\n");
    let keepalive = peer.persistent_keepalive.unwrap_or(wgctl_types::DEFAULT_KEEPALIVE);
    let _ = writeln!(out, "PersistentKeepalive = {keepalive}");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgctl_types::generate_keypair;

    fn sample_peer() -> RenderedPeer {
        let (_sk, pk) = generate_keypair();
        RenderedPeer {
            id: PeerId::new(1),
            name: "alice".into(),
            public_key: pk,
            preshared_key: None,
            assigned_ip: "10.0.0.2".parse().unwrap(),
            allowed_ips: vec![],
            endpoint: None,
            persistent_keepalive: None,
        }
    }

    #[test]
    fn server_config_has_gateway_address_and_port() {
        let (server_sk, _) = generate_keypair();
        let interface = ServerInterface {
            vpn_server_ip: "10.0.0.1".parse().unwrap(),
            server_private_key: server_sk,
            listen_port: 51820,
        };
        let rendered = render_server_config(&interface, &[sample_peer()]);
        assert!(rendered.contains("Address = 10.0.0.1"));
        assert!(rendered.contains("ListenPort = 51820"));
        assert!(rendered.contains("AllowedIPs = 10.0.0.2/32"));
        assert!(rendered.contains("# Peer: 1, alice"));
    }

    #[test]
    fn allowed_ips_emitted_exactly_once() {
        let (server_sk, _) = generate_keypair();
        let interface = ServerInterface {
            vpn_server_ip: "10.0.0.1".parse().unwrap(),
            server_private_key: server_sk,
            listen_port: 51820,
        };
        let mut peer = sample_peer();
        peer.allowed_ips = vec!["192.168.1.0/24".parse().unwrap()];
        let rendered = render_server_config(&interface, &[peer]);
        assert_eq!(rendered.matches("AllowedIPs").count(), 1);
        assert!(rendered.contains("AllowedIPs = 10.0.0.2/32,192.168.1.0/24"));
    }

    #[test]
    fn missing_keepalive_defaults_to_25() {
        let (server_sk, _) = generate_keypair();
        let interface = ServerInterface {
            vpn_server_ip: "10.0.0.1".parse().unwrap(),
            server_private_key: server_sk,
            listen_port: 51820,
        };
        let rendered = render_server_config(&interface, &[sample_peer()]);
        assert!(rendered.contains("PersistentKeepalive = 25"));
    }

    #[test]
    fn rendering_is_idempotent() {
        let (server_sk, _) = generate_keypair();
        let interface = ServerInterface {
            vpn_server_ip: "10.0.0.1".parse().unwrap(),
            server_private_key: server_sk,
            listen_port: 51820,
        };
        let peers = [sample_peer()];
        assert_eq!(
            render_server_config(&interface, &peers),
            render_server_config(&interface, &peers)
        );
    }

    #[test]
    fn client_config_uses_placeholder_private_key() {
        let (_, server_pk) = generate_keypair();
        let rendered =
            render_client_config(&sample_peer(), &server_pk, "203.0.113.5", 51820);
        assert!(rendered.contains("<PLACEHOLDER_FOR_CLIENT_PRIVATE_KEY>"));
        assert!(rendered.contains("Endpoint = 203.0.113.5:51820"));
        assert!(rendered.contains("AllowedIPs = 0.0.0.0/0"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rendering_is_deterministic_and_carries_keepalive(
                listen_port in any::<u16>(),
                keepalive in prop::option::of(1u16..=65535),
                last_octet in 2u8..=254,
            ) {
                let (server_sk, _) = generate_keypair();
                let interface = ServerInterface {
                    vpn_server_ip: "10.0.0.1".parse().unwrap(),
                    server_private_key: server_sk,
                    listen_port,
                };
                let mut peer = sample_peer();
                peer.assigned_ip = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, last_octet));
                peer.persistent_keepalive = keepalive;
                let peers = [peer];

                let first = render_server_config(&interface, &peers);
                let second = render_server_config(&interface, &peers);
                prop_assert_eq!(&first, &second);

                let expected_keepalive = keepalive.unwrap_or(wgctl_types::DEFAULT_KEEPALIVE);
                prop_assert!(first.contains(&format!("PersistentKeepalive = {expected_keepalive}")));
                prop_assert!(first.contains(&format!("AllowedIPs = 10.0.0.{last_octet}/32")));
                prop_assert!(first.contains(&format!("ListenPort = {listen_port}")));
            }

            #[test]
            fn allowed_ips_field_always_prepends_host_address(
                last_octet in 2u8..=254,
                extra_third_octet in 0u8..=255,
            ) {
                let assigned = IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, last_octet));
                let extra: IpNet = format!("192.168.{extra_third_octet}.0/24").parse().unwrap();
                let field = allowed_ips_field(assigned, &[extra]);
                prop_assert!(field.starts_with(&format!("10.0.0.{last_octet}/32,")));
            }
        }
    }
}
