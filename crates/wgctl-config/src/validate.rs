//! Overlap validation for operator-supplied AllowedIPs.

use std::str::FromStr;

use ipnet::IpNet;

use wgctl_types::PeerId;

use crate::error::AllowedIpViolation;

/// The AllowedIP-bearing state of a peer other than the one being edited,
/// used as the overlap reference set.
#[derive(Debug, Clone)]
pub struct PeerNetworks {
    /// The peer these networks belong to.
    pub peer_id: PeerId,
    /// The peer's tunnel address, checked as a `/32`.
    pub assigned_ip: std::net::IpAddr,
    /// The peer's existing AllowedIP networks.
    pub allowed_ips: Vec<IpNet>,
}

/// Validates a candidate set of AllowedIP literals for one peer against the
/// VPN subnet and every other peer's claimed networks, plus each other.
///
/// Returns every violation found, not just the first, per the batch-report
/// requirement for operator-facing validation.
#[must_use]
pub fn validate_multiple_allowed_ips(
    candidates: &[String],
    vpn_subnet: &IpNet,
    editing_peer_id: Option<PeerId>,
    other_peers: &[PeerNetworks],
) -> Vec<AllowedIpViolation> {
    let mut violations = Vec::new();
    let mut parsed: Vec<(String, IpNet)> = Vec::new();

    for candidate in candidates {
        match IpNet::from_str(candidate) {
            Ok(net) => parsed.push((candidate.clone(), net)),
            Err(_) => violations.push(AllowedIpViolation::NotACidr {
                candidate: candidate.clone(),
            }),
        }
    }

    for (text, net) in &parsed {
        if nets_overlap(net, vpn_subnet) {
            violations.push(AllowedIpViolation::OverlapsSubnet {
                cidr: text.clone(),
                subnet: vpn_subnet.to_string(),
            });
        }

        for other in other_peers {
            if editing_peer_id == Some(other.peer_id) {
                continue;
            }
            let other_host = host_net(other.assigned_ip);
            if nets_overlap(net, &other_host) {
                violations.push(AllowedIpViolation::OverlapsPeer {
                    cidr: text.clone(),
                    other: other.peer_id,
                    other_cidr: other_host.to_string(),
                });
            }
            for other_net in &other.allowed_ips {
                if nets_overlap(net, other_net) {
                    violations.push(AllowedIpViolation::OverlapsPeer {
                        cidr: text.clone(),
                        other: other.peer_id,
                        other_cidr: other_net.to_string(),
                    });
                }
            }
        }
    }

    for i in 0..parsed.len() {
        for j in (i + 1)..parsed.len() {
            if nets_overlap(&parsed[i].1, &parsed[j].1) {
                violations.push(AllowedIpViolation::OverlapsSibling {
                    first: parsed[i].0.clone(),
                    second: parsed[j].0.clone(),
                });
            }
        }
    }

    violations
}

fn nets_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

fn host_net(ip: std::net::IpAddr) -> IpNet {
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix).expect("host prefix is always valid for its address family")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> IpNet {
        IpNet::from_str(s).unwrap()
    }

    #[test]
    fn rejects_unparsable_candidate() {
        let violations =
            validate_multiple_allowed_ips(&["not-a-cidr".into()], &net("10.0.0.0/24"), None, &[]);
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], AllowedIpViolation::NotACidr { .. }));
    }

    #[test]
    fn rejects_overlap_with_vpn_subnet() {
        let violations = validate_multiple_allowed_ips(
            &["10.0.0.0/25".into()],
            &net("10.0.0.0/24"),
            None,
            &[],
        );
        assert!(matches!(
            violations[0],
            AllowedIpViolation::OverlapsSubnet { .. }
        ));
    }

    #[test]
    fn rejects_overlap_with_other_peer_assigned_ip() {
        let other = PeerNetworks {
            peer_id: PeerId::new(2),
            assigned_ip: "192.168.1.5".parse().unwrap(),
            allowed_ips: vec![],
        };
        let violations = validate_multiple_allowed_ips(
            &["192.168.1.0/24".into()],
            &net("10.0.0.0/24"),
            None,
            std::slice::from_ref(&other),
        );
        assert!(matches!(
            violations[0],
            AllowedIpViolation::OverlapsPeer { .. }
        ));
    }

    #[test]
    fn excludes_the_peer_being_edited() {
        let own = PeerNetworks {
            peer_id: PeerId::new(1),
            assigned_ip: "192.168.1.5".parse().unwrap(),
            allowed_ips: vec![net("192.168.2.0/24")],
        };
        let violations = validate_multiple_allowed_ips(
            &["192.168.2.0/25".into()],
            &net("10.0.0.0/24"),
            Some(PeerId::new(1)),
            std::slice::from_ref(&own),
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn reports_sibling_overlap() {
        let violations = validate_multiple_allowed_ips(
            &["192.168.2.0/24".into(), "192.168.2.128/25".into()],
            &net("10.0.0.0/24"),
            None,
            &[],
        );
        assert!(violations
            .iter()
            .any(|v| matches!(v, AllowedIpViolation::OverlapsSibling { .. })));
    }

    #[test]
    fn reports_every_violation_not_just_first() {
        let other = PeerNetworks {
            peer_id: PeerId::new(2),
            assigned_ip: "192.168.1.5".parse().unwrap(),
            allowed_ips: vec![],
        };
        let violations = validate_multiple_allowed_ips(
            &["bad-cidr".into(), "192.168.1.0/24".into()],
            &net("10.0.0.0/24"),
            None,
            std::slice::from_ref(&other),
        );
        assert_eq!(violations.len(), 2);
    }
}
