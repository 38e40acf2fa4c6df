//! Translates a peer's active firewall rules into an ordered program of
//! low-level packet-filter rules.

use std::net::IpAddr;

use ipnet::IpNet;

use wgctl_types::{FirewallRule, Protocol, RuleAction, RuleType};

/// The packet-filter chain a compiled rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// The FORWARD chain, where almost everything lives.
    Forward,
    /// The INPUT chain, used only by the loopback base rule.
    Input,
    /// The OUTPUT chain, used only by the loopback base rule.
    Output,
}

impl Chain {
    fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
        }
    }
}

/// The terminal action of a compiled rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Permit the matching packet.
    Accept,
    /// Reject the matching packet.
    Drop,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Drop => "DROP",
        }
    }
}

/// An interface match, optionally negated (`! -o wg0` meaning "any
/// interface except wg0").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMatch {
    /// `true` for `-i` (ingress), `false` for `-o` (egress).
    pub ingress: bool,
    /// The interface name.
    pub name: String,
    /// Whether the match is negated.
    pub negated: bool,
}

/// A single low-level rule, ready to render as `iptables` arguments or a
/// human-readable preview line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    /// The chain this rule is appended to.
    pub chain: Chain,
    /// Optional interface constraint.
    pub interface: Option<InterfaceMatch>,
    /// Optional source network match.
    pub source: Option<IpNet>,
    /// Optional destination network match.
    pub destination: Option<IpNet>,
    /// Optional protocol match (`tcp`/`udp`/`icmp`); `None` matches any.
    pub protocol: Option<Protocol>,
    /// Optional destination port match, only meaningful with a tcp/udp
    /// protocol match.
    pub dport: Option<String>,
    /// Whether this rule matches the `ESTABLISHED,RELATED` conntrack
    /// states. Used only by the base program.
    pub conntrack_established_related: bool,
    /// The rule's terminal action.
    pub target: Target,
    /// The `-m comment --comment` annotation, if any. Base rules carry
    /// none.
    pub comment: Option<String>,
}

impl CompiledRule {
    /// Renders this rule as the argument vector `iptables` would accept
    /// after `-A`.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["-A".to_string(), self.chain.as_str().to_string()];

        if let Some(ref iface) = self.interface {
            let flag = if iface.ingress { "-i" } else { "-o" };
            if iface.negated {
                args.push("!".to_string());
            }
            args.push(flag.to_string());
            args.push(iface.name.clone());
        }

        if let Some(ref src) = self.source {
            args.push("-s".to_string());
            args.push(src.to_string());
        }

        if let Some(ref dst) = self.destination {
            args.push("-d".to_string());
            args.push(dst.to_string());
        }

        if self.conntrack_established_related {
            args.push("-m".to_string());
            args.push("conntrack".to_string());
            args.push("--ctstate".to_string());
            args.push("ESTABLISHED,RELATED".to_string());
        }

        if let Some(protocol) = self.protocol {
            args.push("-p".to_string());
            args.push(protocol.to_string());

            if let Some(ref dport) = self.dport {
                args.push("--dport".to_string());
                args.push(dport.clone());
            }
        }

        args.push("-j".to_string());
        args.push(self.target.as_str().to_string());

        if let Some(ref comment) = self.comment {
            args.push("-m".to_string());
            args.push("comment".to_string());
            args.push("--comment".to_string());
            args.push(comment.clone());
        }

        args
    }

    /// Renders this rule as a full `iptables ...` command line, for dry-run
    /// preview output.
    #[must_use]
    pub fn to_preview(&self) -> String {
        let mut parts = vec!["iptables".to_string()];
        parts.extend(self.to_args());
        parts.join(" ")
    }

    /// Renders this rule as one `iptables-restore` input line, quoting any
    /// argument (the comment, in practice) that contains whitespace.
    #[must_use]
    pub fn to_restore_line(&self) -> String {
        self.to_args().iter().map(|arg| quote_restore_arg(arg)).collect::<Vec<_>>().join(" ")
    }
}

fn quote_restore_arg(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

fn host_net(ip: IpAddr) -> IpNet {
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix).expect("host prefix is always valid for its address family")
}

/// Emitted once at the head of the FORWARD chain (plus loopback rules in
/// INPUT/OUTPUT), never omitted regardless of the peer set.
#[must_use]
pub fn base_program(vpn_interface: &str) -> Vec<CompiledRule> {
    vec![
        CompiledRule {
            chain: Chain::Forward,
            interface: Some(InterfaceMatch {
                ingress: true,
                name: vpn_interface.to_string(),
                negated: false,
            }),
            source: None,
            destination: None,
            protocol: None,
            dport: None,
            conntrack_established_related: true,
            target: Target::Accept,
            comment: None,
        },
        CompiledRule {
            chain: Chain::Forward,
            interface: Some(InterfaceMatch {
                ingress: false,
                name: vpn_interface.to_string(),
                negated: false,
            }),
            source: None,
            destination: None,
            protocol: None,
            dport: None,
            conntrack_established_related: true,
            target: Target::Accept,
            comment: None,
        },
        CompiledRule {
            chain: Chain::Input,
            interface: Some(InterfaceMatch {
                ingress: true,
                name: "lo".to_string(),
                negated: false,
            }),
            source: None,
            destination: None,
            protocol: None,
            dport: None,
            conntrack_established_related: false,
            target: Target::Accept,
            comment: None,
        },
        CompiledRule {
            chain: Chain::Output,
            interface: Some(InterfaceMatch {
                ingress: false,
                name: "lo".to_string(),
                negated: false,
            }),
            source: None,
            destination: None,
            protocol: None,
            dport: None,
            conntrack_established_related: false,
            target: Target::Accept,
            comment: None,
        },
    ]
}

/// Compiles one peer's active rules (already sorted by priority ascending,
/// then id as tie-break) into its contribution to the FORWARD chain.
#[must_use]
pub fn compile_peer(
    peer_name: &str,
    assigned_ip: IpAddr,
    vpn_interface: &str,
    vpn_subnet: &IpNet,
    active_rules: &[FirewallRule],
) -> Vec<CompiledRule> {
    let own_host = host_net(assigned_ip);

    if active_rules.is_empty() {
        let comment = format!("Default-Allow:{peer_name}");
        return vec![
            CompiledRule {
                chain: Chain::Forward,
                interface: None,
                source: Some(own_host),
                destination: None,
                protocol: None,
                dport: None,
                conntrack_established_related: false,
                target: Target::Accept,
                comment: Some(comment.clone()),
            },
            CompiledRule {
                chain: Chain::Forward,
                interface: None,
                source: None,
                destination: Some(own_host),
                protocol: None,
                dport: None,
                conntrack_established_related: false,
                target: Target::Accept,
                comment: Some(comment),
            },
        ];
    }

    let mut program: Vec<CompiledRule> = active_rules
        .iter()
        .map(|rule| compile_rule(rule, own_host, vpn_interface, vpn_subnet))
        .collect();

    let comment = format!("Default-Drop:{peer_name}");
    program.push(CompiledRule {
        chain: Chain::Forward,
        interface: None,
        source: Some(own_host),
        destination: None,
        protocol: None,
        dport: None,
        conntrack_established_related: false,
        target: Target::Drop,
        comment: Some(comment.clone()),
    });
    program.push(CompiledRule {
        chain: Chain::Forward,
        interface: None,
        source: None,
        destination: Some(own_host),
        protocol: None,
        dport: None,
        conntrack_established_related: false,
        target: Target::Drop,
        comment: Some(comment),
    });

    program
}

fn compile_rule(
    rule: &FirewallRule,
    own_host: IpNet,
    vpn_interface: &str,
    vpn_subnet: &IpNet,
) -> CompiledRule {
    let source = Some(rule.source.unwrap_or(own_host));

    let destination = rule.destination.or_else(|| match rule.rule_type {
        RuleType::Internet => Some("0.0.0.0/0".parse().expect("literal CIDR always parses")),
        RuleType::PeerComm => Some(*vpn_subnet),
        RuleType::Subnet | RuleType::Port | RuleType::Custom => None,
    });

    let protocol = match rule.protocol {
        Protocol::Any => None,
        other => Some(other),
    };

    let dport = match protocol {
        Some(Protocol::Tcp | Protocol::Udp) if !rule.port_range.is_any() => {
            Some(rule.port_range.as_str().to_string())
        }
        _ => None,
    };

    let interface = if rule.rule_type == RuleType::Internet {
        Some(InterfaceMatch {
            ingress: false,
            name: vpn_interface.to_string(),
            negated: true,
        })
    } else {
        Some(InterfaceMatch {
            ingress: true,
            name: vpn_interface.to_string(),
            negated: false,
        })
    };

    let target = match rule.action {
        RuleAction::Allow => Target::Accept,
        RuleAction::Deny => Target::Drop,
    };

    CompiledRule {
        chain: Chain::Forward,
        interface,
        source,
        destination,
        protocol,
        dport,
        conntrack_established_related: false,
        target,
        comment: Some(format!("Rule:{}", rule.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgctl_types::{PeerId, PortRange};

    fn rule(
        rule_type: RuleType,
        action: RuleAction,
        protocol: Protocol,
        port_range: &str,
    ) -> FirewallRule {
        FirewallRule {
            id: None,
            peer_id: PeerId::new(1),
            name: "web".to_string(),
            rule_type,
            action,
            source: None,
            destination: None,
            protocol,
            port_range: PortRange::new(port_range).unwrap(),
            priority: 10,
            is_active: true,
        }
    }

    #[test]
    fn base_program_has_no_comments() {
        for r in base_program("wg0") {
            assert!(r.comment.is_none());
        }
    }

    #[test]
    fn no_rules_yields_default_allow_pair() {
        let program = compile_peer(
            "alice",
            "10.0.0.2".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &[],
        );
        assert_eq!(program.len(), 2);
        assert!(program.iter().all(|r| r.target == Target::Accept));
        assert!(program
            .iter()
            .all(|r| r.comment.as_deref() == Some("Default-Allow:alice")));
    }

    #[test]
    fn rules_present_append_default_drop_pair() {
        let rules = vec![rule(RuleType::Internet, RuleAction::Allow, Protocol::Tcp, "443")];
        let program = compile_peer(
            "bob",
            "10.0.0.3".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        assert_eq!(program.len(), 3);
        let last_two = &program[1..];
        assert!(last_two.iter().all(|r| r.target == Target::Drop));
        assert!(last_two
            .iter()
            .all(|r| r.comment.as_deref() == Some("Default-Drop:bob")));
    }

    #[test]
    fn internet_rule_negates_out_interface() {
        let rules = vec![rule(RuleType::Internet, RuleAction::Allow, Protocol::Tcp, "443")];
        let program = compile_peer(
            "carol",
            "10.0.0.4".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        let compiled = &program[0];
        let iface = compiled.interface.as_ref().unwrap();
        assert!(!iface.ingress);
        assert!(iface.negated);
        assert_eq!(compiled.destination, Some("0.0.0.0/0".parse().unwrap()));
    }

    #[test]
    fn peer_comm_rule_defaults_destination_to_vpn_subnet() {
        let rules = vec![rule(RuleType::PeerComm, RuleAction::Allow, Protocol::Any, "any")];
        let program = compile_peer(
            "dave",
            "10.0.0.5".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        assert_eq!(program[0].destination, Some("10.0.0.0/24".parse().unwrap()));
        assert!(program[0].protocol.is_none());
        assert!(program[0].dport.is_none());
    }

    #[test]
    fn port_match_only_for_tcp_udp_and_non_any_range() {
        let rules = vec![rule(RuleType::Port, RuleAction::Allow, Protocol::Icmp, "any")];
        let program = compile_peer(
            "erin",
            "10.0.0.6".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        assert!(program[0].dport.is_none());
    }

    #[test]
    fn to_restore_line_leaves_plain_comment_unquoted() {
        let compiled = &base_program("wg0")[0];
        assert!(!compiled.to_restore_line().contains('"'));

        let rules = vec![rule(RuleType::Internet, RuleAction::Allow, Protocol::Tcp, "443")];
        let program = compile_peer(
            "grace",
            "10.0.0.8".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        let line = program[0].to_restore_line();
        assert!(!line.contains('"'));
        assert!(line.contains("-j ACCEPT"));
    }

    #[test]
    fn to_restore_line_quotes_comment_with_whitespace() {
        let mut web_rule = rule(RuleType::Internet, RuleAction::Allow, Protocol::Tcp, "443");
        web_rule.name = "web site".to_string();
        let program = compile_peer(
            "grace",
            "10.0.0.8".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &[web_rule],
        );
        let line = program[0].to_restore_line();
        assert!(line.contains("\"Rule:web site\""));
    }

    #[test]
    fn to_args_carries_comment_last() {
        let rules = vec![rule(RuleType::Internet, RuleAction::Deny, Protocol::Udp, "53")];
        let program = compile_peer(
            "frank",
            "10.0.0.7".parse().unwrap(),
            "wg0",
            &"10.0.0.0/24".parse().unwrap(),
            &rules,
        );
        let args = program[0].to_args();
        assert_eq!(args.last().map(String::as_str), Some("Rule:web"));
        assert!(args.contains(&"DROP".to_string()));
    }
}
