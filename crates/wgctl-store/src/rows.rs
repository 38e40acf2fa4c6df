//! Raw row shapes as sqlx sees them, and their fallible conversion into
//! domain types from `wgctl-types`.
//!
//! Domain types (`PublicKey`, `IpNet`, ...) don't implement sqlx's row
//! traits, so every query lands in one of these structs first and is
//! converted by hand. A conversion failure means the row was written by
//! something other than this crate's own insert path.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use wgctl_types::{
    AllowedIp, AllowedIpId, Endpoint, FirewallRule, FirewallRuleId, Peer, PeerId, PeerName,
    PortRange, PresharedKey, Protocol, PublicKey, RuleAction, RuleType,
};

use crate::error::{Result, StoreError};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PeerRow {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    pub preshared_key: Option<String>,
    pub assigned_ip: String,
    pub endpoint_host: Option<String>,
    pub endpoint_port: Option<i64>,
    pub persistent_keepalive: Option<i64>,
    pub is_active: bool,
}

impl PeerRow {
    pub(crate) fn into_peer(self) -> Result<Peer> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            table: "peers",
            reason,
        };

        let name = PeerName::try_from(self.name).map_err(|e| corrupt(e.to_string()))?;
        let public_key =
            PublicKey::from_base64(&self.public_key).map_err(|e| corrupt(e.to_string()))?;
        let preshared_key = self
            .preshared_key
            .map(|k| PresharedKey::from_base64(&k))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let assigned_ip =
            IpAddr::from_str(&self.assigned_ip).map_err(|e| corrupt(e.to_string()))?;
        let endpoint = match (self.endpoint_host, self.endpoint_port) {
            (Some(host), Some(port)) => Some(Endpoint::new(host, port as u16)),
            _ => None,
        };

        Ok(Peer {
            id: Some(PeerId::new(self.id)),
            name,
            public_key,
            preshared_key,
            assigned_ip,
            endpoint,
            persistent_keepalive: self.persistent_keepalive.map(|k| k as u16),
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct AllowedIpRow {
    pub id: i64,
    pub peer_id: i64,
    pub ip_network: String,
    pub description: Option<String>,
}

impl AllowedIpRow {
    pub(crate) fn into_allowed_ip(self) -> Result<AllowedIp> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            table: "allowed_ips",
            reason,
        };
        let mut allowed = AllowedIp::new(
            PeerId::new(self.peer_id),
            &self.ip_network,
            self.description,
        )
        .map_err(|e| corrupt(e.to_string()))?;
        allowed.id = Some(AllowedIpId::new(self.id));
        Ok(allowed)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FirewallRuleRow {
    pub id: i64,
    pub peer_id: i64,
    pub name: String,
    pub rule_type: String,
    pub action: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub protocol: String,
    pub port_range: String,
    pub priority: i64,
    pub is_active: bool,
}

impl FirewallRuleRow {
    pub(crate) fn into_firewall_rule(self) -> Result<FirewallRule> {
        let corrupt = |reason: String| StoreError::CorruptRow {
            table: "firewall_rules",
            reason,
        };

        let rule_type = match self.rule_type.as_str() {
            "peer_comm" => RuleType::PeerComm,
            "internet" => RuleType::Internet,
            "subnet" => RuleType::Subnet,
            "port" => RuleType::Port,
            "custom" => RuleType::Custom,
            other => return Err(corrupt(format!("unknown rule_type '{other}'"))),
        };
        let action = match self.action.as_str() {
            "ALLOW" => RuleAction::Allow,
            "DENY" => RuleAction::Deny,
            other => return Err(corrupt(format!("unknown action '{other}'"))),
        };
        let protocol = match self.protocol.as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            "icmp" => Protocol::Icmp,
            "any" => Protocol::Any,
            other => return Err(corrupt(format!("unknown protocol '{other}'"))),
        };
        let source = self
            .source
            .map(|s| IpNet::from_str(&s))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let destination = self
            .destination
            .map(|s| IpNet::from_str(&s))
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let port_range = PortRange::new(self.port_range).map_err(|e| corrupt(e.to_string()))?;

        Ok(FirewallRule {
            id: Some(FirewallRuleId::new(self.id)),
            peer_id: PeerId::new(self.peer_id),
            name: self.name,
            rule_type,
            action,
            source,
            destination,
            protocol,
            port_range,
            priority: self.priority as i32,
            is_active: self.is_active,
        })
    }
}

pub(crate) fn rule_type_str(rule_type: RuleType) -> &'static str {
    match rule_type {
        RuleType::PeerComm => "peer_comm",
        RuleType::Internet => "internet",
        RuleType::Subnet => "subnet",
        RuleType::Port => "port",
        RuleType::Custom => "custom",
    }
}

pub(crate) fn action_str(action: RuleAction) -> &'static str {
    match action {
        RuleAction::Allow => "ALLOW",
        RuleAction::Deny => "DENY",
    }
}
