//! Opaque identifiers for store-owned rows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a [`crate::Peer`] row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(i64);

impl PeerId {
    /// Wraps a raw store row id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for an [`crate::AllowedIp`] row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllowedIpId(i64);

impl AllowedIpId {
    /// Wraps a raw store row id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for AllowedIpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllowedIpId({})", self.0)
    }
}

/// Opaque identifier for a [`crate::FirewallRule`] row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirewallRuleId(i64);

impl FirewallRuleId {
    /// Wraps a raw store row id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for FirewallRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FirewallRuleId({})", self.0)
    }
}
