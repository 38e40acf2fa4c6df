//! Lowers firewall policy into packet-filter rules and applies them to the
//! host atomically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod reconciler;

pub use compiler::{base_program, compile_peer, Chain, CompiledRule, InterfaceMatch, Target};
pub use error::{FirewallError, Result};
pub use reconciler::{ApplyReport, ApplyScope, PeerPolicy, Reconciler, SUB_CHAIN};
