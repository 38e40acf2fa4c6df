//! The store gateway: persists peers, their allowed IPs and firewall
//! rules, and the reconcile audit trail in SQLite via sqlx.
//!
//! Every other component reaches the database only through [`Store`];
//! nothing outside this crate holds a `SqlitePool` or writes raw SQL.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod error;
mod rows;
mod store;

pub use audit::{ReconcileAuditEntry, ReconcileOutcome};
pub use error::{Result, StoreError};
pub use store::{PeerDetail, Store};
