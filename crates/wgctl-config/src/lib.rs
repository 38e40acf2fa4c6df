//! VPN address allocation (IPAM) and rendering of `wg0.conf` / client
//! configuration text.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ipam;
pub mod render;
pub mod validate;
pub mod writer;

pub use error::{AllowedIpViolation, ConfigError, Result};
pub use render::{render_client_config, render_server_config, RenderedPeer, ServerInterface};
pub use validate::{validate_multiple_allowed_ips, PeerNetworks};
pub use writer::ConfigWriter;
