//! Live telemetry: a per-peer traffic history, a change-gated snapshot
//! feed, and the peer-action command path that re-renders configuration
//! and re-reconciles the packet filter.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod format;
pub mod pipeline;
pub mod ring;
pub mod snapshot;

pub use error::{Result, TelemetryError};
pub use pipeline::{PeerAction, PipelineConfig, SharedPipeline, TelemetryPipeline};
pub use ring::{TrafficRing, TrafficSample, MAX_SAMPLES};
pub use snapshot::{ChangeDetector, PeerSnapshot};
