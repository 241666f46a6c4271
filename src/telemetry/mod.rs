//! # Telemetry Module
//!
//! Periodic publishing of the current reading to the outbound cycling-power
//! broadcast profile.
//!
//! This module handles:
//! - The fixed-period publish deadline and the slower quality summary timer
//! - Folding instantaneous power into the cumulative broadcast fields
//! - Outbound profile implementations (log-only, and JSONL files with rotation)

pub mod broadcast;
pub mod jsonl;
pub mod publisher;

pub use broadcast::{BroadcastProfile, TracingBroadcaster};
pub use jsonl::JsonlBroadcaster;
pub use publisher::{CumulativeTelemetry, Deadline, TelemetryPublisher};
