//! # Power Bridge Library
//!
//! Bridge a proprietary wireless power meter to a standard cycling-power
//! broadcast, substituting synthetic data whenever the sensor is
//! unavailable or stalled.
//!
//! The sensor's 11-byte notifications are decoded and validated, tracked by
//! a data quality monitor, and published on a fixed period as cumulative
//! cycling-power telemetry.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod link;
pub mod protocol;
pub mod quality;
pub mod reading;
pub mod synthetic;
pub mod telemetry;

pub use bridge::{Bridge, TickReport};
pub use error::{BridgeError, Result};
