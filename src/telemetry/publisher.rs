//! # Telemetry Publisher
//!
//! Fires on a deadline that advances by exactly one period per fire. A
//! stalled caller therefore gets one fire on its next poll instead of a
//! burst.

use serde::Serialize;
use tracing::{debug, warn};

use super::broadcast::BroadcastProfile;
use crate::clock::deadline_reached;
use crate::config::{BroadcastConfig, QualityConfig};
use crate::protocol::{BroadcastFrame, PowerSample};
use crate::reading::Reading;

/// Periodic deadline on the wrapping millisecond clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    next: u32,
    period: u32,
}

impl Deadline {
    /// First fire at `first`, then every `period` ms
    pub fn starting_at(first: u32, period: u32) -> Self {
        Self { next: first, period }
    }

    /// Fire at most once if the deadline has been reached
    pub fn poll(&mut self, now: u32) -> bool {
        if !deadline_reached(now, self.next) {
            return false;
        }

        self.next = self.next.wrapping_add(self.period);
        true
    }

    pub fn next(&self) -> u32 {
        self.next
    }

    pub fn period(&self) -> u32 {
        self.period
    }
}

/// Cumulative broadcast fields, advanced once per publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CumulativeTelemetry {
    /// Sum of instantaneous power, wrapping at 2^16
    pub accumulated_power: u16,
    /// Publish count, wrapping at 2^8
    pub event_count: u8,
    pub last_instant_power: u16,
    pub last_instant_cadence: u8,
}

impl CumulativeTelemetry {
    /// Fold one reading into the cumulative fields and build the frame to send
    pub fn fold(&mut self, sample: &PowerSample) -> BroadcastFrame {
        self.accumulated_power = self.accumulated_power.wrapping_add(sample.total_power);
        self.event_count = self.event_count.wrapping_add(1);
        self.last_instant_power = sample.total_power;
        self.last_instant_cadence = sample.cadence_u8();

        BroadcastFrame {
            instant_power: sample.power_i16(),
            accumulated_power: self.accumulated_power,
            event_count: self.event_count,
            instant_cadence: self.last_instant_cadence,
        }
    }
}

/// Publish scheduler for the outbound broadcast profile
#[derive(Debug)]
pub struct TelemetryPublisher<B> {
    profile: B,
    cumulative: CumulativeTelemetry,
    publish: Deadline,
    summary: Deadline,
    published: u64,
    failed: u64,
}

impl<B: BroadcastProfile> TelemetryPublisher<B> {
    /// Create a publisher whose first publish is due at `now`
    ///
    /// The first quality summary is due one summary interval after `now`.
    pub fn new(profile: B, broadcast: &BroadcastConfig, quality: &QualityConfig, now: u32) -> Self {
        Self {
            profile,
            cumulative: CumulativeTelemetry::default(),
            publish: Deadline::starting_at(now, broadcast.publish_period_ms),
            summary: Deadline::starting_at(
                now.wrapping_add(quality.summary_interval_ms),
                quality.summary_interval_ms,
            ),
            published: 0,
            failed: 0,
        }
    }

    /// Publish `reading` if the publish deadline has been reached
    ///
    /// A push failure is logged and does not hold back the schedule or the
    /// cumulative fields.
    pub fn poll_publish(&mut self, now: u32, reading: &Reading) -> Option<BroadcastFrame> {
        if !self.publish.poll(now) {
            return None;
        }

        let frame = self.cumulative.fold(reading.sample());
        self.published += 1;

        match self.profile.publish(&frame) {
            Ok(()) => debug!(
                "Published {}W @ {}RPM ({}) event {}",
                frame.instant_power,
                frame.instant_cadence,
                reading.label(),
                frame.event_count
            ),
            Err(e) => {
                self.failed += 1;
                warn!("Failed to push broadcast frame: {}", e);
            }
        }

        Some(frame)
    }

    /// True when the quality summary is due
    pub fn poll_summary(&mut self, now: u32) -> bool {
        self.summary.poll(now)
    }

    pub fn cumulative(&self) -> &CumulativeTelemetry {
        &self.cumulative
    }

    /// Publish ticks so far, including failed pushes
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn next_publish(&self) -> u32 {
        self.publish.next()
    }

    pub fn profile(&self) -> &B {
        &self.profile
    }
}
