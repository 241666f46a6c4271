//! # Data Quality Monitor
//!
//! Tracks valid/invalid packet counts and how long ago the last valid
//! sample arrived. Synthetic data never touches this monitor.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::clock::elapsed_since;
use crate::config::QualityConfig;

/// Valid/invalid packet accounting and staleness tracking
#[derive(Debug, Clone)]
pub struct QualityMonitor {
    valid_count: u32,
    invalid_count: u32,
    last_valid: Option<u32>,
    timeout_ms: u32,
    max_error_rate: f32,
    quality_good: bool,
}

impl QualityMonitor {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            valid_count: 0,
            invalid_count: 0,
            last_valid: None,
            timeout_ms: config.data_timeout_ms,
            max_error_rate: config.max_error_rate,
            quality_good: true,
        }
    }

    /// Count a decoded and validated sample received at `now`
    pub fn record_valid(&mut self, now: u32) {
        self.valid_count = self.valid_count.saturating_add(1);
        self.last_valid = Some(now);
        self.update_quality();
    }

    /// Count a rejected sample
    pub fn record_invalid(&mut self) {
        self.invalid_count = self.invalid_count.saturating_add(1);
        self.update_quality();
    }

    fn update_quality(&mut self) {
        let was_good = self.quality_good;
        self.quality_good = match self.error_rate() {
            Some(percent) => percent <= self.max_error_rate * 100.0,
            None => true,
        };

        if was_good && !self.quality_good {
            warn!(
                "Data quality degraded: {:.1}% invalid packets",
                self.error_rate().unwrap_or_default()
            );
        } else if !was_good && self.quality_good {
            info!("Data quality recovered");
        }
    }

    /// Milliseconds since the last valid sample, if there has been one
    pub fn last_valid_age(&self, now: u32) -> Option<u32> {
        self.last_valid.map(|at| elapsed_since(now, at))
    }

    /// True when a valid sample has arrived but is older than the timeout
    ///
    /// Always false before the first valid sample.
    pub fn is_stale(&self, now: u32) -> bool {
        self.last_valid_age(now)
            .map_or(false, |age| age > self.timeout_ms)
    }

    /// True when the last valid sample is older than twice the timeout
    pub fn is_severely_stale(&self, now: u32) -> bool {
        self.last_valid_age(now)
            .map_or(false, |age| age > self.timeout_ms.saturating_mul(2))
    }

    /// True when a valid sample exists and is within the timeout
    pub fn is_fresh(&self, now: u32) -> bool {
        self.last_valid.is_some() && !self.is_stale(now)
    }

    /// Invalid packets as a percentage of all packets
    pub fn error_rate(&self) -> Option<f32> {
        let total = u64::from(self.valid_count) + u64::from(self.invalid_count);
        if total == 0 {
            return None;
        }

        Some(self.invalid_count as f32 / total as f32 * 100.0)
    }

    pub fn is_quality_good(&self) -> bool {
        self.quality_good
    }

    pub fn has_samples(&self) -> bool {
        self.valid_count > 0 || self.invalid_count > 0
    }

    pub fn valid_count(&self) -> u32 {
        self.valid_count
    }

    pub fn invalid_count(&self) -> u32 {
        self.invalid_count
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Snapshot for the periodic quality report
    pub fn summary(&self, now: u32, connected: bool) -> QualitySummary {
        QualitySummary {
            valid_count: self.valid_count,
            invalid_count: self.invalid_count,
            error_rate: self.error_rate().unwrap_or_default(),
            last_valid_age_ms: self.last_valid_age(now),
            stale: self.is_stale(now),
            quality_good: self.quality_good,
            connected,
        }
    }
}

/// Periodic data quality report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySummary {
    pub valid_count: u32,
    pub invalid_count: u32,
    /// Percent of packets rejected
    pub error_rate: f32,
    pub last_valid_age_ms: Option<u32>,
    pub stale: bool,
    pub quality_good: bool,
    pub connected: bool,
}

impl fmt::Display for QualitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Data Quality Report ===")?;
        writeln!(f, "Valid packets:   {}", self.valid_count)?;
        writeln!(f, "Invalid packets: {}", self.invalid_count)?;
        writeln!(f, "Error rate:      {:.2}%", self.error_rate)?;
        match self.last_valid_age_ms {
            Some(age) => writeln!(f, "Last valid:      {}ms ago", age)?,
            None => writeln!(f, "Last valid:      never")?,
        }
        writeln!(f, "Stale:           {}", if self.stale { "YES" } else { "NO" })?;
        writeln!(f, "Quality:         {}", if self.quality_good { "GOOD" } else { "POOR" })?;
        write!(f, "Connected:       {}", if self.connected { "YES" } else { "NO" })
    }
}
