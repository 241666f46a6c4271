//! # Power Sample Validation
//!
//! Semantic checks applied after decoding. Hard rules reject the sample;
//! soft rules only log a warning.

use thiserror::Error;
use tracing::warn;

use super::packet::*;

/// Reason a decoded sample was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Device reported a severe error
    #[error("Severe device error code: {0}")]
    ErrorCode(u8),

    #[error("Invalid total power: {0}W (max 2000W)")]
    TotalPower(u16),

    #[error("Invalid cadence: {0}RPM (max 200RPM)")]
    Cadence(u16),

    #[error("Invalid angle: {0} deg (range -180 to 180)")]
    Angle(i16),

    #[error("Invalid left power: {0}W (range -100W to 1500W)")]
    LeftPower(i16),

    #[error("Invalid right power: {0}W (range -100W to 1500W)")]
    RightPower(i16),
}

/// Check a decoded sample against the hard range rules
///
/// Soft inconsistencies (left/right imbalance, power without cadence, very
/// high power, minor error codes) are logged and do not reject.
///
/// # Errors
///
/// Returns the first violated rule, checked in this order: error code,
/// total power, cadence, angle, left power, right power.
pub fn check(sample: &PowerSample) -> Result<(), ValidationError> {
    if sample.error_code > MAX_MINOR_ERROR_CODE {
        return Err(ValidationError::ErrorCode(sample.error_code));
    }

    if sample.total_power > MAX_TOTAL_POWER {
        return Err(ValidationError::TotalPower(sample.total_power));
    }

    if sample.cadence > MAX_CADENCE {
        return Err(ValidationError::Cadence(sample.cadence));
    }

    if !(ANGLE_MIN..=ANGLE_MAX).contains(&sample.angle) {
        return Err(ValidationError::Angle(sample.angle));
    }

    if !(LEG_POWER_MIN..=LEG_POWER_MAX).contains(&sample.left_power) {
        return Err(ValidationError::LeftPower(sample.left_power));
    }

    if !(LEG_POWER_MIN..=LEG_POWER_MAX).contains(&sample.right_power) {
        return Err(ValidationError::RightPower(sample.right_power));
    }

    warn_soft_issues(sample);
    Ok(())
}

/// Boolean form of [`check`]
///
/// # Examples
///
/// ```
/// use power_bridge::protocol::{validate, PowerSample};
///
/// let ok = PowerSample {
///     total_power: 150,
///     left_power: 80,
///     right_power: 70,
///     angle: 10,
///     cadence: 85,
///     error_code: 0,
///     valid: true,
/// };
/// assert!(validate(&ok));
/// assert!(!validate(&PowerSample { total_power: 2500, ..ok }));
/// ```
pub fn validate(sample: &PowerSample) -> bool {
    check(sample).is_ok()
}

/// Mismatch between left + right and total power, in percent of total
///
/// Returns `None` when total power is too low for the ratio to be meaningful.
pub fn balance_error_percent(sample: &PowerSample) -> Option<f32> {
    if sample.total_power <= BALANCE_MIN_TOTAL_POWER {
        return None;
    }

    let legs = i32::from(sample.left_power) + i32::from(sample.right_power);
    let diff = (legs - i32::from(sample.total_power)).abs();
    Some(diff as f32 / f32::from(sample.total_power) * 100.0)
}

fn warn_soft_issues(sample: &PowerSample) {
    if sample.error_code != 0 {
        warn!("Power meter reported minor error code {}", sample.error_code);
    }

    if let Some(percent) = balance_error_percent(sample) {
        if percent > BALANCE_TOLERANCE_PERCENT {
            warn!(
                "Power mismatch: Total={}W, L+R={}W ({:.1}% error)",
                sample.total_power,
                i32::from(sample.left_power) + i32::from(sample.right_power),
                percent
            );
        }
    }

    if sample.total_power > 0 && sample.cadence == 0 {
        warn!("Power > 0 but cadence = 0");
    }

    if sample.total_power == 0 && sample.cadence > 0 {
        warn!("Cadence > 0 but power = 0");
    }

    if sample.total_power > HIGH_POWER_WARNING {
        warn!("Very high power detected: {}W", sample.total_power);
    }
}
