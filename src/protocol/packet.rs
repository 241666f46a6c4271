//! # Power Meter Packet Constants and Types
//!
//! Core definitions for the proprietary power meter notification payload.
//!
//! ```text
//! offset 0-1  total power   u16 (W)
//! offset 2-3  left power    i16 (W)
//! offset 4-5  right power   i16 (W)
//! offset 6-7  crank angle   i16 (degrees)
//! offset 8-9  cadence       u16 (RPM)
//! offset 10   error code    u8
//! ```
//!
//! All multi-byte fields are little-endian.

/// Service advertised by the power meter (reused mesh proxy UUID)
pub const POWER_METER_SERVICE_UUID: u16 = 0x1828;

/// Characteristic carrying power measurement notifications
pub const POWER_MEASUREMENT_CHAR_UUID: u16 = 0x2A63;

/// Full notification payload length
pub const PACKET_LEN: usize = 11;

/// Minimum payload length for a sample to be considered decoded
pub const MIN_DECODABLE_LEN: usize = 2;

pub const TOTAL_POWER_OFFSET: usize = 0;
pub const LEFT_POWER_OFFSET: usize = 2;
pub const RIGHT_POWER_OFFSET: usize = 4;
pub const ANGLE_OFFSET: usize = 6;
pub const CADENCE_OFFSET: usize = 8;
pub const ERROR_CODE_OFFSET: usize = 10;

/// Highest error code still treated as a minor device warning
pub const MAX_MINOR_ERROR_CODE: u8 = 10;

/// Maximum plausible total power in watts
pub const MAX_TOTAL_POWER: u16 = 2000;

/// Total power above which a warning is logged
pub const HIGH_POWER_WARNING: u16 = 1000;

/// Maximum plausible cadence in RPM
pub const MAX_CADENCE: u16 = 200;

/// Crank angle range in degrees
pub const ANGLE_MIN: i16 = -180;
pub const ANGLE_MAX: i16 = 180;

/// Per-leg power range in watts
pub const LEG_POWER_MIN: i16 = -100;
pub const LEG_POWER_MAX: i16 = 1500;

/// Allowed mismatch between left + right and total power, in percent
pub const BALANCE_TOLERANCE_PERCENT: f32 = 15.0;

/// Total power (exclusive) below which the balance check is skipped
pub const BALANCE_MIN_TOTAL_POWER: u16 = 10;

/// One power meter sample, either decoded from a notification or synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerSample {
    /// Total power in watts
    pub total_power: u16,

    /// Left leg power in watts
    pub left_power: i16,

    /// Right leg power in watts
    pub right_power: i16,

    /// Crank angle in degrees
    pub angle: i16,

    /// Cadence in RPM
    pub cadence: u16,

    /// Device error code (0 = none)
    pub error_code: u8,

    /// Structural validity (enough bytes were present to decode)
    pub valid: bool,
}

impl PowerSample {
    /// Build a structurally valid sample carrying only power and cadence
    ///
    /// Power is split evenly across both legs so the sample passes the
    /// balance check.
    ///
    /// # Examples
    ///
    /// ```
    /// use power_bridge::protocol::PowerSample;
    ///
    /// let sample = PowerSample::from_power_cadence(101, 70);
    /// assert_eq!(sample.left_power + sample.right_power, 101);
    /// assert!(sample.valid);
    /// ```
    pub fn from_power_cadence(total_power: u16, cadence: u16) -> Self {
        let clamped = total_power.min(i16::MAX as u16 * 2);
        let left = (clamped / 2) as i16;
        let right = (clamped - clamped / 2) as i16;

        Self {
            total_power,
            left_power: left,
            right_power: right,
            angle: 0,
            cadence,
            error_code: 0,
            valid: true,
        }
    }

    /// Instantaneous cadence narrowed to the broadcast field width
    pub fn cadence_u8(&self) -> u8 {
        u8::try_from(self.cadence).unwrap_or(u8::MAX)
    }

    /// Instantaneous power narrowed to the signed broadcast field
    pub fn power_i16(&self) -> i16 {
        i16::try_from(self.total_power).unwrap_or(i16::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(PACKET_LEN, 11);
        assert_eq!(ERROR_CODE_OFFSET, PACKET_LEN - 1);
        assert_eq!(CADENCE_OFFSET + 2, ERROR_CODE_OFFSET);
    }

    #[test]
    fn test_default_sample_is_zeroed() {
        let sample = PowerSample::default();
        assert_eq!(sample.total_power, 0);
        assert_eq!(sample.cadence, 0);
        assert!(!sample.valid);
    }

    #[test]
    fn test_from_power_cadence_splits_odd_power() {
        let sample = PowerSample::from_power_cadence(151, 85);
        assert_eq!(sample.left_power, 75);
        assert_eq!(sample.right_power, 76);
        assert_eq!(sample.cadence, 85);
        assert_eq!(sample.error_code, 0);
    }

    #[test]
    fn test_narrowing_saturates() {
        let sample = PowerSample {
            total_power: 40_000,
            cadence: 300,
            ..PowerSample::default()
        };
        assert_eq!(sample.power_i16(), i16::MAX);
        assert_eq!(sample.cadence_u8(), u8::MAX);

        let normal = PowerSample::from_power_cadence(250, 90);
        assert_eq!(normal.power_i16(), 250);
        assert_eq!(normal.cadence_u8(), 90);
    }
}
