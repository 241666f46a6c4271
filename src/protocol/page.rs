//! # Cycling Power Broadcast Page
//!
//! Outbound telemetry fields and their encoding as the standard cycling-power
//! "power only" data page (0x10).
//!
//! ```text
//! byte 0    page number (0x10)
//! byte 1    update event count (wraps at 256)
//! byte 2    pedal power balance (0xFF = not used)
//! byte 3    instantaneous cadence (RPM)
//! byte 4-5  accumulated power (W, little-endian, wraps at 65536)
//! byte 6-7  instantaneous power (W, little-endian)
//! ```

use serde::Serialize;

/// Power-only data page number
pub const POWER_ONLY_PAGE: u8 = 0x10;

/// Pedal balance byte when balance is not reported
pub const PEDAL_BALANCE_NOT_USED: u8 = 0xFF;

/// Broadcast page length in bytes
pub const POWER_PAGE_LEN: usize = 8;

/// One push to the outbound broadcast profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BroadcastFrame {
    /// Instantaneous power in watts
    pub instant_power: i16,

    /// Accumulated power in watts (wraps at 2^16)
    pub accumulated_power: u16,

    /// Publish event count (wraps at 2^8)
    pub event_count: u8,

    /// Instantaneous cadence in RPM
    pub instant_cadence: u8,
}

/// Encode a frame as a power-only data page
///
/// # Examples
///
/// ```
/// use power_bridge::protocol::{encode_power_only_page, BroadcastFrame};
///
/// let page = encode_power_only_page(&BroadcastFrame {
///     instant_power: 250,
///     accumulated_power: 1000,
///     event_count: 4,
///     instant_cadence: 90,
/// });
/// assert_eq!(page, [0x10, 4, 0xFF, 90, 0xE8, 0x03, 0xFA, 0x00]);
/// ```
pub fn encode_power_only_page(frame: &BroadcastFrame) -> [u8; POWER_PAGE_LEN] {
    let [acc_lo, acc_hi] = frame.accumulated_power.to_le_bytes();
    let [pwr_lo, pwr_hi] = frame.instant_power.to_le_bytes();

    [
        POWER_ONLY_PAGE,
        frame.event_count,
        PEDAL_BALANCE_NOT_USED,
        frame.instant_cadence,
        acc_lo,
        acc_hi,
        pwr_lo,
        pwr_hi,
    ]
}
