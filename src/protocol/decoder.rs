//! # Power Meter Packet Decoder
//!
//! Decodes notification payloads into [`PowerSample`]s.
//!
//! Decoding never fails. Fields whose bytes lie beyond the end of the payload
//! are left at zero, and rejection is left to [`super::validator`].

use std::fmt::Write as _;

use super::packet::*;

/// Decode a notification payload
///
/// # Arguments
///
/// * `payload` - Raw notification bytes (normally 11 bytes)
///
/// # Returns
///
/// * `PowerSample` - Decoded sample. `valid` is true when at least 2 bytes
///   were present.
///
/// # Examples
///
/// ```
/// use power_bridge::protocol::decode;
///
/// let sample = decode(&[0x96, 0x00, 0x50, 0x00, 0x46, 0x00, 0x0A, 0x00, 0x55, 0x00, 0x00]);
/// assert_eq!(sample.total_power, 150);
/// assert_eq!(sample.cadence, 85);
/// assert!(sample.valid);
/// ```
pub fn decode(payload: &[u8]) -> PowerSample {
    PowerSample {
        total_power: read_u16_le(payload, TOTAL_POWER_OFFSET),
        left_power: read_i16_le(payload, LEFT_POWER_OFFSET),
        right_power: read_i16_le(payload, RIGHT_POWER_OFFSET),
        angle: read_i16_le(payload, ANGLE_OFFSET),
        cadence: read_u16_le(payload, CADENCE_OFFSET),
        error_code: payload.get(ERROR_CODE_OFFSET).copied().unwrap_or(0),
        valid: payload.len() >= MIN_DECODABLE_LEN,
    }
}

/// Read a little-endian u16, or zero when the payload is too short
fn read_u16_le(payload: &[u8], offset: usize) -> u16 {
    match payload.get(offset..offset + 2) {
        Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
        _ => 0,
    }
}

/// Read a little-endian i16, or zero when the payload is too short
fn read_i16_le(payload: &[u8], offset: usize) -> i16 {
    match payload.get(offset..offset + 2) {
        Some(&[lo, hi]) => i16::from_le_bytes([lo, hi]),
        _ => 0,
    }
}

/// Minimal power/cadence interpretation of a rejected payload
///
/// Reads power from bytes 0-1 and cadence from bytes 2-3. Used only for
/// diagnostics when a packet fails validation.
pub fn basic_parse(payload: &[u8]) -> Option<(u16, u16)> {
    if payload.len() < 4 {
        return None;
    }

    Some((read_u16_le(payload, 0), read_u16_le(payload, 2)))
}

/// Format bytes as space-separated uppercase hex
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Field-by-field dump of a decoded sample next to its raw bytes
///
/// Missing raw bytes are shown as `00`.
pub fn format_details(sample: &PowerSample, raw: &[u8]) -> String {
    let byte = |i: usize| raw.get(i).copied().unwrap_or(0);
    let mut out = String::new();

    let _ = writeln!(out, "Raw data:     {}", hex(raw));
    let _ = writeln!(
        out,
        "Total Power:  0x{:02X}{:02X} = {}W",
        byte(1), byte(0), sample.total_power
    );
    let _ = writeln!(
        out,
        "Left Power:   0x{:02X}{:02X} = {}W",
        byte(3), byte(2), sample.left_power
    );
    let _ = writeln!(
        out,
        "Right Power:  0x{:02X}{:02X} = {}W",
        byte(5), byte(4), sample.right_power
    );
    let _ = writeln!(
        out,
        "Angle:        0x{:02X}{:02X} = {} deg",
        byte(7), byte(6), sample.angle
    );
    let _ = writeln!(
        out,
        "Cadence:      0x{:02X}{:02X} = {} RPM",
        byte(9), byte(8), sample.cadence
    );
    let _ = write!(
        out,
        "Error Code:   0x{:02X} = {}",
        byte(10), sample.error_code
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_packet() {
        let payload = [0x96, 0x00, 0x50, 0x00, 0x46, 0x00, 0x0A, 0x00, 0x55, 0x00, 0x00];
        let sample = decode(&payload);

        assert_eq!(sample.total_power, 150);
        assert_eq!(sample.left_power, 80);
        assert_eq!(sample.right_power, 70);
        assert_eq!(sample.angle, 10);
        assert_eq!(sample.cadence, 85);
        assert_eq!(sample.error_code, 0);
        assert!(sample.valid);
    }

    #[test]
    fn test_decode_negative_fields() {
        // left = -50 (CE FF), angle = -180 (4C FF)
        let payload = [0x00, 0x00, 0xCE, 0xFF, 0x00, 0x00, 0x4C, 0xFF, 0x00, 0x00, 0x00];
        let sample = decode(&payload);

        assert_eq!(sample.left_power, -50);
        assert_eq!(sample.angle, -180);
    }

    #[test]
    fn test_decode_empty_payload() {
        let sample = decode(&[]);
        assert_eq!(sample, PowerSample::default());
        assert!(!sample.valid);
    }

    #[test]
    fn test_decode_single_byte_leaves_power_zero() {
        let sample = decode(&[0xFF]);
        assert_eq!(sample.total_power, 0);
        assert!(!sample.valid);
    }

    #[test]
    fn test_decode_truncated_zero_fills() {
        // Only total power and half of left power present
        let payload = [0xC8, 0x00, 0x11];
        let sample = decode(&payload);

        assert_eq!(sample.total_power, 200);
        assert_eq!(sample.left_power, 0);
        assert_eq!(sample.right_power, 0);
        assert_eq!(sample.cadence, 0);
        assert_eq!(sample.error_code, 0);
        assert!(sample.valid);
    }

    #[test]
    fn test_decode_ten_bytes_has_no_error_code() {
        let payload = [0x64, 0x00, 0x32, 0x00, 0x32, 0x00, 0x00, 0x00, 0x5A, 0x00];
        let sample = decode(&payload);
        assert_eq!(sample.cadence, 90);
        assert_eq!(sample.error_code, 0);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut payload = vec![0x64, 0x00, 0x32, 0x00, 0x32, 0x00, 0x00, 0x00, 0x5A, 0x00, 0x03];
        payload.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let sample = decode(&payload);

        assert_eq!(sample.total_power, 100);
        assert_eq!(sample.error_code, 3);
    }

    #[test]
    fn test_decode_never_panics_on_arbitrary_bytes() {
        // Deterministic byte soup across every length up to 32
        let soup: Vec<u8> = (0u32..32).map(|i| (i.wrapping_mul(97) ^ 0x5A) as u8).collect();
        for len in 0..=soup.len() {
            let sample = decode(&soup[..len]);
            assert_eq!(sample.valid, len >= MIN_DECODABLE_LEN);
            if len < MIN_DECODABLE_LEN {
                assert_eq!(sample.total_power, 0);
            }
        }
    }

    #[test]
    fn test_basic_parse() {
        assert_eq!(basic_parse(&[0x01, 0x02, 0x03]), None);
        assert_eq!(basic_parse(&[0x2C, 0x01, 0x5A, 0x00]), Some((300, 90)));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[]), "");
        assert_eq!(hex(&[0xCE, 0xFF, 0x0A]), "CE FF 0A");
    }

    #[test]
    fn test_format_details_handles_short_payload() {
        let raw = [0x96, 0x00];
        let details = format_details(&decode(&raw), &raw);
        assert!(details.contains("Total Power:  0x0096 = 150W"));
        assert!(details.contains("Error Code:   0x00 = 0"));
    }
}
