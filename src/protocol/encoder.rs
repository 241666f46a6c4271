//! # Power Meter Packet Encoder
//!
//! Encodes samples into the 11-byte notification layout. The bench simulator
//! uses it to produce sensor traffic.

use bytes::{BufMut, Bytes, BytesMut};

use super::packet::*;

/// Encode a sample into a complete notification payload
///
/// # Arguments
///
/// * `sample` - Sample to encode (`valid` is not transmitted)
///
/// # Returns
///
/// * `Bytes` - 11-byte little-endian payload
///
/// # Examples
///
/// ```
/// use power_bridge::protocol::{encode, PowerSample};
///
/// let sample = PowerSample { left_power: -50, ..PowerSample::default() };
/// let payload = encode(&sample);
/// assert_eq!(payload.len(), 11);
/// assert_eq!(&payload[2..4], &[0xCE, 0xFF]);
/// ```
pub fn encode(sample: &PowerSample) -> Bytes {
    let mut buf = BytesMut::with_capacity(PACKET_LEN);
    buf.put_u16_le(sample.total_power);
    buf.put_i16_le(sample.left_power);
    buf.put_i16_le(sample.right_power);
    buf.put_i16_le(sample.angle);
    buf.put_u16_le(sample.cadence);
    buf.put_u8(sample.error_code);
    buf.freeze()
}
