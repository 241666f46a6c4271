//! # Power Meter Protocol Module
//!
//! Codec for the proprietary power meter notification payload and for the
//! outbound cycling-power data page.
//!
//! This module handles:
//! - Decoding the fixed 11-byte little-endian notification layout
//! - Semantic validation of decoded samples (range and error-code rules)
//! - Encoding samples back into the notification layout
//! - Encoding the standard "power only" broadcast page (0x10)

pub mod packet;
pub mod decoder;
pub mod encoder;
pub mod validator;
pub mod page;

pub use decoder::decode;
pub use encoder::encode;
pub use packet::PowerSample;
pub use page::{encode_power_only_page, BroadcastFrame};
pub use validator::{check, validate, ValidationError};
