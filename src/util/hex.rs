//! # Hex Helpers
//!
//! Conversions between bytes and the hex notation used for bus captures and
//! log output. Capture strings may contain whitespace, as produced by most
//! serial sniffers.
//!
//! ```rust
//! use mbus_master::util::hex::{decode_hex, format_hex_compact, frame_from_hex};
//!
//! let bytes = decode_hex("10 7B 05 80 16").unwrap();
//! assert_eq!(format_hex_compact(&bytes), "10 7B 05 80 16");
//! assert!(frame_from_hex("107B058016").is_ok());
//! ```

use crate::error::MBusError;
use crate::mbus::frame::MBusFrame;
use crate::mbus::parser::decode_frame;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

impl From<HexError> for MBusError {
    fn from(_: HexError) -> Self {
        MBusError::InvalidHexString
    }
}

/// Uppercase hex without separators.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decodes a hex string, ignoring whitespace.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }
    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// "68 31 31 68" style, as used in frame logs.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes a captured frame given in hex.
pub fn frame_from_hex(hex_str: &str) -> Result<MBusFrame, MBusError> {
    let bytes = decode_hex(hex_str)?;
    decode_frame(&bytes)
}
