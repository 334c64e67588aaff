//! # Utility Modules
//!
//! Hex conversion for captures and logs, and log rate limiting.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, frame_from_hex, HexError};
pub use logging::{log_frame_hex, LogThrottle};
