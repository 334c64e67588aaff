//! # M-Bus Error Handling
//!
//! This module defines the error types of the mbus-master crate. Framing errors
//! are produced by the packet parser and recovered locally; encoding errors are
//! surfaced to the caller and never retried; `MBusError` is the error returned
//! by every public operation.

use thiserror::Error;

/// A violation of the wire framing rules detected while scanning a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A byte that cannot start a frame where a start byte was required.
    #[error("Invalid start byte: 0x{0:02X}")]
    InvalidStart(u8),

    /// The stop byte was not 0x16.
    #[error("Invalid stop byte: 0x{0:02X}")]
    InvalidStop(u8),

    /// The two length bytes of a long or control frame differ.
    #[error("Length bytes differ: 0x{first:02X} != 0x{second:02X}")]
    LengthMismatch { first: u8, second: u8 },

    /// The length byte is below the minimum of 3 (C, A and CI).
    #[error("Invalid length field: {0}")]
    InvalidLength(u8),

    /// The byte after the repeated length was not the second 0x68.
    #[error("Missing second start byte, got 0x{0:02X}")]
    MissingSecondStart(u8),

    /// The received checksum does not match the computed one.
    #[error("Invalid checksum: expected 0x{expected:02X}, calculated 0x{calculated:02X}")]
    ChecksumMismatch { expected: u8, calculated: u8 },
}

/// Errors raised while turning a logical frame back into wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Value does not fit the data field of DIF 0x{dif:02X}")]
    ValueOutOfRange { dif: u8 },

    #[error("Value type does not match DIF 0x{dif:02X}")]
    ValueTypeMismatch { dif: u8 },

    #[error("Text contains characters outside Latin-1")]
    TextNotLatin1,
}

/// Why the last attempt of a request/response cycle failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureCause {
    #[error("response timeout")]
    Timeout,

    #[error("framing error: {0}")]
    Framing(FramingError),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

/// Represents the different error types that can occur in the M-Bus crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MBusError {
    /// A framing rule was violated.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// A frame could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Indicates an error when parsing an M-Bus frame or data block.
    #[error("Error parsing M-Bus frame: {0}")]
    FrameParseError(String),

    /// A data record uses a DIF or VIF outside the generic tables.
    #[error("Unsupported record: DIF 0x{dif:02X}, VIF {vif:?}")]
    UnsupportedRecord { dif: u8, vif: Option<u8> },

    /// Every attempt of a request/response cycle failed.
    #[error("No response from 0x{address:02X} after {attempts} attempts ({last_cause})")]
    NoResponse {
        address: u8,
        attempts: u32,
        last_cause: FailureCause,
    },

    /// The slave answered with something that is not a valid reply.
    #[error("Protocol violation at 0x{address:02X}: {detail}")]
    ProtocolViolation { address: u8, detail: String },

    /// The slave answered the request with a valid RSP_UD that carries no
    /// variable data. The link cycle is complete and the FCB has toggled.
    #[error("Slave 0x{address:02X} answered with CI 0x{control_information:02X} instead of variable data")]
    NoVariableData { address: u8, control_information: u8 },

    /// The operation is not valid for this address.
    #[error("Invalid address for this operation: 0x{0:02X}")]
    InvalidAddress(u8),

    /// Indicates an error reported by the byte transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The master was closed or the operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,

    /// Indicates an invalid manufacturer code.
    #[error("Invalid manufacturer")]
    InvalidManufacturer,

    /// Indicates a premature end of data.
    #[error("Premature end of data")]
    PrematureEndAtData,

    /// A catch-all error for uncategorized cases.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<std::io::Error> for MBusError {
    fn from(err: std::io::Error) -> Self {
        MBusError::Transport(err.to_string())
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for MBusError {
    fn from(err: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => MBusError::PrematureEndAtData,
            nom::Err::Error(e) | nom::Err::Failure(e) => match e.code {
                nom::error::ErrorKind::Eof => MBusError::PrematureEndAtData,
                code => MBusError::FrameParseError(format!(
                    "{code:?} with {} bytes left",
                    e.input.len()
                )),
            },
        }
    }
}
