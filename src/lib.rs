//! # mbus-master - M-Bus (Meter-Bus) Master Driver Stack
//!
//! The mbus-master crate implements the wired M-Bus (EN 13757-2 link layer,
//! EN 13757-3 application layer) as used to read heat, water, gas and
//! electricity meters over a two-wire bus.
//!
//! ## Features
//!
//! - Frame model for single character, short, control and long frames
//! - Incremental packet parser that resynchronizes on line noise
//! - Encoder with byte-exact round trips of decoded frames
//! - Variable data record decoding with units, scaling, dates and text
//! - Async master session: SND_NKE, REQ_UD2/RSP_UD with FCB handling,
//!   retries, multi-telegram readout, SND_UD and secondary address selection
//! - Transport trait with a stream adapter for serial ports and TCP gateways
//! - JSON export of decoded responses
//!
//! ## Usage
//!
//! ```rust
//! use mbus_master::{decode_frame, MBusFrame};
//!
//! let bytes = mbus_master::util::decode_hex(
//!     "68 31 31 68 08 01 72 45 58 57 03 B4 05 34 04 9E 00 27 B6 03 06 F9 34 15 03 15 C6 00 \
//!      4D 05 2E 00 00 00 00 05 3D 00 00 00 00 05 5B 22 F3 26 42 05 5F C7 DA 0D 42 FA 16",
//! ).unwrap();
//! let frame = decode_frame(&bytes).unwrap();
//! let response = frame.user_data().unwrap();
//! assert_eq!(response.manufacturer.code(), "AMT");
//! assert_eq!(response.data_block_count(), 6);
//! assert_eq!(frame.to_bytes().unwrap(), bytes);
//! ```

pub mod constants;
pub mod error;
pub mod logging;
pub mod mbus;
pub mod payload;
pub mod util;
pub mod vendors;

pub use crate::error::{EncodingError, FailureCause, FramingError, MBusError};
pub use crate::logging::init_logger;

// Link layer
pub use mbus::{
    decode_frame, encode, ControlField, DeviceId, DeviceLinkState, MBusFrame, MBusFrameType,
    MBusMaster, MBusMedium, MasterConfig, PacketParser, SecondaryAddress, StreamTransport,
    Transport,
};

// Application layer
pub use payload::{DataRecord, DataValue, StatusFlags, UnitResolver, UserDataResponse};
pub use vendors::ManufacturerId;
