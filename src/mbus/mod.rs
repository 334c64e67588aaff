//! The mbus module contains the link layer: the frame model, the byte-wise
//! parser and the encoder, the transport seam and the master session task.

pub mod checksum;
pub mod device;
pub mod encoder;
pub mod frame;
pub mod master;
pub mod mock;
pub mod parser;
pub mod transport;

pub use device::{DeviceId, MBusMedium, SecondaryAddress};
pub use encoder::encode;
pub use frame::{ControlField, ControlFunction, LongFrameBody, MBusFrame, MBusFrameType};
pub use master::{ContinuationRequest, DeviceLinkState, MBusMaster, MasterConfig};
pub use mock::MockTransport;
pub use parser::{decode_frame, DecodeState, PacketParser};
pub use transport::{StreamTransport, Transport};
