//! # Frame Encoder
//!
//! Turns a logical `MBusFrame` into wire bytes. Length fields and checksums
//! are always computed here, never taken from the frame.

use crate::constants::*;
use crate::error::{EncodingError, MBusError};
use crate::mbus::checksum::checksum;
use crate::mbus::frame::MBusFrame;
use bytes::{BufMut, BytesMut};

/// Encodes a frame into its wire representation.
pub fn encode(frame: &MBusFrame) -> Result<Vec<u8>, MBusError> {
    let mut buf = BytesMut::with_capacity(MBUS_FRAME_LENGTH_MAX);
    match frame {
        MBusFrame::SingleCharacter => buf.put_u8(MBUS_FRAME_ACK),
        MBusFrame::Short { control, address } => {
            buf.put_u8(MBUS_FRAME_SHORT_START);
            buf.put_u8(control.raw());
            buf.put_u8(*address);
            buf.put_u8(checksum(&[control.raw(), *address]));
            buf.put_u8(MBUS_FRAME_STOP);
        }
        MBusFrame::Control {
            control,
            address,
            control_information,
        } => put_long(&mut buf, control.raw(), *address, *control_information, &[])?,
        MBusFrame::Long {
            control,
            address,
            control_information,
            body,
        } => {
            let data = body.to_bytes()?;
            put_long(&mut buf, control.raw(), *address, *control_information, &data)?;
        }
    }
    Ok(buf.to_vec())
}

fn put_long(buf: &mut BytesMut, control: u8, address: u8, ci: u8, data: &[u8]) -> Result<(), MBusError> {
    if data.len() > MBUS_FRAME_DATA_LENGTH_MAX {
        return Err(EncodingError::PayloadTooLarge {
            len: data.len(),
            max: MBUS_FRAME_DATA_LENGTH_MAX,
        }
        .into());
    }
    let length = (data.len() + 3) as u8;
    buf.put_u8(MBUS_FRAME_LONG_START);
    buf.put_u8(length);
    buf.put_u8(length);
    buf.put_u8(MBUS_FRAME_LONG_START);
    let body_start = buf.len();
    buf.put_u8(control);
    buf.put_u8(address);
    buf.put_u8(ci);
    buf.put_slice(data);
    let cs = checksum(&buf[body_start..]);
    buf.put_u8(cs);
    buf.put_u8(MBUS_FRAME_STOP);
    Ok(())
}

impl MBusFrame {
    /// Wire bytes of this frame; see [`encode`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, MBusError> {
        encode(self)
    }
}
