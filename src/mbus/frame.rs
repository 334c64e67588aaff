//! # M-Bus Frame Model
//!
//! The four frame shapes of the EN 13757-2 link layer:
//!
//! | Shape            | Wire format                              |
//! |------------------|------------------------------------------|
//! | Single character | `E5`                                     |
//! | Short            | `10 C A CS 16`                           |
//! | Control          | `68 03 03 68 C A CI CS 16`               |
//! | Long             | `68 L L 68 C A CI data… CS 16`           |
//!
//! Length and checksum are never stored; the encoder derives them from the
//! logical content and the parser verifies them on the way in. Long frames
//! carry a decoded body for the CI codes this crate understands and the raw
//! data for everything else.
//!
//! ```rust
//! use mbus_master::mbus::frame::{ControlField, MBusFrame};
//! use mbus_master::mbus::encoder::encode;
//!
//! let request = MBusFrame::Short {
//!     control: ControlField::req_ud2(true),
//!     address: 0x05,
//! };
//! assert_eq!(encode(&request).unwrap(), vec![0x10, 0x7B, 0x05, 0x80, 0x16]);
//! ```

use crate::constants::*;
use crate::error::MBusError;
use crate::mbus::device::SecondaryAddress;
use crate::payload::user_data::UserDataResponse;
use serde::Serialize;
use std::fmt;

/// Link-layer function selected by the control field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlFunction {
    SndNke,
    SndUd,
    ReqUd1,
    ReqUd2,
    RspUd,
    Other(u8),
}

/// The control byte (C field) of a frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ControlField(pub u8);

impl ControlField {
    fn with_fcb(base: u8, fcb: bool) -> Self {
        if fcb {
            Self(base | MBUS_CONTROL_MASK_FCB)
        } else {
            Self(base)
        }
    }

    pub const fn snd_nke() -> Self {
        Self(MBUS_CONTROL_MASK_SND_NKE)
    }

    pub fn snd_ud(fcb: bool) -> Self {
        Self::with_fcb(MBUS_CONTROL_MASK_SND_UD, fcb)
    }

    pub fn req_ud2(fcb: bool) -> Self {
        Self::with_fcb(MBUS_CONTROL_MASK_REQ_UD2, fcb)
    }

    pub fn req_ud1(fcb: bool) -> Self {
        Self::with_fcb(MBUS_CONTROL_MASK_REQ_UD1, fcb)
    }

    pub const fn rsp_ud() -> Self {
        Self(MBUS_CONTROL_MASK_RSP_UD)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// PRM bit: set on frames sent by the master.
    pub fn is_from_master(self) -> bool {
        self.0 & MBUS_CONTROL_MASK_DIR_M2S != 0
    }

    pub fn fcb(self) -> bool {
        self.is_from_master() && self.0 & MBUS_CONTROL_MASK_FCB != 0
    }

    pub fn fcv(self) -> bool {
        self.is_from_master() && self.0 & MBUS_CONTROL_MASK_FCV != 0
    }

    /// Access demand, slave frames only.
    pub fn acd(self) -> bool {
        !self.is_from_master() && self.0 & MBUS_CONTROL_MASK_ACD != 0
    }

    /// Data flow control, slave frames only.
    pub fn dfc(self) -> bool {
        !self.is_from_master() && self.0 & MBUS_CONTROL_MASK_DFC != 0
    }

    pub fn function(self) -> ControlFunction {
        match (self.is_from_master(), self.0 & MBUS_CONTROL_MASK_FUNCTION) {
            (true, 0x0) => ControlFunction::SndNke,
            (true, 0x3) => ControlFunction::SndUd,
            (true, 0xA) => ControlFunction::ReqUd1,
            (true, 0xB) => ControlFunction::ReqUd2,
            (false, 0x8) => ControlFunction::RspUd,
            _ => ControlFunction::Other(self.0),
        }
    }
}

impl fmt::Debug for ControlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlField(0x{:02X} {:?})", self.0, self.function())
    }
}

/// Application data of a long frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LongFrameBody {
    /// CI 0x72 variable data response.
    UserData(UserDataResponse),
    /// CI 0x52 selection of a slave by secondary address.
    SelectionOfSlave(SecondaryAddress),
    /// Any other CI, or data that has no structured interpretation.
    Raw(Vec<u8>),
}

impl LongFrameBody {
    pub fn to_bytes(&self) -> Result<Vec<u8>, MBusError> {
        match self {
            LongFrameBody::UserData(response) => response.encode(),
            LongFrameBody::SelectionOfSlave(address) => address.to_bytes(),
            LongFrameBody::Raw(data) => Ok(data.clone()),
        }
    }
}

/// Represents the different types of M-Bus frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MBusFrameType {
    Ack,
    Short,
    Control,
    Long,
}

/// A decoded M-Bus frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MBusFrame {
    /// The single character acknowledgment 0xE5.
    SingleCharacter,
    Short {
        control: ControlField,
        address: u8,
    },
    Control {
        control: ControlField,
        address: u8,
        control_information: u8,
    },
    Long {
        control: ControlField,
        address: u8,
        control_information: u8,
        body: LongFrameBody,
    },
}

impl MBusFrame {
    /// Builds a long frame, decoding the body for CI codes with a known
    /// structure. Bodies whose structure cannot be decoded, or whose decoded
    /// form would not reproduce `data`, stay raw.
    pub fn long(control: ControlField, address: u8, control_information: u8, data: &[u8]) -> Self {
        MBusFrame::Long {
            control,
            address,
            control_information,
            body: decode_body(control_information, data),
        }
    }

    pub fn frame_type(&self) -> MBusFrameType {
        match self {
            MBusFrame::SingleCharacter => MBusFrameType::Ack,
            MBusFrame::Short { .. } => MBusFrameType::Short,
            MBusFrame::Control { .. } => MBusFrameType::Control,
            MBusFrame::Long { .. } => MBusFrameType::Long,
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, MBusFrame::SingleCharacter)
    }

    pub fn control(&self) -> Option<ControlField> {
        match self {
            MBusFrame::SingleCharacter => None,
            MBusFrame::Short { control, .. }
            | MBusFrame::Control { control, .. }
            | MBusFrame::Long { control, .. } => Some(*control),
        }
    }

    pub fn address(&self) -> Option<u8> {
        match self {
            MBusFrame::SingleCharacter => None,
            MBusFrame::Short { address, .. }
            | MBusFrame::Control { address, .. }
            | MBusFrame::Long { address, .. } => Some(*address),
        }
    }

    pub fn control_information(&self) -> Option<u8> {
        match self {
            MBusFrame::Control {
                control_information,
                ..
            }
            | MBusFrame::Long {
                control_information,
                ..
            } => Some(*control_information),
            _ => None,
        }
    }

    pub fn user_data(&self) -> Option<&UserDataResponse> {
        match self {
            MBusFrame::Long {
                body: LongFrameBody::UserData(response),
                ..
            } => Some(response),
            _ => None,
        }
    }

    pub fn into_user_data(self) -> Option<UserDataResponse> {
        match self {
            MBusFrame::Long {
                body: LongFrameBody::UserData(response),
                ..
            } => Some(response),
            _ => None,
        }
    }
}

fn decode_body(control_information: u8, data: &[u8]) -> LongFrameBody {
    let decoded = match control_information {
        MBUS_CONTROL_INFO_RESP_VARIABLE => UserDataResponse::decode(data).map(LongFrameBody::UserData),
        MBUS_CONTROL_INFO_SELECT_SLAVE => {
            SecondaryAddress::from_bytes(data).map(LongFrameBody::SelectionOfSlave)
        }
        _ => return LongFrameBody::Raw(data.to_vec()),
    };
    match decoded {
        Ok(body) if body.to_bytes().as_deref() == Ok(data) => body,
        Ok(_) => {
            log::debug!("CI 0x{control_information:02X} body does not re-encode identically, keeping raw data");
            LongFrameBody::Raw(data.to_vec())
        }
        Err(e) => {
            log::debug!("CI 0x{control_information:02X} body kept raw: {e}");
            LongFrameBody::Raw(data.to_vec())
        }
    }
}
