//! # Value Information Block
//!
//! Parsing and interpretation of the VIF/VIFE chain of a data record. The VIF
//! selects a table (primary, `0xFB`, `0xFD`), a plain-text unit, "any" or a
//! manufacturer-specific value. Combinable VIFEs `0x70-0x77` and `0x7D`
//! correct the decimal exponent; other VIFEs are kept as raw bytes.

use crate::constants::*;
use crate::error::MBusError;
use crate::payload::data_encoding::{decode_text, encode_text};
use crate::payload::vif_maps::{lookup_primary_vif, lookup_vife_fb, lookup_vife_fd};
use nom::{bytes::complete::take, number::complete::u8 as byte, IResult};
use serde::Serialize;

/// Physical meaning of a VIF code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VifInfo {
    pub quantity: &'static str,
    pub unit: &'static str,
    /// Decimal exponent applied to the raw value.
    pub exponent: i8,
}

/// Table entry selected by a VIF chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VifCode {
    Primary(u8),
    /// First extension table (VIF 0xFB), code without extension bit.
    ExtensionFb(u8),
    /// Second extension table (VIF 0xFD), code without extension bit.
    ExtensionFd(u8),
    PlainText,
    Any,
    ManufacturerSpecific,
}

/// Resolves a VIF code to unit and exponent.
///
/// The standard tables cover the generic codes; manufacturer-specific codes
/// are left to custom resolvers.
pub trait UnitResolver {
    fn resolve(&self, code: &VifCode) -> Option<VifInfo>;
}

/// Resolver backed by the EN 13757-3 tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardUnits;

impl UnitResolver for StandardUnits {
    fn resolve(&self, code: &VifCode) -> Option<VifInfo> {
        match *code {
            VifCode::Primary(c) => lookup_primary_vif(c),
            VifCode::ExtensionFb(c) => lookup_vife_fb(c),
            VifCode::ExtensionFd(c) => lookup_vife_fd(c),
            VifCode::PlainText => Some(VifInfo {
                quantity: "Plain text unit",
                unit: "",
                exponent: 0,
            }),
            VifCode::Any | VifCode::ManufacturerSpecific => None,
        }
    }
}

/// VIF, optional plain-text unit and VIFE bytes exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueInformationBlock {
    pub vif: u8,
    pub vife: Vec<u8>,
    /// Unit text of VIF 0x7C/0xFC, already in reading order.
    pub plain_text: Option<String>,
}

impl ValueInformationBlock {
    pub fn new(vif: u8) -> Self {
        Self {
            vif,
            vife: Vec::new(),
            plain_text: None,
        }
    }

    pub fn code(&self) -> VifCode {
        match self.vif {
            MBUS_DIB_VIF_EXTENSION_FB => {
                VifCode::ExtensionFb(self.vife.first().map_or(0, |c| c & 0x7F))
            }
            MBUS_DIB_VIF_EXTENSION_FD => {
                VifCode::ExtensionFd(self.vife.first().map_or(0, |c| c & 0x7F))
            }
            v => match v & MBUS_DIB_VIF_WITHOUT_EXTENSION {
                MBUS_DIB_VIF_PLAIN_TEXT => VifCode::PlainText,
                MBUS_DIB_VIF_ANY => VifCode::Any,
                MBUS_DIB_VIF_MANUFACTURER_SPECIFIC => VifCode::ManufacturerSpecific,
                c => VifCode::Primary(c),
            },
        }
    }

    /// VIFE bytes that follow the table code.
    pub fn combinable_vife(&self) -> &[u8] {
        match self.code() {
            VifCode::ExtensionFb(_) | VifCode::ExtensionFd(_) => self.vife.get(1..).unwrap_or(&[]),
            _ => &self.vife,
        }
    }

    /// Exponent correction from combinable VIFEs.
    pub fn exponent_correction(&self) -> i8 {
        self.combinable_vife()
            .iter()
            .map(|vife| match vife & 0x7F {
                c @ 0x70..=0x77 => (c & 0x07) as i8 - 6,
                0x7D => 3,
                _ => 0,
            })
            .sum()
    }

    pub fn is_manufacturer_specific(&self) -> bool {
        self.code() == VifCode::ManufacturerSpecific
            || self.vife.iter().any(|v| v & 0x7F == 0x7F)
    }

    /// Unit information with combinable corrections applied.
    pub fn value_info_with(&self, resolver: &dyn UnitResolver) -> Option<VifInfo> {
        resolver.resolve(&self.code()).map(|info| VifInfo {
            exponent: info.exponent + self.exponent_correction(),
            ..info
        })
    }

    pub fn value_info(&self) -> Option<VifInfo> {
        self.value_info_with(&StandardUnits)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), MBusError> {
        out.push(self.vif);
        if let Some(text) = &self.plain_text {
            let bytes = encode_text(text)?;
            out.push(bytes.len() as u8);
            out.extend_from_slice(&bytes);
        }
        out.extend_from_slice(&self.vife);
        Ok(())
    }
}

/// Parses a VIF chain. The plain-text unit is read before the VIFEs.
pub fn parse_vib(input: &[u8]) -> IResult<&[u8], ValueInformationBlock> {
    let (mut rest, vif) = byte(input)?;
    let mut vib = ValueInformationBlock::new(vif);

    if vif & MBUS_DIB_VIF_WITHOUT_EXTENSION == MBUS_DIB_VIF_PLAIN_TEXT {
        let (r, len) = byte(rest)?;
        let (r, text) = take(len)(r)?;
        vib.plain_text = Some(decode_text(text));
        rest = r;
    }

    let mut extension = vif & MBUS_DIB_VIF_EXTENSION_BIT != 0;
    while extension {
        if vib.vife.len() >= MBUS_DATA_RECORD_VIFE_MAX {
            return Err(nom::Err::Failure(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::TooLarge,
            )));
        }
        let (r, vife) = byte(rest)?;
        vib.vife.push(vife);
        extension = vife & MBUS_DIB_VIF_EXTENSION_BIT != 0;
        rest = r;
    }

    Ok((rest, vib))
}
