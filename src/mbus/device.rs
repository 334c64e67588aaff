//! Device identity: primary address, medium and the secondary address used
//! by selection frames.

use crate::constants::MBUS_SECONDARY_ADDRESS_LENGTH;
use crate::error::MBusError;
use crate::payload::data_encoding::{decode_bcd_digits, encode_bcd_digits};
use crate::vendors::manufacturer::ManufacturerId;
use serde::Serialize;

/// Medium (device type) byte of EN 13757-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MBusMedium {
    Other,
    Oil,
    Electricity,
    Gas,
    Heat,
    Steam,
    HotWater,
    Water,
    HeatCostAllocator,
    CompressedAir,
    CoolingOutlet,
    CoolingInlet,
    HeatInlet,
    HeatAndCooling,
    BusSystem,
    UnknownMedium,
    CalorificValue,
    HotWater90,
    ColdWater,
    DualWater,
    Pressure,
    AdConverter,
    /// Any code without a standard meaning, kept verbatim.
    Unknown(u8),
}

impl From<u8> for MBusMedium {
    fn from(code: u8) -> Self {
        match code {
            0x00 => MBusMedium::Other,
            0x01 => MBusMedium::Oil,
            0x02 => MBusMedium::Electricity,
            0x03 => MBusMedium::Gas,
            0x04 => MBusMedium::Heat,
            0x05 => MBusMedium::Steam,
            0x06 => MBusMedium::HotWater,
            0x07 => MBusMedium::Water,
            0x08 => MBusMedium::HeatCostAllocator,
            0x09 => MBusMedium::CompressedAir,
            0x0A => MBusMedium::CoolingOutlet,
            0x0B => MBusMedium::CoolingInlet,
            0x0C => MBusMedium::HeatInlet,
            0x0D => MBusMedium::HeatAndCooling,
            0x0E => MBusMedium::BusSystem,
            0x0F => MBusMedium::UnknownMedium,
            0x14 => MBusMedium::CalorificValue,
            0x15 => MBusMedium::HotWater90,
            0x16 => MBusMedium::ColdWater,
            0x17 => MBusMedium::DualWater,
            0x18 => MBusMedium::Pressure,
            0x19 => MBusMedium::AdConverter,
            other => MBusMedium::Unknown(other),
        }
    }
}

impl From<MBusMedium> for u8 {
    fn from(medium: MBusMedium) -> u8 {
        match medium {
            MBusMedium::Other => 0x00,
            MBusMedium::Oil => 0x01,
            MBusMedium::Electricity => 0x02,
            MBusMedium::Gas => 0x03,
            MBusMedium::Heat => 0x04,
            MBusMedium::Steam => 0x05,
            MBusMedium::HotWater => 0x06,
            MBusMedium::Water => 0x07,
            MBusMedium::HeatCostAllocator => 0x08,
            MBusMedium::CompressedAir => 0x09,
            MBusMedium::CoolingOutlet => 0x0A,
            MBusMedium::CoolingInlet => 0x0B,
            MBusMedium::HeatInlet => 0x0C,
            MBusMedium::HeatAndCooling => 0x0D,
            MBusMedium::BusSystem => 0x0E,
            MBusMedium::UnknownMedium => 0x0F,
            MBusMedium::CalorificValue => 0x14,
            MBusMedium::HotWater90 => 0x15,
            MBusMedium::ColdWater => 0x16,
            MBusMedium::DualWater => 0x17,
            MBusMedium::Pressure => 0x18,
            MBusMedium::AdConverter => 0x19,
            MBusMedium::Unknown(code) => code,
        }
    }
}

/// Identity of a slave as configured by the caller or reported in a
/// variable data header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceId {
    /// Primary address: 0-250 slaves, 253 network layer, 254 and 255 broadcast.
    pub address: u8,
    pub manufacturer: ManufacturerId,
    pub medium: MBusMedium,
    pub ident_number: u32,
    pub version: u8,
}

impl DeviceId {
    pub fn new(
        address: u8,
        medium: MBusMedium,
        ident_number: u32,
        manufacturer: &str,
        version: u8,
    ) -> Result<Self, MBusError> {
        Ok(Self {
            address,
            manufacturer: ManufacturerId::from_code(manufacturer)?,
            medium,
            ident_number,
            version,
        })
    }

    pub fn secondary_address(&self) -> SecondaryAddress {
        SecondaryAddress {
            ident_number: self.ident_number,
            manufacturer: self.manufacturer,
            version: self.version,
            medium: self.medium,
        }
    }
}

/// The 8-byte secondary address carried by CI 0x52 selection frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SecondaryAddress {
    pub ident_number: u32,
    pub manufacturer: ManufacturerId,
    pub version: u8,
    pub medium: MBusMedium,
}

impl SecondaryAddress {
    pub fn from_bytes(data: &[u8]) -> Result<Self, MBusError> {
        if data.len() != MBUS_SECONDARY_ADDRESS_LENGTH {
            return Err(MBusError::FrameParseError(format!(
                "secondary address needs {MBUS_SECONDARY_ADDRESS_LENGTH} bytes, got {}",
                data.len()
            )));
        }
        let ident_number = decode_bcd_digits(&data[0..4])
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MBusError::FrameParseError("identification number is not BCD".into()))?;
        Ok(Self {
            ident_number,
            manufacturer: ManufacturerId::from_le_bytes([data[4], data[5]]),
            version: data[6],
            medium: MBusMedium::from(data[7]),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MBusError> {
        let mut out = encode_bcd_digits(u64::from(self.ident_number), 4).ok_or_else(|| {
            MBusError::Other(format!(
                "identification number {} exceeds 8 digits",
                self.ident_number
            ))
        })?;
        out.extend_from_slice(&self.manufacturer.to_le_bytes());
        out.push(self.version);
        out.push(self.medium.into());
        Ok(out)
    }
}
