//! # Variable Data Response
//!
//! The application payload of an RSP_UD telegram with CI 0x72: a fixed
//! 12-byte header identifying the meter followed by variable data records.

use crate::constants::*;
use crate::error::MBusError;
use crate::mbus::device::{DeviceId, MBusMedium};
use crate::payload::data_encoding::{decode_bcd_digits, encode_bcd_digits};
use crate::payload::record::{decode_data_block, encode_data_block, DataRecord};
use crate::vendors::manufacturer::ManufacturerId;
use bitflags::bitflags;
use serde::{Serialize, Serializer};

bitflags! {
    /// Status byte of the variable data header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u8 {
        const APPLICATION_BUSY = 0x01;
        const APPLICATION_ERROR = 0x02;
        const POWER_LOW = 0x04;
        const PERMANENT_ERROR = 0x08;
        const TEMPORARY_ERROR = 0x10;
        const MANUFACTURER_1 = 0x20;
        const MANUFACTURER_2 = 0x40;
        const MANUFACTURER_3 = 0x80;
    }
}

fn serialize_status<S: Serializer>(status: &StatusFlags, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(status.bits())
}

/// Decoded RSP_UD variable data telegram, or several of them merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDataResponse {
    /// Identification number (8 BCD digits on the wire).
    pub ident_number: u32,
    pub manufacturer: ManufacturerId,
    pub version: u8,
    pub medium: MBusMedium,
    pub access_number: u8,
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusFlags,
    pub signature: u16,
    pub records: Vec<DataRecord>,
    /// Idle filler bytes (0x2F) after the last record.
    pub trailing_idle_fill: usize,
    /// The most recent telegram announced further telegrams (DIF 0x1F).
    pub more_data_follows: bool,
}

impl UserDataResponse {
    /// Decodes the data part of a CI 0x72 long frame.
    pub fn decode(data: &[u8]) -> Result<Self, MBusError> {
        if data.len() < MBUS_DATA_VARIABLE_HEADER_LENGTH {
            return Err(MBusError::PrematureEndAtData);
        }
        let (header, body) = data.split_at(MBUS_DATA_VARIABLE_HEADER_LENGTH);
        let ident_number = decode_bcd_digits(&header[0..4])
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| MBusError::FrameParseError("identification number is not BCD".into()))?;
        let block = decode_data_block(body)?;
        let more_data_follows = block.records.iter().any(DataRecord::more_records_follow);

        Ok(Self {
            ident_number,
            manufacturer: ManufacturerId::from_le_bytes([header[4], header[5]]),
            version: header[6],
            medium: MBusMedium::from(header[7]),
            access_number: header[8],
            status: StatusFlags::from_bits_retain(header[9]),
            signature: u16::from_le_bytes([header[10], header[11]]),
            records: block.records,
            trailing_idle_fill: block.trailing_idle_fill,
            more_data_follows,
        })
    }

    /// Encodes header and records into the data part of a long frame.
    pub fn encode(&self) -> Result<Vec<u8>, MBusError> {
        let mut out = encode_bcd_digits(u64::from(self.ident_number), 4)
            .ok_or_else(|| {
                MBusError::Other(format!(
                    "identification number {} exceeds 8 digits",
                    self.ident_number
                ))
            })?;
        out.extend_from_slice(&self.manufacturer.to_le_bytes());
        out.push(self.version);
        out.push(self.medium.into());
        out.push(self.access_number);
        out.push(self.status.bits());
        out.extend_from_slice(&self.signature.to_le_bytes());
        out.extend(encode_data_block(&self.records, self.trailing_idle_fill)?);
        Ok(out)
    }

    pub fn data_block_count(&self) -> usize {
        self.records.len()
    }

    /// False when the most recent telegram announces further telegrams
    /// (DIF 0x1F). Merged responses keep the 0x1F records of earlier
    /// telegrams but answer for the last one only.
    pub fn is_last_package(&self) -> bool {
        !self.more_data_follows
    }

    /// Appends the records of a follow-up telegram. The header of `self` is
    /// kept.
    pub fn append(&mut self, next: UserDataResponse) {
        self.records.extend(next.records);
        self.trailing_idle_fill = next.trailing_idle_fill;
        self.more_data_follows = next.more_data_follows;
    }

    /// Device identity as seen at `address`.
    pub fn device_id(&self, address: u8) -> DeviceId {
        DeviceId {
            address,
            manufacturer: self.manufacturer,
            medium: self.medium,
            ident_number: self.ident_number,
            version: self.version,
        }
    }

    pub fn to_json(&self) -> Result<String, MBusError> {
        serde_json::to_string_pretty(self).map_err(|e| MBusError::Other(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::record::DataValue;

    // Header for ident 00003476, ABB, version 8, water, access 1.
    const HEADER: [u8; 12] = [
        0x76, 0x34, 0x00, 0x00, 0x42, 0x04, 0x08, 0x07, 0x01, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decodes_header() {
        let mut data = HEADER.to_vec();
        data.extend_from_slice(&[0x04, 0x13, 0xE8, 0x03, 0x00, 0x00]);
        let response = UserDataResponse::decode(&data).unwrap();
        assert_eq!(response.ident_number, 3476);
        assert_eq!(response.manufacturer.code(), "ABB");
        assert_eq!(response.medium, MBusMedium::Water);
        assert_eq!(response.access_number, 1);
        assert!(response.status.is_empty());
        assert_eq!(response.records[0].value, DataValue::Integer(1000));
        assert!(response.is_last_package());
        assert_eq!(response.encode().unwrap(), data);
    }

    #[test]
    fn more_records_follow_clears_last_package() {
        let mut data = HEADER.to_vec();
        data.push(0x1F);
        let response = UserDataResponse::decode(&data).unwrap();
        assert!(!response.is_last_package());
        assert_eq!(response.data_block_count(), 1);
    }

    #[test]
    fn merged_response_follows_last_telegram() {
        let mut first = HEADER.to_vec();
        first.extend_from_slice(&[0x01, 0x13, 0x07, 0x1F]);
        let mut last = HEADER.to_vec();
        last.extend_from_slice(&[0x01, 0x13, 0x08]);

        let mut response = UserDataResponse::decode(&first).unwrap();
        assert!(!response.is_last_package());
        response.append(UserDataResponse::decode(&last).unwrap());
        assert!(response.is_last_package());
        assert_eq!(response.data_block_count(), 3);
        assert!(response.records[1].more_records_follow());
    }

    #[test]
    fn short_header_is_rejected() {
        assert_eq!(
            UserDataResponse::decode(&HEADER[..11]),
            Err(MBusError::PrematureEndAtData)
        );
    }

    #[test]
    fn status_bits_are_kept() {
        let mut data = HEADER.to_vec();
        data[9] = 0x05;
        let response = UserDataResponse::decode(&data).unwrap();
        assert!(response.status.contains(StatusFlags::APPLICATION_BUSY | StatusFlags::POWER_LOW));
        assert_eq!(response.encode().unwrap(), data);
    }

    #[test]
    fn json_export() {
        let response = UserDataResponse::decode(&HEADER).unwrap();
        let json = response.to_json().unwrap();
        assert!(json.contains("\"manufacturer\": \"ABB\""));
        assert!(json.contains("\"status\": 0"));
    }
}
