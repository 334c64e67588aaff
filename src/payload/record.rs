//! # M-Bus Data Records
//!
//! Decoding and encoding of the variable data records carried by RSP_UD
//! telegrams (EN 13757-3). A record is a DIB (DIF plus DIFEs), an optional VIB,
//! an optional LVAR byte for variable-length data and the value itself.
//!
//! Decoded values are canonical: a typed value is kept only when encoding it
//! again yields the received bytes. Anything else (invalid BCD digits,
//! impossible dates, flag bits outside the typed model) is kept as
//! `DataValue::Raw`, so a decoded record always encodes back to its wire form.

use crate::constants::*;
use crate::error::{EncodingError, MBusError};
use crate::payload::data_encoding::*;
use crate::payload::vif::{parse_vib, StandardUnits, UnitResolver, ValueInformationBlock, VifCode, VifInfo};
use chrono::{NaiveDate, NaiveDateTime};
use log::warn;
use nom::{bytes::complete::take, number::complete::u8 as byte, IResult};
use serde::Serialize;

fn next_byte(input: &[u8]) -> IResult<&[u8], u8> {
    byte(input)
}

fn take_bytes(input: &[u8], len: usize) -> IResult<&[u8], &[u8]> {
    take(len)(input)
}

/// Function field of the DIF (bits 4-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordFunction {
    Instantaneous,
    Maximum,
    Minimum,
    DuringError,
}

/// Typed value of a data record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum DataValue {
    /// No data (DIF data field 0 or selection for readout).
    None,
    Integer(i64),
    Bcd(i64),
    Real(f32),
    /// Type G date.
    Date(NaiveDate),
    /// Type F date and time.
    DateTime(NaiveDateTime),
    Text(String),
    ManufacturerSpecific(Vec<u8>),
    /// Bytes without a typed interpretation.
    Raw(Vec<u8>),
}

impl DataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DataValue::Integer(v) | DataValue::Bcd(v) => Some(v as f64),
            DataValue::Real(v) => Some(f64::from(v)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataField {
    NoData,
    Integer(usize),
    Real,
    Selection,
    Bcd(usize),
    Variable,
    Special,
}

fn data_field(dif: u8) -> DataField {
    match dif & MBUS_DATA_RECORD_DIF_MASK_DATA {
        0x0 => DataField::NoData,
        0x1 => DataField::Integer(1),
        0x2 => DataField::Integer(2),
        0x3 => DataField::Integer(3),
        0x4 => DataField::Integer(4),
        0x5 => DataField::Real,
        0x6 => DataField::Integer(6),
        0x7 => DataField::Integer(8),
        0x8 => DataField::Selection,
        0x9 => DataField::Bcd(1),
        0xA => DataField::Bcd(2),
        0xB => DataField::Bcd(3),
        0xC => DataField::Bcd(4),
        0xD => DataField::Variable,
        0xE => DataField::Bcd(6),
        _ => DataField::Special,
    }
}

/// Length in bytes of a fixed-size data field, `None` for LVAR and special DIFs.
pub fn dif_data_length(dif: u8) -> Option<usize> {
    match data_field(dif) {
        DataField::NoData | DataField::Selection => Some(0),
        DataField::Integer(n) | DataField::Bcd(n) => Some(n),
        DataField::Real => Some(4),
        DataField::Variable | DataField::Special => None,
    }
}

/// Data length announced by an LVAR byte, `None` for reserved values.
pub fn lvar_data_length(lvar: u8) -> Option<usize> {
    match lvar {
        0x00..=MBUS_LVAR_TEXT_MAX => Some(usize::from(lvar)),
        0xC0..=0xCF => Some(usize::from(lvar - 0xC0)),
        0xD0..=0xDF => Some(usize::from(lvar - 0xD0)),
        0xE0..=0xEF => Some(usize::from(lvar - 0xE0)),
        0xF0..=0xF4 => Some(4 * usize::from(lvar - 0xEC)),
        0xF5 => Some(48),
        0xF6 => Some(64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
    ManufacturerData,
    GlobalReadout,
    Reserved,
}

fn special(dif: u8) -> Special {
    match dif {
        MBUS_DIB_DIF_MANUFACTURER_SPECIFIC | MBUS_DIB_DIF_MORE_RECORDS_FOLLOW => {
            Special::ManufacturerData
        }
        MBUS_DIB_DIF_GLOBAL_READOUT => Special::GlobalReadout,
        _ => Special::Reserved,
    }
}

/// DIF and DIFE bytes of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataInformationBlock {
    pub dif: u8,
    pub dife: Vec<u8>,
}

impl DataInformationBlock {
    pub fn function(&self) -> RecordFunction {
        match (self.dif & MBUS_DATA_RECORD_DIF_MASK_FUNCTION) >> 4 {
            0 => RecordFunction::Instantaneous,
            1 => RecordFunction::Maximum,
            2 => RecordFunction::Minimum,
            _ => RecordFunction::DuringError,
        }
    }

    /// Storage number: DIF bit 6 is the least significant bit, each DIFE adds
    /// four more bits.
    pub fn storage_number(&self) -> u64 {
        let base = u64::from((self.dif & MBUS_DATA_RECORD_DIF_MASK_STORAGE_NO) >> 6);
        self.dife.iter().enumerate().fold(base, |acc, (i, dife)| {
            acc | u64::from(dife & MBUS_DATA_RECORD_DIFE_MASK_STORAGE_NO) << (1 + 4 * i)
        })
    }

    pub fn tariff(&self) -> u32 {
        self.dife.iter().enumerate().fold(0, |acc, (i, dife)| {
            acc | u32::from((dife & MBUS_DATA_RECORD_DIFE_MASK_TARIFF) >> 4) << (2 * i)
        })
    }

    pub fn subunit(&self) -> u16 {
        self.dife.iter().enumerate().fold(0, |acc, (i, dife)| {
            acc | u16::from((dife & MBUS_DATA_RECORD_DIFE_MASK_DEVICE) >> 6) << i
        })
    }
}

/// One variable data record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRecord {
    pub dib: DataInformationBlock,
    pub vib: Option<ValueInformationBlock>,
    pub lvar: Option<u8>,
    pub value: DataValue,
    /// Idle filler bytes (0x2F) in front of the record.
    pub idle_fill: usize,
}

impl DataRecord {
    pub fn new(dif: u8, vif: u8, value: DataValue) -> Self {
        Self {
            dib: DataInformationBlock {
                dif,
                dife: Vec::new(),
            },
            vib: Some(ValueInformationBlock::new(vif)),
            lvar: None,
            value,
            idle_fill: 0,
        }
    }

    /// Manufacturer-specific data introduced by DIF 0x0F, or 0x1F when the
    /// slave has more records to send.
    pub fn manufacturer_specific(data: Vec<u8>, more_records_follow: bool) -> Self {
        let dif = if more_records_follow {
            MBUS_DIB_DIF_MORE_RECORDS_FOLLOW
        } else {
            MBUS_DIB_DIF_MANUFACTURER_SPECIFIC
        };
        Self {
            dib: DataInformationBlock {
                dif,
                dife: Vec::new(),
            },
            vib: None,
            lvar: None,
            value: DataValue::ManufacturerSpecific(data),
            idle_fill: 0,
        }
    }

    pub fn with_dife(mut self, dife: &[u8]) -> Self {
        self.dib.dife = dife.to_vec();
        self
    }

    pub fn with_vife(mut self, vife: &[u8]) -> Self {
        if let Some(vib) = self.vib.as_mut() {
            vib.vife = vife.to_vec();
        }
        self
    }

    pub fn function(&self) -> RecordFunction {
        self.dib.function()
    }

    pub fn storage_number(&self) -> u64 {
        self.dib.storage_number()
    }

    pub fn tariff(&self) -> u32 {
        self.dib.tariff()
    }

    pub fn subunit(&self) -> u16 {
        self.dib.subunit()
    }

    /// True for DIF 0x1F: the slave has further telegrams to send.
    pub fn more_records_follow(&self) -> bool {
        self.dib.dif == MBUS_DIB_DIF_MORE_RECORDS_FOLLOW
    }

    pub fn is_manufacturer_specific(&self) -> bool {
        matches!(self.value, DataValue::ManufacturerSpecific(_))
            || self.vib.as_ref().is_some_and(|v| v.is_manufacturer_specific())
    }

    pub fn vif_code(&self) -> Option<VifCode> {
        self.vib.as_ref().map(|v| v.code())
    }

    pub fn value_info(&self) -> Option<VifInfo> {
        self.value_info_with(&StandardUnits)
    }

    pub fn value_info_with(&self, resolver: &dyn UnitResolver) -> Option<VifInfo> {
        self.vib.as_ref().and_then(|v| v.value_info_with(resolver))
    }

    /// Numeric value with the decimal exponent of the VIF chain applied.
    pub fn scaled_value(&self) -> Option<f64> {
        let info = self.value_info()?;
        Some(self.value.as_f64()? * 10f64.powi(i32::from(info.exponent)))
    }

    fn lvar_byte(&self) -> Result<u8, EncodingError> {
        let dif = self.dib.dif;
        if let Some(lvar) = self.lvar {
            return Ok(lvar);
        }
        match &self.value {
            DataValue::Text(text) if text.chars().count() <= usize::from(MBUS_LVAR_TEXT_MAX) => {
                Ok(text.chars().count() as u8)
            }
            DataValue::Bcd(v) => {
                let digits = v.unsigned_abs().max(1).ilog10() as usize + 1;
                let len = (digits + 1) / 2;
                let base = if *v < 0 { 0xD0 } else { 0xC0 };
                Ok(base + len as u8)
            }
            DataValue::Integer(_) => Ok(0xE8),
            _ => Err(EncodingError::ValueTypeMismatch { dif }),
        }
    }

    /// Appends the wire form of the record, idle filler included.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), MBusError> {
        out.extend(std::iter::repeat(MBUS_DIB_DIF_IDLE_FILLER).take(self.idle_fill));
        out.push(self.dib.dif);
        out.extend_from_slice(&self.dib.dife);
        if let Some(vib) = &self.vib {
            vib.encode_into(out)?;
        }
        let lvar = if data_field(self.dib.dif) == DataField::Variable {
            let lvar = self.lvar_byte()?;
            out.push(lvar);
            Some(lvar)
        } else {
            None
        };
        out.extend_from_slice(&encode_value(self.dib.dif, lvar, &self.value)?);
        Ok(())
    }
}

fn check_len(bytes: &[u8], expected: Option<usize>, dif: u8) -> Result<Vec<u8>, EncodingError> {
    match expected {
        Some(len) if len != bytes.len() => Err(EncodingError::ValueTypeMismatch { dif }),
        _ => Ok(bytes.to_vec()),
    }
}

/// Encodes a value into the data field selected by `dif` and `lvar`.
pub fn encode_value(dif: u8, lvar: Option<u8>, value: &DataValue) -> Result<Vec<u8>, EncodingError> {
    let mismatch = EncodingError::ValueTypeMismatch { dif };
    match (data_field(dif), value) {
        (DataField::Special, DataValue::Raw(bytes))
        | (DataField::Special, DataValue::ManufacturerSpecific(bytes)) => Ok(bytes.clone()),
        (DataField::Special, DataValue::None) => Ok(Vec::new()),
        (DataField::Variable, DataValue::Raw(bytes)) => {
            check_len(bytes, lvar.and_then(lvar_data_length), dif)
        }
        (_, DataValue::Raw(bytes)) => check_len(bytes, dif_data_length(dif), dif),
        (DataField::NoData | DataField::Selection, DataValue::None) => Ok(Vec::new()),
        (DataField::Integer(n), DataValue::Integer(v)) => encode_int(*v, n, dif),
        (DataField::Integer(2), DataValue::Date(date)) => encode_date_g(*date, dif),
        (DataField::Integer(4), DataValue::DateTime(value)) => encode_date_time_f(*value, dif),
        (DataField::Real, DataValue::Real(v)) => Ok(encode_real(*v)),
        (DataField::Bcd(n), DataValue::Bcd(v)) => encode_bcd(*v, n, dif),
        (DataField::Variable, value) => encode_variable(dif, lvar.ok_or(mismatch.clone())?, value),
        _ => Err(mismatch),
    }
}

fn encode_variable(dif: u8, lvar: u8, value: &DataValue) -> Result<Vec<u8>, EncodingError> {
    let out_of_range = EncodingError::ValueOutOfRange { dif };
    let len = lvar_data_length(lvar).ok_or(EncodingError::ValueTypeMismatch { dif })?;
    match (lvar, value) {
        (0x00..=MBUS_LVAR_TEXT_MAX, DataValue::Text(text)) => {
            let bytes = encode_text(text)?;
            check_len(&bytes, Some(len), dif).map_err(|_| out_of_range)
        }
        (0xC0..=0xDF, DataValue::Bcd(v)) => {
            if (lvar >= 0xD0) != (*v < 0) && *v != 0 {
                return Err(out_of_range);
            }
            encode_bcd_digits(v.unsigned_abs(), len).ok_or(out_of_range)
        }
        (0xE0..=0xEF, DataValue::Integer(v)) => encode_int(*v, len, dif),
        _ => Err(EncodingError::ValueTypeMismatch { dif }),
    }
}

fn is_date_vif(vib: &ValueInformationBlock) -> bool {
    vib.code() == VifCode::Primary(0x6C)
}

fn is_date_time_vif(vib: &ValueInformationBlock) -> bool {
    matches!(
        vib.code(),
        VifCode::Primary(0x6D) | VifCode::ExtensionFd(0x70)
    )
}

fn interpret(dif: u8, vib: &ValueInformationBlock, lvar: Option<u8>, raw: &[u8]) -> DataValue {
    let raw_value = || DataValue::Raw(raw.to_vec());
    match data_field(dif) {
        DataField::NoData | DataField::Selection => DataValue::None,
        DataField::Integer(2) if is_date_vif(vib) => {
            decode_date_g(raw).map_or_else(raw_value, DataValue::Date)
        }
        DataField::Integer(4) if is_date_time_vif(vib) => {
            decode_date_time_f(raw).map_or_else(raw_value, DataValue::DateTime)
        }
        DataField::Integer(_) => decode_int(raw).map_or_else(raw_value, DataValue::Integer),
        DataField::Real => decode_real(raw).map_or_else(raw_value, DataValue::Real),
        DataField::Bcd(_) => decode_bcd(raw).map_or_else(raw_value, DataValue::Bcd),
        DataField::Variable => match lvar {
            Some(0x00..=MBUS_LVAR_TEXT_MAX) => DataValue::Text(decode_text(raw)),
            Some(0xC0..=0xCF) => decode_bcd_digits(raw)
                .and_then(|v| i64::try_from(v).ok())
                .map_or_else(raw_value, DataValue::Bcd),
            Some(0xD0..=0xDF) => decode_bcd_digits(raw)
                .and_then(|v| i64::try_from(v).ok())
                .map_or_else(raw_value, |v| DataValue::Bcd(-v)),
            Some(0xE0..=0xEF) => decode_int(raw).map_or_else(raw_value, DataValue::Integer),
            _ => raw_value(),
        },
        DataField::Special => raw_value(),
    }
}

/// Keeps `value` only when it encodes back to `raw`.
fn canonical(dif: u8, lvar: Option<u8>, raw: &[u8], value: DataValue) -> DataValue {
    match encode_value(dif, lvar, &value) {
        Ok(bytes) if bytes == raw => value,
        _ => DataValue::Raw(raw.to_vec()),
    }
}

struct Parsed<'a> {
    rest: &'a [u8],
    record: DataRecord,
    supported: bool,
}

fn unsupported(dif: u8, vib: &Option<ValueInformationBlock>) -> MBusError {
    MBusError::UnsupportedRecord {
        dif,
        vif: vib.as_ref().map(|v| v.vif),
    }
}

/// Parses one record that starts at a non-filler DIF.
fn parse_record(input: &[u8], idle_fill: usize) -> Result<Parsed<'_>, MBusError> {
    let (mut rest, dif) = next_byte(input)?;
    let mut record = DataRecord {
        dib: DataInformationBlock {
            dif,
            dife: Vec::new(),
        },
        vib: None,
        lvar: None,
        value: DataValue::None,
        idle_fill,
    };

    if data_field(dif) == DataField::Special {
        let supported = match special(dif) {
            Special::ManufacturerData => {
                record.value = DataValue::ManufacturerSpecific(rest.to_vec());
                rest = &[];
                true
            }
            Special::GlobalReadout => true,
            Special::Reserved => {
                record.value = DataValue::Raw(rest.to_vec());
                rest = &[];
                false
            }
        };
        return Ok(Parsed {
            rest,
            record,
            supported,
        });
    }

    let mut extension = dif & MBUS_DIB_DIF_EXTENSION_BIT != 0;
    while extension {
        if record.dib.dife.len() >= MBUS_DATA_RECORD_DIFE_MAX {
            return Err(MBusError::FrameParseError(format!(
                "more than {MBUS_DATA_RECORD_DIFE_MAX} DIFE bytes"
            )));
        }
        let (r, dife) = next_byte(rest)?;
        record.dib.dife.push(dife);
        extension = dife & MBUS_DIB_DIF_EXTENSION_BIT != 0;
        rest = r;
    }

    let (r, vib) = parse_vib(rest)?;
    rest = r;

    let len = match data_field(dif) {
        DataField::Variable => {
            let (r, lvar) = next_byte(rest)?;
            rest = r;
            record.lvar = Some(lvar);
            match lvar_data_length(lvar) {
                Some(len) => len,
                None => {
                    record.value = DataValue::Raw(rest.to_vec());
                    record.vib = Some(vib);
                    return Ok(Parsed {
                        rest: &[],
                        record,
                        supported: false,
                    });
                }
            }
        }
        _ => dif_data_length(dif).unwrap_or(0),
    };

    let (r, raw) = take_bytes(rest, len)?;
    rest = r;

    let supported = match vib.code() {
        VifCode::Any | VifCode::ManufacturerSpecific => true,
        _ => StandardUnits.resolve(&vib.code()).is_some(),
    };
    record.value = if supported {
        canonical(dif, record.lvar, raw, interpret(dif, &vib, record.lvar, raw))
    } else {
        DataValue::Raw(raw.to_vec())
    };
    record.vib = Some(vib);

    Ok(Parsed {
        rest,
        record,
        supported,
    })
}

/// Decodes exactly one record, skipping leading idle filler.
///
/// Records whose DIF or VIF lies outside the generic tables fail with
/// `MBusError::UnsupportedRecord`; `decode_data_block` keeps them as opaque
/// values instead.
pub fn decode_record(input: &[u8]) -> Result<(&[u8], DataRecord), MBusError> {
    let fill = input
        .iter()
        .take_while(|&&b| b == MBUS_DIB_DIF_IDLE_FILLER)
        .count();
    if fill == input.len() {
        return Err(MBusError::PrematureEndAtData);
    }
    let parsed = parse_record(&input[fill..], fill)?;
    if !parsed.supported {
        return Err(unsupported(parsed.record.dib.dif, &parsed.record.vib));
    }
    Ok((parsed.rest, parsed.record))
}

/// Records of one data block plus the idle filler at its end.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DataBlock {
    pub records: Vec<DataRecord>,
    pub trailing_idle_fill: usize,
}

/// Decodes all records of a variable data block.
pub fn decode_data_block(input: &[u8]) -> Result<DataBlock, MBusError> {
    let mut block = DataBlock::default();
    let mut rest = input;
    loop {
        let fill = rest
            .iter()
            .take_while(|&&b| b == MBUS_DIB_DIF_IDLE_FILLER)
            .count();
        rest = &rest[fill..];
        if rest.is_empty() {
            block.trailing_idle_fill = fill;
            return Ok(block);
        }
        let parsed = parse_record(rest, fill)?;
        if !parsed.supported {
            warn!(
                "{}; keeping record value opaque",
                unsupported(parsed.record.dib.dif, &parsed.record.vib)
            );
        }
        block.records.push(parsed.record);
        rest = parsed.rest;
    }
}

/// Encodes records and trailing filler back into a data block.
pub fn encode_data_block(records: &[DataRecord], trailing_idle_fill: usize) -> Result<Vec<u8>, MBusError> {
    let mut out = Vec::new();
    for record in records {
        record.encode_into(&mut out)?;
    }
    out.extend(std::iter::repeat(MBUS_DIB_DIF_IDLE_FILLER).take(trailing_idle_fill));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(record: &DataRecord) -> Vec<u8> {
        let mut out = Vec::new();
        record.encode_into(&mut out).unwrap();
        out
    }

    #[test]
    fn bcd_energy_record() {
        let (rest, record) = decode_record(&[0x0C, 0x06, 0x27, 0x04, 0x85, 0x02, 0xFF]).unwrap();
        assert_eq!(rest, &[0xFF]);
        assert_eq!(record.value, DataValue::Bcd(2850427));
        let info = record.value_info().unwrap();
        assert_eq!((info.quantity, info.unit, info.exponent), ("Energy", "Wh", 3));
        assert_eq!(record.scaled_value(), Some(2_850_427_000.0));
    }

    #[test]
    fn dife_chain_storage_tariff_subunit() {
        // DIF storage bit set, DIFE: storage 0x3, tariff 0x1, subunit 1, then DIFE storage 0x1
        let bytes = [0xC4, 0xD3, 0x01, 0x13, 0x10, 0x00, 0x00, 0x00];
        let (_, record) = decode_record(&bytes).unwrap();
        assert_eq!(record.storage_number(), 1 | (0x3 << 1) | (0x1 << 5));
        assert_eq!(record.tariff(), 1);
        assert_eq!(record.subunit(), 1);
        assert_eq!(record.function(), RecordFunction::Instantaneous);
        assert_eq!(record.value, DataValue::Integer(16));
        assert_eq!(encode(&record), bytes.to_vec());
    }

    #[test]
    fn invalid_bcd_becomes_raw() {
        let bytes = [0x3C, 0x2B, 0xBD, 0xEB, 0xDD, 0xDD];
        let (_, record) = decode_record(&bytes).unwrap();
        assert_eq!(record.function(), RecordFunction::DuringError);
        assert_eq!(record.value, DataValue::Raw(vec![0xBD, 0xEB, 0xDD, 0xDD]));
        assert_eq!(encode(&record), bytes.to_vec());
    }

    #[test]
    fn date_time_with_invalid_flag_stays_raw() {
        let bytes = [0x04, 0x6D, 0x89, 0x0D, 0xCD, 0x13];
        let (_, record) = decode_record(&bytes).unwrap();
        assert_eq!(record.value, DataValue::Raw(vec![0x89, 0x0D, 0xCD, 0x13]));
    }

    #[test]
    fn type_g_date_record() {
        let (_, record) = decode_record(&[0x42, 0x6C, 0xBF, 0x15]).unwrap();
        assert_eq!(record.storage_number(), 1);
        assert_eq!(
            record.value,
            DataValue::Date(NaiveDate::from_ymd_opt(2013, 5, 31).unwrap())
        );
    }

    #[test]
    fn lvar_text_and_bcd() {
        let bytes = [0x0D, 0x78, 0x03, b'C', b'B', b'A'];
        let (_, record) = decode_record(&bytes).unwrap();
        assert_eq!(record.value, DataValue::Text("ABC".into()));
        assert_eq!(encode(&record), bytes.to_vec());

        let bytes = [0x0D, 0x13, 0xD2, 0x34, 0x12];
        let (_, record) = decode_record(&bytes).unwrap();
        assert_eq!(record.value, DataValue::Bcd(-1234));
        assert_eq!(encode(&record), bytes.to_vec());
    }

    #[test]
    fn lvar_long_binary_is_raw() {
        let mut bytes = vec![0x0D, 0x13, 0xF0];
        bytes.extend(0u8..16);
        let (rest, record) = decode_record(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(record.value, DataValue::Raw((0u8..16).collect()));
    }

    #[test]
    fn unknown_vif_is_unsupported() {
        let err = decode_record(&[0x01, 0x6F, 0x05]).unwrap_err();
        assert_eq!(
            err,
            MBusError::UnsupportedRecord {
                dif: 0x01,
                vif: Some(0x6F)
            }
        );
        let block = decode_data_block(&[0x01, 0x6F, 0x05, 0x01, 0x13, 0x07]).unwrap();
        assert_eq!(block.records.len(), 2);
        assert_eq!(block.records[0].value, DataValue::Raw(vec![0x05]));
        assert_eq!(block.records[1].value, DataValue::Integer(7));
    }

    #[test]
    fn reserved_special_dif_consumes_block() {
        assert!(matches!(
            decode_record(&[0x3F, 0x01, 0x02]),
            Err(MBusError::UnsupportedRecord { dif: 0x3F, vif: None })
        ));
        let block = decode_data_block(&[0x01, 0x13, 0x07, 0x3F, 0x01, 0x02]).unwrap();
        assert_eq!(block.records.len(), 2);
        assert_eq!(block.records[1].value, DataValue::Raw(vec![0x01, 0x02]));
    }

    #[test]
    fn manufacturer_specific_vif_is_opaque_without_error() {
        let (_, record) = decode_record(&[0x02, 0xFF, 0x01, 0x34, 0x12]).unwrap();
        assert!(record.is_manufacturer_specific());
        assert_eq!(record.value, DataValue::Integer(0x1234));
        assert!(record.value_info().is_none());
    }

    #[test]
    fn built_record_encodes_dife_and_vife() {
        let record = DataRecord::new(0x84, 0x93, DataValue::Integer(1000))
            .with_dife(&[0x10])
            .with_vife(&[0x7D]);
        assert_eq!(record.tariff(), 1);
        assert_eq!(record.vif_code(), Some(VifCode::Primary(0x13)));

        let bytes = encode(&record);
        assert_eq!(bytes, vec![0x84, 0x10, 0x93, 0x7D, 0xE8, 0x03, 0x00, 0x00]);
        let (rest, decoded) = decode_record(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded.tariff(), 1);
        assert_eq!(decoded.value, DataValue::Integer(1000));
    }

    #[test]
    fn more_records_follow_marker() {
        let block = decode_data_block(&[0x04, 0x13, 0xE8, 0x03, 0x00, 0x00, 0x1F]).unwrap();
        assert_eq!(block.records.len(), 2);
        assert!(block.records[1].more_records_follow());
        assert_eq!(block.records[1].value, DataValue::ManufacturerSpecific(vec![]));
    }

    #[test]
    fn idle_filler_positions_survive() {
        let bytes = [0x2F, 0x01, 0x13, 0x07, 0x2F, 0x2F];
        let block = decode_data_block(&bytes).unwrap();
        assert_eq!(block.records.len(), 1);
        assert_eq!(block.records[0].idle_fill, 1);
        assert_eq!(block.trailing_idle_fill, 2);
        assert_eq!(
            encode_data_block(&block.records, block.trailing_idle_fill).unwrap(),
            bytes.to_vec()
        );
    }

    #[test]
    fn truncated_record() {
        assert_eq!(
            decode_record(&[0x04, 0x13, 0x01]).unwrap_err(),
            MBusError::PrematureEndAtData
        );
    }

    #[test]
    fn encoding_rejects_mismatched_values() {
        let record = DataRecord::new(0x02, 0x13, DataValue::Real(1.0));
        let mut out = Vec::new();
        assert_eq!(
            record.encode_into(&mut out),
            Err(MBusError::Encoding(EncodingError::ValueTypeMismatch { dif: 0x02 }))
        );
        let record = DataRecord::new(0x01, 0x13, DataValue::Integer(1000));
        assert_eq!(
            record.encode_into(&mut out),
            Err(MBusError::Encoding(EncodingError::ValueOutOfRange { dif: 0x01 }))
        );
    }

    #[test]
    fn builder_derives_lvar() {
        let record = DataRecord::new(0x0D, 0x13, DataValue::Bcd(-12345));
        assert_eq!(encode(&record), vec![0x0D, 0x13, 0xD3, 0x45, 0x23, 0x01]);
    }
}
