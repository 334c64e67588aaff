//! # M-Bus Data Encoding and Decoding
//!
//! This module provides functions for encoding and decoding the value types
//! carried by M-Bus data records: BCD, little-endian integers, 32-bit reals,
//! the compound date types G (CP16) and F (CP32), and reversed Latin-1 text.
//!
//! Every decoder has an encoder that reproduces the exact wire bytes. Decoders
//! return `None` when the bytes have no typed interpretation (for example a
//! BCD field containing the nibble `0xB`); callers keep such values opaque.

use crate::error::EncodingError;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use nom::{number::complete::le_u16, IResult};

/// Decodes a little-endian BCD field where every nibble is a digit.
pub fn decode_bcd_digits(input: &[u8]) -> Option<u64> {
    input.iter().rev().try_fold(0u64, |acc, &byte| {
        let (hi, lo) = (byte >> 4, byte & 0x0F);
        if hi > 9 || lo > 9 {
            return None;
        }
        acc.checked_mul(100)?.checked_add(u64::from(hi * 10 + lo))
    })
}

/// Decodes a signed BCD field. A high nibble of `0xF` in the last byte marks
/// a negative value and carries no digit.
pub fn decode_bcd(input: &[u8]) -> Option<i64> {
    let (&last, rest) = input.split_last()?;
    if last >> 4 == 0x0F {
        let mut digits = rest.to_vec();
        digits.push(last & 0x0F);
        let magnitude = decode_bcd_digits(&digits)?;
        i64::try_from(magnitude).ok().map(|v| -v)
    } else {
        decode_bcd_digits(input).and_then(|v| i64::try_from(v).ok())
    }
}

/// Encodes an unsigned value as `len` bytes of little-endian BCD.
pub fn encode_bcd_digits(mut value: u64, len: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        let lo = (value % 10) as u8;
        value /= 10;
        let hi = (value % 10) as u8;
        value /= 10;
        out.push((hi << 4) | lo);
    }
    (value == 0).then_some(out)
}

/// Encodes a signed value as `len` bytes of BCD, using the `0xF` sign nibble
/// for negative values.
pub fn encode_bcd(value: i64, len: usize, dif: u8) -> Result<Vec<u8>, EncodingError> {
    let out_of_range = EncodingError::ValueOutOfRange { dif };
    if len == 0 {
        return Err(out_of_range);
    }
    if value >= 0 {
        return encode_bcd_digits(value.unsigned_abs(), len).ok_or(out_of_range);
    }
    let mut out = encode_bcd_digits(value.unsigned_abs(), len).ok_or(out_of_range.clone())?;
    let last = out.len() - 1;
    if out[last] >> 4 != 0 {
        return Err(out_of_range);
    }
    out[last] |= 0xF0;
    Ok(out)
}

/// Decodes a little-endian two's complement integer of 1 to 8 bytes.
pub fn decode_int(input: &[u8]) -> Option<i64> {
    if input.is_empty() || input.len() > 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf[..input.len()].copy_from_slice(input);
    let shift = 64 - 8 * input.len() as u32;
    Some(i64::from_le_bytes(buf).wrapping_shl(shift).wrapping_shr(shift))
}

/// Encodes an integer into `len` little-endian bytes. Values are accepted in
/// the signed range of the field and, for convenience, in its unsigned range.
pub fn encode_int(value: i64, len: usize, dif: u8) -> Result<Vec<u8>, EncodingError> {
    if len == 0 || len > 8 {
        return Err(EncodingError::ValueTypeMismatch { dif });
    }
    if len < 8 {
        let bits = 8 * len as u32;
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << bits) - 1;
        if value < min || value > max {
            return Err(EncodingError::ValueOutOfRange { dif });
        }
    }
    Ok(value.to_le_bytes()[..len].to_vec())
}

pub fn decode_real(input: &[u8]) -> Option<f32> {
    let bytes: [u8; 4] = input.try_into().ok()?;
    Some(f32::from_le_bytes(bytes))
}

pub fn encode_real(value: f32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

fn century_year(two_digit: u8) -> i32 {
    if two_digit < 81 {
        2000 + i32::from(two_digit)
    } else {
        1900 + i32::from(two_digit)
    }
}

fn two_digit_year(year: i32) -> Option<u8> {
    match year {
        1981..=1999 => Some((year - 1900) as u8),
        2000..=2080 => Some((year - 2000) as u8),
        _ => None,
    }
}

fn parse_date_g(input: &[u8]) -> IResult<&[u8], u16> {
    le_u16(input)
}

/// Decodes a type G (CP16) date.
pub fn decode_date_g(input: &[u8]) -> Option<NaiveDate> {
    if input.len() != 2 {
        return None;
    }
    let (_, raw) = parse_date_g(input).ok()?;
    let [b0, b1] = raw.to_le_bytes();
    let day = u32::from(b0 & 0x1F);
    let month = u32::from(b1 & 0x0F);
    let year = ((b0 & 0xE0) >> 5) | ((b1 & 0xF0) >> 1);
    NaiveDate::from_ymd_opt(century_year(year), month, day)
}

pub fn encode_date_g(date: NaiveDate, dif: u8) -> Result<Vec<u8>, EncodingError> {
    let year = two_digit_year(date.year()).ok_or(EncodingError::ValueOutOfRange { dif })?;
    let b0 = (date.day() as u8) | ((year & 0x07) << 5);
    let b1 = (date.month() as u8) | ((year & 0x78) << 1);
    Ok(vec![b0, b1])
}

/// Decodes a type F (CP32) date and time. The invalid and summer-time flags
/// and the hundred-year bits are not represented; a field that uses them does
/// not re-encode to the same bytes and is kept opaque by the record decoder.
pub fn decode_date_time_f(input: &[u8]) -> Option<NaiveDateTime> {
    let [b0, b1, b2, b3]: [u8; 4] = input.try_into().ok()?;
    let minute = u32::from(b0 & 0x3F);
    let hour = u32::from(b1 & 0x1F);
    let day = u32::from(b2 & 0x1F);
    let month = u32::from(b3 & 0x0F);
    let year = ((b2 & 0xE0) >> 5) | ((b3 & 0xF0) >> 1);
    NaiveDate::from_ymd_opt(century_year(year), month, day)?.and_hms_opt(hour, minute, 0)
}

pub fn encode_date_time_f(value: NaiveDateTime, dif: u8) -> Result<Vec<u8>, EncodingError> {
    if value.second() != 0 || value.nanosecond() != 0 {
        return Err(EncodingError::ValueOutOfRange { dif });
    }
    let mut out = encode_date_g(value.date(), dif)?;
    out.insert(0, value.hour() as u8);
    out.insert(0, value.minute() as u8);
    Ok(out)
}

/// Decodes a text field: Latin-1 characters transmitted last character first.
pub fn decode_text(input: &[u8]) -> String {
    input.iter().rev().map(|&b| char::from(b)).collect()
}

pub fn encode_text(text: &str) -> Result<Vec<u8>, EncodingError> {
    let mut out = text
        .chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| EncodingError::TextNotLatin1))
        .collect::<Result<Vec<u8>, _>>()?;
    out.reverse();
    Ok(out)
}
