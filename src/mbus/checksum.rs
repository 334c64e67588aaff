//! Checksum and framing-marker validation shared by the parser and encoder.

use crate::constants::*;
use crate::error::FramingError;

/// Modulo-256 sum of all bytes.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checks `expected` against the checksum of `bytes`.
pub fn verify_checksum(expected: u8, bytes: &[u8]) -> Result<(), FramingError> {
    let calculated = checksum(bytes);
    if calculated == expected {
        Ok(())
    } else {
        Err(FramingError::ChecksumMismatch {
            expected,
            calculated,
        })
    }
}

/// Validates start and stop bytes and, for control and long frames, the
/// repeated length field.
pub fn validate_markers(start: u8, stop: u8, lengths: Option<(u8, u8)>) -> Result<(), FramingError> {
    if start != MBUS_FRAME_SHORT_START && start != MBUS_FRAME_LONG_START {
        return Err(FramingError::InvalidStart(start));
    }
    if stop != MBUS_FRAME_STOP {
        return Err(FramingError::InvalidStop(stop));
    }
    match lengths {
        Some((first, second)) if first != second => {
            Err(FramingError::LengthMismatch { first, second })
        }
        Some((first, _)) if first < MBUS_FRAME_CONTROL_LENGTH => {
            Err(FramingError::InvalidLength(first))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[0x7B, 0x05]), 0x80);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0x00);
    }

    #[test]
    fn verify_reports_both_values() {
        assert_eq!(
            verify_checksum(0x81, &[0x7B, 0x05]),
            Err(FramingError::ChecksumMismatch {
                expected: 0x81,
                calculated: 0x80
            })
        );
    }

    #[test]
    fn markers() {
        assert!(validate_markers(0x10, 0x16, None).is_ok());
        assert!(validate_markers(0x68, 0x16, Some((0x31, 0x31))).is_ok());
        assert_eq!(
            validate_markers(0x68, 0x16, Some((0x31, 0x32))),
            Err(FramingError::LengthMismatch {
                first: 0x31,
                second: 0x32
            })
        );
        assert_eq!(
            validate_markers(0x68, 0x17, None),
            Err(FramingError::InvalidStop(0x17))
        );
        assert_eq!(
            validate_markers(0x11, 0x16, None),
            Err(FramingError::InvalidStart(0x11))
        );
        assert_eq!(
            validate_markers(0x68, 0x16, Some((0x02, 0x02))),
            Err(FramingError::InvalidLength(0x02))
        );
    }
}
