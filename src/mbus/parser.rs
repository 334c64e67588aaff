//! # Packet Parser
//!
//! An incremental, byte-at-a-time M-Bus frame recognizer. The parser never
//! blocks and never fails: bytes are pushed with [`PacketParser::add_byte`],
//! which reports whether a frame has just been completed.
//!
//! Bytes that cannot start a frame are line noise and are skipped. A
//! violation inside a frame (length bytes that differ, a missing second start
//! byte, a wrong checksum or stop byte) is recorded as the last error and the
//! partial frame is dropped. When the violation is found in a frame header or
//! in a short frame, the bytes after the false start byte are scanned again so
//! that a real frame hidden behind a stray `0x10` or `0x68` is not lost.
//!
//! ```rust
//! use mbus_master::mbus::parser::PacketParser;
//! use mbus_master::mbus::frame::MBusFrame;
//!
//! let mut parser = PacketParser::new();
//! let mut ready = false;
//! for byte in [0x00, 0x10, 0x40, 0x01, 0x41, 0x16] {
//!     ready = parser.add_byte(byte);
//! }
//! assert!(ready);
//! assert!(matches!(parser.take_frame(), Some(MBusFrame::Short { address: 0x01, .. })));
//! ```

use crate::constants::*;
use crate::error::{FramingError, MBusError};
use crate::mbus::frame::{ControlField, MBusFrame};
use log::{debug, trace};
use std::collections::VecDeque;

/// Position of the parser inside the frame grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    ExpectStart,
    ExpectLength,
    ExpectLengthRepeat,
    ExpectSecondStart,
    ExpectControl,
    ExpectAddress,
    ExpectControlInfo,
    ExpectData { remaining: usize },
    ExpectChecksum,
    ExpectStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Short,
    Long,
}

/// Incremental frame decoder.
#[derive(Debug)]
pub struct PacketParser {
    state: DecodeState,
    family: Family,
    buffer: Vec<u8>,
    length: u8,
    sum: u8,
    frame: Option<MBusFrame>,
    last_error: Option<FramingError>,
    backlog: VecDeque<u8>,
    skipped: usize,
    frames: u64,
    errors: u64,
}

impl Default for PacketParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketParser {
    pub fn new() -> Self {
        Self {
            state: DecodeState::ExpectStart,
            family: Family::Short,
            buffer: Vec::with_capacity(MBUS_FRAME_LENGTH_MAX),
            length: 0,
            sum: 0,
            frame: None,
            last_error: None,
            backlog: VecDeque::new(),
            skipped: 0,
            frames: 0,
            errors: 0,
        }
    }

    /// Feeds one byte. Returns true when a frame has been completed; it can be
    /// read with [`frame`](Self::frame) or [`take_frame`](Self::take_frame)
    /// until the next byte is added.
    pub fn add_byte(&mut self, byte: u8) -> bool {
        self.frame = None;
        self.backlog.push_back(byte);
        while let Some(next) = self.backlog.pop_front() {
            if self.step(next) {
                return true;
            }
        }
        false
    }

    /// Feeds a buffer and returns every frame completed on the way.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Vec<MBusFrame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            if self.add_byte(byte) {
                frames.extend(self.take_frame());
            }
        }
        while let Some(next) = self.backlog.pop_front() {
            if self.step(next) {
                frames.extend(self.take_frame());
            }
        }
        frames
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// The frame completed by the last byte, if any.
    pub fn frame(&self) -> Option<&MBusFrame> {
        match self.state {
            DecodeState::ExpectStart => self.frame.as_ref(),
            _ => None,
        }
    }

    pub fn take_frame(&mut self) -> Option<MBusFrame> {
        match self.state {
            DecodeState::ExpectStart => self.frame.take(),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<FramingError> {
        self.last_error
    }

    pub fn take_error(&mut self) -> Option<FramingError> {
        self.last_error.take()
    }

    /// Bytes that were skipped while looking for a start byte.
    pub fn skipped_bytes(&self) -> usize {
        self.skipped
    }

    /// Bytes queued for re-scanning behind a frame that completed during
    /// resynchronization. They are processed by the next `add_byte`.
    pub fn pending_bytes(&self) -> usize {
        self.backlog.len()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames
    }

    pub fn framing_errors(&self) -> u64 {
        self.errors
    }

    /// Drops all partial state, queued bytes and the last error.
    pub fn reset(&mut self) {
        self.state = DecodeState::ExpectStart;
        self.buffer.clear();
        self.frame = None;
        self.last_error = None;
        self.backlog.clear();
    }

    fn begin(&mut self, family: Family, byte: u8, next: DecodeState) {
        self.family = family;
        self.buffer.clear();
        self.buffer.push(byte);
        self.sum = 0;
        self.state = next;
    }

    fn step(&mut self, byte: u8) -> bool {
        if self.state == DecodeState::ExpectStart {
            match byte {
                MBUS_FRAME_ACK => return self.complete(MBusFrame::SingleCharacter),
                MBUS_FRAME_SHORT_START => {
                    self.begin(Family::Short, byte, DecodeState::ExpectControl)
                }
                MBUS_FRAME_LONG_START => self.begin(Family::Long, byte, DecodeState::ExpectLength),
                _ => {
                    trace!("skipping noise byte 0x{byte:02X}");
                    self.skipped += 1;
                }
            }
            return false;
        }

        self.buffer.push(byte);
        match self.state {
            DecodeState::ExpectStart => {}
            DecodeState::ExpectLength => {
                if byte < MBUS_FRAME_CONTROL_LENGTH {
                    self.fail(FramingError::InvalidLength(byte), true);
                } else {
                    self.length = byte;
                    self.state = DecodeState::ExpectLengthRepeat;
                }
            }
            DecodeState::ExpectLengthRepeat => {
                if byte != self.length {
                    self.fail(
                        FramingError::LengthMismatch {
                            first: self.length,
                            second: byte,
                        },
                        true,
                    );
                } else {
                    self.state = DecodeState::ExpectSecondStart;
                }
            }
            DecodeState::ExpectSecondStart => {
                if byte != MBUS_FRAME_LONG_START {
                    self.fail(FramingError::MissingSecondStart(byte), true);
                } else {
                    self.state = DecodeState::ExpectControl;
                }
            }
            DecodeState::ExpectControl => {
                self.sum = byte;
                self.state = DecodeState::ExpectAddress;
            }
            DecodeState::ExpectAddress => {
                self.sum = self.sum.wrapping_add(byte);
                self.state = match self.family {
                    Family::Short => DecodeState::ExpectChecksum,
                    Family::Long => DecodeState::ExpectControlInfo,
                };
            }
            DecodeState::ExpectControlInfo => {
                self.sum = self.sum.wrapping_add(byte);
                let remaining = usize::from(self.length - MBUS_FRAME_CONTROL_LENGTH);
                self.state = if remaining == 0 {
                    DecodeState::ExpectChecksum
                } else {
                    DecodeState::ExpectData { remaining }
                };
            }
            DecodeState::ExpectData { remaining } => {
                self.sum = self.sum.wrapping_add(byte);
                self.state = if remaining == 1 {
                    DecodeState::ExpectChecksum
                } else {
                    DecodeState::ExpectData {
                        remaining: remaining - 1,
                    }
                };
            }
            DecodeState::ExpectChecksum => {
                if byte != self.sum {
                    let err = FramingError::ChecksumMismatch {
                        expected: byte,
                        calculated: self.sum,
                    };
                    self.fail(err, self.family == Family::Short);
                } else {
                    self.state = DecodeState::ExpectStop;
                }
            }
            DecodeState::ExpectStop => {
                if byte != MBUS_FRAME_STOP {
                    self.fail(FramingError::InvalidStop(byte), self.family == Family::Short);
                } else {
                    let frame = self.build();
                    return self.complete(frame);
                }
            }
        }
        false
    }

    fn build(&self) -> MBusFrame {
        let b = &self.buffer;
        match self.family {
            Family::Short => MBusFrame::Short {
                control: ControlField(b[1]),
                address: b[2],
            },
            Family::Long if self.length == MBUS_FRAME_CONTROL_LENGTH => MBusFrame::Control {
                control: ControlField(b[4]),
                address: b[5],
                control_information: b[6],
            },
            Family::Long => {
                let end = 4 + usize::from(self.length);
                MBusFrame::long(ControlField(b[4]), b[5], b[6], &b[7..end])
            }
        }
    }

    fn complete(&mut self, frame: MBusFrame) -> bool {
        trace!("frame complete: {:?}", frame.frame_type());
        self.frames += 1;
        self.buffer.clear();
        self.state = DecodeState::ExpectStart;
        self.frame = Some(frame);
        true
    }

    fn fail(&mut self, err: FramingError, rescan: bool) {
        debug!("framing error: {err}; discarding {} bytes", self.buffer.len());
        self.errors += 1;
        self.last_error = Some(err);
        self.state = DecodeState::ExpectStart;
        if rescan {
            for &byte in self.buffer[1..].iter().rev() {
                self.backlog.push_front(byte);
            }
        }
        self.buffer.clear();
    }
}

/// Decodes a buffer holding exactly one frame.
pub fn decode_frame(bytes: &[u8]) -> Result<MBusFrame, MBusError> {
    let mut parser = PacketParser::new();
    for (i, &byte) in bytes.iter().enumerate() {
        if parser.add_byte(byte) {
            if i + 1 != bytes.len() || parser.pending_bytes() != 0 {
                return Err(MBusError::FrameParseError(
                    "trailing bytes after frame".into(),
                ));
            }
            return parser
                .take_frame()
                .ok_or_else(|| MBusError::Other("completed frame missing".into()));
        }
    }
    Err(parser
        .take_error()
        .map(MBusError::from)
        .unwrap_or(MBusError::PrematureEndAtData))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mbus::frame::LongFrameBody;

    fn feed(parser: &mut PacketParser, bytes: &[u8]) -> Vec<bool> {
        bytes.iter().map(|&b| parser.add_byte(b)).collect()
    }

    #[test]
    fn single_character_completes_immediately() {
        let mut parser = PacketParser::new();
        assert!(parser.add_byte(0xE5));
        assert_eq!(parser.state(), DecodeState::ExpectStart);
        assert_eq!(parser.take_frame(), Some(MBusFrame::SingleCharacter));
        assert_eq!(parser.take_frame(), None);
    }

    #[test]
    fn short_frame_states() {
        let mut parser = PacketParser::new();
        parser.add_byte(0x10);
        assert_eq!(parser.state(), DecodeState::ExpectControl);
        parser.add_byte(0x5B);
        assert_eq!(parser.state(), DecodeState::ExpectAddress);
        parser.add_byte(0x01);
        assert_eq!(parser.state(), DecodeState::ExpectChecksum);
        parser.add_byte(0x5C);
        assert_eq!(parser.state(), DecodeState::ExpectStop);
        assert!(parser.frame().is_none());
        assert!(parser.add_byte(0x16));
        assert_eq!(
            parser.frame(),
            Some(&MBusFrame::Short {
                control: ControlField(0x5B),
                address: 0x01
            })
        );
    }

    #[test]
    fn long_frame_states() {
        let mut parser = PacketParser::new();
        let bytes = [0x68, 0x04, 0x04, 0x68, 0x08, 0x01, 0x70, 0x08, 0x81, 0x16];
        let expected = [
            DecodeState::ExpectLength,
            DecodeState::ExpectLengthRepeat,
            DecodeState::ExpectSecondStart,
            DecodeState::ExpectControl,
            DecodeState::ExpectAddress,
            DecodeState::ExpectControlInfo,
            DecodeState::ExpectData { remaining: 1 },
            DecodeState::ExpectChecksum,
            DecodeState::ExpectStop,
            DecodeState::ExpectStart,
        ];
        for (byte, state) in bytes.iter().zip(expected) {
            parser.add_byte(*byte);
            assert_eq!(parser.state(), state);
        }
        match parser.take_frame() {
            Some(MBusFrame::Long {
                control_information: 0x70,
                body: LongFrameBody::Raw(data),
                ..
            }) => assert_eq!(data, vec![0x08]),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn control_frame_has_no_data_state() {
        let frame = decode_frame(&[0x68, 0x03, 0x03, 0x68, 0x53, 0xFD, 0x50, 0xA0, 0x16]).unwrap();
        assert_eq!(
            frame,
            MBusFrame::Control {
                control: ControlField(0x53),
                address: 0xFD,
                control_information: 0x50
            }
        );
    }

    #[test]
    fn noise_is_skipped_without_error() {
        let mut parser = PacketParser::new();
        let ready = feed(&mut parser, &[0x00, 0xFF, 0x16, 0x10, 0x40, 0x01, 0x41, 0x16]);
        assert_eq!(ready.iter().filter(|r| **r).count(), 1);
        assert_eq!(parser.skipped_bytes(), 3);
        assert_eq!(parser.last_error(), None);
    }

    #[test]
    fn length_mismatch_rescans_following_bytes() {
        let mut parser = PacketParser::new();
        // A stray 0x68 in front of a short frame.
        let ready = feed(&mut parser, &[0x68, 0x10, 0x5B, 0x01, 0x5C, 0x16]);
        assert_eq!(ready, vec![false, false, false, false, false, true]);
        assert!(matches!(
            parser.take_frame(),
            Some(MBusFrame::Short { address: 0x01, .. })
        ));
        assert_eq!(
            parser.take_error(),
            Some(FramingError::LengthMismatch {
                first: 0x10,
                second: 0x5B
            })
        );
    }

    #[test]
    fn invalid_length_is_reported() {
        let mut parser = PacketParser::new();
        feed(&mut parser, &[0x68, 0x02]);
        assert_eq!(parser.last_error(), Some(FramingError::InvalidLength(0x02)));
        assert_eq!(parser.state(), DecodeState::ExpectStart);
    }

    #[test]
    fn missing_second_start() {
        let mut parser = PacketParser::new();
        feed(&mut parser, &[0x68, 0x04, 0x04, 0x69]);
        assert_eq!(
            parser.last_error(),
            Some(FramingError::MissingSecondStart(0x69))
        );
    }

    #[test]
    fn long_frame_checksum_error_discards_frame() {
        let mut parser = PacketParser::new();
        let ready = feed(
            &mut parser,
            &[0x68, 0x04, 0x04, 0x68, 0x08, 0x01, 0x70, 0x08, 0x82, 0x16],
        );
        assert!(ready.iter().all(|r| !r));
        assert_eq!(
            parser.last_error(),
            Some(FramingError::ChecksumMismatch {
                expected: 0x82,
                calculated: 0x81
            })
        );
        assert_eq!(parser.framing_errors(), 1);
    }

    #[test]
    fn bad_stop_byte() {
        assert_eq!(
            decode_frame(&[0x10, 0x40, 0x01, 0x41, 0x17]),
            Err(MBusError::Framing(FramingError::InvalidStop(0x17)))
        );
    }

    #[test]
    fn ack_hidden_in_broken_short_frame_is_recovered() {
        let mut parser = PacketParser::new();
        // 0x10 noise followed by an acknowledgment. The checksum byte fails
        // the short frame and the rescan completes the 0xE5 on the same call.
        let ready = feed(&mut parser, &[0x10, 0xE5, 0x00, 0x00]);
        assert_eq!(ready, vec![false, false, false, true]);
        assert_eq!(parser.take_frame(), Some(MBusFrame::SingleCharacter));
        assert!(matches!(
            parser.take_error(),
            Some(FramingError::ChecksumMismatch { .. })
        ));

        // The rescanned zeros are noise.
        assert!(!parser.add_byte(0x00));
        assert_eq!(parser.take_frame(), None);
        assert_eq!(parser.state(), DecodeState::ExpectStart);
    }

    #[test]
    fn add_bytes_collects_every_frame() {
        let mut parser = PacketParser::new();
        let frames = parser.add_bytes(&[0xE5, 0x10, 0x40, 0x01, 0x41, 0x16, 0xE5]);
        assert_eq!(frames.len(), 3);
        assert_eq!(parser.frames_decoded(), 3);
    }

    #[test]
    fn decode_frame_rejects_trailing_bytes() {
        assert!(decode_frame(&[0xE5, 0xE5]).is_err());
        assert_eq!(decode_frame(&[0x10, 0x40]), Err(MBusError::PrematureEndAtData));
    }
}
