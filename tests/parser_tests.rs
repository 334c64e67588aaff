//! Packet parser behavior on noisy and corrupted byte streams.

use mbus_master::mbus::frame::ControlField;
use mbus_master::mbus::parser::{DecodeState, PacketParser};
use mbus_master::util::decode_hex;
use mbus_master::{FramingError, MBusFrame};
use proptest::prelude::*;

const HEAT_METER_HEX: &str = "6837376808057278563412A73202041A0000000C06270485020C14133282580B2D1200000B3B3401000A5B58000A5F43000A625101046D32175F15A916";

fn heat_meter() -> Vec<u8> {
    decode_hex(HEAT_METER_HEX).unwrap()
}

fn feed_all(parser: &mut PacketParser, bytes: &[u8]) -> Vec<MBusFrame> {
    let mut frames = Vec::new();
    for &byte in bytes {
        if parser.add_byte(byte) {
            frames.push(parser.take_frame().unwrap());
        }
    }
    frames
}

fn noise() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        any::<u8>().prop_filter("not a start byte", |b| ![0x10, 0x68, 0xE5].contains(b)),
        0..64,
    )
}

proptest! {
    #[test]
    fn frame_after_noise_is_found(prefix in noise(), suffix in noise()) {
        let frame = heat_meter();
        let mut stream = prefix.clone();
        stream.extend_from_slice(&frame);
        stream.extend_from_slice(&suffix);

        let mut parser = PacketParser::new();
        let frames = feed_all(&mut parser, &stream);
        prop_assert_eq!(frames.len(), 1);
        prop_assert_eq!(frames[0].to_bytes().unwrap(), frame);
        prop_assert_eq!(parser.skipped_bytes(), prefix.len() + suffix.len());
        prop_assert_eq!(parser.last_error(), None);
    }

    #[test]
    fn arbitrary_input_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
        let mut parser = PacketParser::new();
        for frame in parser.add_bytes(&bytes) {
            // Every frame the parser accepts can be written back out.
            prop_assert!(frame.to_bytes().is_ok());
        }
    }

    #[test]
    fn short_frames_survive_leading_long_start(control in any::<u8>(), address in any::<u8>()) {
        // 0x68 0x10 0x10 0x68 would be a valid long frame header.
        prop_assume!(control != 0x10);
        let checksum = control.wrapping_add(address);
        let mut stream = vec![0x68];
        stream.extend_from_slice(&[0x10, control, address, checksum, 0x16]);

        let mut parser = PacketParser::new();
        let frames = feed_all(&mut parser, &stream);
        let expected = MBusFrame::Short {
            control: ControlField(control),
            address,
        };
        prop_assert!(frames.contains(&expected), "frames: {:?}", frames);
    }
}

#[test]
fn lone_long_start_before_frame() {
    let mut stream = vec![0x68];
    stream.extend(heat_meter());
    let mut parser = PacketParser::new();
    let frames = feed_all(&mut parser, &stream);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].user_data().is_some());
    assert!(matches!(
        parser.last_error(),
        Some(FramingError::LengthMismatch { first: 0x68, .. })
    ));
}

#[test]
fn corrupted_checksum_then_retransmission() {
    let good = heat_meter();
    let mut bad = good.clone();
    let cs = bad.len() - 2;
    bad[cs] ^= 0xFF;

    let mut parser = PacketParser::new();
    assert!(feed_all(&mut parser, &bad).is_empty());
    assert!(matches!(
        parser.take_error(),
        Some(FramingError::ChecksumMismatch { .. })
    ));
    assert_eq!(parser.state(), DecodeState::ExpectStart);

    let frames = feed_all(&mut parser, &good);
    assert_eq!(frames.len(), 1);
    assert_eq!(parser.take_error(), None);
}

#[test]
fn length_bytes_must_match() {
    let mut bytes = heat_meter();
    bytes[2] = 0x38;
    let mut parser = PacketParser::new();
    assert!(feed_all(&mut parser, &bytes[..3]).is_empty());
    assert_eq!(
        parser.take_error(),
        Some(FramingError::LengthMismatch {
            first: 0x37,
            second: 0x38
        })
    );
    assert!(feed_all(&mut parser, &bytes[3..]).is_empty());
    assert!(parser.framing_errors() >= 2);
}

#[test]
fn back_to_back_frames() {
    let mut stream = vec![0xE5];
    stream.extend(heat_meter());
    stream.extend([0x10, 0x40, 0x05, 0x45, 0x16]);
    let mut parser = PacketParser::new();
    let frames = parser.add_bytes(&stream);
    assert_eq!(frames.len(), 3);
    assert!(frames[0].is_ack());
    assert_eq!(frames[2].address(), Some(5));
}
