use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mbus_master::mbus::parser::{decode_frame, PacketParser};
use mbus_master::payload::record::decode_data_block;
use mbus_master::util::decode_hex;

const EXAMPLE_DATA_01_HEX: &str = "6831316808017245585703B40534049E0027B60306F934150315C6004D052E00000000053D00000000055B22F32642055FC7DA0D42FA16";

const ELS_ELSTER_HEX: &str = "686868680800725139494493152F04A17000000C06000000008C1006000000008C2013000000000C13000000003C2BBDEBDDDD3B3BBDEBDD0A5A27020A5E26020A6201000A273007046D090DCD134C06000000004C1300000000CC100600000000CC201300000000426CBF154016";

fn benchmark_parse_frame(c: &mut Criterion) {
    let data = decode_hex(EXAMPLE_DATA_01_HEX).unwrap();

    c.bench_function("decode_frame", |b| {
        b.iter(|| {
            let _ = black_box(decode_frame(black_box(&data)));
        })
    });

    c.bench_function("packet_parser_bytewise", |b| {
        let mut parser = PacketParser::new();
        b.iter(|| {
            for &byte in black_box(&data) {
                if parser.add_byte(byte) {
                    black_box(parser.take_frame());
                }
            }
        })
    });
}

fn benchmark_records(c: &mut Criterion) {
    let frame = decode_hex(ELS_ELSTER_HEX).unwrap();
    // Data block after the 7 header bytes of the frame and the 12-byte
    // variable data header; the trailing checksum and stop byte are dropped.
    let block = &frame[19..frame.len() - 2];

    c.bench_function("decode_data_block", |b| {
        b.iter(|| {
            let _ = black_box(decode_data_block(black_box(block)));
        })
    });
}

fn benchmark_encode(c: &mut Criterion) {
    let data = decode_hex(ELS_ELSTER_HEX).unwrap();
    let frame = decode_frame(&data).unwrap();

    c.bench_function("encode_frame", |b| {
        b.iter(|| {
            let _ = black_box(black_box(&frame).to_bytes());
        })
    });
}

criterion_group!(benches, benchmark_parse_frame, benchmark_records, benchmark_encode);
criterion_main!(benches);
