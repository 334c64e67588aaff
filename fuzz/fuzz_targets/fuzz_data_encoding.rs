#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_master::payload::data_encoding::{decode_bcd, decode_date_time_f, decode_int, decode_real};
use mbus_master::payload::record::{decode_data_block, encode_data_block};

fuzz_target!(|data: &[u8]| {
    for len in 1..=8.min(data.len()) {
        let _ = decode_bcd(&data[..len]);
        let _ = decode_int(&data[..len]);
    }
    if data.len() >= 4 {
        let _ = decode_real(&data[..4]);
        let _ = decode_date_time_f(&data[..4]);
    }

    if let Ok(block) = decode_data_block(data) {
        let _ = encode_data_block(&block.records, block.trailing_idle_fill);
    }
});
