#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_master::mbus::parser::PacketParser;

fuzz_target!(|data: &[u8]| {
    let mut parser = PacketParser::new();
    for frame in parser.add_bytes(data) {
        // Anything the parser accepts encodes again and parses back to the
        // same bytes.
        let bytes = frame.to_bytes().expect("accepted frame must encode");
        let mut again = PacketParser::new();
        let reparsed = again.add_bytes(&bytes);
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].to_bytes().ok(), Some(bytes));
    }
});
