//! Fuzz target: `CommandEncoder::decode`
//!
//! Arbitrary bytes must never panic the parser, and anything it accepts
//! must re-encode to the same bytes.
//!
//! cargo fuzz run fuzz_packet_decode

#![no_main]

use bmslink::protocol::encoder::CommandEncoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let enc = CommandEncoder::new();
    if let Ok(parsed) = enc.decode(data) {
        let packet = enc
            .encode_parts(parsed.opcode, parsed.body)
            .expect("decoded body always fits");
        assert_eq!(packet.as_slice(), data);
    }
});
