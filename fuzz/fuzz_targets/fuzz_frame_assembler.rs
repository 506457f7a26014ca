//! Fuzz target: `FrameAssembler::on_bytes`
//!
//! The first input byte picks the chunk size; the rest is fed as a
//! notification stream.  Asserts that no frame is empty or larger than the
//! buffer, that every frame starts with the marker, and that the result is
//! the same as feeding the stream in one piece.
//!
//! cargo fuzz run fuzz_frame_assembler

#![no_main]

use bmslink::config::Role;
use bmslink::protocol::FrameAssembler;
use bmslink::protocol::frame::FrameFormat;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(split).max(1);
    let format = FrameFormat::battery_monitor();

    let mut whole = FrameAssembler::new(Role::BatteryMonitor, format);
    let expected = whole.collect(stream);

    let mut pieces = FrameAssembler::new(Role::BatteryMonitor, format);
    let mut got = Vec::new();
    for c in stream.chunks(chunk) {
        got.extend(pieces.collect(c));
    }

    assert_eq!(got, expected, "chunking changed the frame sequence");
    for frame in &got {
        assert!(!frame.is_empty());
        assert!(frame.len() <= format.capacity);
        assert_eq!(frame.payload()[0], format.start_marker);
    }

    pieces.reset();
    let _ = pieces.collect(stream);
});
