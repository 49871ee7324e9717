//! Fuzz target: `WireCodec::decode`
//!
//! Drives arbitrary byte sequences through the link frame decoder and
//! asserts that it never panics, never yields an oversized Data payload,
//! and that every decoded frame re-encodes to the bytes it consumed.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use expansion::protocol::codec::{FrameCodec, WireCodec};
use expansion::protocol::{Frame, MAX_PAYLOAD};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut source = data;
    while !source.is_empty() {
        let before = source;
        let Ok(frame) = WireCodec.decode(&mut source) else {
            break;
        };
        if let Frame::Data(payload) = &frame {
            assert!(payload.len() <= MAX_PAYLOAD, "payload exceeds MAX_PAYLOAD");
        }
        let consumed = &before[..before.len() - source.len()];
        assert_eq!(WireCodec.to_bytes(&frame).as_slice(), consumed);
    }
});
