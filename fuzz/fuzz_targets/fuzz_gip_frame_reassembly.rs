//! Fuzzes GIP packet framing and fragment reassembly.
//!
//! The input is cut into packet-sized chunks and every chunk that parses as
//! a frame is fed to a single reassembler, interleaving fragments of
//! different message types the way a confused device would.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_gip_frame_reassembly

#![deny(static_mut_refs)]
#![no_main]

use std::time::{Duration, Instant};

use gamepad_hid_gip_protocol::{FragmentReassembler, parse_frame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let now = Instant::now();
    let mut assembler = FragmentReassembler::new();
    for chunk in data.chunks(64) {
        if let Some(frame) = parse_frame(chunk) {
            let _ = assembler.feed(&frame, now);
        }
        let _ = assembler.in_progress();
    }
    let _ = assembler.expire(now + Duration::from_secs(10));
});
