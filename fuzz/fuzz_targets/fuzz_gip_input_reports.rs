//! Fuzzes the fixed-layout GIP input report decoders.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_gip_input_reports

#![deny(static_mut_refs)]
#![no_main]

use gamepad_hid_gip_protocol::{
    PaddleFormat, parse_device_status, parse_flight_stick, parse_gamepad_axes,
    parse_guide_button, parse_paddles, split_battery_byte,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = parse_gamepad_axes(data);
    let _ = parse_flight_stick(data);
    let _ = parse_device_status(data);
    let _ = parse_guide_button(data);
    if let Some(&byte) = data.first() {
        let _ = split_battery_byte(byte);
        for format in [
            PaddleFormat::Unknown,
            PaddleFormat::Xbe1,
            PaddleFormat::Xbe2Raw,
            PaddleFormat::Xbe2,
        ] {
            let _ = parse_paddles(format, byte);
        }
    }
});
