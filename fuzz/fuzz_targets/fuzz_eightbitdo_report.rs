//! Fuzzes the 8BitDo input report parsers.
//!
//! Arbitrary bytes run through both the modern and the legacy report
//! layouts. Neither parser may panic, whatever the length or content.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_eightbitdo_report

#![deny(static_mut_refs)]
#![no_main]

use gamepad_eightbitdo_report::{
    parse_legacy_input, parse_modern_input, parse_modern_report, split_power_byte,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(raw) = parse_modern_report(data) {
        let _ = raw.report_id();
        // Out-of-range accessors must answer None, not panic.
        let _ = raw.byte(data.len());
        let _ = raw.sensor_word(5);
    }
    let _ = parse_modern_input(data);
    let _ = parse_legacy_input(data);
    if let Some(&power) = data.first() {
        let _ = split_power_byte(power);
    }
});
