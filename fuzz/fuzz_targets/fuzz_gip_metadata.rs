//! Fuzzes the GIP device metadata parser.
//!
//! Metadata blobs arrive from the device during the attachment handshake,
//! so this is attacker-controlled input. Parsing must reject malformed
//! blobs with an error, never a panic, and the derived capability queries
//! must hold up on whatever survives parsing.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_gip_metadata

#![deny(static_mut_refs)]
#![no_main]

use gamepad_hid_gip_protocol::parse_metadata;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(metadata) = parse_metadata(data) {
        let _ = metadata.supports_motor_control();
        let _ = metadata.supports_vendor_message(0x4D, true);
        let _ = metadata.supports_vendor_message(0x0A, false);
    }
});
