//! Byte-level snapshots of every outbound GIP frame.
//!
//! These pin the exact wire encoding of the startup and rumble messages so
//! a refactor of the frame builders cannot silently change what a device
//! receives.

use insta::assert_snapshot;

use gamepad_hid_gip_protocol::motor::motor_bits;
use gamepad_hid_gip_protocol::wire::{command, device_state, flag, led};
use gamepad_hid_gip_protocol::{
    AttachmentProfile, FrameHeader, MotorCommand, SequenceBank, build_init_sequence,
    device_capabilities_frame, direct_motor_frame, elite_raw_report_frame, encode_ack,
    extended_power_on_frame, firmware_query_frame, guide_led_frame, initial_reports_request_frame,
    metadata_request_frame, security_enable_frame, set_device_state_frame,
};
use openpad_hid_common::usb_ids::{product, vendor};

fn hex(frame: &[u8]) -> String {
    format!("{frame:02X?}")
}

fn hex_lines(frames: &[Vec<u8>]) -> String {
    frames.iter().map(|f| hex(f)).collect::<Vec<_>>().join("\n")
}

// ── System messages ──────────────────────────────────────────────────────────

#[test]
fn test_snapshot_metadata_request() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&metadata_request_frame(&mut bank, 0)?), @"[04, 20, 01, 00]");
    Ok(())
}

#[test]
fn test_snapshot_metadata_request_sub_attachment() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&metadata_request_frame(&mut bank, 2)?), @"[04, 22, 01, 00]");
    Ok(())
}

#[test]
fn test_snapshot_device_state_start() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let frame = set_device_state_frame(&mut bank, 0, device_state::START)?;
    assert_snapshot!(hex(&frame), @"[05, 20, 01, 01, 00]");
    Ok(())
}

#[test]
fn test_snapshot_device_state_reset() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let frame = set_device_state_frame(&mut bank, 0, device_state::RESET)?;
    assert_snapshot!(hex(&frame), @"[05, 20, 01, 01, 07]");
    Ok(())
}

#[test]
fn test_snapshot_extended_power_on() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let frame = extended_power_on_frame(&mut bank, 0)?;
    assert_snapshot!(
        hex(&frame),
        @"[05, 20, 01, 0F, 06, 00, 00, 00, 00, 00, 00, 55, 53, 00, 00, 00, 00, 00, 00]"
    );
    Ok(())
}

#[test]
fn test_snapshot_guide_led_on() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let frame = guide_led_frame(&mut bank, 0, led::GUIDE_ON, 20)?;
    assert_snapshot!(hex(&frame), @"[0A, 20, 01, 03, 00, 01, 14]");
    Ok(())
}

#[test]
fn test_snapshot_security_enable() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&security_enable_frame(&mut bank, 0)?), @"[06, 20, 01, 02, 01, 00]");
    Ok(())
}

#[test]
fn test_snapshot_firmware_query() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let frame = firmware_query_frame(&mut bank, 0, 2)?;
    assert_snapshot!(hex(&frame), @"[0C, 20, 01, 05, 01, 02, 00, 00, 00]");
    Ok(())
}

// ── Vendor messages ──────────────────────────────────────────────────────────

#[test]
fn test_snapshot_initial_reports_request() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&initial_reports_request_frame(&mut bank)?), @"[0A, 00, 01, 03, 00, 00, 00]");
    Ok(())
}

#[test]
fn test_snapshot_device_capabilities() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&device_capabilities_frame(&mut bank)?), @"[00, 00, 01, 00]");
    Ok(())
}

#[test]
fn test_snapshot_elite_raw_report_request() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    assert_snapshot!(hex(&elite_raw_report_frame(&mut bank)?), @"[4D, 00, 01, 02, 07, 00]");
    Ok(())
}

// ── Direct motor ─────────────────────────────────────────────────────────────

#[test]
fn test_snapshot_direct_motor() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let motor = MotorCommand::new(0x20, 0x40, 0x60, 0x80);
    assert_eq!(motor.motor_bitmap, motor_bits::ALL);
    let frame = direct_motor_frame(&mut bank, 0, &motor)?;
    // Sequence id is always zero for direct motor commands.
    assert_snapshot!(hex(&frame), @"[09, 00, 00, 09, 00, 0F, 20, 40, 60, 80, 1E, 00, 00]");
    Ok(())
}

#[test]
fn test_snapshot_direct_motor_sub_attachment() -> Result<(), Box<dyn std::error::Error>> {
    let mut bank = SequenceBank::new();
    let motor = MotorCommand::new(0, 0, 0xff, 0xff);
    let frame = direct_motor_frame(&mut bank, 1, &motor)?;
    assert_snapshot!(hex(&frame), @"[09, 01, 00, 09, 00, 0F, 00, 00, FF, FF, 1E, 00, 00]");
    Ok(())
}

// ── Acknowledgement ──────────────────────────────────────────────────────────

#[test]
fn test_snapshot_fragment_ack() {
    let header = FrameHeader {
        message_type: command::METADATA,
        flags: flag::FRAGMENT | flag::SYSTEM | flag::ACME | 0x01,
        sequence_id: 0x09,
        length: 64,
    };
    assert_snapshot!(
        hex(&encode_ack(&header, 64, 192)),
        @"[01, 21, 09, 09, 00, 04, 20, 40, 00, 00, 00, C0, 00]"
    );
}

// ── Startup sequences ────────────────────────────────────────────────────────

#[test]
fn test_snapshot_init_sequence_default_gamepad() -> Result<(), Box<dyn std::error::Error>> {
    let mut profile = AttachmentProfile::new(0, vendor::MICROSOFT, product::XBOX_ONE_S);
    profile.assume_defaults();
    let mut bank = SequenceBank::new();
    let frames = build_init_sequence(&profile, &mut bank)?;
    // Start, guide LED, security. Faked metadata advertises no vendor
    // messages, so the report requests are absent.
    assert_snapshot!(hex_lines(&frames), @r"
    [05, 20, 01, 01, 00]
    [0A, 20, 02, 03, 00, 01, 14]
    [06, 20, 01, 02, 01, 00]
    ");
    Ok(())
}

#[test]
fn test_snapshot_init_sequence_elite_series_2() -> Result<(), Box<dyn std::error::Error>> {
    let mut profile = AttachmentProfile::new(0, vendor::MICROSOFT, product::XBOX_ONE_ELITE_SERIES_2);
    profile.assume_defaults();
    let mut bank = SequenceBank::new();
    let frames = build_init_sequence(&profile, &mut bank)?;
    // Extended power-on and the raw paddle report request come first.
    assert_snapshot!(hex_lines(&frames), @r"
    [05, 20, 01, 0F, 06, 00, 00, 00, 00, 00, 00, 55, 53, 00, 00, 00, 00, 00, 00]
    [4D, 00, 01, 02, 07, 00]
    [05, 20, 02, 01, 00]
    [0A, 20, 03, 03, 00, 01, 14]
    [06, 20, 01, 02, 01, 00]
    ");
    Ok(())
}
