//! Session-level tests for the 8BitDo driver against a scripted mock device.

use std::time::Instant;

use gamepad_eightbitdo_report::{legacy, modern};
use openpad_hid_common::io::mock::{MockDeviceHandle, MockDeviceIo};
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{BusType, HidDeviceInfo, StaticHints};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::sink::mock::RecordingSink;
use openpad_joystick_core::{
    DriverSession, Hat, HidDriver, OutputKind, OutputQueue, PowerState, SensorKind, SessionCtx,
    SessionStatus,
};

use crate::eightbitdo::EightBitDoDriver;

/// Input report size shipped by firmware 1.03 and later.
const EXTENDED_LEN: usize = 34;

fn pad_info() -> HidDeviceInfo {
    HidDeviceInfo::new(
        vendor::EIGHTBITDO,
        product::EIGHTBITDO_ULTIMATE2_WIRELESS,
        "/mock/8bitdo0".to_string(),
    )
}

/// Modern-format report at rest: hat byte out of range, sticks centered,
/// triggers released.
fn neutral_modern(len: usize) -> Vec<u8> {
    assert!(len >= modern::MIN_REPORT_LEN);
    let mut report = vec![0u8; len];
    report[0] = modern::REPORT_ID_USB;
    report[modern::HAT] = 0x08;
    report[modern::LEFT_X] = 0x7F;
    report[modern::LEFT_Y] = 0x7F;
    report[modern::RIGHT_X] = 0x7F;
    report[modern::RIGHT_Y] = 0x7F;
    report
}

fn legacy_report(buttons_low: u8, buttons_high: u8, hat: u8) -> Vec<u8> {
    vec![buttons_low, buttons_high, hat, 0x7F, 0x7F, 0x7F, 0x7F, 0x00, 0x00]
}

fn open_pad(
    extended: bool,
) -> (
    MockDeviceHandle,
    MockDeviceIo,
    Box<dyn DriverSession>,
    RecordingSink,
    OutputQueue,
) {
    let info = pad_info();
    let handle = MockDeviceHandle::new(info.clone());
    if extended {
        // The probe read at open consumes this; only its length matters.
        handle.queue_read(neutral_modern(EXTENDED_LEN));
    }
    let mut io = handle.open();
    let hints = StaticHints::new();
    let session = EightBitDoDriver
        .open(&info, &mut io, &hints)
        .expect("open should succeed");
    (handle, io, session, RecordingSink::new(), OutputQueue::new())
}

fn drive(
    session: &mut dyn DriverSession,
    io: &mut MockDeviceIo,
    sink: &mut RecordingSink,
    output: &mut OutputQueue,
    now: Instant,
) -> SessionStatus {
    let mut ctx = SessionCtx {
        io,
        sink,
        output,
        now,
    };
    session.update(&mut ctx)
}

/// Feeds one neutral report to set the decode baseline and clears the
/// trigger-release events it produces.
fn prime_modern(
    handle: &MockDeviceHandle,
    io: &mut MockDeviceIo,
    session: &mut dyn DriverSession,
    sink: &mut RecordingSink,
    output: &mut OutputQueue,
) {
    handle.queue_read(neutral_modern(modern::MIN_REPORT_LEN));
    let status = drive(session, io, sink, output, Instant::now());
    assert_eq!(status, SessionStatus::Running);
    sink.clear();
}

#[test]
fn test_probe_matches_ultimate2_only() {
    let driver = EightBitDoDriver;
    assert!(driver.probe(&pad_info()));
    // Bluetooth pads speak the same protocol under report id 0x01.
    assert!(driver.probe(&pad_info().with_bus_type(BusType::Bluetooth)));
    assert!(!driver.probe(&HidDeviceInfo::new(
        vendor::EIGHTBITDO,
        0x1234,
        "/mock/other".to_string()
    )));
    assert!(!driver.probe(&HidDeviceInfo::new(
        0x1234,
        product::EIGHTBITDO_ULTIMATE2_WIRELESS,
        "/mock/other".to_string()
    )));
}

#[test]
fn test_open_detects_extended_firmware_by_report_length() {
    let (_handle, _io, session, _sink, _output) = open_pad(true);
    assert!(session.capabilities().rumble);
    assert!(!session.capabilities().rgb_led);

    let (_handle, _io, session, _sink, _output) = open_pad(false);
    assert!(
        !session.capabilities().rumble,
        "a silent pad is assumed to run older firmware"
    );

    let info = pad_info();
    let handle = MockDeviceHandle::new(info.clone());
    handle.queue_read(legacy_report(0, 0, 0));
    let mut io = handle.open();
    let hints = StaticHints::new();
    let session = EightBitDoDriver
        .open(&info, &mut io, &hints)
        .expect("open should succeed");
    assert!(
        !session.capabilities().rumble,
        "a short first report means older firmware"
    );
}

#[test]
fn test_legacy_neutral_report_keeps_quiet_until_buttons_change() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);

    handle.queue_read(legacy_report(0x00, 0x00, 0));
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert!(sink.button_events().is_empty());
    assert!(sink.hat_events().is_empty(), "hat byte matches the baseline");
    // Centered sticks are silent; only the released triggers move off the
    // zeroed baseline.
    assert_eq!(
        sink.axis_events(),
        vec![(axes::LEFT_TRIGGER, i16::MIN), (axes::RIGHT_TRIGGER, i16::MIN)]
    );
    sink.clear();

    handle.queue_read(legacy_report(0x01, 0x00, 0));
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.button_events(), vec![(buttons::SOUTH, true)]);
    assert!(sink.axis_events().is_empty());
    assert!(sink.hat_events().is_empty());
}

#[test]
fn test_legacy_button_and_hat_decode() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    handle.queue_read(legacy_report(0, 0, 0));
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    sink.clear();

    handle.queue_read(legacy_report(0, legacy::buttons_high::BACK, 4));
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.button_events(), vec![(buttons::BACK, true)]);
    assert_eq!(sink.hat_events(), vec![(0, Hat::Down)]);
}

#[test]
fn test_legacy_wrong_length_discarded() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    handle.queue_read(vec![0u8; legacy::REPORT_LEN - 1]);
    handle.queue_read(vec![0u8; legacy::REPORT_LEN + 1]);
    let status = drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(status, SessionStatus::Running);
    assert!(sink.events().is_empty());
}

#[test]
fn test_modern_buttons_decode() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    prime_modern(&handle, &mut io, session.as_mut(), &mut sink, &mut output);

    let l4 = buttons::RIGHT_SHOULDER + 1;
    let r4 = l4 + 1;
    let pl = r4 + 1;
    let pr = pl + 1;

    let mut report = neutral_modern(modern::MIN_REPORT_LEN);
    report[modern::BUTTONS_LOW] = modern::buttons_low::SOUTH | modern::buttons_low::EAST;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.button_events(),
        vec![(buttons::SOUTH, true), (buttons::EAST, true)]
    );
    sink.clear();

    report[modern::BUTTONS_HIGH] = modern::buttons_high::GUIDE;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.button_events(), vec![(buttons::GUIDE, true)]);
    sink.clear();

    report[modern::BUTTONS_EXT] = modern::buttons_ext::L4 | modern::buttons_ext::R4;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.button_events(), vec![(l4, true), (r4, true)]);
    sink.clear();

    report[modern::BUTTONS_LOW] |= modern::buttons_low::PL | modern::buttons_low::PR;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.button_events(), vec![(pl, true), (pr, true)]);
}

#[test]
fn test_modern_hat_changes_only_on_byte_change() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    prime_modern(&handle, &mut io, session.as_mut(), &mut sink, &mut output);

    let mut report = neutral_modern(modern::MIN_REPORT_LEN);
    report[modern::HAT] = 2;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.hat_events(), vec![(0, Hat::Right)]);
    sink.clear();

    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert!(sink.hat_events().is_empty(), "an unchanged byte stays quiet");

    report[modern::HAT] = 0x08;
    handle.queue_read(report);
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.hat_events(), vec![(0, Hat::Centered)]);
}

#[test]
fn test_trigger_full_scale() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);

    handle.queue_read(neutral_modern(modern::MIN_REPORT_LEN));
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.axis_events(),
        vec![(axes::LEFT_TRIGGER, i16::MIN), (axes::RIGHT_TRIGGER, i16::MIN)]
    );
    sink.clear();

    let mut report = neutral_modern(modern::MIN_REPORT_LEN);
    report[modern::TRIGGER_LEFT] = 0xFF;
    report[modern::TRIGGER_RIGHT] = 0xFF;
    handle.queue_read(report);
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.axis_events(),
        vec![(axes::LEFT_TRIGGER, i16::MAX), (axes::RIGHT_TRIGGER, i16::MAX)]
    );
}

#[test]
fn test_stick_axes_follow_byte_values() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    prime_modern(&handle, &mut io, session.as_mut(), &mut sink, &mut output);

    let mut report = neutral_modern(modern::MIN_REPORT_LEN);
    report[modern::LEFT_X] = 0x00;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.axis_events(), vec![(axes::LEFTX, i16::MIN)]);
    sink.clear();

    report[modern::LEFT_X] = 0x7F;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.axis_events(), vec![(axes::LEFTX, 0)]);
    sink.clear();

    report[modern::RIGHT_Y] = 0xFF;
    handle.queue_read(report);
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.axis_events(),
        vec![(axes::RIGHTY, i16::MAX)],
        "stick Y is not inverted on this pad"
    );
}

#[test]
fn test_power_decode_extended_only() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(true);

    let mut report = neutral_modern(EXTENDED_LEN);
    report[modern::POWER] = 0x32;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(sink.power_events(), vec![(PowerState::OnBattery, 50)]);

    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.power_events().len(),
        1,
        "an unchanged battery state is reported once"
    );

    report[modern::POWER] = 0xB2;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    report[modern::POWER] = 0x64;
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(
        sink.power_events(),
        vec![
            (PowerState::OnBattery, 50),
            (PowerState::Charging, 50),
            (PowerState::Charged, 100),
        ]
    );

    // Older firmware never carries a battery byte worth trusting.
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    let mut report = neutral_modern(EXTENDED_LEN);
    report[modern::POWER] = 0x32;
    handle.queue_read(report);
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert!(sink.power_events().is_empty());
    assert!(sink.sensor_events().is_empty());
}

#[test]
fn test_sensor_decode_shares_timestamp() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(true);

    let mut report = neutral_modern(EXTENDED_LEN);
    // Accelerometer z axis reads one g; gyro picks up a slow turn.
    report[19..21].copy_from_slice(&4096i16.to_le_bytes());
    report[21..23].copy_from_slice(&100i16.to_le_bytes());
    report[23..25].copy_from_slice(&200i16.to_le_bytes());
    report[25..27].copy_from_slice(&300i16.to_le_bytes());
    handle.queue_read(report.clone());
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());

    let events = sink.sensor_events();
    assert_eq!(events.len(), 2);

    let (kind, timestamp, values) = events[0];
    assert_eq!(kind, SensorKind::Gyroscope, "gyro is reported first");
    assert_eq!(timestamp, 8_000_000);
    let gyro_scale = 2048.0 * core::f32::consts::PI / 180.0 / 32767.0;
    assert!((values[0] + 200.0 * gyro_scale).abs() < 1e-6);
    assert!((values[1] - 300.0 * gyro_scale).abs() < 1e-6);
    assert!((values[2] + 100.0 * gyro_scale).abs() < 1e-6);

    let (kind, timestamp, values) = events[1];
    assert_eq!(kind, SensorKind::Accelerometer);
    assert_eq!(timestamp, 8_000_000, "both frames share the packet timestamp");
    assert_eq!(values[0], 0.0);
    assert!((values[1] - 9.80665).abs() < 1e-4, "one g along the y axis");
    assert_eq!(values[2], 0.0);

    sink.clear();
    handle.queue_read(report);
    drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    let events = sink.sensor_events();
    assert_eq!(events[0].1, 16_000_000, "clock steps 8ms per report");
}

#[test]
fn test_rumble_requires_extended_and_scales() {
    let (_handle, mut io, mut session, mut sink, mut output) = open_pad(true);
    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        session
            .rumble(0x1122, 0x3344, &mut ctx)
            .expect("rumble should queue");
        session
            .rumble(0x5566, 0x7788, &mut ctx)
            .expect("rumble should queue");
    }
    let request = output.take().expect("one rumble request pending");
    assert_eq!(request.kind, OutputKind::Output);
    assert_eq!(request.data, vec![0x05, 0x55, 0x77, 0x00, 0x00]);
    assert!(output.take().is_none(), "requests coalesce to the latest");

    let (_handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    let mut ctx = SessionCtx {
        io: &mut io,
        sink: &mut sink,
        output: &mut output,
        now: Instant::now(),
    };
    assert!(
        session.rumble(0x1122, 0x3344, &mut ctx).is_err(),
        "older firmware has no rumble"
    );
}

#[test]
fn test_unknown_report_id_discarded() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    let mut report = neutral_modern(modern::MIN_REPORT_LEN);
    report[0] = 0x02;
    handle.queue_read(report);
    let status = drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(status, SessionStatus::Running);
    assert!(sink.events().is_empty());
}

#[test]
fn test_disconnect_returns_disconnected() {
    let (handle, mut io, mut session, mut sink, mut output) = open_pad(false);
    assert!(session.attaches_on_open());
    handle.disconnect();
    let status = drive(session.as_mut(), &mut io, &mut sink, &mut output, Instant::now());
    assert_eq!(status, SessionStatus::Disconnected);
    assert_eq!(
        sink.disconnected_count(),
        0,
        "the registry owns the lifecycle announcements"
    );
}
