use std::time::Instant;

use openpad_hid_common::io::mock::{MockDeviceHandle, MockDeviceIo};
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, StaticHints};
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::sink::mock::RecordingSink;
use openpad_joystick_core::{
    DriverSession, HidDriver, OutputKind, OutputQueue, SensorKind, SessionCtx, SessionStatus,
};

use crate::psmove::PsMoveDriver;

/// ZCM1 frames carry magnetometer and EXT bytes after the gyro block.
const ZCM1_LEN: usize = 49;
const ZCM2_LEN: usize = 44;

fn move_info(product_id: u16) -> HidDeviceInfo {
    HidDeviceInfo::new(vendor::SONY, product_id, "/mock/psmove0")
        .with_product_name("Motion Controller")
}

fn neutral_input(len: usize) -> Vec<u8> {
    let mut report = vec![0u8; len];
    report[0] = 0x01;
    report
}

fn put_u16(report: &mut [u8], offset: usize, value: u16) {
    report[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// ZCM1 sensor words sit at rest when biased to 0x8000.
fn zcm1_resting_input() -> Vec<u8> {
    let mut report = neutral_input(ZCM1_LEN);
    for offset in [19, 21, 23, 31, 33, 35] {
        put_u16(&mut report, offset, 0x8000);
    }
    report
}

fn open_move(
    product_id: u16,
) -> (
    MockDeviceHandle,
    MockDeviceIo,
    Box<dyn DriverSession>,
    RecordingSink,
    OutputQueue,
) {
    let info = move_info(product_id);
    let handle = MockDeviceHandle::new(info.clone());
    let mut io = handle.open();
    let hints = StaticHints::new();
    let session = PsMoveDriver
        .open(&info, &mut io, &hints)
        .expect("open should succeed");
    (handle, io, session, RecordingSink::new(), OutputQueue::new())
}

fn drive(
    session: &mut Box<dyn DriverSession>,
    io: &mut MockDeviceIo,
    sink: &mut RecordingSink,
    output: &mut OutputQueue,
) -> SessionStatus {
    let mut ctx = SessionCtx {
        io,
        sink,
        output,
        now: Instant::now(),
    };
    session.update(&mut ctx)
}

#[test]
fn test_probe_matches_both_wand_models() {
    let driver = PsMoveDriver;
    assert!(driver.probe(&move_info(product::PSMOVE_ZCM1)));
    assert!(driver.probe(&move_info(product::PSMOVE_ZCM2)));
    // Other Sony controllers are not wands.
    assert!(!driver.probe(&HidDeviceInfo::new(vendor::SONY, 0x05c4, "/mock/ds4")));
    assert!(!driver.probe(&HidDeviceInfo::new(
        vendor::EIGHTBITDO,
        product::PSMOVE_ZCM1,
        "/mock/other"
    )));
}

#[test]
fn test_open_is_silent_and_reports_fixed_caps() {
    let (handle, _io, session, _sink, _output) = open_move(product::PSMOVE_ZCM2);
    assert!(handle.get_write_history().is_empty());
    assert_eq!(session.device_name(), "Motion Controller");

    let caps = session.capabilities();
    assert!(caps.rumble);
    assert!(caps.rgb_led);
    assert!(!caps.trigger_rumble);
    assert!(!caps.player_led);
}

#[test]
fn test_buttons_decode_per_byte_group() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM2);

    let mut report = neutral_input(ZCM2_LEN);
    report[1] = 0x09;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.button_events(),
        vec![(buttons::BACK, true), (buttons::START, true)]
    );

    sink.clear();
    report[2] = 0xF0;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.button_events(),
        vec![
            (buttons::NORTH, true),
            (buttons::EAST, true),
            (buttons::SOUTH, true),
            (buttons::WEST, true),
        ]
    );

    sink.clear();
    report[3] = 0x09;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.button_events(),
        vec![(buttons::GUIDE, true), (buttons::LEFT_STICK, true)]
    );

    // An unchanged frame stays quiet.
    sink.clear();
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(sink.button_events().is_empty());

    sink.clear();
    handle.queue_read(neutral_input(ZCM2_LEN));
    drive(&mut session, &mut io, &mut sink, &mut output);
    let released = sink.button_events();
    assert_eq!(released.len(), 8);
    assert!(released.iter().all(|(_, pressed)| !pressed));
}

#[test]
fn test_trigger_zcm1_averages_both_frames() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM1);

    // The resting trigger maps to the axis minimum.
    handle.queue_read(zcm1_resting_input());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(sink.axis_events(), vec![(axes::LEFTX, -32768)]);

    sink.clear();
    let mut report = zcm1_resting_input();
    report[5] = 100;
    report[6] = 200;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    // Mean of 100 and 200, scaled to the full axis range.
    assert_eq!(sink.axis_events(), vec![(axes::LEFTX, 5782)]);

    // Same mean, no new event.
    sink.clear();
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(sink.axis_events().is_empty());
}

#[test]
fn test_trigger_zcm2_uses_single_frame() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM2);

    let mut report = neutral_input(ZCM2_LEN);
    report[5] = 0xFF;
    report[6] = 0x00;
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(sink.axis_events(), vec![(axes::LEFTX, 32767)]);
}

#[test]
fn test_sensors_zcm1_biased_second_frame() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM1);

    let mut report = zcm1_resting_input();
    put_u16(&mut report, 19, 0x8000 + 1000);
    put_u16(&mut report, 33, 0x8000 - 500);
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);

    let events = sink.sensor_events();
    assert_eq!(events.len(), 2);

    let (kind, timestamp, values) = events[0];
    assert_eq!(kind, SensorKind::Accelerometer);
    assert_eq!(timestamp, 13_333_333);
    let expected = 1000.0 * STANDARD_GRAVITY / 8192.0;
    assert!((values[0] - expected).abs() < 1e-4);
    assert_eq!(values[1], 0.0);
    assert_eq!(values[2], 0.0);

    let (kind, timestamp, values) = events[1];
    assert_eq!(kind, SensorKind::Gyroscope);
    assert_eq!(timestamp, 13_333_333);
    let expected = -500.0 * DEG_TO_RAD / 16.4;
    assert!((values[1] - expected).abs() < 1e-4);

    // The simulated clock steps one 75Hz frame per report.
    sink.clear();
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    let events = sink.sensor_events();
    assert_eq!(events[0].1, 26_666_666);
    assert_eq!(events[1].1, 26_666_666);
}

#[test]
fn test_sensors_zcm2_twos_complement() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM2);

    let mut report = neutral_input(ZCM2_LEN);
    put_u16(&mut report, 13, (-2000i16) as u16);
    put_u16(&mut report, 25, 16400);
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);

    let events = sink.sensor_events();
    assert_eq!(events.len(), 2);

    let (kind, _, values) = events[0];
    assert_eq!(kind, SensorKind::Accelerometer);
    let expected = -2000.0 * STANDARD_GRAVITY / 8192.0;
    assert!((values[0] - expected).abs() < 1e-3);

    let (kind, _, values) = events[1];
    assert_eq!(kind, SensorKind::Gyroscope);
    let expected = 16400.0 * DEG_TO_RAD / 16.4;
    assert!((values[0] - expected).abs() < 1e-3);
}

#[test]
fn test_invalid_and_foreign_frames_dropped() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM1);

    // All-ones button byte marks a frame the firmware wants dropped.
    let mut report = neutral_input(ZCM1_LEN);
    report[1] = 0xFF;
    report[5] = 200;
    handle.queue_read(report);

    let mut short = vec![0u8; 10];
    short[0] = 0x01;
    handle.queue_read(short);

    let mut foreign = vec![0u8; ZCM1_LEN];
    foreign[0] = 0x02;
    handle.queue_read(foreign);

    let status = drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(status, SessionStatus::Running);
    assert!(sink.events().is_empty());
    assert!(output.take().is_none());
}

#[test]
fn test_first_input_pushes_effects_once() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM2);

    handle.queue_read(neutral_input(ZCM2_LEN));
    drive(&mut session, &mut io, &mut sink, &mut output);

    let request = output.take().expect("first input should queue effects");
    assert_eq!(request.kind, OutputKind::Output);
    assert_eq!(request.data, vec![0x06, 0, 0, 0, 0, 0, 0, 0, 0]);

    handle.queue_read(neutral_input(ZCM2_LEN));
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(output.take().is_none());
}

#[test]
fn test_rumble_and_led_share_one_report() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM1);

    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        session
            .rumble(0x1234, 0xAB00, &mut ctx)
            .expect("rumble should queue");
    }
    let request = output.take().expect("rumble request");
    assert_eq!(request.data[6], 0xAB);
    assert_eq!(&request.data[2..5], &[0, 0, 0]);

    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        session
            .set_led(9, 8, 7, &mut ctx)
            .expect("led should queue");
    }
    // The lamp write keeps the rumble level and vice versa.
    let request = output.take().expect("led request");
    assert_eq!(&request.data[2..5], &[9, 8, 7]);
    assert_eq!(request.data[6], 0xAB);

    // Only the high frequency channel drives the single motor.
    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        session
            .rumble(0xFFFF, 0x0000, &mut ctx)
            .expect("rumble should queue");
    }
    let request = output.take().expect("rumble request");
    assert_eq!(request.data[6], 0x00);
    assert_eq!(&request.data[2..5], &[9, 8, 7]);

    // Effects are already current, so the next input pushes nothing.
    handle.queue_read(zcm1_resting_input());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(output.take().is_none());
}

#[test]
fn test_send_effect_passes_through() {
    let (_handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM2);

    let mut ctx = SessionCtx {
        io: &mut io,
        sink: &mut sink,
        output: &mut output,
        now: Instant::now(),
    };
    let effect = [0x06, 0, 1, 2, 3, 0, 9, 0, 0];
    session
        .send_effect(&effect, &mut ctx)
        .expect("effect should queue");
    let request = output.take().expect("effect request");
    assert_eq!(request.data, effect.to_vec());
}

#[test]
fn test_disconnect_returns_disconnected() {
    let (handle, mut io, mut session, mut sink, mut output) = open_move(product::PSMOVE_ZCM1);

    handle.disconnect();
    let status = drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(status, SessionStatus::Disconnected);

    // The registry owns the lifecycle announcements.
    assert!(session.attaches_on_open());
    assert_eq!(sink.disconnected_count(), 0);
}
