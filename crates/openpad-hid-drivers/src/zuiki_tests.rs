use std::time::Instant;

use openpad_hid_common::io::mock::{MockDeviceHandle, MockDeviceIo};
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, StaticHints};
use openpad_joystick_core::events::Hat;
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::sink::mock::RecordingSink;
use openpad_joystick_core::{
    DriverSession, HidDriver, OutputKind, OutputQueue, SessionCtx, SessionStatus,
};

use crate::zuiki::ZuikiDriver;

fn mascon_info() -> HidDeviceInfo {
    HidDeviceInfo::new(vendor::ZUIKI, product::ZUIKI_MASCON_PRO, "/mock/mascon0")
        .with_product_name("One Handle MasCon Pro")
}

/// Resting packet: sticks centered, hat released.
fn neutral_input() -> Vec<u8> {
    vec![0x00, 0x00, 0x08, 0x7F, 0x7F, 0x7F, 0x7F, 0x00]
}

fn open_mascon() -> (
    MockDeviceHandle,
    MockDeviceIo,
    Box<dyn DriverSession>,
    RecordingSink,
    OutputQueue,
) {
    let info = mascon_info();
    let handle = MockDeviceHandle::new(info.clone());
    let mut io = handle.open();
    let hints = StaticHints::new();
    let session = ZuikiDriver
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
fn test_probe_matches_mascon_pro() {
    let driver = ZuikiDriver;
    assert!(driver.probe(&mascon_info()));
    assert!(!driver.probe(&HidDeviceInfo::new(vendor::ZUIKI, 0x0001, "/mock/other")));
    assert!(!driver.probe(&HidDeviceInfo::new(
        vendor::GAMESIR,
        product::ZUIKI_MASCON_PRO,
        "/mock/foreign"
    )));
}

#[test]
fn test_open_forces_the_mascon_name() {
    let (handle, _io, session, _sink, _output) = open_mascon();
    // The USB product string is ignored in favor of the marketing name.
    assert_eq!(session.device_name(), "ZUIKI MASCON PRO");
    assert!(handle.get_write_history().is_empty());

    let caps = session.capabilities();
    assert!(caps.rumble);
    assert!(!caps.trigger_rumble);
    assert!(!caps.rgb_led);
    assert!(!caps.player_led);
}

#[test]
fn test_neutral_packet_is_quiet() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    handle.queue_read(neutral_input());
    let status = drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(status, SessionStatus::Running);
    assert!(sink.events().is_empty());
}

#[test]
fn test_face_buttons_decode() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    let mut report = neutral_input();
    report[0] = 0x3F;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.button_events(),
        vec![
            (buttons::NORTH, true),
            (buttons::EAST, true),
            (buttons::SOUTH, true),
            (buttons::WEST, true),
            (buttons::LEFT_SHOULDER, true),
            (buttons::RIGHT_SHOULDER, true),
        ]
    );

    // An unchanged byte stays quiet.
    sink.clear();
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(sink.button_events().is_empty());

    sink.clear();
    handle.queue_read(neutral_input());
    drive(&mut session, &mut io, &mut sink, &mut output);
    let released = sink.button_events();
    assert_eq!(released.len(), 6);
    assert!(released.iter().all(|(_, pressed)| !pressed));
}

#[test]
fn test_system_buttons_decode() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    let mut report = neutral_input();
    report[1] = 0x3F;
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.button_events(),
        vec![
            (buttons::BACK, true),
            (buttons::START, true),
            (buttons::LEFT_STICK, true),
            (buttons::RIGHT_STICK, true),
            (buttons::GUIDE, true),
            (buttons::MISC1, true),
        ]
    );
}

#[test]
fn test_detent_triggers_snap_to_extremes() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    let mut report = neutral_input();
    report[0] = 0x40;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    // The first face-byte change also reveals the released right detent.
    assert_eq!(
        sink.axis_events(),
        vec![
            (axes::LEFT_TRIGGER, i16::MAX),
            (axes::RIGHT_TRIGGER, i16::MIN),
        ]
    );

    sink.clear();
    report[0] = 0xC0;
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(sink.axis_events(), vec![(axes::RIGHT_TRIGGER, i16::MAX)]);
}

#[test]
fn test_hat_follows_notch_index() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    // Establish the released baseline so the first notch registers a change.
    handle.queue_read(neutral_input());
    drive(&mut session, &mut io, &mut sink, &mut output);

    for (index, expected) in [
        (0x00, Hat::Up),
        (0x01, Hat::UpRight),
        (0x04, Hat::Down),
        (0x07, Hat::UpLeft),
        (0x08, Hat::Centered),
    ] {
        sink.clear();
        let mut report = neutral_input();
        report[2] = index;
        handle.queue_read(report);
        drive(&mut session, &mut io, &mut sink, &mut output);
        assert_eq!(sink.hat_events(), vec![(0, expected)], "index {index}");
    }

    // Out-of-range values also read as centered, so no edge fires.
    sink.clear();
    let mut report = neutral_input();
    report[2] = 0x0A;
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(sink.hat_events().is_empty());
}

#[test]
fn test_sticks_scale_and_deduplicate() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    let mut report = neutral_input();
    report[3] = 0xFF;
    report[4] = 0x00;
    report[5] = 200;
    handle.queue_read(report.clone());
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(
        sink.axis_events(),
        vec![
            (axes::LEFTX, i16::MAX),
            (axes::LEFTY, i16::MIN),
            (axes::RIGHTX, 18632),
        ]
    );

    // Sticks are re-sent every packet; unchanged values must not repeat.
    sink.clear();
    handle.queue_read(report);
    drive(&mut session, &mut io, &mut sink, &mut output);
    assert!(sink.axis_events().is_empty());
}

#[test]
fn test_rumble_packet_layout() {
    let (_handle, mut io, mut session, mut sink, mut output) = open_mascon();

    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        session
            .rumble(0xAA11, 0x22BB, &mut ctx)
            .expect("rumble should queue");
    }

    let request = output.take().expect("rumble request");
    assert_eq!(request.kind, OutputKind::Output);
    assert_eq!(request.data, vec![0, 0, 0, 0, 0xAA, 0x22, 0, 0]);
}

#[test]
fn test_unsupported_outputs_refused() {
    let (_handle, mut io, mut session, mut sink, mut output) = open_mascon();

    let effect = [9u8, 8, 7, 6, 5, 4, 3, 2];
    {
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };
        assert!(session.set_led(1, 2, 3, &mut ctx).is_err());
        assert!(session.rumble_triggers(100, 200, &mut ctx).is_err());

        // Raw effects pass straight through to the device.
        session
            .send_effect(&effect, &mut ctx)
            .expect("effect should queue");
    }
    assert_eq!(output.take().expect("effect request").data, effect.to_vec());
}

#[test]
fn test_wrong_size_packets_ignored() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    handle.queue_read(vec![0x3F; 7]);
    handle.queue_read(vec![0x3F; 9]);
    let status = drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(status, SessionStatus::Running);
    assert!(sink.events().is_empty());
}

#[test]
fn test_disconnect_returns_disconnected() {
    let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

    handle.disconnect();
    let status = drive(&mut session, &mut io, &mut sink, &mut output);
    assert_eq!(status, SessionStatus::Disconnected);
    assert!(session.attaches_on_open());
    assert_eq!(sink.disconnected_count(), 0);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Whatever a packet says, saying it twice adds nothing: the second
        /// delivery of any 8 byte report emits zero events.
        #[test]
        fn prop_repeated_packets_emit_once(
            report in proptest::collection::vec(any::<u8>(), 8),
        ) {
            let (handle, mut io, mut session, mut sink, mut output) = open_mascon();

            handle.queue_read(report.clone());
            drive(&mut session, &mut io, &mut sink, &mut output);

            sink.clear();
            handle.queue_read(report);
            let status = drive(&mut session, &mut io, &mut sink, &mut output);
            prop_assert_eq!(status, SessionStatus::Running);
            prop_assert!(sink.events().is_empty());
        }
    }
}
