//! Output path tests through the registry: request coalescing, the
//! one-in-flight completion window, the wireless bypass, and write-failure
//! recovery.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use openpad_engine::{HidJoystickRegistry, JoystickHandle, SharedSink};
use openpad_hid_common::io::mock::{MockDeviceHandle, MockHidBus};
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, StaticHints};
use openpad_joystick_core::sink::mock::RecordingSink;

fn mascon_info(path: &str) -> HidDeviceInfo {
    HidDeviceInfo::new(vendor::ZUIKI, product::ZUIKI_MASCON_PRO, path)
}

/// SInput features reply naming rumble as the only capability.
fn sinput_features_reply() -> Vec<u8> {
    let mut report = vec![0u8; 64];
    report[0] = 0x02;
    report[1] = 0x02;
    report[2..4].copy_from_slice(&1u16.to_le_bytes());
    report[4] = 0x01;
    report[8] = 4;
    report[10..12].copy_from_slice(&8u16.to_le_bytes());
    report[12..14].copy_from_slice(&2000u16.to_le_bytes());
    report[14] = 0x0F;
    report[20..26].copy_from_slice(&[0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);
    report
}

/// Claimed single-device registry plus the handles the test drives it with.
fn tracked(
    bus: &MockHidBus,
    info: HidDeviceInfo,
) -> (MockDeviceHandle, HidJoystickRegistry, JoystickHandle) {
    let mock = bus.add_device(info);
    let sink: SharedSink = Arc::new(Mutex::new(RecordingSink::new()));
    let hints = Arc::new(StaticHints::new());
    let mut registry = HidJoystickRegistry::new(Box::new(bus.clone()), sink, hints);
    registry.refresh();
    assert_eq!(registry.device_count(), 1);
    let handle = registry.joysticks().remove(0);
    (mock, registry, handle)
}

#[test]
fn test_rumble_coalesces_before_transmit() {
    let bus = MockHidBus::new();
    let staged = bus.add_device(
        HidDeviceInfo::new(vendor::RASPBERRYPI, product::SINPUT_GENERIC, "mock:sinput0")
            .with_product_name("SInput Gamepad"),
    );
    staged.queue_read(sinput_features_reply());
    let sink: SharedSink = Arc::new(Mutex::new(RecordingSink::new()));
    let hints = Arc::new(StaticHints::new());
    let mut registry = HidJoystickRegistry::new(Box::new(bus.clone()), sink, hints);
    registry.refresh();
    let handle = registry.joysticks().remove(0);

    // Two updates before the scheduler runs: only the newest is transmitted.
    handle.rumble(0x1000, 0x2000).expect("rumble supported");
    handle.rumble(0x8800, 0x4400).expect("rumble supported");
    registry.poll();

    let history = staged.get_write_history();
    // [0] is the features request written during open.
    assert_eq!(history.len(), 2);
    assert_eq!(history[0][1], 0x02);
    let rumble = &history[1];
    assert_eq!(rumble.len(), 48);
    assert_eq!(rumble[0], 0x03);
    assert_eq!(rumble[1], 0x01);
    assert_eq!(rumble[3], 0x88);
    assert_eq!(rumble[5], 0x44);
}

#[test]
fn test_burst_rumble_is_never_lost() {
    let bus = MockHidBus::new();
    let (mock, mut registry, handle) = tracked(&bus, mascon_info("mock:mascon0"));

    handle.rumble(0x1100, 0x0000).expect("rumble supported");
    registry.poll();
    assert_eq!(
        mock.get_write_history(),
        vec![vec![0, 0, 0, 0, 0x11, 0, 0, 0]]
    );

    // The follow-up lands inside the first report's completion window; it
    // must still go out on a later cycle, not be dropped.
    handle.rumble(0x2200, 0x3300).expect("rumble supported");
    registry.poll();
    thread::sleep(Duration::from_millis(15));
    registry.poll();

    assert_eq!(
        mock.get_write_history(),
        vec![
            vec![0, 0, 0, 0, 0x11, 0x00, 0, 0],
            vec![0, 0, 0, 0, 0x22, 0x33, 0, 0],
        ]
    );
}

#[test]
fn test_dongle_rumble_writes_directly() {
    let bus = MockHidBus::new();
    let info =
        HidDeviceInfo::new(vendor::VALVE, product::STEAM_PROTEUS_DONGLE, "mock:dongle0")
            .with_interface(3);
    let (mock, _registry, handle) = tracked(&bus, info);

    // Pulse trains go straight to the transport; no poll cycle runs here
    // and nothing coalesces.
    handle.rumble(0x0102, 0x0304).expect("rumble supported");
    handle.rumble(0x0506, 0x0708).expect("rumble supported");

    let history = mock.get_write_history();
    assert_eq!(history.len(), 2);
    for packet in &history {
        assert_eq!(packet.len(), 65);
        assert_eq!(packet[1], 0xEB);
    }
    assert_eq!(&history[0][5..7], &[0x02, 0x01]);
    assert_eq!(&history[0][8..10], &[0x04, 0x03]);
    assert_eq!(&history[1][5..7], &[0x06, 0x05]);
    assert_eq!(&history[1][8..10], &[0x08, 0x07]);
}

#[test]
fn test_write_failure_drops_report_and_device_survives() {
    let bus = MockHidBus::new();
    let (mock, mut registry, handle) = tracked(&bus, mascon_info("mock:mascon0"));

    mock.set_fail_writes(true);
    handle.rumble(0x4400, 0x0000).expect("rumble supported");
    let stats = registry.poll();
    assert_eq!(stats.removed, 0);
    assert_eq!(registry.device_count(), 1);
    assert!(mock.get_write_history().is_empty());

    // The failed report is gone for good, but the device keeps working.
    mock.set_fail_writes(false);
    handle.rumble(0x5500, 0x0000).expect("rumble supported");
    registry.poll();
    assert_eq!(
        mock.get_write_history(),
        vec![vec![0, 0, 0, 0, 0x55, 0, 0, 0]]
    );
}
