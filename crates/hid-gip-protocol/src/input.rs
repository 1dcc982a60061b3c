//! Input report layouts and parsers.
//!
//! Values come out raw: sticks as stored (callers negate Y), triggers as
//! 10-bit words, battery and paddles as their wire bits. Scaling to
//! joystick axes happens in the driver layer.

#![deny(static_mut_refs)]

use crate::metadata::PaddleFormat;

/// Byte offsets inside a low latency input report.
pub mod ll_offset {
    pub const NAV_BUTTONS: usize = 0;
    pub const NAV_DPAD: usize = 1;
    pub const LEFT_TRIGGER: usize = 2;
    pub const RIGHT_TRIGGER: usize = 4;
    pub const LEFT_X: usize = 6;
    pub const LEFT_Y: usize = 8;
    pub const RIGHT_X: usize = 10;
    pub const RIGHT_Y: usize = 12;

    /// Shortest report that still carries the gamepad axes.
    pub const MIN_LEN: usize = 14;

    /// Flight sticks lay the same header out differently past byte 1.
    pub const FLIGHT_FIRE: usize = 2;
    pub const FLIGHT_EXTRA_BUTTONS: usize = 3;
    pub const FLIGHT_ROLL: usize = 11;
    pub const FLIGHT_PITCH: usize = 13;
    pub const FLIGHT_YAW: usize = 15;
    pub const FLIGHT_THROTTLE: usize = 17;
    pub const FLIGHT_EXTRA_AXES: usize = 19;
    pub const FLIGHT_MIN_LEN: usize = 19;

    /// Arcade sticks put two extra buttons in byte 18.
    pub const ARCADE_EXTRA: usize = 18;
    pub const ARCADE_EXTRA_LEN: usize = 19;
}

/// Bits in the first navigation byte. Shared by every device kind.
pub mod nav_button {
    pub const START: u8 = 0x04;
    pub const BACK: u8 = 0x08;
    pub const SOUTH: u8 = 0x10;
    pub const EAST: u8 = 0x20;
    pub const WEST: u8 = 0x40;
    pub const NORTH: u8 = 0x80;
}

/// Bits in the second navigation byte. The shoulder pair swaps meaning on
/// arcade sticks (previous/next), and the stick buttons only exist on
/// gamepads.
pub mod nav_dpad {
    pub const UP: u8 = 0x01;
    pub const DOWN: u8 = 0x02;
    pub const LEFT: u8 = 0x04;
    pub const RIGHT: u8 = 0x08;
    pub const LEFT_SHOULDER: u8 = 0x10;
    pub const RIGHT_SHOULDER: u8 = 0x20;
    pub const LEFT_STICK: u8 = 0x40;
    pub const RIGHT_STICK: u8 = 0x80;
}

/// Bits in the arcade stick extra byte.
pub mod arcade_extra {
    pub const BUTTON_6: u8 = 0x40;
    pub const BUTTON_7: u8 = 0x80;
}

fn u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn i16_le(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Gamepad analog block, raw from the wire. Triggers are 10-bit words,
/// stick Y values are not yet flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GamepadAxesRaw {
    pub left_trigger: u16,
    pub right_trigger: u16,
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
}

pub fn parse_gamepad_axes(bytes: &[u8]) -> Option<GamepadAxesRaw> {
    if bytes.len() < ll_offset::MIN_LEN {
        return None;
    }
    Some(GamepadAxesRaw {
        left_trigger: u16_le(bytes, ll_offset::LEFT_TRIGGER),
        right_trigger: u16_le(bytes, ll_offset::RIGHT_TRIGGER),
        left_x: i16_le(bytes, ll_offset::LEFT_X),
        left_y: i16_le(bytes, ll_offset::LEFT_Y),
        right_x: i16_le(bytes, ll_offset::RIGHT_X),
        right_y: i16_le(bytes, ll_offset::RIGHT_Y),
    })
}

/// Flight stick analog block. Roll, pitch, and yaw are signed; the
/// throttle is an unsigned full-range word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlightStickRaw {
    pub fire_buttons: u8,
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub throttle: u16,
}

pub fn parse_flight_stick(bytes: &[u8]) -> Option<FlightStickRaw> {
    if bytes.len() < ll_offset::FLIGHT_MIN_LEN {
        return None;
    }
    Some(FlightStickRaw {
        fire_buttons: bytes[ll_offset::FLIGHT_FIRE],
        roll: i16_le(bytes, ll_offset::FLIGHT_ROLL),
        pitch: i16_le(bytes, ll_offset::FLIGHT_PITCH),
        yaw: i16_le(bytes, ll_offset::FLIGHT_YAW),
        throttle: u16_le(bytes, ll_offset::FLIGHT_THROTTLE),
    })
}

/// Extra flight stick button, indexed from zero.
pub fn flight_extra_button(bytes: &[u8], index: usize) -> Option<bool> {
    let byte = bytes.get(ll_offset::FLIGHT_EXTRA_BUTTONS + index / 8)?;
    Some(byte & (1 << (index % 8)) != 0)
}

/// Extra flight stick axis, indexed from zero. Unsigned full-range words
/// after the throttle.
pub fn flight_extra_axis(bytes: &[u8], index: usize) -> Option<u16> {
    let at = ll_offset::FLIGHT_EXTRA_AXES + index * 2;
    if at + 1 >= bytes.len() {
        return None;
    }
    Some(u16_le(bytes, at))
}

/// Map an unsigned full-range word onto the signed axis range.
pub fn center_unsigned(raw: u16) -> i16 {
    (raw ^ 0x8000) as i16
}

/// Where paddle state lives inside input reports, per format.
pub fn paddle_offset(format: PaddleFormat) -> Option<usize> {
    match format {
        PaddleFormat::Xbe1 => Some(28),
        PaddleFormat::Xbe2 | PaddleFormat::Xbe2Raw => Some(14),
        PaddleFormat::Unknown => None,
    }
}

/// Decode the four paddles from their state byte. Returns `None` when the
/// byte carries no valid paddle data for the format.
pub fn parse_paddles(format: PaddleFormat, byte: u8) -> Option<[bool; 4]> {
    match format {
        PaddleFormat::Xbe1 => {
            // Bit 4 flags the byte as valid paddle state.
            if byte & 0x10 == 0 {
                return None;
            }
            Some([
                byte & 0x02 != 0,
                byte & 0x08 != 0,
                byte & 0x01 != 0,
                byte & 0x04 != 0,
            ])
        }
        PaddleFormat::Xbe2 | PaddleFormat::Xbe2Raw => Some([
            byte & 0x01 != 0,
            byte & 0x02 != 0,
            byte & 0x04 != 0,
            byte & 0x08 != 0,
        ]),
        PaddleFormat::Unknown => None,
    }
}

/// Raw reports shorter than this never carry paddle data.
pub const RAW_REPORT_MIN_LEN: usize = 17;

/// Offset of the console function map byte, or `None` when the report is
/// too short to carry one.
pub fn function_map_offset(report_len: usize, dynamic_latency: bool) -> Option<usize> {
    if report_len < 32 {
        return None;
    }
    let offset = if dynamic_latency {
        // The dynamic latency block sits after the function map.
        if report_len < 40 {
            return None;
        }
        report_len - 26
    } else {
        report_len - 18
    };
    (offset >= ll_offset::MIN_LEN).then_some(offset)
}

/// Share button bit inside the console function map byte.
pub const SHARE_BUTTON: u8 = 0x01;

/// Battery level field values.
pub mod battery_level {
    pub const CRITICAL: u8 = 0;
    pub const LOW: u8 = 1;
    pub const MEDIUM: u8 = 2;
    pub const FULL: u8 = 3;
}

/// Battery type field values.
pub mod battery_kind {
    pub const ABSENT: u8 = 0;
    pub const STANDARD: u8 = 1;
    pub const RECHARGEABLE: u8 = 2;
}

/// Charge field values.
pub mod charge_state {
    pub const NOT_CHARGING: u8 = 0;
    pub const CHARGING: u8 = 1;
    pub const ERROR: u8 = 2;
}

/// Unpacked battery byte from a device status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryStatus {
    pub level: u8,
    pub kind: u8,
    pub charge: u8,
    pub power: u8,
}

pub fn split_battery_byte(byte: u8) -> BatteryStatus {
    BatteryStatus {
        level: byte & 3,
        kind: (byte >> 2) & 3,
        charge: (byte >> 4) & 3,
        power: (byte >> 6) & 3,
    }
}

/// Fault event reported inside an extended device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub event_type: u16,
    pub fault_tag: u32,
}

/// Parsed device status message.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    pub battery: BatteryStatus,
    pub device_active: bool,
    pub events: Vec<StatusEvent>,
}

/// Devices never report more than five events per status message.
pub const MAX_STATUS_EVENTS: usize = 5;

pub fn parse_device_status(bytes: &[u8]) -> Option<DeviceStatus> {
    if bytes.is_empty() {
        return None;
    }
    let mut status = DeviceStatus {
        battery: split_battery_byte(bytes[0]),
        ..Default::default()
    };
    if bytes.len() >= 4 {
        status.device_active = bytes[1] & 1 != 0;
        if bytes[1] & 2 != 0 {
            if bytes.len() < 5 {
                return None;
            }
            let num_events = bytes[4] as usize;
            if num_events > MAX_STATUS_EVENTS || 5 + num_events * 10 > bytes.len() {
                return None;
            }
            for i in 0..num_events {
                let at = 5 + i * 10;
                status.events.push(StatusEvent {
                    event_type: u16_le(bytes, at),
                    fault_tag: u32::from_le_bytes([
                        bytes[at + 6],
                        bytes[at + 7],
                        bytes[at + 8],
                        bytes[at + 9],
                    ]),
                });
            }
        }
    }
    Some(status)
}

/// Virtual key the guide button reports as.
pub const GUIDE_VIRTUAL_KEY: u8 = 0x5b;

/// Decode a guide button status message. `None` for any other key.
pub fn parse_guide_button(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < 2 || bytes[1] != GUIDE_VIRTUAL_KEY {
        return None;
    }
    Some(bytes[0] & 0x01 != 0)
}

/// Firmware version block from a firmware query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

/// Response subtype carrying a version block.
pub const FIRMWARE_RESPONSE_VERSION: u8 = 1;

pub fn parse_firmware_response(bytes: &[u8]) -> Option<FirmwareVersion> {
    if bytes.len() < 14 || bytes[0] != FIRMWARE_RESPONSE_VERSION {
        return None;
    }
    Some(FirmwareVersion {
        major: u16_le(bytes, 6),
        minor: u16_le(bytes, 8),
        build: u16_le(bytes, 10),
        revision: u16_le(bytes, 12),
    })
}
