//! GameSir G7 Pro series driver.
//!
//! The G7 Pro line boots in an Xbox-compatible mode and has to be switched
//! into its vendor HID mode with an `0xA2` command before it streams the
//! extended report. Packets open with an `0xA1 0xC8` header; over Bluetooth
//! the same packet arrives wrapped in a `0x43` report id. Sticks and sensor
//! words are big-endian, sticks get a 5% circular deadzone in the driver
//! because the firmware reports raw counts, and rumble, trigger rumble and
//! LED commands are written straight to the device rather than scheduled.

use tracing::debug;

use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::clock::{SensorClock, STEP_125HZ_NS};
use openpad_joystick_core::events::{DEG_TO_RAD, Hat, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, HidDriver, JoystickCaps, SensorKind, SessionCtx, SessionStatus,
};

const PACKET_HEADER_0: u8 = 0xA1;
const PACKET_HEADER_1_GAMEPAD: u8 = 0xC8;

/// Bluetooth wraps packets in this report id; the same byte tags the
/// mode-switch ack.
const REPORT_ID_VENDOR: u8 = 0x43;

const COMMAND_REPORT_ID: u8 = 0xA2;
const COMMAND_LEN: usize = 64;

const MODE_SWITCH_ATTEMPTS: u32 = 3;
const MODE_SWITCH_POLLS: u32 = 10;
const MODE_SWITCH_POLL_TIMEOUT_MS: u32 = 1;

const LAST_REPORT_LEN: usize = 64;

/// Sticks cover the full signed 16-bit range at 5% deadzone.
const DEADZONE_FRACTION: f32 = 0.05;

/// Accelerometer range is fixed at 2g.
const ACCEL_SCALE: f32 = 2.0 * STANDARD_GRAVITY / 32768.0;

/// 16 counts per degree/second.
const GYRO_SCALE: f32 = DEG_TO_RAD / 16.0;

/// `0xA2` command opcodes.
mod cmd {
    pub const MODE_SWITCH: u8 = 0x01;
    pub const RUMBLE: u8 = 0x03;
    pub const LED: u8 = 0x04;
}

/// Byte offsets within a normalized packet (header at 0).
mod idx {
    pub const FACE: usize = 3;
    pub const SYSTEM: usize = 4;
    pub const DPAD: usize = 5;
    pub const PADDLES: usize = 6;
    pub const LEFT_X: usize = 7;
    pub const RIGHT_X: usize = 11;
    pub const LEFT_TRIGGER: usize = 15;
    pub const RIGHT_TRIGGER: usize = 16;
    pub const ACCEL: usize = 17;
    pub const GYRO: usize = 23;

    pub const MIN_INPUT_LEN: usize = RIGHT_TRIGGER + 1;
    pub const MIN_SENSOR_LEN: usize = GYRO + 6;
}

/// Big-endian, unlike most HID gamepads.
fn load_i16_be(packet: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([packet[offset], packet[offset + 1]])
}

/// Strip the Bluetooth report id if present and check the packet header.
fn normalized(report: &[u8]) -> Option<&[u8]> {
    if report.len() >= 3
        && report[0] == REPORT_ID_VENDOR
        && report[1] == PACKET_HEADER_0
        && report[2] == PACKET_HEADER_1_GAMEPAD
    {
        Some(&report[1..])
    } else if report.len() >= 2
        && report[0] == PACKET_HEADER_0
        && report[1] == PACKET_HEADER_1_GAMEPAD
    {
        Some(report)
    } else {
        None
    }
}

/// Scale a stick vector so travel starts at the deadzone edge instead of
/// snapping when it crosses it.
fn apply_circular_deadzone(x: i16, y: i16) -> (i16, i16) {
    const MAX_AXIS: f32 = 32767.0;
    let radius = MAX_AXIS * DEADZONE_FRACTION;
    let distance = (f32::from(x) * f32::from(x) + f32::from(y) * f32::from(y)).sqrt();
    if distance < radius {
        return (0, 0);
    }
    let scale = (distance - radius) / (MAX_AXIS - radius);
    let out_x = f32::from(x) / distance * scale * MAX_AXIS;
    let out_y = f32::from(y) / distance * scale * MAX_AXIS;
    (out_x as i16, out_y as i16)
}

/// Kick the controller out of its Xbox-compatible boot mode.
///
/// The ack can take a few frames, and some dongles never send one; the
/// stream works regardless, so a missing ack is reported but not fatal.
/// Input frames read while waiting are discarded.
fn switch_to_gamepad_mode(io: &mut dyn HidDeviceIo, device_name: &str) -> Result<bool> {
    let mut request = vec![0u8; COMMAND_LEN];
    request[0] = COMMAND_REPORT_ID;
    request[1] = cmd::MODE_SWITCH;

    for _ in 0..MODE_SWITCH_ATTEMPTS {
        io.write_report(&request)
            .map_err(|err| DeviceError::write_failed(device_name, err.to_string()))?;
        for _ in 0..MODE_SWITCH_POLLS {
            match io.read_report(MODE_SWITCH_POLL_TIMEOUT_MS) {
                Ok(Some(reply)) => {
                    if reply.len() == COMMAND_LEN
                        && reply[0] == PACKET_HEADER_0
                        && reply[1] == REPORT_ID_VENDOR
                        && reply[2] == cmd::MODE_SWITCH
                    {
                        return Ok(true);
                    }
                }
                Ok(None) => continue,
                // A flaky link during the handshake retries the write.
                Err(_) => break,
            }
        }
    }
    Ok(false)
}

/// Driver for GameSir controllers in vendor HID mode.
pub struct GameSirDriver;

impl HidDriver for GameSirDriver {
    fn name(&self) -> &'static str {
        "gamesir"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_GAMESIR
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::GAMESIR
            && matches!(
                info.product_id,
                product::GAMESIR_G7_PRO | product::GAMESIR_G7_PRO_8K
            )
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let (device_name, sensors_supported) = match info.product_id {
            product::GAMESIR_G7_PRO => ("GameSir-G7 Pro (HID)".to_owned(), true),
            product::GAMESIR_G7_PRO_8K => ("GameSir-G7 Pro 8K (HID)".to_owned(), true),
            _ => ("GameSir Controller".to_owned(), false),
        };

        let acked = switch_to_gamepad_mode(io, &device_name)?;
        if !acked {
            debug!(name = %device_name, "GameSir: no mode switch ack, continuing anyway");
        }
        debug!(
            name = %device_name,
            bluetooth = info.is_bluetooth(),
            sensors = sensors_supported,
            "GameSir: opened"
        );

        Ok(Box::new(GameSirSession {
            device_name,
            product_id: info.product_id,
            sensors_supported,
            primed: false,
            snapshot: InputSnapshot::default(),
            last_report: [0; LAST_REPORT_LEN],
            sensor_clock: SensorClock::new(),
        }))
    }
}

/// Last values handed to the sink, per control.
#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; axes::COUNT as usize],
    hat: Hat,
}

struct GameSirSession {
    device_name: String,
    product_id: u16,
    sensors_supported: bool,
    /// The first packet only establishes the analog baseline.
    primed: bool,
    snapshot: InputSnapshot,
    last_report: [u8; LAST_REPORT_LEN],
    sensor_clock: SensorClock,
}

impl GameSirSession {
    fn emit_button(&mut self, ctx: &mut SessionCtx<'_>, index: u8, pressed: bool) {
        let bit = 1u32 << index;
        let was = self.snapshot.buttons & bit != 0;
        if was != pressed {
            if pressed {
                self.snapshot.buttons |= bit;
            } else {
                self.snapshot.buttons &= !bit;
            }
            ctx.sink.button(index, pressed);
        }
    }

    fn emit_axis(&mut self, ctx: &mut SessionCtx<'_>, index: u8, value: i16) {
        let slot = index as usize;
        if slot < self.snapshot.axes.len() && self.snapshot.axes[slot] != value {
            self.snapshot.axes[slot] = value;
            ctx.sink.axis(index, value);
        }
    }

    fn emit_hat(&mut self, ctx: &mut SessionCtx<'_>, hat: Hat) {
        if self.snapshot.hat != hat {
            self.snapshot.hat = hat;
            ctx.sink.hat(0, hat);
        }
    }

    fn decode_report(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(packet) = normalized(report) else {
            debug!(len = report.len(), "GameSir: discarding unrecognized report");
            return;
        };
        if packet.len() < idx::MIN_INPUT_LEN {
            debug!(len = packet.len(), "GameSir: discarding short report");
            return;
        }

        self.decode_face(packet, ctx);
        self.decode_system(packet, ctx);
        self.decode_dpad_group(packet, ctx);
        self.decode_paddles(packet, ctx);
        if self.primed {
            self.decode_sticks(packet, ctx);
            self.decode_triggers(packet, ctx);
            self.decode_sensors(packet, ctx);
        }

        let n = packet.len().min(self.last_report.len());
        self.last_report[..n].copy_from_slice(&packet[..n]);
        self.primed = true;
    }

    fn decode_face(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::FACE] == packet[idx::FACE] {
            return;
        }
        // A B X Y L1 R1; the C and Z bits have no mapping.
        let b = packet[idx::FACE];
        self.emit_button(ctx, buttons::SOUTH, b & 0x01 != 0);
        self.emit_button(ctx, buttons::EAST, b & 0x02 != 0);
        self.emit_button(ctx, buttons::WEST, b & 0x08 != 0);
        self.emit_button(ctx, buttons::NORTH, b & 0x10 != 0);
        self.emit_button(ctx, buttons::LEFT_SHOULDER, b & 0x40 != 0);
        self.emit_button(ctx, buttons::RIGHT_SHOULDER, b & 0x80 != 0);
    }

    fn decode_system(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::SYSTEM] == packet[idx::SYSTEM] {
            return;
        }
        // The L2/R2 bits are skipped; the analog travel is authoritative.
        let b = packet[idx::SYSTEM];
        self.emit_button(ctx, buttons::BACK, b & 0x04 != 0);
        self.emit_button(ctx, buttons::START, b & 0x08 != 0);
        self.emit_button(ctx, buttons::GUIDE, b & 0x10 != 0);
        self.emit_button(ctx, buttons::LEFT_STICK, b & 0x20 != 0);
        self.emit_button(ctx, buttons::RIGHT_STICK, b & 0x40 != 0);
        self.emit_button(ctx, buttons::MISC1, b & 0x80 != 0);
    }

    fn decode_dpad_group(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::DPAD] == packet[idx::DPAD] {
            return;
        }
        let b = packet[idx::DPAD];
        // One-based clock positions in the low nibble; zero is released.
        self.emit_hat(ctx, Hat::from_index((b & 0x0F).wrapping_sub(1)));
        // The L4 label lands on the right paddle and vice versa.
        self.emit_button(ctx, buttons::RIGHT_PADDLE1, b & 0x40 != 0);
        self.emit_button(ctx, buttons::LEFT_PADDLE1, b & 0x80 != 0);
        self.emit_button(ctx, buttons::MISC2, b & 0x20 != 0);
    }

    fn decode_paddles(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::PADDLES] == packet[idx::PADDLES] {
            return;
        }
        let b = packet[idx::PADDLES];
        self.emit_button(ctx, buttons::LEFT_PADDLE2, b & 0x01 != 0);
        self.emit_button(ctx, buttons::RIGHT_PADDLE2, b & 0x02 != 0);
        self.emit_button(ctx, buttons::MISC3, b & 0x04 != 0);
        self.emit_button(ctx, buttons::MISC4, b & 0x08 != 0);
        self.emit_button(ctx, buttons::MISC5, b & 0x10 != 0);
        self.emit_button(ctx, buttons::MISC6, b & 0x20 != 0);
    }

    fn decode_sticks(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        let left = idx::LEFT_X..idx::LEFT_X + 4;
        if self.last_report[left.clone()] != packet[left] {
            let x = load_i16_be(packet, idx::LEFT_X);
            let y = load_i16_be(packet, idx::LEFT_X + 2);
            let (out_x, out_y) = apply_circular_deadzone(x, y.saturating_neg());
            self.emit_axis(ctx, axes::LEFTX, out_x);
            self.emit_axis(ctx, axes::LEFTY, out_y);
        }

        let right = idx::RIGHT_X..idx::RIGHT_X + 4;
        if self.last_report[right.clone()] != packet[right] {
            let x = load_i16_be(packet, idx::RIGHT_X);
            let y = load_i16_be(packet, idx::RIGHT_X + 2);
            let (out_x, out_y) = apply_circular_deadzone(x, y.saturating_neg());
            self.emit_axis(ctx, axes::RIGHTX, out_x);
            self.emit_axis(ctx, axes::RIGHTY, out_y);
        }
    }

    fn decode_triggers(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::LEFT_TRIGGER] != packet[idx::LEFT_TRIGGER] {
            let value = (i32::from(packet[idx::LEFT_TRIGGER]) * 255 - 32767) as i16;
            self.emit_axis(ctx, axes::LEFT_TRIGGER, value);
        }
        if self.last_report[idx::RIGHT_TRIGGER] != packet[idx::RIGHT_TRIGGER] {
            let value = (i32::from(packet[idx::RIGHT_TRIGGER]) * 255 - 32767) as i16;
            self.emit_axis(ctx, axes::RIGHT_TRIGGER, value);
        }
    }

    fn decode_sensors(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        if !self.sensors_supported || packet.len() < idx::MIN_SENSOR_LEN {
            return;
        }
        let timestamp = self.sensor_clock.tick(STEP_125HZ_NS);
        let accel = [
            f32::from(load_i16_be(packet, idx::ACCEL)) * ACCEL_SCALE,
            f32::from(load_i16_be(packet, idx::ACCEL + 2)) * ACCEL_SCALE,
            f32::from(load_i16_be(packet, idx::ACCEL + 4)) * ACCEL_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Accelerometer, timestamp, accel);
        let gyro = [
            f32::from(load_i16_be(packet, idx::GYRO)) * GYRO_SCALE,
            f32::from(load_i16_be(packet, idx::GYRO + 2)) * GYRO_SCALE,
            f32::from(load_i16_be(packet, idx::GYRO + 4)) * GYRO_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Gyroscope, timestamp, gyro);
    }

    fn write_command(&self, ctx: &mut SessionCtx<'_>, packet: &[u8]) -> DeviceResult<()> {
        ctx.io
            .write_report(packet)
            .map_err(|err| DeviceError::write_failed(self.device_name.as_str(), err.to_string()))?;
        Ok(())
    }
}

impl DriverSession for GameSirSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: true,
            trigger_rumble: true,
            rgb_led: false,
            player_led: false,
        }
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.decode_report(&report, ctx),
                Ok(None) => return SessionStatus::Running,
                Err(err) => {
                    debug!(error = %err, "GameSir: read failed, tearing down");
                    return SessionStatus::Disconnected;
                }
            }
        }
    }

    fn rumble(
        &mut self,
        low_frequency: u16,
        high_frequency: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        let mut packet = vec![0u8; COMMAND_LEN];
        packet[0] = COMMAND_REPORT_ID;
        packet[1] = cmd::RUMBLE;
        packet[2] = (low_frequency >> 8) as u8;
        packet[3] = (high_frequency >> 8) as u8;
        self.write_command(ctx, &packet)
    }

    fn rumble_triggers(
        &mut self,
        left_rumble: u16,
        right_rumble: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        // Same opcode as body rumble with the body bytes cleared, so the
        // two calls overwrite each other on the device.
        let mut packet = vec![0u8; COMMAND_LEN];
        packet[0] = COMMAND_REPORT_ID;
        packet[1] = cmd::RUMBLE;
        packet[4] = (left_rumble >> 8) as u8;
        packet[5] = (right_rumble >> 8) as u8;
        self.write_command(ctx, &packet)
    }

    fn set_led(
        &mut self,
        red: u8,
        green: u8,
        blue: u8,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        // The G7 Pro line has no RGB zone.
        if matches!(
            self.product_id,
            product::GAMESIR_G7_PRO | product::GAMESIR_G7_PRO_8K
        ) {
            return Err(DeviceError::FeatureNotSupported {
                device: self.device_name.clone(),
                feature: "led".to_owned(),
            });
        }
        let mut packet = vec![0u8; COMMAND_LEN];
        packet[0] = COMMAND_REPORT_ID;
        packet[1] = cmd::LED;
        packet[2] = 0x01;
        packet[3] = 0x01;
        packet[4] = red;
        packet[5] = green;
        packet[6] = blue;
        self.write_command(ctx, &packet)
    }
}
