//! Steam controller family (Nereid wired, Proteus wireless dongle).
//!
//! The controller multiplexes three report streams over one interface:
//! gamepad state, battery status and, on the dongle, radio events. The
//! dongle enumerates whether or not a controller is paired, so the logical
//! joystick attaches only once the radio reports a connection (or a state
//! packet proves one); the wired model attaches at open like everything
//! else. Firmware boots in lizard mode, emulating a keyboard and mouse
//! until the host claims it; the claim is a settings write that the
//! firmware silently forgets after a few seconds of host silence, so the
//! driver re-sends it on a three-second cadence. Rumble writes go straight
//! to the device instead of through the shared output slot.

use std::time::{Duration, Instant};

use tracing::debug;

use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::clock::DeviceClockUs;
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, Hat, HidDriver, JoystickCaps, PowerState, SensorKind, SessionCtx, SessionStatus,
};

const DEVICE_NAME: &str = "Steam Controller";

/// Host-to-device command pages: a report id plus a 64-byte body.
const COMMAND_LEN: usize = 65;
const FEATURE_REPORT_ID: u8 = 0x01;
const OUTPUT_REPORT_ID: u8 = 0x02;

/// How long the firmware holds a settings write before lizard mode creeps
/// back in.
const SETTINGS_REFRESH_INTERVAL: Duration = Duration::from_millis(3000);

/// The dongle exposes the controller pipe on these interfaces only; the
/// others carry keyboard/mouse emulation.
const DONGLE_INTERFACES: std::ops::RangeInclusive<i32> = 2..=5;

/// Device-to-host report ids.
mod msg {
    pub const CONTROLLER_STATE: u8 = 0x0A;
    pub const BATTERY_STATUS: u8 = 0x0B;
    pub const WIRELESS_STATUS: u8 = 0x0C;
    /// Older dongle firmware tags radio events with this id instead.
    pub const WIRELESS_STATUS_ALT: u8 = 0x0D;
}

/// Command page message types.
mod cmd {
    pub const SET_SETTINGS: u8 = 0x87;
    pub const HAPTIC_RUMBLE: u8 = 0xEB;
}

/// Settings carried by `cmd::SET_SETTINGS`, each `[num, value u16 LE]`.
mod setting {
    pub const LIZARD_MODE: u8 = 0x08;
    pub const IMU_MODE: u8 = 0x30;
}

const LIZARD_MODE_OFF: u16 = 0x0000;
const IMU_RAW_ACCEL: u16 = 0x0004;
const IMU_RAW_GYRO: u16 = 0x0010;

/// State report byte offsets. The motion block samples on a nominal
/// 4032 microsecond cadence and stamps each report with its device clock.
mod idx {
    pub const BUTTONS: usize = 1;
    pub const LEFT_TRIGGER: usize = 5;
    pub const RIGHT_TRIGGER: usize = 7;
    pub const LEFT_X: usize = 9;
    pub const LEFT_Y: usize = 11;
    pub const RIGHT_X: usize = 13;
    pub const RIGHT_Y: usize = 15;
    pub const IMU_TIMESTAMP: usize = 17;
    pub const GYRO: usize = 21;
    pub const ACCEL: usize = 27;
    pub const MIN_STATE_LEN: usize = ACCEL + 6;

    pub const BATTERY_LEVEL: usize = 1;
    pub const MIN_BATTERY_LEN: usize = 2;

    pub const WIRELESS_STATE: usize = 1;
    pub const MIN_WIRELESS_LEN: usize = 2;
}

/// Button bits in the state report's u32 mask. Menu and View land on Back
/// and Start respectively; the dpad bits fold into a hat.
mod btn {
    pub const A: u32 = 0x0000_0001;
    pub const B: u32 = 0x0000_0002;
    pub const X: u32 = 0x0000_0004;
    pub const Y: u32 = 0x0000_0008;
    pub const QUICK_ACCESS: u32 = 0x0000_0010;
    pub const RIGHT_STICK: u32 = 0x0000_0020;
    pub const VIEW: u32 = 0x0000_0040;
    pub const RIGHT_PADDLE_UPPER: u32 = 0x0000_0080;
    pub const RIGHT_PADDLE_LOWER: u32 = 0x0000_0100;
    pub const RIGHT_SHOULDER: u32 = 0x0000_0200;
    pub const DPAD_DOWN: u32 = 0x0000_0400;
    pub const DPAD_RIGHT: u32 = 0x0000_0800;
    pub const DPAD_LEFT: u32 = 0x0000_1000;
    pub const DPAD_UP: u32 = 0x0000_2000;
    pub const MENU: u32 = 0x0000_4000;
    pub const LEFT_STICK: u32 = 0x0000_8000;
    pub const STEAM: u32 = 0x0001_0000;
    pub const LEFT_PADDLE_UPPER: u32 = 0x0002_0000;
    pub const LEFT_PADDLE_LOWER: u32 = 0x0004_0000;
    pub const LEFT_SHOULDER: u32 = 0x0008_0000;
}

/// ±2000 degrees per second full scale.
const GYRO_SCALE: f32 = 2000.0 * DEG_TO_RAD / 32768.0;

/// ±2 g full scale.
const ACCEL_SCALE: f32 = 2.0 * STANDARD_GRAVITY / 32768.0;

/// Wireless status payload values.
const WIRELESS_DISCONNECT: u8 = 1;
const WIRELESS_CONNECT: u8 = 2;

fn load_i16(report: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([report[offset], report[offset + 1]])
}

fn load_u16(report: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([report[offset], report[offset + 1]])
}

fn load_u32(report: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        report[offset],
        report[offset + 1],
        report[offset + 2],
        report[offset + 3],
    ])
}

/// Triggers ride the wire as 15-bit travel; double it to span the axis.
fn trigger_value(raw: u16) -> i16 {
    (i32::from(raw.min(0x7FFF)) * 2 - 32768) as i16
}

/// Lizard-off plus raw IMU, in one settings page. Re-sent periodically so
/// a rebooted or freshly paired controller picks both up.
fn settings_packet() -> Vec<u8> {
    let mut report = vec![0u8; COMMAND_LEN];
    report[0] = FEATURE_REPORT_ID;
    report[1] = cmd::SET_SETTINGS;
    report[2] = 6;
    report[3] = setting::LIZARD_MODE;
    report[4..6].copy_from_slice(&LIZARD_MODE_OFF.to_le_bytes());
    report[6] = setting::IMU_MODE;
    report[7..9].copy_from_slice(&(IMU_RAW_ACCEL | IMU_RAW_GYRO).to_le_bytes());
    report
}

fn rumble_packet(low_frequency: u16, high_frequency: u16) -> Vec<u8> {
    let mut report = vec![0u8; COMMAND_LEN];
    report[0] = OUTPUT_REPORT_ID;
    report[1] = cmd::HAPTIC_RUMBLE;
    report[2] = 8;
    // type, intensity, then speed/gain per motor; gains stay at default.
    report[5..7].copy_from_slice(&low_frequency.to_le_bytes());
    report[8..10].copy_from_slice(&high_frequency.to_le_bytes());
    report
}

/// Driver for the Steam controller family.
pub struct TritonDriver;

impl HidDriver for TritonDriver {
    fn name(&self) -> &'static str {
        "triton"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_TRITON
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        if info.vendor_id != vendor::VALVE {
            return false;
        }
        match info.product_id {
            product::STEAM_NEREID => true,
            product::STEAM_PROTEUS_DONGLE => DONGLE_INTERFACES.contains(&info.interface_number),
            _ => false,
        }
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        _io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let wireless = info.product_id == product::STEAM_PROTEUS_DONGLE;
        debug!(
            wireless,
            bluetooth = info.is_bluetooth(),
            interface = info.interface_number,
            "Triton: opened"
        );
        Ok(Box::new(TritonSession {
            wireless,
            bluetooth: info.is_bluetooth(),
            connected: !wireless,
            settings_deadline: None,
            snapshot: InputSnapshot::default(),
            last_buttons: 0,
            last_imu_timestamp: 0,
            last_power: None,
            imu_clock: DeviceClockUs::new(),
        }))
    }
}

#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; axes::COUNT as usize],
    hat: Hat,
}

struct TritonSession {
    /// Dongle pipe; the logical joystick follows the radio, not the device.
    wireless: bool,
    bluetooth: bool,
    connected: bool,
    settings_deadline: Option<Instant>,
    snapshot: InputSnapshot,
    /// Raw wire mask; the whole state block is skipped while it holds.
    last_buttons: u32,
    last_imu_timestamp: u32,
    last_power: Option<(PowerState, i32)>,
    imu_clock: DeviceClockUs,
}

impl TritonSession {
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

    fn emit_hat(&mut self, ctx: &mut SessionCtx<'_>, value: Hat) {
        if self.snapshot.hat != value {
            self.snapshot.hat = value;
            ctx.sink.hat(0, value);
        }
    }

    fn handle_report(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(&id) = report.first() else {
            return;
        };
        match id {
            msg::CONTROLLER_STATE => {
                // The radio can drop a connect event; a state packet is
                // proof enough of a paired controller.
                if !self.connected {
                    self.set_connected(true, ctx);
                }
                self.decode_state(report, ctx);
            }
            msg::BATTERY_STATUS => self.decode_battery(report, ctx),
            msg::WIRELESS_STATUS | msg::WIRELESS_STATUS_ALT => self.decode_wireless(report, ctx),
            _ => debug!(id, len = report.len(), "Triton: ignoring unknown report"),
        }
    }

    fn set_connected(&mut self, connected: bool, ctx: &mut SessionCtx<'_>) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        if connected {
            // A fresh pairing starts clean; stale edge state would swallow
            // the new controller's first presses.
            self.snapshot = InputSnapshot::default();
            self.last_buttons = 0;
            self.last_imu_timestamp = 0;
            self.last_power = None;
            self.imu_clock = DeviceClockUs::new();
            self.settings_deadline = None;
            debug!("Triton: controller connected");
            if self.wireless {
                ctx.sink.joystick_connected();
            }
        } else {
            debug!("Triton: controller disconnected");
            if self.wireless {
                ctx.sink.joystick_disconnected();
            }
        }
    }

    fn decode_state(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if report.len() < idx::MIN_STATE_LEN {
            debug!(len = report.len(), "Triton: discarding short state report");
            return;
        }
        self.decode_buttons(report, ctx);
        self.decode_triggers(report, ctx);
        self.decode_sticks(report, ctx);
        self.decode_imu(report, ctx);
    }

    fn decode_buttons(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let mask = load_u32(report, idx::BUTTONS);
        if mask == self.last_buttons {
            return;
        }
        self.last_buttons = mask;
        self.emit_button(ctx, buttons::SOUTH, mask & btn::A != 0);
        self.emit_button(ctx, buttons::EAST, mask & btn::B != 0);
        self.emit_button(ctx, buttons::WEST, mask & btn::X != 0);
        self.emit_button(ctx, buttons::NORTH, mask & btn::Y != 0);
        self.emit_button(ctx, buttons::LEFT_SHOULDER, mask & btn::LEFT_SHOULDER != 0);
        self.emit_button(ctx, buttons::RIGHT_SHOULDER, mask & btn::RIGHT_SHOULDER != 0);
        self.emit_button(ctx, buttons::BACK, mask & btn::MENU != 0);
        self.emit_button(ctx, buttons::START, mask & btn::VIEW != 0);
        self.emit_button(ctx, buttons::GUIDE, mask & btn::STEAM != 0);
        self.emit_button(ctx, buttons::MISC1, mask & btn::QUICK_ACCESS != 0);
        self.emit_button(ctx, buttons::LEFT_STICK, mask & btn::LEFT_STICK != 0);
        self.emit_button(ctx, buttons::RIGHT_STICK, mask & btn::RIGHT_STICK != 0);
        self.emit_button(
            ctx,
            buttons::RIGHT_PADDLE1,
            mask & btn::RIGHT_PADDLE_UPPER != 0,
        );
        self.emit_button(ctx, buttons::LEFT_PADDLE1, mask & btn::LEFT_PADDLE_UPPER != 0);
        self.emit_button(
            ctx,
            buttons::RIGHT_PADDLE2,
            mask & btn::RIGHT_PADDLE_LOWER != 0,
        );
        self.emit_button(ctx, buttons::LEFT_PADDLE2, mask & btn::LEFT_PADDLE_LOWER != 0);
        let hat = Hat::from_dpad(
            mask & btn::DPAD_UP != 0,
            mask & btn::DPAD_DOWN != 0,
            mask & btn::DPAD_LEFT != 0,
            mask & btn::DPAD_RIGHT != 0,
        );
        self.emit_hat(ctx, hat);
    }

    fn decode_triggers(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let left = trigger_value(load_u16(report, idx::LEFT_TRIGGER));
        let right = trigger_value(load_u16(report, idx::RIGHT_TRIGGER));
        self.emit_axis(ctx, axes::LEFT_TRIGGER, left);
        self.emit_axis(ctx, axes::RIGHT_TRIGGER, right);
    }

    fn decode_sticks(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        self.emit_axis(ctx, axes::LEFTX, load_i16(report, idx::LEFT_X));
        self.emit_axis(
            ctx,
            axes::LEFTY,
            load_i16(report, idx::LEFT_Y).saturating_neg(),
        );
        self.emit_axis(ctx, axes::RIGHTX, load_i16(report, idx::RIGHT_X));
        self.emit_axis(
            ctx,
            axes::RIGHTY,
            load_i16(report, idx::RIGHT_Y).saturating_neg(),
        );
    }

    fn decode_imu(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let raw_timestamp = load_u32(report, idx::IMU_TIMESTAMP);
        if raw_timestamp == self.last_imu_timestamp {
            return;
        }
        self.last_imu_timestamp = raw_timestamp;
        let timestamp = self.imu_clock.advance(raw_timestamp);
        // Sensor frame is x forward-right, z out of the pad, y folded in
        // negated. The gyro sample leads the accelerometer on this part.
        let gyro = [
            f32::from(load_i16(report, idx::GYRO)) * GYRO_SCALE,
            f32::from(load_i16(report, idx::GYRO + 4)) * GYRO_SCALE,
            -f32::from(load_i16(report, idx::GYRO + 2)) * GYRO_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Gyroscope, timestamp, gyro);
        let accel = [
            f32::from(load_i16(report, idx::ACCEL)) * ACCEL_SCALE,
            f32::from(load_i16(report, idx::ACCEL + 4)) * ACCEL_SCALE,
            -f32::from(load_i16(report, idx::ACCEL + 2)) * ACCEL_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Accelerometer, timestamp, accel);
    }

    fn decode_battery(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if report.len() < idx::MIN_BATTERY_LEN {
            return;
        }
        let level = i32::from(report[idx::BATTERY_LEVEL]).clamp(0, 100);
        // A radio link means running off the cell; over the wire the cell
        // is topping up until it reads full.
        let state = if self.bluetooth || self.wireless {
            PowerState::OnBattery
        } else if level == 100 {
            PowerState::Charged
        } else {
            PowerState::Charging
        };
        if self.last_power != Some((state, level)) {
            self.last_power = Some((state, level));
            ctx.sink.power(state, level);
        }
    }

    fn decode_wireless(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if report.len() < idx::MIN_WIRELESS_LEN {
            return;
        }
        match report[idx::WIRELESS_STATE] {
            WIRELESS_CONNECT => self.set_connected(true, ctx),
            WIRELESS_DISCONNECT => self.set_connected(false, ctx),
            state => debug!(state, "Triton: ignoring unknown radio state"),
        }
    }

    /// Keep lizard mode suppressed and the IMU streaming. The firmware
    /// drops both settings after a few seconds without a host write.
    fn refresh_settings(&mut self, ctx: &mut SessionCtx<'_>) {
        if !self.connected {
            return;
        }
        let due = match self.settings_deadline {
            None => true,
            Some(deadline) => ctx.now >= deadline,
        };
        if !due {
            return;
        }
        if let Err(err) = ctx.io.send_feature_report(&settings_packet()) {
            debug!(error = %err, "Triton: settings refresh failed");
        }
        self.settings_deadline = Some(ctx.now + SETTINGS_REFRESH_INTERVAL);
    }
}

impl DriverSession for TritonSession {
    fn device_name(&self) -> &str {
        DEVICE_NAME
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: true,
            trigger_rumble: false,
            rgb_led: false,
            player_led: false,
        }
    }

    fn attaches_on_open(&self) -> bool {
        // The dongle is always present; the joystick tracks the radio.
        !self.wireless
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.handle_report(&report, ctx),
                Ok(None) => {
                    self.refresh_settings(ctx);
                    return SessionStatus::Running;
                }
                Err(err) => {
                    debug!(error = %err, "Triton: read failed, tearing down");
                    if self.wireless && self.connected {
                        self.connected = false;
                        ctx.sink.joystick_disconnected();
                    }
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
        // Not routed through the output queue; back-to-back pulse trains
        // must not coalesce into one write.
        ctx.io
            .write_report(&rumble_packet(low_frequency, high_frequency))
            .map_err(|err| DeviceError::write_failed(DEVICE_NAME, err.to_string()))?;
        Ok(())
    }

    fn close(&mut self, ctx: &mut SessionCtx<'_>) {
        // Lizard mode resumes on its own once the settings refresh stops.
        if self.wireless && self.connected {
            self.connected = false;
            ctx.sink.joystick_disconnected();
        }
    }
}
