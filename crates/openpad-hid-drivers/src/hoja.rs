//! Hoja open-firmware gamepad driver.
//!
//! Hoja is a community gamepad firmware for RP2040-class boards. The device
//! answers a GETINFO command at open with a feature bitmap, sensor ranges,
//! and its display name; everything after that is a fixed-layout input
//! report. Button bits are active low, the dpad arrives as four plain
//! buttons, and motion frames carry a device-side microsecond delta that we
//! accumulate into the sensor timestamp.

use tracing::debug;

use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, HidDriver, JoystickCaps, PowerState, SensorKind, SessionCtx, SessionStatus,
};

/// Every report in either direction is this long.
const DEVICE_REPORT_SIZE: usize = 64;

/// Host-to-device commands omit the leading HID report id byte.
const COMMAND_PACKET_LEN: usize = 63;

const REPORT_ID_JOYSTICK_INPUT: u8 = 0x01;
const REPORT_ID_COMMAND_OUTPUT: u8 = 0x03;
const REPORT_ID_COMMAND_INPUT: u8 = 0x04;

const COMMAND_GETINFO: u8 = 0x01;
const COMMAND_SET_PLAYER_NUM: u8 = 0x02;

const INFO_ATTEMPTS: u32 = 6;
const INFO_TIMEOUT_MS: u32 = 1000;

/// Feature bits in byte 2 of the GETINFO reply.
mod feature {
    pub const HAPTICS: u8 = 0x01;
    pub const PLAYER_LED: u8 = 0x02;
    pub const ACCEL: u8 = 0x04;
    pub const GYRO: u8 = 0x08;
    pub const LEFT_STICK: u8 = 0x10;
    pub const RIGHT_STICK: u8 = 0x20;
    pub const LEFT_ANALOG_TRIGGER: u8 = 0x40;
    pub const RIGHT_ANALOG_TRIGGER: u8 = 0x80;
}

/// Input report byte offsets.
mod idx {
    pub const PLUG_STATUS: usize = 1;
    pub const CHARGE_LEVEL: usize = 2;
    pub const BUTTONS_0: usize = 3;
    pub const BUTTONS_1: usize = 4;
    pub const BUTTONS_2: usize = 5;
    pub const LEFT_X: usize = 7;
    pub const LEFT_Y: usize = 9;
    pub const RIGHT_X: usize = 11;
    pub const RIGHT_Y: usize = 13;
    pub const LEFT_TRIGGER: usize = 15;
    pub const RIGHT_TRIGGER: usize = 17;
    pub const IMU_TIMESTAMP: usize = 19;
    pub const IMU_ACCEL_X: usize = 21;
    pub const IMU_GYRO_X: usize = 27;

    /// Shortest report that still holds the last gyro word.
    pub const MIN_INPUT_LEN: usize = IMU_GYRO_X + 6;
}

/// GETINFO reply byte offsets.
mod info {
    pub const FEATURES: usize = 2;
    pub const ACCEL_RANGE: usize = 6;
    pub const GYRO_RANGE: usize = 8;
    pub const NAME: usize = 10;
    pub const NAME_SIZE: usize = 32;
}

const DEFAULT_NAME: &str = "Hoja Gamepad";

fn load_i16(report: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([report[offset], report[offset + 1]])
}

fn load_u16(report: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([report[offset], report[offset + 1]])
}

/// Driver for gamepads running the Hoja firmware.
pub struct HojaDriver;

impl HidDriver for HojaDriver {
    fn name(&self) -> &'static str {
        "hoja"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_HOJA
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::RASPBERRYPI && info.product_id == product::HOJA_GAMEPAD
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let session = HojaSession::open(info, io)?;
        Ok(Box::new(session))
    }
}

/// Capabilities and calibration from the GETINFO reply.
struct HojaInfo {
    features: u8,
    accel_range: u16,
    gyro_range: u16,
    device_name: Option<String>,
}

fn parse_device_info(report: &[u8]) -> Option<HojaInfo> {
    if report.len() != DEVICE_REPORT_SIZE
        || report[0] != REPORT_ID_COMMAND_INPUT
        || report[1] != COMMAND_GETINFO
    {
        return None;
    }
    let raw_name = &report[info::NAME..info::NAME + info::NAME_SIZE];
    let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
    let device_name = if end == 0 {
        None
    } else {
        Some(String::from_utf8_lossy(&raw_name[..end]).into_owned())
    };
    Some(HojaInfo {
        features: report[info::FEATURES],
        accel_range: load_u16(report, info::ACCEL_RANGE),
        gyro_range: load_u16(report, info::GYRO_RANGE),
        device_name,
    })
}

/// Last values handed to the sink, per control.
#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; axes::COUNT as usize],
}

struct HojaSession {
    device_name: String,
    features: u8,
    accel_scale: f32,
    gyro_scale: f32,
    snapshot: InputSnapshot,
    last_report: [u8; DEVICE_REPORT_SIZE],
    last_power: Option<(PowerState, i32)>,
    /// Accumulated from the per-report microsecond deltas.
    imu_timestamp_ns: u64,
}

impl HojaSession {
    fn open(info: &HidDeviceInfo, io: &mut dyn HidDeviceIo) -> Result<Self> {
        let mut command = [0u8; COMMAND_PACKET_LEN];
        command[0] = REPORT_ID_COMMAND_OUTPUT;
        command[1] = COMMAND_GETINFO;
        io.write_report(&command)
            .map_err(|err| DeviceError::write_failed(info.display_name(), err.to_string()))?;

        let mut device_info = None;
        for _ in 0..INFO_ATTEMPTS {
            match io.read_report(INFO_TIMEOUT_MS) {
                Ok(Some(reply)) => {
                    if let Some(parsed) = parse_device_info(&reply) {
                        device_info = Some(parsed);
                        break;
                    }
                    // Input reports can race the reply; skip them.
                }
                Ok(None) => {}
                Err(err) => {
                    return Err(
                        DeviceError::read_failed(info.display_name(), err.to_string()).into()
                    );
                }
            }
        }
        let Some(device_info) = device_info else {
            return Err(DeviceError::timeout(
                info.display_name(),
                u64::from(INFO_ATTEMPTS * INFO_TIMEOUT_MS),
            )
            .into());
        };

        let device_name = device_info
            .device_name
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        debug!(
            name = %device_name,
            features = device_info.features,
            "Hoja: device identified"
        );
        Ok(Self {
            device_name,
            features: device_info.features,
            // The hardware maps +-range to the full i16 span.
            accel_scale: STANDARD_GRAVITY / f32::from(device_info.accel_range),
            gyro_scale: f32::from(device_info.gyro_range) * DEG_TO_RAD / 32767.0,
            snapshot: InputSnapshot::default(),
            last_report: [0; DEVICE_REPORT_SIZE],
            last_power: None,
            imu_timestamp_ns: 0,
        })
    }

    fn has_feature(&self, bit: u8) -> bool {
        self.features & bit != 0
    }

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

    fn decode_report(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if report.first() != Some(&REPORT_ID_JOYSTICK_INPUT) || report.len() < idx::MIN_INPUT_LEN {
            debug!(len = report.len(), "Hoja: discarding unrecognized report");
            return;
        }
        self.decode_buttons(report, ctx);
        self.decode_axes(report, ctx);
        self.decode_power(report, ctx);
        self.decode_imu(report, ctx);

        let n = report.len().min(self.last_report.len());
        self.last_report[..n].copy_from_slice(&report[..n]);
    }

    // Button bits are active low: a zero bit means pressed.
    fn decode_buttons(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::BUTTONS_0] != report[idx::BUTTONS_0] {
            let b = report[idx::BUTTONS_0];
            self.emit_button(ctx, buttons::SOUTH, b & 0x01 == 0);
            self.emit_button(ctx, buttons::EAST, b & 0x02 == 0);
            self.emit_button(ctx, buttons::WEST, b & 0x04 == 0);
            self.emit_button(ctx, buttons::NORTH, b & 0x08 == 0);
            self.emit_button(ctx, buttons::BACK, b & 0x10 == 0);
            self.emit_button(ctx, buttons::GUIDE, b & 0x20 == 0);
            self.emit_button(ctx, buttons::START, b & 0x40 == 0);
            self.emit_button(ctx, buttons::LEFT_STICK, b & 0x80 == 0);
        }

        if self.last_report[idx::BUTTONS_1] != report[idx::BUTTONS_1] {
            let b = report[idx::BUTTONS_1];
            self.emit_button(ctx, buttons::RIGHT_STICK, b & 0x01 == 0);
            self.emit_button(ctx, buttons::LEFT_SHOULDER, b & 0x02 == 0);
            self.emit_button(ctx, buttons::RIGHT_SHOULDER, b & 0x04 == 0);
            self.emit_button(ctx, buttons::DPAD_UP, b & 0x08 == 0);
            self.emit_button(ctx, buttons::DPAD_DOWN, b & 0x10 == 0);
            self.emit_button(ctx, buttons::DPAD_LEFT, b & 0x20 == 0);
            self.emit_button(ctx, buttons::DPAD_RIGHT, b & 0x40 == 0);
            self.emit_button(ctx, buttons::MISC1, b & 0x80 == 0);
        }

        if self.last_report[idx::BUTTONS_2] != report[idx::BUTTONS_2] {
            let b = report[idx::BUTTONS_2];
            self.emit_button(ctx, buttons::RIGHT_PADDLE1, b & 0x01 == 0);
            self.emit_button(ctx, buttons::LEFT_PADDLE1, b & 0x02 == 0);
            self.emit_button(ctx, buttons::RIGHT_PADDLE2, b & 0x04 == 0);
            self.emit_button(ctx, buttons::LEFT_PADDLE2, b & 0x08 == 0);
            self.emit_button(ctx, buttons::TOUCHPAD, b & 0x10 == 0);
        }
    }

    fn decode_axes(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.has_feature(feature::LEFT_STICK) {
            self.emit_axis(ctx, axes::LEFTX, load_i16(report, idx::LEFT_X));
            self.emit_axis(ctx, axes::LEFTY, load_i16(report, idx::LEFT_Y));
        }
        if self.has_feature(feature::RIGHT_STICK) {
            self.emit_axis(ctx, axes::RIGHTX, load_i16(report, idx::RIGHT_X));
            self.emit_axis(ctx, axes::RIGHTY, load_i16(report, idx::RIGHT_Y));
        }
        if self.has_feature(feature::LEFT_ANALOG_TRIGGER) {
            self.emit_axis(ctx, axes::LEFT_TRIGGER, load_i16(report, idx::LEFT_TRIGGER));
        }
        if self.has_feature(feature::RIGHT_ANALOG_TRIGGER) {
            self.emit_axis(ctx, axes::RIGHT_TRIGGER, load_i16(report, idx::RIGHT_TRIGGER));
        }
    }

    fn decode_power(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[idx::PLUG_STATUS] == report[idx::PLUG_STATUS]
            && self.last_report[idx::CHARGE_LEVEL] == report[idx::CHARGE_LEVEL]
        {
            return;
        }
        let percent = i32::from(report[idx::CHARGE_LEVEL]).clamp(0, 100);
        let sample = match report[idx::PLUG_STATUS] {
            0 => (PowerState::OnBattery, percent),
            2 => (PowerState::Charging, percent),
            3 => (PowerState::Charged, 100),
            _ => (PowerState::Unknown, 0),
        };
        if self.last_power != Some(sample) {
            self.last_power = Some(sample);
            ctx.sink.power(sample.0, sample.1);
        }
    }

    fn decode_imu(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let delta_us = load_u16(report, idx::IMU_TIMESTAMP);
        if delta_us == 0 {
            return;
        }
        self.imu_timestamp_ns += u64::from(delta_us) * 1_000;
        if self.has_feature(feature::ACCEL) {
            let values = [
                f32::from(load_i16(report, idx::IMU_ACCEL_X)) * self.accel_scale,
                f32::from(load_i16(report, idx::IMU_ACCEL_X + 2)) * self.accel_scale,
                f32::from(load_i16(report, idx::IMU_ACCEL_X + 4)) * self.accel_scale,
            ];
            ctx.sink
                .sensor(SensorKind::Accelerometer, self.imu_timestamp_ns, values);
        }
        if self.has_feature(feature::GYRO) {
            let values = [
                f32::from(load_i16(report, idx::IMU_GYRO_X)) * self.gyro_scale,
                f32::from(load_i16(report, idx::IMU_GYRO_X + 2)) * self.gyro_scale,
                f32::from(load_i16(report, idx::IMU_GYRO_X + 4)) * self.gyro_scale,
            ];
            ctx.sink
                .sensor(SensorKind::Gyroscope, self.imu_timestamp_ns, values);
        }
    }
}

impl DriverSession for HojaSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: self.has_feature(feature::HAPTICS),
            trigger_rumble: false,
            rgb_led: false,
            player_led: self.has_feature(feature::PLAYER_LED),
        }
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.decode_report(&report, ctx),
                Ok(None) => return SessionStatus::Running,
                Err(err) => {
                    debug!(error = %err, "Hoja: read failed, tearing down");
                    return SessionStatus::Disconnected;
                }
            }
        }
    }

    fn set_player_index(&mut self, player_index: i32, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        // The firmware tracks up to eight players but takes any byte.
        let player_num = player_index.clamp(0, 255) as u8;
        let mut command = [0u8; COMMAND_PACKET_LEN];
        command[0] = REPORT_ID_COMMAND_OUTPUT;
        command[1] = COMMAND_SET_PLAYER_NUM;
        command[2] = player_num;
        if let Err(err) = ctx.io.write_report(&command) {
            debug!(error = %err, "Hoja: player index write failed");
        }
        Ok(())
    }
}
