//! 8BitDo controller driver.
//!
//! Covers the Ultimate 2 Wireless pad. The pad speaks one of two report
//! layouts: the modern one (report id 0x03 over USB, 0x01 over Bluetooth)
//! and an unnumbered fixed 9-byte layout used by older firmware. Firmware
//! 1.03 and later pads the modern report out far enough to carry a battery
//! byte and motion words, and accepts rumble output; whether a given pad
//! has that firmware is detected at open from the size of the first report
//! off the wire.

use tracing::debug;

use gamepad_eightbitdo_report::{
    legacy, modern, parse_legacy_input, parse_modern_input, split_power_byte, LegacyInputRaw,
    ModernInputRaw, SensorWordsRaw,
};
use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::axis::{stick_from_u8, trigger_from_u8};
use openpad_joystick_core::clock::{SensorClock, STEP_125HZ_NS};
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, Hat, HidDriver, JoystickCaps, OutputRequest, PowerState, SensorKind,
    SessionCtx, SessionStatus,
};

/// Reports at least this long come from firmware 1.03 or later, which
/// also means battery, motion, and rumble support.
const EXTENDED_REPORT_LEN: usize = 34;

/// How long to wait for the first report before assuming older firmware.
const PROBE_TIMEOUT_MS: u32 = 80;

/// Output report id that drives the two rumble motors.
const RUMBLE_REPORT_ID: u8 = 0x05;

/// Shadow copy of the last report, used to gate decode work on byte-level
/// changes.
const LAST_REPORT_LEN: usize = 32;

// The dpad rides the hat, so the four dpad slots carry the extras.
const BUTTON_L4: u8 = buttons::RIGHT_SHOULDER + 1;
const BUTTON_R4: u8 = BUTTON_L4 + 1;
const BUTTON_PL: u8 = BUTTON_R4 + 1;
const BUTTON_PR: u8 = BUTTON_PL + 1;

/// Accelerometer words cover a +-8g range: 4096 counts per g.
const ACCEL_SCALE: f32 = STANDARD_GRAVITY / 4096.0;

/// Gyro words cover +-2048 degrees per second across the i16 range.
const GYRO_SCALE: f32 = 2048.0 * DEG_TO_RAD / 32767.0;

/// Driver for 8BitDo pads with a native HID protocol. Earlier 8BitDo
/// models enumerate as XInput or Switch pads and are handled elsewhere.
pub struct EightBitDoDriver;

impl HidDriver for EightBitDoDriver {
    fn name(&self) -> &'static str {
        "8bitdo"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_8BITDO
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::EIGHTBITDO
            && info.product_id == product::EIGHTBITDO_ULTIMATE2_WIRELESS
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        Ok(Box::new(EightBitDoSession::new(info, io)))
    }
}

/// Last values handed to the sink, per control.
#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; axes::COUNT as usize],
    hat: Hat,
}

struct EightBitDoSession {
    device_name: String,
    /// Firmware 1.03+: battery, motion, and rumble are available.
    extended: bool,
    snapshot: InputSnapshot,
    last_report: [u8; LAST_REPORT_LEN],
    last_power: Option<(PowerState, i32)>,
    sensor_clock: SensorClock,
}

impl EightBitDoSession {
    fn new(info: &HidDeviceInfo, io: &mut dyn HidDeviceIo) -> Self {
        let extended = match io.read_report(PROBE_TIMEOUT_MS) {
            Ok(Some(report)) => report.len() >= EXTENDED_REPORT_LEN,
            Ok(None) => false,
            Err(err) => {
                debug!(error = %err, "8BitDo: probe read failed");
                false
            }
        };
        debug!(extended, "8BitDo: opened");
        Self {
            device_name: info.display_name(),
            extended,
            snapshot: InputSnapshot::default(),
            last_report: [0; LAST_REPORT_LEN],
            last_power: None,
            sensor_clock: SensorClock::new(),
        }
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

    fn emit_hat(&mut self, ctx: &mut SessionCtx<'_>, hat: Hat) {
        if self.snapshot.hat != hat {
            self.snapshot.hat = hat;
            ctx.sink.hat(0, hat);
        }
    }

    fn decode_report(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if let Some(raw) = parse_modern_input(report) {
            self.decode_modern(raw, report, ctx);
        } else if let Some(raw) = parse_legacy_input(report) {
            self.decode_legacy(raw, report, ctx);
        } else {
            debug!(len = report.len(), "8BitDo: discarding unrecognized report");
        }
    }

    fn decode_modern(&mut self, raw: ModernInputRaw, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[modern::HAT] != raw.hat {
            self.emit_hat(ctx, Hat::from_index(raw.hat));
        }

        if self.last_report[modern::BUTTONS_LOW] != raw.buttons_low {
            let b = raw.buttons_low;
            self.emit_button(ctx, buttons::SOUTH, b & modern::buttons_low::SOUTH != 0);
            self.emit_button(ctx, buttons::EAST, b & modern::buttons_low::EAST != 0);
            self.emit_button(ctx, buttons::WEST, b & modern::buttons_low::WEST != 0);
            self.emit_button(ctx, buttons::NORTH, b & modern::buttons_low::NORTH != 0);
            self.emit_button(
                ctx,
                buttons::LEFT_SHOULDER,
                b & modern::buttons_low::LEFT_SHOULDER != 0,
            );
            self.emit_button(
                ctx,
                buttons::RIGHT_SHOULDER,
                b & modern::buttons_low::RIGHT_SHOULDER != 0,
            );
            self.emit_button(ctx, BUTTON_PL, b & modern::buttons_low::PL != 0);
            self.emit_button(ctx, BUTTON_PR, b & modern::buttons_low::PR != 0);
        }

        if self.last_report[modern::BUTTONS_HIGH] != raw.buttons_high {
            let b = raw.buttons_high;
            self.emit_button(ctx, buttons::BACK, b & modern::buttons_high::BACK != 0);
            self.emit_button(ctx, buttons::START, b & modern::buttons_high::START != 0);
            self.emit_button(ctx, buttons::GUIDE, b & modern::buttons_high::GUIDE != 0);
            self.emit_button(
                ctx,
                buttons::LEFT_STICK,
                b & modern::buttons_high::LEFT_STICK != 0,
            );
            self.emit_button(
                ctx,
                buttons::RIGHT_STICK,
                b & modern::buttons_high::RIGHT_STICK != 0,
            );
        }

        if self.last_report[modern::BUTTONS_EXT] != raw.buttons_ext {
            let b = raw.buttons_ext;
            self.emit_button(ctx, BUTTON_L4, b & modern::buttons_ext::L4 != 0);
            self.emit_button(ctx, BUTTON_R4, b & modern::buttons_ext::R4 != 0);
        }

        self.emit_axis(ctx, axes::LEFTX, stick_from_u8(raw.sticks.left_x));
        self.emit_axis(ctx, axes::LEFTY, stick_from_u8(raw.sticks.left_y));
        self.emit_axis(ctx, axes::RIGHTX, stick_from_u8(raw.sticks.right_x));
        self.emit_axis(ctx, axes::RIGHTY, stick_from_u8(raw.sticks.right_y));
        self.emit_axis(ctx, axes::LEFT_TRIGGER, trigger_from_u8(raw.trigger_left));
        self.emit_axis(ctx, axes::RIGHT_TRIGGER, trigger_from_u8(raw.trigger_right));

        if self.extended {
            if let Some(power) = raw.power {
                self.emit_power(ctx, power);
            }
            if let Some(words) = raw.sensors {
                self.emit_sensors(ctx, words);
            }
        }

        self.remember_report(report);
    }

    fn decode_legacy(&mut self, raw: LegacyInputRaw, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.last_report[legacy::BUTTONS_LOW] != raw.buttons_low {
            let b = raw.buttons_low;
            self.emit_button(ctx, buttons::SOUTH, b & legacy::buttons_low::SOUTH != 0);
            self.emit_button(ctx, buttons::EAST, b & legacy::buttons_low::EAST != 0);
            self.emit_button(ctx, buttons::WEST, b & legacy::buttons_low::WEST != 0);
            self.emit_button(ctx, buttons::NORTH, b & legacy::buttons_low::NORTH != 0);
            self.emit_button(
                ctx,
                buttons::LEFT_SHOULDER,
                b & legacy::buttons_low::LEFT_SHOULDER != 0,
            );
            self.emit_button(
                ctx,
                buttons::RIGHT_SHOULDER,
                b & legacy::buttons_low::RIGHT_SHOULDER != 0,
            );
        }

        if self.last_report[legacy::BUTTONS_HIGH] != raw.buttons_high {
            let b = raw.buttons_high;
            self.emit_button(ctx, buttons::BACK, b & legacy::buttons_high::BACK != 0);
            self.emit_button(ctx, buttons::START, b & legacy::buttons_high::START != 0);
            self.emit_button(ctx, buttons::GUIDE, b & legacy::buttons_high::GUIDE != 0);
            self.emit_button(
                ctx,
                buttons::LEFT_STICK,
                b & legacy::buttons_high::LEFT_STICK != 0,
            );
            self.emit_button(
                ctx,
                buttons::RIGHT_STICK,
                b & legacy::buttons_high::RIGHT_STICK != 0,
            );
        }

        if self.last_report[legacy::HAT] != raw.hat {
            self.emit_hat(ctx, Hat::from_index(raw.hat));
        }

        self.emit_axis(ctx, axes::LEFTX, stick_from_u8(raw.sticks.left_x));
        self.emit_axis(ctx, axes::LEFTY, stick_from_u8(raw.sticks.left_y));
        self.emit_axis(ctx, axes::RIGHTX, stick_from_u8(raw.sticks.right_x));
        self.emit_axis(ctx, axes::RIGHTY, stick_from_u8(raw.sticks.right_y));
        self.emit_axis(ctx, axes::LEFT_TRIGGER, trigger_from_u8(raw.trigger_left));
        self.emit_axis(ctx, axes::RIGHT_TRIGGER, trigger_from_u8(raw.trigger_right));

        self.remember_report(report);
    }

    fn emit_power(&mut self, ctx: &mut SessionCtx<'_>, power: u8) {
        let (externally_powered, level) = split_power_byte(power);
        let sample = if level == 100 {
            (PowerState::Charged, 100)
        } else if externally_powered {
            (PowerState::Charging, i32::from(level))
        } else {
            (PowerState::OnBattery, i32::from(level))
        };
        if self.last_power != Some(sample) {
            self.last_power = Some(sample);
            ctx.sink.power(sample.0, sample.1);
        }
    }

    /// Both motion frames in a report share one simulated timestamp; the
    /// hardware samples at 125Hz.
    fn emit_sensors(&mut self, ctx: &mut SessionCtx<'_>, words: SensorWordsRaw) {
        let timestamp = self.sensor_clock.tick(STEP_125HZ_NS);
        let gyro = [
            -f32::from(words.gyro[1]) * GYRO_SCALE,
            f32::from(words.gyro[2]) * GYRO_SCALE,
            -f32::from(words.gyro[0]) * GYRO_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Gyroscope, timestamp, gyro);
        let accel = [
            -f32::from(words.accel[1]) * ACCEL_SCALE,
            f32::from(words.accel[2]) * ACCEL_SCALE,
            -f32::from(words.accel[0]) * ACCEL_SCALE,
        ];
        ctx.sink.sensor(SensorKind::Accelerometer, timestamp, accel);
    }

    fn remember_report(&mut self, report: &[u8]) {
        let n = report.len().min(self.last_report.len());
        self.last_report[..n].copy_from_slice(&report[..n]);
    }
}

impl DriverSession for EightBitDoSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: self.extended,
            ..JoystickCaps::default()
        }
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.decode_report(&report, ctx),
                Ok(None) => return SessionStatus::Running,
                Err(err) => {
                    debug!(error = %err, "8BitDo: read failed, tearing down");
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
        if !self.extended {
            return Err(DeviceError::FeatureNotSupported {
                device: self.device_name.clone(),
                feature: "rumble".to_string(),
            });
        }
        let packet = vec![
            RUMBLE_REPORT_ID,
            (low_frequency >> 8) as u8,
            (high_frequency >> 8) as u8,
            0x00,
            0x00,
        ];
        ctx.output.request(OutputRequest::output(packet));
        Ok(())
    }
}
