//! SInput gamepads.
//!
//! SInput is an open HID protocol for hobbyist controller firmware, shipped
//! on the Handheld Legend boards among others; the wire format is documented
//! at <https://docs.handheldlegend.com/s/sinput>. The device describes itself
//! at open time through a features exchange: capability bits, a four-byte
//! button usage mask, sensor ranges and touchpad counts. Buttons are numbered
//! contiguously from the usage mask, so pads with different hardware share
//! the decode path without leaving holes in the button set. When all four
//! dpad bits are present they collapse into a hat instead.

use tracing::debug;

use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::clock::DeviceClockUs;
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, Hat, HidDriver, JoystickCaps, OutputRequest, PowerState, SensorKind,
    SessionCtx, SessionStatus,
};

/// Input and command-input reports are this long.
const DEVICE_REPORT_SIZE: usize = 64;

/// Host-to-device command reports are shorter.
const COMMAND_REPORT_SIZE: usize = 48;

const REPORT_ID_JOYSTICK_INPUT: u8 = 0x01;
const REPORT_ID_COMMAND_INPUT: u8 = 0x02;
const REPORT_ID_COMMAND_OUTPUT: u8 = 0x03;

const COMMAND_HAPTIC: u8 = 0x01;
const COMMAND_FEATURES: u8 = 0x02;
const COMMAND_PLAYER_LED: u8 = 0x03;
const COMMAND_RGB: u8 = 0x04;

/// Simple amplitude haptics; type 0x01 would carry frequency pairs.
const HAPTIC_TYPE_ERM: u8 = 0x02;

const SUBTYPE_SUPER_GAMEPAD_PLUS: u8 = 0x01;

const FEATURES_WRITE_ATTEMPTS: u32 = 8;
const FEATURES_POLL_ATTEMPTS: u32 = 100;
const FEATURES_POLL_TIMEOUT_MS: u32 = 1;

const MAX_TOUCHPADS: u8 = 2;

/// Input report byte offsets. Four button-mask bytes follow `BUTTONS_0`.
mod idx {
    pub const PLUG_STATUS: usize = 1;
    pub const CHARGE_LEVEL: usize = 2;
    pub const BUTTONS_0: usize = 3;
    pub const LEFT_X: usize = 7;
    pub const LEFT_Y: usize = 9;
    pub const RIGHT_X: usize = 11;
    pub const RIGHT_Y: usize = 13;
    pub const LEFT_TRIGGER: usize = 15;
    pub const RIGHT_TRIGGER: usize = 17;
    pub const IMU_TIMESTAMP: usize = 19;
    pub const IMU_ACCEL_X: usize = 23;
    pub const IMU_ACCEL_Y: usize = 25;
    pub const IMU_ACCEL_Z: usize = 27;
    pub const IMU_GYRO_X: usize = 29;
    pub const IMU_GYRO_Y: usize = 31;
    pub const IMU_GYRO_Z: usize = 33;
    pub const TOUCH1_X: usize = 35;
    pub const TOUCH2_X: usize = 41;
    pub const TOUCH2_PRESSURE: usize = 45;

    /// Shortest report that still holds the second touch point.
    pub const MIN_INPUT_LEN: usize = TOUCH2_PRESSURE + 2;
}

/// Dpad bits inside the first button byte.
mod dpad {
    pub const UP: u8 = 0x10;
    pub const DOWN: u8 = 0x20;
    pub const LEFT: u8 = 0x40;
    pub const RIGHT: u8 = 0x80;
    pub const MASK: u8 = 0xF0;
}

/// Capability bits in the first flag byte of the features reply.
mod caps_lo {
    pub const RUMBLE: u8 = 0x01;
    pub const PLAYER_LEDS: u8 = 0x02;
    pub const ACCEL: u8 = 0x04;
    pub const GYRO: u8 = 0x08;
    pub const LEFT_STICK: u8 = 0x10;
    pub const RIGHT_STICK: u8 = 0x20;
    pub const LEFT_TRIGGER: u8 = 0x40;
    pub const RIGHT_TRIGGER: u8 = 0x80;
}

/// Capability bits in the second flag byte.
mod caps_hi {
    pub const TOUCHPAD: u8 = 0x01;
    pub const RGB_LED: u8 = 0x02;
}

/// Features reply offsets, relative to the payload after the two-byte
/// command echo.
mod reply {
    pub const PROTOCOL_VERSION: usize = 0;
    pub const CAPS_LO: usize = 2;
    pub const CAPS_HI: usize = 3;
    pub const STYLE: usize = 5;
    pub const POLLING_RATE_MS: usize = 6;
    pub const ACCEL_RANGE: usize = 8;
    pub const GYRO_RANGE: usize = 10;
    pub const USAGE_MASKS: usize = 12;
    pub const TOUCHPAD_COUNT: usize = 16;
    pub const FINGER_COUNT: usize = 17;
    pub const SERIAL: usize = 18;
    pub const SERIAL_LEN: usize = 6;
}

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

/// Driver for gamepads speaking the SInput protocol.
pub struct SInputDriver;

impl HidDriver for SInputDriver {
    fn name(&self) -> &'static str {
        "sinput"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_SINPUT
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::RASPBERRYPI
            && matches!(
                info.product_id,
                product::GC_ULTIMATE | product::PROGCC | product::SINPUT_GENERIC
            )
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let session = SInputSession::open(info, io)?;
        Ok(Box::new(session))
    }
}

/// Everything the device told us in the features reply.
struct FeatureReport {
    protocol_version: u16,
    rumble: bool,
    player_leds: bool,
    rgb_led: bool,
    accelerometer: bool,
    gyroscope: bool,
    left_stick: bool,
    right_stick: bool,
    left_trigger: bool,
    right_trigger: bool,
    touchpad: bool,
    face_style: u8,
    sub_type: u8,
    polling_rate_ms: u8,
    accel_range: u16,
    gyro_range: u16,
    /// Enabled button bits, with a collapsed dpad already removed.
    usage_masks: [u8; 4],
    button_count: u8,
    dpad: bool,
    touchpad_count: u8,
    touchpad_finger_count: u8,
    serial: String,
}

fn parse_feature_reply(report: &[u8]) -> Option<FeatureReport> {
    if report.len() != DEVICE_REPORT_SIZE
        || report[0] != REPORT_ID_COMMAND_INPUT
        || report[1] != COMMAND_FEATURES
    {
        return None;
    }
    let bulk = &report[2..];
    let lo = bulk[reply::CAPS_LO];
    let hi = bulk[reply::CAPS_HI];

    let mut usage_masks = [0u8; 4];
    usage_masks.copy_from_slice(&bulk[reply::USAGE_MASKS..reply::USAGE_MASKS + 4]);
    let mut button_count: u8 = usage_masks.iter().map(|mask| mask.count_ones() as u8).sum();

    // A full dpad leaves the button numbering and becomes a hat.
    let dpad = usage_masks[0] & dpad::MASK == dpad::MASK;
    if dpad {
        usage_masks[0] &= !dpad::MASK;
        button_count -= 4;
    }

    let serial = bulk[reply::SERIAL..reply::SERIAL + reply::SERIAL_LEN]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join("-");

    Some(FeatureReport {
        protocol_version: load_u16(bulk, reply::PROTOCOL_VERSION),
        rumble: lo & caps_lo::RUMBLE != 0,
        player_leds: lo & caps_lo::PLAYER_LEDS != 0,
        rgb_led: hi & caps_hi::RGB_LED != 0,
        accelerometer: lo & caps_lo::ACCEL != 0,
        gyroscope: lo & caps_lo::GYRO != 0,
        left_stick: lo & caps_lo::LEFT_STICK != 0,
        right_stick: lo & caps_lo::RIGHT_STICK != 0,
        left_trigger: lo & caps_lo::LEFT_TRIGGER != 0,
        right_trigger: lo & caps_lo::RIGHT_TRIGGER != 0,
        touchpad: hi & caps_hi::TOUCHPAD != 0,
        face_style: bulk[reply::STYLE] >> 4,
        sub_type: bulk[reply::STYLE] & 0x0F,
        polling_rate_ms: bulk[reply::POLLING_RATE_MS],
        accel_range: load_u16(bulk, reply::ACCEL_RANGE),
        gyro_range: load_u16(bulk, reply::GYRO_RANGE),
        usage_masks,
        button_count,
        dpad,
        touchpad_count: bulk[reply::TOUCHPAD_COUNT],
        touchpad_finger_count: bulk[reply::FINGER_COUNT],
        serial,
    })
}

/// Last values handed to the sink, per control.
#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; axes::COUNT as usize],
    hat: Hat,
}

struct SInputSession {
    device_name: String,
    rumble: bool,
    player_leds: bool,
    rgb_led: bool,
    accelerometer: bool,
    gyroscope: bool,
    left_stick: bool,
    right_stick: bool,
    left_trigger: bool,
    right_trigger: bool,
    dpad: bool,
    /// Touchpad count after clamping, zero when unsupported.
    touchpads: u8,
    touch_fingers: u8,
    usage_masks: [u8; 4],
    accel_scale: f32,
    gyro_scale: f32,
    snapshot: InputSnapshot,
    last_report: [u8; DEVICE_REPORT_SIZE],
    last_power: Option<(PowerState, i32)>,
    imu_clock: DeviceClockUs,
}

impl SInputSession {
    fn open(info: &HidDeviceInfo, io: &mut dyn HidDeviceIo) -> Result<Self> {
        let mut request = vec![0u8; COMMAND_REPORT_SIZE];
        request[0] = REPORT_ID_COMMAND_OUTPUT;
        request[1] = COMMAND_FEATURES;

        // The first writes after enumeration can bounce; retry a few times.
        let mut accepted = false;
        for _ in 0..FEATURES_WRITE_ATTEMPTS {
            if matches!(io.write_report(&request), Ok(n) if n == COMMAND_REPORT_SIZE) {
                accepted = true;
                break;
            }
        }
        if !accepted {
            return Err(
                DeviceError::write_failed(info.display_name(), "features request rejected").into(),
            );
        }

        let mut features = None;
        for _ in 0..FEATURES_POLL_ATTEMPTS {
            match io.read_report(FEATURES_POLL_TIMEOUT_MS) {
                Ok(Some(report)) => {
                    // Input reports can race the reply; skip them.
                    if let Some(parsed) = parse_feature_reply(&report) {
                        features = Some(parsed);
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    return Err(
                        DeviceError::read_failed(info.display_name(), err.to_string()).into()
                    );
                }
            }
        }
        let Some(features) = features else {
            return Err(DeviceError::timeout(
                info.display_name(),
                u64::from(FEATURES_POLL_ATTEMPTS * FEATURES_POLL_TIMEOUT_MS),
            )
            .into());
        };

        let device_name = match info.product_id {
            product::GC_ULTIMATE => "HHL GC Ultimate".to_string(),
            product::PROGCC => "HHL ProGCC".to_string(),
            product::SINPUT_GENERIC if features.sub_type == SUBTYPE_SUPER_GAMEPAD_PLUS => {
                "HHL SuperGamepad+".to_string()
            }
            _ => info.display_name(),
        };
        debug!(
            name = %device_name,
            protocol = features.protocol_version,
            buttons = features.button_count,
            serial = %features.serial,
            "SInput: features negotiated"
        );
        debug!(
            face_style = features.face_style,
            sub_type = features.sub_type,
            polling_rate_ms = features.polling_rate_ms,
            accel_range = features.accel_range,
            gyro_range = features.gyro_range,
            "SInput: device profile"
        );

        let (touchpads, touch_fingers) = if features.touchpad {
            let count = features.touchpad_count.clamp(1, MAX_TOUCHPADS);
            // Two pads get one finger each; a single pad reports up to two.
            let fingers = if count > 1 {
                1
            } else {
                features.touchpad_finger_count.clamp(1, 2)
            };
            (count, fingers)
        } else {
            (0, 0)
        };

        Ok(Self {
            device_name,
            rumble: features.rumble,
            player_leds: features.player_leds,
            rgb_led: features.rgb_led,
            accelerometer: features.accelerometer,
            gyroscope: features.gyroscope,
            left_stick: features.left_stick,
            right_stick: features.right_stick,
            left_trigger: features.left_trigger,
            right_trigger: features.right_trigger,
            dpad: features.dpad,
            touchpads,
            touch_fingers,
            usage_masks: features.usage_masks,
            // One count is range/32768 of the full scale.
            accel_scale: STANDARD_GRAVITY * f32::from(features.accel_range) / 32768.0,
            gyro_scale: f32::from(features.gyro_range) * DEG_TO_RAD / 32768.0,
            snapshot: InputSnapshot::default(),
            last_report: [0; DEVICE_REPORT_SIZE],
            last_power: None,
            imu_clock: DeviceClockUs::new(),
        })
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

    fn emit_hat(&mut self, ctx: &mut SessionCtx<'_>, value: Hat) {
        if self.snapshot.hat != value {
            self.snapshot.hat = value;
            ctx.sink.hat(0, value);
        }
    }

    fn decode_report(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if report.first() != Some(&REPORT_ID_JOYSTICK_INPUT) || report.len() < idx::MIN_INPUT_LEN {
            debug!(len = report.len(), "SInput: discarding unrecognized report");
            return;
        }
        self.decode_buttons(report, ctx);
        self.decode_hat(report, ctx);
        self.decode_axes(report, ctx);
        self.decode_power(report, ctx);
        self.decode_imu(report, ctx);
        self.decode_touch(report, ctx);

        let n = report.len().min(self.last_report.len());
        self.last_report[..n].copy_from_slice(&report[..n]);
    }

    // Walk the usage masks so every enabled bit lands on the next
    // contiguous button number, whatever hardware the pad has.
    fn decode_buttons(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let masks = self.usage_masks;
        let mut slot: u8 = 0;
        for (group, mask) in masks.iter().copied().enumerate() {
            let offset = idx::BUTTONS_0 + group;
            let changed = self.last_report[offset] != report[offset];
            for bit in 0..8u8 {
                let bit_mask = 1u8 << bit;
                if mask & bit_mask == 0 {
                    continue;
                }
                if changed && slot < buttons::COUNT {
                    self.emit_button(ctx, slot, report[offset] & bit_mask != 0);
                }
                slot += 1;
            }
        }
    }

    fn decode_hat(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if !self.dpad {
            return;
        }
        let bits = report[idx::BUTTONS_0];
        let hat = Hat::from_dpad(
            bits & dpad::UP != 0,
            bits & dpad::DOWN != 0,
            bits & dpad::LEFT != 0,
            bits & dpad::RIGHT != 0,
        );
        self.emit_hat(ctx, hat);
    }

    // Axis numbering is contiguous as well: only the axes the device
    // claims exist, in left stick, right stick, trigger order.
    fn decode_axes(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let mut slot: u8 = 0;
        if self.left_stick {
            self.emit_axis(ctx, slot, load_i16(report, idx::LEFT_X));
            slot += 1;
            self.emit_axis(ctx, slot, load_i16(report, idx::LEFT_Y));
            slot += 1;
        }
        if self.right_stick {
            self.emit_axis(ctx, slot, load_i16(report, idx::RIGHT_X));
            slot += 1;
            self.emit_axis(ctx, slot, load_i16(report, idx::RIGHT_Y));
            slot += 1;
        }
        if self.left_trigger {
            self.emit_axis(ctx, slot, load_i16(report, idx::LEFT_TRIGGER));
            slot += 1;
        }
        if self.right_trigger {
            self.emit_axis(ctx, slot, load_i16(report, idx::RIGHT_TRIGGER));
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
            1 => (PowerState::NoBattery, 0),
            2 => (PowerState::Charging, percent),
            3 => (PowerState::Charged, 100),
            4 => (PowerState::OnBattery, percent),
            _ => return,
        };
        if self.last_power != Some(sample) {
            self.last_power = Some(sample);
            ctx.sink.power(sample.0, sample.1);
        }
    }

    fn decode_imu(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if !self.accelerometer && !self.gyroscope {
            return;
        }
        // The device counts microseconds in a wrapping 32-bit field.
        let timestamp = self.imu_clock.advance(load_u32(report, idx::IMU_TIMESTAMP));
        if self.accelerometer {
            let x = f32::from(load_i16(report, idx::IMU_ACCEL_X));
            let y = f32::from(load_i16(report, idx::IMU_ACCEL_Y));
            let z = f32::from(load_i16(report, idx::IMU_ACCEL_Z));
            let values = [
                -x * self.accel_scale,
                z * self.accel_scale,
                -y * self.accel_scale,
            ];
            ctx.sink.sensor(SensorKind::Accelerometer, timestamp, values);
        }
        if self.gyroscope {
            let x = f32::from(load_i16(report, idx::IMU_GYRO_X));
            let y = f32::from(load_i16(report, idx::IMU_GYRO_Y));
            let z = f32::from(load_i16(report, idx::IMU_GYRO_Z));
            let values = [
                -x * self.gyro_scale,
                z * self.gyro_scale,
                -y * self.gyro_scale,
            ];
            ctx.sink.sensor(SensorKind::Gyroscope, timestamp, values);
        }
    }

    fn decode_touch(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        if self.touchpads == 0 {
            return;
        }
        let span = idx::TOUCH1_X..idx::TOUCH2_PRESSURE + 2;
        if self.last_report[span.clone()] == report[span] {
            return;
        }
        emit_touch_point(ctx, 0, 0, report, idx::TOUCH1_X);
        if self.touchpads > 1 {
            emit_touch_point(ctx, 1, 0, report, idx::TOUCH2_X);
        } else if self.touch_fingers > 1 {
            emit_touch_point(ctx, 0, 1, report, idx::TOUCH2_X);
        }
    }
}

/// One touch point: signed centered coordinates, pressure doubles as the
/// contact flag.
fn emit_touch_point(
    ctx: &mut SessionCtx<'_>,
    touchpad: u8,
    finger: u8,
    report: &[u8],
    offset: usize,
) {
    let x = load_i16(report, offset);
    let y = load_i16(report, offset + 2);
    let pressure = load_u16(report, offset + 4);
    ctx.sink.touchpad(
        touchpad,
        finger,
        pressure > 0,
        f32::from(x) / 65536.0 + 0.5,
        f32::from(y) / 65536.0 + 0.5,
        f32::from(pressure) / 32768.0,
    );
}

impl DriverSession for SInputSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: self.rumble,
            trigger_rumble: false,
            rgb_led: self.rgb_led,
            player_led: self.player_leds,
        }
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.decode_report(&report, ctx),
                Ok(None) => return SessionStatus::Running,
                Err(err) => {
                    debug!(error = %err, "SInput: read failed, tearing down");
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
        if !self.rumble {
            return Err(DeviceError::FeatureNotSupported {
                device: self.device_name.clone(),
                feature: "rumble".to_string(),
            });
        }
        // ERM-style haptic frame: amplitude and brake per motor.
        let mut report = vec![0u8; COMMAND_REPORT_SIZE];
        report[0] = REPORT_ID_COMMAND_OUTPUT;
        report[1] = COMMAND_HAPTIC;
        report[2] = HAPTIC_TYPE_ERM;
        report[3] = (low_frequency >> 8) as u8;
        report[5] = (high_frequency >> 8) as u8;
        ctx.output.request(OutputRequest::output(report));
        Ok(())
    }

    fn set_led(
        &mut self,
        red: u8,
        green: u8,
        blue: u8,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        if !self.rgb_led {
            return Err(DeviceError::FeatureNotSupported {
                device: self.device_name.clone(),
                feature: "led".to_string(),
            });
        }
        let mut command = vec![0u8; COMMAND_REPORT_SIZE];
        command[0] = REPORT_ID_COMMAND_OUTPUT;
        command[1] = COMMAND_RGB;
        command[2] = red;
        command[3] = green;
        command[4] = blue;
        ctx.io
            .write_report(&command)
            .map_err(|err| DeviceError::write_failed(self.device_name.clone(), err.to_string()))?;
        Ok(())
    }

    fn set_player_index(&mut self, player_index: i32, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        if !self.player_leds {
            return Ok(());
        }
        // Player numbers are one-based on the wire; zero clears the LEDs.
        let player_num = (player_index + 1).clamp(0, 255) as u8;
        let mut command = vec![0u8; COMMAND_REPORT_SIZE];
        command[0] = REPORT_ID_COMMAND_OUTPUT;
        command[1] = COMMAND_PLAYER_LED;
        command[2] = player_num;
        if let Err(err) = ctx.io.write_report(&command) {
            debug!(error = %err, "SInput: player led write failed");
        }
        Ok(())
    }
}
