//! PlayStation Move motion controller driver.
//!
//! The Move is a wand, not a gamepad: eight buttons, an analog trigger and
//! a motion block, with an RGB lamp and a single rumble motor driven by one
//! combined output report. Two hardware revisions share the input layout but
//! differ in how sensor words are encoded: the original ZCM1 biases them
//! around 0x8000 and doubles every half-frame, the ZCM2 uses plain two's
//! complement. The lamp stays dark until the host writes the effects report,
//! so the first decoded input pushes one unprompted.

use tracing::debug;

use openpad_errors::{DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::axis::trigger_from_u8;
use openpad_joystick_core::clock::{SensorClock, STEP_75HZ_NS};
use openpad_joystick_core::events::{DEG_TO_RAD, STANDARD_GRAVITY};
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, HidDriver, JoystickCaps, OutputRequest, SensorKind, SessionCtx, SessionStatus,
};

const REPORT_ID_INPUT: u8 = 0x01;
const REPORT_ID_SET_LEDS: u8 = 0x06;

/// Combined lamp and rumble output report.
const EFFECTS_REPORT_LEN: usize = 9;

/// Longest input frame (the ZCM1, with magnetometer and EXT bytes).
const LAST_REPORT_LEN: usize = 49;

/// 8192 counts per g.
const ACCEL_SCALE: f32 = STANDARD_GRAVITY / 8192.0;

/// 16.4 counts per degree/second.
const GYRO_SCALE: f32 = DEG_TO_RAD / 16.4;

/// Input report byte offsets, shared by both revisions.
mod idx {
    pub const BUTTONS_1: usize = 1;
    pub const BUTTONS_2: usize = 2;
    pub const BUTTONS_3: usize = 3;
    pub const TRIGGER: usize = 5;
    pub const TRIGGER_FRAME2: usize = 6;
    pub const ACCEL: usize = 13;
    pub const ACCEL_FRAME2: usize = 19;
    pub const GYRO: usize = 25;
    pub const GYRO_FRAME2: usize = 31;

    /// Shortest report that still holds the second gyro half-frame.
    pub const MIN_INPUT_LEN: usize = GYRO_FRAME2 + 6;
}

/// Hardware revision, keyed off the product id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveModel {
    Zcm1,
    Zcm2,
}

/// Sensor word biased around 0x8000.
fn load_biased(report: &[u8], offset: usize) -> f32 {
    (i32::from(u16::from_le_bytes([report[offset], report[offset + 1]])) - 0x8000) as f32
}

/// Plain two's complement sensor word.
fn load_signed(report: &[u8], offset: usize) -> f32 {
    f32::from(i16::from_le_bytes([report[offset], report[offset + 1]]))
}

fn read_vector(report: &[u8], base: usize, load: fn(&[u8], usize) -> f32) -> [f32; 3] {
    [
        load(report, base),
        load(report, base + 2),
        load(report, base + 4),
    ]
}

/// Driver for the PlayStation Move wand.
pub struct PsMoveDriver;

impl HidDriver for PsMoveDriver {
    fn name(&self) -> &'static str {
        "psmove"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_PSMOVE
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::SONY
            && matches!(
                info.product_id,
                product::PSMOVE_ZCM1 | product::PSMOVE_ZCM2
            )
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        _io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let model = if info.product_id == product::PSMOVE_ZCM1 {
            MoveModel::Zcm1
        } else {
            MoveModel::Zcm2
        };
        debug!(name = %info.display_name(), ?model, "PSMove: opened");
        Ok(Box::new(PsMoveSession {
            device_name: info.display_name(),
            model,
            led: [0; 3],
            rumble_level: 0,
            effects_sent: false,
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
}

struct PsMoveSession {
    device_name: String,
    model: MoveModel,
    led: [u8; 3],
    rumble_level: u8,
    effects_sent: bool,
    snapshot: InputSnapshot,
    last_report: [u8; LAST_REPORT_LEN],
    sensor_clock: SensorClock,
}

impl PsMoveSession {
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
        if report.first() != Some(&REPORT_ID_INPUT) || report.len() < idx::MIN_INPUT_LEN {
            debug!(len = report.len(), "PSMove: discarding unrecognized report");
            return;
        }
        // An all-ones button byte marks an invalid frame; drop it.
        if report[idx::BUTTONS_1] == 0xFF {
            return;
        }
        self.decode_buttons(report, ctx);
        self.decode_trigger(report, ctx);
        self.decode_sensors(report, ctx);

        let n = report.len().min(self.last_report.len());
        self.last_report[..n].copy_from_slice(&report[..n]);

        if !self.effects_sent {
            // The lamp stays dark until the host writes a color.
            self.push_effects(ctx);
        }
    }

    fn decode_buttons(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        // Select and Start.
        if self.last_report[idx::BUTTONS_1] != report[idx::BUTTONS_1] {
            let b = report[idx::BUTTONS_1];
            self.emit_button(ctx, buttons::BACK, b & 0x01 != 0);
            self.emit_button(ctx, buttons::START, b & 0x08 != 0);
        }
        // Triangle, Circle, Cross, Square.
        if self.last_report[idx::BUTTONS_2] != report[idx::BUTTONS_2] {
            let b = report[idx::BUTTONS_2];
            self.emit_button(ctx, buttons::NORTH, b & 0x10 != 0);
            self.emit_button(ctx, buttons::EAST, b & 0x20 != 0);
            self.emit_button(ctx, buttons::SOUTH, b & 0x40 != 0);
            self.emit_button(ctx, buttons::WEST, b & 0x80 != 0);
        }
        // PS and the big Move button.
        if self.last_report[idx::BUTTONS_3] != report[idx::BUTTONS_3] {
            let b = report[idx::BUTTONS_3];
            self.emit_button(ctx, buttons::GUIDE, b & 0x01 != 0);
            self.emit_button(ctx, buttons::LEFT_STICK, b & 0x08 != 0);
        }
    }

    fn decode_trigger(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let value = match self.model {
            // The ZCM1 reports two trigger frames per packet; average them.
            MoveModel::Zcm1 => {
                let mean = (u16::from(report[idx::TRIGGER])
                    + u16::from(report[idx::TRIGGER_FRAME2]))
                    / 2;
                trigger_from_u8(mean as u8)
            }
            MoveModel::Zcm2 => trigger_from_u8(report[idx::TRIGGER]),
        };
        self.emit_axis(ctx, axes::LEFTX, value);
    }

    fn decode_sensors(&mut self, report: &[u8], ctx: &mut SessionCtx<'_>) {
        let timestamp = self.sensor_clock.tick(STEP_75HZ_NS);
        let (accel, gyro) = match self.model {
            // Biased words; the second half-frame is the freshest.
            MoveModel::Zcm1 => (
                read_vector(report, idx::ACCEL_FRAME2, load_biased),
                read_vector(report, idx::GYRO_FRAME2, load_biased),
            ),
            MoveModel::Zcm2 => (
                read_vector(report, idx::ACCEL, load_signed),
                read_vector(report, idx::GYRO, load_signed),
            ),
        };
        ctx.sink.sensor(
            SensorKind::Accelerometer,
            timestamp,
            accel.map(|v| v * ACCEL_SCALE),
        );
        ctx.sink.sensor(
            SensorKind::Gyroscope,
            timestamp,
            gyro.map(|v| v * GYRO_SCALE),
        );
    }

    fn effects_packet(&self) -> Vec<u8> {
        let mut packet = vec![0u8; EFFECTS_REPORT_LEN];
        packet[0] = REPORT_ID_SET_LEDS;
        packet[2] = self.led[0];
        packet[3] = self.led[1];
        packet[4] = self.led[2];
        packet[6] = self.rumble_level;
        packet
    }

    fn push_effects(&mut self, ctx: &mut SessionCtx<'_>) {
        ctx.output.request(OutputRequest::output(self.effects_packet()));
        self.effects_sent = true;
    }
}

impl DriverSession for PsMoveSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: true,
            trigger_rumble: false,
            rgb_led: true,
            player_led: false,
        }
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            match ctx.io.read_report(0) {
                Ok(Some(report)) => self.decode_report(&report, ctx),
                Ok(None) => return SessionStatus::Running,
                Err(err) => {
                    debug!(error = %err, "PSMove: read failed, tearing down");
                    return SessionStatus::Disconnected;
                }
            }
        }
    }

    fn rumble(
        &mut self,
        _low_frequency: u16,
        high_frequency: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        // One motor, driven by the high frequency channel.
        self.rumble_level = (high_frequency >> 8) as u8;
        self.push_effects(ctx);
        Ok(())
    }

    fn set_led(
        &mut self,
        red: u8,
        green: u8,
        blue: u8,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        self.led = [red, green, blue];
        self.push_effects(ctx);
        Ok(())
    }

    fn send_effect(&mut self, data: &[u8], ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        ctx.output.request(OutputRequest::output(data.to_vec()));
        Ok(())
    }
}
