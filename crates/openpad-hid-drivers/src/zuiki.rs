//! ZUIKI MASCON train controller driver.
//!
//! The MASCON PRO is a one-handed train throttle that doubles as a gamepad.
//! It speaks a plain 8-byte report: two button bytes, a hat index, four
//! stick bytes. The "triggers" are physical detents rather than analog
//! levers, so they snap straight between the axis extremes.

use tracing::debug;

use openpad_errors::{DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::axis::stick_from_u8;
use openpad_joystick_core::events::Hat;
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, HidDriver, JoystickCaps, OutputRequest, SessionCtx, SessionStatus,
};

const INPUT_PACKET_LEN: usize = 8;
const RUMBLE_PACKET_LEN: usize = 8;

/// Input report byte offsets. There is no report id.
mod idx {
    pub const BUTTONS_FACE: usize = 0;
    pub const BUTTONS_SYSTEM: usize = 1;
    pub const HAT: usize = 2;
    pub const LEFT_X: usize = 3;
    pub const LEFT_Y: usize = 4;
    pub const RIGHT_X: usize = 5;
    pub const RIGHT_Y: usize = 6;
}

/// Driver for ZUIKI mascon controllers.
pub struct ZuikiDriver;

impl HidDriver for ZuikiDriver {
    fn name(&self) -> &'static str {
        "zuiki"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_ZUIKI
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        info.vendor_id == vendor::ZUIKI && info.product_id == product::ZUIKI_MASCON_PRO
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        _io: &mut dyn HidDeviceIo,
        _hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let device_name = if info.product_id == product::ZUIKI_MASCON_PRO {
            "ZUIKI MASCON PRO".to_owned()
        } else {
            info.display_name()
        };
        debug!(name = %device_name, "ZUIKI: opened");
        Ok(Box::new(ZuikiSession {
            device_name,
            snapshot: InputSnapshot::default(),
            last_report: [0; INPUT_PACKET_LEN],
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

struct ZuikiSession {
    device_name: String,
    snapshot: InputSnapshot,
    last_report: [u8; INPUT_PACKET_LEN],
}

impl ZuikiSession {
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
        if report.len() != INPUT_PACKET_LEN {
            debug!(len = report.len(), "ZUIKI: discarding unrecognized report");
            return;
        }

        if self.last_report[idx::HAT] != report[idx::HAT] {
            self.emit_hat(ctx, Hat::from_index(report[idx::HAT]));
        }

        if self.last_report[idx::BUTTONS_FACE] != report[idx::BUTTONS_FACE] {
            let b = report[idx::BUTTONS_FACE];
            self.emit_button(ctx, buttons::NORTH, b & 0x01 != 0);
            self.emit_button(ctx, buttons::EAST, b & 0x02 != 0);
            self.emit_button(ctx, buttons::SOUTH, b & 0x04 != 0);
            self.emit_button(ctx, buttons::WEST, b & 0x08 != 0);
            self.emit_button(ctx, buttons::LEFT_SHOULDER, b & 0x10 != 0);
            self.emit_button(ctx, buttons::RIGHT_SHOULDER, b & 0x20 != 0);
            // Detent "triggers" have no travel to report.
            let left = if b & 0x40 != 0 { i16::MAX } else { i16::MIN };
            self.emit_axis(ctx, axes::LEFT_TRIGGER, left);
            let right = if b & 0x80 != 0 { i16::MAX } else { i16::MIN };
            self.emit_axis(ctx, axes::RIGHT_TRIGGER, right);
        }

        if self.last_report[idx::BUTTONS_SYSTEM] != report[idx::BUTTONS_SYSTEM] {
            let b = report[idx::BUTTONS_SYSTEM];
            self.emit_button(ctx, buttons::BACK, b & 0x01 != 0);
            self.emit_button(ctx, buttons::START, b & 0x02 != 0);
            self.emit_button(ctx, buttons::LEFT_STICK, b & 0x04 != 0);
            self.emit_button(ctx, buttons::RIGHT_STICK, b & 0x08 != 0);
            self.emit_button(ctx, buttons::GUIDE, b & 0x10 != 0);
            self.emit_button(ctx, buttons::MISC1, b & 0x20 != 0);
        }

        self.emit_axis(ctx, axes::LEFTX, stick_from_u8(report[idx::LEFT_X]));
        self.emit_axis(ctx, axes::LEFTY, stick_from_u8(report[idx::LEFT_Y]));
        self.emit_axis(ctx, axes::RIGHTX, stick_from_u8(report[idx::RIGHT_X]));
        self.emit_axis(ctx, axes::RIGHTY, stick_from_u8(report[idx::RIGHT_Y]));

        self.last_report.copy_from_slice(report);
    }
}

impl DriverSession for ZuikiSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps {
            rumble: true,
            trigger_rumble: false,
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
                    debug!(error = %err, "ZUIKI: read failed, tearing down");
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
        let mut packet = vec![0u8; RUMBLE_PACKET_LEN];
        packet[4] = (low_frequency >> 8) as u8;
        packet[5] = (high_frequency >> 8) as u8;
        ctx.output.request(OutputRequest::output(packet));
        Ok(())
    }

    fn send_effect(&mut self, data: &[u8], ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        ctx.output.request(OutputRequest::output(data.to_vec()));
        Ok(())
    }
}
