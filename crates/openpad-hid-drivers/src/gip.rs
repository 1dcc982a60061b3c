//! Xbox One and Xbox Series (GIP) controller driver.
//!
//! GIP devices speak a framed message protocol over the HID transport:
//! every packet carries a message type, flags, a sequence id, and a varint
//! length. A device announces itself with a hello, the host requests a
//! metadata blob describing its capabilities, and only once that exchange
//! settles (or times out into assumed defaults) does input start flowing.
//! Headsets, chatpads, and similar accessories ride the same wire as
//! sub-attachments addressed by the low three flag bits; each one gets its
//! own handshake, sequence streams, and reassembly buffer.

use std::time::Instant;

use tracing::{debug, info, warn};

use gamepad_hid_gip_protocol::fragment::{FragmentOutcome, FragmentReassembler};
use gamepad_hid_gip_protocol::handshake::{
    self, GipHandshake, GipHandshakeConfig, GipRetryPolicy, HandshakeAction,
    METADATA_READ_TIMEOUT,
};
use gamepad_hid_gip_protocol::input::{
    self, arcade_extra, battery_kind, battery_level, charge_state, ll_offset, nav_button,
    nav_dpad, BatteryStatus, RAW_REPORT_MIN_LEN,
};
use gamepad_hid_gip_protocol::metadata::{
    feature, parse_metadata, GipDeviceKind, MetadataStatus, PaddleFormat,
};
use gamepad_hid_gip_protocol::motor::{
    direct_motor_frame, level_from_u16, MotorCommand, MotorScheduler, BUSY_WINDOW,
    BUSY_WINDOW_BLUETOOTH,
};
use gamepad_hid_gip_protocol::profile::AttachmentProfile;
use gamepad_hid_gip_protocol::quirks::quirk_flag;
use gamepad_hid_gip_protocol::sequence::SequenceBank;
use gamepad_hid_gip_protocol::wire::{
    self, command, device_state, extended, flag, parse_frame, MAX_ATTACHMENTS,
};
use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::keys;
use openpad_hid_common::usb_ids::{product, vendor};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo, HintRegistry};
use openpad_joystick_core::axis::trigger_from_10bit;
use openpad_joystick_core::ids::{axes, buttons};
use openpad_joystick_core::{
    DriverSession, Hat, HidDriver, JoystickCaps, OutputRequest, PowerState, SessionCtx,
    SessionStatus,
};

/// Shadow copy of the last input payload, used to gate decode work on
/// byte-level changes.
const LAST_INPUT_LEN: usize = 64;

/// Six standard axes plus up to three flight stick extras.
const MAX_AXES: usize = 9;

/// Buttons below this index have a fixed meaning; paddles, share, and
/// device extras are numbered upward from here.
const FIXED_BUTTONS: u8 = buttons::RIGHT_SHOULDER + 1;

fn is_gip_device(vendor_id: u16, product_id: u16) -> bool {
    match vendor_id {
        vendor::MICROSOFT => matches!(
            product_id,
            product::XBOX_ONE_S
                | product::XBOX_ONE_ELITE_SERIES_1
                | product::XBOX_ONE_ELITE_SERIES_2
                | product::XBOX_SERIES_X
                | product::XBOX_SERIES_X_BLE
        ),
        vendor::PDP => product_id == product::PDP_ROCK_CANDY,
        vendor::RAZER => product_id == product::RAZER_ATROX,
        vendor::POWERA => matches!(
            product_id,
            product::BDA_XB1_SPECTRA_PRO | product::BDA_XB1_CLASSIC | product::BDA_XB1_FIGHTPAD
        ),
        // The whole third-party GIP range enumerates under PowerA's
        // alternate vendor id.
        vendor::POWERA_ALT => (0x2001..=0x201a).contains(&product_id),
        vendor::THRUSTMASTER => product_id == product::THRUSTMASTER_T_FLIGHT_HOTAS_ONE,
        _ => false,
    }
}

/// Driver for GIP devices on USB. Xbox pads over Bluetooth use standard
/// HID reports and are left to other drivers.
pub struct GipDriver;

impl HidDriver for GipDriver {
    fn name(&self) -> &'static str {
        "gip"
    }

    fn hint_key(&self) -> &'static str {
        keys::JOYSTICK_HIDAPI_GIP
    }

    fn probe(&self, info: &HidDeviceInfo) -> bool {
        !info.is_bluetooth() && is_gip_device(info.vendor_id, info.product_id)
    }

    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>> {
        let session = GipSession::open(info, io, hints)?;
        Ok(Box::new(session))
    }
}

/// Joystick-facing button and axis numbering for one attachment, settled
/// at attach time from the profile.
#[derive(Debug, Clone, Copy, Default)]
struct Layout {
    paddle_index: Option<u8>,
    share_index: Option<u8>,
    extra_index: Option<u8>,
    button_count: u8,
    axis_count: u8,
}

impl Layout {
    fn for_profile(profile: &AttachmentProfile, paddles_enabled: bool) -> Self {
        let mut layout = Layout::default();
        let mut next = FIXED_BUTTONS;
        if paddles_enabled
            && profile.has_feature(feature::ELITE_BUTTONS)
            && input::paddle_offset(profile.paddle_format).is_some()
        {
            layout.paddle_index = Some(next);
            next += 4;
        }
        if profile.has_feature(feature::CONSOLE_FUNCTION_MAP) {
            layout.share_index = Some(next);
            next += 1;
        }
        if profile.extra_buttons > 0 {
            layout.extra_index = Some(next);
            next += profile.extra_buttons;
        }
        layout.button_count = next;
        layout.axis_count =
            if profile.kind == GipDeviceKind::FlightStick && profile.extra_axes > 0 {
                // The first extra axis replaces the unused right trigger.
                axes::COUNT + profile.extra_axes - 1
            } else {
                axes::COUNT
            };
        layout
    }
}

/// Last values handed to the sink, per control.
#[derive(Debug, Default)]
struct InputSnapshot {
    buttons: u32,
    axes: [i16; MAX_AXES],
    hat: Hat,
}

/// Everything the session tracks for one logical device on the wire.
struct Attachment {
    profile: AttachmentProfile,
    handshake: GipHandshake,
    sequences: SequenceBank,
    fragments: FragmentReassembler,
    device_state: u8,
    joystick_attached: bool,
    layout: Layout,
    snapshot: InputSnapshot,
    last_input: [u8; LAST_INPUT_LEN],
    last_battery: Option<BatteryStatus>,
}

impl Attachment {
    fn new(
        index: u8,
        vendor_id: u16,
        product_id: u16,
        config: GipHandshakeConfig,
        now: Instant,
    ) -> Self {
        let mut profile = AttachmentProfile::new(index, vendor_id, product_id);
        profile.apply_quirks();
        Self::from_profile(profile, config, now)
    }

    fn from_profile(profile: AttachmentProfile, config: GipHandshakeConfig, now: Instant) -> Self {
        let handshake = GipHandshake::new(profile.attachment_index, config, now);
        Self {
            profile,
            handshake,
            sequences: SequenceBank::new(),
            fragments: FragmentReassembler::new(),
            device_state: device_state::START,
            joystick_attached: false,
            layout: Layout::default(),
            snapshot: InputSnapshot::default(),
            last_input: [0; LAST_INPUT_LEN],
            last_battery: None,
        }
    }

    /// Elite pads report their paddle byte in a format keyed to the model
    /// and, for the Series 2, the firmware version.
    fn resolve_paddle_format(&mut self) {
        if self.profile.vendor_id != vendor::MICROSOFT {
            return;
        }
        match self.profile.product_id {
            product::XBOX_ONE_ELITE_SERIES_1 => {
                self.profile.paddle_format = PaddleFormat::Xbe1;
            }
            product::XBOX_ONE_ELITE_SERIES_2 => {
                self.profile.paddle_format = if self.profile.firmware_major_version == 5
                    && self.profile.firmware_minor_version < 17
                {
                    PaddleFormat::Xbe2Raw
                } else {
                    PaddleFormat::Xbe2
                };
            }
            _ => {}
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

    fn emit_hat(&mut self, ctx: &mut SessionCtx<'_>, index: u8, hat: Hat) {
        if self.snapshot.hat != hat {
            self.snapshot.hat = hat;
            ctx.sink.hat(index, hat);
        }
    }

    /// Decode one low-latency input payload. The shadow copy of the last
    /// payload gates each cluster, so an unchanged byte costs nothing.
    fn decode_input(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let kind = self.profile.kind;

        if self.last_input[ll_offset::NAV_BUTTONS] != payload[ll_offset::NAV_BUTTONS] {
            let b = payload[ll_offset::NAV_BUTTONS];
            self.emit_button(ctx, buttons::START, b & nav_button::START != 0);
            self.emit_button(ctx, buttons::BACK, b & nav_button::BACK != 0);
            self.emit_button(ctx, buttons::SOUTH, b & nav_button::SOUTH != 0);
            self.emit_button(ctx, buttons::EAST, b & nav_button::EAST != 0);
            self.emit_button(ctx, buttons::WEST, b & nav_button::WEST != 0);
            self.emit_button(ctx, buttons::NORTH, b & nav_button::NORTH != 0);
        }

        if self.last_input[ll_offset::NAV_DPAD] != payload[ll_offset::NAV_DPAD] {
            let b = payload[ll_offset::NAV_DPAD];
            self.emit_hat(
                ctx,
                0,
                Hat::from_dpad(
                    b & nav_dpad::UP != 0,
                    b & nav_dpad::DOWN != 0,
                    b & nav_dpad::LEFT != 0,
                    b & nav_dpad::RIGHT != 0,
                ),
            );
            if kind == GipDeviceKind::ArcadeStick {
                // Arcade sticks wire the shoulder bits the other way
                // around and have no stick clicks.
                self.emit_button(ctx, buttons::RIGHT_SHOULDER, b & nav_dpad::LEFT_SHOULDER != 0);
                self.emit_button(ctx, buttons::LEFT_SHOULDER, b & nav_dpad::RIGHT_SHOULDER != 0);
            } else {
                self.emit_button(ctx, buttons::LEFT_SHOULDER, b & nav_dpad::LEFT_SHOULDER != 0);
                self.emit_button(ctx, buttons::RIGHT_SHOULDER, b & nav_dpad::RIGHT_SHOULDER != 0);
                self.emit_button(ctx, buttons::LEFT_STICK, b & nav_dpad::LEFT_STICK != 0);
                self.emit_button(ctx, buttons::RIGHT_STICK, b & nav_dpad::RIGHT_STICK != 0);
            }
        }

        match kind {
            GipDeviceKind::FlightStick => self.decode_flight_stick(payload, ctx),
            GipDeviceKind::ArcadeStick => self.decode_arcade_stick(payload, ctx),
            _ => self.decode_gamepad_axes(payload, ctx),
        }

        self.decode_paddles(payload, ctx);
        self.decode_share_button(payload, ctx);

        let n = payload.len().min(self.last_input.len());
        self.last_input[..n].copy_from_slice(&payload[..n]);
    }

    fn decode_gamepad_axes(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(raw) = input::parse_gamepad_axes(payload) else {
            return;
        };
        self.emit_axis(ctx, axes::LEFT_TRIGGER, trigger_from_10bit(raw.left_trigger));
        self.emit_axis(ctx, axes::RIGHT_TRIGGER, trigger_from_10bit(raw.right_trigger));
        self.emit_axis(ctx, axes::LEFTX, raw.left_x);
        self.emit_axis(ctx, axes::LEFTY, !raw.left_y);
        self.emit_axis(ctx, axes::RIGHTX, raw.right_x);
        self.emit_axis(ctx, axes::RIGHTY, !raw.right_y);
    }

    fn decode_arcade_stick(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(raw) = input::parse_gamepad_axes(payload) else {
            return;
        };
        // Older sticks report the extra buttons as 10-bit trigger values;
        // newer ones carry a digital byte that overrides them.
        let mut left = trigger_from_10bit(raw.left_trigger);
        let mut right = trigger_from_10bit(raw.right_trigger);
        if payload.len() >= ll_offset::ARCADE_EXTRA_LEN {
            let extra = payload[ll_offset::ARCADE_EXTRA];
            right = if extra & arcade_extra::BUTTON_6 != 0 {
                i16::MAX
            } else {
                i16::MIN
            };
            left = if extra & arcade_extra::BUTTON_7 != 0 {
                i16::MAX
            } else {
                i16::MIN
            };
        }
        self.emit_axis(ctx, axes::LEFT_TRIGGER, left);
        self.emit_axis(ctx, axes::RIGHT_TRIGGER, right);
    }

    fn decode_flight_stick(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(raw) = input::parse_flight_stick(payload) else {
            return;
        };
        if self.last_input[ll_offset::FLIGHT_FIRE] != raw.fire_buttons {
            self.emit_button(ctx, buttons::LEFT_STICK, raw.fire_buttons & 0x01 != 0);
            self.emit_button(ctx, buttons::RIGHT_STICK, raw.fire_buttons & 0x02 != 0);
        }
        if let Some(extra_index) = self.layout.extra_index {
            if self.last_input[ll_offset::FLIGHT_EXTRA_BUTTONS]
                != payload[ll_offset::FLIGHT_EXTRA_BUTTONS]
            {
                for i in 0..self.profile.extra_buttons as usize {
                    if let Some(pressed) = input::flight_extra_button(payload, i) {
                        self.emit_button(ctx, extra_index + i as u8, pressed);
                    }
                }
            }
        }
        self.emit_axis(ctx, axes::LEFTX, raw.roll);
        self.emit_axis(ctx, axes::LEFTY, raw.pitch);
        self.emit_axis(ctx, axes::RIGHTX, raw.yaw);
        self.emit_axis(ctx, axes::LEFT_TRIGGER, input::center_unsigned(raw.throttle));
        for i in 0..self.profile.extra_axes as usize {
            if let Some(value) = input::flight_extra_axis(payload, i) {
                self.emit_axis(ctx, axes::RIGHT_TRIGGER + i as u8, input::center_unsigned(value));
            }
        }
    }

    fn decode_paddles(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(paddle_index) = self.layout.paddle_index else {
            return;
        };
        if !self.profile.has_feature(feature::ELITE_BUTTONS)
            || self.profile.paddle_format == PaddleFormat::Xbe2Raw
        {
            // Raw-mode paddles arrive in their own vendor report.
            return;
        }
        let Some(offset) = input::paddle_offset(self.profile.paddle_format) else {
            return;
        };
        if payload.len() <= offset || self.last_input[offset] == payload[offset] {
            return;
        }
        let Some(paddles) = input::parse_paddles(self.profile.paddle_format, payload[offset])
        else {
            return;
        };
        for (i, pressed) in paddles.into_iter().enumerate() {
            self.emit_button(ctx, paddle_index + i as u8, pressed);
        }
    }

    fn decode_share_button(&mut self, payload: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(share_index) = self.layout.share_index else {
            return;
        };
        let dynamic = self.profile.has_feature(feature::DYNAMIC_LATENCY_INPUT);
        let Some(offset) = input::function_map_offset(payload.len(), dynamic) else {
            return;
        };
        if offset >= self.last_input.len() {
            return;
        }
        if self.last_input[offset] != payload[offset] {
            self.emit_button(ctx, share_index, payload[offset] & input::SHARE_BUTTON != 0);
        }
    }
}

fn write_packet(io: &mut dyn HidDeviceIo, packet: &[u8]) {
    if let Err(err) = io.write_report(packet) {
        warn!(error = %err, "GIP: write failed");
    }
}

fn battery_power(battery: &BatteryStatus) -> (PowerState, i32) {
    let percent = match battery.level {
        battery_level::CRITICAL => 10,
        battery_level::LOW => 40,
        battery_level::MEDIUM => 70,
        _ => 100,
    };
    let state = if battery.kind == battery_kind::ABSENT {
        PowerState::NoBattery
    } else if battery.charge == charge_state::CHARGING {
        PowerState::Charging
    } else if battery.power != 0 {
        PowerState::Charged
    } else {
        PowerState::OnBattery
    };
    (state, percent)
}

struct GipSession {
    device_name: String,
    vendor_id: u16,
    product_id: u16,
    config: GipHandshakeConfig,
    paddles_enabled: bool,
    attachments: [Option<Attachment>; MAX_ATTACHMENTS],
    motors: MotorScheduler,
    rumble_levels: [u8; 4],
    read_timeout_ms: u32,
}

impl GipSession {
    fn open(
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        hints: &dyn HintRegistry,
    ) -> Result<Self> {
        let mut profile = AttachmentProfile::new(0, info.vendor_id, info.product_id);
        profile.apply_quirks();

        let config = GipHandshakeConfig {
            skip_hello: profile.has_quirk(quirk_flag::NO_HELLO),
            reset_for_metadata: hints
                .enabled(keys::JOYSTICK_HIDAPI_GIP_RESET_FOR_METADATA, false),
            retry: GipRetryPolicy::default(),
        };
        let now = Instant::now();
        let attachment = Attachment::from_profile(profile, config, now);

        let busy_window = if info.is_bluetooth() {
            BUSY_WINDOW_BLUETOOTH
        } else {
            BUSY_WINDOW
        };
        let mut session = GipSession {
            device_name: info.display_name(),
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            config,
            paddles_enabled: hints.enabled(keys::JOYSTICK_HIDAPI_GIP_PADDLES, true),
            attachments: std::array::from_fn(|_| None),
            motors: MotorScheduler::new(busy_window),
            rumble_levels: [0; 4],
            read_timeout_ms: 0,
        };
        session.attachments[0] = Some(attachment);

        if config.skip_hello {
            // The device will never announce itself; start the metadata
            // exchange right away.
            let action = session.attachments[0]
                .as_mut()
                .and_then(|att| att.handshake.ensure_metadata(true, now));
            if action == Some(HandshakeAction::RequestMetadata) {
                session.read_timeout_ms = METADATA_READ_TIMEOUT.as_millis() as u32;
                session.request_metadata(0, io);
            }
        }

        Ok(session)
    }

    fn ensure_attachment(&mut self, index: usize, now: Instant) {
        if self.attachments[index].is_none() {
            debug!(attachment = index, "GIP: new attachment");
            self.attachments[index] = Some(Attachment::new(
                index as u8,
                self.vendor_id,
                self.product_id,
                self.config,
                now,
            ));
        }
    }

    fn request_metadata(&mut self, index: usize, io: &mut dyn HidDeviceIo) {
        let Some(att) = self.attachments[index].as_mut() else {
            return;
        };
        match handshake::metadata_request_frame(&mut att.sequences, att.profile.attachment_index) {
            Ok(frame) => write_packet(io, &frame),
            Err(err) => warn!(error = %err, "GIP: failed to encode metadata request"),
        }
    }

    /// Apply the action an `ensure_metadata` call handed back. A metadata
    /// request from this path briefly holds reads open so the reply lands
    /// in the same update cycle.
    fn apply_ensure_action(
        &mut self,
        index: usize,
        action: Option<HandshakeAction>,
        ctx: &mut SessionCtx<'_>,
    ) {
        let Some(action) = action else {
            return;
        };
        if action == HandshakeAction::RequestMetadata {
            self.read_timeout_ms = METADATA_READ_TIMEOUT.as_millis() as u32;
        }
        self.apply_action(index, action, ctx);
    }

    fn apply_action(&mut self, index: usize, action: HandshakeAction, ctx: &mut SessionCtx<'_>) {
        match action {
            HandshakeAction::RequestMetadata => self.request_metadata(index, ctx.io),
            HandshakeAction::AssumeDefaults => self.assume_defaults(index, false, ctx),
            HandshakeAction::AssumeDefaultsAndStart => self.assume_defaults(index, true, ctx),
            HandshakeAction::ResetDevice => self.reset_device(ctx),
        }
    }

    /// Fill in a default capability profile for a device whose metadata
    /// never arrived or never parsed. `start` also runs the init sequence.
    fn assume_defaults(&mut self, index: usize, start: bool, ctx: &mut SessionCtx<'_>) {
        {
            let Some(att) = self.attachments[index].as_mut() else {
                return;
            };
            debug!(attachment = index, "GIP: assuming default capabilities");
            att.profile.assume_defaults();
            if att.profile.supports_system_message(command::FIRMWARE, false) {
                match handshake::firmware_query_frame(
                    &mut att.sequences,
                    att.profile.attachment_index,
                    2,
                ) {
                    Ok(frame) => write_packet(ctx.io, &frame),
                    Err(err) => warn!(error = %err, "GIP: failed to encode firmware query"),
                }
            }
            att.handshake.metadata_faked();
        }
        if start {
            self.run_startup(index, ctx);
        } else {
            self.try_attach(index, ctx);
        }
    }

    fn run_startup(&mut self, index: usize, ctx: &mut SessionCtx<'_>) {
        {
            let Some(att) = self.attachments[index].as_mut() else {
                return;
            };
            att.handshake.begin_startup();
            match handshake::build_init_sequence(&att.profile, &mut att.sequences) {
                Ok(frames) => {
                    for frame in frames {
                        write_packet(ctx.io, &frame);
                    }
                }
                Err(err) => warn!(error = %err, "GIP: failed to build init sequence"),
            }
            att.device_state = device_state::START;
            att.handshake.input_armed();
        }
        self.try_attach(index, ctx);
    }

    fn reset_device(&mut self, ctx: &mut SessionCtx<'_>) {
        let Some(att) = self.attachments[0].as_mut() else {
            return;
        };
        info!("GIP: resetting device to retry the metadata exchange");
        match handshake::set_device_state_frame(&mut att.sequences, 0, device_state::RESET) {
            Ok(frame) => write_packet(ctx.io, &frame),
            Err(err) => warn!(error = %err, "GIP: failed to encode reset"),
        }
        att.device_state = device_state::RESET;
    }

    /// Expose the attachment as a joystick once its handshake settles.
    fn try_attach(&mut self, index: usize, ctx: &mut SessionCtx<'_>) {
        let paddles_enabled = self.paddles_enabled;
        let Some(att) = self.attachments[index].as_mut() else {
            return;
        };
        if att.joystick_attached {
            return;
        }
        if index != 0 && !att.profile.is_controller() {
            debug!(attachment = index, kind = ?att.profile.kind, "GIP: not a controller, skipping");
            return;
        }
        att.resolve_paddle_format();
        att.layout = Layout::for_profile(&att.profile, paddles_enabled);
        att.snapshot = InputSnapshot::default();
        att.last_input = [0; LAST_INPUT_LEN];
        att.joystick_attached = true;
        att.handshake.attached();
        info!(
            attachment = index,
            kind = ?att.profile.kind,
            buttons = att.layout.button_count,
            axes = att.layout.axis_count,
            "GIP: joystick attached"
        );
        if index == 0 {
            self.rumble_levels = [0; 4];
        }
        ctx.sink.joystick_connected();
    }

    fn detach_all(&mut self, ctx: &mut SessionCtx<'_>) {
        for att in self.attachments.iter_mut().flatten() {
            if att.joystick_attached {
                att.joystick_attached = false;
                ctx.sink.joystick_disconnected();
            }
        }
    }

    fn handle_packet(&mut self, packet: &[u8], ctx: &mut SessionCtx<'_>) {
        let Some(frame) = parse_frame(packet) else {
            debug!(len = packet.len(), "GIP: dropping runt packet");
            return;
        };
        let header = frame.header;
        let index = header.attachment_index() as usize;
        self.ensure_attachment(index, ctx.now);

        if header.is_fragment() {
            let Some(att) = self.attachments[index].as_mut() else {
                return;
            };
            match att.fragments.feed(&frame, ctx.now) {
                FragmentOutcome::Accepted { ack } => {
                    if let Some(ack) = ack {
                        write_packet(ctx.io, &ack);
                    }
                }
                FragmentOutcome::Complete { message, ack } => {
                    let handled = self.dispatch_message(
                        index,
                        header.message_type,
                        header.flags,
                        &message,
                        ctx,
                    );
                    if handled {
                        if let Some(ack) = ack {
                            write_packet(ctx.io, &ack);
                        }
                    }
                }
                FragmentOutcome::Rejected { ack } => write_packet(ctx.io, &ack),
                FragmentOutcome::Discarded => {}
            }
            return;
        }

        if header.length as usize > frame.body.len() {
            warn!(
                claimed = header.length,
                got = frame.body.len(),
                "GIP: packet shorter than its header claims"
            );
            return;
        }

        let handled =
            self.dispatch_message(index, header.message_type, header.flags, frame.body, ctx);
        if handled && header.wants_ack() {
            write_packet(ctx.io, &wire::encode_ack(&header, header.length as u32, 0));
        }
    }

    fn dispatch_message(
        &mut self,
        index: usize,
        message_type: u8,
        flags: u8,
        payload: &[u8],
        ctx: &mut SessionCtx<'_>,
    ) -> bool {
        if flags & flag::SYSTEM != 0 {
            self.dispatch_system(index, message_type, payload, ctx)
        } else {
            self.dispatch_vendor(index, message_type, payload, ctx)
        }
    }

    fn dispatch_system(
        &mut self,
        index: usize,
        message_type: u8,
        payload: &[u8],
        ctx: &mut SessionCtx<'_>,
    ) -> bool {
        {
            let Some(att) = self.attachments[index].as_ref() else {
                return false;
            };
            if !att.profile.supports_system_message(message_type, true) {
                warn!(
                    "GIP: attachment {index} sent system message {message_type:#04x} it claimed not to support"
                );
                return false;
            }
        }
        match message_type {
            command::PROTO_CONTROL => true,
            command::HELLO_DEVICE => self.handle_hello(index, payload, ctx),
            command::STATUS_DEVICE => self.handle_status(index, payload, ctx),
            command::METADATA => self.handle_metadata(index, payload, ctx),
            command::SECURITY => {
                debug!("GIP: ignoring security message");
                false
            }
            command::GUIDE_BUTTON => self.handle_guide(index, payload, ctx),
            command::AUDIO_CONTROL => {
                debug!("GIP: ignoring audio control message");
                false
            }
            command::FIRMWARE => self.handle_firmware(index, payload, ctx),
            command::HID_REPORT => {
                debug!("GIP: ignoring HID report message");
                false
            }
            command::EXTENDED => self.handle_extended(index, payload),
            command::AUDIO_DATA => {
                debug!("GIP: ignoring audio data");
                false
            }
            _ => {
                warn!("GIP: unhandled system message {message_type:#04x}");
                false
            }
        }
    }

    fn dispatch_vendor(
        &mut self,
        index: usize,
        message_type: u8,
        payload: &[u8],
        ctx: &mut SessionCtx<'_>,
    ) -> bool {
        match message_type {
            command::LL_INPUT_REPORT => self.handle_input(index, payload, ctx),
            command::RAW_REPORT => self.handle_raw_report(index, payload, ctx),
            command::LL_STATIC_CONFIGURATION => {
                debug!("GIP: ignoring static configuration report");
                false
            }
            command::LL_BUTTON_INFO_REPORT => {
                debug!("GIP: ignoring button info report");
                false
            }
            command::LL_OVERFLOW_INPUT_REPORT => {
                debug!("GIP: ignoring overflow input report");
                false
            }
            _ => {
                warn!("GIP: unhandled vendor message {message_type:#04x}");
                false
            }
        }
    }

    fn handle_hello(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let hello = match handshake::parse_hello(payload) {
            Ok(hello) => hello,
            Err(err) => {
                debug!(error = %err, "GIP: malformed hello");
                return false;
            }
        };
        info!(
            "GIP: attachment {index} hello: device {:#018x}, id {:04x}:{:04x}, firmware {}.{}.{}.{}",
            hello.device_id,
            hello.vendor_id,
            hello.product_id,
            hello.firmware_major_version,
            hello.firmware_minor_version,
            hello.firmware_build_version,
            hello.firmware_revision,
        );
        hello.log_version_warnings();

        let action = {
            let Some(att) = self.attachments[index].as_mut() else {
                return false;
            };
            att.profile.firmware_major_version = hello.firmware_major_version;
            att.profile.firmware_minor_version = hello.firmware_minor_version;
            att.handshake.on_hello(ctx.now)
        };
        if index == 0 {
            self.apply_ensure_action(index, action, ctx);
        } else if let Some(action) = action {
            self.apply_action(index, action, ctx);
        }
        true
    }

    fn handle_status(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let Some(status) = input::parse_device_status(payload) else {
            debug!("GIP: malformed status message");
            return false;
        };
        let device_announced = self.attachments[0]
            .as_ref()
            .is_some_and(|att| att.handshake.announced());
        let action = {
            let Some(att) = self.attachments[index].as_mut() else {
                return false;
            };
            if att.joystick_attached && att.last_battery != Some(status.battery) {
                att.last_battery = Some(status.battery);
                let (state, percent) = battery_power(&status.battery);
                ctx.sink.power(state, percent);
            }
            for event in &status.events {
                warn!(
                    "GIP: attachment {index} reported event {:#06x} (fault tag {:#010x})",
                    event.event_type, event.fault_tag
                );
            }
            att.handshake.ensure_metadata(device_announced, ctx.now)
        };
        self.apply_ensure_action(index, action, ctx);
        true
    }

    fn handle_metadata(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        match parse_metadata(payload) {
            Ok(metadata) => {
                {
                    let Some(att) = self.attachments[index].as_mut() else {
                        return false;
                    };
                    att.profile.absorb_metadata(metadata);
                    att.handshake.metadata_got();
                }
                self.run_startup(index, ctx);
                true
            }
            Err(err) => {
                warn!(error = %err, attachment = index, "GIP: bad metadata, assuming defaults");
                self.assume_defaults(index, false, ctx);
                true
            }
        }
    }

    fn handle_guide(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let Some(pressed) = input::parse_guide_button(payload) else {
            debug!("GIP: malformed guide button message");
            return false;
        };
        let Some(att) = self.attachments[index].as_mut() else {
            return false;
        };
        if !att.joystick_attached {
            return false;
        }
        att.emit_button(ctx, buttons::GUIDE, pressed);
        true
    }

    fn handle_firmware(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let Some(version) = input::parse_firmware_response(payload) else {
            debug!("GIP: malformed firmware response");
            return false;
        };
        debug!(
            "GIP: attachment {index} firmware {}.{}.{}.{}",
            version.major, version.minor, version.build, version.revision
        );
        let Some(att) = self.attachments[index].as_mut() else {
            return false;
        };
        att.profile.firmware_major_version = version.major;
        att.profile.firmware_minor_version = version.minor;
        att.profile.firmware_build_version = version.build;
        att.profile.firmware_revision = version.revision;
        if att.profile.vendor_id == vendor::MICROSOFT
            && att.profile.product_id == product::XBOX_ONE_ELITE_SERIES_2
        {
            att.resolve_paddle_format();
        }
        if att.profile.wants_elite_raw_report() {
            match handshake::elite_raw_report_frame(&mut att.sequences) {
                Ok(frame) => write_packet(ctx.io, &frame),
                Err(err) => warn!(error = %err, "GIP: failed to encode raw report request"),
            }
        }
        true
    }

    fn handle_extended(&mut self, index: usize, payload: &[u8]) -> bool {
        if payload.len() < 2 {
            return false;
        }
        if payload[0] == extended::GET_SERIAL_NUMBER
            && payload[1] == extended::STATUS_OK
            && index == 0
        {
            let raw = &payload[2..payload.len().min(2 + 32)];
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            let serial = String::from_utf8_lossy(&raw[..end]);
            debug!("GIP: device serial {serial}");
            true
        } else {
            debug!("GIP: ignoring extended command {:#04x}", payload[0]);
            false
        }
    }

    fn handle_input(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let device_announced = self.attachments[0]
            .as_ref()
            .is_some_and(|att| att.handshake.announced());
        let action = {
            let Some(att) = self.attachments[index].as_mut() else {
                return false;
            };
            att.handshake.ensure_metadata(device_announced, ctx.now)
        };
        self.apply_ensure_action(index, action, ctx);

        let Some(att) = self.attachments[index].as_mut() else {
            return false;
        };
        match att.handshake.metadata_status() {
            MetadataStatus::Got | MetadataStatus::Faked => {}
            // Swallow input until the device is identified.
            _ => return true,
        }
        if !att.joystick_attached {
            return false;
        }
        if att.device_state != device_state::START {
            debug!("GIP: discarding early input report");
            att.device_state = device_state::START;
            return true;
        }
        if payload.len() < ll_offset::MIN_LEN {
            debug!(len = payload.len(), "GIP: short input report");
            return false;
        }
        att.decode_input(payload, ctx);
        true
    }

    fn handle_raw_report(&mut self, index: usize, payload: &[u8], ctx: &mut SessionCtx<'_>) -> bool {
        let Some(att) = self.attachments[index].as_mut() else {
            return false;
        };
        if !att.profile.has_feature(feature::ELITE_BUTTONS)
            || att.profile.paddle_format != PaddleFormat::Xbe2Raw
        {
            return false;
        }
        if !att.joystick_attached {
            return false;
        }
        let Some(paddle_index) = att.layout.paddle_index else {
            return false;
        };
        let Some(offset) = input::paddle_offset(att.profile.paddle_format) else {
            return false;
        };
        if payload.len() < RAW_REPORT_MIN_LEN || payload.len() <= offset {
            debug!(len = payload.len(), "GIP: short raw report");
            return false;
        }
        let Some(paddles) = input::parse_paddles(att.profile.paddle_format, payload[offset])
        else {
            return false;
        };
        for (i, pressed) in paddles.into_iter().enumerate() {
            att.emit_button(ctx, paddle_index + i as u8, pressed);
        }
        true
    }

    fn run_timers(&mut self, ctx: &mut SessionCtx<'_>) {
        for index in 0..MAX_ATTACHMENTS {
            let action = {
                let Some(att) = self.attachments[index].as_mut() else {
                    continue;
                };
                att.fragments.expire(ctx.now);
                let busy = att.fragments.in_progress() == Some(command::METADATA);
                att.handshake.poll(ctx.now, busy)
            };
            if let Some(action) = action {
                self.apply_action(index, action, ctx);
            }
        }
    }

    fn pump_motors(&mut self, ctx: &mut SessionCtx<'_>) {
        if !self.motors.has_pending() {
            return;
        }
        if ctx.output.has_pending() {
            // Whatever sits in the output slot never reached the device;
            // replacing it does not count as a transmission.
            self.motors.mark_failed();
        }
        let Some(motor) = self.motors.pump(ctx.now) else {
            return;
        };
        let Some(att) = self.attachments[0].as_mut() else {
            return;
        };
        match direct_motor_frame(&mut att.sequences, 0, &motor) {
            Ok(frame) => {
                ctx.output.request(OutputRequest::output(frame));
                self.motors.mark_sent(ctx.now);
            }
            Err(err) => {
                warn!(error = %err, "GIP: failed to encode motor command");
                self.motors.mark_failed();
            }
        }
    }

    fn motor_control_supported(&self) -> bool {
        self.attachments[0]
            .as_ref()
            .is_some_and(|att| att.profile.has_feature(feature::MOTOR_CONTROL))
    }

    fn queue_motor_command(&mut self, ctx: &mut SessionCtx<'_>) {
        let [left_impulse, right_impulse, left_vibration, right_vibration] = self.rumble_levels;
        self.motors.queue(MotorCommand::new(
            left_impulse,
            right_impulse,
            left_vibration,
            right_vibration,
        ));
        self.pump_motors(ctx);
    }

    fn feature_unsupported(&self, name: &str) -> DeviceError {
        DeviceError::FeatureNotSupported {
            device: self.device_name.clone(),
            feature: name.to_string(),
        }
    }
}

impl DriverSession for GipSession {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn capabilities(&self) -> JoystickCaps {
        let Some(att) = self.attachments[0].as_ref() else {
            return JoystickCaps::default();
        };
        let motor = att.profile.has_feature(feature::MOTOR_CONTROL);
        JoystickCaps {
            rumble: motor,
            trigger_rumble: motor && !att.profile.has_quirk(quirk_flag::NO_IMPULSE_VIBRATION),
            rgb_led: att.profile.has_feature(feature::GUIDE_COLOR),
            player_led: false,
        }
    }

    fn attaches_on_open(&self) -> bool {
        // Joysticks appear once the handshake settles, not at open.
        false
    }

    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus {
        loop {
            let timeout = self.read_timeout_ms;
            match ctx.io.read_report(timeout) {
                Ok(Some(packet)) => {
                    self.read_timeout_ms = 0;
                    self.handle_packet(&packet, ctx);
                }
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "GIP: read failed, tearing down");
                    self.detach_all(ctx);
                    return SessionStatus::Disconnected;
                }
            }
        }
        self.run_timers(ctx);
        self.pump_motors(ctx);
        SessionStatus::Running
    }

    fn rumble(
        &mut self,
        low_frequency: u16,
        high_frequency: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        if !self.motor_control_supported() {
            return Err(self.feature_unsupported("rumble"));
        }
        self.rumble_levels[2] = level_from_u16(low_frequency);
        self.rumble_levels[3] = level_from_u16(high_frequency);
        self.queue_motor_command(ctx);
        Ok(())
    }

    fn rumble_triggers(&mut self, left: u16, right: u16, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        let supported = self.motor_control_supported()
            && !self.attachments[0]
                .as_ref()
                .is_some_and(|att| att.profile.has_quirk(quirk_flag::NO_IMPULSE_VIBRATION));
        if !supported {
            return Err(self.feature_unsupported("trigger rumble"));
        }
        self.rumble_levels[0] = level_from_u16(left);
        self.rumble_levels[1] = level_from_u16(right);
        self.queue_motor_command(ctx);
        Ok(())
    }

    fn set_led(&mut self, red: u8, green: u8, blue: u8, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        let unsupported = self.feature_unsupported("led");
        let Some(att) = self.attachments[0].as_mut() else {
            return Err(unsupported);
        };
        if !att.profile.has_feature(feature::GUIDE_COLOR) {
            return Err(unsupported);
        }
        let payload = [0x00, 0x00, red, green, blue];
        match handshake::vendor_frame(&mut att.sequences, command::GUIDE_COLOR, &payload) {
            Ok(frame) => {
                ctx.output.request(OutputRequest::output(frame));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "GIP: failed to encode guide color");
                Err(unsupported)
            }
        }
    }

    fn close(&mut self, ctx: &mut SessionCtx<'_>) {
        self.detach_all(ctx);
    }
}
