//! Xbox GIP (Gaming Input Protocol) codecs: frame parsing, fragment
//! reassembly, the attachment handshake, and rumble encoding.
//!
//! This crate is intentionally I/O-free. It provides pure functions and
//! state machines that can be tested and fuzzed without hardware or
//! OS-level HID plumbing.

#![deny(static_mut_refs)]

pub mod fragment;
pub mod handshake;
pub mod input;
pub mod metadata;
pub mod motor;
pub mod profile;
pub mod quirks;
pub mod sequence;
pub mod wire;

// Flat re-exports so callers can use `gamepad_hid_gip_protocol::Foo`.
pub use fragment::{FRAGMENT_TIMEOUT, FragmentOutcome, FragmentReassembler, MAX_FRAGMENT_RETRIES};
pub use handshake::{
    GipHandshake, GipHandshakeConfig, GipRetryPolicy, HELLO_PAYLOAD_LEN, HELLO_TIMEOUT,
    HandshakeAction, HandshakeState, HelloMessage, METADATA_READ_TIMEOUT, build_init_sequence,
    device_capabilities_frame, elite_raw_report_frame, extended_power_on_frame,
    firmware_query_frame, guide_led_frame, initial_reports_request_frame, metadata_request_frame,
    parse_hello, security_enable_frame, set_device_state_frame, system_frame, vendor_frame,
};
pub use input::{
    BatteryStatus, DeviceStatus, FIRMWARE_RESPONSE_VERSION, FirmwareVersion, FlightStickRaw,
    GUIDE_VIRTUAL_KEY, GamepadAxesRaw, MAX_STATUS_EVENTS, RAW_REPORT_MIN_LEN, SHARE_BUTTON,
    StatusEvent, center_unsigned, flight_extra_axis, flight_extra_button, function_map_offset,
    paddle_offset, parse_device_status, parse_firmware_response, parse_flight_stick,
    parse_gamepad_axes, parse_guide_button, parse_paddles, split_battery_byte,
};
pub use metadata::{
    DEFAULT_IN_SYSTEM_MESSAGES, DEFAULT_OUT_SYSTEM_MESSAGES, DeviceMetadata, GipDeviceKind,
    GipMetadata, MessageMetadata, MetadataStatus, PaddleFormat, SystemMessageSet,
    features_for_interface, kind_from_preferred_type, parse_metadata,
};
pub use motor::{
    BUSY_WINDOW, BUSY_WINDOW_BLUETOOTH, DEFAULT_DURATION, MotorCommand, MotorScheduler,
    RumbleState, direct_motor_frame, level_from_u16,
};
pub use profile::AttachmentProfile;
pub use quirks::{GipQuirk, QUIRKS, find_quirk};
pub use sequence::SequenceBank;
pub use wire::{
    DATA_CLASS_MTU, Frame, FrameHeader, MAX_ATTACHMENTS, MAX_MESSAGE_LENGTH, MIN_PACKET_LEN,
    decode_varint, encode_ack, encode_frame, encode_varint, mtu_for_type, parse_frame,
};

// Error type re-exported so callers don't need a direct `openpad-errors`
// dependency when matching on parse failures.
pub use openpad_errors::ProtocolError;
