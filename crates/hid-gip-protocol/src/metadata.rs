//! GIP device metadata: the capability blob and what we derive from it.
//!
//! After the hello exchange a device answers a metadata request with a
//! length-prefixed blob describing its supported system messages, vendor
//! messages, preferred device types, and interface GUIDs. The blob usually
//! arrives fragmented. Parsing is all-or-nothing: a structurally invalid
//! blob is rejected wholesale and the handshake falls back to defaults.

#![deny(static_mut_refs)]

use openpad_errors::ProtocolError;

use crate::wire::command;

/// Progress of the metadata exchange for one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataStatus {
    /// No metadata requested yet.
    #[default]
    None,
    /// Device answered with a real blob.
    Got,
    /// Defaults synthesized after the device failed to answer.
    Faked,
    /// Request sent, waiting for the response.
    Pending,
}

/// Feature bits derived from metadata, quirks, or both.
pub mod feature {
    pub const CONSOLE_FUNCTION_MAP: u32 = 1 << 0;
    pub const CONSOLE_FUNCTION_MAP_OVERFLOW: u32 = 1 << 1;
    pub const ELITE_BUTTONS: u32 = 1 << 2;
    pub const DYNAMIC_LATENCY_INPUT: u32 = 1 << 3;
    pub const SECURITY_OPT_OUT: u32 = 1 << 4;
    pub const MOTOR_CONTROL: u32 = 1 << 5;
    pub const GUIDE_COLOR: u32 = 1 << 6;
    pub const EXTENDED_SET_DEVICE_STATE: u32 = 1 << 7;
}

/// Direction and delivery flags on vendor message descriptors.
pub mod message_flag {
    pub const BIG_ENDIAN: u32 = 1 << 0;
    pub const RELIABLE: u32 = 1 << 1;
    pub const SEQUENCED: u32 = 1 << 2;
    pub const DOWNSTREAM: u32 = 1 << 3;
    pub const UPSTREAM: u32 = 1 << 4;
    pub const DS_REQUEST_RESPONSE: u32 = 1 << 5;
}

/// System messages every device is assumed to accept before metadata
/// arrives: proto control, hello, status, metadata, security.
pub const DEFAULT_IN_SYSTEM_MESSAGES: u32 = 0x5e;

/// System messages we assume we may send before metadata arrives: proto
/// control, metadata, set device state, security, LED.
pub const DEFAULT_OUT_SYSTEM_MESSAGES: u32 = 0x472;

/// What kind of input device an attachment claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GipDeviceKind {
    Unknown,
    #[default]
    Gamepad,
    ArcadeStick,
    Wheel,
    FlightStick,
    NavigationController,
    Chatpad,
}

impl GipDeviceKind {
    /// Chatpads are keyboards; everything else is exposed as a joystick.
    pub fn is_controller(self) -> bool {
        self != GipDeviceKind::Chatpad
    }
}

/// Format of Elite controller paddle data within input reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaddleFormat {
    #[default]
    Unknown,
    Xbe1,
    Xbe2Raw,
    Xbe2,
}

/// Bitmap of supported system message types, indexed by type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemMessageSet([u32; 8]);

impl SystemMessageSet {
    pub const fn empty() -> Self {
        Self([0; 8])
    }

    pub const fn from_words(words: [u32; 8]) -> Self {
        Self(words)
    }

    /// Defaults assumed for the device-to-host direction.
    pub const fn default_inbound() -> Self {
        Self([DEFAULT_IN_SYSTEM_MESSAGES, 0, 0, 0, 0, 0, 0, 0])
    }

    /// Defaults assumed for the host-to-device direction.
    pub const fn default_outbound() -> Self {
        Self([DEFAULT_OUT_SYSTEM_MESSAGES, 0, 0, 0, 0, 0, 0, 0])
    }

    pub fn contains(&self, message_type: u8) -> bool {
        self.0[(message_type >> 5) as usize] & (1u32 << (message_type & 0x1f)) != 0
    }

    pub fn insert(&mut self, message_type: u8) {
        self.0[(message_type >> 5) as usize] |= 1u32 << (message_type & 0x1f);
    }

    /// OR another set in, used when quirks extend the advertised set.
    pub fn merge(&mut self, other: &SystemMessageSet) {
        for (word, extra) in self.0.iter_mut().zip(other.0.iter()) {
            *word |= extra;
        }
    }
}

/// Descriptor for one vendor message the device speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMetadata {
    pub message_type: u8,
    pub length: u16,
    pub data_type: u16,
    pub flags: u32,
    pub period: u16,
    pub persistence_timeout: u16,
}

/// Device-level metadata block.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    pub audio_formats: Vec<u8>,
    pub in_system_messages: SystemMessageSet,
    pub out_system_messages: SystemMessageSet,
    pub preferred_types: Vec<String>,
    pub supported_interfaces: Vec<[u8; 16]>,
    pub hid_descriptor: Vec<u8>,
}

/// Parsed metadata blob.
#[derive(Debug, Clone, Default)]
pub struct GipMetadata {
    pub version_major: u16,
    pub version_minor: u16,
    pub device: DeviceMetadata,
    pub messages: Vec<MessageMetadata>,
}

impl GipMetadata {
    /// Whether the device's vendor message table allows a message in the
    /// given direction. Request-response descriptors match either way.
    pub fn supports_vendor_message(&self, message_type: u8, upstream: bool) -> bool {
        for message in &self.messages {
            if message.message_type != message_type {
                continue;
            }
            if message.flags & message_flag::DS_REQUEST_RESPONSE != 0 {
                return true;
            }
            return if upstream {
                message.flags & message_flag::UPSTREAM != 0
            } else {
                message.flags & message_flag::DOWNSTREAM != 0
            };
        }
        false
    }

    /// Rumble requires a downstream direct-motor descriptor wide enough
    /// for the nine byte command.
    pub fn supports_motor_control(&self) -> bool {
        self.messages.iter().any(|message| {
            message.message_type == command::DIRECT_MOTOR
                && message.length >= 9
                && message.flags & message_flag::DOWNSTREAM != 0
        })
    }
}

/// Interface GUIDs, stored in wire order (little-endian fields) so a
/// parsed blob can be compared byte for byte.
pub mod interface_guid {
    const fn guid(a: u32, b: u16, c: u16, d: [u8; 8]) -> [u8; 16] {
        let ab = a.to_le_bytes();
        let bb = b.to_le_bytes();
        let cb = c.to_le_bytes();
        [
            ab[0], ab[1], ab[2], ab[3], bb[0], bb[1], cb[0], cb[1], d[0], d[1], d[2], d[3], d[4],
            d[5], d[6], d[7],
        ]
    }

    pub const ARCADE_STICK: [u8; 16] = guid(
        0x332054cc,
        0xa34b,
        0x41d5,
        [0xa3, 0x4a, 0xa6, 0xa6, 0x71, 0x1e, 0xc4, 0xb3],
    );
    pub const DYNAMIC_LATENCY_INPUT: [u8; 16] = guid(
        0x87f2e56b,
        0xc3bb,
        0x49b1,
        [0x82, 0x65, 0xff, 0xff, 0xf3, 0x77, 0x99, 0xee],
    );
    pub const FLIGHT_STICK: [u8; 16] = guid(
        0x03f1a011,
        0xefe9,
        0x4cc1,
        [0x96, 0x9c, 0x38, 0xdc, 0x55, 0xf4, 0x04, 0xd0],
    );
    pub const CONSOLE_FUNCTION_MAP_INPUT_REPORT: [u8; 16] = guid(
        0xecddd2fe,
        0xd387,
        0x4294,
        [0xbd, 0x96, 0x1a, 0x71, 0x2e, 0x3d, 0xc7, 0x7d],
    );
    pub const CONSOLE_FUNCTION_MAP_OVERFLOW_INPUT_REPORT: [u8; 16] = guid(
        0x137d4bd0,
        0x9347,
        0x4472,
        [0xaa, 0x26, 0x8c, 0x34, 0xa0, 0x8f, 0xf9, 0xbd],
    );
    pub const CONTROLLER: [u8; 16] = guid(
        0x9776ff56,
        0x9bfd,
        0x4581,
        [0xad, 0x45, 0xb6, 0x45, 0xbb, 0xa5, 0x26, 0xd6],
    );
    pub const DEV_AUTH_PC_OPT_OUT: [u8; 16] = guid(
        0x7a34ce77,
        0x7de2,
        0x45c6,
        [0x8c, 0xa4, 0x00, 0x42, 0xc0, 0x8b, 0xd9, 0x4a],
    );
    pub const ELITE_BUTTONS: [u8; 16] = guid(
        0x37d19ff7,
        0xb5c6,
        0x49d1,
        [0xa7, 0x5e, 0x03, 0xb2, 0x4b, 0xef, 0x8c, 0x89],
    );
    pub const GAMEPAD: [u8; 16] = guid(
        0x082e402c,
        0x07df,
        0x45e1,
        [0xa5, 0xab, 0xa3, 0x12, 0x7a, 0xf1, 0x97, 0xb5],
    );
    pub const NAVIGATION_CONTROLLER: [u8; 16] = guid(
        0xb8f31fe7,
        0x7386,
        0x40e9,
        [0xa9, 0xf8, 0x2f, 0x21, 0x26, 0x3a, 0xcf, 0xb7],
    );
    pub const WHEEL: [u8; 16] = guid(
        0x646979cf,
        0x6b71,
        0x4e96,
        [0x8d, 0xf9, 0x59, 0xe3, 0x98, 0xd7, 0x42, 0x0c],
    );
}

/// Map a preferred-type string to a device kind and the interface GUID a
/// well-behaved device of that kind should also advertise.
pub fn kind_from_preferred_type(name: &str) -> Option<(GipDeviceKind, Option<&'static [u8; 16]>)> {
    match name {
        "Windows.Xbox.Input.Gamepad" => {
            Some((GipDeviceKind::Gamepad, Some(&interface_guid::GAMEPAD)))
        }
        "Microsoft.Xbox.Input.ArcadeStick" | "Windows.Xbox.Input.ArcadeStick" => Some((
            GipDeviceKind::ArcadeStick,
            Some(&interface_guid::ARCADE_STICK),
        )),
        "Microsoft.Xbox.Input.FlightStick" | "Windows.Xbox.Input.FlightStick" => Some((
            GipDeviceKind::FlightStick,
            Some(&interface_guid::FLIGHT_STICK),
        )),
        "Microsoft.Xbox.Input.Wheel" | "Windows.Xbox.Input.Wheel" => {
            Some((GipDeviceKind::Wheel, Some(&interface_guid::WHEEL)))
        }
        "Windows.Xbox.Input.NavigationController" => Some((
            GipDeviceKind::NavigationController,
            Some(&interface_guid::NAVIGATION_CONTROLLER),
        )),
        "Windows.Xbox.Input.Chatpad" => Some((GipDeviceKind::Chatpad, None)),
        _ => None,
    }
}

/// Feature bits implied by one advertised interface GUID.
pub fn features_for_interface(guid: &[u8; 16]) -> u32 {
    if guid == &interface_guid::DEV_AUTH_PC_OPT_OUT {
        feature::SECURITY_OPT_OUT
    } else if guid == &interface_guid::CONSOLE_FUNCTION_MAP_INPUT_REPORT {
        feature::CONSOLE_FUNCTION_MAP
    } else if guid == &interface_guid::CONSOLE_FUNCTION_MAP_OVERFLOW_INPUT_REPORT {
        feature::CONSOLE_FUNCTION_MAP_OVERFLOW
    } else if guid == &interface_guid::ELITE_BUTTONS {
        feature::ELITE_BUTTONS
    } else if guid == &interface_guid::DYNAMIC_LATENCY_INPUT {
        feature::DYNAMIC_LATENCY_INPUT
    } else {
        0
    }
}

fn u16_le(bytes: &[u8], at: usize) -> usize {
    bytes[at] as usize | (bytes[at + 1] as usize) << 8
}

/// Parse a complete metadata blob.
pub fn parse_metadata(bytes: &[u8]) -> Result<GipMetadata, ProtocolError> {
    if bytes.len() < 16 {
        return Err(ProtocolError::metadata("blob shorter than the fixed header"));
    }
    let header_size = u16_le(bytes, 0);
    if bytes.len() < header_size || header_size < 16 {
        return Err(ProtocolError::metadata("bad header size"));
    }
    let version_major = u16_le(bytes, 2) as u16;
    let version_minor = u16_le(bytes, 4) as u16;
    // Middle header bytes are reserved.
    let metadata_size = u16_le(bytes, 14);
    if bytes.len() < metadata_size || metadata_size < header_size {
        return Err(ProtocolError::metadata("bad metadata size"));
    }

    let mut offset = header_size;
    let device = parse_device_metadata(bytes, &mut offset, version_major, version_minor)?;

    if offset >= bytes.len() {
        return Err(ProtocolError::metadata("message table missing"));
    }
    let num_messages = bytes[offset] as usize;
    offset += 1;
    let mut messages = Vec::with_capacity(num_messages);
    for _ in 0..num_messages {
        messages.push(parse_message_metadata(bytes, &mut offset)?);
    }

    Ok(GipMetadata {
        version_major,
        version_minor,
        device,
        messages,
    })
}

fn parse_device_metadata(
    outer: &[u8],
    offset: &mut usize,
    version_major: u16,
    version_minor: u16,
) -> Result<DeviceMetadata, ProtocolError> {
    let bytes = &outer[*offset..];
    if bytes.len() < 16 {
        return Err(ProtocolError::metadata("device block shorter than 16 bytes"));
    }
    let length = u16_le(bytes, 0);
    if bytes.len() < length {
        return Err(ProtocolError::metadata("device block length out of range"));
    }
    let mut device = DeviceMetadata::default();

    // Offset 2 holds the supported firmware versions table, unused here.

    let audio_offset = u16_le(bytes, 4);
    if audio_offset >= length {
        return Err(ProtocolError::metadata("audio format table out of range"));
    }
    if audio_offset > 0 {
        let count = bytes[audio_offset] as usize;
        if audio_offset + count + 1 > length {
            return Err(ProtocolError::metadata("audio format table truncated"));
        }
        device.audio_formats = bytes[audio_offset + 1..audio_offset + 1 + count].to_vec();
    }

    let in_offset = u16_le(bytes, 6);
    if in_offset >= length {
        return Err(ProtocolError::metadata("inbound message table out of range"));
    }
    if in_offset > 0 {
        let count = bytes[in_offset] as usize;
        if in_offset + count + 1 > length {
            return Err(ProtocolError::metadata("inbound message table truncated"));
        }
        for &message in &bytes[in_offset + 1..in_offset + 1 + count] {
            device.in_system_messages.insert(message);
        }
    }

    let out_offset = u16_le(bytes, 8);
    if out_offset >= length {
        return Err(ProtocolError::metadata("outbound message table out of range"));
    }
    if out_offset > 0 {
        let count = bytes[out_offset] as usize;
        if out_offset + count + 1 > length {
            return Err(ProtocolError::metadata("outbound message table truncated"));
        }
        for &message in &bytes[out_offset + 1..out_offset + 1 + count] {
            device.out_system_messages.insert(message);
        }
    }

    let types_offset = u16_le(bytes, 10);
    if types_offset >= length {
        return Err(ProtocolError::metadata("preferred type table out of range"));
    }
    if types_offset > 0 {
        let count = bytes[types_offset] as usize;
        let mut cursor = types_offset + 1;
        for _ in 0..count {
            if cursor + 2 >= length {
                return Err(ProtocolError::metadata("preferred type entry truncated"));
            }
            let name_len = u16_le(bytes, cursor);
            cursor += 2;
            if cursor + name_len > length {
                return Err(ProtocolError::metadata("preferred type string truncated"));
            }
            device.preferred_types.push(
                String::from_utf8_lossy(&bytes[cursor..cursor + name_len]).into_owned(),
            );
            cursor += name_len;
        }
    }

    let interfaces_offset = u16_le(bytes, 12);
    if interfaces_offset >= length {
        return Err(ProtocolError::metadata("interface table out of range"));
    }
    if interfaces_offset > 0 {
        let count = bytes[interfaces_offset] as usize;
        if interfaces_offset + 1 + count * 16 > length {
            return Err(ProtocolError::metadata("interface table truncated"));
        }
        for chunk in bytes[interfaces_offset + 1..interfaces_offset + 1 + count * 16].chunks(16) {
            let mut guid = [0u8; 16];
            guid.copy_from_slice(chunk);
            device.supported_interfaces.push(guid);
        }
    }

    // HID descriptor support arrived with metadata 1.1.
    if version_major > 1 || version_minor >= 1 {
        let hid_offset = u16_le(bytes, 14);
        if hid_offset >= length {
            return Err(ProtocolError::metadata("HID descriptor out of range"));
        }
        if hid_offset > 0 {
            let size = bytes[hid_offset] as usize;
            if hid_offset + 1 + size > length {
                return Err(ProtocolError::metadata("HID descriptor truncated"));
            }
            device.hid_descriptor = bytes[hid_offset + 1..hid_offset + 1 + size].to_vec();
        }
    }

    *offset += length;
    Ok(device)
}

fn parse_message_metadata(
    outer: &[u8],
    offset: &mut usize,
) -> Result<MessageMetadata, ProtocolError> {
    let bytes = &outer[*offset..];
    if bytes.len() < 2 {
        return Err(ProtocolError::metadata("message descriptor truncated"));
    }
    let length = u16_le(bytes, 0);
    if bytes.len() < length || length < 15 {
        return Err(ProtocolError::metadata("message descriptor length invalid"));
    }

    let metadata = MessageMetadata {
        message_type: bytes[2],
        length: u16_le(bytes, 3) as u16,
        data_type: u16_le(bytes, 5) as u16,
        flags: bytes[7] as u32
            | (bytes[8] as u32) << 8
            | (bytes[9] as u32) << 16
            | (bytes[10] as u32) << 24,
        period: u16_le(bytes, 11) as u16,
        persistence_timeout: u16_le(bytes, 13) as u16,
    };

    *offset += length;
    Ok(metadata)
}
