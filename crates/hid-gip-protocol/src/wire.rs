//! GIP framing: data classes, command bytes, flags, and the varint codec.
//!
//! Every GIP packet starts with a three byte header (message type, flags,
//! sequence id) followed by a base-128 varint payload length. Fragmented
//! messages carry a second varint in the payload area: the total message
//! length on the initial fragment, the write offset on continuations.

#![deny(static_mut_refs)]

use openpad_errors::ProtocolError;

/// Largest message accepted by the fragment reassembler.
pub const MAX_MESSAGE_LENGTH: usize = 0x4000;

/// GIP devices expose up to eight logical attachments behind one endpoint.
pub const MAX_ATTACHMENTS: usize = 8;

/// Smallest packet worth parsing: header plus a one byte varint plus one
/// payload byte.
pub const MIN_PACKET_LEN: usize = 5;

/// Data class bits carried in the top three bits of the message type.
pub mod data_class {
    pub const COMMAND: u8 = 0 << 5;
    pub const LOW_LATENCY: u8 = 1 << 5;
    pub const STANDARD_LATENCY: u8 = 2 << 5;
    pub const AUDIO: u8 = 3 << 5;

    pub const SHIFT: u8 = 5;
    pub const MASK: u8 = 7 << 5;
}

/// Outbound payload limit per data class. Classes 4 through 7 are reserved
/// and carry no payload.
pub const DATA_CLASS_MTU: [u16; 8] = [64, 64, 64, 2048, 0, 0, 0, 0];

/// Outbound payload limit for a message type, derived from its class bits.
pub fn mtu_for_type(message_type: u8) -> usize {
    DATA_CLASS_MTU[(message_type >> data_class::SHIFT) as usize] as usize
}

/// Message type bytes. The data class lives in the top three bits, so the
/// same low bits can mean different things across classes, and a system
/// message can share a byte with a vendor message on the command class
/// (the SYSTEM flag disambiguates).
pub mod command {
    // System messages (command class)
    pub const PROTO_CONTROL: u8 = 0x01;
    pub const HELLO_DEVICE: u8 = 0x02;
    pub const STATUS_DEVICE: u8 = 0x03;
    pub const METADATA: u8 = 0x04;
    pub const SET_DEVICE_STATE: u8 = 0x05;
    pub const SECURITY: u8 = 0x06;
    pub const GUIDE_BUTTON: u8 = 0x07;
    pub const AUDIO_CONTROL: u8 = 0x08;
    pub const LED: u8 = 0x0a;
    pub const HID_REPORT: u8 = 0x0b;
    pub const FIRMWARE: u8 = 0x0c;
    pub const EXTENDED: u8 = 0x1e;
    pub const AUDIO_DATA: u8 = 0x60;

    // Vendor messages, low latency class
    pub const DIRECT_MOTOR: u8 = 0x09;
    pub const LL_INPUT_REPORT: u8 = 0x20;
    pub const LL_STATIC_CONFIGURATION: u8 = 0x21;
    pub const LL_BUTTON_INFO_REPORT: u8 = 0x22;
    pub const LL_OVERFLOW_INPUT_REPORT: u8 = 0x26;

    // Vendor messages, standard latency class
    pub const INITIAL_REPORTS_REQUEST: u8 = 0x0a;
    pub const DEVICE_CAPABILITIES: u8 = 0x00;
    pub const RAW_REPORT: u8 = 0x0c;
    pub const GUIDE_COLOR: u8 = 0x0e;
    pub const SL_ELITE_CONFIG: u8 = 0x4d;
}

/// Header flag bits.
pub mod flag {
    /// Packet is part of a fragmented message.
    pub const FRAGMENT: u8 = 1 << 7;
    /// First fragment; the payload varint is the total message length.
    pub const INIT_FRAG: u8 = 1 << 6;
    /// System message rather than a vendor message.
    pub const SYSTEM: u8 = 1 << 5;
    /// Sender requests an acknowledgement for this packet.
    pub const ACME: u8 = 1 << 4;
    /// Low three bits address one of the eight attachments.
    pub const ATTACHMENT_MASK: u8 = 0x7;
}

/// Protocol-control payload codes. Codes other than ACK are obsolete.
pub mod control_code {
    pub const ACK: u8 = 0;
}

/// Device power states carried by SET_DEVICE_STATE.
pub mod device_state {
    pub const START: u8 = 0;
    pub const STOP: u8 = 1;
    pub const FULL_POWER: u8 = 3;
    pub const OFF: u8 = 4;
    pub const QUIESCE: u8 = 5;
    pub const UNK6: u8 = 6;
    pub const RESET: u8 = 7;
}

/// Guide LED selector and modes.
pub mod led {
    pub const GUIDE: u8 = 0;

    pub const GUIDE_OFF: u8 = 0;
    pub const GUIDE_ON: u8 = 1;
    pub const GUIDE_FAST_BLINK: u8 = 2;
    pub const GUIDE_SLOW_BLINK: u8 = 3;
    pub const GUIDE_CHARGING_BLINK: u8 = 4;
    pub const GUIDE_RAMP_TO_LEVEL: u8 = 0xd;
}

/// Extended command selectors and response status codes.
pub mod extended {
    pub const GET_CAPABILITIES: u8 = 0x00;
    pub const GET_TELEMETRY_DATA: u8 = 0x01;
    pub const GET_SERIAL_NUMBER: u8 = 0x04;

    pub const STATUS_OK: u8 = 0;
    pub const STATUS_NOT_SUPPORTED: u8 = 1;
    pub const STATUS_NOT_READY: u8 = 2;
}

/// Decode a little-endian base-128 varint.
///
/// Returns the value and the number of bytes consumed. Decoding stops at
/// the first byte without a continuation bit or at the end of the slice,
/// whichever comes first; bits past the 64-bit range are dropped.
pub fn decode_varint(bytes: &[u8]) -> (u64, usize) {
    let mut value = 0u64;
    let mut offset = 0;
    while offset < bytes.len() {
        let byte = bytes[offset];
        let shift = offset * 7;
        if shift < u64::BITS as usize {
            value |= u64::from(byte & 0x7f) << shift;
        }
        offset += 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value, offset)
}

/// Append a little-endian base-128 varint, returning the encoded width.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out.len() - start
}

/// Parsed packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub message_type: u8,
    pub flags: u8,
    pub sequence_id: u8,
    /// Payload length claimed by the header varint.
    pub length: u64,
}

impl FrameHeader {
    /// Attachment index addressed by this packet.
    pub fn attachment_index(&self) -> u8 {
        self.flags & flag::ATTACHMENT_MASK
    }

    /// Whether the packet belongs to a fragmented message.
    pub fn is_fragment(&self) -> bool {
        self.flags & flag::FRAGMENT != 0
    }

    /// Whether the sender asked for an acknowledgement.
    pub fn wants_ack(&self) -> bool {
        self.flags & flag::ACME != 0
    }
}

/// A parsed packet: header plus the bytes after the length varint.
///
/// `body` is the remainder of the packet, which may run longer than
/// `header.length`; handlers receive the whole tail.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub body: &'a [u8],
}

/// Parse a raw packet into a frame. Packets below [`MIN_PACKET_LEN`] are
/// not worth parsing and yield `None`.
pub fn parse_frame(packet: &[u8]) -> Option<Frame<'_>> {
    if packet.len() < MIN_PACKET_LEN {
        return None;
    }
    let (length, consumed) = decode_varint(&packet[3..]);
    Some(Frame {
        header: FrameHeader {
            message_type: packet[0],
            flags: packet[1],
            sequence_id: packet[2],
            length,
        },
        body: &packet[3 + consumed..],
    })
}

/// Encode a complete outbound frame.
///
/// Fragmenting outbound messages is not supported, so payloads larger than
/// the data-class MTU are rejected.
pub fn encode_frame(
    message_type: u8,
    flags: u8,
    sequence_id: u8,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let mtu = mtu_for_type(message_type);
    if payload.len() > mtu {
        return Err(ProtocolError::MessageTooLarge {
            length: payload.len(),
            mtu,
        });
    }
    let mut frame = Vec::with_capacity(3 + 2 + payload.len());
    frame.push(message_type);
    frame.push(flags);
    frame.push(sequence_id);
    encode_varint(payload.len() as u64, &mut frame);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Encode the acknowledgement frame for a received packet.
///
/// The reply is a PROTO_CONTROL system message echoing the sender's
/// sequence id and attachment index, with a nine byte payload: control
/// code, acknowledged type, system bit, the reassembly offset as a
/// little-endian u32, and the remaining byte count as a u16.
pub fn encode_ack(header: &FrameHeader, fragment_offset: u32, bytes_remaining: u16) -> Vec<u8> {
    let offset = fragment_offset.to_le_bytes();
    let remaining = bytes_remaining.to_le_bytes();
    let payload = [
        control_code::ACK,
        header.message_type,
        header.flags & flag::SYSTEM,
        offset[0],
        offset[1],
        offset[2],
        offset[3],
        remaining[0],
        remaining[1],
    ];
    let mut frame = Vec::with_capacity(3 + 1 + payload.len());
    frame.push(command::PROTO_CONTROL);
    frame.push(flag::SYSTEM | (header.flags & flag::ATTACHMENT_MASK));
    frame.push(header.sequence_id);
    encode_varint(payload.len() as u64, &mut frame);
    frame.extend_from_slice(&payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_single_byte_round_trip() {
        for value in [0u64, 1, 0x7f] {
            let mut out = Vec::new();
            assert_eq!(encode_varint(value, &mut out), 1);
            assert_eq!(decode_varint(&out), (value, 1));
        }
    }

    #[test]
    fn test_varint_multi_byte_round_trip() {
        let mut out = Vec::new();
        assert_eq!(encode_varint(0x80, &mut out), 2);
        assert_eq!(out, [0x80, 0x01]);
        assert_eq!(decode_varint(&out), (0x80, 2));

        out.clear();
        assert_eq!(encode_varint(500, &mut out), 2);
        assert_eq!(decode_varint(&out), (500, 2));

        out.clear();
        assert_eq!(encode_varint(0x4000, &mut out), 3);
        assert_eq!(decode_varint(&out), (0x4000, 3));
    }

    #[test]
    fn test_varint_decode_stops_at_terminator() {
        // Trailing bytes after the terminator are not consumed.
        let (value, consumed) = decode_varint(&[0x05, 0xff, 0xff]);
        assert_eq!(value, 5);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_varint_decode_truncated_run() {
        // A dangling continuation bit consumes the whole slice.
        let (value, consumed) = decode_varint(&[0x80, 0x80]);
        assert_eq!(consumed, 2);
        assert_eq!(value, 0);
    }

    #[test]
    fn test_varint_decode_oversized_run_does_not_panic() {
        let bytes = [0xffu8; 16];
        let (_, consumed) = decode_varint(&bytes);
        assert_eq!(consumed, 16);
    }

    #[test]
    fn test_parse_frame_rejects_short_packets() {
        assert!(parse_frame(&[]).is_none());
        assert!(parse_frame(&[0x20, 0x00, 0x01, 0x0e]).is_none());
    }

    #[test]
    fn test_parse_frame_reads_header_and_body() -> Result<(), Box<dyn std::error::Error>> {
        let packet = [0x20, 0x00, 0x07, 0x03, 0xaa, 0xbb, 0xcc];
        let frame = parse_frame(&packet).ok_or("frame should parse")?;
        assert_eq!(frame.header.message_type, 0x20);
        assert_eq!(frame.header.flags, 0x00);
        assert_eq!(frame.header.sequence_id, 0x07);
        assert_eq!(frame.header.length, 3);
        assert_eq!(frame.body, &[0xaa, 0xbb, 0xcc]);
        Ok(())
    }

    #[test]
    fn test_frame_body_may_exceed_claimed_length() -> Result<(), Box<dyn std::error::Error>> {
        let packet = [0x03, 0x20, 0x01, 0x01, 0x42, 0x00, 0x00];
        let frame = parse_frame(&packet).ok_or("frame should parse")?;
        assert_eq!(frame.header.length, 1);
        assert_eq!(frame.body.len(), 3);
        Ok(())
    }

    #[test]
    fn test_encode_frame_layout() -> Result<(), Box<dyn std::error::Error>> {
        let frame = encode_frame(command::SET_DEVICE_STATE, flag::SYSTEM, 1, &[device_state::START])?;
        assert_eq!(frame, [0x05, 0x20, 0x01, 0x01, 0x00]);
        Ok(())
    }

    #[test]
    fn test_encode_frame_enforces_class_mtu() {
        let payload = [0u8; 65];
        let err = encode_frame(command::METADATA, flag::SYSTEM, 1, &payload);
        assert!(matches!(
            err,
            Err(ProtocolError::MessageTooLarge { length: 65, mtu: 64 })
        ));

        // The audio class allows much larger payloads.
        let audio_payload = [0u8; 1024];
        assert!(encode_frame(command::AUDIO_DATA, 0, 1, &audio_payload).is_ok());
    }

    #[test]
    fn test_encode_ack_layout() {
        let header = FrameHeader {
            message_type: command::METADATA,
            flags: flag::FRAGMENT | flag::SYSTEM | flag::ACME | 0x02,
            sequence_id: 0x15,
            length: 64,
        };
        let ack = encode_ack(&header, 0x0102_0304, 0x0a0b);
        // PROTO_CONTROL header echoing sequence id and attachment index.
        assert_eq!(&ack[..4], &[command::PROTO_CONTROL, flag::SYSTEM | 0x02, 0x15, 9]);
        // Payload: code, type, system bit, offset LE, remaining LE.
        assert_eq!(
            &ack[4..],
            &[
                control_code::ACK,
                command::METADATA,
                flag::SYSTEM,
                0x04,
                0x03,
                0x02,
                0x01,
                0x0b,
                0x0a
            ]
        );
    }

    #[test]
    fn test_mtu_for_type_uses_class_bits() {
        assert_eq!(mtu_for_type(command::METADATA), 64);
        assert_eq!(mtu_for_type(command::LL_INPUT_REPORT), 64);
        assert_eq!(mtu_for_type(command::SL_ELITE_CONFIG), 64);
        assert_eq!(mtu_for_type(command::AUDIO_DATA), 2048);
        assert_eq!(mtu_for_type(0x80), 0);
    }

    // Header consistency checks.
    const _: () = assert!(flag::FRAGMENT == 0x80);
    const _: () = assert!(flag::INIT_FRAG == 0x40);
    const _: () = assert!(flag::SYSTEM == 0x20);
    const _: () = assert!(flag::ACME == 0x10);
    const _: () = assert!(data_class::AUDIO == 0x60);
    const _: () = assert!(command::AUDIO_DATA & data_class::MASK == data_class::AUDIO);
}
