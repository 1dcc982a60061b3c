//! GIP startup ladder.
//!
//! A healthy device walks `Waiting -> Announced -> Identifying -> Startup ->
//! PrepareInput -> Complete`: it announces itself with a hello, we request
//! its metadata, then run the startup sequence and attach the joystick.
//! Devices that never announce, or never answer metadata, are driven through
//! the same ladder by timeouts and synthesized defaults.
//!
//! The state machine here is time-driven but does no I/O. Callers feed it
//! hellos and clock ticks; it hands back actions (request metadata, assume
//! defaults, reset) and the caller transmits the corresponding frames.

#![deny(static_mut_refs)]

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use openpad_errors::ProtocolError;

use crate::metadata::{MetadataStatus, feature};
use crate::profile::AttachmentProfile;
use crate::sequence::SequenceBank;
use crate::wire::{command, device_state, encode_frame, flag, led};

/// How long we wait for a hello before falling back.
pub const HELLO_TIMEOUT: Duration = Duration::from_millis(2000);

/// Shortened blocking-read window while a metadata answer is due.
pub const METADATA_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Guide LED brightness used during startup.
const STARTUP_LED_INTENSITY: u8 = 20;

/// Retry budget for the metadata request.
#[derive(Debug, Clone, Copy)]
pub struct GipRetryPolicy {
    pub max_retries: u8,
    pub retry_delay: Duration,
}

impl Default for GipRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Per-device knobs, resolved from quirks and hints before the first poll.
#[derive(Debug, Clone, Copy, Default)]
pub struct GipHandshakeConfig {
    /// Device never sends a hello; start identified.
    pub skip_hello: bool,
    /// Reset the device instead of faking metadata when it stays silent.
    pub reset_for_metadata: bool,
    pub retry: GipRetryPolicy,
}

/// Where the attachment is on the startup ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    /// Nothing heard yet.
    Waiting,
    /// Hello received (or assumed).
    Announced,
    /// Metadata requested, answer outstanding.
    Identifying,
    /// Startup sequence being transmitted.
    Startup,
    /// Input reports are armed.
    PrepareInput,
    /// Joystick attached.
    Complete,
}

/// What the caller should transmit or synthesize next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Send a metadata request system message.
    RequestMetadata,
    /// Synthesize default metadata and attach the joystick.
    AssumeDefaults,
    /// Synthesize default metadata, then run the startup sequence.
    AssumeDefaultsAndStart,
    /// Ask the device to reset itself and start over.
    ResetDevice,
}

/// Device hello payload, always exactly 28 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    pub device_id: u64,
    pub vendor_id: u16,
    pub product_id: u16,
    pub firmware_major_version: u16,
    pub firmware_minor_version: u16,
    pub firmware_build_version: u16,
    pub firmware_revision: u16,
    pub hardware_major_version: u8,
    pub hardware_minor_version: u8,
    pub rf_proto_major_version: u8,
    pub rf_proto_minor_version: u8,
    pub security_major_version: u8,
    pub security_minor_version: u8,
    pub gip_major_version: u8,
    pub gip_minor_version: u8,
}

pub const HELLO_PAYLOAD_LEN: usize = 28;

fn u16_le(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

/// Decode a hello payload. Anything that is not exactly 28 bytes is
/// rejected.
pub fn parse_hello(bytes: &[u8]) -> Result<HelloMessage, ProtocolError> {
    if bytes.len() != HELLO_PAYLOAD_LEN {
        return Err(ProtocolError::truncated(HELLO_PAYLOAD_LEN, bytes.len()));
    }
    let mut device_id = [0u8; 8];
    device_id.copy_from_slice(&bytes[0..8]);
    Ok(HelloMessage {
        device_id: u64::from_le_bytes(device_id),
        vendor_id: u16_le(bytes, 8),
        product_id: u16_le(bytes, 10),
        firmware_major_version: u16_le(bytes, 12),
        firmware_minor_version: u16_le(bytes, 14),
        firmware_build_version: u16_le(bytes, 16),
        firmware_revision: u16_le(bytes, 18),
        hardware_major_version: bytes[20],
        hardware_minor_version: bytes[21],
        rf_proto_major_version: bytes[22],
        rf_proto_minor_version: bytes[23],
        security_major_version: bytes[24],
        security_minor_version: bytes[25],
        gip_major_version: bytes[26],
        gip_minor_version: bytes[27],
    })
}

impl HelloMessage {
    /// Warn about protocol versions other than 1.0. The GIP spec says to
    /// reject such devices outright, but real hosts appear to tolerate
    /// them, so we only log.
    pub fn log_version_warnings(&self) {
        if self.rf_proto_major_version != 1 || self.rf_proto_minor_version != 0 {
            warn!(
                major = self.rf_proto_major_version,
                minor = self.rf_proto_minor_version,
                "unexpected RF protocol version, expected 1.0"
            );
        }
        if self.security_major_version != 1 || self.security_minor_version != 0 {
            warn!(
                major = self.security_major_version,
                minor = self.security_minor_version,
                "unexpected security protocol version, expected 1.0"
            );
        }
        if self.gip_major_version != 1 || self.gip_minor_version != 0 {
            warn!(
                major = self.gip_major_version,
                minor = self.gip_minor_version,
                "unexpected GIP version, expected 1.0"
            );
        }
    }
}

/// Startup ladder for one attachment. Only attachment zero arms the hello
/// deadline; sub-attachments ride on the device-level announcement.
#[derive(Debug)]
pub struct GipHandshake {
    attachment_index: u8,
    state: HandshakeState,
    metadata_status: MetadataStatus,
    hello_deadline: Option<Instant>,
    metadata_next: Option<Instant>,
    metadata_retries: u8,
    config: GipHandshakeConfig,
}

impl GipHandshake {
    pub fn new(attachment_index: u8, config: GipHandshakeConfig, now: Instant) -> Self {
        let mut handshake = Self {
            attachment_index,
            state: HandshakeState::Waiting,
            metadata_status: MetadataStatus::None,
            hello_deadline: None,
            metadata_next: None,
            metadata_retries: 0,
            config,
        };
        if attachment_index == 0 {
            if config.skip_hello {
                handshake.set_state(HandshakeState::Announced);
            } else {
                handshake.hello_deadline = Some(now + HELLO_TIMEOUT);
            }
        }
        handshake
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn metadata_status(&self) -> MetadataStatus {
        self.metadata_status
    }

    /// Whether the device-level hello has been seen or assumed.
    pub fn announced(&self) -> bool {
        self.state >= HandshakeState::Announced
    }

    fn set_state(&mut self, state: HandshakeState) {
        if state != self.state {
            debug!(from = ?self.state, to = ?state, index = self.attachment_index, "handshake state");
            self.state = state;
        }
    }

    /// A hello arrived for this attachment.
    pub fn on_hello(&mut self, now: Instant) -> Option<HandshakeAction> {
        if self.attachment_index != 0 {
            // Sub-attachments get an immediate metadata request without
            // the retry machinery.
            return Some(HandshakeAction::RequestMetadata);
        }
        self.hello_deadline = None;
        self.set_state(HandshakeState::Announced);
        if self.metadata_status == MetadataStatus::Faked {
            // The device rebooted after we gave up on it; identify again.
            self.metadata_status = MetadataStatus::None;
        }
        self.ensure_metadata(true, now)
    }

    /// Make sure the metadata exchange is underway. Called after hellos
    /// and on any status message.
    pub fn ensure_metadata(
        &mut self,
        device_announced: bool,
        now: Instant,
    ) -> Option<HandshakeAction> {
        match self.metadata_status {
            MetadataStatus::Got | MetadataStatus::Faked | MetadataStatus::Pending => None,
            MetadataStatus::None => {
                if device_announced {
                    self.metadata_status = MetadataStatus::Pending;
                    self.metadata_retries = 0;
                    self.metadata_next = Some(now + self.config.retry.retry_delay);
                    self.set_state(HandshakeState::Identifying);
                    Some(HandshakeAction::RequestMetadata)
                } else {
                    Some(HandshakeAction::AssumeDefaults)
                }
            }
        }
    }

    /// Advance timers. `metadata_fragment_busy` suppresses retries while a
    /// metadata blob is mid-reassembly.
    pub fn poll(&mut self, now: Instant, metadata_fragment_busy: bool) -> Option<HandshakeAction> {
        if let Some(deadline) = self.hello_deadline {
            if now >= deadline {
                self.hello_deadline = None;
                warn!("device never said hello, falling back");
                return Some(self.fall_back(now));
            }
        }
        if self.metadata_status == MetadataStatus::Pending && !metadata_fragment_busy {
            if let Some(next) = self.metadata_next {
                if now >= next {
                    if self.metadata_retries < self.config.retry.max_retries {
                        self.metadata_retries += 1;
                        self.metadata_next = Some(now + self.config.retry.retry_delay);
                        warn!(attempt = self.metadata_retries, "retrying metadata request");
                        return Some(HandshakeAction::RequestMetadata);
                    }
                    warn!("metadata request retries exhausted");
                    return Some(self.fall_back(now));
                }
            }
        }
        None
    }

    fn fall_back(&mut self, now: Instant) -> HandshakeAction {
        if self.config.reset_for_metadata {
            // The device usually re-enumerates after a reset. Re-arming the
            // deadline paces further resets for one that reboots in place.
            self.metadata_status = MetadataStatus::None;
            self.metadata_next = None;
            self.set_state(HandshakeState::Waiting);
            self.hello_deadline = Some(now + HELLO_TIMEOUT);
            HandshakeAction::ResetDevice
        } else {
            HandshakeAction::AssumeDefaultsAndStart
        }
    }

    /// A metadata blob parsed successfully.
    pub fn metadata_got(&mut self) {
        self.metadata_status = MetadataStatus::Got;
        self.metadata_next = None;
        self.set_state(HandshakeState::Startup);
    }

    /// Defaults were synthesized in place of real metadata.
    pub fn metadata_faked(&mut self) {
        self.metadata_status = MetadataStatus::Faked;
        self.metadata_next = None;
        self.hello_deadline = None;
    }

    /// The startup sequence is going out.
    pub fn begin_startup(&mut self) {
        self.set_state(HandshakeState::Startup);
    }

    /// Startup sent; input reports may now arrive.
    pub fn input_armed(&mut self) {
        self.set_state(HandshakeState::PrepareInput);
    }

    /// The joystick is attached.
    pub fn attached(&mut self) {
        self.set_state(HandshakeState::Complete);
    }
}

/// Encode a system message: flags carry the system bit and the attachment
/// index, the sequence id comes from the per-type system stream.
pub fn system_frame(
    sequences: &mut SequenceBank,
    message_type: u8,
    attachment_index: u8,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let seq = sequences.next_system(message_type);
    encode_frame(
        message_type,
        flag::SYSTEM | (attachment_index & flag::ATTACHMENT_MASK),
        seq,
        payload,
    )
}

/// Encode a vendor message on the shared vendor sequence stream.
pub fn vendor_frame(
    sequences: &mut SequenceBank,
    message_type: u8,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let seq = sequences.next_vendor(message_type);
    encode_frame(message_type, 0, seq, payload)
}

pub fn metadata_request_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
) -> Result<Vec<u8>, ProtocolError> {
    system_frame(sequences, command::METADATA, attachment_index, &[])
}

pub fn set_device_state_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
    state: u8,
) -> Result<Vec<u8>, ProtocolError> {
    system_frame(sequences, command::SET_DEVICE_STATE, attachment_index, &[state])
}

/// Undocumented extended power-on blob the Elite Series 2 needs on older
/// firmwares.
pub fn extended_power_on_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = [
        device_state::UNK6,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x55,
        0x53,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
        0x00,
    ];
    system_frame(sequences, command::SET_DEVICE_STATE, attachment_index, &payload)
}

pub fn guide_led_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
    pattern: u8,
    intensity: u8,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = [led::GUIDE, pattern, intensity];
    system_frame(sequences, command::LED, attachment_index, &payload)
}

pub fn security_enable_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
) -> Result<Vec<u8>, ProtocolError> {
    system_frame(sequences, command::SECURITY, attachment_index, &[0x01, 0x00])
}

/// The slot argument is a best guess; the packet format is still unclear.
pub fn firmware_query_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
    slot: u8,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = [0x01, slot, 0x00, 0x00, 0x00];
    system_frame(sequences, command::FIRMWARE, attachment_index, &payload)
}

pub fn initial_reports_request_frame(
    sequences: &mut SequenceBank,
) -> Result<Vec<u8>, ProtocolError> {
    vendor_frame(sequences, command::INITIAL_REPORTS_REQUEST, &[0x00, 0x00, 0x00])
}

pub fn device_capabilities_frame(sequences: &mut SequenceBank) -> Result<Vec<u8>, ProtocolError> {
    vendor_frame(sequences, command::DEVICE_CAPABILITIES, &[])
}

/// Undocumented vendor message that switches the Elite Series 2 into raw
/// paddle reports.
pub fn elite_raw_report_frame(sequences: &mut SequenceBank) -> Result<Vec<u8>, ProtocolError> {
    vendor_frame(sequences, command::SL_ELITE_CONFIG, &[0x07, 0x00])
}

/// Frames for the startup sequence, in transmit order. LED, security, and
/// report requests are included only when the profile says the device
/// understands them.
pub fn build_init_sequence(
    profile: &AttachmentProfile,
    sequences: &mut SequenceBank,
) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let index = profile.attachment_index;
    let mut frames = Vec::new();

    if profile.has_feature(feature::EXTENDED_SET_DEVICE_STATE) {
        frames.push(extended_power_on_frame(sequences, index)?);
        if profile.wants_elite_raw_report() {
            frames.push(elite_raw_report_frame(sequences)?);
        }
    }

    frames.push(set_device_state_frame(sequences, index, device_state::START)?);

    if profile.supports_system_message(command::LED, false) {
        frames.push(guide_led_frame(
            sequences,
            index,
            led::GUIDE_ON,
            STARTUP_LED_INTENSITY,
        )?);
    }

    if profile.supports_system_message(command::SECURITY, false)
        && !profile.has_feature(feature::SECURITY_OPT_OUT)
    {
        frames.push(security_enable_frame(sequences, index)?);
    }

    if profile.supports_vendor_message(command::INITIAL_REPORTS_REQUEST, false) {
        frames.push(initial_reports_request_frame(sequences)?);
    }

    if profile.supports_vendor_message(command::DEVICE_CAPABILITIES, false) {
        frames.push(device_capabilities_frame(sequences)?);
    }

    Ok(frames)
}
