//! Direct motor commands and their pacing.
//!
//! GIP rumble is stateful on the host side: the device plays whatever the
//! last direct motor command said for its duration, so the host re-sends
//! while rumble is active. The scheduler below keeps a single pending slot
//! (last write wins) and at most one command in flight, with a short busy
//! window between transmissions so a chatty caller cannot flood the bus.

#![deny(static_mut_refs)]

use std::time::{Duration, Instant};

use openpad_errors::ProtocolError;

use crate::sequence::SequenceBank;
use crate::wire::{command, encode_frame, flag};

/// Which motors a direct motor command drives.
pub mod motor_bits {
    pub const RIGHT_VIBRATION: u8 = 1 << 0;
    pub const LEFT_VIBRATION: u8 = 1 << 1;
    pub const RIGHT_IMPULSE: u8 = 1 << 2;
    pub const LEFT_IMPULSE: u8 = 1 << 3;
    pub const ALL: u8 = 0x0f;
}

/// Duration in 10 ms units: covers the host's 250 ms resend cadence plus
/// a 50 ms leniency.
pub const DEFAULT_DURATION: u8 = 30;

/// Minimum gap between two motor transmissions.
pub const BUSY_WINDOW: Duration = Duration::from_millis(10);

/// Bluetooth transports need a wider gap.
pub const BUSY_WINDOW_BLUETOOTH: Duration = Duration::from_millis(30);

/// Scale a 16-bit rumble magnitude to the 0..100 range the wire wants.
pub fn level_from_u16(level: u16) -> u8 {
    (level / 655) as u8
}

/// One direct motor command. Field order matches the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorCommand {
    pub motor_bitmap: u8,
    pub left_impulse_level: u8,
    pub right_impulse_level: u8,
    pub left_vibration_level: u8,
    pub right_vibration_level: u8,
    pub duration: u8,
    pub delay: u8,
    pub repeat: u8,
}

impl MotorCommand {
    /// Drive all four motors at the given 0..100 levels for the default
    /// resend window.
    pub fn new(
        left_impulse_level: u8,
        right_impulse_level: u8,
        left_vibration_level: u8,
        right_vibration_level: u8,
    ) -> Self {
        Self {
            motor_bitmap: motor_bits::ALL,
            left_impulse_level,
            right_impulse_level,
            left_vibration_level,
            right_vibration_level,
            duration: DEFAULT_DURATION,
            delay: 0,
            repeat: 0,
        }
    }

    /// Nine byte payload: a zero lead byte, then the command fields.
    pub fn encode(&self) -> [u8; 9] {
        [
            0,
            self.motor_bitmap,
            self.left_impulse_level,
            self.right_impulse_level,
            self.left_vibration_level,
            self.right_vibration_level,
            self.duration,
            self.delay,
            self.repeat,
        ]
    }
}

/// Encode a complete direct motor frame. The sequence id for motor
/// commands is pinned to zero.
pub fn direct_motor_frame(
    sequences: &mut SequenceBank,
    attachment_index: u8,
    motor: &MotorCommand,
) -> Result<Vec<u8>, ProtocolError> {
    let seq = sequences.next_vendor(command::DIRECT_MOTOR);
    encode_frame(
        command::DIRECT_MOTOR,
        attachment_index & flag::ATTACHMENT_MASK,
        seq,
        &motor.encode(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RumbleState {
    #[default]
    Idle,
    Queued,
    Busy,
}

/// Single-slot rumble pacing for one attachment.
#[derive(Debug)]
pub struct MotorScheduler {
    state: RumbleState,
    pending: Option<MotorCommand>,
    sent_at: Option<Instant>,
    busy_window: Duration,
}

impl MotorScheduler {
    pub fn new(busy_window: Duration) -> Self {
        Self {
            state: RumbleState::Idle,
            pending: None,
            sent_at: None,
            busy_window,
        }
    }

    pub fn state(&self) -> RumbleState {
        self.state
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Replace the pending slot. The newest request always wins.
    pub fn queue(&mut self, motor: MotorCommand) {
        self.pending = Some(motor);
    }

    /// Advance the state machine and hand back a command to transmit, if
    /// one is due. The pending slot is cleared as soon as the command is
    /// handed out, so a failed transmit drops the request.
    pub fn pump(&mut self, now: Instant) -> Option<MotorCommand> {
        if self.state == RumbleState::Queued && self.sent_at.is_some() {
            self.state = RumbleState::Busy;
        }
        if self.state == RumbleState::Busy {
            if let Some(sent) = self.sent_at {
                if now >= sent + self.busy_window {
                    self.sent_at = None;
                    self.state = RumbleState::Idle;
                }
            }
        }
        if self.state != RumbleState::Idle {
            return None;
        }
        let motor = self.pending.take()?;
        self.state = RumbleState::Queued;
        Some(motor)
    }

    /// The pumped command went out; start the busy window from `now`.
    pub fn mark_sent(&mut self, now: Instant) {
        self.sent_at = Some(now);
    }

    /// The pumped command could not be transmitted.
    pub fn mark_failed(&mut self) {
        self.sent_at = None;
        self.state = RumbleState::Idle;
    }
}
