//! Per-attachment sequence id counters.
//!
//! GIP keeps independent sequence counters for the security, extended, and
//! audio system streams, one for the remaining system messages, and one
//! shared counter for vendor messages. Sequence id zero is reserved, so
//! counters skip it on wrap. Direct motor commands are the exception: their
//! sequence id is optional and always sent as zero.

#![deny(static_mut_refs)]

use crate::wire::command;

/// Sequence counters for one attachment.
#[derive(Debug, Default, Clone)]
pub struct SequenceBank {
    system: u8,
    security: u8,
    extended: u8,
    audio: u8,
    vendor: u8,
}

fn bump(counter: &mut u8) -> u8 {
    let mut seq = *counter;
    *counter = counter.wrapping_add(1);
    if seq == 0 {
        seq = *counter;
        *counter = counter.wrapping_add(1);
    }
    seq
}

impl SequenceBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence id for a system message of the given type.
    pub fn next_system(&mut self, message_type: u8) -> u8 {
        match message_type {
            command::SECURITY => bump(&mut self.security),
            command::EXTENDED => bump(&mut self.extended),
            command::AUDIO_DATA => bump(&mut self.audio),
            _ => bump(&mut self.system),
        }
    }

    /// Next sequence id for a vendor message of the given type.
    pub fn next_vendor(&mut self, message_type: u8) -> u8 {
        if message_type == command::DIRECT_MOTOR {
            return 0;
        }
        bump(&mut self.vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sequence_id_is_one() {
        let mut bank = SequenceBank::new();
        assert_eq!(bank.next_system(command::METADATA), 1);
        assert_eq!(bank.next_system(command::METADATA), 2);
    }

    #[test]
    fn test_streams_count_independently() {
        let mut bank = SequenceBank::new();
        assert_eq!(bank.next_system(command::METADATA), 1);
        assert_eq!(bank.next_system(command::SECURITY), 1);
        assert_eq!(bank.next_system(command::EXTENDED), 1);
        assert_eq!(bank.next_system(command::AUDIO_DATA), 1);
        assert_eq!(bank.next_vendor(command::LL_INPUT_REPORT), 1);
        assert_eq!(bank.next_system(command::METADATA), 2);
    }

    #[test]
    fn test_wrap_skips_zero() {
        let mut bank = SequenceBank::new();
        let mut last = 0;
        for _ in 0..300 {
            last = bank.next_system(command::METADATA);
            assert_ne!(last, 0);
        }
        // 300 bumps with two zero-skips (initial and wrap).
        assert_eq!(last, 45);
    }

    #[test]
    fn test_direct_motor_sequence_is_always_zero() {
        let mut bank = SequenceBank::new();
        assert_eq!(bank.next_vendor(command::DIRECT_MOTOR), 0);
        bank.next_vendor(command::RAW_REPORT);
        assert_eq!(bank.next_vendor(command::DIRECT_MOTOR), 0);
    }
}
