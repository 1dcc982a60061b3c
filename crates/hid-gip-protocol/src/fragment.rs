//! Reassembly of fragmented GIP messages.
//!
//! Reliable transfers (metadata blobs, mostly) arrive as a chain of
//! fragments: an initial fragment declaring the total length, continuations
//! carrying a write offset, and a terminal zero-length fragment. The device
//! retransmits from wherever our acknowledgements say the cursor is, so a
//! rejected fragment always answers with a correcting ack and never
//! corrupts the bytes already absorbed.

#![deny(static_mut_refs)]

use std::time::{Duration, Instant};

use tracing::warn;

use crate::wire::{self, Frame, FrameHeader, MAX_MESSAGE_LENGTH};

/// A transfer with no progress for this long is abandoned.
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Failed fragments tolerated before the reassembly buffer is dropped.
pub const MAX_FRAGMENT_RETRIES: u32 = 8;

/// Result of feeding one fragment to the reassembler.
#[derive(Debug)]
pub enum FragmentOutcome {
    /// Fragment absorbed; `ack` is present when the sender asked for one.
    Accepted { ack: Option<Vec<u8>> },
    /// Terminal fragment: the assembled message is ready for dispatch.
    /// Send `ack` (when present) only after the message handler succeeds.
    Complete { message: Vec<u8>, ack: Option<Vec<u8>> },
    /// Fragment rejected; send the correcting ack so the device resumes
    /// from our cursor.
    Rejected { ack: Vec<u8> },
    /// Fragment dropped with no reply.
    Discarded,
}

/// Reassembly state for one attachment.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    message_type: Option<u8>,
    total_length: usize,
    cursor: usize,
    data: Vec<u8>,
    retries: u32,
    last_progress: Option<Instant>,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message type of the transfer in progress, if any.
    pub fn in_progress(&self) -> Option<u8> {
        self.message_type
    }

    /// Drop the transfer if it has stalled past [`FRAGMENT_TIMEOUT`].
    /// Returns true when a stalled transfer was abandoned.
    pub fn expire(&mut self, now: Instant) -> bool {
        let Some(last) = self.last_progress else {
            return false;
        };
        if self.message_type.is_some() && now >= last + FRAGMENT_TIMEOUT {
            warn!("GIP: reliable message transfer failed");
            self.reset();
            return true;
        }
        false
    }

    /// Feed one fragment frame.
    pub fn feed(&mut self, frame: &Frame<'_>, now: Instant) -> FragmentOutcome {
        if frame.header.flags & wire::flag::INIT_FRAG != 0 {
            self.feed_initial(frame, now)
        } else {
            self.feed_continuation(frame, now)
        }
    }

    fn feed_initial(&mut self, frame: &Frame<'_>, now: Instant) -> FragmentOutcome {
        let header = &frame.header;
        if self.message_type.is_some() {
            // A new initial fragment abandons the unfinished transfer.
            warn!(
                "GIP: restarting reliable transfer for message type {:#04x}",
                header.message_type
            );
            self.reset();
        }

        let (total_length, consumed) = wire::decode_varint(frame.body);
        let body = &frame.body[consumed..];
        let total_length = total_length as usize;
        let fragment_len = header.length as usize;

        if total_length > MAX_MESSAGE_LENGTH {
            warn!("GIP: fragmented message of {total_length} bytes exceeds the message limit");
            return FragmentOutcome::Discarded;
        }
        if fragment_len > body.len() {
            warn!(
                "GIP: received fragment that claims to be {fragment_len} bytes, got {}",
                body.len()
            );
            return FragmentOutcome::Discarded;
        }
        if fragment_len > total_length {
            warn!("GIP: received too long fragment, {fragment_len} bytes exceeds {total_length}");
            return FragmentOutcome::Discarded;
        }

        self.message_type = Some(header.message_type);
        self.total_length = total_length;
        self.data = vec![0; total_length];
        self.data[..fragment_len].copy_from_slice(&body[..fragment_len]);
        self.cursor = fragment_len;
        self.retries = 0;
        self.last_progress = Some(now);

        FragmentOutcome::Accepted {
            ack: self.ack_if_requested(header),
        }
    }

    fn feed_continuation(&mut self, frame: &Frame<'_>, now: Instant) -> FragmentOutcome {
        let header = &frame.header;
        if self.message_type != Some(header.message_type) {
            warn!(
                "GIP: received out of sequence message type {:#04x}, expected {:?}",
                header.message_type, self.message_type
            );
            return self.fragment_failed(header);
        }

        let (offset, consumed) = wire::decode_varint(frame.body);
        let body = &frame.body[consumed..];
        let offset = offset as usize;
        let fragment_len = header.length as usize;

        if offset != self.cursor {
            warn!(
                "GIP: received out of sequence fragment (claimed {offset}, expected {})",
                self.cursor
            );
            return FragmentOutcome::Rejected {
                ack: self.correcting_ack(header),
            };
        }
        if offset + fragment_len > self.total_length {
            warn!(
                "GIP: received too long fragment, {} exceeds {}",
                offset + fragment_len,
                self.total_length
            );
            return self.fragment_failed(header);
        }
        if fragment_len > body.len() {
            warn!(
                "GIP: received fragment that claims to be {fragment_len} bytes, got {}",
                body.len()
            );
            return FragmentOutcome::Discarded;
        }

        if fragment_len == 0 {
            // Terminal fragment: dispatch whatever the buffer holds.
            let message = std::mem::take(&mut self.data);
            let ack = self.ack_if_requested(header);
            self.message_type = None;
            self.cursor = 0;
            self.total_length = 0;
            self.last_progress = Some(now);
            return FragmentOutcome::Complete { message, ack };
        }

        self.data[offset..offset + fragment_len].copy_from_slice(&body[..fragment_len]);
        self.cursor = offset + fragment_len;
        self.last_progress = Some(now);

        FragmentOutcome::Accepted {
            ack: self.ack_if_requested(header),
        }
    }

    fn fragment_failed(&mut self, header: &FrameHeader) -> FragmentOutcome {
        self.retries += 1;
        let ack = self.correcting_ack(header);
        if self.retries > MAX_FRAGMENT_RETRIES {
            self.reset();
        }
        FragmentOutcome::Rejected { ack }
    }

    fn correcting_ack(&self, header: &FrameHeader) -> Vec<u8> {
        wire::encode_ack(
            header,
            self.cursor as u32,
            (self.total_length - self.cursor) as u16,
        )
    }

    fn ack_if_requested(&self, header: &FrameHeader) -> Option<Vec<u8>> {
        if header.wants_ack() {
            Some(self.correcting_ack(header))
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.message_type = None;
        self.total_length = 0;
        self.cursor = 0;
        self.data = Vec::new();
        self.retries = 0;
        self.last_progress = None;
    }
}
