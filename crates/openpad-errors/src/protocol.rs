//! Wire-format and decoder error types.
//!
//! This module provides error types for report parsing, message framing,
//! and protocol state machine faults. Decoders treat most of these as
//! soft faults: the offending report is dropped and polling continues.

use crate::common::ErrorSeverity;

/// Wire-format and decoder errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProtocolError {
    /// Report shorter than the decoder requires
    #[error("Truncated report: expected at least {expected} bytes, got {actual}")]
    TruncatedReport {
        /// Minimum byte count the decoder requires
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Report id is not one the decoder knows
    #[error("Unknown report id {report_id:#04x}")]
    UnknownReportId {
        /// First byte of the report
        report_id: u8,
    },

    /// Variable-length integer ran past its maximum width
    #[error("Varint overflow after {consumed} bytes")]
    VarintOverflow {
        /// Bytes consumed before giving up
        consumed: usize,
    },

    /// Message larger than the data-class MTU allows
    #[error("Message length {length} exceeds MTU {mtu}")]
    MessageTooLarge {
        /// Declared total length
        length: usize,
        /// Maximum transfer unit for the data class
        mtu: usize,
    },

    /// Continuation fragment did not land on the reassembly cursor
    #[error("Fragment offset {offset} does not match reassembly cursor {cursor}")]
    FragmentOffsetMismatch {
        /// Offset carried by the fragment
        offset: usize,
        /// Bytes accumulated so far
        cursor: usize,
    },

    /// Continuation fragment arrived with no reassembly in progress
    #[error("Unexpected continuation fragment for message type {message_type:#04x}")]
    OrphanFragment {
        /// Message type of the fragment
        message_type: u8,
    },

    /// Handshake did not complete in time
    #[error("Handshake timed out in state {state}")]
    HandshakeTimeout {
        /// Human-readable state name
        state: &'static str,
    },

    /// Metadata blob failed structural validation
    #[error("Metadata parse failed: {reason}")]
    MetadataParse {
        /// Failure reason
        reason: String,
    },

    /// Malformed outgoing message
    #[error("Cannot encode message: {reason}")]
    Encode {
        /// Failure reason
        reason: String,
    },
}

impl ProtocolError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProtocolError::TruncatedReport { .. } => ErrorSeverity::Info,
            ProtocolError::UnknownReportId { .. } => ErrorSeverity::Info,
            ProtocolError::VarintOverflow { .. } => ErrorSeverity::Warning,
            ProtocolError::MessageTooLarge { .. } => ErrorSeverity::Warning,
            ProtocolError::FragmentOffsetMismatch { .. } => ErrorSeverity::Warning,
            ProtocolError::OrphanFragment { .. } => ErrorSeverity::Warning,
            ProtocolError::HandshakeTimeout { .. } => ErrorSeverity::Error,
            ProtocolError::MetadataParse { .. } => ErrorSeverity::Warning,
            ProtocolError::Encode { .. } => ErrorSeverity::Error,
        }
    }

    /// Check if the decoder should silently drop the report and keep polling.
    pub fn is_droppable(&self) -> bool {
        matches!(
            self,
            ProtocolError::TruncatedReport { .. }
                | ProtocolError::UnknownReportId { .. }
                | ProtocolError::FragmentOffsetMismatch { .. }
                | ProtocolError::OrphanFragment { .. }
        )
    }

    /// Create a truncated report error.
    pub fn truncated(expected: usize, actual: usize) -> Self {
        ProtocolError::TruncatedReport { expected, actual }
    }

    /// Create an unknown report id error.
    pub fn unknown_report_id(report_id: u8) -> Self {
        ProtocolError::UnknownReportId { report_id }
    }

    /// Create a metadata parse error.
    pub fn metadata(reason: impl Into<String>) -> Self {
        ProtocolError::MetadataParse {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_severity() {
        assert_eq!(
            ProtocolError::truncated(10, 3).severity(),
            ErrorSeverity::Info
        );
        assert_eq!(
            ProtocolError::HandshakeTimeout { state: "identify" }.severity(),
            ErrorSeverity::Error
        );
    }

    #[test]
    fn test_protocol_error_is_droppable() {
        assert!(ProtocolError::truncated(10, 3).is_droppable());
        assert!(ProtocolError::unknown_report_id(0x7f).is_droppable());
        assert!(
            ProtocolError::FragmentOffsetMismatch {
                offset: 100,
                cursor: 64
            }
            .is_droppable()
        );
        assert!(!ProtocolError::metadata("bad table").is_droppable());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FragmentOffsetMismatch {
            offset: 100,
            cursor: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("64"));
    }

    #[test]
    fn test_protocol_error_is_std_error() {
        let err = ProtocolError::unknown_report_id(0x00);
        let _: &dyn std::error::Error = &err;
    }
}
