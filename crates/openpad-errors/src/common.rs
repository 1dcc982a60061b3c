//! Common error types and utilities used across all OpenPad crates.
//!
//! This module provides the top-level error enum that can wrap all sub-errors,
//! along with error classification and severity levels.

use core::fmt;

use crate::{DeviceError, ProtocolError};

/// Top-level error type that can wrap all OpenPad sub-errors.
///
/// This enum provides a unified error type for the entire OpenPad project,
/// allowing easy error propagation and classification.
#[derive(Debug, thiserror::Error)]
pub enum OpenPadError {
    /// Device and transport errors
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Wire-format and decoder errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),

    /// Hint / configuration errors
    #[error("Hint error: {0}")]
    Hint(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl OpenPadError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            OpenPadError::Device(_) => ErrorCategory::Device,
            OpenPadError::Protocol(_) => ErrorCategory::Protocol,
            OpenPadError::Io(_) => ErrorCategory::IO,
            OpenPadError::Hint(_) => ErrorCategory::Hint,
            OpenPadError::Other(_) => ErrorCategory::Other,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            OpenPadError::Device(e) => e.severity(),
            OpenPadError::Protocol(e) => e.severity(),
            OpenPadError::Io(_) => ErrorSeverity::Error,
            OpenPadError::Hint(_) => ErrorSeverity::Warning,
            OpenPadError::Other(_) => ErrorSeverity::Error,
        }
    }

    /// Check if this error is recoverable.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Create a hint error with a message.
    pub fn hint(msg: impl Into<String>) -> Self {
        OpenPadError::Hint(msg.into())
    }

    /// Create a generic error with a message.
    pub fn other(msg: impl Into<String>) -> Self {
        OpenPadError::Other(msg.into())
    }
}

impl From<std::io::Error> for OpenPadError {
    fn from(e: std::io::Error) -> Self {
        OpenPadError::Io(e)
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Device and transport errors
    Device = 0,
    /// Wire-format and decoder errors
    Protocol = 1,
    /// I/O errors
    IO = 2,
    /// Hint / configuration errors
    Hint = 3,
    /// Other errors
    Other = 255,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Device => write!(f, "Device"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::IO => write!(f, "IO"),
            ErrorCategory::Hint => write!(f, "Hint"),
            ErrorCategory::Other => write!(f, "Other"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, system may be in unstable state
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
