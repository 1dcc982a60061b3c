//! Device and transport-related error types.
//!
//! This module provides error types for device discovery, open/close,
//! report I/O, and hardware failures.

use crate::common::ErrorSeverity;

/// Device and transport errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    /// Device not found
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Device disconnected
    #[error("Device disconnected: {0}")]
    Disconnected(String),

    /// Open failed
    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    /// Report read failed
    #[error("Read failed on device {device}: {message}")]
    ReadFailed {
        /// Device identifier
        device: String,
        /// Error message
        message: String,
    },

    /// Report write failed
    #[error("Write failed on device {device}: {message}")]
    WriteFailed {
        /// Device identifier
        device: String,
        /// Error message
        message: String,
    },

    /// HID backend error
    #[error("HID error: {0}")]
    HidError(String),

    /// Invalid device response
    #[error("Invalid response from device {device}: expected {expected} bytes, got {actual}")]
    InvalidResponse {
        /// Device identifier
        device: String,
        /// Expected byte count
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Device timeout
    #[error("Device {device} timeout after {timeout_ms}ms")]
    Timeout {
        /// Device identifier
        device: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Unsupported device
    #[error("Unsupported device: vendor={vendor_id:#06x}, product={product_id:#06x}")]
    UnsupportedDevice {
        /// USB vendor ID
        vendor_id: u16,
        /// USB product ID
        product_id: u16,
    },

    /// Device busy
    #[error("Device {0} is busy")]
    Busy(String),

    /// Permission denied
    #[error("Permission denied for device: {0}")]
    PermissionDenied(String),

    /// Driver handshake failed
    #[error("Failed to initialize device {device}: {reason}")]
    InitializationFailed {
        /// Device identifier
        device: String,
        /// Failure reason
        reason: String,
    },

    /// Feature not supported
    #[error("Feature '{feature}' not supported by device {device}")]
    FeatureNotSupported {
        /// Device identifier
        device: String,
        /// Feature name
        feature: String,
    },
}

impl DeviceError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DeviceError::NotFound(_) => ErrorSeverity::Error,
            DeviceError::Disconnected(_) => ErrorSeverity::Critical,
            DeviceError::OpenFailed(_) => ErrorSeverity::Error,
            DeviceError::ReadFailed { .. } => ErrorSeverity::Critical,
            DeviceError::WriteFailed { .. } => ErrorSeverity::Error,
            DeviceError::HidError(_) => ErrorSeverity::Error,
            DeviceError::InvalidResponse { .. } => ErrorSeverity::Error,
            DeviceError::Timeout { .. } => ErrorSeverity::Warning,
            DeviceError::UnsupportedDevice { .. } => ErrorSeverity::Error,
            DeviceError::Busy(_) => ErrorSeverity::Warning,
            DeviceError::PermissionDenied(_) => ErrorSeverity::Error,
            DeviceError::InitializationFailed { .. } => ErrorSeverity::Error,
            DeviceError::FeatureNotSupported { .. } => ErrorSeverity::Info,
        }
    }

    /// Check if this error indicates the device is gone and should be
    /// torn down on the next registry sweep.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            DeviceError::NotFound(_)
                | DeviceError::Disconnected(_)
                | DeviceError::ReadFailed { .. }
        )
    }

    /// Check if retrying the operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. } | DeviceError::Busy(_))
    }

    /// Create a not found error.
    pub fn not_found(device: impl Into<String>) -> Self {
        DeviceError::NotFound(device.into())
    }

    /// Create a disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        DeviceError::Disconnected(device.into())
    }

    /// Create a read failure error.
    pub fn read_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::ReadFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a write failure error.
    pub fn write_failed(device: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::WriteFailed {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(device: impl Into<String>, timeout_ms: u64) -> Self {
        DeviceError::Timeout {
            device: device.into(),
            timeout_ms,
        }
    }

    /// Create an unsupported device error.
    pub fn unsupported(vendor_id: u16, product_id: u16) -> Self {
        DeviceError::UnsupportedDevice {
            vendor_id,
            product_id,
        }
    }
}
