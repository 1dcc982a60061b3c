//! Common HID utilities for gamepad protocol implementations
//!
//! This crate provides common utilities shared across different HID protocol
//! implementations for gamepad hardware: the transport traits the drivers
//! talk through, device identity types, USB id tables, and the hint registry
//! that carries runtime tunables.

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]

pub mod device_info;
pub mod hints;
pub mod io;
pub mod usage;
pub mod usb_ids;

pub use device_info::*;
pub use hints::{HintRegistry, StaticHints};
pub use io::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HidIoError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    OpenError(String),

    #[error("Failed to read from device: {0}")]
    ReadError(String),

    #[error("Failed to write to device: {0}")]
    WriteError(String),

    #[error("Invalid report format: {0}")]
    InvalidReport(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type HidIoResult<T> = Result<T, HidIoError>;
