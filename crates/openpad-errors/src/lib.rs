//! Centralized error types for OpenPad
//!
//! This crate provides a unified error handling system for the OpenPad
//! project, shared by the transport layer, the protocol decoders, and the
//! device registry.
//!
//! # Architecture
//!
//! The error system is organized into several modules:
//!
//! - [`common`]: Top-level error types and classifications used across all crates
//! - [`device`]: Hardware and transport-related errors
//! - [`protocol`]: Wire-format and decoder errors
//!
//! # Example
//!
//! ```
//! use openpad_errors::prelude::*;
//!
//! fn open_device(path: &str) -> Result<()> {
//!     if path.is_empty() {
//!         return Err(DeviceError::not_found(path).into());
//!     }
//!     Ok(())
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod device;
pub mod prelude;
pub mod protocol;

pub use common::{ErrorCategory, ErrorSeverity, OpenPadError};
pub use device::DeviceError;
pub use protocol::ProtocolError;

/// A specialized `Result` type for OpenPad operations.
pub type Result<T> = std::result::Result<T, OpenPadError>;

/// A specialized `Result` type for device transport operations.
pub type DeviceResult<T = ()> = std::result::Result<T, DeviceError>;
