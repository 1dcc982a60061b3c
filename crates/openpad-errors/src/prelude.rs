//! Prelude module for convenient error handling imports.
//!
//! This module re-exports the most commonly used types and traits for
//! error handling in OpenPad.
//!
//! # Example
//!
//! ```
//! use openpad_errors::prelude::*;
//!
//! fn probe(path: &str) -> Result<()> {
//!     if path.is_empty() {
//!         return Err(DeviceError::not_found(path).into());
//!     }
//!     Ok(())
//! }
//! ```

pub use crate::{
    DeviceResult, Result,
    common::{ErrorCategory, ErrorSeverity, OpenPadError},
    device::DeviceError,
    protocol::ProtocolError,
};
