//! Joystick event model and driver traits for OpenPad
//!
//! This crate defines the seam between the device registry and the
//! per-protocol drivers:
//!
//! - [`driver`]: the [`HidDriver`]/[`DriverSession`] traits drivers implement
//! - [`sink`]: the event sink the decoders emit into
//! - [`axis`]: the affine transforms shared by every fixed-report decoder
//! - [`ids`]: button and axis index tables
//! - [`events`]: hats, power states, sensor kinds
//! - [`clock`]: simulated onboard sensor clocks
//!
//! # Emission guarantees
//!
//! Decoders built on these types are edge-triggered: they hold their previous
//! raw report and emit a button/axis/hat/power event only when the underlying
//! field changed. A sequence of identical reports produces events for the
//! first report at most.
//!
//! # Example
//!
//! ```
//! use openpad_joystick_core::axis;
//!
//! assert_eq!(axis::trigger_from_u8(0x00), -32768);
//! assert_eq!(axis::trigger_from_u8(0xFF), 32767);
//! assert_eq!(axis::stick_from_u8(0x7F), 0);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod axis;
pub mod clock;
pub mod driver;
pub mod events;
pub mod ids;
pub mod sink;

pub use driver::{
    DriverSession, HidDriver, JoystickCaps, OutputKind, OutputQueue, OutputRequest, SessionCtx,
    SessionStatus,
};
pub use events::{Hat, PowerState, SensorKind};
pub use sink::{JoystickEvent, JoystickEventSink};
