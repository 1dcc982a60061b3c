//! Device registry, driver dispatch, and output scheduling for OpenPad.
//!
//! The engine owns the lifecycle that `openpad-hid-drivers` plugs into:
//! [`HidJoystickRegistry::refresh`] enumerates the transport and claims new
//! controllers through the [`DriverTable`], [`HidJoystickRegistry::poll`]
//! pumps every open session for input and pushes queued output through each
//! device's [`OutputScheduler`], and [`JoystickHandle`] gives callers a
//! cloneable cable to one controller for rumble, LED, and effect writes.
//!
//! The registry never touches `hidapi` directly. It drives the transport
//! traits from `openpad-hid-common`, with [`HidapiPort`] as the production
//! implementation and the scripted mock bus standing in for it in tests.

#![deny(static_mut_refs)]

pub mod backend;
pub mod dispatch;
pub mod output;
pub mod registry;

pub use backend::HidapiPort;
pub use dispatch::DriverTable;
pub use output::OutputScheduler;
pub use registry::{DeviceKey, HidJoystickRegistry, JoystickHandle, PollStats, SharedSink};
