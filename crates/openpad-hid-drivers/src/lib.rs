//! Per-protocol HIDAPI controller drivers for OpenPad.
//!
//! Each module implements [`HidDriver`] for one controller family. Drivers
//! are stateless descriptors; all per-device state lives in the
//! [`DriverSession`] returned by `open`. The registry probes drivers in the
//! order returned by [`builtin_drivers`] and binds the first claim, so a
//! device is only ever touched by one driver.
//!
//! [`DriverSession`]: openpad_joystick_core::DriverSession

#![deny(static_mut_refs)]

pub mod eightbitdo;
pub mod gamesir;
pub mod gip;
pub mod hoja;
pub mod psmove;
pub mod sinput;
pub mod triton;
pub mod zuiki;

#[cfg(test)]
mod eightbitdo_tests;
#[cfg(test)]
mod psmove_tests;
#[cfg(test)]
mod zuiki_tests;

use openpad_joystick_core::HidDriver;

pub use eightbitdo::EightBitDoDriver;
pub use gamesir::GameSirDriver;
pub use gip::GipDriver;
pub use hoja::HojaDriver;
pub use psmove::PsMoveDriver;
pub use sinput::SInputDriver;
pub use triton::TritonDriver;
pub use zuiki::ZuikiDriver;

/// All built-in drivers, in probe order.
///
/// Order matters: GIP matches by a vendor/product table that overlaps the
/// generic vendor ids some later drivers also use, so it probes first.
/// A device is claimed by the first driver whose `probe` accepts it.
pub fn builtin_drivers() -> Vec<&'static dyn HidDriver> {
    vec![
        &GipDriver,
        &EightBitDoDriver,
        &HojaDriver,
        &SInputDriver,
        &PsMoveDriver,
        &ZuikiDriver,
        &GameSirDriver,
        &TritonDriver,
    ]
}
