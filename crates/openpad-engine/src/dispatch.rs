//! Ordered driver dispatch.
//!
//! The registry consults one [`DriverTable`] for every enumerated device.
//! Drivers are registered in a fixed order and the first enabled driver whose
//! probe claims the device wins, so the same table always resolves the same
//! device to the same driver. Probing is pure; nothing here touches I/O.

use openpad_hid_common::HidDeviceInfo;
use openpad_hid_common::hints::HintRegistry;
use openpad_joystick_core::HidDriver;

/// Ordered registration list of driver descriptors.
pub struct DriverTable {
    drivers: Vec<&'static dyn HidDriver>,
}

impl DriverTable {
    /// Table with an explicit registration order.
    pub fn new(drivers: Vec<&'static dyn HidDriver>) -> Self {
        Self { drivers }
    }

    /// All built-in drivers in their canonical probe order: GIP first, the
    /// fixed-report vendor drivers after it.
    pub fn builtin() -> Self {
        Self::new(openpad_hid_drivers::builtin_drivers())
    }

    /// First enabled driver whose probe accepts the device, or `None` when
    /// the device stays unclaimed.
    pub fn match_driver(
        &self,
        info: &HidDeviceInfo,
        hints: &dyn HintRegistry,
    ) -> Option<&'static dyn HidDriver> {
        self.drivers
            .iter()
            .copied()
            .find(|driver| driver.enabled(hints) && driver.probe(info))
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Registered drivers in probe order.
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn HidDriver> + '_ {
        self.drivers.iter().copied()
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        Self::builtin()
    }
}
