//! Event payload types: hats, power states, sensor kinds.

use serde::{Deserialize, Serialize};

/// Eight-way hat position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hat {
    Centered,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

impl Hat {
    /// Decode the common 0-based encoding (0 = up, clockwise through
    /// 7 = up-left). Anything out of range is centered; layouts that use
    /// this encoding have no explicit centered code.
    pub fn from_index(value: u8) -> Hat {
        match value {
            0 => Hat::Up,
            1 => Hat::UpRight,
            2 => Hat::Right,
            3 => Hat::DownRight,
            4 => Hat::Down,
            5 => Hat::DownLeft,
            6 => Hat::Left,
            7 => Hat::UpLeft,
            _ => Hat::Centered,
        }
    }

    /// Build a hat from individual direction bits.
    pub fn from_dpad(up: bool, down: bool, left: bool, right: bool) -> Hat {
        match (up, down, left, right) {
            (true, false, false, false) => Hat::Up,
            (true, false, false, true) => Hat::UpRight,
            (false, false, false, true) => Hat::Right,
            (false, true, false, true) => Hat::DownRight,
            (false, true, false, false) => Hat::Down,
            (false, true, true, false) => Hat::DownLeft,
            (false, false, true, false) => Hat::Left,
            (true, false, true, false) => Hat::UpLeft,
            _ => Hat::Centered,
        }
    }

    pub fn is_centered(self) -> bool {
        self == Hat::Centered
    }
}

impl Default for Hat {
    fn default() -> Self {
        Hat::Centered
    }
}

/// Battery / power supply state as decoded from status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    Unknown,
    NoBattery,
    OnBattery,
    Charging,
    Charged,
}

impl Default for PowerState {
    fn default() -> Self {
        PowerState::Unknown
    }
}

/// Onboard sensor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

/// Standard gravity, for accelerometer scale constants.
pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Degrees-to-radians factor, for gyro scale constants.
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
