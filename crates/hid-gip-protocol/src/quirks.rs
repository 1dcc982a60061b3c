//! Per-product quirk table.
//!
//! Some GIP devices ship broken or incomplete metadata. This table patches
//! the derived capability profile after every metadata pass, so a matching
//! entry always has the final say over what the device claimed.

#![deny(static_mut_refs)]

use openpad_hid_common::usb_ids::{product, vendor};

use crate::metadata::{GipDeviceKind, SystemMessageSet, feature};
use crate::wire::command;

/// Behavioral quirk bits, separate from the feature set.
pub mod quirk_flag {
    /// Device never announces itself with a hello.
    pub const NO_HELLO: u32 = 1 << 0;
    /// Device answers metadata requests with garbage.
    pub const BROKEN_METADATA: u32 = 1 << 1;
    /// Impulse trigger motors are advertised but not fitted.
    pub const NO_IMPULSE_VIBRATION: u32 = 1 << 2;
}

/// One quirk table entry. Matches on exact vendor, product, and
/// attachment index.
#[derive(Debug, Clone)]
pub struct GipQuirk {
    pub vendor_id: u16,
    pub product_id: u16,
    pub attachment_index: u8,
    pub added_features: u32,
    pub filtered_features: u32,
    pub quirk_flags: u32,
    pub extra_in_system_messages: SystemMessageSet,
    pub extra_out_system_messages: SystemMessageSet,
    pub device_kind: GipDeviceKind,
    pub extra_buttons: u8,
    pub extra_axes: u8,
}

const NONE: GipQuirk = GipQuirk {
    vendor_id: 0,
    product_id: 0,
    attachment_index: 0,
    added_features: 0,
    filtered_features: 0,
    quirk_flags: 0,
    extra_in_system_messages: SystemMessageSet::empty(),
    extra_out_system_messages: SystemMessageSet::empty(),
    device_kind: GipDeviceKind::Gamepad,
    extra_buttons: 0,
    extra_axes: 0,
};

const FIRMWARE_MESSAGES: SystemMessageSet =
    SystemMessageSet::from_words([1 << command::FIRMWARE, 0, 0, 0, 0, 0, 0, 0]);

pub const QUIRKS: &[GipQuirk] = &[
    GipQuirk {
        vendor_id: vendor::MICROSOFT,
        product_id: product::XBOX_ONE_ELITE_SERIES_1,
        added_features: feature::ELITE_BUTTONS,
        filtered_features: feature::CONSOLE_FUNCTION_MAP,
        ..NONE
    },
    // The Elite Series 2 understands firmware queries but leaves them out
    // of its advertised message sets.
    GipQuirk {
        vendor_id: vendor::MICROSOFT,
        product_id: product::XBOX_ONE_ELITE_SERIES_2,
        added_features: feature::ELITE_BUTTONS
            | feature::DYNAMIC_LATENCY_INPUT
            | feature::CONSOLE_FUNCTION_MAP
            | feature::GUIDE_COLOR
            | feature::EXTENDED_SET_DEVICE_STATE,
        extra_in_system_messages: FIRMWARE_MESSAGES,
        extra_out_system_messages: FIRMWARE_MESSAGES,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::MICROSOFT,
        product_id: product::XBOX_SERIES_X,
        added_features: feature::DYNAMIC_LATENCY_INPUT,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::PDP,
        product_id: product::PDP_ROCK_CANDY,
        quirk_flags: quirk_flag::NO_HELLO,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::POWERA,
        product_id: product::BDA_XB1_FIGHTPAD,
        filtered_features: feature::MOTOR_CONTROL,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::POWERA,
        product_id: product::BDA_XB1_CLASSIC,
        quirk_flags: quirk_flag::NO_IMPULSE_VIBRATION,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::POWERA,
        product_id: product::BDA_XB1_SPECTRA_PRO,
        quirk_flags: quirk_flag::NO_IMPULSE_VIBRATION,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::RAZER,
        product_id: product::RAZER_ATROX,
        filtered_features: feature::MOTOR_CONTROL,
        device_kind: GipDeviceKind::ArcadeStick,
        ..NONE
    },
    GipQuirk {
        vendor_id: vendor::THRUSTMASTER,
        product_id: product::THRUSTMASTER_T_FLIGHT_HOTAS_ONE,
        filtered_features: feature::MOTOR_CONTROL,
        device_kind: GipDeviceKind::FlightStick,
        extra_buttons: 5,
        extra_axes: 3,
        ..NONE
    },
];

/// First entry matching the device, if any.
pub fn find_quirk(
    vendor_id: u16,
    product_id: u16,
    attachment_index: u8,
) -> Option<&'static GipQuirk> {
    QUIRKS.iter().find(|quirk| {
        quirk.vendor_id == vendor_id
            && quirk.product_id == product_id
            && quirk.attachment_index == attachment_index
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elite_series_2_firmware_messages() {
        let quirk = find_quirk(vendor::MICROSOFT, product::XBOX_ONE_ELITE_SERIES_2, 0)
            .expect("table entry");
        assert!(quirk.added_features & feature::ELITE_BUTTONS != 0);
        assert!(quirk.extra_in_system_messages.contains(command::FIRMWARE));
        assert!(quirk.extra_out_system_messages.contains(command::FIRMWARE));
    }

    #[test]
    fn test_atrox_is_an_arcade_stick_without_rumble() {
        let quirk = find_quirk(vendor::RAZER, product::RAZER_ATROX, 0).expect("table entry");
        assert_eq!(quirk.device_kind, GipDeviceKind::ArcadeStick);
        assert_eq!(quirk.filtered_features, feature::MOTOR_CONTROL);
    }

    #[test]
    fn test_hotas_one_extra_controls() {
        let quirk = find_quirk(
            vendor::THRUSTMASTER,
            product::THRUSTMASTER_T_FLIGHT_HOTAS_ONE,
            0,
        )
        .expect("table entry");
        assert_eq!(quirk.device_kind, GipDeviceKind::FlightStick);
        assert_eq!(quirk.extra_buttons, 5);
        assert_eq!(quirk.extra_axes, 3);
    }

    #[test]
    fn test_no_match_for_unlisted_device() {
        assert!(find_quirk(vendor::MICROSOFT, product::XBOX_ONE_S, 0).is_none());
        assert!(find_quirk(vendor::RAZER, product::RAZER_ATROX, 1).is_none());
    }
}
