//! USB vendor and product ids for devices the driver stack recognizes.
//!
//! Kept in one place so probe tables and quirk tables agree on spelling.

pub mod vendor {
    pub const MICROSOFT: u16 = 0x045e;
    pub const SONY: u16 = 0x054c;
    pub const THRUSTMASTER: u16 = 0x044f;
    pub const PDP: u16 = 0x0e6f;
    pub const RAZER: u16 = 0x1532;
    pub const POWERA: u16 = 0x24c6;
    pub const POWERA_ALT: u16 = 0x20d6;
    pub const EIGHTBITDO: u16 = 0x2dc8;
    pub const VALVE: u16 = 0x28de;
    pub const RASPBERRYPI: u16 = 0x2e8a;
    pub const ZUIKI: u16 = 0x33dd;
    pub const GAMESIR: u16 = 0x3537;
}

pub mod product {
    // Microsoft GIP controllers
    pub const XBOX_ONE_S: u16 = 0x02ea;
    pub const XBOX_ONE_ELITE_SERIES_1: u16 = 0x02e3;
    pub const XBOX_ONE_ELITE_SERIES_2: u16 = 0x0b00;
    pub const XBOX_SERIES_X: u16 = 0x0b12;
    pub const XBOX_SERIES_X_BLE: u16 = 0x0b13;

    // Third-party GIP controllers that need quirks
    pub const PDP_ROCK_CANDY: u16 = 0x0246;
    pub const RAZER_ATROX: u16 = 0x0a00;
    pub const BDA_XB1_SPECTRA_PRO: u16 = 0x542a;
    pub const BDA_XB1_CLASSIC: u16 = 0x581a;
    pub const BDA_XB1_FIGHTPAD: u16 = 0x791a;
    pub const THRUSTMASTER_T_FLIGHT_HOTAS_ONE: u16 = 0xb68c;

    // 8BitDo
    pub const EIGHTBITDO_ULTIMATE2_WIRELESS: u16 = 0x6012;

    // Sony
    pub const PSMOVE_ZCM1: u16 = 0x03d5;
    pub const PSMOVE_ZCM2: u16 = 0x0c5e;

    // HandheldLegend / Hoja firmware family (Raspberry Pi vendor id)
    pub const HOJA_GAMEPAD: u16 = 0x10dd;
    pub const GC_ULTIMATE: u16 = 0x10c6;
    pub const PROGCC: u16 = 0x10df;
    pub const SINPUT_GENERIC: u16 = 0x10de;

    // Valve
    pub const STEAM_NEREID: u16 = 0x1220;
    pub const STEAM_PROTEUS_DONGLE: u16 = 0x1240;

    // ZUIKI
    pub const ZUIKI_MASCON_PRO: u16 = 0x0005;

    // GameSir
    pub const GAMESIR_G7_PRO: u16 = 0x1010;
    pub const GAMESIR_G7_PRO_8K: u16 = 0x1011;
}

/// Whether a vendor/product pair is an Xbox Series X class controller.
/// These ship newer firmware defaults than the original Xbox One line.
pub fn is_xbox_series_x(vendor_id: u16, product_id: u16) -> bool {
    match vendor_id {
        vendor::MICROSOFT => {
            product_id == product::XBOX_SERIES_X || product_id == product::XBOX_SERIES_X_BLE
        }
        vendor::POWERA_ALT => (0x2001..=0x201a).contains(&product_id),
        _ => false,
    }
}
