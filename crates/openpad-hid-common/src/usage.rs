//! HID usage page gating.
//!
//! Enumeration sees every interface a device exposes; only the ones that
//! look like game controllers (or vendor-defined pages, which several
//! protocols hide behind) are worth probing.

pub mod page {
    pub const GENERIC_DESKTOP: u16 = 0x0001;
    /// First vendor-defined page; everything at or above is vendor space.
    pub const VENDOR_BASE: u16 = 0xFF00;
}

pub mod desktop {
    pub const JOYSTICK: u16 = 0x0004;
    pub const GAMEPAD: u16 = 0x0005;
    pub const MULTI_AXIS_CONTROLLER: u16 = 0x0008;
}

/// Whether an interface with this usage page/usage pair may carry controller
/// input. Unset usages (0/0) pass, since some platforms do not report them.
pub fn is_controller_usage(usage_page: u16, usage: u16) -> bool {
    if usage_page == 0 && usage == 0 {
        return true;
    }
    if usage_page >= page::VENDOR_BASE {
        return true;
    }
    usage_page == page::GENERIC_DESKTOP
        && matches!(
            usage,
            desktop::JOYSTICK | desktop::GAMEPAD | desktop::MULTI_AXIS_CONTROLLER
        )
}
