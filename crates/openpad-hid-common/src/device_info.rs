//! Device information types for HID devices

use serde::{Deserialize, Serialize};

/// Transport the device handle sits on.
///
/// Several protocols change timing or report shape depending on whether the
/// link is wired or Bluetooth, so enumeration records it up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BusType {
    Unknown,
    Usb,
    Bluetooth,
}

impl Default for BusType {
    fn default() -> Self {
        BusType::Unknown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HidDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub release_number: u16,
    pub usage_page: u16,
    pub usage: u16,
    pub interface_number: i32,
    pub bus_type: BusType,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product_name: Option<String>,
    pub path: String,
}

impl HidDeviceInfo {
    pub fn new(vendor_id: u16, product_id: u16, path: impl Into<String>) -> Self {
        Self {
            vendor_id,
            product_id,
            release_number: 0,
            usage_page: 0,
            usage: 0,
            interface_number: -1,
            bus_type: BusType::Unknown,
            serial_number: None,
            manufacturer: None,
            product_name: None,
            path: path.into(),
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_usage(mut self, usage_page: u16, usage: u16) -> Self {
        self.usage_page = usage_page;
        self.usage = usage;
        self
    }

    pub fn with_interface(mut self, interface_number: i32) -> Self {
        self.interface_number = interface_number;
        self
    }

    pub fn with_release(mut self, release_number: u16) -> Self {
        self.release_number = release_number;
        self
    }

    pub fn with_bus_type(mut self, bus_type: BusType) -> Self {
        self.bus_type = bus_type;
        self
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        self.vendor_id == vendor_id && self.product_id == product_id
    }

    pub fn is_bluetooth(&self) -> bool {
        self.bus_type == BusType::Bluetooth
    }

    pub fn display_name(&self) -> String {
        self.product_name
            .clone()
            .or_else(|| self.manufacturer.clone())
            .unwrap_or_else(|| format!("{:04x}:{:04x}", self.vendor_id, self.product_id))
    }
}

impl Default for HidDeviceInfo {
    fn default() -> Self {
        Self {
            vendor_id: 0,
            product_id: 0,
            release_number: 0,
            usage_page: 0,
            usage: 0,
            interface_number: -1,
            bus_type: BusType::Unknown,
            serial_number: None,
            manufacturer: None,
            product_name: None,
            path: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_creation() {
        let info = HidDeviceInfo::new(0x045e, 0x0b12, "/dev/hidraw0".to_string());
        assert_eq!(info.vendor_id, 0x045e);
        assert_eq!(info.product_id, 0x0b12);
        assert!(info.matches(0x045e, 0x0b12));
        assert!(!info.matches(0x045e, 0x9999));
    }

    #[test]
    fn test_device_info_display_name() {
        let info = HidDeviceInfo::new(0x045e, 0x0b12, "/dev/hidraw0".to_string())
            .with_product_name("Test Pad".to_string());
        assert_eq!(info.display_name(), "Test Pad");

        let info = HidDeviceInfo::new(0x045e, 0x0b12, "/dev/hidraw0".to_string())
            .with_manufacturer("Test Co".to_string());
        assert_eq!(info.display_name(), "Test Co");

        let info = HidDeviceInfo::new(0x045e, 0x0b12, "/dev/hidraw0".to_string());
        assert_eq!(info.display_name(), "045e:0b12");
    }

    #[test]
    fn test_device_info_bus_type() {
        let info = HidDeviceInfo::new(0x045e, 0x0b12, "bt:aa:bb".to_string())
            .with_bus_type(BusType::Bluetooth);
        assert!(info.is_bluetooth());
        assert!(!HidDeviceInfo::default().is_bluetooth());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            /// Builders store what they are given and `matches` agrees with
            /// the stored identity.
            #[test]
            fn prop_builder_identity_roundtrip(
                vendor_id: u16,
                product_id: u16,
                usage_page: u16,
                usage: u16,
                interface in -1i32..16,
            ) {
                let info = HidDeviceInfo::new(vendor_id, product_id, "/mock/prop0")
                    .with_usage(usage_page, usage)
                    .with_interface(interface);
                prop_assert_eq!(info.usage_page, usage_page);
                prop_assert_eq!(info.usage, usage);
                prop_assert_eq!(info.interface_number, interface);
                prop_assert!(info.matches(vendor_id, product_id));
            }

            /// Every identity renders to a non-empty display name, named
            /// strings taking precedence over the numeric fallback.
            #[test]
            fn prop_display_name_never_empty(vendor_id: u16, product_id: u16, name: String) {
                let bare = HidDeviceInfo::new(vendor_id, product_id, "/mock/prop0");
                prop_assert!(!bare.display_name().is_empty());

                prop_assume!(!name.is_empty());
                let named = bare.with_product_name(name.clone());
                prop_assert_eq!(named.display_name(), name);
            }
        }
    }
}
