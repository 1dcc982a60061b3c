//! Capability profile of one GIP attachment.
//!
//! The profile starts from conservative defaults and is rewritten by each
//! metadata pass, whether the device answered for real or we synthesized a
//! fallback. Quirks run after every pass and always win.

#![deny(static_mut_refs)]

use tracing::debug;

use openpad_hid_common::usb_ids;

use crate::metadata::{
    GipDeviceKind, GipMetadata, PaddleFormat, SystemMessageSet, feature, features_for_interface,
    interface_guid, kind_from_preferred_type,
};
use crate::quirks::find_quirk;
use crate::wire::command;

/// Everything we know about one attachment's capabilities.
#[derive(Debug, Clone)]
pub struct AttachmentProfile {
    pub attachment_index: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub kind: GipDeviceKind,
    pub features: u32,
    pub quirk_flags: u32,
    pub paddle_format: PaddleFormat,
    pub extra_buttons: u8,
    pub extra_axes: u8,
    pub firmware_major_version: u16,
    pub firmware_minor_version: u16,
    pub firmware_build_version: u16,
    pub firmware_revision: u16,
    pub metadata: GipMetadata,
}

impl AttachmentProfile {
    /// Fresh profile with the pre-metadata assumptions: attachment zero is
    /// a gamepad, everything else is unknown, and both directions carry
    /// the baseline system messages.
    pub fn new(attachment_index: u8, vendor_id: u16, product_id: u16) -> Self {
        let mut metadata = GipMetadata::default();
        metadata.device.in_system_messages = SystemMessageSet::default_inbound();
        metadata.device.out_system_messages = SystemMessageSet::default_outbound();
        Self {
            attachment_index,
            vendor_id,
            product_id,
            kind: if attachment_index == 0 {
                GipDeviceKind::Gamepad
            } else {
                GipDeviceKind::Unknown
            },
            features: 0,
            quirk_flags: 0,
            paddle_format: PaddleFormat::Unknown,
            extra_buttons: 0,
            extra_axes: 0,
            firmware_major_version: 0,
            firmware_minor_version: 0,
            firmware_build_version: 0,
            firmware_revision: 0,
            metadata,
        }
    }

    pub fn is_controller(&self) -> bool {
        self.kind.is_controller()
    }

    pub fn has_feature(&self, bits: u32) -> bool {
        self.features & bits != 0
    }

    pub fn has_quirk(&self, bits: u32) -> bool {
        self.quirk_flags & bits != 0
    }

    /// Whether a system message is known to flow in the given direction.
    pub fn supports_system_message(&self, message_type: u8, upstream: bool) -> bool {
        if upstream {
            self.metadata.device.in_system_messages.contains(message_type)
        } else {
            self.metadata.device.out_system_messages.contains(message_type)
        }
    }

    pub fn supports_vendor_message(&self, message_type: u8, upstream: bool) -> bool {
        self.metadata.supports_vendor_message(message_type, upstream)
    }

    /// Patch the profile from the quirk table. Runs after every metadata
    /// pass so table entries override whatever the device claimed.
    pub fn apply_quirks(&mut self) {
        let Some(quirk) = find_quirk(self.vendor_id, self.product_id, self.attachment_index)
        else {
            return;
        };
        self.features |= quirk.added_features;
        self.features &= !quirk.filtered_features;
        self.quirk_flags = quirk.quirk_flags;
        self.kind = quirk.device_kind;
        self.metadata
            .device
            .in_system_messages
            .merge(&quirk.extra_in_system_messages);
        self.metadata
            .device
            .out_system_messages
            .merge(&quirk.extra_out_system_messages);
        self.extra_buttons = quirk.extra_buttons;
        self.extra_axes = quirk.extra_axes;
    }

    /// Rebuild the profile from a parsed metadata blob.
    pub fn absorb_metadata(&mut self, metadata: GipMetadata) {
        self.metadata = metadata;
        self.features = 0;
        self.kind = GipDeviceKind::Unknown;

        let mut expected_guid = None;
        for name in &self.metadata.device.preferred_types {
            debug!(preferred_type = %name, "device preferred type");
            if let Some((kind, guid)) = kind_from_preferred_type(name) {
                self.kind = kind;
                expected_guid = guid;
                break;
            }
        }

        let mut found_expected_guid = expected_guid.is_none();
        let mut found_controller_guid = false;
        for guid in &self.metadata.device.supported_interfaces {
            if expected_guid == Some(guid) {
                found_expected_guid = true;
            }
            if guid == &interface_guid::CONTROLLER {
                found_controller_guid = true;
                continue;
            }
            self.features |= features_for_interface(guid);
        }

        if self.metadata.supports_motor_control() {
            self.features |= feature::MOTOR_CONTROL;
        }

        if !found_expected_guid || (self.is_controller() && !found_controller_guid) {
            debug!(
                "device was missing an expected interface GUID; it probably \
                 won't work on an actual Xbox"
            );
        }

        if self.has_feature(feature::GUIDE_COLOR)
            && !self.supports_vendor_message(command::GUIDE_COLOR, false)
        {
            self.features &= !feature::GUIDE_COLOR;
        }

        self.apply_quirks();
    }

    /// Synthesize defaults for a device that never produced usable
    /// metadata. Attachment zero is assumed to be a rumble-capable gamepad
    /// with a guide button.
    pub fn assume_defaults(&mut self) {
        if self.attachment_index == 0 {
            self.features |= feature::MOTOR_CONTROL;
            self.kind = GipDeviceKind::Gamepad;
            self.metadata
                .device
                .in_system_messages
                .insert(command::GUIDE_BUTTON);

            if usb_ids::is_xbox_series_x(self.vendor_id, self.product_id) {
                self.features |= feature::CONSOLE_FUNCTION_MAP;
            }
        }
        self.apply_quirks();
    }

    /// Elite controllers need an extra vendor message before they emit raw
    /// paddle reports, either because the raw format was already observed
    /// or because the firmware is old enough to default to it.
    pub fn wants_elite_raw_report(&self) -> bool {
        self.paddle_format == PaddleFormat::Xbe2Raw
            || (self.firmware_major_version != 4 && self.firmware_minor_version < 17)
    }
}
