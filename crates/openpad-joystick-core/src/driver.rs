//! Driver and session traits.
//!
//! A [`HidDriver`] is a stateless matcher/factory registered once in the
//! dispatch table; a [`DriverSession`] is the per-device protocol state it
//! opens. The session owns every protocol decision for its device; the
//! registry owns locking, scheduling, and teardown.

use std::time::Instant;

use tracing::debug;

use openpad_errors::{DeviceError, DeviceResult, Result};
use openpad_hid_common::hints::{HintRegistry, keys};
use openpad_hid_common::{HidDeviceInfo, HidDeviceIo};

use crate::sink::JoystickEventSink;

/// What a device can do beyond input, advertised once at open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoystickCaps {
    pub rumble: bool,
    pub trigger_rumble: bool,
    pub rgb_led: bool,
    pub player_led: bool,
}

/// Outcome of one update pass over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Keep polling.
    Running,
    /// The transport failed; the registry must tear the device down.
    Disconnected,
}

/// How an output report reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Output,
    Feature,
}

/// One encoded report waiting for the output scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRequest {
    pub kind: OutputKind,
    pub data: Vec<u8>,
}

impl OutputRequest {
    pub fn output(data: Vec<u8>) -> Self {
        Self {
            kind: OutputKind::Output,
            data,
        }
    }

    pub fn feature(data: Vec<u8>) -> Self {
        Self {
            kind: OutputKind::Feature,
            data,
        }
    }
}

/// Single-slot request queue between a session and the output scheduler.
///
/// There is at most one queued report per device. A new request overwrites
/// an unsent one (last write wins); the scheduler drains the slot with
/// [`OutputQueue::take`] once the previous transmission completed.
#[derive(Debug, Default)]
pub struct OutputQueue {
    pending: Option<OutputRequest>,
    overwritten: u64,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a report, replacing any report that has not been sent yet.
    pub fn request(&mut self, request: OutputRequest) {
        if self.pending.replace(request).is_some() {
            self.overwritten = self.overwritten.saturating_add(1);
            debug!(
                overwritten = self.overwritten,
                "output request replaced an unsent report"
            );
        }
    }

    pub fn take(&mut self) -> Option<OutputRequest> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// How many queued reports were overwritten before transmission.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Everything a session may touch during one call.
pub struct SessionCtx<'a> {
    pub io: &'a mut dyn HidDeviceIo,
    pub sink: &'a mut dyn JoystickEventSink,
    pub output: &'a mut OutputQueue,
    pub now: Instant,
}

/// Stateless driver: matches devices and opens sessions.
///
/// Probing is pure; anything that needs I/O belongs in [`HidDriver::open`].
/// Drivers are consulted in registration order and the first enabled driver
/// whose probe accepts wins, so the same table always picks the same driver
/// for the same device.
pub trait HidDriver: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Hint key that toggles this driver.
    fn hint_key(&self) -> &'static str;

    /// Whether this driver participates in dispatch at all.
    fn enabled(&self, hints: &dyn HintRegistry) -> bool {
        hints.enabled(keys::JOYSTICK_HIDAPI, true) && hints.enabled(self.hint_key(), true)
    }

    /// Pure identity check; no I/O.
    fn probe(&self, info: &HidDeviceInfo) -> bool;

    /// Run the protocol bootstrap and return the per-device session.
    ///
    /// # Errors
    ///
    /// Fails when the device does not answer its init sequence; the registry
    /// leaves the device unclaimed and a later refresh retries the table.
    fn open(
        &self,
        info: &HidDeviceInfo,
        io: &mut dyn HidDeviceIo,
        hints: &dyn HintRegistry,
    ) -> Result<Box<dyn DriverSession>>;
}

/// Per-device protocol state machine.
pub trait DriverSession: Send {
    /// Display name for the logical joystick.
    fn device_name(&self) -> &str;

    fn capabilities(&self) -> JoystickCaps {
        JoystickCaps::default()
    }

    /// Whether the logical joystick exists as soon as the session opens.
    ///
    /// Protocols with a handshake (GIP) or a wireless slot (dongles) return
    /// false and announce the joystick from [`DriverSession::update`] once it
    /// is actually usable.
    fn attaches_on_open(&self) -> bool {
        true
    }

    /// Drain pending input reports and emit decoded events.
    ///
    /// Called once per poll cycle with the device lock held. Must not block:
    /// reads use a zero timeout and stop at the first empty read.
    fn update(&mut self, ctx: &mut SessionCtx<'_>) -> SessionStatus;

    /// Queue a rumble update.
    ///
    /// # Errors
    ///
    /// Defaults to unsupported; drivers with motors override it.
    fn rumble(
        &mut self,
        low_frequency: u16,
        high_frequency: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        let _ = (low_frequency, high_frequency, ctx);
        Err(DeviceError::FeatureNotSupported {
            device: self.device_name().to_string(),
            feature: "rumble".to_string(),
        })
    }

    /// Queue a trigger rumble update.
    ///
    /// # Errors
    ///
    /// Defaults to unsupported.
    fn rumble_triggers(
        &mut self,
        left: u16,
        right: u16,
        ctx: &mut SessionCtx<'_>,
    ) -> DeviceResult<()> {
        let _ = (left, right, ctx);
        Err(DeviceError::FeatureNotSupported {
            device: self.device_name().to_string(),
            feature: "trigger rumble".to_string(),
        })
    }

    /// Set the LED color.
    ///
    /// # Errors
    ///
    /// Defaults to unsupported.
    fn set_led(&mut self, red: u8, green: u8, blue: u8, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        let _ = (red, green, blue, ctx);
        Err(DeviceError::FeatureNotSupported {
            device: self.device_name().to_string(),
            feature: "led".to_string(),
        })
    }

    /// Tell the device which player slot it occupies. Defaults to a no-op;
    /// devices without player indicators simply ignore it.
    ///
    /// # Errors
    ///
    /// Driver-specific transport failures.
    fn set_player_index(&mut self, player_index: i32, ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        let _ = (player_index, ctx);
        Ok(())
    }

    /// Pass a raw vendor effect through to the device.
    ///
    /// # Errors
    ///
    /// Defaults to unsupported.
    fn send_effect(&mut self, data: &[u8], ctx: &mut SessionCtx<'_>) -> DeviceResult<()> {
        let _ = (data, ctx);
        Err(DeviceError::FeatureNotSupported {
            device: self.device_name().to_string(),
            feature: "effect".to_string(),
        })
    }

    /// Last chance to talk to the hardware before teardown.
    fn close(&mut self, ctx: &mut SessionCtx<'_>) {
        let _ = ctx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::RecordingSink;
    use openpad_hid_common::io::mock::MockDeviceHandle;

    #[test]
    fn test_output_queue_last_write_wins() {
        let mut queue = OutputQueue::new();
        queue.request(OutputRequest::output(vec![0x09, 0x01]));
        queue.request(OutputRequest::output(vec![0x09, 0x02]));

        assert_eq!(queue.overwritten(), 1);
        let sent = queue.take().expect("one report pending");
        assert_eq!(sent.data, vec![0x09, 0x02]);
        assert!(queue.take().is_none());
    }

    #[test]
    fn test_output_queue_take_empties_slot() {
        let mut queue = OutputQueue::new();
        assert!(!queue.has_pending());
        queue.request(OutputRequest::feature(vec![0x05]));
        assert!(queue.has_pending());
        assert!(queue.take().is_some());
        assert!(!queue.has_pending());
    }

    struct NullSession;

    impl DriverSession for NullSession {
        fn device_name(&self) -> &str {
            "null"
        }

        fn update(&mut self, _ctx: &mut SessionCtx<'_>) -> SessionStatus {
            SessionStatus::Running
        }
    }

    #[test]
    fn test_session_defaults() {
        let handle = MockDeviceHandle::new(HidDeviceInfo::new(0x0001, 0x0002, "mock:0"));
        let mut io = handle.open();
        let mut sink = RecordingSink::new();
        let mut output = OutputQueue::new();
        let mut ctx = SessionCtx {
            io: &mut io,
            sink: &mut sink,
            output: &mut output,
            now: Instant::now(),
        };

        let mut session = NullSession;
        assert_eq!(session.capabilities(), JoystickCaps::default());
        assert!(session.attaches_on_open());
        assert_eq!(session.update(&mut ctx), SessionStatus::Running);
        assert!(session.rumble(1, 2, &mut ctx).is_err());
        assert!(session.set_player_index(1, &mut ctx).is_ok());
    }
}
