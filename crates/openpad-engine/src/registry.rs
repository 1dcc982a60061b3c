//! Device registry: hotplug tracking, driver binding, and the poll loop.
//!
//! [`HidJoystickRegistry`] owns the full device lifecycle. `refresh()`
//! re-enumerates the transport, binds new devices through the dispatch table,
//! and sweeps out devices that disappeared; `poll()` runs every live session
//! and pumps its output scheduler. The registry is a plain owned value with
//! no global state; embedders decide which thread calls it.
//!
//! Each tracked device carries its own lock around the session, transport,
//! and scheduler. `poll()` takes that lock with `try_lock` and skips a
//! contended device for one cycle, so a rumble call from another thread never
//! stalls input. Lock order is always device state first, then the shared
//! sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use openpad_errors::{DeviceError, DeviceResult};
use openpad_hid_common::hints::HintRegistry;
use openpad_hid_common::io::{HidDeviceIo, HidPort};
use openpad_hid_common::{HidDeviceInfo, usage};
use openpad_joystick_core::sink::JoystickEventSink;
use openpad_joystick_core::{
    DriverSession, HidDriver, JoystickCaps, OutputQueue, SessionCtx, SessionStatus,
};

use crate::dispatch::DriverTable;
use crate::output::OutputScheduler;

/// Event sink shared between the registry and per-device handles.
pub type SharedSink = Arc<Mutex<dyn JoystickEventSink + Send>>;

/// Device identity for the seen-sweep: enumeration path plus USB ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceKey {
    pub fn of(info: &HidDeviceInfo) -> Self {
        Self {
            path: info.path.clone(),
            vendor_id: info.vendor_id,
            product_id: info.product_id,
        }
    }
}

/// Everything behind the per-device lock.
struct DeviceState {
    session: Option<Box<dyn DriverSession>>,
    io: Option<Box<dyn HidDeviceIo>>,
    output: OutputQueue,
    scheduler: OutputScheduler,
}

/// One tracked device, shared between the registry and any handles.
struct Device {
    key: DeviceKey,
    info: HidDeviceInfo,
    name: String,
    serial: Option<String>,
    driver: &'static dyn HidDriver,
    state: Mutex<DeviceState>,
    /// Present in the most recent enumeration.
    seen: AtomicBool,
    /// Transport failed; torn down at the next sweep.
    defunct: AtomicBool,
    /// The registry announced this joystick and owes a removal event.
    /// Deferred-attach sessions announce for themselves and leave this false.
    attached: AtomicBool,
}

/// Counters from one `poll()` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Sessions updated this cycle.
    pub polled: usize,
    /// Devices skipped because another thread held their lock.
    pub skipped: usize,
    /// Devices torn down after their session reported disconnect.
    pub removed: usize,
}

/// Cloneable handle to one tracked device.
///
/// Output operations lock the device state for the duration of the call;
/// a concurrent `poll()` skips the device for that cycle rather than wait.
#[derive(Clone)]
pub struct JoystickHandle {
    device: Arc<Device>,
    sink: SharedSink,
}

impl JoystickHandle {
    pub fn key(&self) -> &DeviceKey {
        &self.device.key
    }

    pub fn info(&self) -> &HidDeviceInfo {
        &self.device.info
    }

    /// Display name the driver settled on at open.
    pub fn name(&self) -> &str {
        &self.device.name
    }

    pub fn serial(&self) -> Option<&str> {
        self.device.serial.as_deref()
    }

    /// Name of the driver bound to this device.
    pub fn driver_name(&self) -> &'static str {
        self.device.driver.name()
    }

    pub fn capabilities(&self) -> JoystickCaps {
        let state = self.device.state.lock();
        state
            .session
            .as_ref()
            .map(|session| session.capabilities())
            .unwrap_or_default()
    }

    /// Queue a rumble update.
    ///
    /// # Errors
    ///
    /// Unsupported by the device, or the device was already torn down.
    pub fn rumble(&self, low_frequency: u16, high_frequency: u16) -> DeviceResult<()> {
        self.with_session(|session, ctx| session.rumble(low_frequency, high_frequency, ctx))
    }

    /// Queue a trigger rumble update.
    ///
    /// # Errors
    ///
    /// Unsupported by the device, or the device was already torn down.
    pub fn rumble_triggers(&self, left: u16, right: u16) -> DeviceResult<()> {
        self.with_session(|session, ctx| session.rumble_triggers(left, right, ctx))
    }

    /// Set the LED color.
    ///
    /// # Errors
    ///
    /// Unsupported by the device, or the device was already torn down.
    pub fn set_led(&self, red: u8, green: u8, blue: u8) -> DeviceResult<()> {
        self.with_session(|session, ctx| session.set_led(red, green, blue, ctx))
    }

    /// Tell the device which player slot it occupies.
    ///
    /// # Errors
    ///
    /// Transport failure, or the device was already torn down.
    pub fn set_player_index(&self, player_index: i32) -> DeviceResult<()> {
        self.with_session(|session, ctx| session.set_player_index(player_index, ctx))
    }

    /// Pass a raw vendor effect through to the device.
    ///
    /// # Errors
    ///
    /// Unsupported by the device, or the device was already torn down.
    pub fn send_effect(&self, data: &[u8]) -> DeviceResult<()> {
        self.with_session(|session, ctx| session.send_effect(data, ctx))
    }

    fn with_session<T>(
        &self,
        f: impl FnOnce(&mut dyn DriverSession, &mut SessionCtx<'_>) -> DeviceResult<T>,
    ) -> DeviceResult<T> {
        let mut state = self.device.state.lock();
        let DeviceState {
            session, io, output, ..
        } = &mut *state;
        let (Some(session), Some(io)) = (session.as_mut(), io.as_mut()) else {
            return Err(DeviceError::disconnected(self.device.name.clone()));
        };
        let mut sink = self.sink.lock();
        let sink: &mut dyn JoystickEventSink = &mut *sink;
        let mut ctx = SessionCtx {
            io: io.as_mut(),
            sink,
            output,
            now: Instant::now(),
        };
        f(session.as_mut(), &mut ctx)
    }
}

/// Owned HID joystick registry.
pub struct HidJoystickRegistry {
    table: DriverTable,
    port: Box<dyn HidPort>,
    hints: Arc<dyn HintRegistry>,
    sink: SharedSink,
    devices: Vec<Arc<Device>>,
    hint_generation: Option<u64>,
}

impl HidJoystickRegistry {
    /// Registry over the built-in dispatch table.
    pub fn new(port: Box<dyn HidPort>, sink: SharedSink, hints: Arc<dyn HintRegistry>) -> Self {
        Self::with_table(DriverTable::builtin(), port, sink, hints)
    }

    /// Registry with an explicit dispatch table.
    pub fn with_table(
        table: DriverTable,
        port: Box<dyn HidPort>,
        sink: SharedSink,
        hints: Arc<dyn HintRegistry>,
    ) -> Self {
        Self {
            table,
            port,
            hints,
            sink,
            devices: Vec::new(),
            hint_generation: None,
        }
    }

    /// Tracked (claimed) devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Handles to every tracked device.
    pub fn joysticks(&self) -> Vec<JoystickHandle> {
        self.devices
            .iter()
            .map(|device| JoystickHandle {
                device: Arc::clone(device),
                sink: Arc::clone(&self.sink),
            })
            .collect()
    }

    /// Handle to the device with this key, if tracked.
    pub fn find(&self, key: &DeviceKey) -> Option<JoystickHandle> {
        self.devices
            .iter()
            .find(|device| device.key == *key)
            .map(|device| JoystickHandle {
                device: Arc::clone(device),
                sink: Arc::clone(&self.sink),
            })
    }

    /// Re-enumerate the transport and reconcile the device list.
    ///
    /// New candidate devices are probed through the dispatch table; a claimed
    /// device gets its transport opened and its driver session started.
    /// Devices that stopped enumerating, and devices marked defunct, are torn
    /// down. Devices no driver claims are left untracked and re-probed on the
    /// next call, so a driver enabled later still picks them up.
    pub fn refresh(&mut self) {
        self.reprobe_on_hint_change();

        for device in &self.devices {
            device.seen.store(false, Ordering::Release);
        }

        let infos = match self.port.list_devices() {
            Ok(infos) => infos,
            Err(err) => {
                // Keep the current device list; a transient enumeration
                // failure must not tear down working sessions.
                warn!(error = %err, "device enumeration failed");
                for device in &self.devices {
                    device.seen.store(true, Ordering::Release);
                }
                return;
            }
        };
        for info in infos {
            self.track(info);
        }

        self.sweep();
    }

    /// Run every live session once and pump its output scheduler.
    ///
    /// Never blocks: a device whose lock is held elsewhere is skipped for
    /// this cycle. Sessions that report disconnect are torn down before the
    /// call returns, so removal events fire promptly.
    pub fn poll(&mut self) -> PollStats {
        let now = Instant::now();
        let mut stats = PollStats::default();
        let mut any_defunct = false;

        for device in &self.devices {
            if device.defunct.load(Ordering::Acquire) {
                any_defunct = true;
                continue;
            }
            let Some(mut state) = device.state.try_lock() else {
                stats.skipped = stats.skipped.saturating_add(1);
                continue;
            };
            let DeviceState {
                session,
                io,
                output,
                scheduler,
            } = &mut *state;
            let (Some(session), Some(io)) = (session.as_mut(), io.as_mut()) else {
                continue;
            };

            let status = {
                let mut sink = self.sink.lock();
                let sink: &mut dyn JoystickEventSink = &mut *sink;
                let mut ctx = SessionCtx {
                    io: io.as_mut(),
                    sink,
                    output: &mut *output,
                    now,
                };
                session.update(&mut ctx)
            };
            stats.polled = stats.polled.saturating_add(1);

            match status {
                SessionStatus::Running => scheduler.pump(now, output, io.as_mut()),
                SessionStatus::Disconnected => {
                    debug!(device = %device.name, "session reported disconnect");
                    device.defunct.store(true, Ordering::Release);
                    any_defunct = true;
                }
            }
        }

        if any_defunct {
            stats.removed = self.sweep();
        }
        stats
    }

    /// Tear down every tracked device.
    pub fn shutdown(&mut self) {
        let devices = std::mem::take(&mut self.devices);
        for device in devices {
            self.teardown(&device);
        }
    }

    /// A hint flip re-evaluates which drivers may keep their devices.
    fn reprobe_on_hint_change(&mut self) {
        let generation = self.hints.generation();
        if self.hint_generation == Some(generation) {
            return;
        }
        let stale = self.hint_generation.is_some();
        self.hint_generation = Some(generation);
        if !stale {
            return;
        }
        for device in &self.devices {
            if !device.driver.enabled(self.hints.as_ref()) {
                debug!(
                    device = %device.name,
                    driver = device.driver.name(),
                    "driver disabled by hint"
                );
                device.defunct.store(true, Ordering::Release);
            }
        }
    }

    fn track(&mut self, info: HidDeviceInfo) {
        if !usage::is_controller_usage(info.usage_page, info.usage) {
            return;
        }
        let key = DeviceKey::of(&info);
        if let Some(existing) = self.devices.iter().find(|device| device.key == key) {
            existing.seen.store(true, Ordering::Release);
            return;
        }

        let Some(driver) = self.table.match_driver(&info, self.hints.as_ref()) else {
            return;
        };
        let mut io = match self.port.open_device(&info.path) {
            Ok(io) => io,
            Err(err) => {
                warn!(
                    driver = driver.name(),
                    path = %info.path,
                    error = %err,
                    "transport open failed; device left unclaimed"
                );
                return;
            }
        };
        let session = match driver.open(&info, io.as_mut(), self.hints.as_ref()) {
            Ok(session) => session,
            Err(err) => {
                warn!(
                    driver = driver.name(),
                    path = %info.path,
                    error = %err,
                    "driver open failed; device left unclaimed"
                );
                return;
            }
        };

        let name = session.device_name().to_owned();
        let attaches_now = session.attaches_on_open();
        let device = Arc::new(Device {
            key,
            name,
            serial: info.serial_number.clone(),
            driver,
            state: Mutex::new(DeviceState {
                session: Some(session),
                io: Some(io),
                output: OutputQueue::new(),
                scheduler: OutputScheduler::for_device(&info),
            }),
            info,
            seen: AtomicBool::new(true),
            defunct: AtomicBool::new(false),
            attached: AtomicBool::new(false),
        });
        info!(
            driver = driver.name(),
            device = %device.name,
            vendor_id = format_args!("{:04x}", device.info.vendor_id),
            product_id = format_args!("{:04x}", device.info.product_id),
            "claimed device"
        );
        if attaches_now {
            device.attached.store(true, Ordering::Release);
            self.sink.lock().joystick_connected();
        }
        self.devices.push(device);
    }

    /// Remove and tear down every device that is unseen or defunct.
    fn sweep(&mut self) -> usize {
        let devices = std::mem::take(&mut self.devices);
        let (keep, gone): (Vec<_>, Vec<_>) = devices.into_iter().partition(|device| {
            device.seen.load(Ordering::Acquire) && !device.defunct.load(Ordering::Acquire)
        });
        self.devices = keep;
        let removed = gone.len();
        for device in gone {
            self.teardown(&device);
        }
        removed
    }

    /// Teardown order: session close, scheduler drain, transport release,
    /// removal event. The removal event fires exactly once per tracked
    /// device; deferred-attach sessions announce their own detach from
    /// `close()` instead.
    fn teardown(&self, device: &Device) {
        let mut state = device.state.lock();
        let DeviceState {
            session,
            io,
            output,
            scheduler,
        } = &mut *state;

        {
            let mut sink = self.sink.lock();
            if let (Some(mut session), Some(io)) = (session.take(), io.as_mut()) {
                let sink: &mut dyn JoystickEventSink = &mut *sink;
                let mut ctx = SessionCtx {
                    io: io.as_mut(),
                    sink,
                    output: &mut *output,
                    now: Instant::now(),
                };
                session.close(&mut ctx);
            }
            if let Some(io) = io.as_mut() {
                scheduler.drain(output, io.as_mut());
            }
            *io = None;
            if device.attached.swap(false, Ordering::AcqRel) {
                sink.joystick_disconnected();
            }
        }
        info!(
            driver = device.driver.name(),
            device = %device.name,
            "removed device"
        );
    }
}
