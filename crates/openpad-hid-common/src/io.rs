//! HID transport traits
//!
//! Drivers never touch a HID backend directly; they talk through
//! [`HidDeviceIo`] and the registry enumerates through [`HidPort`]. The
//! `mock` module provides scripted implementations of both so protocol and
//! registry behavior can be tested without hardware.

use crate::{HidDeviceInfo, HidIoError, HidIoResult};

pub trait HidDeviceIo: Send {
    /// Write an output report. The first byte is the report id.
    fn write_report(&mut self, data: &[u8]) -> HidIoResult<usize>;

    /// Read one input report, waiting at most `timeout_ms`.
    ///
    /// `Ok(None)` means nothing was pending; an `Err` means the transport is
    /// gone and the device should be torn down.
    fn read_report(&mut self, timeout_ms: u32) -> HidIoResult<Option<Vec<u8>>>;

    /// Send a feature report. The first byte is the report id.
    fn send_feature_report(&mut self, data: &[u8]) -> HidIoResult<()>;

    /// Fetch a feature report by id.
    fn get_feature_report(&mut self, report_id: u8) -> HidIoResult<Vec<u8>>;

    fn device_info(&self) -> &HidDeviceInfo;
}

pub trait HidPort: Send + Sync {
    /// Snapshot of everything currently attached.
    fn list_devices(&self) -> HidIoResult<Vec<HidDeviceInfo>>;

    /// Open a device by platform path.
    fn open_device(&self, path: &str) -> HidIoResult<Box<dyn HidDeviceIo>>;
}

pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    struct DeviceState {
        read_queue: VecDeque<Vec<u8>>,
        write_history: Vec<Vec<u8>>,
        feature_history: Vec<Vec<u8>>,
        feature_replies: HashMap<u8, VecDeque<Vec<u8>>>,
        connected: bool,
        fail_writes: bool,
    }

    impl DeviceState {
        fn new() -> Self {
            Self {
                read_queue: VecDeque::new(),
                write_history: Vec::new(),
                feature_history: Vec::new(),
                feature_replies: HashMap::new(),
                connected: true,
                fail_writes: false,
            }
        }
    }

    /// Test-side handle to a scripted device.
    ///
    /// Cloning shares state with every [`MockDeviceIo`] handed out for the
    /// same device, so a test can keep queueing reads and inspecting writes
    /// after the registry has opened the device.
    #[derive(Clone)]
    pub struct MockDeviceHandle {
        info: HidDeviceInfo,
        state: Arc<Mutex<DeviceState>>,
    }

    impl MockDeviceHandle {
        pub fn new(info: HidDeviceInfo) -> Self {
            Self {
                info,
                state: Arc::new(Mutex::new(DeviceState::new())),
            }
        }

        pub fn info(&self) -> &HidDeviceInfo {
            &self.info
        }

        pub fn queue_read(&self, data: Vec<u8>) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.read_queue.push_back(data);
        }

        pub fn queue_feature_reply(&self, report_id: u8, data: Vec<u8>) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state
                .feature_replies
                .entry(report_id)
                .or_default()
                .push_back(data);
        }

        pub fn get_write_history(&self) -> Vec<Vec<u8>> {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.write_history.clone()
        }

        pub fn get_feature_history(&self) -> Vec<Vec<u8>> {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.feature_history.clone()
        }

        pub fn pending_reads(&self) -> usize {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.read_queue.len()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.fail_writes = fail;
        }

        pub fn disconnect(&self) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.connected = false;
        }

        pub fn reconnect(&self) {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.connected = true;
        }

        pub fn is_connected(&self) -> bool {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.connected
        }

        pub fn open(&self) -> MockDeviceIo {
            MockDeviceIo {
                info: self.info.clone(),
                state: Arc::clone(&self.state),
            }
        }
    }

    /// Scripted [`HidDeviceIo`] backed by a [`MockDeviceHandle`].
    pub struct MockDeviceIo {
        info: HidDeviceInfo,
        state: Arc<Mutex<DeviceState>>,
    }

    impl HidDeviceIo for MockDeviceIo {
        fn write_report(&mut self, data: &[u8]) -> HidIoResult<usize> {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.connected {
                return Err(HidIoError::Disconnected);
            }
            if state.fail_writes {
                return Err(HidIoError::WriteError("scripted failure".to_string()));
            }
            state.write_history.push(data.to_vec());
            Ok(data.len())
        }

        fn read_report(&mut self, _timeout_ms: u32) -> HidIoResult<Option<Vec<u8>>> {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.connected {
                return Err(HidIoError::Disconnected);
            }
            Ok(state.read_queue.pop_front())
        }

        fn send_feature_report(&mut self, data: &[u8]) -> HidIoResult<()> {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.connected {
                return Err(HidIoError::Disconnected);
            }
            if state.fail_writes {
                return Err(HidIoError::WriteError("scripted failure".to_string()));
            }
            state.feature_history.push(data.to_vec());
            Ok(())
        }

        fn get_feature_report(&mut self, report_id: u8) -> HidIoResult<Vec<u8>> {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.connected {
                return Err(HidIoError::Disconnected);
            }
            match state
                .feature_replies
                .get_mut(&report_id)
                .and_then(VecDeque::pop_front)
            {
                Some(data) => Ok(data),
                None => Err(HidIoError::ReadError(format!(
                    "no feature reply queued for report {report_id:#04x}"
                ))),
            }
        }

        fn device_info(&self) -> &HidDeviceInfo {
            &self.info
        }
    }

    /// Scripted [`HidPort`] whose device population can change between
    /// enumerations, the way physical hotplug does.
    #[derive(Clone, Default)]
    pub struct MockHidBus {
        devices: Arc<Mutex<Vec<MockDeviceHandle>>>,
    }

    impl MockHidBus {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_device(&self, info: HidDeviceInfo) -> MockDeviceHandle {
            let handle = MockDeviceHandle::new(info);
            let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            devices.push(handle.clone());
            handle
        }

        /// Remove a device from enumeration and mark its handle disconnected,
        /// the two things an unplug does at once.
        pub fn unplug(&self, path: &str) {
            let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(pos) = devices.iter().position(|d| d.info.path == path) {
                let handle = devices.remove(pos);
                handle.disconnect();
            }
        }

        pub fn device_count(&self) -> usize {
            let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            devices.len()
        }
    }

    impl HidPort for MockHidBus {
        fn list_devices(&self) -> HidIoResult<Vec<HidDeviceInfo>> {
            let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            Ok(devices.iter().map(|d| d.info.clone()).collect())
        }

        fn open_device(&self, path: &str) -> HidIoResult<Box<dyn HidDeviceIo>> {
            let devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
            for device in devices.iter() {
                if device.info.path == path {
                    return Ok(Box::new(device.open()));
                }
            }
            Err(HidIoError::DeviceNotFound(path.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_basic() {
        let handle =
            mock::MockDeviceHandle::new(HidDeviceInfo::new(0x045e, 0x0b12, "mock:0"));

        assert_eq!(handle.info().vendor_id, 0x045e);
        assert_eq!(handle.info().product_id, 0x0b12);
        assert!(handle.is_connected());
    }

    #[test]
    fn test_mock_device_write() {
        let handle =
            mock::MockDeviceHandle::new(HidDeviceInfo::new(0x045e, 0x0b12, "mock:0"));
        let mut device = handle.open();

        let result = device.write_report(&[0x01, 0x02, 0x03]);
        assert!(result.is_ok());
        assert_eq!(result.expect("write should succeed"), 3);

        let history = handle.get_write_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_mock_device_read_drains_then_idles() {
        let handle =
            mock::MockDeviceHandle::new(HidDeviceInfo::new(0x045e, 0x0b12, "mock:0"));
        handle.queue_read(vec![0xAA, 0xBB, 0xCC]);

        let mut device = handle.open();
        let first = device.read_report(0).expect("read should succeed");
        assert_eq!(first, Some(vec![0xAA, 0xBB, 0xCC]));

        let second = device.read_report(0).expect("read should succeed");
        assert_eq!(second, None);
    }

    #[test]
    fn test_mock_device_disconnect() {
        let handle =
            mock::MockDeviceHandle::new(HidDeviceInfo::new(0x045e, 0x0b12, "mock:0"));
        let mut device = handle.open();

        handle.disconnect();
        assert!(!handle.is_connected());

        let result = device.read_report(0);
        assert!(matches!(result, Err(HidIoError::Disconnected)));
        let result = device.write_report(&[0x01]);
        assert!(matches!(result, Err(HidIoError::Disconnected)));
    }

    #[test]
    fn test_mock_device_feature_replies() {
        let handle =
            mock::MockDeviceHandle::new(HidDeviceInfo::new(0x2dc8, 0x6012, "mock:0"));
        handle.queue_feature_reply(0x05, vec![0x05, 0x01]);

        let mut device = handle.open();
        let reply = device.get_feature_report(0x05).expect("reply queued");
        assert_eq!(reply, vec![0x05, 0x01]);
        assert!(device.get_feature_report(0x05).is_err());
    }

    #[test]
    fn test_mock_bus_hotplug() {
        let bus = mock::MockHidBus::new();
        bus.add_device(HidDeviceInfo::new(0x045e, 0x0b12, "mock:0"));
        let second = bus.add_device(HidDeviceInfo::new(0x2dc8, 0x6012, "mock:1"));

        assert_eq!(bus.device_count(), 2);
        assert!(bus.open_device("mock:1").is_ok());

        bus.unplug("mock:1");
        assert_eq!(bus.device_count(), 1);
        assert!(!second.is_connected());
        assert!(bus.open_device("mock:1").is_err());
    }
}
