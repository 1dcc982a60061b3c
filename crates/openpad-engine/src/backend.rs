//! hidapi transport backend.
//!
//! The one module that touches `hidapi` types. Everything above it speaks
//! the `openpad-hid-common` traits, so the whole engine runs unchanged
//! against the scripted mock transport in tests.

use std::ffi::CString;

use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use tracing::debug;

use openpad_hid_common::io::{HidDeviceIo, HidPort};
use openpad_hid_common::{BusType, HidDeviceInfo, HidIoError, HidIoResult};

/// Largest input or feature report the backend will accept.
const REPORT_BUF_LEN: usize = 1024;

/// [`HidPort`] over the system hidapi library.
pub struct HidapiPort {
    api: Mutex<HidApi>,
}

impl HidapiPort {
    /// Initialize the hidapi backend.
    ///
    /// # Errors
    ///
    /// The underlying library failed to initialize (no USB stack, missing
    /// permissions on the raw HID nodes).
    pub fn new() -> HidIoResult<Self> {
        let api = HidApi::new().map_err(|err| HidIoError::OpenError(err.to_string()))?;
        Ok(Self {
            api: Mutex::new(api),
        })
    }
}

impl HidPort for HidapiPort {
    fn list_devices(&self) -> HidIoResult<Vec<HidDeviceInfo>> {
        let mut api = self.api.lock();
        api.refresh_devices()
            .map_err(|err| HidIoError::OpenError(format!("enumerating devices: {err}")))?;
        Ok(api.device_list().map(convert_info).collect())
    }

    fn open_device(&self, path: &str) -> HidIoResult<Box<dyn HidDeviceIo>> {
        let api = self.api.lock();
        let cpath = CString::new(path)
            .map_err(|_| HidIoError::DeviceNotFound(format!("path contains NUL: {path}")))?;
        let device = api
            .open_path(&cpath)
            .map_err(|err| HidIoError::OpenError(format!("{path}: {err}")))?;
        device
            .set_blocking_mode(false)
            .map_err(|err| HidIoError::OpenError(err.to_string()))?;

        // The cached enumeration has the full identity for this path.
        let info = api
            .device_list()
            .find(|candidate| candidate.path().to_bytes() == path.as_bytes())
            .map(convert_info)
            .unwrap_or_else(|| HidDeviceInfo::new(0, 0, path));
        debug!(path = %info.path, "opened hid device");
        Ok(Box::new(HidapiDevice { device, info }))
    }
}

/// [`HidDeviceIo`] over one open hidapi device.
struct HidapiDevice {
    device: HidDevice,
    info: HidDeviceInfo,
}

impl HidDeviceIo for HidapiDevice {
    fn write_report(&mut self, data: &[u8]) -> HidIoResult<usize> {
        self.device
            .write(data)
            .map_err(|err| HidIoError::WriteError(err.to_string()))
    }

    fn read_report(&mut self, timeout_ms: u32) -> HidIoResult<Option<Vec<u8>>> {
        let mut buf = [0u8; REPORT_BUF_LEN];
        let read = if timeout_ms == 0 {
            // Non-blocking mode: an empty queue reads as zero bytes.
            self.device.read(&mut buf)
        } else {
            let timeout = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
            self.device.read_timeout(&mut buf, timeout)
        };
        let len = read.map_err(|err| HidIoError::ReadError(err.to_string()))?;
        if len == 0 {
            return Ok(None);
        }
        Ok(buf.get(..len).map(<[u8]>::to_vec))
    }

    fn send_feature_report(&mut self, data: &[u8]) -> HidIoResult<()> {
        self.device
            .send_feature_report(data)
            .map_err(|err| HidIoError::WriteError(err.to_string()))
    }

    fn get_feature_report(&mut self, report_id: u8) -> HidIoResult<Vec<u8>> {
        let mut buf = [0u8; REPORT_BUF_LEN];
        if let Some(first) = buf.first_mut() {
            *first = report_id;
        }
        let len = self
            .device
            .get_feature_report(&mut buf)
            .map_err(|err| HidIoError::ReadError(err.to_string()))?;
        Ok(buf.get(..len).map(<[u8]>::to_vec).unwrap_or_default())
    }

    fn device_info(&self) -> &HidDeviceInfo {
        &self.info
    }
}

fn convert_info(raw: &hidapi::DeviceInfo) -> HidDeviceInfo {
    let path = raw.path().to_string_lossy().into_owned();
    let mut info = HidDeviceInfo::new(raw.vendor_id(), raw.product_id(), path)
        .with_usage(raw.usage_page(), raw.usage())
        .with_interface(raw.interface_number())
        .with_release(raw.release_number())
        .with_bus_type(convert_bus(raw.bus_type()));
    if let Some(serial) = raw.serial_number() {
        info = info.with_serial(serial);
    }
    if let Some(manufacturer) = raw.manufacturer_string() {
        info = info.with_manufacturer(manufacturer);
    }
    if let Some(product) = raw.product_string() {
        info = info.with_product_name(product);
    }
    info
}

fn convert_bus(bus: hidapi::BusType) -> BusType {
    match bus {
        hidapi::BusType::Usb => BusType::Usb,
        hidapi::BusType::Bluetooth => BusType::Bluetooth,
        _ => BusType::Unknown,
    }
}
