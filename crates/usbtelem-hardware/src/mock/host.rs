//! Mock USB host implementation for testing and development.
//!
//! This module provides a simulated USB subsystem whose devices, permission
//! grants and port failures are controlled programmatically through a
//! [`MockUsbHostHandle`]. Ports created by the host share the same state, so
//! the handle also observes every write, read and close.

use crate::{
    Result,
    error::HardwareError,
    mock::port::MockSerialPort,
    traits::UsbHost,
    types::{DeviceHandle, PortLocation, SerialDriver},
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use usbtelem_core::{DeviceKey, LineConfig, UsbDevice};

/// A device plugged into the mock host.
///
/// # Examples
///
/// ```
/// use usbtelem_hardware::mock::MockDevice;
/// use usbtelem_core::UsbDevice;
///
/// let device = UsbDevice::new("/dev/ttyUSB0", 0x10c4, 0xea60);
/// let locked = MockDevice::serial(device).with_driver("cp210x").without_permission();
/// ```
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub(crate) device: UsbDevice,
    pub(crate) driver: Option<String>,
    pub(crate) ports: usize,
    pub(crate) permission: bool,
    pub(crate) deny_open: bool,
    pub(crate) refuse_port: bool,
}

impl MockDevice {
    /// A CDC-ACM serial device with one port and permission granted.
    pub fn serial(device: UsbDevice) -> Self {
        Self {
            device,
            driver: Some("cdc_acm".to_string()),
            ports: 1,
            permission: true,
            deny_open: false,
            refuse_port: false,
        }
    }

    /// A device no serial driver claims (a keyboard, a mass-storage stick).
    pub fn unsupported(device: UsbDevice) -> Self {
        Self {
            device,
            driver: None,
            ports: 0,
            permission: true,
            deny_open: false,
            refuse_port: false,
        }
    }

    /// Set the driver name reported by the prober.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    /// Set the number of ports the driver exposes.
    pub fn with_ports(mut self, ports: usize) -> Self {
        self.ports = ports;
        self
    }

    /// Plug the device in without a permission grant.
    pub fn without_permission(mut self) -> Self {
        self.permission = false;
        self
    }

    /// Make the host refuse connection handles even with permission.
    pub fn deny_open(mut self) -> Self {
        self.deny_open = true;
        self
    }

    /// Grant a connection handle but have the driver refuse to open the port,
    /// as when the node's permissions change between the two steps.
    pub fn refuse_port(mut self) -> Self {
        self.refuse_port = true;
        self
    }

    fn driver(&self) -> Option<SerialDriver> {
        let name = self.driver.as_ref()?;
        let ports = (0..self.ports)
            .map(|i| format!("{}:{}", self.device.key, i))
            .collect();
        Some(SerialDriver::new(self.device.clone(), name.clone(), ports))
    }
}

/// How injected port failures manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The operation times out.
    Timeout,

    /// The operation fails with a broken pipe.
    Io,
}

impl MockFailure {
    pub(crate) fn to_error(self, timeout_ms: u64) -> HardwareError {
        match self {
            Self::Timeout => HardwareError::timeout(timeout_ms),
            Self::Io => HardwareError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
        }
    }
}

/// Bytes accepted by a mock port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device: DeviceKey,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub(crate) devices: Vec<MockDevice>,
    pub(crate) inbound: VecDeque<Vec<u8>>,
    pub(crate) writes: Vec<WriteRecord>,
    pub(crate) applied: Vec<LineConfig>,
    pub(crate) open_failure: bool,
    pub(crate) parameters_failure: bool,
    pub(crate) write_failure: Option<MockFailure>,
    pub(crate) read_failure: Option<MockFailure>,
    pub(crate) close_failure: bool,
    pub(crate) write_attempts: usize,
    pub(crate) read_calls: usize,
    pub(crate) handles_granted: usize,
    pub(crate) ports_opened: usize,
    pub(crate) ports_closed: usize,
}

impl MockState {
    pub(crate) fn is_plugged(&self, key: &DeviceKey) -> bool {
        self.devices.iter().any(|d| &d.device.key == key)
    }

    fn find(&self, device: &UsbDevice) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.device == *device)
    }

    fn find_mut(&mut self, device: &UsbDevice) -> Option<&mut MockDevice> {
        self.devices.iter_mut().find(|d| d.device == *device)
    }
}

pub(crate) type SharedState = Arc<Mutex<MockState>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock USB host for testing and development.
///
/// # Examples
///
/// ```
/// use usbtelem_hardware::mock::MockUsbHost;
/// use usbtelem_hardware::traits::{SerialPortIo, UsbHost};
/// use usbtelem_core::{LineConfig, UsbDevice};
/// use std::time::Duration;
///
/// let (mut host, handle) = MockUsbHost::new();
/// let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
/// handle.plug_serial(device.clone());
///
/// let location = host.probe_drivers().unwrap()[0].port(0).unwrap();
/// let mut port = host.create_port(&location).unwrap();
/// port.open(host.open_device(&device).unwrap()).unwrap();
/// port.set_parameters(&LineConfig::DEFAULT).unwrap();
/// port.write(b"hello", Duration::from_millis(100)).unwrap();
///
/// assert_eq!(handle.written_text(), vec!["hello".to_string()]);
/// ```
#[derive(Debug)]
pub struct MockUsbHost {
    state: SharedState,
}

impl MockUsbHost {
    /// Create an empty mock host and its control handle.
    pub fn new() -> (Self, MockUsbHostHandle) {
        let state = SharedState::default();
        let host = Self {
            state: state.clone(),
        };
        (host, MockUsbHostHandle { state })
    }
}

impl UsbHost for MockUsbHost {
    type Port = MockSerialPort;

    fn probe_drivers(&self) -> Result<Vec<SerialDriver>> {
        Ok(lock(&self.state)
            .devices
            .iter()
            .filter_map(MockDevice::driver)
            .collect())
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        lock(&self.state).find(device).is_some_and(|d| d.permission)
    }

    fn open_device(&mut self, device: &UsbDevice) -> Option<DeviceHandle> {
        let mut state = lock(&self.state);
        let entry = state.find(device)?;
        if !entry.permission || entry.deny_open {
            return None;
        }
        let handle = DeviceHandle::new(entry.device.clone(), entry.device.key.as_str());
        state.handles_granted += 1;
        Some(handle)
    }

    fn create_port(&mut self, location: &PortLocation) -> Result<Self::Port> {
        if !lock(&self.state).is_plugged(&location.device.key) {
            return Err(HardwareError::disconnected(location.device.key.as_str()));
        }
        Ok(MockSerialPort::new(self.state.clone(), location.clone()))
    }
}

/// Handle for controlling a mock USB host.
///
/// Cloning the handle shares the same host state.
#[derive(Debug, Clone)]
pub struct MockUsbHostHandle {
    state: SharedState,
}

impl MockUsbHostHandle {
    /// Plug a device in. Replaces an entry with the same key.
    pub fn plug(&self, device: MockDevice) {
        let mut state = lock(&self.state);
        state.devices.retain(|d| d.device != device.device);
        state.devices.push(device);
    }

    /// Plug in a serial device with permission granted.
    pub fn plug_serial(&self, device: UsbDevice) {
        self.plug(MockDevice::serial(device));
    }

    /// Unplug a device. Returns `false` if it was not plugged.
    ///
    /// Open ports on the device start failing with a disconnect error.
    pub fn unplug(&self, device: &UsbDevice) -> bool {
        let mut state = lock(&self.state);
        let before = state.devices.len();
        state.devices.retain(|d| d.device != *device);
        state.devices.len() != before
    }

    /// Grant or revoke permission for a plugged device.
    pub fn set_permission(&self, device: &UsbDevice, granted: bool) {
        if let Some(entry) = lock(&self.state).find_mut(device) {
            entry.permission = granted;
        }
    }

    /// Make the driver fail to open ports.
    pub fn fail_open(&self, fail: bool) {
        lock(&self.state).open_failure = fail;
    }

    /// Make the driver reject line parameters.
    pub fn fail_parameters(&self, fail: bool) {
        lock(&self.state).parameters_failure = fail;
    }

    /// Inject a failure into every write, or clear it with `None`.
    pub fn fail_writes(&self, failure: Option<MockFailure>) {
        lock(&self.state).write_failure = failure;
    }

    /// Inject a failure into every read, or clear it with `None`.
    pub fn fail_reads(&self, failure: Option<MockFailure>) {
        lock(&self.state).read_failure = failure;
    }

    /// Make port close report an error (the port still closes).
    pub fn fail_close(&self, fail: bool) {
        lock(&self.state).close_failure = fail;
    }

    /// Queue bytes the device will send; one chunk is returned per read.
    pub fn push_inbound(&self, data: impl Into<Vec<u8>>) {
        lock(&self.state).inbound.push_back(data.into());
    }

    /// Every accepted write, in order.
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.state).writes.clone()
    }

    /// Every accepted write decoded as text.
    pub fn written_text(&self) -> Vec<String> {
        lock(&self.state)
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(&w.data).into_owned())
            .collect()
    }

    /// Number of write calls, including failed ones.
    pub fn write_attempts(&self) -> usize {
        lock(&self.state).write_attempts
    }

    /// Number of read calls, including failed ones.
    pub fn read_calls(&self) -> usize {
        lock(&self.state).read_calls
    }

    /// Number of connection handles granted so far.
    pub fn handles_granted(&self) -> usize {
        lock(&self.state).handles_granted
    }

    /// Number of ports opened successfully so far.
    pub fn ports_opened(&self) -> usize {
        lock(&self.state).ports_opened
    }

    /// Number of ports closed so far.
    pub fn ports_closed(&self) -> usize {
        lock(&self.state).ports_closed
    }

    /// Ports currently open (opened minus closed).
    pub fn open_ports(&self) -> usize {
        let state = lock(&self.state);
        state.ports_opened - state.ports_closed
    }

    /// Line parameters applied to ports, in order.
    pub fn applied_configs(&self) -> Vec<LineConfig> {
        lock(&self.state).applied.clone()
    }

    /// Devices currently plugged in.
    pub fn devices(&self) -> Vec<UsbDevice> {
        lock(&self.state)
            .devices
            .iter()
            .map(|d| d.device.clone())
            .collect()
    }

    /// Forget recorded writes and counters, keeping devices and failures.
    pub fn reset_counters(&self) {
        let mut state = lock(&self.state);
        state.writes.clear();
        state.applied.clear();
        state.write_attempts = 0;
        state.read_calls = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(key: &str) -> UsbDevice {
        UsbDevice::new(key, 0x0483, 0x5740)
    }

    #[test]
    fn test_probe_skips_unsupported_devices() {
        let (host, handle) = MockUsbHost::new();
        handle.plug_serial(device("/dev/ttyACM0"));
        handle.plug(MockDevice::unsupported(device("/dev/sda")));

        let drivers = host.probe_drivers().unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].name, "cdc_acm");
        assert_eq!(drivers[0].ports, vec!["/dev/ttyACM0:0".to_string()]);
    }

    #[test]
    fn test_open_device_requires_permission() {
        let (mut host, handle) = MockUsbHost::new();
        let dev = device("/dev/ttyACM0");
        handle.plug(MockDevice::serial(dev.clone()).without_permission());

        assert!(!host.has_permission(&dev));
        assert!(host.open_device(&dev).is_none());

        handle.set_permission(&dev, true);
        assert!(host.has_permission(&dev));
        assert!(host.open_device(&dev).is_some());
        assert_eq!(handle.handles_granted(), 1);
    }

    #[test]
    fn test_deny_open() {
        let (mut host, handle) = MockUsbHost::new();
        let dev = device("/dev/ttyACM0");
        handle.plug(MockDevice::serial(dev.clone()).deny_open());

        assert!(host.has_permission(&dev));
        assert!(host.open_device(&dev).is_none());
    }

    #[test]
    fn test_unplug() {
        let (mut host, handle) = MockUsbHost::new();
        let dev = device("/dev/ttyACM0");
        handle.plug_serial(dev.clone());

        assert!(handle.unplug(&dev));
        assert!(!handle.unplug(&dev));
        assert!(host.probe_drivers().unwrap().is_empty());
        assert!(host.open_device(&dev).is_none());
    }

    #[test]
    fn test_plug_replaces_same_key() {
        let (host, handle) = MockUsbHost::new();
        handle.plug_serial(device("/dev/ttyACM0"));
        handle.plug(MockDevice::serial(device("/dev/ttyACM0")).with_ports(2));

        let drivers = host.probe_drivers().unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].ports.len(), 2);
    }

    #[test]
    fn test_create_port_for_unplugged_device() {
        let (mut host, handle) = MockUsbHost::new();
        let dev = device("/dev/ttyACM0");
        handle.plug_serial(dev.clone());
        let location = host.probe_drivers().unwrap()[0].port(0).unwrap();

        handle.unplug(&dev);
        assert!(host.create_port(&location).is_err());
    }
}
