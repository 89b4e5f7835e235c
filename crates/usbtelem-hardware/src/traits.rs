//! Hardware collaborator trait definitions.
//!
//! This module defines the contract between the link service and the three
//! things it does not implement itself: the host USB subsystem, the serial
//! port driver, and the signal-quality source.
//!
//! All methods are synchronous and bounded: serial I/O takes an explicit
//! timeout, and the service calls them inline from its single execution
//! context. This matches the blocking API of the `serialport` crate used by
//! the native backend.

use crate::error::Result;
use crate::types::{DeviceHandle, PortLocation, SerialDriver};
use std::time::Duration;
use usbtelem_core::{LineConfig, UsbDevice};

/// Host USB subsystem abstraction.
///
/// Reports which devices a serial driver has claimed, answers permission
/// queries, grants connection handles, and creates port objects.
///
/// # Examples
///
/// ```
/// use usbtelem_hardware::mock::MockUsbHost;
/// use usbtelem_hardware::traits::UsbHost;
/// use usbtelem_core::UsbDevice;
///
/// let (mut host, handle) = MockUsbHost::new();
/// let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
/// handle.plug_serial(device.clone());
///
/// let drivers = host.probe_drivers().unwrap();
/// assert_eq!(drivers[0].device, device);
/// assert!(host.open_device(&device).is_some());
/// ```
pub trait UsbHost: Send {
    /// Port type produced by [`create_port`](UsbHost::create_port).
    type Port: SerialPortIo;

    /// List every device currently claimed by a serial driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot enumerate devices.
    fn probe_drivers(&self) -> Result<Vec<SerialDriver>>;

    /// Whether access to the device was already granted.
    fn has_permission(&self, device: &UsbDevice) -> bool;

    /// Request a connection handle for the device.
    ///
    /// Returns `None` when the host refuses (no permission, device gone).
    fn open_device(&mut self, device: &UsbDevice) -> Option<DeviceHandle>;

    /// Create an unopened port object for a located port.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot represent the port.
    fn create_port(&mut self, location: &PortLocation) -> Result<Self::Port>;
}

/// Serial port driver abstraction.
///
/// A port is created unopened, opened with a [`DeviceHandle`], configured
/// once, used for bounded reads and writes, and closed exactly once.
pub trait SerialPortIo: Send {
    /// Open the port over a granted connection handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot claim the interface.
    fn open(&mut self, handle: DeviceHandle) -> Result<()>;

    /// Apply line parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the device rejects the parameters.
    fn set_parameters(&mut self, config: &LineConfig) -> Result<()>;

    /// Write bytes, giving up after `timeout`.
    ///
    /// Returns the number of bytes accepted, which may be short on timeout.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or disconnection.
    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read available bytes into `buf`, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or disconnection.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the port and its connection handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver reports a failure while releasing.
    /// The port must be considered closed either way.
    fn close(&mut self) -> Result<()>;
}

/// Source of the signal-quality value sent in every telemetry frame.
///
/// Implemented for closures, so any `FnMut() -> i32` works:
///
/// ```
/// use usbtelem_hardware::traits::SignalQualitySource;
///
/// let mut counter = 0;
/// let mut source = move || {
///     counter += 1;
///     counter
/// };
/// assert_eq!(source.signal_quality(), 1);
/// assert_eq!(source.signal_quality(), 2);
/// ```
pub trait SignalQualitySource: Send {
    /// Sample the current quality.
    fn signal_quality(&mut self) -> i32;
}

impl<F> SignalQualitySource for F
where
    F: FnMut() -> i32 + Send,
{
    fn signal_quality(&mut self) -> i32 {
        self()
    }
}
