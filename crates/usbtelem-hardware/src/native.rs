//! Native backend over the `serialport` crate.
//!
//! Desktop operating systems expose USB serial adapters (CDC-ACM, CP210x,
//! FTDI, CH34x) as ordinary serial ports, so the host here is a view over
//! [`serialport::available_ports`] restricted to USB-backed entries. Each
//! USB port is reported as its own device, keyed by the port path.

use crate::{
    Result,
    error::HardwareError,
    traits::{SerialPortIo, UsbHost},
    types::{DeviceHandle, PortLocation, SerialDriver, UsbIdFilter},
};
use serialport::{SerialPort, SerialPortType};
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tracing::debug;
use usbtelem_core::{
    DataBits, LineConfig, Parity, StopBits, UsbDevice,
    constants::{DEFAULT_BAUD_RATE, READ_TIMEOUT_MS},
};

/// Driver name reported for ports found through `serialport`.
pub const NATIVE_DRIVER: &str = "usb-serial";

/// List the USB serial ports present right now, as devices.
///
/// An empty filter list admits every USB port.
///
/// # Errors
///
/// Returns an error if the OS port enumeration fails.
pub fn usb_devices(filters: &[UsbIdFilter]) -> Result<Vec<UsbDevice>> {
    let ports = serialport::available_ports()?;

    let devices = ports
        .into_iter()
        .filter_map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => {
                let mut device = UsbDevice::new(port.port_name, info.vid, info.pid);
                device.serial_number = info.serial_number;
                device.manufacturer = info.manufacturer;
                device.product = info.product;
                Some(device)
            }
            _ => None,
        })
        .filter(|device| UsbIdFilter::admits(filters, device))
        .collect();

    Ok(devices)
}

/// USB host backed by the operating system's serial port list.
#[derive(Debug, Clone, Default)]
pub struct NativeUsbHost {
    filters: Vec<UsbIdFilter>,
}

impl NativeUsbHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report devices admitted by `filters`.
    pub fn with_filters(filters: Vec<UsbIdFilter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[UsbIdFilter] {
        &self.filters
    }
}

impl UsbHost for NativeUsbHost {
    type Port = NativeSerialPort;

    fn probe_drivers(&self) -> Result<Vec<SerialDriver>> {
        Ok(usb_devices(&self.filters)?
            .into_iter()
            .map(|device| {
                let node = device.key.to_string();
                SerialDriver::new(device, NATIVE_DRIVER, vec![node])
            })
            .collect())
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        match check_access(device.key.as_str()) {
            Ok(()) => true,
            Err(e) => {
                debug!(device = %device.key, error = %e, "No read/write access to device node");
                false
            }
        }
    }

    fn open_device(&mut self, device: &UsbDevice) -> Option<DeviceHandle> {
        self.has_permission(device)
            .then(|| DeviceHandle::new(device.clone(), device.key.as_str()))
    }

    fn create_port(&mut self, location: &PortLocation) -> Result<Self::Port> {
        Ok(NativeSerialPort::new(location.clone()))
    }
}

/// Check read/write access to a device node without opening it.
///
/// Opening and closing a tty toggles DTR, which resets many boards, so the
/// check goes through `access(2)` instead.
#[cfg(unix)]
fn check_access(node: &str) -> Result<()> {
    use nix::errno::Errno;
    use nix::unistd::{AccessFlags, access};

    access(node, AccessFlags::R_OK | AccessFlags::W_OK).map_err(|errno| match errno {
        Errno::EACCES | Errno::EPERM => HardwareError::permission_denied(node),
        Errno::ENOENT | Errno::ENODEV => HardwareError::disconnected(node),
        other => HardwareError::Io(std::io::Error::from(other)),
    })
}

#[cfg(not(unix))]
fn check_access(_node: &str) -> Result<()> {
    Ok(())
}

/// Serial port opened through `serialport`.
pub struct NativeSerialPort {
    location: PortLocation,
    port: Option<Box<dyn SerialPort>>,
}

impl NativeSerialPort {
    pub fn new(location: PortLocation) -> Self {
        Self {
            location,
            port: None,
        }
    }

    pub fn location(&self) -> &PortLocation {
        &self.location
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| HardwareError::communication(format!("{} is not open", self.location)))
    }
}

impl fmt::Debug for NativeSerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSerialPort")
            .field("location", &self.location)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialPortIo for NativeSerialPort {
    fn open(&mut self, handle: DeviceHandle) -> Result<()> {
        if self.port.is_some() {
            return Err(HardwareError::communication(format!(
                "{} is already open",
                self.location
            )));
        }

        let port = serialport::new(handle.node.as_str(), DEFAULT_BAUD_RATE)
            .timeout(Duration::from_millis(READ_TIMEOUT_MS))
            .open()?;
        debug!(port = %self.location, "Serial port opened");

        self.port = Some(port);
        Ok(())
    }

    fn set_parameters(&mut self, config: &LineConfig) -> Result<()> {
        let port = self.port_mut()?;

        port.set_baud_rate(config.baud_rate)?;
        port.set_data_bits(match config.data_bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        })?;
        port.set_stop_bits(match config.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        })?;
        port.set_parity(match config.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        })?;
        Ok(())
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)?;
        write_frame(port, data, timeout)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)?;

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!(port = %self.location, "Serial port closed");
        }
        Ok(())
    }
}

/// Write all of `data` or fail.
///
/// A frame either leaves whole or the call errors; the caller never sees a
/// short count.
fn write_frame<W: Write + ?Sized>(writer: &mut W, data: &[u8], timeout: Duration) -> Result<usize> {
    match writer.write_all(data).and_then(|()| writer.flush()) {
        Ok(()) => Ok(data.len()),
        Err(e) if e.kind() == ErrorKind::TimedOut => {
            Err(HardwareError::timeout(timeout.as_millis() as u64))
        }
        Err(e) => Err(e.into()),
    }
}
