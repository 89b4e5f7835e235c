//! Enum wrappers for backend dispatch.
//!
//! [`UsbHost`] has an associated port type, so it cannot be used as a trait
//! object. A host binary that picks the backend at runtime (real hardware or
//! simulation) uses these enums instead; every call is a `match` over the
//! concrete backend.
//!
//! # Examples
//!
//! ```
//! use usbtelem_hardware::devices::AnyUsbHost;
//! use usbtelem_hardware::mock::MockUsbHost;
//! use usbtelem_hardware::traits::UsbHost;
//!
//! let (host, _handle) = MockUsbHost::new();
//! let host = AnyUsbHost::Mock(host);
//! assert!(host.probe_drivers().unwrap().is_empty());
//! ```

use crate::mock::{MockSerialPort, MockUsbHost};
use crate::native::{NativeSerialPort, NativeUsbHost};
use crate::traits::{SerialPortIo, UsbHost};
use crate::types::{DeviceHandle, PortLocation, SerialDriver};
use crate::Result;
use std::time::Duration;
use usbtelem_core::{LineConfig, UsbDevice};

/// Either USB host backend.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyUsbHost {
    /// Simulated host for development and testing.
    Mock(MockUsbHost),

    /// Operating-system serial ports.
    Native(NativeUsbHost),
}

impl UsbHost for AnyUsbHost {
    type Port = AnySerialPort;

    fn probe_drivers(&self) -> Result<Vec<SerialDriver>> {
        match self {
            Self::Mock(host) => host.probe_drivers(),
            Self::Native(host) => host.probe_drivers(),
        }
    }

    fn has_permission(&self, device: &UsbDevice) -> bool {
        match self {
            Self::Mock(host) => host.has_permission(device),
            Self::Native(host) => host.has_permission(device),
        }
    }

    fn open_device(&mut self, device: &UsbDevice) -> Option<DeviceHandle> {
        match self {
            Self::Mock(host) => host.open_device(device),
            Self::Native(host) => host.open_device(device),
        }
    }

    fn create_port(&mut self, location: &PortLocation) -> Result<Self::Port> {
        match self {
            Self::Mock(host) => host.create_port(location).map(AnySerialPort::Mock),
            Self::Native(host) => host.create_port(location).map(AnySerialPort::Native),
        }
    }
}

/// Port produced by [`AnyUsbHost`].
#[derive(Debug)]
#[non_exhaustive]
pub enum AnySerialPort {
    Mock(MockSerialPort),
    Native(NativeSerialPort),
}

impl SerialPortIo for AnySerialPort {
    fn open(&mut self, handle: DeviceHandle) -> Result<()> {
        match self {
            Self::Mock(port) => port.open(handle),
            Self::Native(port) => port.open(handle),
        }
    }

    fn set_parameters(&mut self, config: &LineConfig) -> Result<()> {
        match self {
            Self::Mock(port) => port.set_parameters(config),
            Self::Native(port) => port.set_parameters(config),
        }
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        match self {
            Self::Mock(port) => port.write(data, timeout),
            Self::Native(port) => port.write(data, timeout),
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self {
            Self::Mock(port) => port.read(buf, timeout),
            Self::Native(port) => port.read(buf, timeout),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(port) => port.close(),
            Self::Native(port) => port.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockUsbHost;

    #[test]
    fn test_any_host_mock_round_trip() {
        let (host, handle) = MockUsbHost::new();
        let mut host = AnyUsbHost::Mock(host);
        let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
        handle.plug_serial(device.clone());

        let location = host.probe_drivers().unwrap()[0].port(0).unwrap();
        let mut port = host.create_port(&location).unwrap();
        assert!(matches!(port, AnySerialPort::Mock(_)));

        port.open(host.open_device(&device).unwrap()).unwrap();
        port.write(b"ping", Duration::from_millis(100)).unwrap();
        port.close().unwrap();

        assert_eq!(handle.written_text(), vec!["ping".to_string()]);
        assert_eq!(handle.open_ports(), 0);
    }

    #[test]
    fn test_any_host_native_port_type() {
        let mut host = AnyUsbHost::Native(NativeUsbHost::new());
        let device = UsbDevice::new("/dev/ttyACM9", 0x0483, 0x5740);
        let location = SerialDriver::new(device, "usb-serial", vec!["/dev/ttyACM9".into()])
            .port(0)
            .unwrap();

        let port = host.create_port(&location).unwrap();
        assert!(matches!(port, AnySerialPort::Native(_)));
    }
}
