//! Serial-capable device lookup.

use tracing::warn;
use usbtelem_core::UsbDevice;
use usbtelem_hardware::{PortLocation, SerialDriver, UsbHost};

/// Answers whether a serial driver claimed a device and where its port is.
///
/// Every query probes the host afresh; nothing is cached between calls. A
/// failed probe is logged and treated as "no drivers".
#[derive(Debug)]
pub struct DeviceMatcher<'a, H> {
    host: &'a H,
}

impl<'a, H: UsbHost> DeviceMatcher<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// All devices currently claimed by a serial driver.
    pub fn drivers(&self) -> Vec<SerialDriver> {
        self.host.probe_drivers().unwrap_or_else(|e| {
            warn!(error = %e, "Serial driver probe failed");
            Vec::new()
        })
    }

    /// The driver that claimed `device`, if any.
    pub fn driver_for(&self, device: &UsbDevice) -> Option<SerialDriver> {
        self.drivers().into_iter().find(|d| d.device == *device)
    }

    pub fn is_supported(&self, device: &UsbDevice) -> bool {
        self.driver_for(device).is_some()
    }

    /// First port of the driver that claimed `device`.
    ///
    /// `None` when no driver claims the device or the driver has no ports.
    pub fn locate(&self, device: &UsbDevice) -> Option<PortLocation> {
        self.driver_for(device)?.port(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbtelem_hardware::mock::{MockDevice, MockUsbHost};

    fn device(key: &str) -> UsbDevice {
        UsbDevice::new(key, 0x0483, 0x5740)
    }

    #[test]
    fn test_supported_device_locates_first_port() {
        let (host, handle) = MockUsbHost::new();
        handle.plug(MockDevice::serial(device("/dev/ttyACM0")).with_ports(2));

        let matcher = DeviceMatcher::new(&host);
        assert!(matcher.is_supported(&device("/dev/ttyACM0")));

        let location = matcher.locate(&device("/dev/ttyACM0")).unwrap();
        assert_eq!(location.port_index, 0);
        assert_eq!(location.port_name, "/dev/ttyACM0:0");
    }

    #[test]
    fn test_unsupported_device() {
        let (host, handle) = MockUsbHost::new();
        handle.plug(MockDevice::unsupported(device("/dev/sda")));

        let matcher = DeviceMatcher::new(&host);
        assert!(!matcher.is_supported(&device("/dev/sda")));
        assert!(matcher.locate(&device("/dev/sda")).is_none());
        assert!(!matcher.is_supported(&device("/dev/ttyACM7")));
    }

    #[test]
    fn test_driver_without_ports() {
        let (host, handle) = MockUsbHost::new();
        handle.plug(MockDevice::serial(device("/dev/ttyACM0")).with_ports(0));

        let matcher = DeviceMatcher::new(&host);
        assert!(matcher.is_supported(&device("/dev/ttyACM0")));
        assert!(matcher.locate(&device("/dev/ttyACM0")).is_none());
    }

    #[test]
    fn test_probe_reflects_current_devices() {
        let (host, handle) = MockUsbHost::new();
        let dev = device("/dev/ttyACM0");
        let matcher = DeviceMatcher::new(&host);

        assert!(!matcher.is_supported(&dev));
        handle.plug_serial(dev.clone());
        assert!(matcher.is_supported(&dev));
        handle.unplug(&dev);
        assert!(!matcher.is_supported(&dev));
    }
}
