//! Common types shared across host backends.
//!
//! This module defines what the USB host reports about serial-capable
//! devices (drivers and their ports), the connection handle it grants, and
//! the attach/detach notifications it delivers.

use crate::error::HardwareError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use usbtelem_core::UsbDevice;

/// A serial driver that claimed a USB device.
///
/// A driver may expose several ports (multi-interface adapters); the link
/// always uses the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDriver {
    /// Device the driver claimed.
    pub device: UsbDevice,

    /// Driver name (e.g., "cdc_acm", "cp210x").
    pub name: String,

    /// Port names exposed by the driver, in interface order.
    pub ports: Vec<String>,
}

impl SerialDriver {
    /// Create a driver entry exposing the given ports.
    pub fn new(device: UsbDevice, name: impl Into<String>, ports: Vec<String>) -> Self {
        Self {
            device,
            name: name.into(),
            ports,
        }
    }

    /// Location of the port at `index`, if the driver exposes it.
    pub fn port(&self, index: usize) -> Option<PortLocation> {
        self.ports.get(index).map(|name| PortLocation {
            device: self.device.clone(),
            driver: self.name.clone(),
            port_index: index,
            port_name: name.clone(),
        })
    }
}

/// Where a serial port lives: device, driver and interface index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLocation {
    pub device: UsbDevice,
    pub driver: String,
    pub port_index: usize,
    pub port_name: String,
}

impl fmt::Display for PortLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} #{})", self.port_name, self.driver, self.port_index)
    }
}

/// Connection handle granted by the host for one device.
///
/// Distinct from the device identity: holding a handle means the host
/// allowed I/O. The handle is consumed by [`SerialPortIo::open`] and lives
/// as long as the port stays open.
///
/// [`SerialPortIo::open`]: crate::traits::SerialPortIo::open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Device the handle grants access to.
    pub device: UsbDevice,

    /// OS node used for I/O (e.g., "/dev/ttyACM0").
    pub node: String,
}

impl DeviceHandle {
    pub fn new(device: UsbDevice, node: impl Into<String>) -> Self {
        Self {
            device,
            node: node.into(),
        }
    }
}

/// Hot-plug notification delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsbEvent {
    /// A device was attached.
    Attached(UsbDevice),

    /// A device was detached.
    Detached(UsbDevice),
}

impl UsbEvent {
    /// The device the notification is about.
    pub fn device(&self) -> &UsbDevice {
        match self {
            Self::Attached(device) | Self::Detached(device) => device,
        }
    }
}

/// Vendor/product selector used to restrict which devices a host reports.
///
/// Parsed from `vvvv` (any product of a vendor) or `vvvv:pppp`, in hex.
///
/// # Examples
///
/// ```
/// use usbtelem_hardware::types::UsbIdFilter;
/// use usbtelem_core::UsbDevice;
///
/// let filter: UsbIdFilter = "0483:5740".parse().unwrap();
/// assert!(filter.matches(&UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740)));
/// assert!(!filter.matches(&UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5741)));
///
/// let vendor: UsbIdFilter = "10c4".parse().unwrap();
/// assert!(vendor.matches(&UsbDevice::new("/dev/ttyUSB0", 0x10c4, 0xea60)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UsbIdFilter {
    pub vendor_id: u16,
    pub product_id: Option<u16>,
}

impl UsbIdFilter {
    pub fn matches(&self, device: &UsbDevice) -> bool {
        self.vendor_id == device.vendor_id
            && self.product_id.is_none_or(|pid| pid == device.product_id)
    }

    /// Whether any filter in `filters` admits the device; an empty list admits all.
    pub fn admits(filters: &[UsbIdFilter], device: &UsbDevice) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(device))
    }
}

impl FromStr for UsbIdFilter {
    type Err = HardwareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            u16::from_str_radix(part.trim(), 16).map_err(|_| {
                HardwareError::configuration(format!("Invalid USB id {part:?} in {s:?}"))
            })
        };

        match s.split_once(':') {
            Some((vendor, product)) => Ok(Self {
                vendor_id: parse(vendor)?,
                product_id: Some(parse(product)?),
            }),
            None => Ok(Self {
                vendor_id: parse(s)?,
                product_id: None,
            }),
        }
    }
}

impl TryFrom<String> for UsbIdFilter {
    type Error = HardwareError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UsbIdFilter> for String {
    fn from(filter: UsbIdFilter) -> Self {
        filter.to_string()
    }
}

impl fmt::Display for UsbIdFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.product_id {
            Some(pid) => write!(f, "{:04x}:{:04x}", self.vendor_id, pid),
            None => write!(f, "{:04x}", self.vendor_id),
        }
    }
}
