//! Hardware abstraction layer for the USB serial telemetry link.
//!
//! This crate defines the collaborators the link service talks to but does
//! not implement itself, and provides two backends for them:
//!
//! - [`UsbHost`]: enumerates devices claimed by a serial driver, answers
//!   permission queries, grants connection handles and creates ports.
//! - [`SerialPortIo`]: opens a port over a handle, applies line parameters,
//!   and performs bounded reads and writes.
//! - [`SignalQualitySource`]: the value carried by every telemetry frame.
//!
//! # Backends
//!
//! - [`mock`]: a simulated host controlled through a
//!   [`MockUsbHostHandle`](mock::MockUsbHostHandle). Used by every lifecycle
//!   test and by the CLI's simulation mode.
//! - [`native`]: USB serial ports of the running OS through the `serialport`
//!   crate, with a polling [`monitor`] standing in for hot-plug notifications.
//!
//! [`devices`] wraps both in enums for runtime selection.
//!
//! # Example
//!
//! ```
//! use usbtelem_hardware::mock::MockUsbHost;
//! use usbtelem_hardware::{SerialPortIo, UsbHost};
//! use usbtelem_core::{LineConfig, TelemetryFrame, UsbDevice};
//! use std::time::Duration;
//!
//! # fn main() -> usbtelem_hardware::Result<()> {
//! let (mut host, handle) = MockUsbHost::new();
//! let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
//! handle.plug_serial(device.clone());
//!
//! let location = host.probe_drivers()?[0].port(0).expect("one port");
//! let mut port = host.create_port(&location)?;
//! port.open(host.open_device(&device).expect("permission granted"))?;
//! port.set_parameters(&LineConfig::DEFAULT)?;
//! port.write(&TelemetryFrame::new(7).to_bytes(), Duration::from_secs(1))?;
//! port.close()?;
//!
//! assert_eq!(handle.written_text(), vec!["/7/233/199/\r\n".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod devices;
pub mod error;
pub mod mock;
pub mod monitor;
pub mod native;
pub mod quality;
pub mod traits;
pub mod types;

pub use error::{HardwareError, Result};
pub use traits::{SerialPortIo, SignalQualitySource, UsbHost};
pub use types::{DeviceHandle, PortLocation, SerialDriver, UsbEvent, UsbIdFilter};
