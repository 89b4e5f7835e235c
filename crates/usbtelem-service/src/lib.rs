//! USB serial telemetry link service.
//!
//! Keeps one serial connection to a hot-pluggable USB device, writes a
//! telemetry frame to it every 500 ms, and polls it for inbound text every
//! 100 ms. Devices are opened when they attach (or, at startup, when one is
//! already present and permitted) and closed when they detach.
//!
//! # Modules
//!
//! - [`scheduler`]: timer queue for the two periodic tasks
//! - [`matcher`]: which devices a serial driver claims, and their ports
//! - [`connection`]: open/close lifecycle and tick execution
//! - [`telemetry`] / [`reader`]: the two periodic jobs
//! - [`watcher`]: hot-plug notifications and the startup scan
//! - [`service`]: the run loop tying it together
//!
//! # Example
//!
//! ```
//! use usbtelem_service::{ServiceConfig, ServiceEvent, UsbSerialService};
//! use usbtelem_hardware::mock::MockUsbHost;
//! use usbtelem_hardware::quality::FixedQuality;
//! use usbtelem_core::UsbDevice;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> usbtelem_core::Result<()> {
//! let (host, mock) = MockUsbHost::new();
//! mock.plug_serial(UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740));
//!
//! let mut service = UsbSerialService::new(host, FixedQuality(7), ServiceConfig::default())?;
//! let mut events = service.subscribe();
//!
//! service.start();
//! service.poll();
//!
//! assert!(matches!(events.try_recv(), Ok(ServiceEvent::Opened { .. })));
//! assert_eq!(mock.written_text(), vec!["/7/233/199/\r\n".to_string()]);
//!
//! service.stop();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod events;
pub mod matcher;
pub mod reader;
pub mod scheduler;
pub mod service;
pub mod telemetry;
pub mod watcher;

pub use config::ServiceConfig;
pub use connection::{ConnectionManager, ConnectionState, SerialConnection};
pub use events::ServiceEvent;
pub use matcher::DeviceMatcher;
pub use reader::InboundReader;
pub use scheduler::{Scheduler, Task};
pub use service::{ServiceHandle, UsbSerialService};
pub use telemetry::TelemetryTransmitter;
pub use watcher::{AttachmentWatcher, WatchOutcome};
