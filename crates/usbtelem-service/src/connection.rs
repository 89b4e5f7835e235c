//! Connection lifecycle.
//!
//! The [`ConnectionManager`] owns the host, at most one open
//! [`SerialConnection`], and the two periodic tasks that use it.
//!
//! # States
//!
//! - `Closed`: no port held, no periodic task scheduled.
//! - `Open`: one port held, configured, with telemetry and read ticks
//!   scheduled.
//!
//! # Transitions
//!
//! - Closed → Open: [`open_device`](ConnectionManager::open_device) succeeds.
//! - Open → Closed: [`close`](ConnectionManager::close), or
//!   [`detach_matches`](ConnectionManager::detach_matches) with the open
//!   device.
//!
//! Closing cancels both periodic tasks before the port is released, so no
//! tick can reach a released port.

use crate::{
    config::ServiceConfig,
    events::ServiceEvent,
    matcher::DeviceMatcher,
    reader::InboundReader,
    scheduler::{Scheduler, Task},
    telemetry::TelemetryTransmitter,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use usbtelem_core::{Error, LineConfig, Result, UsbDevice};
use usbtelem_hardware::{HardwareError, PortLocation, SerialPortIo, SignalQualitySource, UsbHost};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Closed,
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
        }
    }
}

/// The open channel to a device.
#[derive(Debug)]
pub struct SerialConnection<P> {
    pub device: UsbDevice,
    pub location: PortLocation,
    pub line_config: LineConfig,
    port: P,
}

/// Owns the host, the open connection and its periodic tasks.
pub struct ConnectionManager<H: UsbHost, Q> {
    host: H,
    connection: Option<SerialConnection<H::Port>>,
    scheduler: Scheduler,
    transmitter: TelemetryTransmitter<Q>,
    reader: InboundReader,
    line_config: LineConfig,
    events: broadcast::Sender<ServiceEvent>,
}

impl<H, Q> ConnectionManager<H, Q>
where
    H: UsbHost,
    Q: SignalQualitySource,
{
    pub fn new(
        host: H,
        quality: Q,
        config: &ServiceConfig,
        events: broadcast::Sender<ServiceEvent>,
    ) -> Self {
        Self {
            host,
            connection: None,
            scheduler: Scheduler::new(),
            transmitter: TelemetryTransmitter::new(
                quality,
                config.telemetry_interval(),
                config.write_timeout(),
            ),
            reader: InboundReader::new(
                config.read_buffer_size,
                config.read_interval(),
                config.read_timeout(),
            ),
            line_config: config.line_config,
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Device of the open connection.
    pub fn open_device_info(&self) -> Option<&UsbDevice> {
        self.connection.as_ref().map(|c| &c.device)
    }

    /// Line parameters applied to new connections.
    pub fn line_config(&self) -> LineConfig {
        self.line_config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn matcher(&self) -> DeviceMatcher<'_, H> {
        DeviceMatcher::new(&self.host)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Open a serial connection to `device` and start the periodic tasks.
    ///
    /// On failure nothing stays acquired and the state remains `Closed`.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyOpen`] if a connection is already open
    /// - [`Error::UnsupportedDevice`] if no serial driver claims the device
    /// - [`Error::NoSerialPort`] if the driver exposes no port
    /// - [`Error::PermissionDenied`] if the host refuses a connection handle
    ///   or the driver refuses the port
    /// - [`Error::Configuration`] if the port cannot be opened or configured
    pub fn open_device(&mut self, device: &UsbDevice) -> Result<()> {
        if let Some(open) = &self.connection {
            return Err(Error::AlreadyOpen {
                device: open.device.key.to_string(),
            });
        }

        let driver = self
            .matcher()
            .driver_for(device)
            .ok_or_else(|| Error::UnsupportedDevice(device.to_string()))?;
        let location = driver.port(0).ok_or_else(|| Error::NoSerialPort {
            device: device.key.to_string(),
        })?;

        let handle = self
            .host
            .open_device(device)
            .ok_or_else(|| Error::PermissionDenied {
                device: device.key.to_string(),
            })?;

        let mut port = self
            .host
            .create_port(&location)
            .map_err(|e| Error::Configuration(format!("{location}: {e}")))?;

        if let Err(e) = port.open(handle) {
            release(&mut port, &location);
            return Err(match e {
                HardwareError::PermissionDenied { .. } => Error::PermissionDenied {
                    device: device.key.to_string(),
                },
                e => Error::Configuration(format!("{location}: {e}")),
            });
        }
        if let Err(e) = port.set_parameters(&self.line_config) {
            release(&mut port, &location);
            return Err(Error::Configuration(format!("{location}: {e}")));
        }

        info!(
            device = %device.key,
            usb_id = %device.usb_id(),
            port = %location,
            line = %self.line_config,
            "Serial connection opened"
        );

        self.connection = Some(SerialConnection {
            device: device.clone(),
            location,
            line_config: self.line_config,
            port,
        });

        self.transmitter.start();
        self.reader.start();
        self.scheduler.post(Task::Telemetry);
        self.scheduler.post(Task::Read);

        self.publish(ServiceEvent::Opened {
            device: device.clone(),
            line_config: self.line_config,
        });
        Ok(())
    }

    /// Stop both periodic tasks, then release the port.
    ///
    /// Returns the device that was closed, or `None` if nothing was open.
    /// A release failure is logged; the connection is dropped regardless.
    pub fn close(&mut self) -> Option<UsbDevice> {
        self.transmitter.stop();
        self.reader.stop();
        self.scheduler.cancel(Task::Telemetry);
        self.scheduler.cancel(Task::Read);

        let mut connection = self.connection.take()?;
        release(&mut connection.port, &connection.location);
        info!(device = %connection.device.key, "Serial connection closed");

        self.publish(ServiceEvent::Closed {
            device: connection.device.clone(),
        });
        Some(connection.device)
    }

    /// Close the connection if it belongs to `device`.
    ///
    /// Returns whether a connection was closed.
    pub fn detach_matches(&mut self, device: &UsbDevice) -> bool {
        let matches = match self.open_device_info() {
            Some(open) if open == device => true,
            Some(open) => {
                debug!(detached = %device.key, open = %open.key, "Detach of another device ignored");
                false
            }
            None => false,
        };
        matches && self.close().is_some()
    }

    /// When the next periodic task is due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run every task due at or before now.
    ///
    /// Returns the number of tasks run.
    pub fn run_due(&mut self) -> usize {
        let now = Instant::now();
        let mut ran = 0;

        while let Some(task) = self.scheduler.pop_due(now) {
            match task {
                Task::Telemetry => self.telemetry_tick(),
                Task::Read => self.read_tick(),
            }
            ran += 1;
        }
        ran
    }

    fn telemetry_tick(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if let Some(frame) = self
            .transmitter
            .tick(&mut connection.port, &connection.device.key)
        {
            self.publish(ServiceEvent::TelemetrySent { frame });
        }

        if self.transmitter.is_running() {
            let interval = self.transmitter.interval();
            self.scheduler.post_delayed(Task::Telemetry, interval);
        }
    }

    fn read_tick(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if let Some(payload) = self.reader.poll(&mut connection.port, &connection.device.key) {
            self.publish(ServiceEvent::data_received(payload));
        }

        if self.reader.is_running() {
            let interval = self.reader.interval();
            self.scheduler.post_delayed(Task::Read, interval);
        }
    }

    fn publish(&self, event: ServiceEvent) {
        // No subscribers is normal.
        let _ = self.events.send(event);
    }
}

impl<H, Q> fmt::Debug for ConnectionManager<H, Q>
where
    H: UsbHost,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("device", &self.connection.as_ref().map(|c| &c.device.key))
            .field("scheduled", &self.scheduler.len())
            .field("line_config", &self.line_config)
            .finish()
    }
}

fn release<P: SerialPortIo>(port: &mut P, location: &PortLocation) {
    if let Err(e) = port.close() {
        warn!(port = %location, error = %e, "Port release failed");
    }
}
