//! Periodic telemetry frame writer.

use std::time::Duration;
use tracing::{trace, warn};
use usbtelem_core::{DeviceKey, Error, Result, TelemetryFrame};
use usbtelem_hardware::{HardwareError, SerialPortIo, SignalQualitySource};

/// Samples the quality source and writes one frame per tick.
///
/// The transmitter owns no port: the connection manager lends it the open
/// port for the duration of a tick. Failures are logged and swallowed so the
/// schedule keeps going.
#[derive(Debug)]
pub struct TelemetryTransmitter<Q> {
    source: Q,
    interval: Duration,
    write_timeout: Duration,
    running: bool,
}

impl<Q: SignalQualitySource> TelemetryTransmitter<Q> {
    pub fn new(source: Q, interval: Duration, write_timeout: Duration) -> Self {
        Self {
            source,
            interval,
            write_timeout,
            running: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Whether the next tick should be scheduled.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Sample, format and write one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WriteTimeout`] when the port times out and
    /// [`Error::TransientIo`] on any other write failure or a short write.
    pub fn send<P: SerialPortIo>(&mut self, port: &mut P) -> Result<TelemetryFrame> {
        let frame = TelemetryFrame::new(self.source.signal_quality());
        let bytes = frame.to_bytes();

        let written = port.write(&bytes, self.write_timeout).map_err(|e| match e {
            HardwareError::Timeout { duration_ms } => Error::WriteTimeout(duration_ms),
            other => Error::TransientIo(other.to_string()),
        })?;

        if written != bytes.len() {
            return Err(Error::TransientIo(format!(
                "short write: {written} of {} bytes",
                bytes.len()
            )));
        }
        Ok(frame)
    }

    /// Run one tick against `port`, logging any failure.
    ///
    /// Returns the frame when it was written completely.
    pub fn tick<P: SerialPortIo>(&mut self, port: &mut P, device: &DeviceKey) -> Option<TelemetryFrame> {
        match self.send(port) {
            Ok(frame) => {
                trace!(device = %device, quality = frame.quality(), "Telemetry frame sent");
                Some(frame)
            }
            Err(e) => {
                warn!(device = %device, error = %e, "Telemetry write failed");
                None
            }
        }
    }
}
