//! Mock serial port created by [`MockUsbHost`](super::MockUsbHost).

use crate::{
    Result,
    error::HardwareError,
    mock::host::{SharedState, WriteRecord, lock},
    traits::SerialPortIo,
    types::{DeviceHandle, PortLocation},
};
use std::time::Duration;
use usbtelem_core::LineConfig;

/// Serial port backed by the shared mock host state.
#[derive(Debug)]
pub struct MockSerialPort {
    state: SharedState,
    location: PortLocation,
    handle: Option<DeviceHandle>,
}

impl MockSerialPort {
    pub(crate) fn new(state: SharedState, location: PortLocation) -> Self {
        Self {
            state,
            location,
            handle: None,
        }
    }

    /// Where this port lives.
    pub fn location(&self) -> &PortLocation {
        &self.location
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.handle.is_none() {
            return Err(HardwareError::communication("Port is not open"));
        }
        if !lock(&self.state).is_plugged(&self.location.device.key) {
            return Err(HardwareError::disconnected(self.location.device.key.as_str()));
        }
        Ok(())
    }
}

impl SerialPortIo for MockSerialPort {
    fn open(&mut self, handle: DeviceHandle) -> Result<()> {
        if self.handle.is_some() {
            return Err(HardwareError::communication("Port already open"));
        }

        let mut state = lock(&self.state);
        let key = &self.location.device.key;
        if state
            .devices
            .iter()
            .any(|d| d.device.key == *key && d.refuse_port)
        {
            return Err(HardwareError::permission_denied(key.as_str()));
        }
        if state.open_failure {
            return Err(HardwareError::communication(format!(
                "Driver could not claim {}",
                self.location
            )));
        }
        state.ports_opened += 1;
        drop(state);

        self.handle = Some(handle);
        Ok(())
    }

    fn set_parameters(&mut self, config: &LineConfig) -> Result<()> {
        self.ensure_usable()?;

        let mut state = lock(&self.state);
        if state.parameters_failure {
            return Err(HardwareError::configuration(format!(
                "Device rejected {config}"
            )));
        }
        state.applied.push(*config);
        Ok(())
    }

    fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        lock(&self.state).write_attempts += 1;
        self.ensure_usable()?;

        let mut state = lock(&self.state);
        if let Some(failure) = state.write_failure {
            return Err(failure.to_error(timeout.as_millis() as u64));
        }
        state.writes.push(WriteRecord {
            device: self.location.device.key.clone(),
            data: data.to_vec(),
        });
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        lock(&self.state).read_calls += 1;
        self.ensure_usable()?;

        let mut state = lock(&self.state);
        if let Some(failure) = state.read_failure {
            return Err(failure.to_error(timeout.as_millis() as u64));
        }
        let Some(mut chunk) = state.inbound.pop_front() else {
            return Ok(0);
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        if self.handle.take().is_none() {
            return Ok(());
        }

        let mut state = lock(&self.state);
        state.ports_closed += 1;
        if state.close_failure {
            return Err(HardwareError::communication(format!(
                "Driver reported an error releasing {}",
                self.location
            )));
        }
        Ok(())
    }
}
