//! Periodic inbound poller.

use std::time::Duration;
use tracing::{debug, trace, warn};
use usbtelem_core::DeviceKey;
use usbtelem_hardware::SerialPortIo;

/// Polls the open port for bytes and decodes them as text.
///
/// The buffer is allocated once and reused on every poll.
#[derive(Debug)]
pub struct InboundReader {
    buffer: Vec<u8>,
    interval: Duration,
    read_timeout: Duration,
    running: bool,
}

impl InboundReader {
    pub fn new(buffer_size: usize, interval: Duration, read_timeout: Duration) -> Self {
        Self {
            buffer: vec![0; buffer_size],
            interval,
            read_timeout,
            running: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Checked before re-arming the next poll.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Read once from `port`.
    ///
    /// Returns the received text, or `None` when nothing arrived in time or
    /// the read failed. Invalid UTF-8 is replaced, not rejected.
    pub fn poll<P: SerialPortIo>(&mut self, port: &mut P, device: &DeviceKey) -> Option<String> {
        match port.read(&mut self.buffer, self.read_timeout) {
            Ok(0) => {
                trace!(device = %device, "No inbound data");
                None
            }
            Ok(n) => {
                let payload = String::from_utf8_lossy(&self.buffer[..n]).into_owned();
                debug!(device = %device, bytes = n, payload = %payload.escape_debug(), "Inbound data");
                Some(payload)
            }
            Err(e) => {
                warn!(device = %device, error = %e, "Serial read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usbtelem_core::UsbDevice;
    use usbtelem_hardware::UsbHost;
    use usbtelem_hardware::mock::{MockFailure, MockSerialPort, MockUsbHost, MockUsbHostHandle};

    fn open_port() -> (MockSerialPort, MockUsbHostHandle) {
        let (mut host, handle) = MockUsbHost::new();
        let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
        handle.plug_serial(device.clone());
        let location = host.probe_drivers().unwrap()[0].port(0).unwrap();
        let mut port = host.create_port(&location).unwrap();
        port.open(host.open_device(&device).unwrap()).unwrap();
        (port, handle)
    }

    fn reader(size: usize) -> InboundReader {
        InboundReader::new(size, Duration::from_millis(100), Duration::from_millis(100))
    }

    fn key() -> DeviceKey {
        DeviceKey::new("/dev/ttyACM0")
    }

    #[test]
    fn test_timeout_yields_nothing() {
        let (mut port, handle) = open_port();
        let mut reader = reader(1024);

        assert_eq!(reader.poll(&mut port, &key()), None);
        assert_eq!(handle.read_calls(), 1);
    }

    #[test]
    fn test_payload_decoded_as_text() {
        let (mut port, handle) = open_port();
        let mut reader = reader(1024);

        handle.push_inbound("RSSI:-67\r\n");
        assert_eq!(reader.poll(&mut port, &key()).as_deref(), Some("RSSI:-67\r\n"));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let (mut port, handle) = open_port();
        let mut reader = reader(1024);

        handle.push_inbound(vec![b'o', b'k', 0xff]);
        assert_eq!(reader.poll(&mut port, &key()).as_deref(), Some("ok\u{fffd}"));
    }

    #[test]
    fn test_buffer_bounds_each_read() {
        let (mut port, handle) = open_port();
        let mut reader = reader(4);
        assert_eq!(reader.buffer_size(), 4);

        handle.push_inbound("abcdefg");
        assert_eq!(reader.poll(&mut port, &key()).as_deref(), Some("abcd"));
        assert_eq!(reader.poll(&mut port, &key()).as_deref(), Some("efg"));
    }

    #[test]
    fn test_read_error_is_swallowed() {
        let (mut port, handle) = open_port();
        let mut reader = reader(1024);

        handle.fail_reads(Some(MockFailure::Io));
        assert_eq!(reader.poll(&mut port, &key()), None);

        handle.fail_reads(None);
        handle.push_inbound("back");
        assert_eq!(reader.poll(&mut port, &key()).as_deref(), Some("back"));
    }
}
