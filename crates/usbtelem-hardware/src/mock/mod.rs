//! Mock USB host for testing and development.
//!
//! This module provides a simulated USB subsystem that can be controlled
//! programmatically without requiring physical hardware: devices are plugged
//! and unplugged through a handle, failures are injected per operation, and
//! everything written to a port is recorded.

pub mod host;
pub mod port;

pub use host::{MockDevice, MockFailure, MockUsbHost, MockUsbHostHandle, WriteRecord};
pub use port::MockSerialPort;
