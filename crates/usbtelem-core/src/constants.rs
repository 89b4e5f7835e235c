//! Fixed constants for the serial telemetry link.
//!
//! This module centralizes every timing, framing and sizing value used by the
//! link so the service, the hardware backends and the tests agree on a single
//! source of truth.
//!
//! # Wire Format
//!
//! Telemetry is sent as a single ASCII line:
//!
//! ```text
//! /<quality>/233/199/\r\n
//! ```
//!
//! Where:
//! - `/` - Field delimiter ([`FRAME_DELIMITER`])
//! - `<quality>` - Signed decimal signal quality sampled at send time
//! - `233`, `199` - Reserved placeholder fields ([`FRAME_RESERVED_A`], [`FRAME_RESERVED_B`])
//! - `\r\n` - Line terminator ([`FRAME_TERMINATOR`])
//!
//! # Usage
//!
//! ```
//! use usbtelem_core::constants::*;
//! use std::time::Duration;
//!
//! let tick = Duration::from_millis(TELEMETRY_INTERVAL_MS);
//! assert_eq!(tick.as_millis(), 500);
//! assert_eq!(DEFAULT_BAUD_RATE, 115_200);
//! ```

// ============================================================================
// Line Parameters
// ============================================================================

/// Baud rate applied when a port is opened.
///
/// Framing is fixed at 8 data bits, 1 stop bit, no parity
/// (see `LineConfig::DEFAULT`).
///
/// # Value: 115200
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ============================================================================
// Telemetry Framing
// ============================================================================

/// Field delimiter in a telemetry frame.
pub const FRAME_DELIMITER: char = '/';

/// Line terminator closing every telemetry frame.
pub const FRAME_TERMINATOR: &str = "\r\n";

/// First reserved placeholder field.
///
/// Receivers must accept the value but ignore its meaning.
///
/// # Value: 233
pub const FRAME_RESERVED_A: u16 = 233;

/// Second reserved placeholder field.
///
/// # Value: 199
pub const FRAME_RESERVED_B: u16 = 199;

/// Quality value reported by sources that have no data yet.
///
/// # Value: -1024
pub const NO_SIGNAL_QUALITY: i32 = -1024;

// ============================================================================
// Scheduling
// ============================================================================

/// Interval between two telemetry transmissions (milliseconds).
///
/// # Value: 500ms
pub const TELEMETRY_INTERVAL_MS: u64 = 500;

/// Interval between two inbound polls (milliseconds).
///
/// # Value: 100ms
pub const READ_INTERVAL_MS: u64 = 100;

/// Upper bound on a single telemetry write (milliseconds).
///
/// # Value: 1000ms
pub const WRITE_TIMEOUT_MS: u64 = 1000;

/// Upper bound on a single inbound poll (milliseconds).
///
/// A poll that sees no bytes within this window returns zero bytes,
/// which is a normal outcome.
///
/// # Value: 100ms
pub const READ_TIMEOUT_MS: u64 = 100;

// ============================================================================
// Buffers and Channels
// ============================================================================

/// Capacity of the scratch buffer reused across inbound polls (bytes).
///
/// # Value: 1024 bytes
pub const READ_BUFFER_SIZE: usize = 1024;

/// Capacity of the USB event channel feeding the service.
///
/// # Value: 32 events
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Capacity of the observation broadcast channel.
///
/// Slow observers lag and lose the oldest events; the service never blocks.
///
/// # Value: 64 events
pub const OBSERVER_CHANNEL_CAPACITY: usize = 64;

/// Interval between two enumerations of the polling port monitor (milliseconds).
///
/// # Value: 500ms
pub const MONITOR_POLL_INTERVAL_MS: u64 = 500;
