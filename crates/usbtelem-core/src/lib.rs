//! Core types shared by every `usbtelem` crate.
//!
//! Holds the fixed serial framing constants, the device and line
//! configuration types, the telemetry wire frame, and the service-level
//! error taxonomy.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
