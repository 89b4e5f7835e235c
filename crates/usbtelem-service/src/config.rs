//! Service configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use usbtelem_core::{
    Error, LineConfig, Result,
    constants::{
        OBSERVER_CHANNEL_CAPACITY, READ_BUFFER_SIZE, READ_INTERVAL_MS, READ_TIMEOUT_MS,
        TELEMETRY_INTERVAL_MS, WRITE_TIMEOUT_MS,
    },
};

/// Timing and sizing of the serial link.
///
/// Every field has a default, so a config file only lists what it changes.
///
/// # Example
///
/// ```
/// use usbtelem_service::ServiceConfig;
/// use std::time::Duration;
///
/// let config: ServiceConfig = serde_json::from_str(r#"{"telemetry_interval_ms": 250}"#).unwrap();
/// assert_eq!(config.telemetry_interval(), Duration::from_millis(250));
/// assert_eq!(config.read_interval(), Duration::from_millis(100));
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Time between two telemetry frames.
    pub telemetry_interval_ms: u64,

    /// Time between two read polls.
    pub read_interval_ms: u64,

    /// Upper bound on a single telemetry write.
    pub write_timeout_ms: u64,

    /// Upper bound on a single read poll.
    pub read_timeout_ms: u64,

    /// Size of the reusable read buffer.
    pub read_buffer_size: usize,

    /// Line parameters applied when a port is opened.
    pub line_config: LineConfig,

    /// Capacity of the observation broadcast channel.
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: TELEMETRY_INTERVAL_MS,
            read_interval_ms: READ_INTERVAL_MS,
            write_timeout_ms: WRITE_TIMEOUT_MS,
            read_timeout_ms: READ_TIMEOUT_MS,
            read_buffer_size: READ_BUFFER_SIZE,
            line_config: LineConfig::DEFAULT,
            event_capacity: OBSERVER_CHANNEL_CAPACITY,
        }
    }
}

impl ServiceConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject values the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first zero-valued field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("telemetry_interval_ms", self.telemetry_interval_ms as usize),
            ("read_interval_ms", self.read_interval_ms as usize),
            ("write_timeout_ms", self.write_timeout_ms as usize),
            ("read_timeout_ms", self.read_timeout_ms as usize),
            ("read_buffer_size", self.read_buffer_size),
            ("event_capacity", self.event_capacity),
            ("line_config.baud_rate", self.line_config.baud_rate as usize),
        ];

        match checks.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(Error::Config(format!("{field} must be greater than zero"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_link_timing() {
        let config = ServiceConfig::default();
        assert_eq!(config.telemetry_interval(), Duration::from_millis(500));
        assert_eq!(config.read_interval(), Duration::from_millis(100));
        assert_eq!(config.write_timeout(), Duration::from_millis(1000));
        assert_eq!(config.read_timeout(), Duration::from_millis(100));
        assert_eq!(config.read_buffer_size, 1024);
        assert_eq!(config.line_config, LineConfig::DEFAULT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_is_default() {
        let config: ServiceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[rstest]
    #[case(r#"{"telemetry_interval_ms": 0}"#, "telemetry_interval_ms")]
    #[case(r#"{"read_interval_ms": 0}"#, "read_interval_ms")]
    #[case(r#"{"write_timeout_ms": 0}"#, "write_timeout_ms")]
    #[case(r#"{"read_timeout_ms": 0}"#, "read_timeout_ms")]
    #[case(r#"{"read_buffer_size": 0}"#, "read_buffer_size")]
    #[case(r#"{"event_capacity": 0}"#, "event_capacity")]
    fn test_validate_rejects_zero(#[case] json: &str, #[case] field: &str) {
        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(field));
    }

    #[test]
    fn test_line_config_from_json() {
        let json = r#"{"line_config": {"baud_rate": 57600, "data_bits": 7, "stop_bits": 2, "parity": "even"}}"#;
        let config: ServiceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.line_config.to_string(), "57600 7E2");
    }
}
