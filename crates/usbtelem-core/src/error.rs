use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Lifecycle errors
    #[error("Permission denied for device {device}")]
    PermissionDenied { device: String },

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("Device {device} has no serial port")]
    NoSerialPort { device: String },

    #[error("Connection already open to {device}")]
    AlreadyOpen { device: String },

    // Port errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    // Frame errors
    #[error("Invalid telemetry frame: {0}")]
    InvalidFrame(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error leaves the periodic schedule running.
    ///
    /// Only per-tick I/O failures qualify; lifecycle failures leave the
    /// connection closed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::WriteTimeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_display() {
        let error = Error::PermissionDenied {
            device: "/dev/ttyACM0".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Permission denied for device /dev/ttyACM0"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::TransientIo("broken pipe".into()).is_transient());
        assert!(Error::WriteTimeout(1000).is_transient());
        assert!(!Error::Configuration("parity".into()).is_transient());
        assert!(!Error::AlreadyOpen { device: "a".into() }.is_transient());
    }
}
