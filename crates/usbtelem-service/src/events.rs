//! Observation stream of link activity.
//!
//! The service publishes these on a broadcast channel so a host UI, a logger
//! or a test can watch the link without touching it. Nothing here reports
//! errors; failures only show up in the logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use usbtelem_core::{LineConfig, TelemetryFrame, UsbDevice};

/// Something observable happened on the link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ServiceEvent {
    /// A connection was opened and configured.
    Opened {
        device: UsbDevice,
        line_config: LineConfig,
    },

    /// The connection was closed (explicitly, by detach, or on stop).
    Closed { device: UsbDevice },

    /// A telemetry frame was fully written.
    TelemetrySent { frame: TelemetryFrame },

    /// Bytes arrived from the device.
    DataReceived {
        payload: String,
        received_at: DateTime<Utc>,
    },
}

impl ServiceEvent {
    pub(crate) fn data_received(payload: String) -> Self {
        Self::DataReceived {
            payload,
            received_at: Utc::now(),
        }
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened {
                device,
                line_config,
            } => write!(f, "opened {device} at {line_config}"),
            Self::Closed { device } => write!(f, "closed {device}"),
            Self::TelemetrySent { frame } => write!(f, "sent {}", frame.to_string().trim_end()),
            Self::DataReceived {
                payload,
                received_at,
            } => write!(f, "received {payload:?} at {}", received_at.format("%H:%M:%S%.3f")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
        let opened = ServiceEvent::Opened {
            device: device.clone(),
            line_config: LineConfig::DEFAULT,
        };
        assert_eq!(
            opened.to_string(),
            "opened /dev/ttyACM0 [0483:5740] at 115200 8N1"
        );

        let sent = ServiceEvent::TelemetrySent {
            frame: TelemetryFrame::new(42),
        };
        assert_eq!(sent.to_string(), "sent /42/233/199/");
    }

    #[test]
    fn test_serialize_tagged() {
        let event = ServiceEvent::TelemetrySent {
            frame: TelemetryFrame::new(7),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "telemetry_sent");
        assert_eq!(json["frame"]["quality"], 7);
    }

    #[test]
    fn test_data_received_timestamp() {
        let before = Utc::now();
        let event = ServiceEvent::data_received("OK".to_string());
        let ServiceEvent::DataReceived {
            payload,
            received_at,
        } = event
        else {
            panic!("expected DataReceived");
        };
        assert_eq!(payload, "OK");
        assert!(received_at >= before);
    }
}
