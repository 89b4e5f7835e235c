//! Polling hot-plug monitor.
//!
//! `serialport` has no attach/detach notifications, so the monitor takes a
//! snapshot of the USB serial devices every poll interval, diffs it against
//! the previous one, and sends [`UsbEvent`]s into the service channel.
//!
//! The enumerator is a closure so tests can drive the monitor from a fake
//! device list; [`native_monitor`] wires it to [`crate::native::usb_devices`].

use crate::{
    Result,
    native,
    types::{UsbEvent, UsbIdFilter},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use usbtelem_core::{UsbDevice, constants::MONITOR_POLL_INTERVAL_MS};

/// Port monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between two port list snapshots.
    pub poll_interval_ms: u64,

    /// Only report devices admitted by these filters (empty = all).
    pub vendor_filter: Vec<UsbIdFilter>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: MONITOR_POLL_INTERVAL_MS,
            vendor_filter: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Events turning the `old` snapshot into the `new` one.
///
/// Detaches come first, in `old` order, then attaches in `new` order. A
/// device present in both snapshots produces nothing. An adapter swapped
/// for another at the same path between two polls is reported as a detach
/// of the old one followed by an attach of the new one.
pub fn diff_snapshots(old: &[UsbDevice], new: &[UsbDevice]) -> Vec<UsbEvent> {
    let unchanged = |device: &UsbDevice, other: &[UsbDevice]| {
        other.iter().any(|d| d == device && d.same_hardware(device))
    };

    let detached = old
        .iter()
        .filter(|device| !unchanged(device, new))
        .cloned()
        .map(UsbEvent::Detached);
    let attached = new
        .iter()
        .filter(|device| !unchanged(device, old))
        .cloned()
        .map(UsbEvent::Attached);

    detached.chain(attached).collect()
}

/// Polling monitor over a device enumerator.
pub struct PortMonitor<F> {
    enumerate: F,
    poll_interval: Duration,
}

impl<F> PortMonitor<F>
where
    F: FnMut() -> Result<Vec<UsbDevice>> + Send + 'static,
{
    pub fn new(poll_interval: Duration, enumerate: F) -> Self {
        Self {
            enumerate,
            poll_interval,
        }
    }

    /// Start polling, sending events into `tx`.
    ///
    /// The first snapshot is taken before this returns and is not reported:
    /// devices already present are the startup scan's business. Polling
    /// stops when [`MonitorHandle::stop`] is called or `tx`'s receiver is
    /// dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(mut self, tx: mpsc::Sender<UsbEvent>) -> MonitorHandle {
        let mut known = (self.enumerate)().unwrap_or_else(|e| {
            warn!(error = %e, "Initial port enumeration failed");
            Vec::new()
        });
        debug!(devices = known.len(), "Port monitor initial snapshot");

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            info!(interval_ms = poll_interval.as_millis() as u64, "Port monitor started");

            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {
                        let current = match (self.enumerate)() {
                            Ok(devices) => devices,
                            Err(e) => {
                                warn!(error = %e, "Port enumeration failed");
                                continue;
                            }
                        };

                        for event in diff_snapshots(&known, &current) {
                            debug!(?event, "Port change detected");
                            if tx.send(event).await.is_err() {
                                debug!("Event receiver dropped, port monitor exiting");
                                return;
                            }
                        }
                        known = current;
                    }
                }
            }

            info!("Port monitor stopped");
        });

        MonitorHandle {
            stop_tx: Some(stop_tx),
            task,
        }
    }
}

/// Port monitor over the native backend's USB port list.
pub fn native_monitor(
    config: &MonitorConfig,
) -> PortMonitor<impl FnMut() -> Result<Vec<UsbDevice>> + Send + 'static> {
    let filters = config.vendor_filter.clone();
    PortMonitor::new(config.poll_interval(), move || native::usb_devices(&filters))
}

/// Handle to a running port monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop polling and wait for the monitor task to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, "Port monitor task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
