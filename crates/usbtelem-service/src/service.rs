//! The link service and its run loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  UsbEvent   ┌──────────────────────────────┐
//! │ Port monitor │────────────►│                              │
//! └──────────────┘   (mpsc)    │   UsbSerialService::run      │──► serial port
//!                              │   select! over:              │
//! ┌──────────────┐  shutdown   │   - shutdown                 │
//! │ ServiceHandle│────────────►│   - hot-plug events          │──► ServiceEvent
//! └──────────────┘  (oneshot)  │   - next scheduler deadline  │    (broadcast)
//!                              └──────────────────────────────┘
//! ```
//!
//! Everything that touches the connection runs inside that one loop, so the
//! connection needs no lock. Blocking port calls are bounded by their
//! timeouts and run inline.

use crate::{
    config::ServiceConfig,
    connection::ConnectionManager,
    events::ServiceEvent,
    watcher::{AttachmentWatcher, WatchOutcome},
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info};
use usbtelem_core::Result;
use usbtelem_hardware::{SignalQualitySource, UsbEvent, UsbHost};

/// USB serial telemetry link.
///
/// # Lifecycle
///
/// 1. Create with a host, a quality source and a [`ServiceConfig`]
/// 2. Optionally [`subscribe`](Self::subscribe) to observe activity
/// 3. Either drive it by hand ([`start`](Self::start),
///    [`handle_event`](Self::handle_event), [`poll`](Self::poll),
///    [`stop`](Self::stop)) or hand it an event channel with
///    [`spawn`](Self::spawn)
///
/// # Examples
///
/// ```
/// use usbtelem_service::{ServiceConfig, UsbSerialService};
/// use usbtelem_hardware::mock::MockUsbHost;
/// use usbtelem_hardware::quality::FixedQuality;
/// use usbtelem_hardware::UsbEvent;
/// use usbtelem_core::UsbDevice;
/// use tokio::sync::mpsc;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> usbtelem_core::Result<()> {
///     let (host, mock) = MockUsbHost::new();
///     let service = UsbSerialService::new(host, FixedQuality(42), ServiceConfig::default())?;
///
///     let (tx, rx) = mpsc::channel(8);
///     let handle = service.spawn(rx);
///
///     let device = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
///     mock.plug_serial(device.clone());
///     tx.send(UsbEvent::Attached(device)).await.unwrap();
///
///     tokio::time::sleep(std::time::Duration::from_millis(50)).await;
///     handle.shutdown().await.unwrap();
///
///     assert_eq!(mock.written_text()[0], "/42/233/199/\r\n");
///     Ok(())
/// }
/// ```
pub struct UsbSerialService<H: UsbHost, Q> {
    connection: ConnectionManager<H, Q>,
    watcher: AttachmentWatcher,
    events: broadcast::Sender<ServiceEvent>,
    started: bool,
}

impl<H, Q> UsbSerialService<H, Q>
where
    H: UsbHost,
    Q: SignalQualitySource,
{
    /// Create a stopped service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](usbtelem_core::Error::Config) if `config`
    /// does not validate.
    pub fn new(host: H, quality: Q, config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.event_capacity);
        let connection = ConnectionManager::new(host, quality, &config, events.clone());

        Ok(Self {
            connection,
            watcher: AttachmentWatcher::new(),
            events,
            started: false,
        })
    }

    /// Receive [`ServiceEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn connection(&self) -> &ConnectionManager<H, Q> {
        &self.connection
    }

    pub fn watcher(&self) -> &AttachmentWatcher {
        &self.watcher
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Start the service: scan for a device that is already permitted.
    ///
    /// Calling `start` on a started service does nothing.
    pub fn start(&mut self) -> WatchOutcome {
        if self.started {
            return WatchOutcome::Ignored;
        }
        self.started = true;
        info!(line = %self.connection.line_config(), "USB serial service started");

        self.watcher.startup_scan(&mut self.connection)
    }

    /// Stop the service: close any connection and cancel its tasks.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        self.connection.close();
        info!("USB serial service stopped");
    }

    /// Handle one hot-plug notification.
    ///
    /// Notifications reaching a stopped service are dropped.
    pub fn handle_event(&mut self, event: UsbEvent) -> WatchOutcome {
        if !self.started {
            debug!(?event, "Event ignored, service stopped");
            return WatchOutcome::Ignored;
        }
        self.watcher.handle_event(&mut self.connection, event)
    }

    /// Run every periodic task that is due. Returns how many ran.
    pub fn poll(&mut self) -> usize {
        self.connection.run_due()
    }

    /// When [`poll`](Self::poll) next has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.connection.next_deadline()
    }

    /// Start, then process events and ticks until shutdown.
    ///
    /// The loop ends when `shutdown` fires (or its sender is dropped) or
    /// when every event sender is gone. The service is stopped and the event
    /// receiver dropped before the service is handed back.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<UsbEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> Self {
        self.start();

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event);
                    }
                    None => {
                        info!("Hot-plug event channel closed");
                        break;
                    }
                },
                _ = wait_until(deadline) => {
                    self.poll();
                }
            }
        }

        self.stop();
        drop(events);
        self
    }
}

impl<H, Q> UsbSerialService<H, Q>
where
    H: UsbHost + 'static,
    H::Port: 'static,
    Q: SignalQualitySource + 'static,
{
    /// Run the service on a new tokio task.
    pub fn spawn(self, events: mpsc::Receiver<UsbEvent>) -> ServiceHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let observers = self.events.clone();

        let task = tokio::spawn(async move {
            self.run(events, shutdown_rx).await;
        });

        ServiceHandle {
            shutdown_tx: Some(shutdown_tx),
            events: observers,
            task,
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned service.
#[derive(Debug)]
pub struct ServiceHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    events: broadcast::Sender<ServiceEvent>,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    /// Receive [`ServiceEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the service and wait for its task to end.
    ///
    /// # Errors
    ///
    /// Returns the join error if the service task panicked.
    pub async fn shutdown(mut self) -> std::result::Result<(), JoinError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        (&mut self.task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use usbtelem_core::{Error, UsbDevice};
    use usbtelem_hardware::mock::MockUsbHost;
    use usbtelem_hardware::quality::FixedQuality;

    fn device() -> UsbDevice {
        UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let (host, _) = MockUsbHost::new();
        let config = ServiceConfig {
            read_buffer_size: 0,
            ..ServiceConfig::default()
        };

        let result = UsbSerialService::new(host, FixedQuality(0), config);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_ignored_until_started() {
        let (host, mock) = MockUsbHost::new();
        let mut service = UsbSerialService::new(host, FixedQuality(0), ServiceConfig::default()).unwrap();
        mock.plug_serial(device());

        let outcome = service.handle_event(UsbEvent::Attached(device()));
        assert!(matches!(outcome, WatchOutcome::Ignored));
        assert!(!service.connection().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let (host, mock) = MockUsbHost::new();
        let mut service = UsbSerialService::new(host, FixedQuality(0), ServiceConfig::default()).unwrap();
        mock.plug_serial(device());

        assert!(matches!(service.start(), WatchOutcome::Opened));
        assert!(matches!(service.start(), WatchOutcome::Ignored));
        assert_eq!(mock.handles_granted(), 1);

        service.stop();
        service.stop();
        assert!(!service.is_started());
        assert!(!service.connection().is_open());
        assert_eq!(mock.ports_closed(), 1);
        assert!(service.next_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_event_channel_closes() {
        let (host, mock) = MockUsbHost::new();
        mock.plug_serial(device());
        let service = UsbSerialService::new(host, FixedQuality(3), ServiceConfig::default()).unwrap();

        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let run = tokio::spawn(service.run(rx, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        drop(tx);
        let service = run.await.unwrap();

        assert!(!service.is_started());
        assert_eq!(mock.open_ports(), 0);
        assert_eq!(mock.write_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_shutdown() {
        let (host, mock) = MockUsbHost::new();
        let service = UsbSerialService::new(host, FixedQuality(3), ServiceConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let handle = service.spawn(rx);

        mock.plug_serial(device());
        tx.send(UsbEvent::Attached(device())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(mock.open_ports(), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(mock.open_ports(), 0);
        assert!(tx.is_closed());
    }
}
