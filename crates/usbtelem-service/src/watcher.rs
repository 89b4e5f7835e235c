//! Attach/detach handling and the startup scan.

use crate::connection::ConnectionManager;
use tracing::{debug, info, warn};
use usbtelem_core::{Error, UsbDevice};
use usbtelem_hardware::{SignalQualitySource, UsbEvent, UsbHost};

/// What handling one notification did.
#[derive(Debug)]
pub enum WatchOutcome {
    /// A connection was opened.
    Opened,

    /// The device is supported but opening it failed.
    Rejected(Error),

    /// No serial driver claims the device.
    Filtered,

    /// The open connection belonged to the detached device and was closed.
    Closed,

    /// Nothing to do.
    Ignored,
}

/// Turns hot-plug notifications into connection manager calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentWatcher {
    attached: u64,
    detached: u64,
}

impl AttachmentWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach notifications handled so far.
    pub fn attached(&self) -> u64 {
        self.attached
    }

    /// Detach notifications handled so far.
    pub fn detached(&self) -> u64 {
        self.detached
    }

    pub fn handle_event<H, Q>(
        &mut self,
        connection: &mut ConnectionManager<H, Q>,
        event: UsbEvent,
    ) -> WatchOutcome
    where
        H: UsbHost,
        Q: SignalQualitySource,
    {
        match event {
            UsbEvent::Attached(device) => {
                self.attached += 1;
                self.on_attached(connection, &device)
            }
            UsbEvent::Detached(device) => {
                self.detached += 1;
                if connection.detach_matches(&device) {
                    info!(device = %device.key, "Open device detached");
                    WatchOutcome::Closed
                } else {
                    WatchOutcome::Ignored
                }
            }
        }
    }

    fn on_attached<H, Q>(
        &mut self,
        connection: &mut ConnectionManager<H, Q>,
        device: &UsbDevice,
    ) -> WatchOutcome
    where
        H: UsbHost,
        Q: SignalQualitySource,
    {
        if !connection.matcher().is_supported(device) {
            debug!(device = %device, "Attached device has no serial driver");
            return WatchOutcome::Filtered;
        }

        info!(device = %device, "Serial device attached");
        open(connection, device)
    }

    /// Open the first already-permitted serial device, if any.
    ///
    /// Later candidates are not tried, even when opening the first fails.
    pub fn startup_scan<H, Q>(&mut self, connection: &mut ConnectionManager<H, Q>) -> WatchOutcome
    where
        H: UsbHost,
        Q: SignalQualitySource,
    {
        let candidate = connection
            .matcher()
            .drivers()
            .into_iter()
            .map(|driver| driver.device)
            .find(|device| connection.host().has_permission(device));

        match candidate {
            Some(device) => {
                info!(device = %device, "Previously connected device found");
                open(connection, &device)
            }
            None => {
                debug!("No permitted serial device present at startup");
                WatchOutcome::Ignored
            }
        }
    }
}

fn open<H, Q>(connection: &mut ConnectionManager<H, Q>, device: &UsbDevice) -> WatchOutcome
where
    H: UsbHost,
    Q: SignalQualitySource,
{
    match connection.open_device(device) {
        Ok(()) => WatchOutcome::Opened,
        Err(e @ Error::AlreadyOpen { .. }) => {
            debug!(device = %device.key, error = %e, "Open ignored");
            WatchOutcome::Rejected(e)
        }
        Err(e) => {
            warn!(device = %device.key, error = %e, "Failed to open serial device");
            WatchOutcome::Rejected(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use tokio::sync::broadcast;
    use usbtelem_hardware::mock::{MockDevice, MockUsbHost, MockUsbHostHandle};
    use usbtelem_hardware::quality::FixedQuality;

    type Manager = ConnectionManager<MockUsbHost, FixedQuality>;

    fn device(key: &str) -> UsbDevice {
        UsbDevice::new(key, 0x0483, 0x5740)
    }

    fn setup() -> (AttachmentWatcher, Manager, MockUsbHostHandle) {
        let (host, handle) = MockUsbHost::new();
        let (tx, _) = broadcast::channel(16);
        let manager = ConnectionManager::new(host, FixedQuality(0), &ServiceConfig::default(), tx);
        (AttachmentWatcher::new(), manager, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_opens_supported_device() {
        let (mut watcher, mut manager, handle) = setup();
        let dev = device("/dev/ttyACM0");
        handle.plug_serial(dev.clone());

        let outcome = watcher.handle_event(&mut manager, UsbEvent::Attached(dev.clone()));
        assert!(matches!(outcome, WatchOutcome::Opened));
        assert_eq!(manager.open_device_info(), Some(&dev));
        assert_eq!(watcher.attached(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_filters_unsupported_device() {
        let (mut watcher, mut manager, handle) = setup();
        let stick = device("/dev/sda");
        handle.plug(MockDevice::unsupported(stick.clone()));

        let outcome = watcher.handle_event(&mut manager, UsbEvent::Attached(stick));
        assert!(matches!(outcome, WatchOutcome::Filtered));
        assert!(!manager.is_open());
        assert_eq!(handle.handles_granted(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attach_rejected() {
        let (mut watcher, mut manager, handle) = setup();
        let a = device("/dev/ttyACM0");
        let b = device("/dev/ttyACM1");
        handle.plug_serial(a.clone());
        handle.plug_serial(b.clone());

        watcher.handle_event(&mut manager, UsbEvent::Attached(a.clone()));
        let outcome = watcher.handle_event(&mut manager, UsbEvent::Attached(b));

        assert!(matches!(
            outcome,
            WatchOutcome::Rejected(Error::AlreadyOpen { .. })
        ));
        assert_eq!(manager.open_device_info(), Some(&a));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_closes_only_matching_device() {
        let (mut watcher, mut manager, handle) = setup();
        let a = device("/dev/ttyACM0");
        handle.plug_serial(a.clone());
        watcher.handle_event(&mut manager, UsbEvent::Attached(a.clone()));

        let other = watcher.handle_event(&mut manager, UsbEvent::Detached(device("/dev/ttyACM5")));
        assert!(matches!(other, WatchOutcome::Ignored));
        assert!(manager.is_open());

        handle.unplug(&a);
        let outcome = watcher.handle_event(&mut manager, UsbEvent::Detached(a));
        assert!(matches!(outcome, WatchOutcome::Closed));
        assert!(!manager.is_open());
        assert_eq!(watcher.detached(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_scan_first_permitted_wins() {
        let (mut watcher, mut manager, handle) = setup();
        let locked = device("/dev/ttyACM0");
        let first = device("/dev/ttyACM1");
        let second = device("/dev/ttyACM2");
        handle.plug(MockDevice::serial(locked).without_permission());
        handle.plug_serial(first.clone());
        handle.plug_serial(second);

        let outcome = watcher.startup_scan(&mut manager);
        assert!(matches!(outcome, WatchOutcome::Opened));
        assert_eq!(manager.open_device_info(), Some(&first));
        assert_eq!(handle.handles_granted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_scan_without_permitted_device() {
        let (mut watcher, mut manager, handle) = setup();
        handle.plug(MockDevice::serial(device("/dev/ttyACM0")).without_permission());

        assert!(matches!(
            watcher.startup_scan(&mut manager),
            WatchOutcome::Ignored
        ));
        assert!(!manager.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_scan_does_not_try_second_candidate() {
        let (mut watcher, mut manager, handle) = setup();
        handle.plug(MockDevice::serial(device("/dev/ttyACM0")).deny_open());
        handle.plug_serial(device("/dev/ttyACM1"));

        let outcome = watcher.startup_scan(&mut manager);
        assert!(matches!(
            outcome,
            WatchOutcome::Rejected(Error::PermissionDenied { .. })
        ));
        assert!(!manager.is_open());
    }
}
