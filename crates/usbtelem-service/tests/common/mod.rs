//! Shared fixtures for the service integration tests.
//!
//! Every fixture runs against the mock USB host; tests keep the
//! [`MockUsbHostHandle`] to plug devices and inspect what reached the port.

#![allow(dead_code)]

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use usbtelem_core::UsbDevice;
use usbtelem_hardware::UsbEvent;
use usbtelem_hardware::mock::{MockUsbHost, MockUsbHostHandle};
use usbtelem_hardware::quality::SharedQuality;
use usbtelem_service::{ServiceConfig, ServiceEvent, ServiceHandle, UsbSerialService};

pub type TestService = UsbSerialService<MockUsbHost, SharedQuality>;

/// A flight controller style CDC-ACM device.
pub fn device(key: &str) -> UsbDevice {
    UsbDevice::new(key, 0x0483, 0x5740).with_product("Test FC")
}

/// Service driven by hand (no run loop).
pub fn manual_service() -> (TestService, MockUsbHostHandle, SharedQuality) {
    let (host, mock) = MockUsbHost::new();
    let quality = SharedQuality::new();
    let service = UsbSerialService::new(host, quality.clone(), ServiceConfig::default())
        .expect("default config is valid");
    (service, mock, quality)
}

/// A service running on its own task.
pub struct Running {
    pub tx: mpsc::Sender<UsbEvent>,
    pub mock: MockUsbHostHandle,
    pub quality: SharedQuality,
    pub events: broadcast::Receiver<ServiceEvent>,
    pub handle: ServiceHandle,
}

/// Spawn a service. Devices plugged into the mock beforehand by `setup`
/// are visible to the startup scan.
pub fn spawn_service(setup: impl FnOnce(&MockUsbHostHandle)) -> Running {
    let (service, mock, quality) = manual_service();
    setup(&mock);

    let events = service.subscribe();
    let (tx, rx) = mpsc::channel(usbtelem_core::constants::EVENT_CHANNEL_CAPACITY);
    let handle = service.spawn(rx);

    Running {
        tx,
        mock,
        quality,
        events,
        handle,
    }
}

impl Running {
    pub async fn attach(&self, device: &UsbDevice) {
        self.mock.plug_serial(device.clone());
        self.tx
            .send(UsbEvent::Attached(device.clone()))
            .await
            .expect("service is running");
        settle().await;
    }

    pub async fn detach(&self, device: &UsbDevice) {
        self.mock.unplug(device);
        self.tx
            .send(UsbEvent::Detached(device.clone()))
            .await
            .expect("service is running");
        settle().await;
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<ServiceEvent> {
        std::iter::from_fn(|| self.events.try_recv().ok()).collect()
    }
}

/// Let the service task process everything already queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
