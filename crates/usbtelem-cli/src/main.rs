//! `usbtelem`: run the USB serial telemetry link on this machine.
//!
//! Watches for USB serial adapters, keeps one of them open, and streams
//! `/<quality>/233/199/` frames to it. Inbound text is logged.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, FileConfig};
use std::path::Path;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use usbtelem_core::UsbDevice;
use usbtelem_core::constants::{EVENT_CHANNEL_CAPACITY, NO_SIGNAL_QUALITY};
use usbtelem_hardware::devices::AnyUsbHost;
use usbtelem_hardware::mock::{MockUsbHost, MockUsbHostHandle};
use usbtelem_hardware::monitor::native_monitor;
use usbtelem_hardware::native::NativeUsbHost;
use usbtelem_service::{ServiceEvent, UsbSerialService};

type QualitySource = Box<dyn FnMut() -> i32 + Send>;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = FileConfig::resolve(&args)?;
    debug!(?config, "Configuration loaded");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(args, config))
}

fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .with_context(|| format!("Invalid log level {default_level:?}"))?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn quality_source(args: &Args) -> QualitySource {
    match (&args.quality, &args.quality_file) {
        (Some(value), _) => {
            let value = *value;
            Box::new(move || value)
        }
        (None, Some(path)) => {
            let path = path.clone();
            Box::new(move || read_quality(&path))
        }
        (None, None) => Box::new(|| NO_SIGNAL_QUALITY),
    }
}

fn read_quality(path: &Path) -> i32 {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse().unwrap_or_else(|e| {
            debug!(path = %path.display(), error = %e, "Quality file does not hold an integer");
            NO_SIGNAL_QUALITY
        }),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Quality file unreadable");
            NO_SIGNAL_QUALITY
        }
    }
}

async fn run(args: Args, config: FileConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let (host, simulation) = if args.simulate {
        let (host, mock) = MockUsbHost::new();
        mock.plug_serial(
            UsbDevice::new("sim0", 0x1209, 0x0001).with_product("Simulated telemetry sink"),
        );
        info!("Simulation mode: one virtual device attached");
        (AnyUsbHost::Mock(host), Some(mock))
    } else {
        let host = NativeUsbHost::with_filters(config.monitor.vendor_filter.clone());
        (AnyUsbHost::Native(host), None)
    };

    let service = UsbSerialService::new(host, quality_source(&args), config.service.clone())?;
    let observer = tokio::spawn(log_events(service.subscribe()));

    let simulator = simulation.map(|mock| tokio::spawn(simulate_device(mock)));
    let monitor = (!args.simulate).then(|| native_monitor(&config.monitor).spawn(tx.clone()));
    let handle = service.spawn(rx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down");

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }
    drop(tx);
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Service task ended abnormally");
    }
    observer.abort();
    if let Some(simulator) = simulator {
        simulator.abort();
    }

    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<ServiceEvent>) {
    loop {
        match events.recv().await {
            Ok(event @ ServiceEvent::TelemetrySent { .. }) => debug!(%event),
            Ok(event) => info!(%event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event observer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Play the simulated device: acknowledge received frames once a second.
async fn simulate_device(mock: MockUsbHostHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let frames = mock.writes().len();
        mock.reset_counters();
        if frames > 0 {
            mock.push_inbound(format!("ACK {frames}\r\n"));
        }
    }
}
