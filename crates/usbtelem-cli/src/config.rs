//! Command-line arguments and the optional JSON config file.

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use usbtelem_hardware::UsbIdFilter;
use usbtelem_hardware::monitor::MonitorConfig;
use usbtelem_service::ServiceConfig;

#[derive(Debug, Parser)]
#[command(name = "usbtelem")]
#[command(about = "Stream link-quality telemetry to a USB serial device", version)]
pub struct Args {
    /// JSON config file (service and monitor sections)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Fixed signal quality to send in every frame
    #[arg(short, long, conflicts_with = "quality_file", allow_hyphen_values = true)]
    pub quality: Option<i32>,

    /// File holding the current signal quality, re-read on every frame
    #[arg(long)]
    pub quality_file: Option<PathBuf>,

    /// Only use devices matching vvvv or vvvv:pppp (hex); repeatable
    #[arg(short, long = "device")]
    pub devices: Vec<UsbIdFilter>,

    /// Hot-plug polling interval in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Run against a simulated device instead of real hardware
    #[arg(long)]
    pub simulate: bool,
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub service: ServiceConfig,
    pub monitor: MonitorConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load the file named by `args`, if any, then apply flag overrides.
    pub fn resolve(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(interval) = args.poll_interval_ms {
            config.monitor.poll_interval_ms = interval;
        }
        if !args.devices.is_empty() {
            config.monitor.vendor_filter = args.devices.clone();
        }

        if config.monitor.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        config.service.validate()?;
        Ok(config)
    }
}
