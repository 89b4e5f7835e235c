//! Ready-made signal-quality sources.

use crate::traits::SignalQualitySource;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use usbtelem_core::constants::NO_SIGNAL_QUALITY;

/// Source that always reports the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedQuality(pub i32);

impl SignalQualitySource for FixedQuality {
    fn signal_quality(&mut self) -> i32 {
        self.0
    }
}

/// Quality value shared with another thread.
///
/// The producer (a radio link, a test) keeps one clone and calls
/// [`set`](SharedQuality::set); the service samples the other clone on every
/// telemetry tick. Starts at [`NO_SIGNAL_QUALITY`].
///
/// # Examples
///
/// ```
/// use usbtelem_hardware::quality::SharedQuality;
/// use usbtelem_hardware::traits::SignalQualitySource;
///
/// let producer = SharedQuality::new();
/// let mut sampled = producer.clone();
///
/// producer.set(42);
/// assert_eq!(sampled.signal_quality(), 42);
/// ```
#[derive(Debug, Clone)]
pub struct SharedQuality(Arc<AtomicI32>);

impl SharedQuality {
    pub fn new() -> Self {
        Self::with_value(NO_SIGNAL_QUALITY)
    }

    pub fn with_value(value: i32) -> Self {
        Self(Arc::new(AtomicI32::new(value)))
    }

    pub fn set(&self, value: i32) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for SharedQuality {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalQualitySource for SharedQuality {
    fn signal_quality(&mut self) -> i32 {
        self.get()
    }
}
