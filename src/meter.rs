//! Master-bus metering
//!
//! The audio callback writes the master output (mono-summed, post-clip) into
//! a shared analysis window; the control thread reads peak levels from it
//! once per UI frame.

use std::sync::{Arc, Mutex};

/// Number of samples in the analysis window.
pub const METER_WINDOW: usize = 1024;

/// Shared analysis window written by the audio callback.
pub type MeterTap = Arc<Mutex<Vec<f32>>>;

/// Allocate a fresh, silent analysis window.
pub fn meter_tap() -> MeterTap {
    Arc::new(Mutex::new(vec![0.0; METER_WINDOW]))
}

/// Per-frame sampler over the master analysis tap.
///
/// A lazy, infinite sequence of peak readings: `next()` never returns `None`
/// and always reflects the window's current contents. Cheap to drop and
/// re-create, so consumers can stop sampling while the mixer is empty and
/// restart on the next track add.
#[derive(Debug, Clone)]
pub struct MeterSampler {
    tap: MeterTap,
}

impl MeterSampler {
    pub fn new(tap: MeterTap) -> Self {
        Self { tap }
    }

    /// Peak absolute level across the current window.
    pub fn peak(&self) -> f32 {
        let Ok(window) = self.tap.lock() else {
            return 0.0;
        };
        window.iter().fold(0.0f32, |peak, &s| peak.max(s.abs()))
    }
}

impl Iterator for MeterSampler {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        Some(self.peak())
    }
}
