//! Per-track lowpass filter
//!
//! A Chamberlin state-variable filter run in lowpass mode with Butterworth
//! damping. The cutoff target is smoothed per frame so sweeps stay free of
//! zipper noise.

use crate::effects::SmoothedParam;
use crate::track::{clamp_param, LOWPASS_MAX_HZ, LOWPASS_MIN_HZ};

/// Per-channel filter state
#[derive(Debug, Clone, Default)]
struct FilterState {
    /// Low-pass output
    low: f32,
    /// Band-pass output
    band: f32,
}

/// Stereo lowpass filter with a smoothed cutoff.
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    /// Sample rate in Hz
    sample_rate: f32,
    /// Cutoff frequency in Hz, ramped toward its target
    cutoff: SmoothedParam,
    /// Left channel state
    state_l: FilterState,
    /// Right channel state
    state_r: FilterState,
}

impl LowpassFilter {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        let cutoff = clamp_param(cutoff_hz, LOWPASS_MIN_HZ, LOWPASS_MAX_HZ);
        Self {
            sample_rate,
            cutoff: SmoothedParam::new(cutoff, sample_rate),
            state_l: FilterState::default(),
            state_r: FilterState::default(),
        }
    }

    /// Ramp the cutoff toward `cutoff_hz`, clamped to the valid range.
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        self.cutoff
            .set_target(clamp_param(cutoff_hz, LOWPASS_MIN_HZ, LOWPASS_MAX_HZ));
    }

    /// The cutoff target currently ramped toward.
    pub fn cutoff_target(&self) -> f32 {
        self.cutoff.target()
    }

    /// SVF coefficient: g = 2 * sin(pi * fc / fs), kept below the stability
    /// bound for the resonance-free configuration.
    fn coefficient(&self, cutoff: f32) -> f32 {
        let cutoff = cutoff.min(self.sample_rate * 0.45);
        let omega = std::f32::consts::PI * cutoff / self.sample_rate;
        (2.0 * omega.sin()).min(1.0)
    }

    /// Process a single sample through the SVF
    #[inline]
    fn tick(input: f32, state: &mut FilterState, g: f32) -> f32 {
        // Recover from corrupted state rather than letting NaN ring forever
        if !state.band.is_finite() {
            state.band = 0.0;
        }
        if !state.low.is_finite() {
            state.low = 0.0;
        }

        // Butterworth damping (k = sqrt(2) for a flat passband)
        const K: f32 = 1.414;

        let high = input - K * state.band - state.low;
        let band = state.band + g * high;
        let low = state.low + g * band;

        state.band = band;
        state.low = low;

        if low.is_finite() {
            low
        } else {
            0.0
        }
    }

    /// Filter one stereo frame in place.
    pub fn process_frame(&mut self, left: &mut f32, right: &mut f32) {
        let cutoff = self.cutoff.next();
        let g = self.coefficient(cutoff);
        *left = Self::tick(*left, &mut self.state_l, g);
        *right = Self::tick(*right, &mut self.state_r, g);
    }

    /// Clear internal state (e.g. when a chain is rebuilt).
    pub fn reset(&mut self) {
        self.state_l = FilterState::default();
        self.state_r = FilterState::default();
    }
}
