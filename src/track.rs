//! Track identifiers, control parameters and their valid ranges
//!
//! Every control value lives in a closed range and is clamped on write,
//! never rejected. Out-of-range and non-finite inputs are folded into the
//! range: NaN clamps to the minimum bound, infinities to the nearest bound.

use std::fmt;

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

/// Volume range (linear gain).
pub const VOLUME_MIN: f32 = 0.0;
pub const VOLUME_MAX: f32 = 1.0;

/// Pan range (-1 = full left, 0 = center, 1 = full right).
pub const PAN_MIN: f32 = -1.0;
pub const PAN_MAX: f32 = 1.0;

/// Lowpass cutoff range in Hz.
pub const LOWPASS_MIN_HZ: f32 = 120.0;
pub const LOWPASS_MAX_HZ: f32 = 20_000.0;

/// Playback rate range (1.0 = original speed).
pub const RATE_MIN: f32 = 0.5;
pub const RATE_MAX: f32 = 2.0;

/// Reverb send range (linear gain into the reverb bus).
pub const REVERB_SEND_MIN: f32 = 0.0;
pub const REVERB_SEND_MAX: f32 = 1.0;

/// Fixed palette for tracks added without an explicit color.
pub const COLOR_PALETTE: [&str; 5] = [
    "from-rose-500 via-pink-500 to-fuchsia-500",
    "from-sky-500 via-cyan-500 to-blue-500",
    "from-emerald-500 via-teal-500 to-green-500",
    "from-amber-500 via-orange-500 to-red-500",
    "from-purple-500 via-violet-500 to-indigo-500",
];

/// Pick a palette color uniformly at random.
pub fn random_color() -> &'static str {
    let mut rng = rand::rng();
    COLOR_PALETTE[rng.random_range(0..COLOR_PALETTE.len())]
}

/// Clamp `value` into `[min, max]`. NaN clamps to `min`.
pub fn clamp_param(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

/// Unique identifier for a mixer track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrackId(Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The six control values of a track, always in range.
///
/// Fields are readable directly; writes go through the clamping setters,
/// which return the value actually stored.
#[derive(Debug, Clone)]
pub struct TrackParams {
    pub volume: f32,
    pub pan: f32,
    pub lowpass: f32,
    pub playback_rate: f32,
    pub reverb_send: f32,
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            volume: 0.8,
            pan: 0.0,
            lowpass: LOWPASS_MAX_HZ,
            playback_rate: 1.0,
            reverb_send: 0.0,
        }
    }
}

impl TrackParams {
    pub fn set_volume(&mut self, value: f32) -> f32 {
        self.volume = clamp_param(value, VOLUME_MIN, VOLUME_MAX);
        self.volume
    }

    pub fn set_pan(&mut self, value: f32) -> f32 {
        self.pan = clamp_param(value, PAN_MIN, PAN_MAX);
        self.pan
    }

    pub fn set_lowpass(&mut self, cutoff_hz: f32) -> f32 {
        self.lowpass = clamp_param(cutoff_hz, LOWPASS_MIN_HZ, LOWPASS_MAX_HZ);
        self.lowpass
    }

    pub fn set_playback_rate(&mut self, rate: f32) -> f32 {
        self.playback_rate = clamp_param(rate, RATE_MIN, RATE_MAX);
        self.playback_rate
    }

    pub fn set_reverb_send(&mut self, amount: f32) -> f32 {
        self.reverb_send = clamp_param(amount, REVERB_SEND_MIN, REVERB_SEND_MAX);
        self.reverb_send
    }
}
