//! Engine-owned state snapshot exposed to the UI
//!
//! An immutable value object renderable without further engine calls. The
//! engine rebuilds it after every mutating action; the UI never mutates it
//! in place.

use serde::Serialize;

use crate::track::TrackId;

/// Per-track summary in the snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub name: String,
    pub color: String,
    /// Loop duration in seconds at the original playback rate.
    pub duration: f32,
    pub volume: f32,
    pub pan: f32,
    pub lowpass: f32,
    pub playback_rate: f32,
    pub reverb: f32,
    pub is_playing: bool,
}

/// Full mixer snapshot: ordered track list plus master state.
#[derive(Debug, Clone, Serialize)]
pub struct MixerState {
    /// Tracks in insertion order.
    pub tracks: Vec<TrackInfo>,
    pub master_volume: f32,
    /// Latest peak reading from the master analysis tap, in [0, 1].
    pub master_meter: f32,
    /// Whether the shared audio output has been brought up.
    pub is_context_ready: bool,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            master_volume: 0.8,
            master_meter: 0.0,
            is_context_ready: false,
        }
    }
}
