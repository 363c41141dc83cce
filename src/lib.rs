//! Loopdeck - a multi-track loop mixer and playback engine
//!
//! Audio loops are loaded into independent tracks, shaped per track (volume,
//! stereo position, lowpass filtering, playback rate, reverb send) and summed
//! through a shared master bus with peak metering. A UI layer drives the
//! engine through [`engine::MixerEngine`] and renders from the
//! [`state::MixerState`] snapshot it maintains.

pub mod audio;
pub mod effects;
pub mod engine;
pub mod fetch;
pub mod loader;
pub mod meter;
pub mod sample;
pub mod state;
pub mod track;
