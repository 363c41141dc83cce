//! Per-track signal chains and the master bus
//!
//! Topology per track: `source -> lowpass -> {pan -> gain -> master,
//! send -> reverb}`. The filter, pan, gain and send stages persist for the
//! track's lifetime; only the source voice is replaced across play/stop
//! cycles.

use std::sync::Arc;

use crate::effects::filter::LowpassFilter;
use crate::effects::SmoothedParam;
use crate::sample::SampleBuffer;
use crate::track::{
    clamp_param, TrackParams, PAN_MAX, PAN_MIN, RATE_MAX, RATE_MIN, REVERB_SEND_MAX,
    REVERB_SEND_MIN, VOLUME_MAX, VOLUME_MIN,
};

/// Constant-power pan law: left/right gains for pan in [-1, 1].
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// A live playback voice: a fractional frame position into the track's
/// buffer. One-shot - voices are constructed fresh on every play and
/// discarded on stop, never reused.
#[derive(Debug, Clone, Copy, Default)]
struct SourceVoice {
    position: f64,
}

impl SourceVoice {
    /// Read the current frame with linear interpolation, then advance by
    /// `step` source frames, looping over the buffer end.
    fn next_frame(&mut self, buffer: &SampleBuffer, step: f64) -> (f32, f32) {
        let frames = buffer.frame_count();
        if frames == 0 {
            return (0.0, 0.0);
        }

        let base = self.position as usize;
        let next = (base + 1) % frames;
        let frac = (self.position - base as f64) as f32;

        let (l0, r0) = buffer.frame(base);
        let (l1, r1) = buffer.frame(next);

        self.position = (self.position + step) % frames as f64;

        (l0 + (l1 - l0) * frac, r0 + (r1 - r0) * frac)
    }
}

/// One track's processing chain, owned by the audio thread.
pub struct TrackStrip {
    buffer: Arc<SampleBuffer>,
    voice: Option<SourceVoice>,
    filter: LowpassFilter,
    gain: SmoothedParam,
    pan: SmoothedParam,
    reverb_send: SmoothedParam,
    rate: SmoothedParam,
    /// Buffer-rate over output-rate resampling factor.
    rate_ratio: f64,
}

impl TrackStrip {
    pub fn new(buffer: Arc<SampleBuffer>, params: &TrackParams, output_sample_rate: u32) -> Self {
        let sr = output_sample_rate as f32;
        Self {
            rate_ratio: buffer.sample_rate() as f64 / output_sample_rate as f64,
            filter: LowpassFilter::new(params.lowpass, sr),
            gain: SmoothedParam::new(params.volume, sr),
            pan: SmoothedParam::new(params.pan, sr),
            reverb_send: SmoothedParam::new(params.reverb_send, sr),
            rate: SmoothedParam::new(params.playback_rate, sr),
            voice: None,
            buffer,
        }
    }

    /// Start playback with a fresh voice at the beginning of the loop.
    /// Replaces any live voice. The rate smoother snaps to its target so a
    /// rate chosen while stopped takes effect cleanly at restart.
    pub fn start_voice(&mut self) {
        self.rate.snap(self.rate.target());
        self.voice = Some(SourceVoice::default());
    }

    /// Stop and discard the live voice. No-op when already stopped.
    pub fn stop_voice(&mut self) {
        self.voice = None;
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_some()
    }

    pub fn set_volume(&mut self, value: f32) {
        self.gain
            .set_target(clamp_param(value, VOLUME_MIN, VOLUME_MAX));
    }

    pub fn set_pan(&mut self, value: f32) {
        self.pan.set_target(clamp_param(value, PAN_MIN, PAN_MAX));
    }

    pub fn set_lowpass(&mut self, cutoff_hz: f32) {
        self.filter.set_cutoff(cutoff_hz);
    }

    pub fn set_playback_rate(&mut self, rate: f32) {
        self.rate.set_target(clamp_param(rate, RATE_MIN, RATE_MAX));
    }

    pub fn set_reverb_send(&mut self, amount: f32) {
        self.reverb_send
            .set_target(clamp_param(amount, REVERB_SEND_MIN, REVERB_SEND_MAX));
    }

    /// Mix one block into the master and reverb-send accumulators.
    /// Silent (and free) while no voice is live.
    pub fn process(&mut self, master_l: &mut [f32], master_r: &mut [f32], reverb_in: &mut [f32]) {
        let Some(voice) = self.voice.as_mut() else {
            return;
        };

        for i in 0..master_l.len() {
            let step = self.rate.next() as f64 * self.rate_ratio;
            let (mut l, mut r) = voice.next_frame(&self.buffer, step);

            self.filter.process_frame(&mut l, &mut r);

            // Post-filter, pre-fader tap into the reverb bus
            let send = self.reverb_send.next();
            reverb_in[i] += (l + r) * 0.5 * send;

            let (pan_l, pan_r) = pan_gains(self.pan.next());
            let gain = self.gain.next();
            master_l[i] += l * pan_l * gain;
            master_r[i] += r * pan_r * gain;
        }
    }
}

/// The single shared gain stage every track feeds.
pub struct MasterBus {
    gain: SmoothedParam,
}

impl MasterBus {
    pub fn new(volume: f32, output_sample_rate: u32) -> Self {
        Self {
            gain: SmoothedParam::new(
                clamp_param(volume, VOLUME_MIN, VOLUME_MAX),
                output_sample_rate as f32,
            ),
        }
    }

    pub fn set_volume(&mut self, value: f32) {
        self.gain
            .set_target(clamp_param(value, VOLUME_MIN, VOLUME_MAX));
    }

    /// Apply the smoothed master gain in place.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for i in 0..left.len() {
            let gain = self.gain.next();
            left[i] *= gain;
            right[i] *= gain;
        }
    }
}
