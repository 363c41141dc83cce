//! Real-time audio engine
//!
//! Owns the cpal output stream. The control thread talks to the callback
//! through an [`AudioHandle`] command channel; commands are drained between
//! processing blocks, so parameter and topology changes apply atomically at
//! block boundaries. Every track strip mixes into the shared master and
//! reverb buses, and the master output lands in the meter tap for the UI.

pub mod graph;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::effects::reverb::ConvolutionReverb;
use crate::meter::{self, MeterTap, METER_WINDOW};
use crate::sample::SampleBuffer;
use crate::track::{TrackId, TrackParams};
use graph::{MasterBus, TrackStrip};

/// Commands sent to the audio engine
#[derive(Debug, Clone)]
pub enum AudioCommand {
    /// Attach a decoded track and build its signal chain
    AttachTrack {
        id: TrackId,
        buffer: Arc<SampleBuffer>,
        params: TrackParams,
    },
    /// Tear down a track's chain, discarding any live voice
    DetachTrack { id: TrackId },
    /// Start a fresh looping voice for the track
    StartVoice { id: TrackId },
    /// Stop and discard the track's live voice
    StopVoice { id: TrackId },
    SetVolume { id: TrackId, value: f32 },
    SetPan { id: TrackId, value: f32 },
    SetLowpass { id: TrackId, value: f32 },
    SetPlaybackRate { id: TrackId, value: f32 },
    SetReverbSend { id: TrackId, value: f32 },
    SetMasterVolume(f32),
    /// Stop every live voice in one batch
    StopAllVoices,
}

/// Handle for sending commands to the audio engine
#[derive(Clone)]
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    sample_rate: u32,
    meter: MeterTap,
}

impl AudioHandle {
    pub fn attach_track(&self, id: TrackId, buffer: Arc<SampleBuffer>, params: TrackParams) {
        let _ = self.tx.send(AudioCommand::AttachTrack { id, buffer, params });
    }

    pub fn detach_track(&self, id: TrackId) {
        let _ = self.tx.send(AudioCommand::DetachTrack { id });
    }

    pub fn start_voice(&self, id: TrackId) {
        let _ = self.tx.send(AudioCommand::StartVoice { id });
    }

    pub fn stop_voice(&self, id: TrackId) {
        let _ = self.tx.send(AudioCommand::StopVoice { id });
    }

    pub fn set_volume(&self, id: TrackId, value: f32) {
        let _ = self.tx.send(AudioCommand::SetVolume { id, value });
    }

    pub fn set_pan(&self, id: TrackId, value: f32) {
        let _ = self.tx.send(AudioCommand::SetPan { id, value });
    }

    pub fn set_lowpass(&self, id: TrackId, value: f32) {
        let _ = self.tx.send(AudioCommand::SetLowpass { id, value });
    }

    pub fn set_playback_rate(&self, id: TrackId, value: f32) {
        let _ = self.tx.send(AudioCommand::SetPlaybackRate { id, value });
    }

    pub fn set_reverb_send(&self, id: TrackId, value: f32) {
        let _ = self.tx.send(AudioCommand::SetReverbSend { id, value });
    }

    pub fn set_master_volume(&self, value: f32) {
        let _ = self.tx.send(AudioCommand::SetMasterVolume(value));
    }

    pub fn stop_all_voices(&self) {
        let _ = self.tx.send(AudioCommand::StopAllVoices);
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Shared master analysis window for metering
    pub fn meter_tap(&self) -> &MeterTap {
        &self.meter
    }

    /// A handle wired to nothing: commands are silently dropped.
    /// For tests that don't care about the audio side.
    pub fn dummy() -> Self {
        let (tx, _) = unbounded();
        Self {
            tx,
            sample_rate: 44_100,
            meter: meter::meter_tap(),
        }
    }

    /// A handle whose command stream is captured for assertions.
    pub fn testable() -> (Self, Receiver<AudioCommand>) {
        let (tx, rx) = unbounded();
        let handle = Self {
            tx,
            sample_rate: 44_100,
            meter: meter::meter_tap(),
        };
        (handle, rx)
    }
}

/// Everything the audio callback owns: strips, buses and scratch buffers.
struct AudioState {
    strips: HashMap<TrackId, TrackStrip>,
    master: MasterBus,
    reverb: ConvolutionReverb,
    rx: Receiver<AudioCommand>,
    meter: MeterTap,
    meter_pos: usize,
    output_sample_rate: u32,
    master_l: Vec<f32>,
    master_r: Vec<f32>,
    reverb_in: Vec<f32>,
}

impl AudioState {
    fn new(
        rx: Receiver<AudioCommand>,
        meter: MeterTap,
        output_sample_rate: u32,
        master_volume: f32,
    ) -> Self {
        Self {
            strips: HashMap::new(),
            master: MasterBus::new(master_volume, output_sample_rate),
            reverb: ConvolutionReverb::new(output_sample_rate),
            rx,
            meter,
            meter_pos: 0,
            output_sample_rate,
            master_l: Vec::new(),
            master_r: Vec::new(),
            reverb_in: Vec::new(),
        }
    }

    /// Apply every pending command. Runs at block boundaries only, so the
    /// graph never changes mid-block.
    fn process_commands(&mut self) {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                AudioCommand::AttachTrack { id, buffer, params } => {
                    let strip = TrackStrip::new(buffer, &params, self.output_sample_rate);
                    self.strips.insert(id, strip);
                }
                AudioCommand::DetachTrack { id } => {
                    self.strips.remove(&id);
                }
                AudioCommand::StartVoice { id } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.start_voice();
                    }
                }
                AudioCommand::StopVoice { id } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.stop_voice();
                    }
                }
                AudioCommand::SetVolume { id, value } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.set_volume(value);
                    }
                }
                AudioCommand::SetPan { id, value } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.set_pan(value);
                    }
                }
                AudioCommand::SetLowpass { id, value } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.set_lowpass(value);
                    }
                }
                AudioCommand::SetPlaybackRate { id, value } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.set_playback_rate(value);
                    }
                }
                AudioCommand::SetReverbSend { id, value } => {
                    if let Some(strip) = self.strips.get_mut(&id) {
                        strip.set_reverb_send(value);
                    }
                }
                AudioCommand::SetMasterVolume(value) => {
                    self.master.set_volume(value);
                }
                AudioCommand::StopAllVoices => {
                    for strip in self.strips.values_mut() {
                        strip.stop_voice();
                    }
                }
            }
        }
    }

    /// Mix one block into the master scratch buffers and refresh the meter
    /// window. Output is hard-clipped to [-1, 1].
    fn render(&mut self, frames: usize) {
        self.master_l.resize(frames, 0.0);
        self.master_r.resize(frames, 0.0);
        self.reverb_in.resize(frames, 0.0);
        self.master_l[..frames].fill(0.0);
        self.master_r[..frames].fill(0.0);
        self.reverb_in[..frames].fill(0.0);

        for strip in self.strips.values_mut() {
            strip.process(
                &mut self.master_l[..frames],
                &mut self.master_r[..frames],
                &mut self.reverb_in[..frames],
            );
        }

        self.reverb.process_add(
            &self.reverb_in[..frames],
            &mut self.master_l[..frames],
            &mut self.master_r[..frames],
        );

        self.master
            .process(&mut self.master_l[..frames], &mut self.master_r[..frames]);

        for i in 0..frames {
            self.master_l[i] = self.master_l[i].clamp(-1.0, 1.0);
            self.master_r[i] = self.master_r[i].clamp(-1.0, 1.0);
        }

        // Publish the mono sum into the analysis window
        if let Ok(mut window) = self.meter.try_lock() {
            for i in 0..frames {
                window[self.meter_pos] = (self.master_l[i] + self.master_r[i]) * 0.5;
                self.meter_pos = (self.meter_pos + 1) % METER_WINDOW;
            }
        }
    }
}

/// Errors bringing up or resuming the output device.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("failed to create audio stream: {0}")]
    Stream(String),
}

/// Audio engine owning the cpal stream. Dropping it releases the device.
pub struct AudioEngine {
    stream: Stream,
}

impl AudioEngine {
    /// Open the default output device and start the stream.
    pub fn start(master_volume: f32) -> Result<(Self, AudioHandle), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let (tx, rx) = unbounded();
        let meter = meter::meter_tap();

        let state = Arc::new(Mutex::new(AudioState::new(
            rx,
            meter.clone(),
            sample_rate,
            master_volume,
        )));

        let stream = match config.sample_format() {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config.into(), state),
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config.into(), state),
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config.into(), state),
            _ => {
                return Err(AudioError::Stream(
                    "unsupported sample format".to_string(),
                ))
            }
        }?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        let handle = AudioHandle {
            tx,
            sample_rate,
            meter,
        };

        Ok((Self { stream }, handle))
    }

    /// (Re)start a suspended stream. Safe to call on a running stream.
    pub fn resume(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32> + cpal::Sample>(
        device: &cpal::Device,
        config: &StreamConfig,
        state: Arc<Mutex<AudioState>>,
    ) -> Result<Stream, AudioError> {
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    Self::audio_callback(data, channels, &state);
                },
                |err| log::error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(stream)
    }

    fn audio_callback<T: cpal::SizedSample + cpal::FromSample<f32> + cpal::Sample>(
        data: &mut [T],
        channels: usize,
        state: &Arc<Mutex<AudioState>>,
    ) {
        // If the lock is contended, output silence rather than blocking the
        // device thread
        let Ok(mut state) = state.try_lock() else {
            for sample in data.iter_mut() {
                *sample = T::EQUILIBRIUM;
            }
            return;
        };

        state.process_commands();

        let frames = data.len() / channels;
        state.render(frames);

        for frame in 0..frames {
            let left = state.master_l[frame];
            let right = state.master_r[frame];
            let out = frame * channels;
            if channels >= 2 {
                data[out] = T::from_sample(left);
                data[out + 1] = T::from_sample(right);
                for extra in 2..channels {
                    data[out + extra] = T::EQUILIBRIUM;
                }
            } else {
                data[out] = T::from_sample((left + right) * 0.5);
            }
        }
    }
}
