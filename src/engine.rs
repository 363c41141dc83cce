//! Mixer engine - the control-plane orchestrator
//!
//! Owns the ordered track list and the authoritative UI snapshot, brings the
//! shared audio output up lazily, and drives the audio thread through the
//! command channel. All operations are issued from a single control thread;
//! the output device pulls samples concurrently through the graph owned by
//! the audio callback, with changes applied at block boundaries.
//!
//! Decoding is asynchronous: `add_track_*` reserves a track id and returns
//! immediately; the finished load is applied by [`MixerEngine::tick`], which
//! the UI calls once per frame.

use std::path::Path;
use std::sync::Arc;

use crate::audio::{AudioEngine, AudioError, AudioHandle};
use crate::loader::{LoadError, LoadOutcome, LoadRequest, LoadSource, SampleLoader};
use crate::meter::MeterSampler;
use crate::state::{MixerState, TrackInfo};
use crate::track::{self, TrackId, TrackParams, VOLUME_MAX, VOLUME_MIN};

/// Initial master volume for a fresh engine.
const DEFAULT_MASTER_VOLUME: f32 = 0.8;

/// Failures surfaced synchronously from engine operations.
///
/// Fetch/decode failures are asynchronous by design and arrive as
/// [`MixerEvent::TrackFailed`] instead.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(#[from] AudioError),

    #[error("mixer was torn down")]
    TornDown,
}

/// Notifications produced by [`MixerEngine::tick`] for the UI layer.
#[derive(Debug)]
pub enum MixerEvent {
    /// A background load finished and its track joined the snapshot.
    TrackAdded(TrackId),
    /// A background load failed; nothing was registered.
    TrackFailed { id: TrackId, error: LoadError },
}

/// Control-side record of one track.
struct TrackRecord {
    id: TrackId,
    name: String,
    color: String,
    duration_secs: f32,
    params: TrackParams,
    is_playing: bool,
}

impl TrackRecord {
    fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            duration: self.duration_secs,
            volume: self.params.volume,
            pan: self.params.pan,
            lowpass: self.params.lowpass,
            playback_rate: self.params.playback_rate,
            reverb: self.params.reverb_send,
            is_playing: self.is_playing,
        }
    }
}

/// The shared audio output in its three lifetimes.
enum Output {
    /// Not yet created; brought up on first demand.
    Inactive,
    /// Live device-backed engine.
    Device {
        engine: AudioEngine,
        handle: AudioHandle,
    },
    /// Injected handle without a device (tests, headless hosts).
    Handle(AudioHandle),
    /// Torn down; never recreated.
    Closed,
}

/// The mixer engine. See the module docs for the threading model.
pub struct MixerEngine {
    output: Output,
    tracks: Vec<TrackRecord>,
    /// Ids reserved by in-flight loads. Removal before completion cancels
    /// attachment.
    pending: Vec<TrackId>,
    loader: SampleLoader,
    master_volume: f32,
    meter_sampler: Option<MeterSampler>,
    meter_reading: f32,
    state: MixerState,
}

impl MixerEngine {
    /// Engine with lazy device bring-up on first use.
    pub fn new() -> Self {
        Self::with_output(Output::Inactive)
    }

    /// Engine wired to an injected handle instead of a real device.
    pub fn with_handle(handle: AudioHandle) -> Self {
        Self::with_output(Output::Handle(handle))
    }

    fn with_output(output: Output) -> Self {
        let mut engine = Self {
            output,
            tracks: Vec::new(),
            pending: Vec::new(),
            loader: SampleLoader::new(),
            master_volume: DEFAULT_MASTER_VOLUME,
            meter_sampler: None,
            meter_reading: 0.0,
            state: MixerState::default(),
        };
        engine.refresh_state();
        engine
    }

    /// The current snapshot. Rebuilt after every mutating call.
    pub fn state(&self) -> &MixerState {
        &self.state
    }

    /// Ensure the shared output exists and is running. Idempotent; fails
    /// with [`MixerError::OutputUnavailable`] when no device can be opened,
    /// in which case the caller may retry on the next user gesture.
    pub fn resume_context(&mut self) -> Result<(), MixerError> {
        self.ensure_output()?;
        if let Output::Device { engine, .. } = &self.output {
            engine.resume()?;
        }
        self.refresh_state();
        Ok(())
    }

    /// Queue a track whose bytes are fetched from `url`. Returns the
    /// reserved id; the track itself appears via [`MixerEvent::TrackAdded`].
    pub fn add_track_from_url(
        &mut self,
        name: &str,
        url: &str,
        color: &str,
    ) -> Result<TrackId, MixerError> {
        self.ensure_output()?;
        let id = TrackId::new();
        self.pending.push(id);
        self.loader.submit(LoadRequest {
            id,
            name: name.to_string(),
            color: color.to_string(),
            source: LoadSource::Url(url.to_string()),
        });
        Ok(id)
    }

    /// Queue a track from in-memory file bytes. The display name is the file
    /// name with its final extension stripped; without an explicit color one
    /// is picked uniformly from the palette.
    pub fn add_track_from_file(
        &mut self,
        file_name: &str,
        bytes: Vec<u8>,
        color: Option<&str>,
    ) -> Result<TrackId, MixerError> {
        self.ensure_output()?;
        let id = TrackId::new();
        let color = color.unwrap_or_else(|| track::random_color());
        self.pending.push(id);
        self.loader.submit(LoadRequest {
            id,
            name: display_name(file_name),
            color: color.to_string(),
            source: LoadSource::Bytes(bytes),
        });
        Ok(id)
    }

    /// Remove a track: stop its voice, tear down its chain, drop it from the
    /// snapshot. Removing an id still being loaded cancels the attachment.
    /// Unknown ids are a no-op.
    pub fn remove_track(&mut self, id: TrackId) {
        if let Some(pos) = self.pending.iter().position(|p| *p == id) {
            self.pending.remove(pos);
            return;
        }
        let Some(pos) = self.position(id) else {
            return;
        };
        self.tracks.remove(pos);
        if let Some(handle) = self.handle() {
            handle.detach_track(id);
        }
        self.refresh_state();
    }

    /// Flip a track between playing and stopped. Starting always builds a
    /// fresh looping voice at the track's current playback rate. Unknown ids
    /// are a no-op.
    pub fn toggle_track_playback(&mut self, id: TrackId) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let record = &mut self.tracks[pos];
        record.is_playing = !record.is_playing;
        let now_playing = record.is_playing;

        if now_playing {
            self.resume_output();
        }
        if let Some(handle) = self.handle() {
            if now_playing {
                handle.start_voice(id);
            } else {
                handle.stop_voice(id);
            }
        }
        self.refresh_state();
    }

    pub fn set_track_volume(&mut self, id: TrackId, value: f32) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let clamped = self.tracks[pos].params.set_volume(value);
        if let Some(handle) = self.handle() {
            handle.set_volume(id, clamped);
        }
        self.refresh_state();
    }

    pub fn set_track_pan(&mut self, id: TrackId, value: f32) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let clamped = self.tracks[pos].params.set_pan(value);
        if let Some(handle) = self.handle() {
            handle.set_pan(id, clamped);
        }
        self.refresh_state();
    }

    pub fn set_track_lowpass(&mut self, id: TrackId, cutoff_hz: f32) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let clamped = self.tracks[pos].params.set_lowpass(cutoff_hz);
        if let Some(handle) = self.handle() {
            handle.set_lowpass(id, clamped);
        }
        self.refresh_state();
    }

    /// Set the playback rate. A live voice bends to the new rate; a stopped
    /// track picks it up when playback next starts.
    pub fn set_track_playback_rate(&mut self, id: TrackId, rate: f32) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let clamped = self.tracks[pos].params.set_playback_rate(rate);
        if let Some(handle) = self.handle() {
            handle.set_playback_rate(id, clamped);
        }
        self.refresh_state();
    }

    pub fn set_track_reverb(&mut self, id: TrackId, amount: f32) {
        let Some(pos) = self.position(id) else {
            return;
        };
        let clamped = self.tracks[pos].params.set_reverb_send(amount);
        if let Some(handle) = self.handle() {
            handle.set_reverb_send(id, clamped);
        }
        self.refresh_state();
    }

    pub fn set_master_volume(&mut self, value: f32) {
        self.master_volume = track::clamp_param(value, VOLUME_MIN, VOLUME_MAX);
        if let Some(handle) = self.handle() {
            handle.set_master_volume(self.master_volume);
        }
        self.refresh_state();
    }

    /// Start every track with a fresh voice, snapshot updated once.
    pub fn play_all(&mut self) {
        self.resume_output();
        for pos in 0..self.tracks.len() {
            self.tracks[pos].is_playing = true;
            let id = self.tracks[pos].id;
            if let Some(handle) = self.handle() {
                handle.start_voice(id);
            }
        }
        self.refresh_state();
    }

    /// Stop every track, snapshot updated once.
    pub fn stop_all(&mut self) {
        for record in &mut self.tracks {
            record.is_playing = false;
        }
        if let Some(handle) = self.handle() {
            handle.stop_all_voices();
        }
        self.refresh_state();
    }

    /// Per-frame pump: apply finished loads in arrival order, refresh the
    /// meter reading while tracks exist, rebuild the snapshot. Returns the
    /// events of this tick.
    pub fn tick(&mut self) -> Vec<MixerEvent> {
        let mut events = Vec::new();
        let outcomes: Vec<LoadOutcome> = self.loader.completions().collect();
        for outcome in outcomes {
            events.extend(self.apply_load(outcome));
        }
        self.update_meter();
        self.refresh_state();
        events
    }

    /// Stop every voice, tear down every chain, release the output device.
    /// Idempotent; also runs on drop.
    pub fn teardown(&mut self) {
        if matches!(self.output, Output::Closed) {
            return;
        }
        if let Some(handle) = self.handle() {
            handle.stop_all_voices();
            for record in &self.tracks {
                handle.detach_track(record.id);
            }
        }
        self.output = Output::Closed;
        self.tracks.clear();
        self.pending.clear();
        self.meter_sampler = None;
        self.meter_reading = 0.0;
        self.refresh_state();
    }

    fn apply_load(&mut self, outcome: LoadOutcome) -> Option<MixerEvent> {
        let Some(pos) = self.pending.iter().position(|p| *p == outcome.id) else {
            log::debug!("discarding load completion for removed track {}", outcome.id);
            return None;
        };
        self.pending.remove(pos);

        match outcome.result {
            Ok(buffer) => {
                let buffer = Arc::new(buffer);
                let params = TrackParams::default();
                if let Some(handle) = self.handle() {
                    handle.attach_track(outcome.id, buffer.clone(), params.clone());
                }
                self.tracks.push(TrackRecord {
                    id: outcome.id,
                    name: outcome.name,
                    color: outcome.color,
                    duration_secs: buffer.duration_secs(),
                    params,
                    is_playing: false,
                });
                Some(MixerEvent::TrackAdded(outcome.id))
            }
            Err(error) => {
                log::warn!("failed to load track {}: {error}", outcome.id);
                Some(MixerEvent::TrackFailed {
                    id: outcome.id,
                    error,
                })
            }
        }
    }

    fn ensure_output(&mut self) -> Result<&AudioHandle, MixerError> {
        if matches!(self.output, Output::Closed) {
            return Err(MixerError::TornDown);
        }
        if matches!(self.output, Output::Inactive) {
            let (engine, handle) = AudioEngine::start(self.master_volume)?;
            self.output = Output::Device { engine, handle };
            self.refresh_state();
        }
        match &self.output {
            Output::Device { handle, .. } | Output::Handle(handle) => Ok(handle),
            _ => Err(MixerError::TornDown),
        }
    }

    fn handle(&self) -> Option<&AudioHandle> {
        match &self.output {
            Output::Device { handle, .. } | Output::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    /// Best-effort stream restart ahead of a sound-producing action.
    fn resume_output(&self) {
        if let Output::Device { engine, .. } = &self.output {
            if let Err(e) = engine.resume() {
                log::warn!("failed to resume audio stream: {e}");
            }
        }
    }

    fn position(&self, id: TrackId) -> Option<usize> {
        let pos = self.tracks.iter().position(|t| t.id == id);
        if pos.is_none() {
            log::debug!("ignoring operation for unknown track {id}");
        }
        pos
    }

    fn update_meter(&mut self) {
        if self.tracks.is_empty() {
            self.meter_sampler = None;
            self.meter_reading = 0.0;
            return;
        }
        let Some(tap) = self.handle().map(|h| h.meter_tap().clone()) else {
            self.meter_reading = 0.0;
            return;
        };
        let sampler = self
            .meter_sampler
            .get_or_insert_with(|| MeterSampler::new(tap));
        self.meter_reading = sampler.next().unwrap_or(0.0);
    }

    fn refresh_state(&mut self) {
        self.state = MixerState {
            tracks: self.tracks.iter().map(TrackRecord::info).collect(),
            master_volume: self.master_volume,
            master_meter: self.meter_reading,
            is_context_ready: matches!(self.output, Output::Device { .. } | Output::Handle(_)),
        };
    }
}

impl Default for MixerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MixerEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// File name with its final extension stripped.
fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioCommand;
    use crossbeam_channel::Receiver;
    use std::io::Cursor;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Mono 8 kHz WAV bytes of the given duration.
    fn wav_bytes(duration_secs: f32) -> Vec<u8> {
        let sample_rate = 8_000u32;
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
            let frames = (duration_secs * sample_rate as f32) as u32;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let sample = (t * 220.0 * 2.0 * std::f32::consts::PI).sin();
                writer
                    .write_sample((sample * i16::MAX as f32 * 0.5) as i16)
                    .unwrap();
            }
            writer.finalize().unwrap();
        }
        bytes
    }

    fn test_engine() -> (MixerEngine, Receiver<AudioCommand>) {
        let (handle, rx) = AudioHandle::testable();
        (MixerEngine::with_handle(handle), rx)
    }

    /// Pump `tick` until the given id has loaded.
    fn wait_for_track(engine: &mut MixerEngine, id: TrackId) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let events = engine.tick();
            if events
                .iter()
                .any(|e| matches!(e, MixerEvent::TrackAdded(added) if *added == id))
            {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("track {id} never finished loading");
    }

    fn add_file_track(engine: &mut MixerEngine, file_name: &str, duration_secs: f32) -> TrackId {
        let id = engine
            .add_track_from_file(file_name, wav_bytes(duration_secs), None)
            .expect("add should queue");
        wait_for_track(engine, id);
        id
    }

    fn drain(rx: &Receiver<AudioCommand>) -> Vec<AudioCommand> {
        rx.try_iter().collect()
    }

    #[test]
    fn file_track_gets_defaults_and_stripped_name() {
        let (mut engine, _rx) = test_engine();
        add_file_track(&mut engine, "loop.wav", 1.0);

        let state = engine.state();
        assert_eq!(state.tracks.len(), 1);
        let track = &state.tracks[0];
        assert_eq!(track.name, "loop");
        assert!(track::COLOR_PALETTE.contains(&track.color.as_str()));
        assert_eq!(track.volume, 0.8);
        assert_eq!(track.pan, 0.0);
        assert_eq!(track.lowpass, 20_000.0);
        assert_eq!(track.playback_rate, 1.0);
        assert_eq!(track.reverb, 0.0);
        assert!(!track.is_playing);
        assert!((track.duration - 1.0).abs() < 0.01);
    }

    #[test]
    fn explicit_color_is_kept() {
        let (mut engine, _rx) = test_engine();
        let id = engine
            .add_track_from_file("beat.wav", wav_bytes(0.5), Some("from-amber-500 via-orange-500 to-red-500"))
            .unwrap();
        wait_for_track(&mut engine, id);
        assert_eq!(
            engine.state().tracks[0].color,
            "from-amber-500 via-orange-500 to-red-500"
        );
    }

    #[test]
    fn in_range_setters_round_trip_exactly() {
        let (mut engine, _rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);

        engine.set_track_volume(id, 0.25);
        engine.set_track_pan(id, -0.5);
        engine.set_track_lowpass(id, 880.0);
        engine.set_track_playback_rate(id, 1.25);
        engine.set_track_reverb(id, 0.6);

        let track = &engine.state().tracks[0];
        assert_eq!(track.volume, 0.25);
        assert_eq!(track.pan, -0.5);
        assert_eq!(track.lowpass, 880.0);
        assert_eq!(track.playback_rate, 1.25);
        assert_eq!(track.reverb, 0.6);
    }

    #[test]
    fn out_of_range_and_nan_inputs_clamp() {
        let (mut engine, _rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);

        engine.set_track_volume(id, 1.5);
        engine.set_track_pan(id, -3.0);
        engine.set_track_lowpass(id, 1e9);
        engine.set_track_playback_rate(id, 0.01);
        engine.set_track_reverb(id, 99.0);

        let track = &engine.state().tracks[0];
        assert_eq!(track.volume, 1.0);
        assert_eq!(track.pan, -1.0);
        assert_eq!(track.lowpass, 20_000.0);
        assert_eq!(track.playback_rate, 0.5);
        assert_eq!(track.reverb, 1.0);

        engine.set_track_volume(id, f32::NAN);
        engine.set_track_pan(id, f32::NAN);
        engine.set_track_lowpass(id, f32::NAN);
        let track = &engine.state().tracks[0];
        assert_eq!(track.volume, 0.0);
        assert_eq!(track.pan, -1.0);
        assert_eq!(track.lowpass, 120.0);
    }

    #[test]
    fn clamped_values_are_what_reaches_the_audio_thread() {
        let (mut engine, rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);
        drain(&rx);

        engine.set_track_volume(id, 2.5);
        let commands = drain(&rx);
        assert!(commands.iter().any(|c| matches!(
            c,
            AudioCommand::SetVolume { value, .. } if *value == 1.0
        )));
    }

    #[test]
    fn toggle_parity_with_alternating_voice_commands() {
        let (mut engine, rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);
        drain(&rx);

        for _ in 0..5 {
            engine.toggle_track_playback(id);
        }
        assert!(engine.state().tracks[0].is_playing, "odd toggles end playing");

        let commands = drain(&rx);
        let voice_commands: Vec<&AudioCommand> = commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    AudioCommand::StartVoice { .. } | AudioCommand::StopVoice { .. }
                )
            })
            .collect();
        assert_eq!(voice_commands.len(), 5);
        for (i, command) in voice_commands.iter().enumerate() {
            if i % 2 == 0 {
                assert!(matches!(command, AudioCommand::StartVoice { .. }));
            } else {
                assert!(matches!(command, AudioCommand::StopVoice { .. }));
            }
        }
    }

    #[test]
    fn removed_track_ignores_later_operations() {
        let (mut engine, rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);
        engine.remove_track(id);
        assert!(engine.state().tracks.is_empty());
        drain(&rx);

        engine.set_track_volume(id, 0.1);
        engine.toggle_track_playback(id);
        engine.remove_track(id);

        assert!(engine.state().tracks.is_empty());
        assert!(drain(&rx).is_empty(), "no commands for a removed track");
    }

    #[test]
    fn removal_before_load_completion_discards_the_track() {
        let (mut engine, _rx) = test_engine();
        let id = engine
            .add_track_from_file("late.wav", wav_bytes(0.5), None)
            .unwrap();
        engine.remove_track(id);

        // Give the loader ample time, then confirm nothing materialized
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            let events = engine.tick();
            assert!(events.is_empty(), "cancelled load should emit nothing");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.state().tracks.is_empty());
    }

    #[test]
    fn undecodable_file_surfaces_a_failure_event() {
        let (mut engine, _rx) = test_engine();
        let id = engine
            .add_track_from_file("junk.wav", vec![1, 2, 3, 4], None)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let events = engine.tick();
            if let Some(MixerEvent::TrackFailed { id: failed, error }) = events.first() {
                assert_eq!(*failed, id);
                assert!(matches!(error, LoadError::Decode(_)));
                break;
            }
            assert!(Instant::now() < deadline, "failure event never arrived");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(engine.state().tracks.is_empty());
    }

    #[test]
    fn stop_all_then_play_all_restarts_every_track() {
        let (mut engine, rx) = test_engine();
        let a = add_file_track(&mut engine, "a.wav", 0.5);
        let b = add_file_track(&mut engine, "b.wav", 0.5);
        drain(&rx);

        engine.play_all();
        assert!(engine.state().tracks.iter().all(|t| t.is_playing));

        engine.stop_all();
        assert!(engine.state().tracks.iter().all(|t| !t.is_playing));

        engine.play_all();
        assert!(engine.state().tracks.iter().all(|t| t.is_playing));

        let commands = drain(&rx);
        let starts: Vec<TrackId> = commands
            .iter()
            .filter_map(|c| match c {
                AudioCommand::StartVoice { id } => Some(*id),
                _ => None,
            })
            .collect();
        // Two play_all batches, one distinct voice per track each
        assert_eq!(starts.iter().filter(|id| **id == a).count(), 2);
        assert_eq!(starts.iter().filter(|id| **id == b).count(), 2);
        assert!(commands
            .iter()
            .any(|c| matches!(c, AudioCommand::StopAllVoices)));
    }

    #[test]
    fn clamped_volume_scenario_leaves_other_tracks_alone() {
        let (mut engine, _rx) = test_engine();
        let a = add_file_track(&mut engine, "a.wav", 3.0);
        let b = add_file_track(&mut engine, "b.wav", 5.0);

        engine.play_all();
        engine.set_track_volume(a, 1.5);

        let state = engine.state();
        let track_a = state.tracks.iter().find(|t| t.id == a).unwrap();
        let track_b = state.tracks.iter().find(|t| t.id == b).unwrap();
        assert_eq!(track_a.volume, 1.0);
        assert_eq!(track_b.volume, 0.8);
        assert!(track_a.is_playing && track_b.is_playing);
        assert!((track_a.duration - 3.0).abs() < 0.01);
        assert!((track_b.duration - 5.0).abs() < 0.01);
    }

    #[test]
    fn master_volume_clamps_and_reaches_the_bus() {
        let (mut engine, rx) = test_engine();
        engine.set_master_volume(2.0);
        assert_eq!(engine.state().master_volume, 1.0);

        engine.set_master_volume(f32::NAN);
        assert_eq!(engine.state().master_volume, 0.0);

        let commands = drain(&rx);
        assert!(commands
            .iter()
            .any(|c| matches!(c, AudioCommand::SetMasterVolume(v) if *v == 1.0)));
        assert!(commands
            .iter()
            .any(|c| matches!(c, AudioCommand::SetMasterVolume(v) if *v == 0.0)));
    }

    #[test]
    fn meter_reading_follows_the_tap_while_tracks_exist() {
        let (handle, _rx) = AudioHandle::testable();
        let tap = handle.meter_tap().clone();
        let mut engine = MixerEngine::with_handle(handle);

        tap.lock().unwrap()[0] = 0.6;
        engine.tick();
        assert_eq!(
            engine.state().master_meter,
            0.0,
            "meter stays idle with no tracks"
        );

        let _id = add_file_track(&mut engine, "a.wav", 0.5);
        tap.lock().unwrap()[0] = 0.6;
        engine.tick();
        assert_eq!(engine.state().master_meter, 0.6);
    }

    #[test]
    fn teardown_is_idempotent_and_final() {
        let (mut engine, rx) = test_engine();
        let id = add_file_track(&mut engine, "a.wav", 0.5);
        engine.toggle_track_playback(id);
        drain(&rx);

        engine.teardown();
        engine.teardown();

        let state = engine.state();
        assert!(state.tracks.is_empty());
        assert!(!state.is_context_ready);

        let commands = drain(&rx);
        assert!(commands
            .iter()
            .any(|c| matches!(c, AudioCommand::StopAllVoices)));
        assert!(commands
            .iter()
            .any(|c| matches!(c, AudioCommand::DetachTrack { .. })));

        let result = engine.add_track_from_file("late.wav", wav_bytes(0.2), None);
        assert!(matches!(result, Err(MixerError::TornDown)));
    }

    #[test]
    fn snapshot_reflects_context_readiness() {
        let (engine, _rx) = test_engine();
        assert!(engine.state().is_context_ready);

        let lazy = MixerEngine::new();
        assert!(!lazy.state().is_context_ready);
    }

    #[test]
    fn dummy_handle_engine_still_tracks_state() {
        let mut engine = MixerEngine::with_handle(AudioHandle::dummy());
        let id = add_file_track(&mut engine, "solo.wav", 0.5);
        engine.toggle_track_playback(id);
        assert!(engine.state().tracks[0].is_playing);
    }

    #[test]
    fn display_name_strips_only_the_final_extension() {
        assert_eq!(display_name("loop.wav"), "loop");
        assert_eq!(display_name("drum.kit.flac"), "drum.kit");
        assert_eq!(display_name("bare"), "bare");
    }
}
