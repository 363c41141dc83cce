//! Decoded sample buffers
//!
//! Decoding is delegated to rodio's decoder; the engine only ever sees
//! fixed-length interleaved f32 buffers with a known channel count and
//! sample rate.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use rodio::{Decoder, Source};

/// Immutable decoded audio, shared read-only with the playback voice.
#[derive(Clone)]
pub struct SampleBuffer {
    channels: u16,
    sample_rate: u32,
    /// Interleaved samples (L, R, L, R, ... for stereo).
    data: Arc<Vec<f32>>,
}

impl SampleBuffer {
    /// Build a buffer from raw interleaved samples (tests and offline use).
    pub fn from_raw(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        debug_assert!(channels > 0);
        debug_assert!(sample_rate > 0);
        Self {
            channels,
            sample_rate,
            data: Arc::new(data),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.data.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f32 {
        self.frame_count() as f32 / self.sample_rate as f32
    }

    /// Read one frame as a stereo pair. Mono duplicates the single channel;
    /// buffers with more than two channels contribute their first two.
    ///
    /// `index` must be below `frame_count`.
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let channels = self.channels as usize;
        let base = index * channels;
        if channels == 1 {
            let s = self.data[base];
            (s, s)
        } else {
            (self.data[base], self.data[base + 1])
        }
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("frames", &self.frame_count())
            .finish()
    }
}

/// Decode in-memory audio bytes into a [`SampleBuffer`].
pub fn decode_bytes(bytes: Vec<u8>) -> Result<SampleBuffer, DecodeError> {
    let decoder = Decoder::new(Cursor::new(bytes))?;

    let sample_rate = decoder.sample_rate();
    let channels = decoder.channels();
    let data: Vec<f32> = decoder.convert_samples::<f32>().collect();

    if data.is_empty() {
        return Err(DecodeError::EmptyStream);
    }

    Ok(SampleBuffer {
        channels,
        sample_rate,
        data: Arc::new(data),
    })
}

/// Decode failures surfaced to `add_track_*` callers.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unrecognized or corrupt audio data: {0}")]
    Unrecognized(#[from] rodio::decoder::DecoderError),

    #[error("decoded stream contained no samples")]
    EmptyStream,
}
