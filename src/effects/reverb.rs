//! Shared convolution reverb bus
//!
//! The bus synthesizes its impulse response exactly once at creation: two
//! channels of 2.5 seconds of uniform noise under a squared decay envelope.
//! Convolution runs as uniformly partitioned FFT convolution with a
//! frequency-domain delay line, so cost stays flat regardless of tail
//! length. The wet signal is mixed into the master bus at a fixed level.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Impulse response length in seconds.
pub const IMPULSE_SECONDS: f32 = 2.5;

/// Decay exponent of the impulse envelope.
pub const IMPULSE_DECAY: f32 = 2.0;

/// Fixed wet level mixed back into the master bus.
pub const WET_LEVEL: f32 = 0.3;

/// Convolution partition size in frames.
const PARTITION_FRAMES: usize = 1024;

/// The shared reverb bus: mono send input, decorrelated stereo wet output.
pub struct ConvolutionReverb {
    left: PartitionedConvolver,
    right: PartitionedConvolver,
}

impl ConvolutionReverb {
    /// Build the bus for the given output sample rate, synthesizing one
    /// fresh impulse response per channel.
    pub fn new(sample_rate: u32) -> Self {
        let length = (sample_rate as f32 * IMPULSE_SECONDS) as usize;
        let mut planner = FftPlanner::new();
        Self {
            left: PartitionedConvolver::new(&impulse_channel(length), PARTITION_FRAMES, &mut planner),
            right: PartitionedConvolver::new(&impulse_channel(length), PARTITION_FRAMES, &mut planner),
        }
    }

    /// Convolve the mono send block and add the wet signal into the master
    /// accumulators. All three slices must share a length.
    pub fn process_add(&mut self, input: &[f32], master_l: &mut [f32], master_r: &mut [f32]) {
        for (i, &sample) in input.iter().enumerate() {
            master_l[i] += self.left.push(sample) * WET_LEVEL;
            master_r[i] += self.right.push(sample) * WET_LEVEL;
        }
    }
}

/// One impulse response channel: `uniform(-1,1) * (1 - i/len)^decay`.
fn impulse_channel(length: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..length)
        .map(|i| {
            let envelope = (1.0 - i as f32 / length as f32).powf(IMPULSE_DECAY);
            rng.random_range(-1.0f32..1.0) * envelope
        })
        .collect()
}

/// Uniformly partitioned overlap-add convolver.
///
/// Streaming: one sample in, one sample out, with one partition of latency.
/// Each full input block is transformed once and multiplied against every
/// partition spectrum through the frequency-domain delay line.
struct PartitionedConvolver {
    partition: usize,
    fft_size: usize,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    /// Per-partition impulse response spectra.
    ir_spectra: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line of past input spectra.
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    /// Time-domain input accumulation for the current block.
    input: Vec<f32>,
    input_pos: usize,
    /// Overlap-add carry from the previous block.
    overlap: Vec<f32>,
    /// Output samples ready to be popped.
    ready: VecDeque<f32>,
    /// Scratch for the newest input spectrum.
    spectrum: Vec<Complex<f32>>,
    /// Scratch for the multiply-accumulate and inverse transform.
    acc: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    fn new(ir: &[f32], partition: usize, planner: &mut FftPlanner<f32>) -> Self {
        let fft_size = partition * 2;
        let fft_forward = planner.plan_fft_forward(fft_size);
        let fft_inverse = planner.plan_fft_inverse(fft_size);

        let mut ir_spectra: Vec<Vec<Complex<f32>>> = ir
            .chunks(partition)
            .map(|chunk| {
                let mut buf: Vec<Complex<f32>> =
                    chunk.iter().map(|&s| Complex::new(s, 0.0)).collect();
                buf.resize(fft_size, Complex::new(0.0, 0.0));
                fft_forward.process(&mut buf);
                buf
            })
            .collect();
        if ir_spectra.is_empty() {
            ir_spectra.push(vec![Complex::new(0.0, 0.0); fft_size]);
        }

        let segments = ir_spectra.len();
        Self {
            partition,
            fft_size,
            fft_forward,
            fft_inverse,
            ir_spectra,
            fdl: vec![vec![Complex::new(0.0, 0.0); fft_size]; segments],
            fdl_pos: 0,
            input: vec![0.0; partition],
            input_pos: 0,
            overlap: vec![0.0; partition],
            ready: VecDeque::with_capacity(partition),
            spectrum: Vec::with_capacity(fft_size),
            acc: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    /// Push one dry sample and pop one wet sample.
    fn push(&mut self, sample: f32) -> f32 {
        self.input[self.input_pos] = sample;
        self.input_pos += 1;
        if self.input_pos == self.partition {
            self.input_pos = 0;
            self.process_block();
        }
        self.ready.pop_front().unwrap_or(0.0)
    }

    fn process_block(&mut self) {
        // Transform the newest block and rotate it into the delay line
        self.spectrum.clear();
        self.spectrum
            .extend(self.input.iter().map(|&s| Complex::new(s, 0.0)));
        self.spectrum.resize(self.fft_size, Complex::new(0.0, 0.0));
        self.fft_forward.process(&mut self.spectrum);
        std::mem::swap(&mut self.fdl[self.fdl_pos], &mut self.spectrum);

        // Multiply-accumulate every partition against its delayed spectrum
        let segments = self.ir_spectra.len();
        self.acc.fill(Complex::new(0.0, 0.0));
        for seg in 0..segments {
            let idx = (self.fdl_pos + segments - seg) % segments;
            let delayed = &self.fdl[idx];
            let ir = &self.ir_spectra[seg];
            for ((acc, &x), &h) in self.acc.iter_mut().zip(delayed).zip(ir) {
                *acc += x * h;
            }
        }
        self.fdl_pos = (self.fdl_pos + 1) % segments;

        // Back to time domain, overlap-add the block tail
        self.fft_inverse.process(&mut self.acc);
        let scale = 1.0 / self.fft_size as f32;
        for i in 0..self.partition {
            self.ready.push_back(self.acc[i].re * scale + self.overlap[i]);
            self.overlap[i] = self.acc[i + self.partition].re * scale;
        }
    }
}
