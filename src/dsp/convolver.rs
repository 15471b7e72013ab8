//! Convolution reverb
//!
//! Uniformly partitioned overlap-save convolution. The impulse response is
//! cut into partitions of one render quantum, each transformed once up
//! front; every block the input spectrum joins a frequency-domain delay line
//! and the output is the sum of partition products. Latency is zero: the
//! first partition contributes in the same block.
//!
//! Channel mapping:
//! - mono impulse: each input channel is convolved with it
//! - stereo impulse, mono input: the input feeds both impulse channels
//! - stereo impulse, stereo input: left with left, right with right

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{Block, NodeProcessor, ParamBlock};
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

const GAIN_CALIBRATION: f64 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f64 = 44100.0;
const MIN_POWER: f64 = 0.000125;

/// Normalization scale applied to an impulse response
///
/// Scales the impulse to a calibrated RMS power so responses of different
/// loudness and length produce comparable output levels.
pub fn normalization_scale(impulse: &AudioBuffer) -> f32 {
    let total = impulse.num_channels() * impulse.len();
    let power = if total == 0 {
        0.0
    } else {
        let sum: f64 = impulse
            .channels()
            .flat_map(|ch| ch.iter())
            .map(|&s| s as f64 * s as f64)
            .sum();
        (sum / total as f64).sqrt()
    };
    let power = if power.is_finite() && power >= MIN_POWER {
        power
    } else {
        MIN_POWER
    };

    let scale = GAIN_CALIBRATION / power
        * (GAIN_CALIBRATION_SAMPLE_RATE / impulse.sample_rate().max(1) as f64);
    scale as f32
}

/// Per-output-channel convolution state
struct Lane {
    input_channel: usize,
    impulse_channel: usize,
    /// Previous and current input partition
    window: Vec<f32>,
    /// Input spectra, newest first
    history: VecDeque<Vec<Complex<f32>>>,
}

pub struct Convolver {
    partition: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// [impulse channel][partition] spectra of length 2 * partition
    spectra: Vec<Vec<Vec<Complex<f32>>>>,
    lanes: Vec<Lane>,
    input_channels: usize,
}

impl Convolver {
    pub fn new(impulse: &AudioBuffer, normalize: bool, quantum: usize) -> Result<Self> {
        if quantum == 0 {
            return Err(FxError::render("convolver partition size must be positive"));
        }
        let partition = quantum;
        let fft_len = partition * 2;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);

        let scale = if normalize {
            normalization_scale(impulse)
        } else {
            1.0
        };

        let spectra = impulse
            .channels()
            .map(|channel| {
                channel
                    .chunks(partition)
                    .map(|chunk| {
                        let mut spectrum = vec![Complex::new(0.0, 0.0); fft_len];
                        for (bin, &s) in spectrum.iter_mut().zip(chunk) {
                            *bin = Complex::new(s * scale, 0.0);
                        }
                        fft.process(&mut spectrum);
                        spectrum
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            partition,
            fft,
            ifft,
            spectra,
            lanes: Vec::new(),
            input_channels: 0,
        })
    }

    /// Number of impulse partitions
    pub fn partitions(&self) -> usize {
        self.spectra.first().map(Vec::len).unwrap_or(0)
    }

    fn configure(&mut self, input_channels: usize) {
        let impulse_channels = self.spectra.len();
        let pairs: Vec<(usize, usize)> = match (impulse_channels, input_channels) {
            (2, 1) => vec![(0, 0), (0, 1)],
            (2, _) => vec![(0, 0), (1, 1)],
            (_, n) => (0..n).map(|ch| (ch, 0)).collect(),
        };
        self.lanes = pairs
            .into_iter()
            .map(|(input_channel, impulse_channel)| Lane {
                input_channel,
                impulse_channel,
                window: vec![0.0; self.partition * 2],
                history: VecDeque::with_capacity(self.partitions()),
            })
            .collect();
        self.input_channels = input_channels;
    }
}

impl NodeProcessor for Convolver {
    fn process(&mut self, frames: usize, inputs: &[Block], _params: &ParamBlock) -> Vec<Block> {
        let input = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        if self.lanes.is_empty() {
            self.configure(input.len().clamp(1, 2));
        }
        let input = super::to_channels(&input, self.input_channels);

        let b = self.partition;
        let partitions = self.partitions();
        let norm = 1.0 / (2 * b) as f32;
        let mut out: Block = Vec::with_capacity(self.lanes.len());

        for lane in self.lanes.iter_mut() {
            if partitions == 0 {
                out.push(vec![0.0; frames]);
                continue;
            }

            lane.window.copy_within(b.., 0);
            let src = &input[lane.input_channel];
            for (i, slot) in lane.window[b..].iter_mut().enumerate() {
                *slot = src.get(i).copied().unwrap_or(0.0);
            }

            let mut spectrum: Vec<Complex<f32>> =
                lane.window.iter().map(|&s| Complex::new(s, 0.0)).collect();
            self.fft.process(&mut spectrum);
            lane.history.push_front(spectrum);
            lane.history.truncate(partitions);

            let mut acc = vec![Complex::new(0.0, 0.0); 2 * b];
            for (x, h) in lane.history.iter().zip(&self.spectra[lane.impulse_channel]) {
                for ((a, xv), hv) in acc.iter_mut().zip(x).zip(h) {
                    *a += xv * hv;
                }
            }
            self.ifft.process(&mut acc);

            out.push(acc[b..b + frames].iter().map(|c| c.re * norm).collect());
        }

        vec![out]
    }
}
