//! Low-frequency oscillator
//!
//! Mono periodic signal in `[-1, 1]`. Used as an LFO: its output is routed
//! through a gain node (the depth) into some other node's parameter.

use std::f64::consts::TAU;

use super::{Block, NodeProcessor, ParamBlock};
use crate::graph::plan::{ParamId, Waveform};

pub struct Oscillator {
    waveform: Waveform,
    frequency: f32,
    sample_rate: f64,
    /// Normalized phase in [0, 1)
    phase: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f32, sample_rate: u32) -> Self {
        Self {
            waveform,
            frequency,
            sample_rate: sample_rate.max(1) as f64,
            phase: 0.0,
        }
    }

    /// Value of `waveform` at normalized phase `phase`
    ///
    /// All shapes start at zero except the square, which starts high.
    #[inline]
    pub fn shape(waveform: Waveform, phase: f64) -> f32 {
        let value = match waveform {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Triangle => {
                if phase < 0.25 {
                    4.0 * phase
                } else if phase < 0.75 {
                    2.0 - 4.0 * phase
                } else {
                    4.0 * phase - 4.0
                }
            }
            Waveform::Sawtooth => {
                if phase < 0.5 {
                    2.0 * phase
                } else {
                    2.0 * phase - 2.0
                }
            }
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        };
        value as f32
    }
}

impl NodeProcessor for Oscillator {
    fn process(&mut self, frames: usize, _inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let mut out = vec![0.0; frames];
        for (i, sample) in out.iter_mut().enumerate() {
            let freq = params.value(ParamId::Frequency, i, self.frequency) as f64;
            *sample = Self::shape(self.waveform, self.phase);
            self.phase = (self.phase + freq / self.sample_rate).rem_euclid(1.0);
        }
        vec![vec![out]]
    }
}
