//! Biquad filter
//!
//! Second-order IIR section with Audio EQ Cookbook coefficients. The cutoff
//! is a modulatable parameter; coefficients are recomputed whenever it
//! changes, so a filter-sweep LFO takes effect sample by sample.

use std::f64::consts::PI;

use super::{Block, NodeProcessor, ParamBlock};
use crate::graph::plan::{FilterKind, ParamId};

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (a0 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn calculate(
        kind: FilterKind,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Keep the cutoff below Nyquist, even at very low sample rates
        let nyquist = sample_rate / 2.0;
        let max_freq = (nyquist - 1.0).max(nyquist * 0.5);
        let freq = frequency.clamp(10.0_f64.min(max_freq), max_freq);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::LowShelf => {
                let a = 10.0_f64.powf(gain_db / 40.0);
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterKind::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `frequency`
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);
        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Direct Form I
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

pub struct BiquadFilter {
    kind: FilterKind,
    frequency: f32,
    q: f32,
    gain_db: f32,
    sample_rate: f64,
    coeffs: BiquadCoeffs,
    /// Frequency the current coefficients were computed for
    coeff_freq: f32,
    states: Vec<BiquadState>,
}

impl BiquadFilter {
    pub fn new(kind: FilterKind, frequency: f32, q: f32, gain_db: f32, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f64;
        Self {
            kind,
            frequency,
            q,
            gain_db,
            sample_rate,
            coeffs: BiquadCoeffs::calculate(kind, sample_rate, frequency as f64, gain_db as f64, q as f64),
            coeff_freq: frequency,
            states: Vec::new(),
        }
    }

    fn update_coeffs(&mut self, frequency: f32) {
        if frequency != self.coeff_freq {
            self.coeffs = BiquadCoeffs::calculate(
                self.kind,
                self.sample_rate,
                frequency as f64,
                self.gain_db as f64,
                self.q as f64,
            );
            self.coeff_freq = frequency;
        }
    }
}

impl NodeProcessor for BiquadFilter {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let mut out = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        if self.states.len() < out.len() {
            self.states.resize(out.len(), BiquadState::default());
        }

        for i in 0..frames {
            let freq = params.value(ParamId::Frequency, i, self.frequency);
            self.update_coeffs(freq);
            for (channel, state) in out.iter_mut().zip(self.states.iter_mut()) {
                channel[i] = state.process(channel[i] as f64, &self.coeffs) as f32;
            }
        }

        vec![out]
    }
}
