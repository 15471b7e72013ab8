//! Buffer source
//!
//! Plays a stage's input buffer from the start. The read position advances by
//! `playback_rate * input_rate / context_rate` per output frame, so the same
//! node both changes speed and converts sample rate. Fractional positions are
//! linearly interpolated; reads past the end are silent.

use std::sync::Arc;

use super::{Block, NodeProcessor, ParamBlock};
use crate::engine::AudioBuffer;
use crate::graph::plan::ParamId;

pub struct BufferSource {
    buffer: Arc<AudioBuffer>,
    /// input_rate / context_rate
    rate_ratio: f64,
    playback_rate: f32,
    /// Frames produced so far
    frame: u64,
    /// Read position and frame index at the last step change
    anchor_pos: f64,
    anchor_frame: u64,
    step: f64,
}

impl BufferSource {
    pub fn new(buffer: Arc<AudioBuffer>, context_rate: u32, playback_rate: f32) -> Self {
        let rate_ratio = buffer.sample_rate() as f64 / context_rate.max(1) as f64;
        let step = playback_rate.max(0.0) as f64 * rate_ratio;
        Self {
            buffer,
            rate_ratio,
            playback_rate,
            frame: 0,
            anchor_pos: 0.0,
            anchor_frame: 0,
            step,
        }
    }

    /// Current read position in input frames
    ///
    /// Computed from the last anchor rather than accumulated, so a constant
    /// rate produces exact positions.
    #[inline]
    fn position(&self) -> f64 {
        self.anchor_pos + (self.frame - self.anchor_frame) as f64 * self.step
    }

    #[inline]
    fn read(channel: &[f32], pos: f64) -> f32 {
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        match (channel.get(idx), channel.get(idx + 1)) {
            (Some(&a), Some(&b)) => a + (b - a) * frac,
            (Some(&a), None) if frac == 0.0 => a,
            (Some(&a), None) => a * (1.0 - frac),
            _ => 0.0,
        }
    }
}

impl NodeProcessor for BufferSource {
    fn process(&mut self, frames: usize, _inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let mut out: Block = vec![vec![0.0; frames]; self.buffer.num_channels()];

        for i in 0..frames {
            let rate = params.value(ParamId::PlaybackRate, i, self.playback_rate);
            if rate != self.playback_rate {
                self.anchor_pos = self.position();
                self.anchor_frame = self.frame;
                self.playback_rate = rate;
                self.step = rate.max(0.0) as f64 * self.rate_ratio;
            }

            let pos = self.position();
            for (ch, channel) in self.buffer.channels().enumerate() {
                out[ch][i] = Self::read(channel, pos);
            }
            self.frame += 1;
        }

        vec![out]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn source(samples: Vec<f32>, rate: u32) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::from_channels(vec![samples], rate).unwrap())
    }

    #[test]
    fn test_unity_rate_is_exact_copy() {
        let input: Vec<f32> = (0..300).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut node = BufferSource::new(source(input.clone(), 8000), 8000, 1.0);
        let mut out = Vec::new();
        for _ in 0..3 {
            out.extend_from_slice(&node.process(128, &[], &ParamBlock::new())[0][0]);
        }
        assert_eq!(&out[..300], &input[..]);
        assert!(out[300..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_double_rate_skips_frames() {
        let mut node = BufferSource::new(source(vec![0.0, 1.0, 2.0, 3.0, 4.0], 8000), 8000, 2.0);
        let out = node.process(4, &[], &ParamBlock::new());
        assert_eq!(out[0][0], vec![0.0, 2.0, 4.0, 0.0]);
    }

    #[test]
    fn test_half_rate_interpolates() {
        let mut node = BufferSource::new(source(vec![0.0, 1.0, 0.0], 8000), 8000, 0.5);
        let out = node.process(4, &[], &ParamBlock::new());
        assert_abs_diff_eq!(out[0][0][1], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(out[0][0][2], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rate_conversion() {
        // 16 kHz input played in an 8 kHz context reads every other frame
        let mut node = BufferSource::new(source(vec![0.0, 1.0, 2.0, 3.0], 16000), 8000, 1.0);
        let out = node.process(2, &[], &ParamBlock::new());
        assert_eq!(out[0][0], vec![0.0, 2.0]);
    }
}
