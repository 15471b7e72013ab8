//! Feedback delay
//!
//! Delay line whose output is fed back into its own input:
//! `y[n] = x[n - d] + feedback * y[n - d]`. Only the delayed signal is
//! output; dry/wet mixing happens in the graph.

use super::{Block, NodeProcessor, ParamBlock};
use crate::graph::plan::ParamId;

/// Feedback ceiling that keeps the loop stable
pub const MAX_FEEDBACK: f32 = 0.95;

pub struct FeedbackDelay {
    delay_time: f32,
    feedback: f32,
    sample_rate: f32,
    /// Longest delay in frames
    max_frames: f32,
    /// One circular buffer per channel
    lines: Vec<Vec<f32>>,
    write_pos: usize,
}

impl FeedbackDelay {
    /// Create a delay
    ///
    /// `max_delay` bounds the modulated delay time; `feedback` is clamped to
    /// `[0, MAX_FEEDBACK]`.
    pub fn new(
        delay_time: f32,
        max_delay: f32,
        feedback: f32,
        sample_rate: u32,
        quantum: usize,
    ) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        let max_frames = (max_delay.max(delay_time).max(0.0) * sample_rate).max(1.0);
        let size = max_frames.ceil() as usize + quantum + 2;
        Self {
            delay_time,
            feedback: feedback.clamp(0.0, MAX_FEEDBACK),
            sample_rate,
            max_frames,
            lines: vec![vec![0.0; size]],
            write_pos: 0,
        }
    }

    /// Read `delay` frames behind the write head with linear interpolation
    #[inline]
    fn read(line: &[f32], write_pos: usize, delay: f32) -> f32 {
        let size = line.len();
        let whole = delay.floor() as usize;
        let frac = delay - whole as f32;
        let newer = line[(write_pos + size - whole) % size];
        let older = line[(write_pos + size - whole - 1) % size];
        newer + (older - newer) * frac
    }
}

impl NodeProcessor for FeedbackDelay {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let input = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        if self.lines.len() < input.len() {
            let size = self.lines[0].len();
            self.lines.resize(input.len(), vec![0.0; size]);
        }

        let mut out: Block = vec![vec![0.0; frames]; self.lines.len()];
        for i in 0..frames {
            let seconds = params.value(ParamId::DelayTime, i, self.delay_time);
            // A delay inside a feedback loop is at least one frame long
            let delay = (seconds * self.sample_rate).clamp(1.0, self.max_frames);

            for (ch, line) in self.lines.iter_mut().enumerate() {
                let x = input.get(ch).or_else(|| input.first()).map_or(0.0, |c| c[i]);
                let y = Self::read(line, self.write_pos, delay);
                line[self.write_pos] = x + self.feedback * y;
                out[ch][i] = y;
            }
            self.write_pos = (self.write_pos + 1) % self.lines[0].len();
        }

        vec![out]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn impulse(frames: usize) -> Block {
        let mut samples = vec![0.0; frames];
        samples[0] = 1.0;
        vec![samples]
    }

    #[test]
    fn test_echoes_decay_by_feedback() {
        // 10 ms at 1 kHz = 10 frames
        let mut delay = FeedbackDelay::new(0.01, 0.01, 0.5, 1000, 128);
        let out = delay.process(40, &[impulse(40)], &ParamBlock::new());
        let y = &out[0][0];
        assert_abs_diff_eq!(y[10], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y[20], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(y[30], 0.25, epsilon = 1e-6);
        assert_eq!(y[0], 0.0);
        assert_eq!(y[15], 0.0);
    }

    #[test]
    fn test_feedback_is_clamped() {
        let delay = FeedbackDelay::new(0.1, 0.1, 1.5, 1000, 128);
        assert_eq!(delay.feedback, MAX_FEEDBACK);
    }

    #[test]
    fn test_state_carries_across_blocks() {
        let mut delay = FeedbackDelay::new(0.005, 0.005, 0.0, 1000, 4);
        let first = delay.process(4, &[impulse(4)], &ParamBlock::new());
        assert!(first[0][0].iter().all(|&s| s == 0.0));
        let second = delay.process(4, &[super::super::silence(4)], &ParamBlock::new());
        assert_abs_diff_eq!(second[0][0][1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_stereo_lines_are_independent() {
        let mut delay = FeedbackDelay::new(0.002, 0.002, 0.0, 1000, 128);
        let input = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0; 4]];
        let out = delay.process(4, &[input], &ParamBlock::new());
        assert_eq!(out[0][0], vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(out[0][1], vec![0.0; 4]);
    }
}
