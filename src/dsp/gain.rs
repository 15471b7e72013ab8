//! Gain node

use super::{Block, NodeProcessor, ParamBlock};
use crate::graph::plan::ParamId;

/// Multiplies every channel by the (possibly modulated) gain
pub struct GainProcessor {
    gain: f32,
}

impl GainProcessor {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl NodeProcessor for GainProcessor {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        let mut out = inputs.first().cloned().unwrap_or_else(|| super::silence(frames));
        match params.get(ParamId::Gain) {
            Some(gains) => {
                for channel in out.iter_mut() {
                    for (sample, g) in channel.iter_mut().zip(gains) {
                        *sample *= *g;
                    }
                }
            }
            None => {
                for channel in out.iter_mut() {
                    channel.iter_mut().for_each(|s| *s *= self.gain);
                }
            }
        }
        vec![out]
    }
}
