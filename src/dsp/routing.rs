//! Channel splitter and merger

use super::{Block, NodeProcessor, ParamBlock};

/// Sends each input channel to its own mono output
pub struct ChannelSplitter {
    outputs: usize,
}

impl ChannelSplitter {
    pub fn new(outputs: usize) -> Self {
        Self { outputs }
    }
}

impl NodeProcessor for ChannelSplitter {
    fn process(&mut self, frames: usize, inputs: &[Block], _params: &ParamBlock) -> Vec<Block> {
        let input = inputs.first();
        (0..self.outputs)
            .map(|ch| {
                let samples = input
                    .and_then(|block| block.get(ch))
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; frames]);
                vec![samples]
            })
            .collect()
    }
}

/// Combines each input (down-mixed to mono) into one channel of the output
pub struct ChannelMerger {
    inputs: usize,
}

impl ChannelMerger {
    pub fn new(inputs: usize) -> Self {
        Self { inputs }
    }
}

impl NodeProcessor for ChannelMerger {
    fn process(&mut self, frames: usize, inputs: &[Block], _params: &ParamBlock) -> Vec<Block> {
        let merged = (0..self.inputs)
            .map(|port| match inputs.get(port) {
                Some(block) if !block.is_empty() => super::downmix_mono(block),
                _ => vec![0.0; frames],
            })
            .collect();
        vec![merged]
    }
}
