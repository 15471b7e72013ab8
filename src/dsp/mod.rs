//! DSP primitives and the runtime that instantiates them
//!
//! A [`DspRuntime`] turns the [`NodeSpec`]s of a signal graph into stateful
//! [`NodeProcessor`]s. The renderer drives processors block by block; each
//! call receives one [`Block`] per input port plus the per-frame values of
//! the node's parameters, and returns one block per output port.
//!
//! [`NativeRuntime`] implements every node kind in pure Rust. Other runtimes
//! may support a subset and report the rest as
//! [`FxError::CapabilityUnsupported`].

pub mod biquad;
pub mod convolver;
pub mod delay;
pub mod gain;
pub mod oscillator;
pub mod panner;
pub mod routing;
pub mod source;

use std::sync::Arc;

use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};
use crate::graph::plan::{NodeSpec, ParamId};

pub use biquad::BiquadFilter;
pub use convolver::Convolver;
pub use delay::FeedbackDelay;
pub use gain::GainProcessor;
pub use oscillator::Oscillator;
pub use panner::{Panner3d, StereoPanner};
pub use routing::{ChannelMerger, ChannelSplitter};
pub use source::BufferSource;

/// Audio for one render quantum: outer Vec is channels, inner Vec is frames
pub type Block = Vec<Vec<f32>>;

/// A mono block of silence
pub fn silence(frames: usize) -> Block {
    vec![vec![0.0; frames]]
}

// ============================================================================
// Processor traits
// ============================================================================

/// Per-frame parameter values for one block
#[derive(Debug, Clone, Default)]
pub struct ParamBlock {
    values: Vec<(ParamId, Vec<f32>)>,
}

impl ParamBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: ParamId, values: Vec<f32>) {
        match self.values.iter_mut().find(|(p, _)| *p == param) {
            Some((_, existing)) => *existing = values,
            None => self.values.push((param, values)),
        }
    }

    pub fn get(&self, param: ParamId) -> Option<&[f32]> {
        self.values
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, v)| v.as_slice())
    }

    /// Value of `param` at `frame`, or `fallback` when the parameter is absent
    #[inline]
    pub fn value(&self, param: ParamId, frame: usize, fallback: f32) -> f32 {
        self.get(param)
            .and_then(|v| v.get(frame).copied())
            .unwrap_or(fallback)
    }
}

/// Stateful block processor for one graph node
pub trait NodeProcessor: Send {
    /// Process `frames` frames
    ///
    /// `inputs` holds one block per input port (silent mono when unconnected).
    /// Returns one block per output port, each exactly `frames` long.
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block>;
}

/// What a processor can see of the stage it renders in
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Rate the stage renders at
    pub sample_rate: u32,
    /// Maximum frames per `process` call
    pub quantum: usize,
    /// The stage input buffer, played by buffer sources
    pub source: Arc<AudioBuffer>,
}

/// Factory for node processors
pub trait DspRuntime: Send + Sync {
    /// Human-readable runtime name
    fn name(&self) -> &'static str;

    /// Instantiate the processor for `spec`
    ///
    /// Returns [`FxError::CapabilityUnsupported`] for node kinds the runtime
    /// cannot execute.
    fn create_processor(
        &self,
        spec: &NodeSpec,
        ctx: &ProcessorContext,
    ) -> Result<Box<dyn NodeProcessor>>;
}

// ============================================================================
// Native runtime
// ============================================================================

/// Pure-Rust runtime supporting every node kind
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRuntime;

impl DspRuntime for NativeRuntime {
    fn name(&self) -> &'static str {
        "native"
    }

    fn create_processor(
        &self,
        spec: &NodeSpec,
        ctx: &ProcessorContext,
    ) -> Result<Box<dyn NodeProcessor>> {
        let processor: Box<dyn NodeProcessor> = match spec {
            NodeSpec::Destination => {
                return Err(FxError::CapabilityUnsupported {
                    capability: "destination nodes are mixed by the renderer".to_string(),
                })
            }
            NodeSpec::BufferSource { playback_rate } => Box::new(BufferSource::new(
                ctx.source.clone(),
                ctx.sample_rate,
                *playback_rate,
            )),
            NodeSpec::Oscillator {
                waveform,
                frequency,
            } => Box::new(Oscillator::new(*waveform, *frequency, ctx.sample_rate)),
            NodeSpec::Gain { gain } => Box::new(GainProcessor::new(*gain)),
            NodeSpec::BiquadFilter {
                kind,
                frequency,
                q,
                gain_db,
            } => Box::new(BiquadFilter::new(
                *kind,
                *frequency,
                *q,
                *gain_db,
                ctx.sample_rate,
            )),
            NodeSpec::Delay {
                delay_time,
                max_delay,
                feedback,
            } => Box::new(FeedbackDelay::new(
                *delay_time,
                *max_delay,
                *feedback,
                ctx.sample_rate,
                ctx.quantum,
            )),
            NodeSpec::Convolver { impulse, normalize } => {
                Box::new(Convolver::new(impulse, *normalize, ctx.quantum)?)
            }
            NodeSpec::StereoPanner { pan } => Box::new(StereoPanner::new(*pan)),
            NodeSpec::Panner3d {
                position,
                ref_distance,
                rolloff,
            } => Box::new(Panner3d::new(*position, *ref_distance, *rolloff)),
            NodeSpec::ChannelSplitter { outputs } => Box::new(ChannelSplitter::new(*outputs)),
            NodeSpec::ChannelMerger { inputs } => Box::new(ChannelMerger::new(*inputs)),
        };
        Ok(processor)
    }
}

// ============================================================================
// Channel mixing helpers
// ============================================================================

/// Add `src` into `dest`, up-mixing mono to stereo when the shapes differ
pub fn mix_into(dest: &mut Block, src: &Block) {
    if src.is_empty() {
        return;
    }
    if src.len() > dest.len() {
        if let Some(mono) = dest.first().cloned() {
            dest.resize(src.len(), mono);
        }
    }
    for (ch, out) in dest.iter_mut().enumerate() {
        let input = if src.len() == 1 { &src[0] } else { &src[ch.min(src.len() - 1)] };
        for (o, i) in out.iter_mut().zip(input) {
            *o += *i;
        }
    }
}

/// Average all channels into one
pub fn downmix_mono(block: &Block) -> Vec<f32> {
    match block.len() {
        0 => Vec::new(),
        1 => block[0].clone(),
        n => {
            let scale = 1.0 / n as f32;
            (0..block[0].len())
                .map(|i| block.iter().map(|ch| ch[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

/// Convert a block to exactly `channels` channels (speaker up/down-mix)
pub fn to_channels(block: &Block, channels: usize) -> Block {
    match (block.len(), channels) {
        (n, c) if n == c => block.clone(),
        (1, c) => vec![block[0].clone(); c],
        (_, 1) => vec![downmix_mono(block)],
        (_, c) => {
            let mut out: Block = block.iter().take(c).cloned().collect();
            let frames = block.first().map(Vec::len).unwrap_or(0);
            out.resize(c, vec![0.0; frames]);
            out
        }
    }
}
