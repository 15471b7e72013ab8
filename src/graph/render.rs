//! Offline renderer
//!
//! Executes a [`GraphPlan`] stage by stage. Signal graphs are rendered
//! faster than real time in fixed quanta: every quantum, each node runs once
//! in topological order, reading the blocks its upstream nodes produced in
//! the same quantum. Audio inputs are summed (mono sources up-mix to stereo);
//! parameter inputs are down-mixed to mono and added to the intrinsic value.

use std::sync::Arc;

use tracing::{debug, trace};

use super::plan::{Connection, GraphPlan, NodeSpec, SignalGraph, Stage, Target};
use super::progress::RenderProgress;
use crate::dsp::{
    downmix_mono, mix_into, silence, to_channels, Block, DspRuntime, NodeProcessor, ParamBlock,
    ProcessorContext,
};
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Default render quantum in frames
pub const DEFAULT_QUANTUM: usize = 128;

pub struct Renderer {
    runtime: Arc<dyn DspRuntime>,
    quantum: usize,
}

impl Renderer {
    pub fn new(runtime: Arc<dyn DspRuntime>, quantum: usize) -> Self {
        Self {
            runtime,
            quantum: quantum.max(1),
        }
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Render every stage of `plan`, starting from `input`
    ///
    /// Fails with a render error if any stage produces non-finite samples.
    pub fn render(
        &self,
        plan: &GraphPlan,
        input: Arc<AudioBuffer>,
        progress: &RenderProgress,
    ) -> Result<AudioBuffer> {
        let mut current = input;
        for (index, stage) in plan.stages().iter().enumerate() {
            let output = match stage {
                Stage::Graph(graph) => {
                    debug!(
                        stage = index,
                        nodes = graph.nodes().len(),
                        sample_rate = graph.sample_rate(),
                        frames = graph.length(),
                        "Rendering signal graph"
                    );
                    self.render_graph(graph, current, progress)?
                }
                Stage::Reverse => {
                    debug!(stage = index, "Reversing buffer");
                    current.reversed()
                }
            };
            if !output.is_finite() {
                return Err(FxError::render(format!(
                    "stage {} produced non-finite samples",
                    index
                )));
            }
            current = Arc::new(output);
        }
        Ok(Arc::try_unwrap(current).unwrap_or_else(|shared| (*shared).clone()))
    }

    fn render_graph(
        &self,
        graph: &SignalGraph,
        source: Arc<AudioBuffer>,
        progress: &RenderProgress,
    ) -> Result<AudioBuffer> {
        graph.validate()?;
        let order = graph.topological_order()?;

        let ctx = ProcessorContext {
            sample_rate: graph.sample_rate(),
            quantum: self.quantum,
            source,
        };
        let mut processors: Vec<Option<Box<dyn NodeProcessor>>> = graph
            .nodes()
            .iter()
            .map(|spec| match spec {
                NodeSpec::Destination => Ok(None),
                spec => self.runtime.create_processor(spec, &ctx).map(Some),
            })
            .collect::<Result<_>>()?;

        let mut incoming: Vec<Vec<Connection>> = vec![Vec::new(); graph.nodes().len()];
        for c in graph.connections() {
            incoming[c.to.index()].push(*c);
        }

        let channels = graph.channels();
        let length = graph.length();
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(length); channels];
        let mut blocks: Vec<Vec<Block>> = vec![Vec::new(); graph.nodes().len()];

        let mut rendered = 0;
        while rendered < length {
            let frames = self.quantum.min(length - rendered);

            for &id in &order {
                let spec = graph.node(id);
                let edges = &incoming[id.index()];

                let inputs: Vec<Block> = (0..spec.num_inputs().max(1))
                    .map(|port| gather(edges, &blocks, Target::Input(port), frames))
                    .collect();

                let Some(processor) = processors[id.index()].as_mut() else {
                    // Destination
                    let mixed = to_channels(&inputs[0], channels);
                    for (out, ch) in output.iter_mut().zip(mixed) {
                        out.extend_from_slice(&ch);
                    }
                    continue;
                };

                let mut params = ParamBlock::new();
                for &param in spec.params() {
                    let base = spec.intrinsic(param).unwrap_or(0.0);
                    let mut values = vec![base; frames];
                    for edge in edges.iter().filter(|e| e.target == Target::Param(param)) {
                        if let Some(block) = blocks[edge.from.index()].get(edge.output) {
                            for (v, m) in values.iter_mut().zip(downmix_mono(block)) {
                                *v += m;
                            }
                        }
                    }
                    params.insert(param, values);
                }

                let inputs = &inputs[..spec.num_inputs()];
                blocks[id.index()] = processor.process(frames, inputs, &params);
            }

            rendered += frames;
            progress.advance(frames, graph.sample_rate());
            trace!(rendered, length, "Rendered quantum");
        }

        AudioBuffer::from_channels(output, graph.sample_rate())
            .map_err(|e| FxError::render(e.to_string()))
    }
}

/// Sum every block connected to `target`, or mono silence if none are
fn gather(edges: &[Connection], blocks: &[Vec<Block>], target: Target, frames: usize) -> Block {
    let mut sum: Option<Block> = None;
    for edge in edges.iter().filter(|e| e.target == target) {
        let Some(block) = blocks[edge.from.index()].get(edge.output) else {
            continue;
        };
        match sum.as_mut() {
            Some(acc) => mix_into(acc, block),
            None => sum = Some(block.clone()),
        }
    }
    sum.unwrap_or_else(|| silence(frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::NativeRuntime;
    use crate::graph::plan::{NodeId, ParamId, Waveform};
    use approx::assert_abs_diff_eq;

    fn renderer() -> Renderer {
        Renderer::new(Arc::new(NativeRuntime), DEFAULT_QUANTUM)
    }

    fn ramp(len: usize) -> Arc<AudioBuffer> {
        let samples = (0..len).map(|i| i as f32 / len as f32).collect();
        Arc::new(AudioBuffer::from_channels(vec![samples], 8000).unwrap())
    }

    #[test]
    fn test_passthrough_graph() {
        let input = ramp(300);
        let mut graph = SignalGraph::new(8000, 1, 300);
        let source = graph.add(NodeSpec::BufferSource { playback_rate: 1.0 });
        graph.connect(source, graph.destination());

        let progress = RenderProgress::new(300.0 / 8000.0);
        let out = renderer()
            .render(&GraphPlan::single(graph), input.clone(), &progress)
            .unwrap();
        assert_eq!(out, *input);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_fan_in_sums_and_upmixes() {
        let input = ramp(10);
        let mut graph = SignalGraph::new(8000, 2, 10);
        let source = graph.add(NodeSpec::BufferSource { playback_rate: 1.0 });
        let half = graph.add(NodeSpec::Gain { gain: 0.5 });
        graph.connect(source, half);
        graph.connect(source, graph.destination());
        graph.connect(half, graph.destination());

        let out = renderer()
            .render(&GraphPlan::single(graph), input.clone(), &RenderProgress::default())
            .unwrap();
        assert_eq!(out.num_channels(), 2);
        for i in 0..10 {
            assert_abs_diff_eq!(out.channel(0)[i], input.channel(0)[i] * 1.5, epsilon = 1e-6);
            assert_eq!(out.channel(0)[i], out.channel(1)[i]);
        }
    }

    #[test]
    fn test_param_modulation_adds_to_intrinsic() {
        let input = Arc::new(AudioBuffer::from_channels(vec![vec![1.0; 8]], 8).unwrap());
        let mut graph = SignalGraph::new(8, 1, 8);
        let source = graph.add(NodeSpec::BufferSource { playback_rate: 1.0 });
        let vca = graph.add(NodeSpec::Gain { gain: 1.0 });
        let lfo = graph.add(NodeSpec::Oscillator {
            waveform: Waveform::Square,
            frequency: 1.0,
        });
        let depth = graph.add(NodeSpec::Gain { gain: 0.5 });
        graph.connect(source, vca);
        graph.connect(lfo, depth);
        graph.modulate(depth, vca, ParamId::Gain);
        graph.connect(vca, graph.destination());

        let out = renderer()
            .render(&GraphPlan::single(graph), input, &RenderProgress::default())
            .unwrap();
        assert_eq!(out.channel(0)[0], 1.5);
        assert_eq!(out.channel(0)[7], 0.5);
    }

    #[test]
    fn test_reverse_stage() {
        let input = ramp(5);
        let plan = GraphPlan::new().then(Stage::Reverse);
        let out = renderer()
            .render(&plan, input.clone(), &RenderProgress::default())
            .unwrap();
        assert_eq!(out, input.reversed());
    }

    #[test]
    fn test_cycle_fails_render() {
        let mut graph = SignalGraph::new(8000, 1, 10);
        let a = graph.add(NodeSpec::Gain { gain: 1.0 });
        let b = graph.add(NodeSpec::Gain { gain: 1.0 });
        graph.connect(a, b);
        graph.connect(b, a);
        graph.connect(b, NodeId(0));
        let err = renderer()
            .render(&GraphPlan::single(graph), ramp(10), &RenderProgress::default())
            .unwrap_err();
        assert_eq!(err.error_code(), "RENDER_ERROR");
    }

    #[test]
    fn test_output_length_is_graph_length() {
        let mut graph = SignalGraph::new(8000, 1, 1000);
        let source = graph.add(NodeSpec::BufferSource { playback_rate: 1.0 });
        graph.connect(source, graph.destination());
        let out = renderer()
            .render(&GraphPlan::single(graph), ramp(10), &RenderProgress::default())
            .unwrap();
        assert_eq!(out.len(), 1000);
        assert!(out.channel(0)[10..].iter().all(|&s| s == 0.0));
    }
}
