//! Graph plans
//!
//! A [`GraphPlan`] is the complete description of one render: an ordered list
//! of stages, each either a [`SignalGraph`] of DSP nodes or a pure buffer
//! transform. Every stage consumes the previous stage's output (the first one
//! consumes the request's input buffer).
//!
//! Signal graphs carry two kinds of edges: audio connections into a node's
//! input port, and modulation connections into one of its numeric parameters.
//! A modulated parameter's value at each frame is its intrinsic value plus the
//! sum of every signal connected to it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};

/// Index of a node inside a [`SignalGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in [`SignalGraph::nodes`]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Modulatable node parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamId {
    PlaybackRate,
    Frequency,
    Gain,
    DelayTime,
    Pan,
    PositionX,
    PositionY,
    PositionZ,
}

/// Oscillator waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

/// Biquad filter responses used by the effect catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    LowPass,
    LowShelf,
}

/// A DSP node and its intrinsic settings
#[derive(Debug, Clone)]
pub enum NodeSpec {
    /// Sink; every signal connected here is summed into the stage output
    Destination,
    /// Plays the stage input; `playback_rate` resamples it
    BufferSource { playback_rate: f32 },
    Oscillator { waveform: Waveform, frequency: f32 },
    Gain { gain: f32 },
    BiquadFilter {
        kind: FilterKind,
        frequency: f32,
        q: f32,
        gain_db: f32,
    },
    /// Delay line whose output is fed back into its input scaled by `feedback`
    Delay {
        delay_time: f32,
        max_delay: f32,
        feedback: f32,
    },
    Convolver {
        impulse: Arc<AudioBuffer>,
        normalize: bool,
    },
    StereoPanner { pan: f32 },
    /// Positional panner: equal-power azimuth panning with inverse distance attenuation
    Panner3d {
        position: [f32; 3],
        ref_distance: f32,
        rolloff: f32,
    },
    ChannelSplitter { outputs: usize },
    ChannelMerger { inputs: usize },
}

impl NodeSpec {
    /// Short name used in logs and capability errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeSpec::Destination => "destination",
            NodeSpec::BufferSource { .. } => "buffer-source",
            NodeSpec::Oscillator { .. } => "oscillator",
            NodeSpec::Gain { .. } => "gain",
            NodeSpec::BiquadFilter { .. } => "biquad-filter",
            NodeSpec::Delay { .. } => "delay",
            NodeSpec::Convolver { .. } => "convolver",
            NodeSpec::StereoPanner { .. } => "stereo-panner",
            NodeSpec::Panner3d { .. } => "panner-3d",
            NodeSpec::ChannelSplitter { .. } => "channel-splitter",
            NodeSpec::ChannelMerger { .. } => "channel-merger",
        }
    }

    /// Parameters that accept modulation connections
    pub fn params(&self) -> &'static [ParamId] {
        match self {
            NodeSpec::BufferSource { .. } => &[ParamId::PlaybackRate],
            NodeSpec::Oscillator { .. } => &[ParamId::Frequency],
            NodeSpec::Gain { .. } => &[ParamId::Gain],
            NodeSpec::BiquadFilter { .. } => &[ParamId::Frequency],
            NodeSpec::Delay { .. } => &[ParamId::DelayTime],
            NodeSpec::StereoPanner { .. } => &[ParamId::Pan],
            NodeSpec::Panner3d { .. } => {
                &[ParamId::PositionX, ParamId::PositionY, ParamId::PositionZ]
            }
            NodeSpec::Destination
            | NodeSpec::Convolver { .. }
            | NodeSpec::ChannelSplitter { .. }
            | NodeSpec::ChannelMerger { .. } => &[],
        }
    }

    /// Intrinsic (unmodulated) value of a parameter
    pub fn intrinsic(&self, param: ParamId) -> Option<f32> {
        match (self, param) {
            (NodeSpec::BufferSource { playback_rate }, ParamId::PlaybackRate) => {
                Some(*playback_rate)
            }
            (NodeSpec::Oscillator { frequency, .. }, ParamId::Frequency) => Some(*frequency),
            (NodeSpec::Gain { gain }, ParamId::Gain) => Some(*gain),
            (NodeSpec::BiquadFilter { frequency, .. }, ParamId::Frequency) => Some(*frequency),
            (NodeSpec::Delay { delay_time, .. }, ParamId::DelayTime) => Some(*delay_time),
            (NodeSpec::StereoPanner { pan }, ParamId::Pan) => Some(*pan),
            (NodeSpec::Panner3d { position, .. }, ParamId::PositionX) => Some(position[0]),
            (NodeSpec::Panner3d { position, .. }, ParamId::PositionY) => Some(position[1]),
            (NodeSpec::Panner3d { position, .. }, ParamId::PositionZ) => Some(position[2]),
            _ => None,
        }
    }

    /// Number of audio input ports
    pub fn num_inputs(&self) -> usize {
        match self {
            NodeSpec::BufferSource { .. } | NodeSpec::Oscillator { .. } => 0,
            NodeSpec::ChannelMerger { inputs } => *inputs,
            _ => 1,
        }
    }

    /// Number of audio output ports
    pub fn num_outputs(&self) -> usize {
        match self {
            NodeSpec::Destination => 0,
            NodeSpec::ChannelSplitter { outputs } => *outputs,
            _ => 1,
        }
    }
}

/// Where a connection lands on its target node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Audio input port
    Input(usize),
    /// Modulation of a numeric parameter
    Param(ParamId),
}

/// A directed edge between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub output: usize,
    pub to: NodeId,
    pub target: Target,
}

/// A topology of DSP nodes rendered at one sample rate
#[derive(Debug, Clone)]
pub struct SignalGraph {
    sample_rate: u32,
    channels: usize,
    length: usize,
    nodes: Vec<NodeSpec>,
    connections: Vec<Connection>,
}

impl SignalGraph {
    /// Create a graph containing only its destination node
    ///
    /// `channels` and `length` fix the shape of the stage output.
    pub fn new(sample_rate: u32, channels: usize, length: usize) -> Self {
        Self {
            sample_rate,
            channels,
            length,
            nodes: vec![NodeSpec::Destination],
            connections: Vec::new(),
        }
    }

    pub fn destination(&self) -> NodeId {
        NodeId(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn duration_secs(&self) -> f64 {
        self.length as f64 / self.sample_rate.max(1) as f64
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &NodeSpec {
        &self.nodes[id.0]
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Add a node and return its id
    pub fn add(&mut self, spec: NodeSpec) -> NodeId {
        self.nodes.push(spec);
        NodeId(self.nodes.len() - 1)
    }

    /// Connect output 0 of `from` to input 0 of `to`
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.connect_port(from, 0, to, 0);
    }

    /// Connect a specific output port to a specific input port
    pub fn connect_port(&mut self, from: NodeId, output: usize, to: NodeId, input: usize) {
        self.connections.push(Connection {
            from,
            output,
            to,
            target: Target::Input(input),
        });
    }

    /// Route output 0 of `from` into a parameter of `to`
    pub fn modulate(&mut self, from: NodeId, to: NodeId, param: ParamId) {
        self.connections.push(Connection {
            from,
            output: 0,
            to,
            target: Target::Param(param),
        });
    }

    /// Check ports, parameters and acyclicity
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(FxError::render("stage sample rate is zero"));
        }
        if !matches!(self.channels, 1 | 2) {
            return Err(FxError::render(format!(
                "stage output must be mono or stereo, got {} channels",
                self.channels
            )));
        }

        for c in &self.connections {
            let (from, to) = match (self.nodes.get(c.from.0), self.nodes.get(c.to.0)) {
                (Some(from), Some(to)) => (from, to),
                _ => {
                    return Err(FxError::render(format!(
                        "connection {} -> {} references a missing node",
                        c.from, c.to
                    )))
                }
            };
            if c.output >= from.num_outputs() {
                return Err(FxError::render(format!(
                    "{} {} has no output {}",
                    from.kind_name(),
                    c.from,
                    c.output
                )));
            }
            match c.target {
                Target::Input(port) if port >= to.num_inputs() => {
                    return Err(FxError::render(format!(
                        "{} {} has no input {}",
                        to.kind_name(),
                        c.to,
                        port
                    )));
                }
                Target::Param(param) if !to.params().contains(&param) => {
                    return Err(FxError::render(format!(
                        "{} {} has no parameter {:?}",
                        to.kind_name(),
                        c.to,
                        param
                    )));
                }
                _ => {}
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Order nodes so every node comes after all of its inputs
    ///
    /// Ties are broken by node id, so the order is deterministic.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        for c in &self.connections {
            in_degree[c.to.0] += 1;
            outgoing[c.from.0].push(c.to.0);
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(NodeId(next));
            for &to in &outgoing[next] {
                in_degree[to] -= 1;
                if in_degree[to] == 0 {
                    ready.insert(to);
                }
            }
        }

        if order.len() != n {
            return Err(FxError::render("signal graph contains a cycle"));
        }
        Ok(order)
    }
}

/// One step of a render
#[derive(Debug, Clone)]
pub enum Stage {
    Graph(SignalGraph),
    /// Per-channel sample-order inversion
    Reverse,
}

/// Everything a renderer needs to turn an input buffer into an output buffer
#[derive(Debug, Clone, Default)]
pub struct GraphPlan {
    stages: Vec<Stage>,
}

impl GraphPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// A plan with a single signal-graph stage
    pub fn single(graph: SignalGraph) -> Self {
        Self {
            stages: vec![Stage::Graph(graph)],
        }
    }

    /// Append a stage
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total virtual time the renderer will process
    ///
    /// Buffer transforms take no virtual time.
    pub fn expected_duration_secs(&self) -> f64 {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::Graph(graph) => graph.duration_secs(),
                Stage::Reverse => 0.0,
            })
            .sum()
    }

    /// Number of DSP nodes across all stages (destinations excluded)
    pub fn node_count(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::Graph(graph) => graph.nodes().len() - 1,
                Stage::Reverse => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> SignalGraph {
        let mut graph = SignalGraph::new(44100, 2, 100);
        let source = graph.add(NodeSpec::BufferSource { playback_rate: 1.0 });
        let gain = graph.add(NodeSpec::Gain { gain: 0.5 });
        graph.connect(source, gain);
        graph.connect(gain, graph.destination());
        graph
    }

    #[test]
    fn test_topological_order_puts_destination_last() {
        let graph = chain();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![NodeId(1), NodeId(2), NodeId(0)]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_modulation_edges_are_ordered() {
        let mut graph = chain();
        let lfo = graph.add(NodeSpec::Oscillator {
            waveform: Waveform::Sine,
            frequency: 1.0,
        });
        graph.modulate(lfo, NodeId(2), ParamId::Gain);
        let order = graph.topological_order().unwrap();
        let pos = |id: usize| order.iter().position(|n| n.0 == id).unwrap();
        assert!(pos(3) < pos(2));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut graph = chain();
        graph.connect(NodeId(2), NodeId(2));
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_bad_ports_are_rejected() {
        let mut graph = chain();
        graph.modulate(NodeId(1), NodeId(2), ParamId::Pan);
        assert!(graph.validate().is_err());

        let mut graph = chain();
        graph.connect_port(NodeId(1), 3, NodeId(2), 0);
        assert!(graph.validate().is_err());

        let mut graph = chain();
        graph.connect(NodeId(2), NodeId(1));
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_expected_duration() {
        let plan = GraphPlan::single(chain()).then(Stage::Reverse);
        let expected = 100.0 / 44100.0;
        assert!((plan.expected_duration_secs() - expected).abs() < 1e-12);
        assert_eq!(plan.node_count(), 2);
    }
}
