//! Graph construction
//!
//! Turns an effect, its merged config and the impulse-response state into a
//! [`GraphPlan`]. Building is pure: the impulse response has already been
//! fetched and decoded by the engine, and nothing here touches I/O.

use std::sync::Arc;

use tracing::{debug, warn};

use super::gain::{stage_gains, GainStage};
use super::kind::EffectKind;
use super::merge::MergedConfig;
use crate::engine::AudioBuffer;
use crate::error::{FxError, Result};
use crate::graph::plan::{
    FilterKind, GraphPlan, NodeId, NodeSpec, ParamId, SignalGraph, Stage, Waveform,
};

/// 8d feedback delay time in seconds
const EIGHT_D_DELAY_TIME: f32 = 0.35;
/// 8d feedback delay feedback gain
const EIGHT_D_FEEDBACK: f32 = 0.4;
/// 8d filter sweep depth as a fraction of the base cutoff
const EIGHT_D_FILTER_DEPTH: f64 = 0.8;
/// Right-channel delay for stereo widening (Haas effect)
const HAAS_DELAY: f32 = 0.02;
const HAAS_MAX_DELAY: f32 = 0.1;
const BASS_SHELF_FREQ: f32 = 100.0;
const BASS_SHELF_Q: f32 = 0.707;
const MAX_OVERSAMPLE: u32 = 4;

/// Impulse response as seen by the builder
#[derive(Debug)]
pub enum ImpulseResponseState {
    /// The effect has no reverb path
    NotRequested,
    /// Decoded at the render's sample rate
    Available(Arc<AudioBuffer>),
    /// Fetching or decoding failed
    Unavailable(FxError),
}

impl ImpulseResponseState {
    pub fn is_available(&self) -> bool {
        matches!(self, ImpulseResponseState::Available(_))
    }
}

/// Engine-level knobs the builder needs
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Reference rate for deriving the hq oversampling factor
    pub hq_reference_rate: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            hq_reference_rate: 192_000,
        }
    }
}

/// A plan plus what the builder decided while making it
#[derive(Debug)]
pub struct BuiltGraph {
    pub plan: GraphPlan,
    /// Path gains, for effects that mix parallel paths
    pub gains: Option<GainStage>,
    pub reverb_applied: bool,
}

impl BuiltGraph {
    fn simple(plan: GraphPlan) -> Self {
        Self {
            plan,
            gains: None,
            reverb_applied: false,
        }
    }
}

/// Build the plan for `kind`
///
/// Effects with an optional reverb path fall back to the remaining paths when
/// the impulse response is unavailable; the reverb-only effect fails instead.
pub fn build_graph(
    kind: EffectKind,
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: ImpulseResponseState,
    options: &BuildOptions,
) -> Result<BuiltGraph> {
    let impulse = match impulse {
        ImpulseResponseState::Available(ir) => Some(ir),
        ImpulseResponseState::Unavailable(err) if kind.requires_reverb() => return Err(err),
        ImpulseResponseState::Unavailable(err) => {
            warn!(effect = %kind, error = %err, "Impulse response unavailable, rendering without reverb");
            None
        }
        ImpulseResponseState::NotRequested => None,
    };

    let built = match kind {
        EffectKind::EightD => eight_d(input, config, impulse)?,
        EffectKind::SixteenD => sixteen_d(input, config, impulse)?,
        EffectKind::ThirtyTwoD => thirty_two_d(input, config, impulse)?,
        EffectKind::SixtyFourD => sixty_four_d(input, config, impulse)?,
        EffectKind::Stereo => BuiltGraph::simple(stereo(input)),
        EffectKind::Reverse => BuiltGraph::simple(GraphPlan::new().then(Stage::Reverse)),
        EffectKind::BassBoost => BuiltGraph::simple(bass_boost(input, config)?),
        EffectKind::Echo => BuiltGraph::simple(echo(input, config)?),
        EffectKind::PitchUp | EffectKind::PitchDown | EffectKind::SpeedUp | EffectKind::SlowDown => {
            BuiltGraph::simple(playback_rate(input, config)?)
        }
        EffectKind::Hq => BuiltGraph::simple(hq(input, config, options)?),
        EffectKind::Reverb => reverb(input, config, impulse)?,
    };

    debug!(
        effect = %kind,
        stages = built.plan.stages().len(),
        nodes = built.plan.node_count(),
        reverb = built.reverb_applied,
        "Built graph plan"
    );
    Ok(built)
}

// ============================================================================
// Shared building blocks
// ============================================================================

/// Oscillator feeding a depth gain; returns the gain node
fn lfo(graph: &mut SignalGraph, waveform: Waveform, rate: f64, depth: f64) -> NodeId {
    let osc = graph.add(NodeSpec::Oscillator {
        waveform,
        frequency: rate as f32,
    });
    let depth = graph.add(NodeSpec::Gain {
        gain: depth as f32,
    });
    graph.connect(osc, depth);
    depth
}

/// `from` -> gain -> destination
fn send(graph: &mut SignalGraph, from: NodeId, gain: f32) {
    let node = graph.add(NodeSpec::Gain { gain });
    graph.connect(from, node);
    graph.connect(node, graph.destination());
}

/// `from` -> normalized convolver -> gain -> destination
fn reverb_send(graph: &mut SignalGraph, from: NodeId, impulse: Arc<AudioBuffer>, gain: f32) {
    let convolver = graph.add(NodeSpec::Convolver {
        impulse,
        normalize: true,
    });
    graph.connect(from, convolver);
    send(graph, convolver, gain);
}

/// Positional panner reference distance for an orbit of the given extents
fn orbit_reference(extents: &[f64]) -> f32 {
    extents.iter().fold(1.0_f64, |acc, e| acc.max(e.abs())) as f32
}

fn source(graph: &mut SignalGraph, playback_rate: f32) -> NodeId {
    graph.add(NodeSpec::BufferSource { playback_rate })
}

// ============================================================================
// Spatial family
// ============================================================================

fn eight_d(
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: Option<Arc<AudioBuffer>>,
) -> Result<BuiltGraph> {
    let pan_speed = config.require("panSpeed")?;
    let filter_freq = config.require("filterFreq")?;
    let gains = stage_gains(
        config.require("reverbMix")?,
        config.require("delayMix")?,
        impulse.is_some(),
    );

    let mut graph = SignalGraph::new(input.sample_rate(), 2, input.len());
    let src = source(&mut graph, 1.0);
    let panner = graph.add(NodeSpec::StereoPanner { pan: 0.0 });
    graph.connect(src, panner);

    let primary = lfo(&mut graph, Waveform::Sine, pan_speed, config.require("lfoPanDepth1")?);
    graph.modulate(primary, panner, ParamId::Pan);
    let secondary = lfo(
        &mut graph,
        Waveform::Sine,
        pan_speed * 2.0,
        config.require("lfoPanDepth2")?,
    );
    graph.modulate(secondary, panner, ParamId::Pan);

    let filter = graph.add(NodeSpec::BiquadFilter {
        kind: FilterKind::LowPass,
        frequency: filter_freq as f32,
        q: 1.0,
        gain_db: 0.0,
    });
    graph.connect(panner, filter);
    let sweep = lfo(
        &mut graph,
        Waveform::Sine,
        config.require("lfoFilterSpeed")?,
        filter_freq * EIGHT_D_FILTER_DEPTH,
    );
    graph.modulate(sweep, filter, ParamId::Frequency);

    send(&mut graph, filter, gains.direct);

    let delay = graph.add(NodeSpec::Delay {
        delay_time: EIGHT_D_DELAY_TIME,
        max_delay: EIGHT_D_DELAY_TIME,
        feedback: EIGHT_D_FEEDBACK,
    });
    graph.connect(filter, delay);
    send(&mut graph, delay, gains.delay);

    let reverb_applied = impulse.is_some();
    if let Some(ir) = impulse {
        reverb_send(&mut graph, filter, ir, gains.reverb);
    }

    Ok(BuiltGraph {
        plan: GraphPlan::single(graph),
        gains: Some(gains),
        reverb_applied,
    })
}

/// Panner orbit axes: (waveform, rate, extent) per driven axis
struct Orbit {
    x: (Waveform, f64, f64),
    y: Option<(Waveform, f64, f64)>,
    z: Option<(Waveform, f64, f64)>,
    /// Sine sweeping the X extent: (rate, depth)
    x_sweep: Option<(f64, f64)>,
    /// Position of axes that are not driven
    rest: [f32; 3],
}

fn positional(
    input: &AudioBuffer,
    orbit: Orbit,
    reverb_mix: f64,
    impulse: Option<Arc<AudioBuffer>>,
) -> BuiltGraph {
    let gains = stage_gains(reverb_mix, 0.0, impulse.is_some());

    let x_extent = orbit.x.2 + orbit.x_sweep.map_or(0.0, |(_, depth)| depth.abs());
    let ref_distance = orbit_reference(&[
        x_extent,
        orbit.y.map_or(0.0, |axis| axis.2),
        orbit.z.map_or(orbit.rest[2] as f64, |axis| axis.2),
    ]);

    let mut graph = SignalGraph::new(input.sample_rate(), 2, input.len());
    let src = source(&mut graph, 1.0);
    let panner = graph.add(NodeSpec::Panner3d {
        position: orbit.rest,
        ref_distance,
        rolloff: 1.0,
    });
    graph.connect(src, panner);

    let (waveform, rate, extent) = orbit.x;
    let x_depth = lfo(&mut graph, waveform, rate, extent);
    graph.modulate(x_depth, panner, ParamId::PositionX);
    if let Some((rate, depth)) = orbit.x_sweep {
        let sweep = lfo(&mut graph, Waveform::Sine, rate, depth);
        graph.modulate(sweep, x_depth, ParamId::Gain);
    }
    for (axis, param) in [(orbit.y, ParamId::PositionY), (orbit.z, ParamId::PositionZ)] {
        if let Some((waveform, rate, extent)) = axis {
            let depth = lfo(&mut graph, waveform, rate, extent);
            graph.modulate(depth, panner, param);
        }
    }

    send(&mut graph, panner, gains.direct);
    let reverb_applied = impulse.is_some();
    if let Some(ir) = impulse {
        reverb_send(&mut graph, panner, ir, gains.reverb);
    }

    BuiltGraph {
        plan: GraphPlan::single(graph),
        gains: Some(gains),
        reverb_applied,
    }
}

fn sixteen_d(
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: Option<Arc<AudioBuffer>>,
) -> Result<BuiltGraph> {
    let orbit = Orbit {
        x: (
            Waveform::Sine,
            config.require("pannerXOscRate")?,
            config.require("pannerXOscWidth")?,
        ),
        y: None,
        z: None,
        x_sweep: None,
        rest: [0.0, 0.0, config.require("pannerZPos")? as f32],
    };
    Ok(positional(input, orbit, config.require("reverbMix")?, impulse))
}

fn thirty_two_d(
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: Option<Arc<AudioBuffer>>,
) -> Result<BuiltGraph> {
    let orbit = Orbit {
        x: (
            Waveform::Sine,
            config.require("panXRate")?,
            config.require("panXWidth")?,
        ),
        y: Some((
            Waveform::Triangle,
            config.require("panYRate")?,
            config.require("panYWidth")?,
        )),
        z: None,
        x_sweep: Some((config.require("panZRate")?, config.require("panZWidth")?)),
        // Just in front of the listener so the azimuth sweeps smoothly
        rest: [0.0, 0.0, -1.0],
    };
    Ok(positional(input, orbit, config.require("reverbMix")?, impulse))
}

fn sixty_four_d(
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: Option<Arc<AudioBuffer>>,
) -> Result<BuiltGraph> {
    let orbit = Orbit {
        x: (
            Waveform::Sine,
            config.require("panXRate")?,
            config.require("panXWidth")?,
        ),
        y: Some((
            Waveform::Triangle,
            config.require("panYRate")?,
            config.require("panYWidth")?,
        )),
        z: Some((
            Waveform::Sawtooth,
            config.require("panZRate")?,
            config.require("panZWidth")?,
        )),
        x_sweep: None,
        rest: [0.0; 3],
    };
    Ok(positional(input, orbit, config.require("reverbMix")?, impulse))
}

// ============================================================================
// Single-path effects
// ============================================================================

fn stereo(input: &AudioBuffer) -> GraphPlan {
    let mut graph = SignalGraph::new(input.sample_rate(), 2, input.len());
    let src = source(&mut graph, 1.0);
    let merger = graph.add(NodeSpec::ChannelMerger { inputs: 2 });
    let delay = graph.add(NodeSpec::Delay {
        delay_time: HAAS_DELAY,
        max_delay: HAAS_MAX_DELAY,
        feedback: 0.0,
    });

    if input.num_channels() == 1 {
        graph.connect_port(src, 0, merger, 0);
        graph.connect(src, delay);
    } else {
        let splitter = graph.add(NodeSpec::ChannelSplitter { outputs: 2 });
        graph.connect(src, splitter);
        graph.connect_port(splitter, 0, merger, 0);
        graph.connect_port(splitter, 1, delay, 0);
    }
    graph.connect_port(delay, 0, merger, 1);
    graph.connect(merger, graph.destination());

    GraphPlan::single(graph)
}

fn bass_boost(input: &AudioBuffer, config: &MergedConfig) -> Result<GraphPlan> {
    let mut graph = SignalGraph::new(input.sample_rate(), input.num_channels(), input.len());
    let src = source(&mut graph, 1.0);
    let shelf = graph.add(NodeSpec::BiquadFilter {
        kind: FilterKind::LowShelf,
        frequency: BASS_SHELF_FREQ,
        q: BASS_SHELF_Q,
        gain_db: config.require("gain")? as f32,
    });
    graph.connect(src, shelf);
    graph.connect(shelf, graph.destination());
    Ok(GraphPlan::single(graph))
}

fn echo(input: &AudioBuffer, config: &MergedConfig) -> Result<GraphPlan> {
    let delay_time = config.require("delayTime")?;
    let tail = (delay_time * input.sample_rate() as f64).ceil() as usize;

    let mut graph = SignalGraph::new(
        input.sample_rate(),
        input.num_channels(),
        input.len() + tail,
    );
    let src = source(&mut graph, 1.0);
    let delay = graph.add(NodeSpec::Delay {
        delay_time: delay_time as f32,
        max_delay: delay_time as f32,
        feedback: config.require("feedback")? as f32,
    });
    graph.connect(src, graph.destination());
    graph.connect(src, delay);
    graph.connect(delay, graph.destination());
    Ok(GraphPlan::single(graph))
}

/// Output length of a buffer played at `factor` times its speed
pub fn scaled_length(len: usize, factor: f64) -> usize {
    (len as f64 / factor).ceil() as usize
}

fn playback_rate(input: &AudioBuffer, config: &MergedConfig) -> Result<GraphPlan> {
    let factor = config.require("factor")?;
    let mut graph = SignalGraph::new(
        input.sample_rate(),
        input.num_channels(),
        scaled_length(input.len(), factor),
    );
    let src = source(&mut graph, factor as f32);
    graph.connect(src, graph.destination());
    Ok(GraphPlan::single(graph))
}

/// Oversampling factor for hq: configured, or derived from the reference rate
pub fn oversample_factor(configured: f64, sample_rate: u32, reference_rate: u32) -> u32 {
    let k = if configured > 0.0 {
        configured.round()
    } else {
        (reference_rate as f64 / sample_rate.max(1) as f64).round()
    };
    (k as u32).clamp(1, MAX_OVERSAMPLE)
}

fn hq(input: &AudioBuffer, config: &MergedConfig, options: &BuildOptions) -> Result<GraphPlan> {
    let rate = input.sample_rate();
    let k = oversample_factor(config.require("oversample")?, rate, options.hq_reference_rate);
    let channels = input.num_channels();

    let mut up = SignalGraph::new(rate * k, channels, input.len() * k as usize);
    let src = source(&mut up, 1.0);
    up.connect(src, up.destination());

    let mut down = SignalGraph::new(rate, channels, input.len());
    let src = source(&mut down, 1.0);
    down.connect(src, down.destination());

    debug!(factor = k, "Oversampling round trip");
    Ok(GraphPlan::single(up).then(Stage::Graph(down)))
}

fn reverb(
    input: &AudioBuffer,
    config: &MergedConfig,
    impulse: Option<Arc<AudioBuffer>>,
) -> Result<BuiltGraph> {
    let ir = impulse.ok_or_else(|| FxError::render("reverb requires an impulse response"))?;
    let mix = config.require("mix")?;
    let channels = if ir.num_channels() == 2 {
        2
    } else {
        input.num_channels()
    };

    let mut graph = SignalGraph::new(input.sample_rate(), channels, input.len());
    let src = source(&mut graph, 1.0);
    send(&mut graph, src, (1.0 - mix) as f32);
    reverb_send(&mut graph, src, ir, mix as f32);

    Ok(BuiltGraph {
        plan: GraphPlan::single(graph),
        gains: Some(GainStage {
            direct: (1.0 - mix) as f32,
            delay: 0.0,
            reverb: mix as f32,
        }),
        reverb_applied: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::params::schema;
    use crate::engine::io::generate_test_tone;

    fn defaults(kind: EffectKind) -> MergedConfig {
        MergedConfig::defaults(schema(kind))
    }

    fn impulse() -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::from_channels(vec![vec![1.0, 0.5, 0.25]], 8000).unwrap())
    }

    fn graph_of(built: &BuiltGraph) -> &SignalGraph {
        match &built.plan.stages()[0] {
            Stage::Graph(graph) => graph,
            Stage::Reverse => panic!("expected a signal graph"),
        }
    }

    #[test]
    fn test_every_effect_builds_a_valid_plan() {
        let input = generate_test_tone(220.0, 0.05, 8000);
        for kind in EffectKind::ALL {
            let ir = if kind.uses_reverb() {
                ImpulseResponseState::Available(impulse())
            } else {
                ImpulseResponseState::NotRequested
            };
            let built =
                build_graph(kind, &input, &defaults(kind), ir, &BuildOptions::default()).unwrap();
            for stage in built.plan.stages() {
                if let Stage::Graph(graph) = stage {
                    graph.validate().unwrap();
                }
            }
            assert_eq!(built.reverb_applied, kind.uses_reverb());
        }
    }

    #[test]
    fn test_eight_d_falls_back_without_reverb() {
        let input = generate_test_tone(220.0, 0.05, 8000);
        let err = FxError::Fetch {
            url: "ir.wav".to_string(),
            reason: "offline".to_string(),
        };
        let built = build_graph(
            EffectKind::EightD,
            &input,
            &defaults(EffectKind::EightD),
            ImpulseResponseState::Unavailable(err),
            &BuildOptions::default(),
        )
        .unwrap();
        assert!(!built.reverb_applied);
        let graph = graph_of(&built);
        assert!(!graph
            .nodes()
            .iter()
            .any(|n| matches!(n, NodeSpec::Convolver { .. })));
        let gains = built.gains.unwrap();
        assert!((gains.total() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reverb_only_propagates_fetch_error() {
        let input = generate_test_tone(220.0, 0.05, 8000);
        let err = FxError::Fetch {
            url: "ir.wav".to_string(),
            reason: "offline".to_string(),
        };
        let result = build_graph(
            EffectKind::Reverb,
            &input,
            &defaults(EffectKind::Reverb),
            ImpulseResponseState::Unavailable(err),
            &BuildOptions::default(),
        );
        assert_eq!(result.unwrap_err().error_code(), "FETCH_ERROR");
    }

    #[test]
    fn test_echo_extends_length() {
        let input = generate_test_tone(220.0, 0.1, 8000);
        let built = build_graph(
            EffectKind::Echo,
            &input,
            &defaults(EffectKind::Echo),
            ImpulseResponseState::NotRequested,
            &BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(graph_of(&built).length(), 800 + 2400);
    }

    #[test]
    fn test_playback_length() {
        assert_eq!(scaled_length(1000, 1.25), 800);
        assert_eq!(scaled_length(1000, 0.8), 1250);
        assert_eq!(scaled_length(1001, 1.0), 1001);
        assert_eq!(scaled_length(10, 3.0), 4);
    }

    #[test]
    fn test_oversample_factor() {
        assert_eq!(oversample_factor(0.0, 48000, 192000), 4);
        assert_eq!(oversample_factor(0.0, 96000, 192000), 2);
        assert_eq!(oversample_factor(0.0, 192000, 192000), 1);
        assert_eq!(oversample_factor(0.0, 8000, 192000), 4);
        assert_eq!(oversample_factor(3.0, 44100, 192000), 3);
    }

    #[test]
    fn test_stereo_widening_outputs_two_channels() {
        let input = generate_test_tone(220.0, 0.05, 8000);
        let plan = stereo(&input);
        match &plan.stages()[0] {
            Stage::Graph(graph) => assert_eq!(graph.channels(), 2),
            Stage::Reverse => panic!("expected a signal graph"),
        }
    }
}
