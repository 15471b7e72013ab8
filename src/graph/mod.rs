//! Signal graphs: plans, rendering and progress

pub mod plan;
pub mod progress;
pub mod render;

pub use plan::{
    Connection, FilterKind, GraphPlan, NodeId, NodeSpec, ParamId, SignalGraph, Stage, Target,
    Waveform,
};
pub use progress::RenderProgress;
pub use render::{Renderer, DEFAULT_QUANTUM};
