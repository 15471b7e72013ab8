//! Effect catalog: identifiers, parameter schemas, config merging, gain
//! staging and graph construction

pub mod builder;
pub mod gain;
pub mod kind;
pub mod merge;
pub mod params;
pub mod registry;

pub use builder::{build_graph, BuildOptions, BuiltGraph, ImpulseResponseState};
pub use gain::{stage_gains, GainStage};
pub use kind::EffectKind;
pub use merge::{merge, ConfigWarning, MergeOutcome, MergedConfig, Overrides};
pub use params::ParamSpec;
pub use registry::{EffectDescriptor, EffectRegistry};
