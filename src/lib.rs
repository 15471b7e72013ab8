//! fxrender - Offline Audio Effect Renderer
//!
//! Applies one of a fixed catalog of effects (spatial orbits, stereo
//! widening, reverse, bass boost, echo, playback-rate shifts, oversampled
//! rendering, convolution reverb) to a decoded audio buffer and renders the
//! result offline.
//!
//! # Architecture
//!
//! - `effects`: effect ids, parameter schemas, config merging, gain staging
//!   and the graph builder
//! - `graph`: signal graph plans and the block renderer
//! - `dsp`: the primitive processors the renderer instantiates
//! - `ir`: impulse response fetching and caching
//! - `engine`: buffers, WAV I/O, the processing state machine and the render
//!   pipeline

pub mod cli;
pub mod config;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ir;

pub use config::EngineConfig;
pub use effects::{EffectKind, EffectRegistry};
pub use engine::{AudioBuffer, Engine, EngineContext, RenderOutput, RenderReport, RenderRequest};
pub use error::{FxError, Result};
