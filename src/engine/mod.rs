//! Audio Engine Module
//!
//! Buffers, decoding and WAV encoding, the processing state machine and the
//! render pipeline that ties effects, impulse responses and graphs together.

pub mod buffer;
pub mod context;
pub mod io;
pub mod state;
pub mod wav;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use context::{Engine, EngineContext, RenderOutput, RenderReport, RenderRequest};
pub use io::{
    generate_stereo_test_tone, generate_test_tone, import_audio, resample_to, AudioDecoder,
    WavDecoder,
};
pub use state::{ProcessingState, ProcessingStateMachine, RenderTicket};
pub use wav::{encode_wav, output_file_name, write_wav};
