//! Impulse responses: byte fetching and the shared cache

pub mod cache;
pub mod fetch;

pub use cache::{ImpulseResponse, ImpulseResponseCache};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{ByteFetcher, DefaultFetcher, FetchFuture, FileFetcher, MemoryFetcher};

/// Impulse response used by the reverb paths unless configured otherwise
pub const DEFAULT_IMPULSE_RESPONSE_URL: &str = "assets/irs/default_reverb.wav";
