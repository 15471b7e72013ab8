//! Error handling for fxrender
//!
//! Every fallible operation in the crate returns [`FxError`]. Errors carry enough
//! context for the orchestration layer to show a message and decide whether the
//! user can retry.

use thiserror::Error;

/// Result type alias for fxrender operations
pub type Result<T> = std::result::Result<T, FxError>;

/// Main error type for fxrender operations
#[derive(Error, Debug)]
pub enum FxError {
    // Runtime capability errors
    #[error("DSP capability unsupported: {capability}")]
    CapabilityUnsupported { capability: String },

    // Impulse response errors
    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to decode audio: {reason}")]
    Decode { reason: String },

    // Rendering errors
    #[error("Render failed: {reason}")]
    Render { reason: String },

    #[error("A render is already in progress")]
    RenderInProgress,

    // Configuration errors
    #[error("Invalid value for '{param}': {reason}")]
    ConfigInvalid { param: String, reason: String },

    #[error("Unknown effect: {id}")]
    UnknownEffect { id: String },

    // Audio shape errors
    #[error("Invalid audio buffer: {reason}")]
    InvalidAudio { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FxError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::CapabilityUnsupported { .. } => "CAPABILITY_UNSUPPORTED",
            FxError::Fetch { .. } => "FETCH_ERROR",
            FxError::Decode { .. } => "DECODE_ERROR",
            FxError::Render { .. } => "RENDER_ERROR",
            FxError::RenderInProgress => "RENDER_IN_PROGRESS",
            FxError::ConfigInvalid { .. } => "CONFIG_INVALID",
            FxError::UnknownEffect { .. } => "UNKNOWN_EFFECT",
            FxError::InvalidAudio { .. } => "INVALID_AUDIO",
            FxError::Io(_) => "IO_ERROR",
            FxError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the engine usable; resubmitting (possibly with
    /// different input) may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FxError::Fetch { .. }
                | FxError::Decode { .. }
                | FxError::RenderInProgress
                | FxError::ConfigInvalid { .. }
                | FxError::UnknownEffect { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            FxError::CapabilityUnsupported { .. } => vec![
                "The configured DSP runtime cannot execute this effect",
                "Use the native runtime or pick a different effect",
            ],
            FxError::Fetch { .. } => vec![
                "Check the impulse response path or URL",
                "Effects other than 'reverb' still render without the reverb path",
                "Retry: failed fetches are not cached",
            ],
            FxError::Decode { .. } => vec![
                "Convert the file to PCM WAV first",
                "Only mono and stereo audio is supported",
            ],
            FxError::Render { .. } => vec![
                "The previous buffer has been kept",
                "Try reducing extreme parameter values",
            ],
            FxError::RenderInProgress => vec!["Wait for the current render to finish, then resubmit"],
            FxError::UnknownEffect { .. } => vec![
                "Run 'fxrender-cli effects' to list the available effects",
            ],
            _ => vec![],
        }
    }

    /// Shorthand for a render failure
    pub(crate) fn render(reason: impl Into<String>) -> Self {
        FxError::Render {
            reason: reason.into(),
        }
    }

    /// Shorthand for a decode failure
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        FxError::Decode {
            reason: reason.into(),
        }
    }
}
