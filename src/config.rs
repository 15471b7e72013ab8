//! Engine configuration
//!
//! Loaded from JSON; every field is optional and falls back to its default.
//! `FXRENDER_IR_URL` overrides the impulse response location.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FxError, Result};
use crate::graph::DEFAULT_QUANTUM;
use crate::ir::DEFAULT_IMPULSE_RESPONSE_URL;

/// Environment variable overriding [`EngineConfig::impulse_response_url`]
pub const IR_URL_ENV: &str = "FXRENDER_IR_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path or URL of the reverb impulse response
    pub impulse_response_url: String,
    /// How often render progress is published
    pub progress_interval_ms: u64,
    /// Frames per render quantum (also the convolution partition size)
    pub render_quantum: usize,
    /// Reference rate for the hq effect's automatic oversampling factor
    pub hq_reference_rate: u32,
    /// Fetch the impulse response when the engine starts
    pub preload_impulse_response: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            impulse_response_url: DEFAULT_IMPULSE_RESPONSE_URL.to_string(),
            progress_interval_ms: 100,
            render_quantum: DEFAULT_QUANTUM,
            hq_reference_rate: 192_000,
            preload_impulse_response: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::from_json(&text)
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = env::var(IR_URL_ENV) {
            if !url.trim().is_empty() {
                self.impulse_response_url = url;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |param: &str, reason: &str| FxError::ConfigInvalid {
            param: param.to_string(),
            reason: reason.to_string(),
        };
        if self.render_quantum == 0 {
            return Err(invalid("render_quantum", "must be at least 1 frame"));
        }
        if self.progress_interval_ms == 0 {
            return Err(invalid("progress_interval_ms", "must be at least 1 ms"));
        }
        if self.hq_reference_rate == 0 {
            return Err(invalid("hq_reference_rate", "must be positive"));
        }
        if self.impulse_response_url.trim().is_empty() {
            return Err(invalid("impulse_response_url", "must not be empty"));
        }
        Ok(())
    }
}
