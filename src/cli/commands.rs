//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::effects::{EffectRegistry, Overrides};
use crate::engine::{output_file_name, Engine, EngineContext, RenderRequest};
use crate::error::{FxError, Result};

/// Arguments of the `render` command
#[derive(Debug, Clone)]
pub struct RenderArgs {
    pub input: PathBuf,
    pub effect: String,
    /// Raw `key=value` overrides
    pub overrides: Vec<String>,
    pub config: Option<PathBuf>,
    pub impulse_response: Option<String>,
    pub output: Option<PathBuf>,
    pub print_report: bool,
}

/// Render an effect onto a WAV file.
pub async fn render(args: RenderArgs) -> Result<()> {
    let request = RenderRequest::parse(&args.effect)?.with_overrides(parse_overrides(&args.overrides)?);

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).await?,
        None => EngineConfig::default(),
    }
    .with_env();
    if let Some(url) = args.impulse_response {
        config.impulse_response_url = url;
    }

    let engine = Arc::new(Engine::new(config)?);
    if engine.config().preload_impulse_response {
        engine.preload_impulse_response().await;
    }

    let mut progress = engine.subscribe_progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let fraction = *progress.borrow_and_update();
            debug!(percent = (fraction * 100.0).round(), "Progress");
        }
    });

    let mut context = EngineContext::new(engine);
    context.load_file(&args.input).await?;
    let result = context.apply(&request).await.map(|report| report.clone());
    watcher.abort();
    let report = result?;

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&args.input, request.effect.id()));
    context.export(&output).await?;

    println!(
        "Rendered {} -> {} ({} ch, {} frames, {} Hz)",
        request.effect,
        output.display(),
        report.channels,
        report.output_frames,
        report.sample_rate
    );
    if report.effect.uses_reverb() && !report.reverb_applied {
        println!("Reverb skipped: impulse response unavailable");
    }
    if args.print_report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// List every effect and its parameters.
pub fn list_effects(json: bool) -> Result<()> {
    let registry = EffectRegistry::global();

    if json {
        let descriptors: Vec<_> = registry.descriptors().collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("Effects:");
    println!("{:-<60}", "");
    for descriptor in registry.descriptors() {
        let reverb = if descriptor.uses_reverb { " [reverb]" } else { "" };
        println!("{:<10} {}{}", descriptor.id(), descriptor.name, reverb);
        for param in descriptor.params {
            println!(
                "    {:<16} default {:<8} range [{}, {}]",
                param.name, param.default, param.min, param.max
            );
        }
    }

    Ok(())
}

/// Print the header fields of a WAV file.
pub fn show_info(path: &Path) -> Result<()> {
    info!("Reading header: {}", path.display());

    let reader = hound::WavReader::open(path).map_err(|e| FxError::decode(e.to_string()))?;
    let spec = reader.spec();
    let frames = reader.duration();

    println!("File:        {}", path.display());
    println!("Channels:    {}", spec.channels);
    println!("Sample rate: {} Hz", spec.sample_rate);
    println!("Format:      {:?} {}-bit", spec.sample_format, spec.bits_per_sample);
    println!("Frames:      {}", frames);
    println!(
        "Duration:    {:.3} s",
        frames as f64 / spec.sample_rate.max(1) as f64
    );

    Ok(())
}

/// Parse `key=value` overrides; values are JSON when they parse, strings otherwise
pub fn parse_overrides(raw: &[String]) -> Result<Overrides> {
    let mut overrides = Overrides::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| FxError::ConfigInvalid {
            param: entry.clone(),
            reason: "expected key=value".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(FxError::ConfigInvalid {
                param: entry.clone(),
                reason: "empty key".to_string(),
            });
        }
        let value = value.trim();
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        overrides.insert(key.to_string(), value);
    }
    Ok(overrides)
}

fn default_output_path(input: &Path, effect_id: &str) -> PathBuf {
    let name = output_file_name(input, effect_id);
    match input.parent() {
        Some(dir) => dir.join(name),
        None => name,
    }
}
