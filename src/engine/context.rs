//! Render pipeline and editing session
//!
//! [`Engine`] runs one render at a time: merge the config, obtain the impulse
//! response if the effect has a reverb path, build the graph plan, execute it
//! on a blocking worker while publishing progress, and validate the result.
//!
//! [`EngineContext`] is a session on top of it. It keeps the decoded original
//! and the last good result; every effect is applied to the original, and a
//! failed render leaves the current buffer untouched.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dsp::{DspRuntime, NativeRuntime};
use crate::effects::{
    BuildOptions, ConfigWarning, EffectKind, EffectRegistry, GainStage, ImpulseResponseState,
    MergedConfig, Overrides,
};
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{import_audio, AudioDecoder, WavDecoder};
use crate::engine::state::{ProcessingState, ProcessingStateMachine, RenderTicket};
use crate::engine::wav::{encode_wav, write_wav};
use crate::error::{FxError, Result};
use crate::graph::{GraphPlan, RenderProgress, Renderer};
use crate::ir::{ByteFetcher, DefaultFetcher, FileFetcher, ImpulseResponseCache};

// ============================================================================
// Requests and results
// ============================================================================

/// An effect plus caller overrides
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub effect: EffectKind,
    pub overrides: Overrides,
}

impl RenderRequest {
    pub fn new(effect: EffectKind) -> Self {
        Self {
            effect,
            overrides: Overrides::new(),
        }
    }

    /// Request by string id
    pub fn parse(id: &str) -> Result<Self> {
        Ok(Self::new(id.parse()?))
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides.extend(overrides);
        self
    }
}

/// What a render did, minus the audio
#[derive(Debug, Clone, Serialize)]
pub struct RenderReport {
    pub id: Uuid,
    pub effect: EffectKind,
    pub config: MergedConfig,
    pub warnings: Vec<ConfigWarning>,
    pub gains: Option<GainStage>,
    pub reverb_applied: bool,
    /// SHA-256 of the impulse response bytes used, if any
    pub impulse_response_digest: Option<String>,
    pub sample_rate: u32,
    pub channels: usize,
    pub input_frames: usize,
    pub output_frames: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub buffer: AudioBuffer,
    pub report: RenderReport,
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    config: EngineConfig,
    registry: &'static EffectRegistry,
    impulse_responses: Arc<ImpulseResponseCache>,
    decoder: Arc<dyn AudioDecoder>,
    runtime: Arc<dyn DspRuntime>,
    state: ProcessingStateMachine,
    progress: watch::Sender<f32>,
}

impl Engine {
    /// Engine with the native runtime, WAV decoding and local/http fetching
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (progress, _) = watch::channel(0.0);
        Ok(Self {
            config,
            registry: EffectRegistry::global(),
            impulse_responses: Arc::new(ImpulseResponseCache::new(Arc::new(
                DefaultFetcher::new(FileFetcher::new()),
            ))),
            decoder: Arc::new(WavDecoder),
            runtime: Arc::new(NativeRuntime),
            state: ProcessingStateMachine::new(),
            progress,
        })
    }

    /// Replace the byte fetcher (and with it the impulse response cache)
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ByteFetcher>) -> Self {
        self.impulse_responses = Arc::new(ImpulseResponseCache::new(fetcher));
        self
    }

    /// Share an existing impulse response cache
    pub fn with_impulse_responses(mut self, cache: Arc<ImpulseResponseCache>) -> Self {
        self.impulse_responses = cache;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn DspRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &'static EffectRegistry {
        self.registry
    }

    pub fn impulse_responses(&self) -> &Arc<ImpulseResponseCache> {
        &self.impulse_responses
    }

    pub fn state(&self) -> ProcessingState {
        self.state.state()
    }

    /// Render progress in `[0, 1]`, updated while rendering
    pub fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    /// Decode audio with the engine's decoder
    pub fn decode(&self, bytes: &[u8]) -> Result<AudioBuffer> {
        self.decoder.decode(bytes)
    }

    pub async fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        import_audio(path, self.decoder.as_ref()).await
    }

    /// Warm the impulse response cache
    ///
    /// Failure is logged and tolerated: reverb paths fall back at render time.
    pub async fn preload_impulse_response(&self) -> bool {
        let url = &self.config.impulse_response_url;
        match self.impulse_responses.get_raw_bytes(url).await {
            Ok(_) => {
                info!(url = %url, "Impulse response preloaded");
                true
            }
            Err(err) => {
                warn!(url = %url, error = %err, "Impulse response preload failed");
                false
            }
        }
    }

    /// Render `request` against `input`
    ///
    /// Rejected with [`FxError::RenderInProgress`] while another render is in
    /// flight. The input is never modified.
    ///
    /// Dropping the returned future does not end the render early: once the
    /// graph is executing, the engine stays `Rendering` until the worker
    /// returns.
    pub async fn render(
        &self,
        input: Arc<AudioBuffer>,
        request: &RenderRequest,
    ) -> Result<RenderOutput> {
        let mut ticket = Some(self.state.try_begin()?);
        let id = Uuid::new_v4();
        let span = info_span!("render", %id, effect = %request.effect);

        self.progress.send_replace(0.0);
        let result = self.run(id, input, request, &mut ticket).instrument(span).await;

        match &result {
            Ok(_) => {
                self.progress.send_replace(1.0);
                if let Some(ticket) = ticket {
                    ticket.succeed();
                }
            }
            Err(err) => {
                self.progress.send_replace(0.0);
                warn!(%id, effect = %request.effect, error = %err, "Render failed");
                if let Some(ticket) = ticket {
                    ticket.fail();
                }
            }
        }
        result
    }

    async fn run(
        &self,
        id: Uuid,
        input: Arc<AudioBuffer>,
        request: &RenderRequest,
        ticket: &mut Option<RenderTicket>,
    ) -> Result<RenderOutput> {
        let started = Instant::now();
        let descriptor = self.registry.get(request.effect);
        info!(
            frames = input.len(),
            channels = input.num_channels(),
            sample_rate = input.sample_rate(),
            "Render started"
        );

        let merged = descriptor.merge(&request.overrides);
        let (impulse, digest) = if descriptor.uses_reverb {
            self.load_impulse_response(input.sample_rate()).await
        } else {
            (ImpulseResponseState::NotRequested, None)
        };

        let options = BuildOptions {
            hq_reference_rate: self.config.hq_reference_rate,
        };
        let built = descriptor.build(&input, &merged.config, impulse, &options)?;
        let digest = digest.filter(|_| built.reverb_applied);

        let buffer = self.execute(built.plan, input.clone(), ticket).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(frames = buffer.len(), elapsed_ms, "Render complete");

        let report = RenderReport {
            id,
            effect: request.effect,
            config: merged.config,
            warnings: merged.warnings,
            gains: built.gains,
            reverb_applied: built.reverb_applied,
            impulse_response_digest: digest,
            sample_rate: buffer.sample_rate(),
            channels: buffer.num_channels(),
            input_frames: input.len(),
            output_frames: buffer.len(),
            elapsed_ms,
        };
        Ok(RenderOutput { buffer, report })
    }

    /// Fetch (cached) and decode (per render) the impulse response
    async fn load_impulse_response(&self, sample_rate: u32) -> (ImpulseResponseState, Option<String>) {
        let url = &self.config.impulse_response_url;
        let ir = match self.impulse_responses.get_raw_bytes(url).await {
            Ok(ir) => ir,
            Err(err) => return (ImpulseResponseState::Unavailable(err), None),
        };
        match ir.decode_for(self.decoder.as_ref(), sample_rate) {
            Ok(buffer) => {
                debug!(url = %url, frames = buffer.len(), channels = buffer.num_channels(), "Impulse response decoded");
                (
                    ImpulseResponseState::Available(Arc::new(buffer)),
                    Some(ir.digest().to_string()),
                )
            }
            Err(err) => (ImpulseResponseState::Unavailable(err), None),
        }
    }

    /// Run the renderer on a blocking worker, publishing progress meanwhile
    ///
    /// The ticket rides along with the worker and is handed back when it
    /// returns, so an abandoned render keeps the machine busy until then.
    async fn execute(
        &self,
        plan: GraphPlan,
        input: Arc<AudioBuffer>,
        ticket: &mut Option<RenderTicket>,
    ) -> Result<AudioBuffer> {
        let progress = Arc::new(RenderProgress::new(plan.expected_duration_secs()));
        let renderer = Renderer::new(self.runtime.clone(), self.config.render_quantum);
        debug!(runtime = self.runtime.name(), quantum = renderer.quantum(), "Executing plan");

        let worker_progress = progress.clone();
        let worker_ticket = ticket.take();
        let mut task = tokio::task::spawn_blocking(move || {
            let rendered = renderer.render(&plan, input, &worker_progress);
            (rendered, worker_ticket)
        });

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.progress_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let joined = loop {
            tokio::select! {
                joined = &mut task => break joined,
                _ = ticker.tick() => {
                    self.progress.send_replace(progress.fraction());
                }
            }
        };

        let (rendered, returned) =
            joined.map_err(|e| FxError::render(format!("render worker failed: {}", e)))?;
        *ticket = returned;
        rendered
    }
}

// ============================================================================
// Session
// ============================================================================

/// Editing session: original audio, last good result, last render report
pub struct EngineContext {
    engine: Arc<Engine>,
    original: Option<Arc<AudioBuffer>>,
    current: Option<Arc<AudioBuffer>>,
    last_report: Option<RenderReport>,
}

impl EngineContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            original: None,
            current: None,
            last_report: None,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Start a session on `buffer`
    pub fn load(&mut self, buffer: AudioBuffer) {
        let buffer = Arc::new(buffer);
        self.original = Some(buffer.clone());
        self.current = Some(buffer);
        self.last_report = None;
    }

    /// Decode a file and start a session on it
    pub async fn load_file(&mut self, path: &Path) -> Result<()> {
        let buffer = self.engine.decode_file(path).await?;
        info!(
            path = %path.display(),
            frames = buffer.len(),
            channels = buffer.num_channels(),
            sample_rate = buffer.sample_rate(),
            "Audio loaded"
        );
        self.load(buffer);
        Ok(())
    }

    pub fn original(&self) -> Option<&Arc<AudioBuffer>> {
        self.original.as_ref()
    }

    pub fn current(&self) -> Option<&Arc<AudioBuffer>> {
        self.current.as_ref()
    }

    pub fn last_report(&self) -> Option<&RenderReport> {
        self.last_report.as_ref()
    }

    pub fn last_effect(&self) -> Option<EffectKind> {
        self.last_report.as_ref().map(|r| r.effect)
    }

    pub fn last_config(&self) -> Option<&MergedConfig> {
        self.last_report.as_ref().map(|r| &r.config)
    }

    /// Apply an effect to the original audio
    ///
    /// On success the result becomes the current buffer. On failure the
    /// current buffer is kept and the error returned.
    pub async fn apply(&mut self, request: &RenderRequest) -> Result<&RenderReport> {
        let original = self.original.clone().ok_or_else(|| FxError::InvalidAudio {
            reason: "no audio loaded".to_string(),
        })?;

        match self.engine.render(original, request).await {
            Ok(output) => {
                self.current = Some(Arc::new(output.buffer));
                let report: &RenderReport = self.last_report.insert(output.report);
                Ok(report)
            }
            Err(err) => {
                warn!(effect = %request.effect, "Keeping previous buffer");
                Err(err)
            }
        }
    }

    /// Discard applied effects
    pub fn revert(&mut self) {
        self.current = self.original.clone();
        self.last_report = None;
    }

    /// Encode the current buffer as WAV
    pub fn encode_current(&self) -> Result<Option<Vec<u8>>> {
        self.current.as_deref().map(encode_wav).transpose()
    }

    /// Write the current buffer to `path`
    pub async fn export(&self, path: &Path) -> Result<()> {
        let current = self.current.as_ref().ok_or_else(|| FxError::InvalidAudio {
            reason: "no audio loaded".to_string(),
        })?;
        write_wav(current, path).await?;
        info!(path = %path.display(), "Exported");
        Ok(())
    }
}
