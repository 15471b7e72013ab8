//! Integration Tests
//!
//! End-to-end renders through the engine: effect catalog, length and gain
//! invariants, concurrency rejection and impulse response sharing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;
use test_case::test_case;
use tokio::sync::Notify;

use fxrender::engine::{
    encode_wav, generate_stereo_test_tone, generate_test_tone, ProcessingState,
};
use fxrender::dsp::{
    Block, DspRuntime, NativeRuntime, NodeProcessor, ParamBlock, ProcessorContext,
};
use fxrender::graph::NodeSpec;
use fxrender::ir::{ByteFetcher, FetchFuture, ImpulseResponseCache, MemoryFetcher};
use fxrender::{AudioBuffer, EffectKind, Engine, EngineConfig, EngineContext, FxError, RenderRequest};

const IR_URL: &str = "mem://hall";
const RATE: u32 = 8000;

/// Short decaying mono impulse response, WAV encoded
fn impulse_bytes() -> Vec<u8> {
    let samples = (0..64).map(|i| 0.6 * 0.9f32.powi(i)).collect();
    encode_wav(&AudioBuffer::from_channels(vec![samples], RATE).unwrap()).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        impulse_response_url: IR_URL.to_string(),
        progress_interval_ms: 5,
        ..EngineConfig::default()
    }
}

fn engine_with(fetcher: Arc<dyn ByteFetcher>) -> Engine {
    Engine::new(config()).unwrap().with_fetcher(fetcher)
}

fn engine() -> Engine {
    engine_with(Arc::new(MemoryFetcher::new().with_entry(IR_URL, impulse_bytes())))
}

fn stereo_input() -> Arc<AudioBuffer> {
    Arc::new(generate_stereo_test_tone(220.0, 330.0, 0.1, RATE))
}

/// Holds every fetch until released
struct GatedFetcher {
    gate: Notify,
    released: AtomicBool,
    bytes: Vec<u8>,
}

impl GatedFetcher {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            gate: Notify::new(),
            released: AtomicBool::new(false),
            bytes,
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.gate.notify_waiters();
        self.gate.notify_one();
    }
}

impl ByteFetcher for GatedFetcher {
    fn fetch<'a>(&'a self, _url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            if !self.released.load(Ordering::SeqCst) {
                self.gate.notified().await;
            }
            Ok(self.bytes.clone())
        })
    }
}

/// Native processors that take a nap on every block
struct SlowRuntime {
    nap: Duration,
}

struct SlowProcessor {
    inner: Box<dyn NodeProcessor>,
    nap: Duration,
}

impl NodeProcessor for SlowProcessor {
    fn process(&mut self, frames: usize, inputs: &[Block], params: &ParamBlock) -> Vec<Block> {
        std::thread::sleep(self.nap);
        self.inner.process(frames, inputs, params)
    }
}

impl DspRuntime for SlowRuntime {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn create_processor(
        &self,
        spec: &NodeSpec,
        ctx: &ProcessorContext,
    ) -> fxrender::Result<Box<dyn NodeProcessor>> {
        let inner = NativeRuntime.create_processor(spec, ctx)?;
        Ok(Box::new(SlowProcessor {
            inner,
            nap: self.nap,
        }))
    }
}

/// Native runtime without biquad filters
struct NoFilterRuntime;

impl DspRuntime for NoFilterRuntime {
    fn name(&self) -> &'static str {
        "no-filter"
    }

    fn create_processor(
        &self,
        spec: &NodeSpec,
        ctx: &ProcessorContext,
    ) -> fxrender::Result<Box<dyn NodeProcessor>> {
        match spec {
            NodeSpec::BiquadFilter { .. } => Err(FxError::CapabilityUnsupported {
                capability: "biquad-filter".to_string(),
            }),
            _ => NativeRuntime.create_processor(spec, ctx),
        }
    }
}

// === Catalog ===

#[test_case("8d" ; "eight_d")]
#[test_case("16d" ; "sixteen_d")]
#[test_case("32d" ; "thirty_two_d")]
#[test_case("64d" ; "sixty_four_d")]
#[test_case("stereo" ; "stereo")]
#[test_case("reverse" ; "reverse")]
#[test_case("bassboost" ; "bass_boost")]
#[test_case("echo" ; "echo")]
#[test_case("pitchup" ; "pitch_up")]
#[test_case("pitchdown" ; "pitch_down")]
#[test_case("speedup" ; "speed_up")]
#[test_case("slowdown" ; "slow_down")]
#[test_case("hq" ; "hq")]
#[test_case("reverb" ; "reverb")]
#[tokio::test]
async fn test_every_effect_renders(id: &str) {
    let engine = engine();
    let input = stereo_input();
    let output = engine
        .render(input.clone(), &RenderRequest::parse(id).unwrap())
        .await
        .unwrap();

    let buffer = &output.buffer;
    assert!(matches!(buffer.num_channels(), 1 | 2));
    assert_eq!(buffer.sample_rate(), input.sample_rate());
    assert!(!buffer.is_empty());
    assert!(buffer.is_finite());
    assert_eq!(output.report.effect.id(), id);
    assert_eq!(engine.state(), ProcessingState::Idle);
}

#[tokio::test]
async fn test_spatial_effects_are_stereo_at_input_length() {
    let engine = engine();
    let input = Arc::new(generate_test_tone(440.0, 0.1, RATE));
    for kind in [
        EffectKind::EightD,
        EffectKind::SixteenD,
        EffectKind::ThirtyTwoD,
        EffectKind::SixtyFourD,
    ] {
        let output = engine
            .render(input.clone(), &RenderRequest::new(kind))
            .await
            .unwrap();
        assert_eq!(output.buffer.num_channels(), 2, "{}", kind);
        assert_eq!(output.buffer.len(), input.len(), "{}", kind);
    }
}

// === Invariants ===

#[tokio::test]
async fn test_reverse_twice_is_identity() {
    let engine = engine();
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::Reverse);
    let once = engine.render(input.clone(), &request).await.unwrap();
    let twice = engine
        .render(Arc::new(once.buffer), &request)
        .await
        .unwrap();
    assert_eq!(twice.buffer, *input);
}

#[tokio::test]
async fn test_unit_playback_rate_is_identity() {
    let engine = engine();
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::PitchUp).with_override("factor", 1.0);
    let output = engine.render(input.clone(), &request).await.unwrap();
    assert_eq!(output.buffer, *input);
}

#[tokio::test]
async fn test_playback_rate_scales_length() {
    let engine = engine();
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::SlowDown).with_override("factor", 0.5);
    let output = engine.render(input.clone(), &request).await.unwrap();
    assert_eq!(output.buffer.len(), input.len() * 2);
}

#[tokio::test]
async fn test_echo_extends_by_delay_time() {
    let engine = engine();
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::Echo).with_override("delayTime", 0.25);
    let output = engine.render(input.clone(), &request).await.unwrap();
    assert_eq!(output.buffer.len(), input.len() + 2000);
}

#[tokio::test]
async fn test_gain_stage_sums_to_unity() {
    let engine = engine();
    let input = stereo_input();
    for kind in EffectKind::ALL.into_iter().filter(|k| k.uses_reverb()) {
        let output = engine
            .render(input.clone(), &RenderRequest::new(kind))
            .await
            .unwrap();
        let gains = output.report.gains.unwrap();
        assert_abs_diff_eq!(gains.total(), 1.0, epsilon = 1e-5);
        assert!(output.report.reverb_applied);
    }
}

#[tokio::test]
async fn test_gain_total_survives_reverb_fallback() {
    let with_reverb = engine();
    let without_reverb = engine_with(Arc::new(MemoryFetcher::new()));
    let request = RenderRequest::new(EffectKind::EightD).with_override("reverbMix", 0.3);

    let a = with_reverb.render(stereo_input(), &request).await.unwrap();
    let b = without_reverb.render(stereo_input(), &request).await.unwrap();
    let (a, b) = (a.report.gains.unwrap(), b.report.gains.unwrap());
    assert_eq!(b.reverb, 0.0);
    assert_abs_diff_eq!(a.total(), b.total(), epsilon = 1e-5);
}

#[tokio::test]
async fn test_clamped_override_is_reported() {
    let engine = engine();
    let request = RenderRequest::new(EffectKind::Echo).with_override("feedback", 3.0);
    let output = engine.render(stereo_input(), &request).await.unwrap();
    assert_eq!(output.report.config.get("feedback"), Some(0.95));
    assert_eq!(output.report.warnings.len(), 1);
}

#[tokio::test]
async fn test_render_is_deterministic() {
    let engine = engine();
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::ThirtyTwoD);
    let a = engine.render(input.clone(), &request).await.unwrap();
    let b = engine.render(input, &request).await.unwrap();
    assert_eq!(a.buffer, b.buffer);
}

#[test]
fn test_encoded_header_size() {
    let buffer = AudioBuffer::from_channels(vec![vec![0.0; 100], vec![0.0; 100]], 44100).unwrap();
    let bytes = encode_wav(&buffer).unwrap();
    assert_eq!(bytes.len(), 444);
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..16], b"WAVEfmt ");
    assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 436);
    assert_eq!(&bytes[36..40], b"data");
    assert_eq!(u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]), 400);
    assert!(bytes[44..].iter().all(|&b| b == 0));
}

// === Failure handling ===

#[tokio::test]
async fn test_reverb_without_impulse_response_fails() {
    let engine = engine_with(Arc::new(MemoryFetcher::new()));
    let err = engine
        .render(stereo_input(), &RenderRequest::new(EffectKind::Reverb))
        .await
        .unwrap_err();
    assert!(matches!(err, FxError::Fetch { .. }));
    assert_eq!(err.error_code(), "FETCH_ERROR");
}

#[tokio::test]
async fn test_unknown_effect_is_rejected() {
    let err = RenderRequest::parse("flanger").unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_EFFECT");
}

#[tokio::test]
async fn test_session_keeps_last_good_buffer() {
    let engine = Arc::new(engine_with(Arc::new(MemoryFetcher::new())));
    let mut context = EngineContext::new(engine);
    context.load(generate_test_tone(440.0, 0.1, RATE));

    context
        .apply(&RenderRequest::new(EffectKind::Stereo))
        .await
        .unwrap();
    let widened = context.current().unwrap().clone();
    assert_eq!(widened.num_channels(), 2);

    assert!(context
        .apply(&RenderRequest::new(EffectKind::Reverb))
        .await
        .is_err());
    assert_eq!(context.current().unwrap(), &widened);
    assert_eq!(context.last_effect(), Some(EffectKind::Stereo));
    assert_eq!(
        context.encode_current().unwrap().map(|b| b.len()),
        Some(44 + widened.len() * 4)
    );
}

#[tokio::test]
async fn test_unsupported_node_surfaces_capability_error() {
    let engine = engine().with_runtime(Arc::new(NoFilterRuntime));
    let err = engine
        .render(stereo_input(), &RenderRequest::new(EffectKind::BassBoost))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CAPABILITY_UNSUPPORTED");
    assert_eq!(engine.state(), ProcessingState::Idle);
    assert_eq!(*engine.subscribe_progress().borrow(), 0.0);
}

#[tokio::test]
async fn test_session_keeps_buffer_when_runtime_lacks_a_node() {
    let engine = Arc::new(engine().with_runtime(Arc::new(NoFilterRuntime)));
    let mut context = EngineContext::new(engine);
    let tone = generate_test_tone(440.0, 0.1, RATE);
    let reversed = tone.reversed();
    context.load(tone);

    context
        .apply(&RenderRequest::new(EffectKind::Reverse))
        .await
        .unwrap();
    assert_eq!(**context.current().unwrap(), reversed);

    let err = context
        .apply(&RenderRequest::new(EffectKind::BassBoost))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CAPABILITY_UNSUPPORTED");
    assert_eq!(**context.current().unwrap(), reversed);
    assert_eq!(context.last_effect(), Some(EffectKind::Reverse));
}

// === Stereo widening ===

/// 20 ms at 8 kHz
const HAAS_FRAMES: usize = 160;

#[tokio::test]
async fn test_stereo_delays_right_channel_of_mono_input() {
    let tone = generate_test_tone(440.0, 0.1, RATE);
    let output = engine()
        .render(Arc::new(tone.clone()), &RenderRequest::new(EffectKind::Stereo))
        .await
        .unwrap();
    let (left, right) = (output.buffer.channel(0), output.buffer.channel(1));
    let dry = tone.channel(0);
    assert_eq!(left.len(), dry.len());

    for (l, x) in left.iter().zip(dry) {
        assert_abs_diff_eq!(*l, *x, epsilon = 1e-5);
    }
    for r in &right[..HAAS_FRAMES] {
        assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-4);
    }
    for n in HAAS_FRAMES..right.len() {
        assert_abs_diff_eq!(right[n], dry[n - HAAS_FRAMES], epsilon = 1e-4);
    }
}

#[tokio::test]
async fn test_stereo_leaves_left_channel_of_stereo_input() {
    let input = stereo_input();
    let output = engine()
        .render(input.clone(), &RenderRequest::new(EffectKind::Stereo))
        .await
        .unwrap();
    let (left, right) = (output.buffer.channel(0), output.buffer.channel(1));

    for (l, x) in left.iter().zip(input.channel(0)) {
        assert_abs_diff_eq!(*l, *x, epsilon = 1e-5);
    }
    for r in &right[..HAAS_FRAMES] {
        assert_abs_diff_eq!(*r, 0.0, epsilon = 1e-4);
    }
    let dry_right = input.channel(1);
    for n in HAAS_FRAMES..right.len() {
        assert_abs_diff_eq!(right[n], dry_right[n - HAAS_FRAMES], epsilon = 1e-4);
    }
}

#[tokio::test]
async fn test_bass_boost_at_tiny_sample_rate_stays_finite() {
    let samples = (0..64).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    let input = Arc::new(AudioBuffer::from_channels(vec![samples], 16).unwrap());
    let output = engine()
        .render(input, &RenderRequest::new(EffectKind::BassBoost))
        .await
        .unwrap();
    assert_eq!(output.buffer.len(), 64);
    assert!(output.buffer.is_finite());
}

// === Concurrency ===

#[tokio::test]
async fn test_concurrent_render_is_rejected() {
    let fetcher = Arc::new(GatedFetcher::new(impulse_bytes()));
    let engine = Arc::new(engine_with(fetcher.clone()));
    let input = stereo_input();
    let request = RenderRequest::new(EffectKind::EightD);

    let in_flight = tokio::spawn({
        let engine = engine.clone();
        let input = input.clone();
        let request = request.clone();
        async move { engine.render(input, &request).await }
    });
    while engine.state() != ProcessingState::Rendering {
        tokio::task::yield_now().await;
    }

    let rejected = engine
        .render(input.clone(), &RenderRequest::new(EffectKind::Reverse))
        .await
        .unwrap_err();
    assert_eq!(rejected.error_code(), "RENDER_IN_PROGRESS");

    fetcher.release();
    let first = in_flight.await.unwrap().unwrap();

    // Same result as an undisturbed render
    let reference = self::engine().render(input, &request).await.unwrap();
    assert_eq!(first.buffer, reference.buffer);
    assert_eq!(engine.state(), ProcessingState::Idle);
}

#[tokio::test]
async fn test_abandoned_render_holds_engine_until_worker_returns() {
    let engine = Arc::new(engine().with_runtime(Arc::new(SlowRuntime {
        nap: Duration::from_millis(3),
    })));
    let input = Arc::new(generate_test_tone(440.0, 1.0, RATE));
    let request = RenderRequest::new(EffectKind::BassBoost);

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), engine.render(input.clone(), &request))
            .await;
    assert!(abandoned.is_err());

    // The blocking worker is still running the plan
    assert_eq!(engine.state(), ProcessingState::Rendering);
    let rejected = engine
        .render(input.clone(), &RenderRequest::new(EffectKind::Reverse))
        .await
        .unwrap_err();
    assert_eq!(rejected.error_code(), "RENDER_IN_PROGRESS");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while engine.state() != ProcessingState::Idle {
        assert!(tokio::time::Instant::now() < deadline, "worker never returned");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let input_len = input.len();
    let output = engine
        .render(input, &RenderRequest::new(EffectKind::Reverse))
        .await
        .unwrap();
    assert_eq!(output.buffer.len(), input_len);
}

#[tokio::test]
async fn test_engines_share_one_impulse_response_fetch() {
    let fetcher = Arc::new(GatedFetcher::new(impulse_bytes()));
    let cache = Arc::new(ImpulseResponseCache::new(fetcher.clone()));
    let a = Arc::new(engine().with_impulse_responses(cache.clone()));
    let b = Arc::new(engine().with_impulse_responses(cache.clone()));
    let input = stereo_input();

    let render = |engine: Arc<Engine>, input: Arc<AudioBuffer>| {
        tokio::spawn(async move {
            engine
                .render(input, &RenderRequest::new(EffectKind::Reverb))
                .await
        })
    };
    let first = render(a, input.clone());
    let second = render(b, input);
    while cache.fetch_count() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    fetcher.release();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(cache.fetch_count(), 1);
    assert_eq!(
        first.report.impulse_response_digest,
        second.report.impulse_response_digest
    );
}

#[tokio::test]
async fn test_failed_fetch_is_retried() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let engine = engine_with(fetcher.clone());
    let request = RenderRequest::new(EffectKind::Reverb);

    assert!(engine.render(stereo_input(), &request).await.is_err());
    fetcher.insert(IR_URL, impulse_bytes());
    let output = engine.render(stereo_input(), &request).await.unwrap();
    assert!(output.report.reverb_applied);
    assert_eq!(engine.impulse_responses().fetch_count(), 2);
}

#[tokio::test]
async fn test_progress_reaches_one() {
    let engine = engine();
    let mut progress = engine.subscribe_progress();
    engine
        .render(stereo_input(), &RenderRequest::new(EffectKind::Hq))
        .await
        .unwrap();
    assert!(progress.has_changed().unwrap());
    assert_eq!(*progress.borrow_and_update(), 1.0);
}
