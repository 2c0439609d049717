//! End-to-end pipeline scenarios over scripted collaborators.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lumen_media::{
    audio, FrameRenderer, MediaError, MediaResult, MotionProposer, RenderOptions, Synthesis,
    SpeechSynthesizer,
};
use lumen_models::{
    ChannelRange, ChannelSet, CoeffTable, CoefficientBundle, ExplicitLayout, GenerationOptions,
    GenerationRequest, IntentSource, Persona,
};
use lumen_pipeline::{
    LlmError, LlmRequest, LlmTransport, ModelRegistry, Pipeline, PipelineConfig, PipelineError,
};

const RATE: u32 = 24000;
const FPS: u32 = 25;

/// Transport replaying a fixed sequence of responses.
struct SequencedLlm {
    responses: Mutex<Vec<String>>,
}

impl SequencedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmTransport for SequencedLlm {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(LlmError::Transport("script exhausted".to_string()));
        }
        Ok(responses.remove(0))
    }
}

/// Transport that always fails at the HTTP layer.
struct DeadLlm;

#[async_trait]
impl LlmTransport for DeadLlm {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, LlmError> {
        Err(LlmError::Transport("connection refused".to_string()))
    }
}

/// Synthesizer producing a one-second 220 Hz tone per call.
struct ToneSynth;

#[async_trait]
impl SpeechSynthesizer for ToneSynth {
    async fn synthesize(
        &self,
        _text: &str,
        _reference_audio: &Path,
        _language: &str,
    ) -> MediaResult<Synthesis> {
        let samples = (0..RATE as usize)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / RATE as f32).sin())
            .collect();
        Ok(Synthesis {
            samples,
            sample_rate: RATE,
        })
    }
}

/// Animator producing a constant-motion explicit bundle and a marker
/// video file.
struct StubAnimator;

fn classic_layout() -> ExplicitLayout {
    ExplicitLayout::new(ChannelRange::new(80, 144), ChannelRange::new(224, 227))
        .with_identity(ChannelRange::new(0, 80))
        .with_lip_channels(ChannelSet::from_indices(80..93))
}

#[async_trait]
impl MotionProposer for StubAnimator {
    async fn propose(
        &self,
        audio_path: &Path,
        _reference_image: &Path,
    ) -> MediaResult<CoefficientBundle> {
        let (samples, rate) = audio::read_wav_mono(audio_path)?;
        let duration = samples.len() as f64 / rate as f64;
        let frames = (duration * FPS as f64).round() as usize;

        let mut table = CoeffTable::zeros(frames, 257)
            .map_err(|e| MediaError::animation_failed(e.to_string()))?;
        for t in 0..frames {
            let row = table.row_mut(t);
            for c in 80..144 {
                row[c] = 1.0;
            }
            for c in 224..227 {
                row[c] = 0.2;
            }
        }
        CoefficientBundle::classify(table, Some(classic_layout()))
            .map_err(|e| MediaError::animation_failed(e.to_string()))
    }
}

#[async_trait]
impl FrameRenderer for StubAnimator {
    async fn render(
        &self,
        bundle: &CoefficientBundle,
        _reference_image: &Path,
        _audio_path: &Path,
        output_path: &Path,
        options: RenderOptions,
    ) -> MediaResult<PathBuf> {
        let marker = format!(
            "mp4 frames={} fps={} res={}",
            bundle.frames(),
            options.fps,
            options.resolution
        );
        std::fs::write(output_path, marker)?;
        Ok(output_path.to_path_buf())
    }
}

struct Fixture {
    _assets: tempfile::TempDir,
    _outputs: tempfile::TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let assets = tempfile::tempdir().unwrap();
        let outputs = tempfile::tempdir().unwrap();

        // Persona reference assets: a short valid WAV and a portrait stub.
        for persona in Persona::ALL {
            let profile = persona.profile();
            let tone: Vec<f32> = vec![0.1; 2400];
            audio::write_pcm16_wav(assets.path().join(profile.reference_audio), &tone, RATE)
                .unwrap();
            std::fs::write(assets.path().join(profile.reference_image), b"jpeg-bytes").unwrap();
        }

        let config = PipelineConfig {
            assets_dir: assets.path().to_path_buf(),
            output_dir: outputs.path().to_path_buf(),
            fps: FPS,
            ..PipelineConfig::default()
        };

        Self {
            _assets: assets,
            _outputs: outputs,
            config,
        }
    }

    fn pipeline(&self, llm: Arc<dyn LlmTransport>) -> Pipeline {
        let registry =
            ModelRegistry::with_collaborators(llm, Arc::new(ToneSynth), Arc::new(StubAnimator));
        Pipeline::with_registry(self.config.clone(), registry)
    }
}

const S1_INTENT: &str = r#"{"segments":[{"text":"Hello.","pause_after":0.3,"emphasis":[],"sentence_end":true},{"text":"World.","pause_after":0.0,"emphasis":["World"],"sentence_end":true}]}"#;

#[tokio::test]
async fn test_minimal_happy_path() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT]));

    let response = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.intent_source, IntentSource::Strict);
    assert_eq!(response.script_intent.segment_count(), 2);
    assert!(response.processing_time > 0.0);
    assert!(response.governor_applied);
    assert!(response.video_path.exists());
    assert!(response.audio_path.exists());

    // Timing: second segment starts after the first plus its 0.3s pause.
    let timing = lumen_models::IntentTimingMap::load(
        response.audio_path.parent().unwrap().join("timing.json"),
    )
    .unwrap();
    assert_eq!(timing.segments.len(), 2);
    let first = &timing.segments[0];
    let second = &timing.segments[1];
    assert!((second.start_time - (first.end_time + 0.3)).abs() < 1e-6);

    // The WAV carries a zero run of at least 0.3s between the spans.
    let (samples, rate) = audio::read_wav_mono(&response.audio_path).unwrap();
    assert_eq!(rate, RATE);
    let pause_start = (first.end_time * rate as f64) as usize;
    let pause_len = (0.3 * rate as f64) as usize;
    assert!(samples[pause_start..pause_start + pause_len]
        .iter()
        .all(|&s| s.abs() < 1e-4));

    // Script intent got its total duration filled after synthesis.
    assert_eq!(
        response.script_intent.total_duration,
        Some(timing.total_duration)
    );
}

#[tokio::test]
async fn test_artifact_set_persisted() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT]));

    let response = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    let dir = response.audio_path.parent().unwrap().to_path_buf();
    assert!(dir.ends_with(response.request_id.as_str()));
    for name in ["script.json", "timing.json", "audio.wav", "video.mp4"] {
        assert!(dir.join(name).exists(), "missing artifact {}", name);
    }

    let script = lumen_models::ScriptIntent::load(dir.join("script.json")).unwrap();
    assert_eq!(script.segment_count(), 2);
}

#[tokio::test]
async fn test_garbage_then_prose_falls_back() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[
        "```json",
        "Here is the script. It is short.",
    ]));

    let response = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.intent_source, IntentSource::Fallback);
    assert_eq!(response.script_intent.segment_count(), 2);
    assert!(response.video_path.exists());
}

#[tokio::test]
async fn test_dead_llm_aborts_with_upstream_error() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(Arc::new(DeadLlm));

    let err = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    assert_eq!(err.kind(), lumen_models::ErrorKind::UpstreamUnavailable);
}

#[tokio::test]
async fn test_empty_prompt_rejected() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT]));

    let err = pipeline
        .generate(
            GenerationRequest::new("   ", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_missing_persona_assets_rejected() {
    let fixture = Fixture::new();
    // Remove the persona's portrait to simulate a broken deployment.
    std::fs::remove_file(
        fixture
            .config
            .assets_dir
            .join(Persona::Ijustine.profile().reference_image),
    )
    .unwrap();

    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT]));
    let err = pipeline
        .generate(
            GenerationRequest::new("Hi", Persona::Ijustine),
            GenerationOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_cancellation_keeps_partial_artifacts() {
    let fixture = Fixture::new();
    let (tx, rx) = tokio::sync::watch::channel(true);
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT])).with_cancel(rx);

    let err = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
    drop(tx);

    // The request directory was created and survives the abort.
    let entries: Vec<_> = std::fs::read_dir(&fixture.config.output_dir)
        .unwrap()
        .collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_governor_disabled_passes_raw_coefficients() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT]));

    let response = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions {
                enable_governor: false,
                ..GenerationOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(!response.governor_applied);
    assert!(response.video_path.exists());
}

#[tokio::test]
async fn test_intent_disabled_uses_plain_generation() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&["Plain spoken answer. Two parts."]));

    let response = pipeline
        .generate(
            GenerationRequest::new("Hello world", Persona::Mkbhd),
            GenerationOptions {
                enable_intent: false,
                ..GenerationOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.intent_source, IntentSource::Fallback);
    assert_eq!(response.script_intent.segment_count(), 2);
}

#[tokio::test]
async fn test_sequences_increase_across_requests() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline(SequencedLlm::new(&[S1_INTENT, S1_INTENT]));

    let first = pipeline
        .generate(
            GenerationRequest::new("One", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap();
    let second = pipeline
        .generate(
            GenerationRequest::new("Two", Persona::Mkbhd),
            GenerationOptions::default(),
        )
        .await
        .unwrap();

    assert!(second.sequence > first.sequence);
    assert_ne!(first.request_id, second.request_id);
}
