//! Pipeline orchestration.
//!
//! One request runs the stages in strict order: script generation,
//! segmented synthesis, motion proposal, governance, rendering. Stages
//! block until done; cancellation is checked at stage boundaries only.
//! Across requests the pipeline is reentrant provided each invocation gets
//! its own artifact directory, which `ArtifactSet` guarantees.
//!
//! Failure policy: a transport-dead language model aborts the request;
//! synthesis falls back internally before failing; animator stages fail
//! hard and surface as upstream errors; the governor never fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::info;

use lumen_media::{
    FrameRenderer, MotionGovernor, MotionProposer, RenderOptions, SegmentedSynthesizer,
    SidecarAnimator, SidecarSynthesizer, SpeechSynthesizer,
};
use lumen_models::{
    generation::next_sequence, GenerationOptions, GenerationRequest, GenerationResponse,
    RequestId, StyleProfile,
};

use crate::artifacts::ArtifactSet;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{GeminiClient, IntentCascade, LlmTransport, DEFAULT_MAX_TOKENS};
use crate::logging::StageTimer;
use crate::registry::{Animator, ModelRegistry};

/// The generation pipeline. Holds configuration and the resident-model
/// registry; all per-request state lives on the stack of `generate`.
pub struct Pipeline {
    config: PipelineConfig,
    registry: ModelRegistry,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    /// Production pipeline; models initialise lazily from config.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            registry: ModelRegistry::new(),
            cancel_rx: None,
        }
    }

    /// Pipeline over an explicit registry (dependency injection).
    pub fn with_registry(config: PipelineConfig, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry,
            cancel_rx: None,
        }
    }

    /// Attach a cancellation signal, observed at stage boundaries.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Release all resident models.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    /// Run the full pipeline for one request.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        options: GenerationOptions,
    ) -> PipelineResult<GenerationResponse> {
        let started = Instant::now();
        let timestamp = Utc::now();
        let request_id = RequestId::new();
        let sequence = next_sequence();

        request
            .validate()
            .map_err(PipelineError::InvalidInput)?;

        let profile = request.persona.profile();
        let reference_audio = self.config.assets_dir.join(profile.reference_audio);
        let reference_image = self.config.assets_dir.join(profile.reference_image);
        if !reference_audio.exists() {
            return Err(PipelineError::invalid_input(format!(
                "missing reference audio for persona {}: {}",
                request.persona,
                reference_audio.display()
            )));
        }
        if !reference_image.exists() {
            return Err(PipelineError::invalid_input(format!(
                "missing reference image for persona {}: {}",
                request.persona,
                reference_image.display()
            )));
        }

        let artifacts = ArtifactSet::create(&self.config.output_dir, &request_id)?;
        info!(
            request_id = %request_id,
            persona = %request.persona,
            intent = options.enable_intent,
            governor = options.enable_governor,
            "Pipeline started"
        );

        // Stage 1: script generation.
        self.check_cancelled()?;
        let mut stage = StageTimer::start(&request_id, "script");
        let outcome = {
            let lease = self.registry.llm.acquire_with(|| self.build_llm()).await;
            let cascade = IntentCascade::new(&*lease);
            let temperature = request.temperature.unwrap_or(profile.default_temperature);
            let max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

            let result = if options.enable_intent {
                cascade
                    .generate_with_intent(&request.prompt, Some(&profile), temperature, max_tokens)
                    .await
            } else {
                cascade
                    .generate_plain(&request.prompt, Some(&profile), temperature, max_tokens)
                    .await
            };
            result.map_err(|e| PipelineError::upstream(format!("script generation failed: {e}")))?
        };
        if options.enable_intent && outcome.source.is_fallback() {
            stage.degrade("structured intent unavailable, using sentence-split fallback");
        }
        stage.finish(&format!(
            "{} segments via {}",
            outcome.intent.segment_count(),
            outcome.source
        ));

        // Stage 2: segmented synthesis.
        self.check_cancelled()?;
        let mut stage = StageTimer::start(&request_id, "synthesis");
        let synthesis = {
            let lease = self
                .registry
                .synthesizer
                .acquire_with(|| self.build_synthesizer())
                .await;
            let synthesizer = SegmentedSynthesizer::new(
                lease.shared(),
                self.config.fps,
                self.config.language.clone(),
            );
            synthesizer
                .synthesize_with_intent(&outcome.intent, &reference_audio, &artifacts.audio_wav)
                .await
                .map_err(|e| PipelineError::upstream(format!("speech synthesis failed: {e}")))?
        };
        ArtifactSet::sync_file(&artifacts.audio_wav)?;

        let mut script_intent = outcome.intent.clone();
        script_intent.total_duration = Some(synthesis.timing_map.total_duration);
        ArtifactSet::write_json(&artifacts.script_json, &script_intent)?;
        ArtifactSet::write_json(&artifacts.timing_json, &synthesis.timing_map)?;
        if synthesis.fallback_used {
            stage.degrade("per-segment synthesis failed, single-shot waveform in use");
        }
        stage.finish(&format!(
            "{:.2}s of audio, {} timing segments",
            synthesis.timing_map.total_duration,
            synthesis.timing_map.segments.len()
        ));

        // Stage 3: motion proposal.
        self.check_cancelled()?;
        let stage = StageTimer::start(&request_id, "coefficients");
        let raw_bundle = {
            let lease = self
                .registry
                .animator
                .acquire_with(|| self.build_animator())
                .await;
            lease
                .propose(&artifacts.audio_wav, &reference_image)
                .await
                .map_err(|e| PipelineError::upstream(format!("coefficient generation failed: {e}")))?
        };
        stage.finish(&format!(
            "{} frames x {} dims (compact={})",
            raw_bundle.frames(),
            raw_bundle.dims(),
            raw_bundle.is_compact()
        ));

        // Stage 4: governance. Never fails; a no-op is recorded, not raised.
        self.check_cancelled()?;
        let style = self.resolve_style(&options, profile.default_style);
        let (bundle, governor_applied) = if options.enable_governor {
            let mut stage = StageTimer::start(&request_id, "governor");
            let governor = MotionGovernor::new(style, self.config.fps);
            let governed = governor.govern(
                &raw_bundle,
                Some(&artifacts.audio_wav),
                Some(&synthesis.timing_map),
            );
            if !governed.applied {
                stage.degrade("governor returned coefficients unchanged");
            }
            stage.finish(if governed.applied {
                "coefficients governed"
            } else {
                "raw coefficients retained"
            });
            (governed.bundle, governed.applied)
        } else {
            (raw_bundle, false)
        };

        // Stage 5: rendering.
        self.check_cancelled()?;
        let stage = StageTimer::start(&request_id, "render");
        let video_path = {
            let lease = self
                .registry
                .animator
                .acquire_with(|| self.build_animator())
                .await;
            lease
                .render(
                    &bundle,
                    &reference_image,
                    &artifacts.audio_wav,
                    &artifacts.video_mp4,
                    RenderOptions {
                        enhance: options.enhance,
                        fps: self.config.fps,
                        resolution: self.config.resolution,
                    },
                )
                .await
                .map_err(|e| PipelineError::upstream(format!("rendering failed: {e}")))?
        };
        ArtifactSet::sync_file(&video_path)?;
        stage.finish(&format!("wrote {}", video_path.display()));

        let processing_time = started.elapsed().as_secs_f64();
        info!(
            request_id = %request_id,
            seconds = format!("{:.2}", processing_time),
            "Pipeline complete"
        );

        Ok(GenerationResponse {
            text: outcome.text,
            script_intent,
            intent_source: outcome.source,
            audio_path: artifacts.audio_wav,
            video_path,
            request_id,
            sequence,
            timestamp,
            processing_time,
            governor_applied,
        })
    }

    fn check_cancelled(&self) -> PipelineResult<()> {
        if let Some(rx) = &self.cancel_rx {
            if *rx.borrow() {
                return Err(PipelineError::Cancelled);
            }
        }
        Ok(())
    }

    /// Style resolution order: explicit option, then the persona default,
    /// then the configured default, then calm_tech.
    fn resolve_style(&self, options: &GenerationOptions, persona_default: &str) -> StyleProfile {
        options
            .style
            .clone()
            .or_else(|| StyleProfile::preset(persona_default))
            .or_else(|| StyleProfile::preset(&self.config.default_style))
            .unwrap_or_default()
    }

    fn build_llm(&self) -> Arc<dyn LlmTransport> {
        Arc::new(GeminiClient::new(
            self.config.llm_api_key.clone().unwrap_or_default(),
            self.config.llm_model.clone(),
        ))
    }

    fn build_synthesizer(&self) -> Arc<dyn SpeechSynthesizer> {
        Arc::new(
            SidecarSynthesizer::new(&self.config.tts_command)
                .with_timeout(self.config.stage_timeout),
        )
    }

    fn build_animator(&self) -> Arc<dyn Animator> {
        Arc::new(
            SidecarAnimator::new(&self.config.animator_command)
                .with_timeout(self.config.stage_timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_resolution_order() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let mut options = GenerationOptions::default();

        // Persona default wins when no explicit style is set.
        let style = pipeline.resolve_style(&options, "energetic");
        assert_eq!(style.name, "energetic");

        // Explicit style wins over everything.
        options.style = Some(StyleProfile::lecturer());
        let style = pipeline.resolve_style(&options, "energetic");
        assert_eq!(style.name, "lecturer");

        // Unknown persona default falls through to the configured default.
        options.style = None;
        let style = pipeline.resolve_style(&options, "no_such_preset");
        assert_eq!(style.name, "calm_tech");
    }
}
