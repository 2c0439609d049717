//! Text-to-speech adapter.
//!
//! The acoustic model runs out of process; this module owns the boundary:
//! a [`SpeechSynthesizer`] trait for the pipeline plus a sidecar-process
//! implementation that shells out to the configured synthesis command and
//! reads the WAV it produces. The model internals are not our business.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::audio;
use crate::error::{MediaError, MediaResult};

/// Maximum text input size for a single synthesis call. Guards the sidecar
/// against runaway prompts.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Deterministic sampling parameters passed to the acoustic model.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisParams {
    pub temperature: f64,
    pub repetition_penalty: f64,
    pub top_p: f64,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            temperature: 0.65,
            repetition_penalty: 2.5,
            top_p: 0.85,
        }
    }
}

/// A synthesized mono waveform at the model's native sample rate.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Synthesis {
    pub fn duration(&self) -> f64 {
        audio::duration_seconds(&self.samples, self.sample_rate)
    }
}

/// Speech synthesis boundary. One call per script segment.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        reference_audio: &Path,
        language: &str,
    ) -> MediaResult<Synthesis>;
}

/// Sidecar-process synthesizer.
///
/// Invokes the configured command as
/// `<cmd> --text T --reference R --language L --output O` plus sampling
/// flags, then reads the WAV written at `O`.
pub struct SidecarSynthesizer {
    command: PathBuf,
    params: SynthesisParams,
    timeout: Duration,
}

impl SidecarSynthesizer {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            params: SynthesisParams::default(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_params(mut self, params: SynthesisParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for SidecarSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        reference_audio: &Path,
        language: &str,
    ) -> MediaResult<Synthesis> {
        if text.trim().is_empty() {
            return Err(MediaError::tts_failed("empty text"));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(MediaError::tts_failed(format!(
                "text exceeds maximum size: {} bytes (limit {})",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if !reference_audio.exists() {
            return Err(MediaError::tts_failed(format!(
                "reference audio not found: {}",
                reference_audio.display()
            )));
        }

        let workdir = tempfile::tempdir()?;
        let output_path = workdir.path().join("segment.wav");

        debug!(
            chars = text.len(),
            language = language,
            "Invoking TTS sidecar"
        );

        let child = Command::new(&self.command)
            .arg("--text")
            .arg(text)
            .arg("--reference")
            .arg(reference_audio)
            .arg("--language")
            .arg(language)
            .arg("--output")
            .arg(&output_path)
            .arg("--temperature")
            .arg(self.params.temperature.to_string())
            .arg("--repetition-penalty")
            .arg(self.params.repetition_penalty.to_string())
            .arg("--top-p")
            .arg(self.params.top_p.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::tts_failed(format!("failed to spawn sidecar: {}", e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| MediaError::tts_failed(format!("sidecar wait failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            warn!(status = ?output.status.code(), "TTS sidecar failed");
            return Err(MediaError::tts_failed(format!(
                "sidecar exited with {:?}: {}",
                output.status.code(),
                tail
            )));
        }

        let (samples, sample_rate) = audio::read_wav_mono(&output_path)?;
        Ok(Synthesis {
            samples,
            sample_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_match_model_defaults() {
        let params = SynthesisParams::default();
        assert!((params.temperature - 0.65).abs() < 1e-9);
        assert!((params.repetition_penalty - 2.5).abs() < 1e-9);
        assert!((params.top_p - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let synth = SidecarSynthesizer::new("/nonexistent/tts");
        let err = synth
            .synthesize("   ", Path::new("/nonexistent/ref.wav"), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TtsFailed(_)));
    }

    #[tokio::test]
    async fn test_missing_reference_rejected() {
        let synth = SidecarSynthesizer::new("/nonexistent/tts");
        let err = synth
            .synthesize("Hello.", Path::new("/nonexistent/ref.wav"), "en")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TtsFailed(_)));
    }
}
