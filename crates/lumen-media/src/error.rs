//! Media error types.

use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("TTS synthesis failed: {0}")]
    TtsFailed(String),

    #[error("Coefficient generation failed: {0}")]
    AnimationFailed(String),

    #[error("Video rendering failed: {0}")]
    RenderFailed(String),

    #[error("Audio decode failed: {0}")]
    AudioDecode(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Insufficient reference data: {got} valid frames (need {need})")]
    InsufficientReferenceData { got: usize, need: usize },

    #[error("ffmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("ffprobe not found in PATH")]
    FfprobeNotFound,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Coefficient error: {0}")]
    Coeff(#[from] lumen_models::CoeffError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn tts_failed(msg: impl Into<String>) -> Self {
        Self::TtsFailed(msg.into())
    }

    pub fn animation_failed(msg: impl Into<String>) -> Self {
        Self::AnimationFailed(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn audio_decode(msg: impl Into<String>) -> Self {
        Self::AudioDecode(msg.into())
    }

    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self::ProbeFailed(msg.into())
    }

    /// Check if the error came from a flaky external process rather than
    /// bad input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::TtsFailed(_)
                | MediaError::AnimationFailed(_)
                | MediaError::RenderFailed(_)
                | MediaError::Timeout(_)
        )
    }
}
