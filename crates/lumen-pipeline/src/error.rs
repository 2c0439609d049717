//! Pipeline error types.

use thiserror::Error;

use lumen_models::{ErrorBody, ErrorKind, RequestId};

use crate::llm::LlmError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Media error: {0}")]
    Media(#[from] lumen_media::MediaError),

    #[error("Intent error: {0}")]
    Intent(#[from] lumen_models::IntentError),

    #[error("Timing error: {0}")]
    Timing(#[from] lumen_models::TimingError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Caller-facing error kind per the external contract.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::Media(lumen_media::MediaError::InsufficientReferenceData { .. }) => {
                ErrorKind::InsufficientReferenceData
            }
            _ => ErrorKind::UpstreamUnavailable,
        }
    }

    /// Build the error payload returned to callers.
    pub fn to_body(&self, request_id: Option<RequestId>) -> ErrorBody {
        ErrorBody {
            error_kind: self.kind(),
            message: self.to_string(),
            request_id,
        }
    }
}
