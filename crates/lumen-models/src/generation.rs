//! Request/response envelopes for the generation pipeline.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::intent::IntentSource;
use crate::persona::Persona;
use crate::style::StyleProfile;
use crate::ScriptIntent;

/// Maximum accepted prompt length in characters.
pub const MAX_PROMPT_LENGTH: usize = 2000;

/// Process-wide monotonic sequence for request ordering.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Claim the next value of the process-wide request sequence.
pub fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// Incoming generation request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    pub prompt: String,
    pub persona: Persona,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, persona: Persona) -> Self {
        Self {
            prompt: prompt.into(),
            persona,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Validate caller-controlled fields. Returns a human-readable reason
    /// on rejection.
    pub fn validate(&self) -> Result<(), String> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err("prompt cannot be empty".to_string());
        }
        if prompt.len() > MAX_PROMPT_LENGTH {
            return Err(format!(
                "prompt too long: {} chars (max {})",
                prompt.len(),
                MAX_PROMPT_LENGTH
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature out of range: {}", t));
            }
        }
        Ok(())
    }
}

/// Per-request pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationOptions {
    /// Request structured intent from the language model.
    pub enable_intent: bool,
    /// Run the motion governor over raw coefficients.
    pub enable_governor: bool,
    /// Style override; `None` uses the persona's default preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleProfile>,
    /// Opt-in face enhancement at render time.
    pub enhance: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            enable_intent: true,
            enable_governor: true,
            style: None,
            enhance: false,
        }
    }
}

/// Successful pipeline result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationResponse {
    pub text: String,
    pub script_intent: ScriptIntent,
    pub intent_source: IntentSource,
    pub audio_path: PathBuf,
    pub video_path: PathBuf,
    pub request_id: RequestId,
    /// Process-monotonic ordering of this request.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock pipeline time in seconds.
    pub processing_time: f64,
    /// False when the governor declined to touch the coefficients.
    pub governor_applied: bool,
}

/// Error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing prompt, unknown persona, missing reference asset.
    InvalidInput,
    /// External model call failed after retries.
    UpstreamUnavailable,
    /// Strict JSON parse failed; generation continued on a fallback.
    IntentParseFallback,
    /// Governor returned its input unchanged.
    GovernorNoOp,
    /// Style extraction could not gather enough samples.
    InsufficientReferenceData,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::IntentParseFallback => "intent_parse_fallback",
            ErrorKind::GovernorNoOp => "governor_no_op",
            ErrorKind::InsufficientReferenceData => "insufficient_reference_data",
        }
    }

    /// True for kinds that describe degraded-but-successful runs rather
    /// than failures.
    pub fn is_warning(&self) -> bool {
        matches!(self, ErrorKind::IntentParseFallback | ErrorKind::GovernorNoOp)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error payload returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub error_kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        let mut req = GenerationRequest::new("Hello world", Persona::Mkbhd);
        assert!(req.validate().is_ok());

        req.prompt = "   ".to_string();
        assert!(req.validate().is_err());

        req.prompt = "x".repeat(MAX_PROMPT_LENGTH + 1);
        assert!(req.validate().is_err());

        req.prompt = "ok".to_string();
        req.temperature = Some(3.0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let a = next_sequence();
        let b = next_sequence();
        assert!(b > a);
    }

    #[test]
    fn test_default_options() {
        let opts = GenerationOptions::default();
        assert!(opts.enable_intent);
        assert!(opts.enable_governor);
        assert!(opts.style.is_none());
        assert!(!opts.enhance);
    }

    #[test]
    fn test_error_kind_severity() {
        assert!(ErrorKind::GovernorNoOp.is_warning());
        assert!(ErrorKind::IntentParseFallback.is_warning());
        assert!(!ErrorKind::UpstreamUnavailable.is_warning());
        assert!(!ErrorKind::InvalidInput.is_warning());
    }
}
