//! Intent generation cascade.
//!
//! Structured script generation runs as a three-state machine driven by
//! extractor verdicts:
//!
//! ```text
//! StrictAttempt --(extraction fails)--> PermissiveAttempt --(fails)--> Fallback
//! ```
//!
//! The strict attempt forces JSON mode with a response schema. The
//! permissive retry describes the desired JSON in plain language and runs
//! the same extractor over whatever comes back. The fallback
//! sentence-splits the best text seen so far. Content problems therefore
//! never surface as errors; only transport failures do.

use tracing::{info, warn};

use lumen_models::{IntentSource, PersonaProfile, ScriptIntent};

use super::client::{LlmError, LlmRequest, LlmTransport};
use super::extract;

/// Token budget used when the caller does not pass one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Cascade states. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Strict,
    Permissive,
    Fallback,
}

impl Attempt {
    fn index(&self) -> usize {
        match self {
            Attempt::Strict => 1,
            Attempt::Permissive => 2,
            Attempt::Fallback => 3,
        }
    }

    fn uses_json_mode(&self) -> bool {
        matches!(self, Attempt::Strict)
    }
}

/// A generated script with its provenance.
#[derive(Debug)]
pub struct IntentOutcome {
    /// Canonical plain text of the script.
    pub text: String,
    pub intent: ScriptIntent,
    pub source: IntentSource,
}

/// Structured script generation over any transport.
pub struct IntentCascade<'a> {
    transport: &'a dyn LlmTransport,
}

impl<'a> IntentCascade<'a> {
    pub fn new(transport: &'a dyn LlmTransport) -> Self {
        Self { transport }
    }

    /// Generate a script with structured intent.
    ///
    /// Every branch ends in a validated `ScriptIntent`; `Err` means the
    /// transport itself is down.
    pub async fn generate_with_intent(
        &self,
        prompt: &str,
        persona: Option<&PersonaProfile>,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<IntentOutcome, LlmError> {
        let mut state = Attempt::Strict;
        let mut best_text: Option<String> = None;

        loop {
            match state {
                Attempt::Strict | Attempt::Permissive => {
                    let request = self.build_request(prompt, persona, temperature, max_tokens, state);
                    let body = self.transport.complete(&request).await?;
                    log_attempt(state, &body);

                    if let Some(intent) = extract::parse_intent_response(&body) {
                        let source = match state {
                            Attempt::Strict => IntentSource::Strict,
                            _ => IntentSource::Permissive,
                        };
                        info!(
                            attempt = state.index(),
                            segments = intent.segment_count(),
                            source = %source,
                            "Intent extraction succeeded"
                        );
                        return Ok(IntentOutcome {
                            text: intent.plain_text(),
                            intent,
                            source,
                        });
                    }

                    // Keep the most substantial prose seen for the fallback.
                    let stripped = extract::strip_markdown_fences(&body).trim().to_string();
                    let candidate = if stripped.is_empty() { body } else { stripped };
                    if best_text.as_ref().map_or(true, |b| candidate.len() > b.len()) {
                        best_text = Some(candidate);
                    }

                    state = match state {
                        Attempt::Strict => Attempt::Permissive,
                        _ => Attempt::Fallback,
                    };
                }
                Attempt::Fallback => {
                    let text = best_text
                        .as_deref()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .ok_or(LlmError::EmptyResponse)?;

                    let intent = extract::fallback_intent(text).ok_or(LlmError::EmptyResponse)?;
                    warn!(
                        segments = intent.segment_count(),
                        "Intent parse fell back to sentence splitting"
                    );
                    return Ok(IntentOutcome {
                        text: intent.plain_text(),
                        intent,
                        source: IntentSource::Fallback,
                    });
                }
            }
        }
    }

    /// Plain (unstructured) generation: one completion wrapped into a
    /// synthetic single-pass intent.
    pub async fn generate_plain(
        &self,
        prompt: &str,
        persona: Option<&PersonaProfile>,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<IntentOutcome, LlmError> {
        let full_prompt = match persona {
            Some(profile) => format!("{}\n\n{}", profile.style_hint, prompt),
            None => prompt.to_string(),
        };
        let body = self
            .transport
            .complete(&LlmRequest::plain(full_prompt, temperature, max_tokens))
            .await?;

        let text = extract::strip_markdown_fences(&body).trim().to_string();
        let text = if text.is_empty() { body } else { text };
        let intent = extract::fallback_intent(&text).ok_or(LlmError::EmptyResponse)?;

        Ok(IntentOutcome {
            text: intent.plain_text(),
            intent,
            source: IntentSource::Fallback,
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        persona: Option<&PersonaProfile>,
        temperature: f64,
        max_tokens: u32,
        attempt: Attempt,
    ) -> LlmRequest {
        let hint = persona.map(|p| p.style_hint).unwrap_or("");

        match attempt {
            Attempt::Strict => {
                let full = format!(
                    "{hint}\n\nWrite a short spoken video script for this request:\n{prompt}\n\n\
                     Segment the script into natural spoken units. For each segment provide the \
                     text, the pause in seconds to leave after it, the words to emphasise, and \
                     whether it ends a sentence."
                );
                LlmRequest::json(full, temperature, max_tokens, intent_schema())
            }
            Attempt::Permissive => {
                let full = format!(
                    "{hint}\n\nWrite a short spoken video script for this request:\n{prompt}\n\n\
                     IMPORTANT: Return ONLY a single JSON object and nothing else, shaped like:\n\
                     {{\"segments\": [{{\"text\": \"...\", \"pause_after\": 0.3, \
                     \"emphasis\": [\"word\"], \"sentence_end\": true}}]}}\n\
                     Every segment needs all four fields. Do not wrap the object in markdown."
                );
                LlmRequest::plain(full, temperature, max_tokens)
            }
            Attempt::Fallback => unreachable!("fallback issues no request"),
        }
    }
}

/// Response schema for JSON mode, mirroring the intent contract.
fn intent_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "segments": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "text": {"type": "string"},
                        "pause_after": {"type": "number"},
                        "emphasis": {"type": "array", "items": {"type": "string"}},
                        "sentence_end": {"type": "boolean"}
                    },
                    "required": ["text", "pause_after", "emphasis", "sentence_end"]
                }
            },
            "total_duration": {"type": "number"}
        },
        "required": ["segments"]
    })
}

/// Per-attempt logging: index, mode, length, preview. Full bodies are
/// never logged.
fn log_attempt(attempt: Attempt, body: &str) {
    let preview: String = body.chars().take(120).collect();
    info!(
        attempt = attempt.index(),
        json_mode = attempt.uses_json_mode(),
        response_chars = body.len(),
        preview = %preview.replace('\n', " "),
        "LLM attempt completed"
    );
}
