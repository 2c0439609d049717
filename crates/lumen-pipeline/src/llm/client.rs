//! Language-model HTTP client.
//!
//! Speaks the Gemini `generateContent` protocol: prompt in, text or JSON
//! body out. A response schema is attached when the caller forces JSON
//! mode. Transport failures walk a model fallback list with exponential
//! backoff inside each model; content-level problems are the cascade's
//! business, not ours.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Extra attempts per model after the first failed call. Exhausting them
/// moves on to the next model in the fallback list.
const TRANSPORT_RETRIES: u32 = 2;

/// First retry delay; doubles per attempt up to [`RETRY_DELAY_CAP`].
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_DELAY_CAP: Duration = Duration::from_secs(5);

/// Doubling backoff for transport retries against the provider.
fn transport_backoff(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RETRY_DELAY_CAP)
}

/// One completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the provider for a JSON response body.
    pub force_json: bool,
    /// Response schema attached when `force_json` is set.
    pub response_schema: Option<serde_json::Value>,
}

impl LlmRequest {
    pub fn plain(prompt: impl Into<String>, temperature: f64, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
            force_json: false,
            response_schema: None,
        }
    }

    pub fn json(
        prompt: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
            force_json: true,
            response_schema: Some(schema),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    MissingApiKey,

    #[error("LLM transport failed: {0}")]
    Transport(String),

    #[error("LLM returned no usable text")]
    EmptyResponse,
}

/// Completion transport. The retry cascade is written against this so
/// tests can script responses without HTTP.
#[async_trait]
pub trait LlmTransport: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Gemini API request body.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType", skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(rename = "responseSchema", skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
}

/// Gemini API response body.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Gemini API client.
pub struct GeminiClient {
    api_key: String,
    models: Vec<String>,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a client with the given key and primary model. The primary
    /// model is tried first, then the fallback list.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let primary = model.into();
        let mut models = vec![primary.clone()];
        for fallback in ["gemini-2.0-flash", "gemini-2.0-flash-lite"] {
            if fallback != primary {
                models.push(fallback.to_string());
            }
        }
        Self {
            api_key: api_key.into(),
            models,
            client: reqwest::Client::new(),
        }
    }

    async fn call_model(&self, model: &str, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let body = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request
                    .force_json
                    .then(|| "application/json".to_string()),
                response_schema: if request.force_json {
                    request.response_schema.clone()
                } else {
                    None
                },
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Transport(format!(
                "API returned {}: {}",
                status,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("bad response body: {}", e)))?;

        parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmTransport for GeminiClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let mut last_error = None;
        for model in &self.models {
            let mut attempt = 0u32;
            let result = loop {
                match self.call_model(model, request).await {
                    Ok(text) => break Ok(text),
                    Err(e) if attempt < TRANSPORT_RETRIES => {
                        attempt += 1;
                        let delay = transport_backoff(attempt);
                        debug!(
                            model = %model,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "transport hiccup, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => break Err(e),
                }
            };

            match result {
                Ok(text) => {
                    info!(model = %model, chars = text.len(), "LLM completion succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "model exhausted its retries");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::EmptyResponse))
    }
}
