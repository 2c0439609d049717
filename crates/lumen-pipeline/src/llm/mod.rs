//! Language-model client: transport, robust JSON extraction, and the
//! structured-intent retry cascade.

pub mod cascade;
pub mod client;
pub mod extract;

pub use cascade::{IntentCascade, IntentOutcome, DEFAULT_MAX_TOKENS};
pub use client::{GeminiClient, LlmError, LlmRequest, LlmTransport};
