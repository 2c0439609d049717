//! Pipeline orchestration for the LUMEN backend.
//!
//! Turns a prompt and a persona into a persona-styled talking-head video:
//! script generation with structured intent, segmented speech synthesis,
//! motion proposal, governance, and rendering, with per-request artifact
//! persistence.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod processor;
pub mod registry;

pub use artifacts::ArtifactSet;
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use llm::{GeminiClient, IntentCascade, IntentOutcome, LlmError, LlmRequest, LlmTransport};
pub use logging::StageTimer;
pub use processor::Pipeline;
pub use registry::{Animator, ModelLease, ModelRegistry, ModelSlot};
