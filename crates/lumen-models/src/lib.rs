//! Shared data models for the LUMEN backend.
//!
//! This crate provides Serde-serializable types for:
//! - Script intent (segments, emphasis, pauses, sentence boundaries)
//! - Intent timing maps and frame-level intent masks
//! - Motion style profiles and presets
//! - Coefficient bundles exchanged with the face-animation model
//! - Personas and request/response envelopes

pub mod coeff;
pub mod generation;
pub mod intent;
pub mod persona;
pub mod style;
pub mod timing;

// Re-export common types
pub use coeff::{ChannelRange, ChannelSet, CoeffError, CoeffTable, CoefficientBundle, ExplicitLayout};
pub use generation::{ErrorBody, ErrorKind, GenerationOptions, GenerationRequest, GenerationResponse, RequestId};
pub use intent::{IntentError, IntentSource, ScriptIntent, SegmentIntent};
pub use persona::{Persona, PersonaParseError, PersonaProfile};
pub use style::{StyleParseError, StyleProfile};
pub use timing::{IntentTimingMap, TimingError, TimingSegment};
