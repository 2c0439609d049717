//! Media processing for the LUMEN backend.
//!
//! This crate owns everything between the language model and the final
//! video file:
//! - WAV assembly and short-time energy analysis
//! - Segmented speech synthesis with intent timing maps
//! - Adapters over the TTS and face-animation sidecars
//! - The motion governor (clamp, intent gate, style scale, smooth, nod)
//! - Reference-video style extraction

pub mod animator;
pub mod audio;
pub mod error;
pub mod govern;
pub mod probe;
pub mod reference_style;
pub mod synth;
pub mod tts;

pub use animator::{FrameRenderer, MotionProposer, RenderOptions, SidecarAnimator};
pub use error::{MediaError, MediaResult};
pub use govern::{GovernOutcome, MotionGovernor, COMPACT_GATE_FLOOR, COMPACT_GATE_SPAN};
pub use reference_style::{
    derive_style_profile, FaceBox, FaceBoxSource, FaceLandmarks, FramePose, LandmarkSource,
    PoseBackend, ReferenceStyleExtractor, MIN_VALID_FRAMES,
};
pub use synth::{SegmentedOutput, SegmentedSynthesizer};
pub use tts::{SidecarSynthesizer, SpeechSynthesizer, Synthesis, SynthesisParams};
