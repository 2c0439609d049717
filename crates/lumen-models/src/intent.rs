//! Script intent contract.
//!
//! A script is an ordered sequence of segments, each carrying the plain
//! text to speak plus semantic annotations: a silence to insert after the
//! segment, tokens to stress, and whether the segment closes a sentence.
//! The structure is produced once by the language-model client and is
//! read-only for every downstream stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// A single script unit with intent markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentIntent {
    /// Flattened plain text of this segment.
    pub text: String,
    /// Seconds of silence appended after the segment.
    #[serde(default)]
    pub pause_after: f64,
    /// Tokens in `text` to stress during synthesis.
    #[serde(default)]
    pub emphasis: Vec<String>,
    /// Marks a sentence boundary (candidate nod trigger).
    #[serde(default)]
    pub sentence_end: bool,
}

impl SegmentIntent {
    /// Create a plain segment with no emphasis.
    pub fn plain(text: impl Into<String>, pause_after: f64, sentence_end: bool) -> Self {
        Self {
            text: text.into(),
            pause_after,
            emphasis: Vec::new(),
            sentence_end,
        }
    }

    /// Number of whitespace-separated tokens in the segment text.
    pub fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Complete script with structured intent data.
///
/// Invariants enforced at construction: at least one segment, no segment
/// with empty text, no negative pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptIntent {
    pub segments: Vec<SegmentIntent>,
    /// Total audio duration in seconds, filled after synthesis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
}

impl ScriptIntent {
    /// Build a validated script intent.
    pub fn new(segments: Vec<SegmentIntent>) -> Result<Self, IntentError> {
        if segments.is_empty() {
            return Err(IntentError::EmptyScript);
        }
        for (index, seg) in segments.iter().enumerate() {
            if seg.text.trim().is_empty() {
                return Err(IntentError::EmptySegmentText { index });
            }
            if seg.pause_after < 0.0 || !seg.pause_after.is_finite() {
                return Err(IntentError::InvalidPause {
                    index,
                    value: seg.pause_after,
                });
            }
        }
        Ok(Self {
            segments,
            total_duration: None,
        })
    }

    /// Single-segment intent from plain text. Used as the deterministic
    /// fallback when structured generation fails.
    pub fn single(text: impl Into<String>, pause_after: f64) -> Result<Self, IntentError> {
        Self::new(vec![SegmentIntent::plain(text, pause_after, true)])
    }

    /// Canonical plain-text form: trimmed segment texts joined with spaces.
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Re-run construction validation, e.g. after deserializing.
    pub fn validate(&self) -> Result<(), IntentError> {
        Self::new(self.segments.clone()).map(|_| ())
    }

    /// Persist as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IntentError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON, re-validating invariants.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntentError> {
        let json = std::fs::read_to_string(path)?;
        let intent: Self = serde_json::from_str(&json)?;
        intent.validate()?;
        Ok(intent)
    }
}

/// Provenance of a parsed script intent.
///
/// Callers branch on this instead of re-parsing: `Strict` came from the
/// schema-forced request, `Permissive` from the natural-language retry,
/// `Fallback` from sentence-splitting plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Strict,
    Permissive,
    Fallback,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentSource::Strict => "strict",
            IntentSource::Permissive => "permissive",
            IntentSource::Fallback => "fallback",
        }
    }

    /// True when the structured request itself did not succeed.
    pub fn is_fallback(&self) -> bool {
        matches!(self, IntentSource::Fallback)
    }
}

impl fmt::Display for IntentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("script intent must contain at least one segment")]
    EmptyScript,

    #[error("segment {index} has empty text")]
    EmptySegmentText { index: usize },

    #[error("segment {index} has invalid pause_after: {value}")]
    InvalidPause { index: usize, value: f64 },

    #[error("intent serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("intent I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_segments() -> ScriptIntent {
        ScriptIntent::new(vec![
            SegmentIntent {
                text: "Hello.".to_string(),
                pause_after: 0.3,
                emphasis: vec![],
                sentence_end: true,
            },
            SegmentIntent {
                text: "World.".to_string(),
                pause_after: 0.0,
                emphasis: vec!["World".to_string()],
                sentence_end: true,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_empty_script_rejected() {
        assert!(matches!(
            ScriptIntent::new(vec![]),
            Err(IntentError::EmptyScript)
        ));
    }

    #[test]
    fn test_empty_segment_text_rejected() {
        let result = ScriptIntent::new(vec![SegmentIntent::plain("   ", 0.0, true)]);
        assert!(matches!(
            result,
            Err(IntentError::EmptySegmentText { index: 0 })
        ));
    }

    #[test]
    fn test_negative_pause_rejected() {
        let result = ScriptIntent::new(vec![SegmentIntent::plain("Hi.", -0.1, true)]);
        assert!(matches!(result, Err(IntentError::InvalidPause { .. })));
    }

    #[test]
    fn test_plain_text_flattening() {
        let intent = two_segments();
        assert_eq!(intent.plain_text(), "Hello. World.");
    }

    #[test]
    fn test_serde_round_trip() {
        let intent = two_segments();
        let json = serde_json::to_string(&intent).unwrap();
        let back: ScriptIntent = serde_json::from_str(&json).unwrap();
        assert_eq!(intent, back);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        let intent = two_segments();
        intent.save(&path).unwrap();
        let back = ScriptIntent::load(&path).unwrap();
        assert_eq!(intent, back);
    }

    #[test]
    fn test_defaults_on_sparse_json() {
        let json = r#"{"segments":[{"text":"Hi."}]}"#;
        let intent: ScriptIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.segments[0].pause_after, 0.0);
        assert!(intent.segments[0].emphasis.is_empty());
        assert!(!intent.segments[0].sentence_end);
    }

    #[test]
    fn test_token_count() {
        let seg = SegmentIntent::plain("The new chip is fast.", 0.0, true);
        assert_eq!(seg.token_count(), 5);
    }
}
