//! Intent timing map: the projection of a script intent onto the time axis
//! after speech synthesis.
//!
//! Created by the segmented synthesizer, consumed read-only by the motion
//! governor. The frame-level script mask built here encodes per-frame motion
//! authority: `0.0` forces stillness during pauses, `1.0` is nominal speech,
//! values up to [`MASK_CEILING`] boost emphasised segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Upper bound of the intent mask. Part of the public contract: fused masks
/// downstream stay within `[0.0, 1.3]`.
pub const MASK_CEILING: f32 = 1.3;

/// Slack for floating-point comparisons between segment boundaries.
const TIME_EPS: f64 = 1e-6;

/// Temporal placement of one script segment after synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimingSegment {
    /// Position in the originating `ScriptIntent`.
    pub segment_idx: usize,
    /// Speech onset in seconds.
    pub start_time: f64,
    /// Speech end in seconds (pause not included).
    pub end_time: f64,
    /// Carried-through segment text (token counts drive emphasis scaling).
    pub text: String,
    pub pause_after: f64,
    pub emphasis: Vec<String>,
    pub sentence_end: bool,
}

impl TimingSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    fn token_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Emphasis boost for this segment's speech frames.
    ///
    /// An empty emphasis set never raises the mask above 1.0.
    fn speech_mask_value(&self) -> f32 {
        if self.emphasis.is_empty() {
            return 1.0;
        }
        let density = self.emphasis.len() as f32 / self.token_count().max(1) as f32;
        (1.0 + 0.3 * density).min(MASK_CEILING)
    }
}

/// Ordered timing segments plus the audio's total duration and the frame
/// rate used for time-to-frame mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IntentTimingMap {
    pub segments: Vec<TimingSegment>,
    /// Total audio duration in seconds (speech plus trailing pauses).
    pub total_duration: f64,
    /// Frames per second for frame-count math.
    pub fps: u32,
}

impl IntentTimingMap {
    pub fn new(segments: Vec<TimingSegment>, total_duration: f64, fps: u32) -> Self {
        Self {
            segments,
            total_duration,
            fps,
        }
    }

    /// Number of video frames covered by this map.
    pub fn num_frames(&self) -> usize {
        (self.total_duration * self.fps as f64).round() as usize
    }

    /// Check the monotonicity invariants:
    /// - each segment ends at or after it starts,
    /// - the next segment starts at or after the previous end plus pause,
    /// - the total duration covers the last segment plus its pause.
    pub fn validate(&self) -> Result<(), TimingError> {
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.segment_idx != i {
                return Err(TimingError::IndexMismatch {
                    position: i,
                    segment_idx: seg.segment_idx,
                });
            }
            if seg.end_time < seg.start_time - TIME_EPS {
                return Err(TimingError::NegativeDuration { index: i });
            }
            if let Some(next) = self.segments.get(i + 1) {
                if next.start_time < seg.end_time + seg.pause_after - TIME_EPS {
                    return Err(TimingError::Overlap { index: i });
                }
            }
        }
        if let Some(last) = self.segments.last() {
            if self.total_duration < last.end_time + last.pause_after - TIME_EPS {
                return Err(TimingError::TruncatedDuration {
                    total_duration: self.total_duration,
                });
            }
        }
        Ok(())
    }

    /// Build the frame-level script mask `s[t]`.
    ///
    /// Frames inside a segment carry `1.0`, or the emphasis boost when the
    /// segment stresses tokens (capped at [`MASK_CEILING`]). Frames inside a
    /// `pause_after` window carry `0.0`. Frames outside any segment (leading
    /// silence, rounding slack at the tail) default to `1.0`.
    pub fn build_intent_mask(&self) -> Vec<f32> {
        let n = self.num_frames();
        let mut mask = vec![1.0_f32; n];
        let fps = self.fps as f64;

        for seg in &self.segments {
            let start = frame_index(seg.start_time, fps, n);
            let end = frame_index(seg.end_time, fps, n);
            let pause_end = frame_index(seg.end_time + seg.pause_after, fps, n);

            let speech = seg.speech_mask_value();
            for value in &mut mask[start..end] {
                *value = speech;
            }
            for value in &mut mask[end..pause_end] {
                *value = 0.0;
            }
        }

        mask
    }

    /// Frame indices of sentence-end boundaries, for nod triggering.
    pub fn sentence_end_frames(&self) -> Vec<usize> {
        let n = self.num_frames();
        let fps = self.fps as f64;
        self.segments
            .iter()
            .filter(|seg| seg.sentence_end)
            .filter_map(|seg| {
                let frame = (seg.end_time * fps) as usize;
                (frame < n).then_some(frame)
            })
            .collect()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TimingError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TimingError> {
        let json = std::fs::read_to_string(path)?;
        let map: Self = serde_json::from_str(&json)?;
        map.validate()?;
        Ok(map)
    }
}

/// Convert a time to a frame index clamped to `[0, n]` (half-open ranges).
fn frame_index(time: f64, fps: f64, n: usize) -> usize {
    ((time * fps) as usize).min(n)
}

#[derive(Debug, Error)]
pub enum TimingError {
    #[error("segment at position {position} declares segment_idx {segment_idx}")]
    IndexMismatch { position: usize, segment_idx: usize },

    #[error("segment {index} ends before it starts")]
    NegativeDuration { index: usize },

    #[error("segment {index} overlaps the next segment's start")]
    Overlap { index: usize },

    #[error("total_duration {total_duration} does not cover the last segment")]
    TruncatedDuration { total_duration: f64 },

    #[error("timing serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timing I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
