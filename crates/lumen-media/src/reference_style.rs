//! Reference-style extraction: derive a motion style profile from existing
//! footage.
//!
//! Frames are sampled from the video, head pose is measured per frame, and
//! the pose statistics are folded into a `StyleProfile`. Two measurement
//! backends share one output type: dense facial landmarks (accurate, all
//! three angles) and face bounding-box tracking (yaw/pitch only, roll
//! zero). Callers pick the backend at construction, which keeps test runs
//! deterministic.

use std::path::Path;

use tracing::{debug, info};

use lumen_models::StyleProfile;

use crate::error::{MediaError, MediaResult};
use crate::probe::{self, GrayFrame};

/// Minimum measured frames for a usable profile.
pub const MIN_VALID_FRAMES: usize = 10;

/// Default frame sampling step (every 4th frame).
pub const DEFAULT_SAMPLE_STEP: u32 = 4;

/// Head pose angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Key facial landmarks in normalized [0, 1] frame coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FaceLandmarks {
    pub nose: (f64, f64),
    pub left_eye: (f64, f64),
    pub right_eye: (f64, f64),
}

/// Face bounding box in normalized [0, 1] frame coordinates.
#[derive(Debug, Clone, Copy)]
pub struct FaceBox {
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
}

/// Dense landmark detection backend (an external face engine).
pub trait LandmarkSource: Send {
    fn detect(&mut self, frame: &GrayFrame) -> Option<FaceLandmarks>;
}

/// Face bounding-box detection backend.
pub trait FaceBoxSource: Send {
    fn detect(&mut self, frame: &GrayFrame) -> Option<FaceBox>;
}

/// Measurement strategy, fixed at construction.
pub enum PoseBackend {
    Dense(Box<dyn LandmarkSource>),
    BoxTracking(Box<dyn FaceBoxSource>),
}

impl PoseBackend {
    fn estimate(&mut self, frame: &GrayFrame) -> Option<FramePose> {
        match self {
            PoseBackend::Dense(source) => source.detect(frame).map(pose_from_landmarks),
            PoseBackend::BoxTracking(source) => source.detect(frame).map(pose_from_box),
        }
    }
}

/// Yaw/pitch from the nose-tip offset against the eye center, roll from
/// the eye line. Angles are approximations good enough for statistics.
fn pose_from_landmarks(lm: FaceLandmarks) -> FramePose {
    let eye_cx = (lm.left_eye.0 + lm.right_eye.0) / 2.0;
    let eye_cy = (lm.left_eye.1 + lm.right_eye.1) / 2.0;

    let yaw = ((lm.nose.0 - eye_cx) / 0.3).atan() * 2.0;
    let pitch = ((lm.nose.1 - eye_cy) / 0.3).atan() * 2.0;
    let roll = (lm.right_eye.1 - lm.left_eye.1).atan2(lm.right_eye.0 - lm.left_eye.0);

    FramePose { yaw, pitch, roll }
}

/// Centroid displacement relative to frame size; roll is unobservable.
fn pose_from_box(face: FaceBox) -> FramePose {
    FramePose {
        yaw: (face.cx - 0.5) * 0.6,
        pitch: (face.cy - 0.5) * 0.5,
        roll: 0.0,
    }
}

/// Extracts style profiles from reference videos.
pub struct ReferenceStyleExtractor {
    backend: PoseBackend,
    sample_step: u32,
}

impl ReferenceStyleExtractor {
    pub fn new(backend: PoseBackend) -> Self {
        Self {
            backend,
            sample_step: DEFAULT_SAMPLE_STEP,
        }
    }

    pub fn with_sample_step(mut self, step: u32) -> Self {
        self.sample_step = step.max(1);
        self
    }

    /// Derive a style profile from a reference video.
    pub async fn build_style_from_reference(
        &mut self,
        video_path: impl AsRef<Path>,
        name: impl Into<String>,
    ) -> MediaResult<StyleProfile> {
        let video_path = video_path.as_ref();
        let info = probe::probe_video(video_path).await?;
        info!(
            path = %video_path.display(),
            duration_s = format!("{:.1}", info.duration),
            "Extracting reference style"
        );

        let frames = probe::extract_gray_frames(video_path, &info, self.sample_step).await?;
        let poses = self.measure(&frames);

        if poses.len() < MIN_VALID_FRAMES {
            return Err(MediaError::InsufficientReferenceData {
                got: poses.len(),
                need: MIN_VALID_FRAMES,
            });
        }

        Ok(derive_style_profile(&poses, name.into(), info.duration))
    }

    /// Run the backend over sampled frames, keeping valid measurements.
    pub fn measure(&mut self, frames: &[GrayFrame]) -> Vec<FramePose> {
        let poses: Vec<FramePose> = frames
            .iter()
            .filter_map(|frame| self.backend.estimate(frame))
            .collect();
        debug!(
            sampled = frames.len(),
            valid = poses.len(),
            "Measured head poses"
        );
        poses
    }
}

/// Fold pose statistics into a style profile.
///
/// Ceilings come from 95th-percentile magnitudes, amplitude scales from
/// the per-axis spread, and the overall activity level `E` selects the
/// smoothing/stillness band. Nod rate counts pitch direction changes over
/// the clip duration.
pub fn derive_style_profile(poses: &[FramePose], name: String, duration: f64) -> StyleProfile {
    let yaw: Vec<f64> = poses.iter().map(|p| p.yaw).collect();
    let pitch: Vec<f64> = poses.iter().map(|p| p.pitch).collect();
    let roll: Vec<f64> = poses.iter().map(|p| p.roll).collect();

    let yaw_std = std_deviation(&yaw);
    let pitch_std = std_deviation(&pitch);
    let roll_std = std_deviation(&roll);

    let pose_max = [
        percentile_abs(&yaw, 95.0),
        percentile_abs(&pitch, 95.0),
        percentile_abs(&roll, 95.0),
    ];

    let pose_scale = [
        (yaw_std / 0.3 * 0.8).clamp(0.3, 1.0),
        (pitch_std / 0.2 * 0.7).clamp(0.3, 1.0),
        (roll_std / 0.15 * 0.6).clamp(0.3, 1.0),
    ];

    let activity = yaw_std + pitch_std + roll_std;
    let (smoothing, stillness_on_pause, expr_strength) = if activity < 0.3 {
        (0.85, 0.90, 0.6)
    } else if activity < 0.6 {
        (0.70, 0.75, 0.8)
    } else {
        (0.60, 0.60, 1.0)
    };

    let nod_rate = if duration > 0.0 {
        direction_changes(&pitch) as f64 / duration
    } else {
        0.0
    };
    let nod_amplitude = pitch_std * 0.5;

    info!(
        name = %name,
        yaw_std = format!("{:.3}", yaw_std),
        pitch_std = format!("{:.3}", pitch_std),
        roll_std = format!("{:.3}", roll_std),
        nod_rate = format!("{:.2}", nod_rate),
        "Derived style profile"
    );

    StyleProfile {
        name,
        pose_max,
        pose_scale,
        expr_max: 3.0,
        expr_strength,
        smoothing,
        stillness_on_pause,
        stillness_expr_on_pause: (stillness_on_pause + 0.05).min(0.95),
        nod_rate,
        nod_amplitude,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile of absolute values.
fn percentile_abs(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut magnitudes: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    magnitudes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0) * (magnitudes.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        magnitudes[lower]
    } else {
        let weight = rank - lower as f64;
        magnitudes[lower] * (1.0 - weight) + magnitudes[upper] * weight
    }
}

/// Count direction changes in a series (sign flips of successive
/// differences). A nodding head reverses pitch direction twice per nod.
fn direction_changes(series: &[f64]) -> usize {
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
    diffs
        .windows(2)
        .filter(|w| w[0].signum() != w[1].signum() && w[0] != 0.0 && w[1] != 0.0)
        .count()
}
