//! Motion governor: the deterministic constraint layer between motion
//! proposal and rendering.
//!
//! The animation model proposes motion; the governor directs it. It fuses
//! two intent sources (an audio energy gate and the script timing map)
//! multiplicatively, so either source demanding stillness wins, then
//! clamps, gates, scales, smooths, and optionally nods.
//!
//! Contract, in force after every call:
//! - lip-owned and identity channels pass through bit-exact,
//! - pose channels stay within the style's ceilings,
//! - output shape equals input shape and every value is finite,
//! - any internal anomaly returns the input unchanged with one warning.
//!
//! Compact (latent) bundles are never sliced: a per-frame scalar gate in
//! `[COMPACT_GATE_FLOOR, COMPACT_GATE_FLOOR + COMPACT_GATE_SPAN]` is the
//! only transformation applied there.

use std::path::Path;

use tracing::{debug, info, warn};

use lumen_models::{CoeffTable, CoefficientBundle, ExplicitLayout, IntentTimingMap, StyleProfile};

use crate::audio;
use crate::error::{MediaError, MediaResult};

/// Lower bound of the compact-mode scalar gate. Tuned against the
/// renderer's black-frame failure mode; style-level, not universal.
pub const COMPACT_GATE_FLOOR: f32 = 0.7;
/// Span of the compact-mode scalar gate above the floor.
pub const COMPACT_GATE_SPAN: f32 = 0.25;

/// Fused-mask value below which a frame counts as a pause.
const PAUSE_EPS: f32 = 0.1;

/// Governor result: the (possibly new) bundle plus whether governance was
/// actually applied. `applied == false` means the input passed through
/// unchanged and the caller should record a governor no-op.
#[derive(Debug)]
pub struct GovernOutcome {
    pub bundle: CoefficientBundle,
    pub applied: bool,
}

/// Deterministic motion constraint layer. Pure function of its inputs; a
/// governor value carries only configuration.
#[derive(Debug, Clone)]
pub struct MotionGovernor {
    style: StyleProfile,
    fps: u32,
    enabled: bool,
}

impl MotionGovernor {
    pub fn new(style: StyleProfile, fps: u32) -> Self {
        Self {
            style,
            fps,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn style(&self) -> &StyleProfile {
        &self.style
    }

    /// Govern a coefficient bundle.
    ///
    /// `audio_path` feeds the energy gate, `timing` feeds the script gate;
    /// either may be absent. Never fails: anomalies (non-finite input,
    /// unreadable audio) yield the input unchanged.
    pub fn govern(
        &self,
        bundle: &CoefficientBundle,
        audio_path: Option<&Path>,
        timing: Option<&IntentTimingMap>,
    ) -> GovernOutcome {
        if !self.enabled {
            info!("Governor disabled, passing coefficients through");
            return GovernOutcome {
                bundle: bundle.clone(),
                applied: false,
            };
        }

        match self.try_govern(bundle, audio_path, timing) {
            Ok(governed) => GovernOutcome {
                bundle: governed,
                applied: true,
            },
            Err(err) => {
                warn!(error = %err, "Governor anomaly, returning coefficients unchanged");
                GovernOutcome {
                    bundle: bundle.clone(),
                    applied: false,
                }
            }
        }
    }

    fn try_govern(
        &self,
        bundle: &CoefficientBundle,
        audio_path: Option<&Path>,
        timing: Option<&IntentTimingMap>,
    ) -> MediaResult<CoefficientBundle> {
        if !bundle.table().is_finite() {
            return Err(MediaError::audio_decode(
                "input coefficients contain non-finite values".to_string(),
            ));
        }

        let frames = bundle.frames();

        let audio_mask = match audio_path {
            Some(path) => {
                let (samples, rate) = audio::read_wav_mono(path)?;
                Some(audio::build_audio_mask(&samples, rate, self.fps, frames))
            }
            None => None,
        };

        let script_mask = timing.map(|map| align_mask(map.build_intent_mask(), frames));
        let nod_frames = timing
            .map(|map| {
                map.sentence_end_frames()
                    .into_iter()
                    .filter(|&f| f < frames)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let fused = fuse_masks(audio_mask.as_deref(), script_mask.as_deref());
        if let Some(mask) = &fused {
            let pauses = mask.iter().filter(|&&m| m < PAUSE_EPS).count();
            let boosts = mask.iter().filter(|&&m| m > 1.05).count();
            debug!(
                frames = frames,
                pause_frames = pauses,
                emphasis_frames = boosts,
                "Fused intent mask"
            );
        }

        match bundle {
            CoefficientBundle::Compact { table } => {
                Ok(self.govern_compact(table, fused.as_deref()))
            }
            CoefficientBundle::Explicit { table, layout } => {
                let governed = self.govern_explicit(
                    table,
                    layout,
                    fused.as_deref(),
                    audio_mask.as_deref(),
                    script_mask.as_deref(),
                    &nod_frames,
                )?;
                Ok(CoefficientBundle::Explicit {
                    table: governed,
                    layout: layout.clone(),
                })
            }
        }
    }

    /// Compact/latent path: frame-wise scalar gate only, never reshaping
    /// the vector. With no intent source there is nothing to express, so
    /// the table passes through untouched.
    fn govern_compact(&self, table: &CoeffTable, fused: Option<&[f32]>) -> CoefficientBundle {
        let Some(mask) = fused else {
            debug!("No intent mask, compact bundle unchanged");
            return CoefficientBundle::Compact {
                table: table.clone(),
            };
        };

        let mut out = table.clone();
        for t in 0..out.frames() {
            let gate = COMPACT_GATE_FLOOR + COMPACT_GATE_SPAN * mask[t].clamp(0.0, 1.0);
            for value in out.row_mut(t) {
                *value *= gate;
            }
        }
        CoefficientBundle::Compact { table: out }
    }

    /// Explicit path: clamp, intent gate, style scale, IIR smooth, pause
    /// override, sentence-end nod, final pose re-clamp.
    fn govern_explicit(
        &self,
        table: &CoeffTable,
        layout: &ExplicitLayout,
        fused: Option<&[f32]>,
        audio_mask: Option<&[f32]>,
        script_mask: Option<&[f32]>,
        nod_frames: &[usize],
    ) -> MediaResult<CoeffTable> {
        layout.validate(table.dims())?;

        let frames = table.frames();
        let style = &self.style;
        let alpha = (1.0 - style.smoothing) as f32;
        let pose_max: [f32; 3] = [
            style.pose_max[0] as f32,
            style.pose_max[1] as f32,
            style.pose_max[2] as f32,
        ];
        let pose_scale: [f32; 3] = [
            style.pose_scale[0] as f32,
            style.pose_scale[1] as f32,
            style.pose_scale[2] as f32,
        ];
        let expr_max = style.expr_max as f32;
        let expr_strength = style.expr_strength as f32;

        // Expression channels the governor may touch (lip-owned excluded).
        let exp_channels: Vec<usize> = layout
            .exp
            .indices()
            .filter(|&c| !layout.lip_channels.contains(c))
            .collect();
        let pose_channels: Vec<usize> = layout.pose.indices().collect();

        let nod_spacing = nod_spacing_frames(style.nod_rate, self.fps);
        let mut last_nod: Option<usize> = None;

        let mut out = table.clone();
        let mut prev_pose: Option<[f32; 3]> = None;
        let mut prev_exp: Option<Vec<f32>> = None;

        for t in 0..frames {
            let intent = fused.map(|m| m[t]).unwrap_or(1.0);
            let row_in = table.row(t);

            // 1. Clamp, 2. intent gate, 3. style scale for pose.
            let mut pose = [0.0_f32; 3];
            for (k, &channel) in pose_channels.iter().enumerate() {
                let clamped = row_in[channel].clamp(-pose_max[k], pose_max[k]);
                pose[k] = clamped * intent * pose_scale[k];
            }

            // Same three steps for governable expression channels.
            let mut exp: Vec<f32> = exp_channels
                .iter()
                .map(|&channel| row_in[channel].clamp(-expr_max, expr_max) * intent * expr_strength)
                .collect();

            // 4. Temporal smoothing (IIR), seeded with the first sample.
            match (&prev_pose, &prev_exp) {
                (Some(pp), Some(pe)) => {
                    for k in 0..3 {
                        pose[k] = alpha * pose[k] + (1.0 - alpha) * pp[k];
                    }
                    for (value, prev) in exp.iter_mut().zip(pe.iter()) {
                        *value = alpha * *value + (1.0 - alpha) * prev;
                    }
                }
                _ => {}
            }

            // 5. Pause-frame override: both gates must agree on stillness.
            if is_pause_frame(audio_mask, script_mask, t) {
                let pose_keep = (1.0 - style.stillness_on_pause) as f32;
                let exp_keep = (1.0 - style.stillness_expr_on_pause) as f32;
                for value in pose.iter_mut() {
                    *value *= pose_keep;
                }
                for value in exp.iter_mut() {
                    *value *= exp_keep;
                }
            }

            prev_pose = Some(pose);
            prev_exp = Some(exp.clone());

            // 6. Sentence-end nod, rate-limited globally across the clip.
            if style.nod_rate > 0.0 && nod_frames.contains(&t) {
                let accepted = match last_nod {
                    Some(prev) => t.saturating_sub(prev) >= nod_spacing,
                    None => true,
                };
                if accepted {
                    pose[1] += style.nod_amplitude as f32;
                    last_nod = Some(t);
                }
            }

            // Final safety clamp keeps the pose ceiling invariant even
            // after emphasis boosts and nod impulses.
            for k in 0..3 {
                pose[k] = pose[k].clamp(-pose_max[k], pose_max[k]);
            }

            let row_out = out.row_mut(t);
            for (k, &channel) in pose_channels.iter().enumerate() {
                row_out[channel] = pose[k];
            }
            for (&channel, &value) in exp_channels.iter().zip(exp.iter()) {
                row_out[channel] = value;
            }
        }

        Ok(out)
    }
}

/// Minimum frame spacing between accepted nods.
fn nod_spacing_frames(nod_rate: f64, fps: u32) -> usize {
    if nod_rate <= 0.0 {
        return usize::MAX;
    }
    (fps as f64 / nod_rate).ceil() as usize
}

/// Pause detection for the stillness override. When both gates are
/// present, both must demand stillness; with a single gate, that gate
/// decides alone.
fn is_pause_frame(audio_mask: Option<&[f32]>, script_mask: Option<&[f32]>, t: usize) -> bool {
    let audio_pause = audio_mask.map(|m| m[t] < PAUSE_EPS);
    let script_pause = script_mask.map(|m| m[t] == 0.0);
    match (audio_pause, script_pause) {
        (Some(a), Some(s)) => a && s,
        (Some(a), None) => a,
        (None, Some(s)) => s,
        (None, None) => false,
    }
}

/// Multiplicative mask fusion: either source vetoing motion wins.
fn fuse_masks(audio: Option<&[f32]>, script: Option<&[f32]>) -> Option<Vec<f32>> {
    match (audio, script) {
        (Some(a), Some(s)) => Some(a.iter().zip(s.iter()).map(|(x, y)| x * y).collect()),
        (Some(a), None) => Some(a.to_vec()),
        (None, Some(s)) => Some(s.to_vec()),
        (None, None) => None,
    }
}

/// Align a mask to the motion frame count: truncate excess, pad with the
/// last value. The coefficient table is the frame-count source of truth.
fn align_mask(mut mask: Vec<f32>, target: usize) -> Vec<f32> {
    if mask.len() > target {
        mask.truncate(target);
    } else if mask.len() < target {
        let last = mask.last().copied().unwrap_or(1.0);
        mask.resize(target, last);
    }
    mask
}
