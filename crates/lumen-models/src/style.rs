//! Motion style profiles.
//!
//! A style profile is an immutable bundle of numeric parameters controlling
//! the motion governor: pose ceilings and amplitude scaling, expression
//! strength, temporal smoothing, pause stillness, and sentence-end nodding.
//! Three presets ship with the pipeline; reference-style extraction derives
//! new ones from existing footage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Named motion recipe consumed by the governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StyleProfile {
    pub name: String,

    /// Absolute radian ceilings for yaw, pitch, roll.
    pub pose_max: [f64; 3],
    /// Amplitude scaling in [0, 1] for yaw, pitch, roll.
    pub pose_scale: [f64; 3],

    /// Safety envelope for expression coefficients (normalized units).
    pub expr_max: f64,
    /// Scalar on non-mouth expression coefficients.
    pub expr_strength: f64,

    /// IIR retention factor in [0, 1): higher keeps more of the previous
    /// frame.
    pub smoothing: f64,

    /// Pose reduction factor applied on pause frames, in [0, 1].
    pub stillness_on_pause: f64,
    /// Expression reduction factor applied on pause frames, in [0, 1].
    pub stillness_expr_on_pause: f64,

    /// Maximum accepted nods per second; 0 disables nodding.
    pub nod_rate: f64,
    /// Pitch impulse added at an accepted sentence-end nod (radians).
    pub nod_amplitude: f64,
}

impl StyleProfile {
    /// Calm, measured tech-presenter delivery. Minimal motion, no nods.
    pub fn calm_tech() -> Self {
        Self {
            name: "calm_tech".to_string(),
            pose_max: [0.35, 0.25, 0.20],
            pose_scale: [0.5, 0.4, 0.3],
            expr_max: 3.0,
            expr_strength: 0.6,
            smoothing: 0.80,
            stillness_on_pause: 0.90,
            stillness_expr_on_pause: 0.92,
            nod_rate: 0.0,
            nod_amplitude: 0.05,
        }
    }

    /// Lively delivery with frequent motion and nods.
    pub fn energetic() -> Self {
        Self {
            name: "energetic".to_string(),
            pose_max: [0.55, 0.45, 0.35],
            pose_scale: [0.9, 0.8, 0.7],
            expr_max: 3.0,
            expr_strength: 1.1,
            smoothing: 0.60,
            stillness_on_pause: 0.60,
            stillness_expr_on_pause: 0.70,
            nod_rate: 0.5,
            nod_amplitude: 0.08,
        }
    }

    /// Deliberate lecture pacing between the two extremes.
    pub fn lecturer() -> Self {
        Self {
            name: "lecturer".to_string(),
            pose_max: [0.45, 0.35, 0.25],
            pose_scale: [0.7, 0.6, 0.5],
            expr_max: 3.0,
            expr_strength: 0.8,
            smoothing: 0.70,
            stillness_on_pause: 0.75,
            stillness_expr_on_pause: 0.85,
            nod_rate: 0.3,
            nod_amplitude: 0.06,
        }
    }

    /// All shipped presets.
    pub fn presets() -> Vec<StyleProfile> {
        vec![Self::calm_tech(), Self::energetic(), Self::lecturer()]
    }

    /// Look up a preset by name.
    pub fn preset(name: &str) -> Option<StyleProfile> {
        match name.to_lowercase().as_str() {
            "calm_tech" => Some(Self::calm_tech()),
            "energetic" => Some(Self::energetic()),
            "lecturer" => Some(Self::lecturer()),
            _ => None,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StyleIoError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StyleIoError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl Default for StyleProfile {
    fn default() -> Self {
        Self::calm_tech()
    }
}

impl fmt::Display for StyleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for StyleProfile {
    type Err = StyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::preset(s).ok_or_else(|| StyleParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown style preset: {0}")]
pub struct StyleParseError(String);

#[derive(Debug, Error)]
pub enum StyleIoError {
    #[error("style serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("style I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_parse() {
        assert_eq!("calm_tech".parse::<StyleProfile>().unwrap(), StyleProfile::calm_tech());
        assert_eq!("ENERGETIC".parse::<StyleProfile>().unwrap(), StyleProfile::energetic());
        assert!("unknown".parse::<StyleProfile>().is_err());
    }

    #[test]
    fn test_preset_table_values() {
        let calm = StyleProfile::calm_tech();
        assert_eq!(calm.pose_max, [0.35, 0.25, 0.20]);
        assert_eq!(calm.pose_scale, [0.5, 0.4, 0.3]);
        assert_eq!(calm.smoothing, 0.80);
        assert_eq!(calm.nod_rate, 0.0);

        let energetic = StyleProfile::energetic();
        assert_eq!(energetic.pose_max, [0.55, 0.45, 0.35]);
        assert_eq!(energetic.expr_strength, 1.1);
        assert_eq!(energetic.nod_rate, 0.5);

        let lecturer = StyleProfile::lecturer();
        assert_eq!(lecturer.stillness_on_pause, 0.75);
        assert_eq!(lecturer.nod_rate, 0.3);
    }

    #[test]
    fn test_save_load_bit_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("style.json");

        let mut profile = StyleProfile::energetic();
        profile.name = "derived_reference".to_string();
        profile.pose_max = [0.123456789012345, 0.2, 0.05];
        profile.nod_rate = 0.7333333333333333;

        profile.save(&path).unwrap();
        let back = StyleProfile::load(&path).unwrap();
        assert_eq!(profile, back);
    }

    #[test]
    fn test_presets_have_distinct_names() {
        let names: Vec<String> = StyleProfile::presets().into_iter().map(|p| p.name).collect();
        let mut deduped = names.clone();
        deduped.dedup();
        assert_eq!(names, deduped);
    }
}
