//! Coefficient bundles exchanged with the face-animation model.
//!
//! The animation model proposes per-frame motion as a `[T, D]` table. Two
//! layouts exist in the wild and must never be conflated:
//!
//! - **Compact** (`D < 200`): a latent vector the renderer decodes itself.
//!   Slicing or per-channel scaling breaks rendering; the governor may only
//!   apply a frame-wise scalar gate.
//! - **Explicit** (`D >= 200`): a classical per-channel table with declared
//!   expression and pose ranges, plus a set of lip-owned channels the
//!   governor must pass through untouched.
//!
//! The split is carried as a tagged enum so downstream code branches exactly
//! once. Channel index ranges are declared by the model adapter, never
//! hard-coded here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Dimension threshold separating compact (latent) from explicit tables.
pub const COMPACT_DIM_THRESHOLD: usize = 200;

/// Dense row-major `[frames, dims]` table of f32 coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoeffTable {
    frames: usize,
    dims: usize,
    data: Vec<f32>,
}

impl CoeffTable {
    pub fn new(frames: usize, dims: usize, data: Vec<f32>) -> Result<Self, CoeffError> {
        if dims == 0 || frames == 0 {
            return Err(CoeffError::EmptyTable { frames, dims });
        }
        if data.len() != frames * dims {
            return Err(CoeffError::ShapeMismatch {
                frames,
                dims,
                len: data.len(),
            });
        }
        Ok(Self { frames, dims, data })
    }

    pub fn zeros(frames: usize, dims: usize) -> Result<Self, CoeffError> {
        Self::new(frames, dims, vec![0.0; frames * dims])
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, t: usize) -> &[f32] {
        &self.data[t * self.dims..(t + 1) * self.dims]
    }

    pub fn row_mut(&mut self, t: usize) -> &mut [f32] {
        &mut self.data[t * self.dims..(t + 1) * self.dims]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// True when every value is finite (no NaN, no infinities).
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

/// Half-open channel index range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelRange {
    pub start: usize,
    pub end: usize,
}

impl ChannelRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Bitset over channel indices. Marks channels the governor refuses to
/// touch (lip-owned pass-through).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ChannelSet {
    words: Vec<u64>,
}

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new();
        for index in indices {
            set.insert(index);
        }
        set
    }

    pub fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % 64);
    }

    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / 64)
            .map(|w| w & (1 << (index % 64)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

/// Channel layout declared by an explicit-mode animation model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExplicitLayout {
    /// Expression coefficient range.
    pub exp: ChannelRange,
    /// Pose range: exactly yaw, pitch, roll.
    pub pose: ChannelRange,
    /// Identity coefficient range, when the model carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ChannelRange>,
    /// Lip-owned channels: bit-exact pass-through for the governor.
    #[serde(default)]
    pub lip_channels: ChannelSet,
}

impl ExplicitLayout {
    pub fn new(exp: ChannelRange, pose: ChannelRange) -> Self {
        Self {
            exp,
            pose,
            identity: None,
            lip_channels: ChannelSet::new(),
        }
    }

    pub fn with_identity(mut self, identity: ChannelRange) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_lip_channels(mut self, lips: ChannelSet) -> Self {
        self.lip_channels = lips;
        self
    }

    /// Check the layout fits a table of `dims` channels.
    pub fn validate(&self, dims: usize) -> Result<(), CoeffError> {
        if self.pose.len() != 3 {
            return Err(CoeffError::BadPoseRange {
                start: self.pose.start,
                end: self.pose.end,
            });
        }
        let mut limit = self.exp.end.max(self.pose.end);
        if let Some(identity) = &self.identity {
            limit = limit.max(identity.end);
        }
        if limit > dims {
            return Err(CoeffError::LayoutOutOfBounds { limit, dims });
        }
        Ok(())
    }

    /// Pitch channel index (nod impulses land here).
    pub fn pitch_index(&self) -> usize {
        self.pose.start + 1
    }
}

/// Per-frame motion parameters plus format metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CoefficientBundle {
    /// Latent table: opaque to the governor apart from scalar gating.
    Compact { table: CoeffTable },
    /// Classical per-channel table with a declared layout.
    Explicit {
        table: CoeffTable,
        layout: ExplicitLayout,
    },
}

impl CoefficientBundle {
    /// Classify a raw table by dimensionality. Explicit tables require a
    /// layout; a layout passed with a compact table is ignored (the
    /// renderer owns latent decoding).
    pub fn classify(table: CoeffTable, layout: Option<ExplicitLayout>) -> Result<Self, CoeffError> {
        if table.dims() < COMPACT_DIM_THRESHOLD {
            Ok(Self::Compact { table })
        } else {
            let layout = layout.ok_or(CoeffError::MissingLayout { dims: table.dims() })?;
            layout.validate(table.dims())?;
            Ok(Self::Explicit { table, layout })
        }
    }

    pub fn is_compact(&self) -> bool {
        matches!(self, Self::Compact { .. })
    }

    pub fn table(&self) -> &CoeffTable {
        match self {
            Self::Compact { table } => table,
            Self::Explicit { table, .. } => table,
        }
    }

    pub fn layout(&self) -> Option<&ExplicitLayout> {
        match self {
            Self::Compact { .. } => None,
            Self::Explicit { layout, .. } => Some(layout),
        }
    }

    pub fn frames(&self) -> usize {
        self.table().frames()
    }

    pub fn dims(&self) -> usize {
        self.table().dims()
    }

    /// `(frames, dims)` of the underlying table.
    pub fn shape(&self) -> (usize, usize) {
        (self.frames(), self.dims())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CoeffError> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoeffError> {
        let json = std::fs::read_to_string(path)?;
        let bundle: Self = serde_json::from_str(&json)?;

        let table = bundle.table();
        if table.frames() == 0 || table.dims() == 0 {
            return Err(CoeffError::EmptyTable {
                frames: table.frames(),
                dims: table.dims(),
            });
        }
        if table.data().len() != table.frames() * table.dims() {
            return Err(CoeffError::ShapeMismatch {
                frames: table.frames(),
                dims: table.dims(),
                len: table.data().len(),
            });
        }
        if let Self::Explicit { table, layout } = &bundle {
            layout.validate(table.dims())?;
        }
        Ok(bundle)
    }
}

#[derive(Debug, Error)]
pub enum CoeffError {
    #[error("coefficient table cannot be empty ({frames} frames, {dims} dims)")]
    EmptyTable { frames: usize, dims: usize },

    #[error("data length {len} does not match {frames}x{dims}")]
    ShapeMismatch {
        frames: usize,
        dims: usize,
        len: usize,
    },

    #[error("pose range [{start}, {end}) must cover exactly yaw, pitch, roll")]
    BadPoseRange { start: usize, end: usize },

    #[error("layout reaches channel {limit} but table has {dims} dims")]
    LayoutOutOfBounds { limit: usize, dims: usize },

    #[error("explicit table ({dims} dims) requires a channel layout")]
    MissingLayout { dims: usize },

    #[error("coefficient serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("coefficient I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explicit_layout() -> ExplicitLayout {
        ExplicitLayout::new(ChannelRange::new(80, 144), ChannelRange::new(224, 227))
            .with_identity(ChannelRange::new(0, 80))
            .with_lip_channels(ChannelSet::from_indices(80..93))
    }

    #[test]
    fn test_classify_compact() {
        let table = CoeffTable::zeros(10, 70).unwrap();
        let bundle = CoefficientBundle::classify(table, None).unwrap();
        assert!(bundle.is_compact());
        assert_eq!(bundle.shape(), (10, 70));
    }

    #[test]
    fn test_classify_explicit_requires_layout() {
        let table = CoeffTable::zeros(10, 257).unwrap();
        assert!(matches!(
            CoefficientBundle::classify(table, None),
            Err(CoeffError::MissingLayout { dims: 257 })
        ));
    }

    #[test]
    fn test_classify_explicit() {
        let table = CoeffTable::zeros(10, 257).unwrap();
        let bundle = CoefficientBundle::classify(table, Some(explicit_layout())).unwrap();
        assert!(!bundle.is_compact());
        assert_eq!(bundle.layout().unwrap().pitch_index(), 225);
    }

    #[test]
    fn test_layout_bounds_checked() {
        let layout = ExplicitLayout::new(ChannelRange::new(0, 64), ChannelRange::new(300, 303));
        assert!(matches!(
            layout.validate(257),
            Err(CoeffError::LayoutOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_pose_range_must_be_three_wide() {
        let layout = ExplicitLayout::new(ChannelRange::new(0, 64), ChannelRange::new(64, 66));
        assert!(matches!(layout.validate(257), Err(CoeffError::BadPoseRange { .. })));
    }

    #[test]
    fn test_table_shape_validation() {
        assert!(CoeffTable::new(4, 3, vec![0.0; 11]).is_err());
        assert!(CoeffTable::new(4, 3, vec![0.0; 12]).is_ok());
        assert!(CoeffTable::new(0, 3, vec![]).is_err());
    }

    #[test]
    fn test_finite_scan() {
        let mut table = CoeffTable::zeros(2, 3).unwrap();
        assert!(table.is_finite());
        table.row_mut(1)[2] = f32::NAN;
        assert!(!table.is_finite());
    }

    #[test]
    fn test_channel_set() {
        let set = ChannelSet::from_indices([1, 64, 200]);
        assert!(set.contains(1));
        assert!(set.contains(64));
        assert!(set.contains(200));
        assert!(!set.contains(0));
        assert!(!set.contains(65));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_load_rejects_inconsistent_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(
            &path,
            r#"{"mode":"compact","table":{"frames":2,"dims":3,"data":[0.0]}}"#,
        )
        .unwrap();
        assert!(matches!(
            CoefficientBundle::load(&path),
            Err(CoeffError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_bundle_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coeffs.json");

        let mut table = CoeffTable::zeros(3, 257).unwrap();
        table.row_mut(0)[224] = 0.25;
        let bundle = CoefficientBundle::classify(table, Some(explicit_layout())).unwrap();

        bundle.save(&path).unwrap();
        let back = CoefficientBundle::load(&path).unwrap();
        assert_eq!(bundle, back);
    }
}
