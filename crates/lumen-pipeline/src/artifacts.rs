//! Per-request artifact persistence.
//!
//! Each pipeline invocation owns a unique directory under the output root
//! holding `script.json`, `timing.json`, `audio.wav`, and `video.mp4`.
//! Files are flushed and synced before the next stage starts so
//! downstream readers observe atomic visibility. Nothing here deletes
//! anything; retention is an external concern.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use lumen_models::RequestId;

/// The on-disk artifact set for one request.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub dir: PathBuf,
    pub script_json: PathBuf,
    pub timing_json: PathBuf,
    pub audio_wav: PathBuf,
    pub video_mp4: PathBuf,
}

impl ArtifactSet {
    /// Create the per-request directory under `root`.
    pub fn create(root: impl AsRef<Path>, request_id: &RequestId) -> std::io::Result<Self> {
        let dir = root.as_ref().join(request_id.as_str());
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            script_json: dir.join("script.json"),
            timing_json: dir.join("timing.json"),
            audio_wav: dir.join("audio.wav"),
            video_mp4: dir.join("video.mp4"),
            dir,
        })
    }

    /// Serialize a value as pretty JSON, flushed and synced to disk.
    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Sync an already-written file (e.g. the WAV the synthesizer wrote).
    pub fn sync_file(path: &Path) -> std::io::Result<()> {
        File::open(path)?.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_create_builds_request_directory() {
        let root = tempfile::tempdir().unwrap();
        let id = RequestId::new();
        let artifacts = ArtifactSet::create(root.path(), &id).unwrap();

        assert!(artifacts.dir.is_dir());
        assert!(artifacts.dir.ends_with(id.as_str()));
        assert_eq!(artifacts.script_json.file_name().unwrap(), "script.json");
        assert_eq!(artifacts.video_mp4.file_name().unwrap(), "video.mp4");
    }

    #[test]
    fn test_write_json_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let id = RequestId::new();
        let artifacts = ArtifactSet::create(root.path(), &id).unwrap();

        let sample = Sample { value: 9 };
        ArtifactSet::write_json(&artifacts.script_json, &sample).unwrap();

        let json = std::fs::read_to_string(&artifacts.script_json).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_distinct_requests_get_distinct_dirs() {
        let root = tempfile::tempdir().unwrap();
        let a = ArtifactSet::create(root.path(), &RequestId::new()).unwrap();
        let b = ArtifactSet::create(root.path(), &RequestId::new()).unwrap();
        assert_ne!(a.dir, b.dir);
    }
}
