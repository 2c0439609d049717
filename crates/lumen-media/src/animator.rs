//! Face-animation model adapters.
//!
//! The animation model exposes two stages that this module wraps without
//! touching coefficients: a motion-proposal stage (audio + portrait →
//! coefficient bundle) and a render stage (governed bundle → MP4 muxed
//! with the input audio). Everything between the two stages belongs to the
//! motion governor.
//!
//! The sidecar declares the bundle's layout (compact vs explicit, channel
//! ranges, lip ownership) in the JSON it writes; nothing here hard-codes a
//! channel split.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use lumen_models::CoefficientBundle;

use crate::error::{MediaError, MediaResult};

/// Render-stage options.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Opt-in face enhancement pass.
    pub enhance: bool,
    pub fps: u32,
    /// Output resolution (square), typically 256 or 512.
    pub resolution: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            enhance: false,
            fps: 25,
            resolution: 256,
        }
    }
}

/// Motion-proposal boundary: the model's audio→motion stage.
#[async_trait]
pub trait MotionProposer: Send + Sync {
    async fn propose(
        &self,
        audio_path: &Path,
        reference_image: &Path,
    ) -> MediaResult<CoefficientBundle>;
}

/// Render boundary: coefficients plus portrait and audio to pixels.
#[async_trait]
pub trait FrameRenderer: Send + Sync {
    async fn render(
        &self,
        bundle: &CoefficientBundle,
        reference_image: &Path,
        audio_path: &Path,
        output_path: &Path,
        options: RenderOptions,
    ) -> MediaResult<PathBuf>;
}

/// Sidecar-process animator implementing both stages.
///
/// Invocations:
/// `<cmd> coeffs --audio A --image I --output bundle.json`
/// `<cmd> render --coeffs bundle.json --image I --audio A --output O
///  --fps N --resolution R [--enhance]`
pub struct SidecarAnimator {
    command: PathBuf,
    timeout: Duration,
}

impl SidecarAnimator {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            timeout: Duration::from_secs(900),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: Vec<String>, stage: &str) -> MediaResult<()> {
        debug!(stage = stage, "Invoking animator sidecar");

        let child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MediaError::animation_failed(format!("failed to spawn sidecar ({stage}): {e}"))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| MediaError::animation_failed(format!("sidecar wait failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            warn!(stage = stage, status = ?output.status.code(), "Animator sidecar failed");
            return Err(MediaError::animation_failed(format!(
                "{stage} exited with {:?}: {tail}",
                output.status.code()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MotionProposer for SidecarAnimator {
    async fn propose(
        &self,
        audio_path: &Path,
        reference_image: &Path,
    ) -> MediaResult<CoefficientBundle> {
        if !audio_path.exists() {
            return Err(MediaError::animation_failed(format!(
                "audio not found: {}",
                audio_path.display()
            )));
        }
        if !reference_image.exists() {
            return Err(MediaError::animation_failed(format!(
                "reference image not found: {}",
                reference_image.display()
            )));
        }

        let workdir = tempfile::tempdir()?;
        let bundle_path = workdir.path().join("bundle.json");

        self.run(
            vec![
                "coeffs".to_string(),
                "--audio".to_string(),
                audio_path.to_string_lossy().to_string(),
                "--image".to_string(),
                reference_image.to_string_lossy().to_string(),
                "--output".to_string(),
                bundle_path.to_string_lossy().to_string(),
            ],
            "coeffs",
        )
        .await?;

        let bundle = CoefficientBundle::load(&bundle_path)?;
        info!(
            frames = bundle.frames(),
            dims = bundle.dims(),
            compact = bundle.is_compact(),
            "Received coefficient bundle"
        );
        Ok(bundle)
    }
}

#[async_trait]
impl FrameRenderer for SidecarAnimator {
    async fn render(
        &self,
        bundle: &CoefficientBundle,
        reference_image: &Path,
        audio_path: &Path,
        output_path: &Path,
        options: RenderOptions,
    ) -> MediaResult<PathBuf> {
        let workdir = tempfile::tempdir()?;
        let bundle_path = workdir.path().join("bundle.json");
        bundle.save(&bundle_path)?;

        let mut args = vec![
            "render".to_string(),
            "--coeffs".to_string(),
            bundle_path.to_string_lossy().to_string(),
            "--image".to_string(),
            reference_image.to_string_lossy().to_string(),
            "--audio".to_string(),
            audio_path.to_string_lossy().to_string(),
            "--output".to_string(),
            output_path.to_string_lossy().to_string(),
            "--fps".to_string(),
            options.fps.to_string(),
            "--resolution".to_string(),
            options.resolution.to_string(),
        ];
        if options.enhance {
            args.push("--enhance".to_string());
        }

        self.run(args, "render")
            .await
            .map_err(|e| match e {
                MediaError::AnimationFailed(msg) => MediaError::RenderFailed(msg),
                other => other,
            })?;

        if !output_path.exists() {
            return Err(MediaError::render_failed(format!(
                "sidecar reported success but wrote no file at {}",
                output_path.display()
            )));
        }
        Ok(output_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_render_options() {
        let opts = RenderOptions::default();
        assert!(!opts.enhance);
        assert_eq!(opts.fps, 25);
        assert_eq!(opts.resolution, 256);
    }

    #[tokio::test]
    async fn test_propose_rejects_missing_inputs() {
        let animator = SidecarAnimator::new("/nonexistent/animator");
        let err = animator
            .propose(Path::new("/nonexistent/a.wav"), Path::new("/nonexistent/i.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::AnimationFailed(_)));
    }
}
