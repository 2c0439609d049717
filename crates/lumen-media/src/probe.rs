//! Video probing and frame extraction via ffprobe/ffmpeg.
//!
//! The reference-style extractor only needs frame dimensions and per-frame
//! pixel data, so frames cross the boundary as raw grayscale buffers piped
//! out of ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Basic stream metadata for a decodable video.
#[derive(Debug, Clone, Copy)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Check if ffmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if ffprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

/// Probe a video's dimensions, frame rate, and duration.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,duration",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| MediaError::probe_failed(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::probe_failed(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| MediaError::probe_failed(format!("bad ffprobe output: {}", e)))?;

    let stream = parsed
        .streams
        .first()
        .ok_or_else(|| MediaError::probe_failed("no video stream".to_string()))?;

    let width = stream
        .width
        .ok_or_else(|| MediaError::probe_failed("missing width".to_string()))?;
    let height = stream
        .height
        .ok_or_else(|| MediaError::probe_failed("missing height".to_string()))?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(25.0);

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .ok_or_else(|| MediaError::probe_failed("missing duration".to_string()))?;

    Ok(VideoInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// Parse ffprobe's `num/den` frame-rate notation.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

/// A raw grayscale frame.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GrayFrame {
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Extract every `step`-th frame as grayscale at the source resolution.
pub async fn extract_gray_frames(
    path: impl AsRef<Path>,
    info: &VideoInfo,
    step: u32,
) -> MediaResult<Vec<GrayFrame>> {
    let path = path.as_ref();
    check_ffmpeg()?;

    let step = step.max(1);
    let filter = format!("select='not(mod(n\\,{}))',format=gray", step);

    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vf",
            &filter,
            "-vsync",
            "vfr",
            "-f",
            "rawvideo",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MediaError::probe_failed(format!("failed to spawn ffmpeg: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::probe_failed("ffmpeg stdout not captured".to_string()))?;

    let mut raw = Vec::new();
    stdout
        .read_to_end(&mut raw)
        .await
        .map_err(|e| MediaError::probe_failed(format!("ffmpeg read failed: {}", e)))?;

    let status = child
        .wait()
        .await
        .map_err(|e| MediaError::probe_failed(format!("ffmpeg wait failed: {}", e)))?;
    if !status.success() {
        return Err(MediaError::probe_failed(format!(
            "ffmpeg frame extraction exited with {:?}",
            status.code()
        )));
    }

    let frame_bytes = (info.width * info.height) as usize;
    if frame_bytes == 0 {
        return Err(MediaError::probe_failed("zero-sized frames".to_string()));
    }

    let frames: Vec<GrayFrame> = raw
        .chunks_exact(frame_bytes)
        .map(|chunk| GrayFrame {
            width: info.width,
            height: info.height,
            data: chunk.to_vec(),
        })
        .collect();

    debug!(
        frames = frames.len(),
        step = step,
        "Extracted grayscale frames"
    );
    Ok(frames)
}
