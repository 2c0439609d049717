//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Environment-derived pipeline configuration. Everything affecting output
/// is explicit here; there are no hidden flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// LLM API key; absent keys fail at first use, not at startup.
    pub llm_api_key: Option<String>,
    /// LLM model identifier.
    pub llm_model: String,
    /// Directory holding persona reference audio and portraits.
    pub assets_dir: PathBuf,
    /// Root directory for per-request artifact sets.
    pub output_dir: PathBuf,
    /// TTS sidecar command.
    pub tts_command: PathBuf,
    /// Face-animation sidecar command.
    pub animator_command: PathBuf,
    /// Video frame rate.
    pub fps: u32,
    /// Output resolution (square).
    pub resolution: u32,
    /// Synthesis language code.
    pub language: String,
    /// Style preset used when neither caller nor persona picks one.
    pub default_style: String,
    /// Timeout applied to each external-model stage.
    pub stage_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_model: "gemini-2.0-flash".to_string(),
            assets_dir: PathBuf::from("assets"),
            output_dir: PathBuf::from("outputs"),
            tts_command: PathBuf::from("lumen-tts"),
            animator_command: PathBuf::from("lumen-animator"),
            fps: 25,
            resolution: 256,
            language: "en".to_string(),
            default_style: "calm_tech".to_string(),
            stage_timeout: Duration::from_secs(900),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_api_key: std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_model: std::env::var("GEMINI_MODEL").unwrap_or(defaults.llm_model),
            assets_dir: std::env::var("LUMEN_ASSETS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.assets_dir),
            output_dir: std::env::var("LUMEN_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            tts_command: std::env::var("LUMEN_TTS_SIDECAR")
                .map(PathBuf::from)
                .unwrap_or(defaults.tts_command),
            animator_command: std::env::var("LUMEN_ANIMATOR_SIDECAR")
                .map(PathBuf::from)
                .unwrap_or(defaults.animator_command),
            fps: std::env::var("LUMEN_VIDEO_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fps),
            resolution: std::env::var("LUMEN_VIDEO_RESOLUTION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.resolution),
            language: std::env::var("LUMEN_TTS_LANGUAGE").unwrap_or(defaults.language),
            default_style: std::env::var("LUMEN_DEFAULT_STYLE").unwrap_or(defaults.default_style),
            stage_timeout: Duration::from_secs(
                std::env::var("LUMEN_STAGE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.fps, 25);
        assert_eq!(config.resolution, 256);
        assert_eq!(config.default_style, "calm_tech");
        assert_eq!(config.language, "en");
        assert!(config.llm_api_key.is_none());
    }
}
