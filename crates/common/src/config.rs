//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default export settings.
    pub export: ExportDefaults,

    /// Bounds on external operations that could otherwise hang.
    pub timeouts: TimeoutConfig,

    /// Retry policy for whole-strategy invocations.
    pub retry: RetryConfig,

    /// Progress estimation for strategies without a progress signal.
    pub progress: ProgressConfig,

    /// External encoder settings.
    pub encoder: EncoderConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Default output FPS.
    pub fps: u32,

    /// Whether the cursor glyph is composited by default.
    pub show_cursor: bool,

    /// Zoom the camera eases toward while a button is held.
    pub click_zoom: f64,

    /// Per-frame lerp factor for camera position.
    pub smooth_factor: f64,
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum wait for a decoded frame after a seek.
    pub seek_ms: u64,

    /// Maximum wait for the encoder process to accept input.
    pub encoder_start_ms: u64,

    /// Maximum wait for the encoder to flush after end-of-stream.
    pub encoder_finish_ms: u64,

    /// Grace period after closing stdin before the encoder is killed.
    pub stop_grace_ms: u64,
}

/// Retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,

    /// Delay before attempt `n + 1` is `base_delay_ms * n`.
    pub base_delay_ms: u64,
}

/// Progress estimator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub estimated_duration_ms: u64,
    pub poll_interval_ms: u64,
}

/// External encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Explicit ffmpeg binary. Looked up on `PATH` when unset.
    pub ffmpeg_path: Option<PathBuf>,

    /// Try a hardware H.264 encoder before falling back to libx264.
    pub prefer_hardware: bool,

    /// Upper bound on frames per segment in segmented GPU exports.
    pub segment_frames: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "glidecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            show_cursor: true,
            click_zoom: 1.5,
            smooth_factor: 0.15,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            seek_ms: 5_000,
            encoder_start_ms: 10_000,
            encoder_finish_ms: 30_000,
            stop_grace_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn seek(&self) -> Duration {
        Duration::from_millis(self.seek_ms)
    }

    pub fn encoder_start(&self) -> Duration {
        Duration::from_millis(self.encoder_start_ms)
    }

    pub fn encoder_finish(&self) -> Duration {
        Duration::from_millis(self.encoder_finish_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            estimated_duration_ms: 10_000,
            poll_interval_ms: 100,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            prefer_hardware: true,
            segment_frames: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("glidecast").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{ "retry": { "max_attempts": 5 }, "export": { "fps": 60 } }"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.export.fps, 60);
        assert!(config.export.show_cursor);
        assert_eq!(config.progress.estimated_duration_ms, 10_000);
        assert_eq!(config.encoder.segment_frames, 300);
    }

    #[test]
    fn test_load_from_missing_path_returns_defaults() {
        let path = std::env::temp_dir().join("glidecast_missing_config_dir/config.json");
        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.fps, 30);
        assert_eq!(config.timeouts.seek(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_invalid_json_returns_defaults() {
        let dir = std::env::temp_dir().join("glidecast_test_bad_config");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.retry.max_attempts, 3);

        std::fs::remove_dir_all(&dir).ok();
    }
}
