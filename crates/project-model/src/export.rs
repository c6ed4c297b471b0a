//! Export configuration, preparation info, and results.

use std::path::PathBuf;

use glidecast_common::clock::ms_to_secs;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use serde::{Deserialize, Serialize};

/// Export configuration.
///
/// Paths are opaque to the pipeline; they are handed to the planner and the
/// external encoder unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Source screen recording.
    pub video_path: PathBuf,

    /// Mouse event log recorded alongside the video.
    pub mouse_data_path: PathBuf,

    /// Output video file.
    pub output_path: PathBuf,

    /// Output raster dimensions in pixels.
    pub screen_width: u32,
    pub screen_height: u32,

    /// Output frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Composite the cursor glyph (software path only).
    #[serde(default = "default_show_cursor")]
    pub show_cursor: bool,

    /// Dispatch the GPU path as independent segments.
    #[serde(default)]
    pub segmented: bool,
}

fn default_fps() -> u32 {
    30
}

fn default_show_cursor() -> bool {
    true
}

impl ExportConfig {
    /// Create a config with default fps, cursor, and dispatch mode.
    pub fn new(
        video_path: impl Into<PathBuf>,
        mouse_data_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        screen_width: u32,
        screen_height: u32,
    ) -> Self {
        Self {
            video_path: video_path.into(),
            mouse_data_path: mouse_data_path.into(),
            output_path: output_path.into(),
            screen_width,
            screen_height,
            fps: default_fps(),
            show_cursor: default_show_cursor(),
            segmented: false,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_cursor(mut self, show_cursor: bool) -> Self {
        self.show_cursor = show_cursor;
        self
    }

    pub fn with_segmented(mut self, segmented: bool) -> Self {
        self.segmented = segmented;
        self
    }

    /// Reject dimensions or rates the encoder cannot use.
    pub fn validate(&self) -> GlidecastResult<()> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(GlidecastError::config(format!(
                "Output dimensions must be positive, got {}x{}",
                self.screen_width, self.screen_height
            )));
        }
        if self.fps == 0 {
            return Err(GlidecastError::config("Frame rate must be positive"));
        }
        Ok(())
    }
}

/// Summary returned by export preparation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub mouse_event_count: usize,
    pub camera_frame_count: usize,
    pub fps: u32,

    /// Time spanned by the camera path, in milliseconds.
    pub duration_ms: i64,

    /// `duration * fps`, the frame count an encoder would expect.
    pub estimated_frames: u64,
}

impl ExportInfo {
    pub fn duration_secs(&self) -> f64 {
        ms_to_secs(self.duration_ms)
    }
}

/// Outcome of a completed export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    pub output_path: PathBuf,

    /// Frames written through the streaming pipe. `None` for GPU exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
}
