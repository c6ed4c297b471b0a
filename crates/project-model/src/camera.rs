//! Camera path consumed by the export pipeline.

use std::path::Path;

use glidecast_common::clock::ms_to_secs;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use serde::{Deserialize, Serialize};

use crate::event::{MouseEventType, TimestampMs};
use crate::viewport::Viewport;

/// The virtual camera at one output frame.
///
/// Field names on the wire match the camera-path debug dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CameraFrame {
    /// Position in the source video.
    #[serde(rename = "Timestamp")]
    pub timestamp_ms: TimestampMs,

    /// Camera centre in source pixels.
    pub x: f64,
    pub y: f64,

    /// Magnification, always `> 0`.
    pub zoom: f64,

    /// Cursor position in output-frame pixels.
    pub mouse_x: f64,
    pub mouse_y: f64,

    /// Most recent mouse event at this frame.
    #[serde(default)]
    pub event_type: MouseEventType,
}

impl CameraFrame {
    /// Whether a button is held at this frame.
    pub fn is_pressed(&self) -> bool {
        self.event_type.is_press()
    }

    /// Seek position in seconds.
    pub fn timestamp_secs(&self) -> f64 {
        ms_to_secs(self.timestamp_ms)
    }

    /// Source region shown by this frame on a `screen_w x screen_h` output.
    pub fn viewport(&self, screen_w: u32, screen_h: u32) -> Viewport {
        Viewport::for_frame(screen_w, screen_h, self.x, self.y, self.zoom)
    }
}

/// An ordered, immutable sequence of camera frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraPath {
    frames: Vec<CameraFrame>,
}

impl CameraPath {
    pub fn new(frames: Vec<CameraFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[CameraFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Time between the first and last frame.
    pub fn duration_ms(&self) -> i64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ms - first.timestamp_ms,
            _ => 0,
        }
    }

    /// Check the ordering and zoom contracts every strategy relies on.
    pub fn validate(&self) -> GlidecastResult<()> {
        if self.frames.is_empty() {
            return Err(GlidecastError::planning("Camera path has no frames"));
        }

        for (idx, frame) in self.frames.iter().enumerate() {
            if frame.zoom <= 0.0 || !frame.zoom.is_finite() {
                return Err(GlidecastError::planning(format!(
                    "Frame {idx} has invalid zoom {}",
                    frame.zoom
                )));
            }
        }

        for (idx, pair) in self.frames.windows(2).enumerate() {
            if pair[1].timestamp_ms <= pair[0].timestamp_ms {
                return Err(GlidecastError::planning(format!(
                    "Frame {} at {}ms does not follow {}ms",
                    idx + 1,
                    pair[1].timestamp_ms,
                    pair[0].timestamp_ms
                )));
            }
        }

        Ok(())
    }

    /// Write the path as pretty JSON, for debugging.
    pub fn save_json(&self, path: &Path) -> GlidecastResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), frames = self.frames.len(), "Saved camera path");
        Ok(())
    }

    /// Read a path written by [`CameraPath::save_json`].
    pub fn load_json(path: &Path) -> GlidecastResult<Self> {
        if !path.exists() {
            return Err(GlidecastError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl From<Vec<CameraFrame>> for CameraPath {
    fn from(frames: Vec<CameraFrame>) -> Self {
        Self::new(frames)
    }
}
