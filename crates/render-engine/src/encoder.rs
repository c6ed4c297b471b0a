//! External encoder contract.
//!
//! The export pipeline talks to the encoder process only through
//! [`FrameEncoder`]. The ffmpeg-backed implementation lives in
//! [`crate::ffmpeg`]; tests substitute in-process doubles.

use std::path::PathBuf;

use async_trait::async_trait;
use glidecast_common::error::GlidecastResult;
use glidecast_project_model::camera::CameraPath;

/// Encoding of one rendered frame on the wire to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// Tightly packed 8-bit RGBA, `width * height * 4` bytes.
    #[default]
    RawRgba,
    /// One PNG image per frame.
    Png,
}

/// Parameters for a sequential frame stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSpec {
    pub output_path: PathBuf,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

/// A whole-path export handed to the encoder in one piece.
#[derive(Debug, Clone)]
pub struct GpuExportJob {
    pub video_path: PathBuf,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub path: CameraPath,

    /// Upper bound on frames per segment in segmented mode.
    pub max_segment_frames: usize,
}

impl GpuExportJob {
    /// Output duration in seconds, including the last frame's display time.
    pub fn duration_secs(&self) -> f64 {
        let frame_secs = 1.0 / self.fps.max(1) as f64;
        self.path.duration_ms().max(0) as f64 / 1000.0 + frame_secs
    }

    /// Seek offset of the first frame in the source video.
    pub fn start_secs(&self) -> f64 {
        self.path
            .frames()
            .first()
            .map(|f| f.timestamp_secs())
            .unwrap_or(0.0)
    }
}

/// An external encoder process.
///
/// All methods take `&self` so a stop signal can be delivered while a
/// write or a GPU invocation is still pending.
#[async_trait]
pub trait FrameEncoder: Send + Sync {
    /// Check if the encoder can be used on this system.
    async fn is_available(&self) -> bool;

    /// Open a sequential frame stream.
    async fn start(&self, spec: &StreamSpec) -> GlidecastResult<()>;

    /// Send one encoded frame. Resolves once the encoder has accepted it.
    async fn write_frame(&self, frame: &[u8]) -> GlidecastResult<()>;

    /// Signal end-of-stream and wait for the output to be flushed.
    async fn finish(&self) -> GlidecastResult<()>;

    /// Tear down an open stream immediately.
    async fn stop(&self) -> GlidecastResult<()>;

    /// Render the whole camera path as one filter-graph invocation.
    async fn export_with_gpu(&self, job: &GpuExportJob) -> GlidecastResult<()>;

    /// Render the camera path as independent segments, then join them.
    async fn export_with_gpu_segmented(&self, job: &GpuExportJob) -> GlidecastResult<()>;

    /// Ask a running GPU invocation to stop.
    async fn stop_gpu_export(&self) -> GlidecastResult<()>;

    /// Progress of the running GPU invocation in `[0, 100]`, when known.
    fn gpu_export_progress(&self) -> Option<f64>;

    /// Encoder name for logs.
    fn name(&self) -> &str;
}
