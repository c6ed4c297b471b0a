//! Glidecast Render Engine
//!
//! Turns a screen recording and its planned camera path into an exported
//! video, either by rendering every frame here or by handing the whole
//! path to the encoder.
//!
//! # Pipeline Architecture
//!
//! ```text
//!                       ExportOrchestrator
//!                              │
//!             prepare (retry) ─┤
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼ software                              ▼ gpu (retry)
//!   FrameRenderer ── seek, crop/scale,        gpu::dispatch
//!          │         cursor                   ├── single-shot: zoompan
//!          ▼                                  └── segmented: crop per
//!   StreamingFramePipe                            segment + concat
//!          │  one frame in flight                  │
//!          ▼                                       ▼
//!                     FrameEncoder (ffmpeg)
//!                              │
//!                              ▼
//!                          output.mp4
//! ```
//!
//! Progress flows back through a monotonic reporter; GPU paths use
//! ffmpeg's own progress or [`progress::ProgressEstimator`].

pub mod encoder;
pub mod ffmpeg;
pub mod gpu;
pub mod orchestrator;
pub mod pipe;
pub mod progress;
pub mod renderer;
pub mod retry;
pub mod session;

pub use encoder::{FrameEncoder, FrameFormat, GpuExportJob, StreamSpec};
pub use ffmpeg::FfmpegEncoder;
pub use gpu::GpuMode;
pub use orchestrator::{ExportOrchestrator, ExportSettings};
pub use pipe::StreamingFramePipe;
pub use progress::{ExportProgress, ProgressEstimator};
pub use renderer::{FfmpegVideoLoader, FrameRenderer, VideoLoader, VideoSource};
pub use retry::{with_retry, RetryPolicy};
pub use session::{CancelSignal, ExportSession, ExportState, Strategy};
