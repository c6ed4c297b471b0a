//! GPU dispatch strategy.
//!
//! Neither mode streams pixels through this process. Single-shot turns the
//! whole camera path into time-varying `zoompan` expressions for one encoder
//! invocation. Segmented mode splits the path where the camera changes
//! character and gives each segment a fixed crop, then joins the segments.

use std::path::{Path, PathBuf};

use glidecast_common::clock::frame_interval_ms;
use glidecast_common::error::GlidecastResult;
use glidecast_project_model::camera::CameraFrame;
use glidecast_project_model::viewport::Viewport;

use crate::encoder::{FrameEncoder, GpuExportJob};

/// Maximum breakpoints per piecewise expression. ffmpeg's expression
/// parser recurses per nested `if`, so very long paths are thinned first.
const MAX_EXPR_POINTS: usize = 240;

/// Minimum segment length before a discontinuity may open a new segment.
const MIN_SEGMENT_SECS: f64 = 0.5;

/// Consecutive-frame camera jump, as a fraction of the output width,
/// treated as a cut.
const JUMP_FRACTION: f64 = 0.2;

/// How a GPU export is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuMode {
    SingleShot,
    Segmented,
}

impl GpuMode {
    pub fn from_segmented(segmented: bool) -> Self {
        if segmented {
            Self::Segmented
        } else {
            Self::SingleShot
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleShot => "single-shot",
            Self::Segmented => "segmented",
        }
    }
}

/// Issue one GPU invocation in the given mode.
pub async fn dispatch(
    encoder: &dyn FrameEncoder,
    job: &GpuExportJob,
    mode: GpuMode,
) -> GlidecastResult<()> {
    tracing::info!(
        mode = mode.as_str(),
        encoder = encoder.name(),
        frames = job.path.len(),
        output = %job.output_path.display(),
        "Dispatching GPU export"
    );
    match mode {
        GpuMode::SingleShot => encoder.export_with_gpu(job).await,
        GpuMode::Segmented => encoder.export_with_gpu_segmented(job).await,
    }
}

/// Build the single-shot `zoompan` filter for a job.
///
/// Expressions are keyed on `it`, the input timestamp relative to the
/// seek point, so they line up with `-ss start_secs` on the input.
pub fn build_zoompan_filter(job: &GpuExportJob) -> String {
    let start_secs = job.start_secs();
    let points: Vec<(f64, (f64, f64, f64))> = job
        .path
        .frames()
        .iter()
        .map(|f| (f.timestamp_secs() - start_secs, (f.zoom.max(1.0), f.x, f.y)))
        .collect();
    let points = downsample_timed_points(points, MAX_EXPR_POINTS);

    let zoom = build_piecewise_expr(points.iter().map(|(t, v)| (*t, v.0)).collect(), "it");
    let cx = build_piecewise_expr(points.iter().map(|(t, v)| (*t, v.1)).collect(), "it");
    let cy = build_piecewise_expr(points.iter().map(|(t, v)| (*t, v.2)).collect(), "it");

    format!(
        "zoompan=z='{zoom}':x='({cx})-iw/zoom/2':y='({cy})-ih/zoom/2':d=1:s={w}x{h}:fps={fps},format=yuv420p",
        w = job.width,
        h = job.height,
        fps = job.fps,
    )
}

/// Nested `if(lt(var,t1),lerp,tail)` expression through `points`.
pub fn build_piecewise_expr(mut points: Vec<(f64, f64)>, var: &str) -> String {
    if points.is_empty() {
        return "0".to_string();
    }

    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut sanitized: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for (t, v) in points {
        if let Some((last_t, last_v)) = sanitized.last_mut() {
            if (t - *last_t).abs() < 1e-4 {
                *last_t = t;
                *last_v = v;
                continue;
            }
        }
        sanitized.push((t, v));
    }

    let Some(&(_, last_v)) = sanitized.last() else {
        return "0".to_string();
    };
    let mut expr = format!("{last_v:.6}");
    for pair in sanitized.windows(2).rev() {
        let (t0, v0) = pair[0];
        let (t1, v1) = pair[1];
        let interp = format!(
            "{v0:.6}+({delta:.6})*({var}-{t0:.6})/{dur:.6}",
            delta = v1 - v0,
            dur = (t1 - t0).max(1e-4)
        );
        expr = format!("if(lt({var},{t1:.6}),{interp},{expr})");
    }

    expr
}

/// Evenly thin `points` to at most `max_points`, keeping both endpoints.
fn downsample_timed_points<T: Clone>(points: Vec<(f64, T)>, max_points: usize) -> Vec<(f64, T)> {
    if points.len() <= max_points {
        return points;
    }

    let target = max_points.max(2);
    let last_idx = points.len() - 1;
    (0..target)
        .map(|i| {
            let idx = ((i as f64 / (target - 1) as f64) * last_idx as f64).round() as usize;
            points[idx].clone()
        })
        .collect()
}

/// One independently encoded piece of a segmented export.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,

    /// Frame range `[start_frame, end_frame)` in the camera path.
    pub start_frame: usize,
    pub end_frame: usize,

    /// Seek offset into the source video.
    pub start_ms: i64,

    /// Source time covered, up to the next segment's first frame.
    pub duration_ms: i64,

    /// Fixed crop for the whole segment, inside the source bounds.
    pub crop: Viewport,
}

impl Segment {
    pub fn frame_count(&self) -> usize {
        self.end_frame - self.start_frame
    }

    /// `crop=w:h:x:y,scale=W:H` for this segment.
    pub fn filter(&self, out_w: u32, out_h: u32) -> String {
        format!(
            "crop={}:{}:{}:{},scale={out_w}:{out_h},format=yuv420p",
            even(self.crop.w),
            even(self.crop.h),
            self.crop.x.round() as i64,
            self.crop.y.round() as i64,
        )
    }

    pub fn file_name(&self) -> String {
        format!("segment_{:04}.mp4", self.index)
    }
}

fn even(v: f64) -> i64 {
    ((v.floor() as i64) / 2 * 2).max(2)
}

/// Partition `frames` into segments of at most `max_frames`, also cutting
/// where the press state flips or the camera jumps.
pub fn plan_segments(
    frames: &[CameraFrame],
    screen_w: u32,
    screen_h: u32,
    fps: u32,
    max_frames: usize,
) -> Vec<Segment> {
    if frames.is_empty() {
        return Vec::new();
    }
    let max_frames = max_frames.max(1);
    let min_frames = ((fps.max(1) as f64 * MIN_SEGMENT_SECS).ceil() as usize).clamp(1, max_frames);
    let jump_px = screen_w as f64 * JUMP_FRACTION;

    let mut bounds = vec![0usize];
    let mut seg_start = 0usize;
    for i in 1..frames.len() {
        let len = i - seg_start;
        let prev = &frames[i - 1];
        let cur = &frames[i];

        let discontinuity = prev.is_pressed() != cur.is_pressed()
            || (cur.x - prev.x).hypot(cur.y - prev.y) > jump_px;

        if len >= max_frames || (discontinuity && len >= min_frames) {
            bounds.push(i);
            seg_start = i;
        }
    }
    bounds.push(frames.len());

    let frame_ms = frame_interval_ms(fps).round() as i64;
    bounds
        .windows(2)
        .enumerate()
        .map(|(index, w)| {
            let (start, end) = (w[0], w[1]);
            let slice = &frames[start..end];
            let start_ms = slice[0].timestamp_ms;
            let end_ms = frames
                .get(end)
                .map(|f| f.timestamp_ms)
                .unwrap_or_else(|| slice[slice.len() - 1].timestamp_ms + frame_ms);

            Segment {
                index,
                start_frame: start,
                end_frame: end,
                start_ms,
                duration_ms: (end_ms - start_ms).max(frame_ms),
                crop: average_viewport(slice, screen_w, screen_h),
            }
        })
        .collect()
}

fn average_viewport(frames: &[CameraFrame], screen_w: u32, screen_h: u32) -> Viewport {
    let n = frames.len().max(1) as f64;
    let (zoom, x, y) = frames.iter().fold((0.0, 0.0, 0.0), |acc, f| {
        (acc.0 + f.zoom, acc.1 + f.x, acc.2 + f.y)
    });
    Viewport::for_frame(screen_w, screen_h, x / n, y / n, zoom / n)
        .clamped_to(screen_w as f64, screen_h as f64)
}

/// Concat demuxer list for `segments`.
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", escape_concat_path(p)))
        .collect()
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}
