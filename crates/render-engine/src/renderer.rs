//! Software frame renderer.
//!
//! For each camera frame: seek the source video, crop the camera viewport
//! out of it, scale that to the output raster, draw the cursor, and
//! serialize the result for the encoder.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use glidecast_common::config::EncoderConfig;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use glidecast_project_model::camera::CameraFrame;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_polygon_mut, draw_polygon_mut, Blend};
use imageproc::point::Point;
use tokio::process::Command;

use crate::encoder::FrameFormat;

/// Radius of the pressed-button highlight, in output pixels.
pub const HIGHLIGHT_RADIUS: i32 = 30;

/// Translucent red under a pressed cursor.
pub const HIGHLIGHT_COLOR: Rgba<u8> = Rgba([255, 0, 0, 77]);

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const ARROW_FILL: Rgba<u8> = Rgba([255, 255, 255, 255]);
const ARROW_OUTLINE: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Arrow glyph relative to its tip.
const ARROW: [(i32, i32); 7] = [(0, 0), (0, 18), (5, 13), (9, 21), (12, 20), (8, 12), (14, 12)];

/// A decoded video that can produce the frame at any timestamp.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Native frame size in pixels.
    fn dimensions(&self) -> (u32, u32);

    /// Seek to `seconds` and decode the frame shown there.
    async fn frame_at(&self, seconds: f64) -> GlidecastResult<RgbaImage>;
}

/// Opens video files as [`VideoSource`]s.
#[async_trait]
pub trait VideoLoader: Send + Sync {
    async fn open(&self, path: &Path) -> GlidecastResult<Box<dyn VideoSource>>;
}

/// Loads videos through `ffprobe` and decodes frames with `ffmpeg`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegVideoLoader {
    ffmpeg_path: Option<PathBuf>,
}

impl FfmpegVideoLoader {
    pub fn new(config: &EncoderConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
        }
    }

    pub fn ffmpeg(&self) -> Option<PathBuf> {
        match &self.ffmpeg_path {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => which::which(path).ok(),
            None => which::which("ffmpeg").ok(),
        }
    }

    /// `ffprobe` next to the configured ffmpeg, else on `PATH`.
    pub fn ffprobe(&self) -> Option<PathBuf> {
        self.ffmpeg()
            .and_then(|ffmpeg| ffmpeg.parent().map(|dir| dir.join("ffprobe")))
            .filter(|candidate| candidate.is_file())
            .or_else(|| which::which("ffprobe").ok())
    }
}

#[async_trait]
impl VideoLoader for FfmpegVideoLoader {
    async fn open(&self, path: &Path) -> GlidecastResult<Box<dyn VideoSource>> {
        if !path.exists() {
            return Err(GlidecastError::video_load(format!(
                "Video not found: {}",
                path.display()
            )));
        }
        let ffmpeg = self
            .ffmpeg()
            .ok_or_else(|| GlidecastError::video_load("ffmpeg not found for frame decoding"))?;
        let ffprobe = self
            .ffprobe()
            .ok_or_else(|| GlidecastError::video_load("ffprobe not found for video probing"))?;

        let (width, height) = probe_video_dimensions(&ffprobe, path).await.ok_or_else(|| {
            GlidecastError::video_load(format!("Could not read video size of {}", path.display()))
        })?;

        tracing::info!(path = %path.display(), width, height, "Video source opened");
        Ok(Box::new(FfmpegVideoSource {
            ffmpeg,
            path: path.to_path_buf(),
            width,
            height,
        }))
    }
}

async fn probe_video_dimensions(ffprobe: &Path, path: &Path) -> Option<(u32, u32)> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `WIDTHxHEIGHT` from ffprobe's csv output.
fn parse_dimensions(raw: &str) -> Option<(u32, u32)> {
    let line = raw.lines().next()?.trim();
    let (w, h) = line.split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

struct FfmpegVideoSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    width: u32,
    height: u32,
}

#[async_trait]
impl VideoSource for FfmpegVideoSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn frame_at(&self, seconds: f64) -> GlidecastResult<RgbaImage> {
        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", seconds.max(0.0)))
            .arg("-i")
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GlidecastError::video_load(format!("Failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(GlidecastError::video_load(format!(
                "Frame decode at {seconds:.3}s failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        RgbaImage::from_raw(self.width, self.height, output.stdout).ok_or_else(|| {
            GlidecastError::video_load(format!("Short frame at {seconds:.3}s"))
        })
    }
}

/// Renders camera frames into encoder-ready bytes.
///
/// Owns the video source and the canvas for one export. Call
/// [`FrameRenderer::dispose`] when the export ends, however it ends.
pub struct FrameRenderer {
    source: Option<Box<dyn VideoSource>>,
    canvas: RgbaImage,
    format: FrameFormat,
    seek_timeout: Duration,
}

impl FrameRenderer {
    pub fn new(
        source: Box<dyn VideoSource>,
        width: u32,
        height: u32,
        format: FrameFormat,
        seek_timeout: Duration,
    ) -> Self {
        Self {
            source: Some(source),
            canvas: RgbaImage::from_pixel(width, height, BACKGROUND),
            format,
            seek_timeout,
        }
    }

    /// Open `video_path` and allocate a `width x height` canvas.
    pub async fn open(
        loader: &dyn VideoLoader,
        video_path: &Path,
        width: u32,
        height: u32,
        format: FrameFormat,
        seek_timeout: Duration,
    ) -> GlidecastResult<Self> {
        let source = loader.open(video_path).await?;
        Ok(Self::new(source, width, height, format, seek_timeout))
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn is_disposed(&self) -> bool {
        self.source.is_none()
    }

    /// Release the video source and the canvas.
    pub fn dispose(&mut self) {
        if self.source.take().is_some() {
            self.canvas = RgbaImage::new(0, 0);
            tracing::debug!("Frame renderer disposed");
        }
    }

    /// Render one frame and serialize it.
    pub async fn render_frame(
        &mut self,
        frame: &CameraFrame,
        screen_width: u32,
        screen_height: u32,
        show_cursor: bool,
    ) -> GlidecastResult<Vec<u8>> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| GlidecastError::video_load("Renderer already disposed"))?;

        let image = tokio::time::timeout(self.seek_timeout, source.frame_at(frame.timestamp_secs()))
            .await
            .map_err(|_| {
                GlidecastError::seek_timeout(frame.timestamp_ms, self.seek_timeout.as_millis() as u64)
            })??;

        if self.canvas.dimensions() != (screen_width, screen_height) {
            self.canvas = RgbaImage::from_pixel(screen_width, screen_height, BACKGROUND);
        }
        composite(&mut self.canvas, &image, frame, screen_width, screen_height);
        if show_cursor {
            draw_cursor(&mut self.canvas, frame);
        }
        self.encode()
    }

    fn encode(&self) -> GlidecastResult<Vec<u8>> {
        match self.format {
            FrameFormat::RawRgba => Ok(self.canvas.as_raw().clone()),
            FrameFormat::Png => {
                let mut bytes = Cursor::new(Vec::new());
                self.canvas
                    .write_to(&mut bytes, ImageFormat::Png)
                    .map_err(|e| anyhow::anyhow!("Failed to encode frame as PNG: {e}"))?;
                Ok(bytes.into_inner())
            }
        }
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Draw the part of `source` inside the frame's viewport over the whole canvas.
///
/// The source is treated as stretched to `screen_w x screen_h`; regions of
/// the viewport outside the screen stay black.
fn composite(
    canvas: &mut RgbaImage,
    source: &RgbaImage,
    frame: &CameraFrame,
    screen_w: u32,
    screen_h: u32,
) {
    for pixel in canvas.pixels_mut() {
        *pixel = BACKGROUND;
    }

    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 || screen_w == 0 || screen_h == 0 {
        return;
    }

    let vp = frame.viewport(screen_w, screen_h);
    let left = vp.x.max(0.0);
    let top = vp.y.max(0.0);
    let right = vp.right().min(screen_w as f64);
    let bottom = vp.bottom().min(screen_h as f64);
    if right <= left || bottom <= top {
        return;
    }

    // screen -> source pixels, screen -> output pixels
    let (sx, sy) = (src_w as f64 / screen_w as f64, src_h as f64 / screen_h as f64);
    let (ox, oy) = (screen_w as f64 / vp.w, screen_h as f64 / vp.h);

    let crop_x = ((left * sx).floor() as u32).min(src_w - 1);
    let crop_y = ((top * sy).floor() as u32).min(src_h - 1);
    let crop_w = (((right - left) * sx).round() as u32).clamp(1, src_w - crop_x);
    let crop_h = (((bottom - top) * sy).round() as u32).clamp(1, src_h - crop_y);

    let out_x = ((left - vp.x) * ox).round() as i64;
    let out_y = ((top - vp.y) * oy).round() as i64;
    let out_w = (((right - left) * ox).round() as u32).max(1);
    let out_h = (((bottom - top) * oy).round() as u32).max(1);

    let region = imageops::crop_imm(source, crop_x, crop_y, crop_w, crop_h).to_image();
    let scaled = if region.dimensions() == (out_w, out_h) {
        region
    } else {
        imageops::resize(&region, out_w, out_h, FilterType::Triangle)
    };
    imageops::overlay(canvas, &scaled, out_x, out_y);
}

/// Arrow at the cursor, over a highlight disc while a button is held.
fn draw_cursor(canvas: &mut RgbaImage, frame: &CameraFrame) {
    let x = frame.mouse_x.round() as i32;
    let y = frame.mouse_y.round() as i32;

    if frame.is_pressed() {
        let mut blend = Blend(std::mem::take(canvas));
        draw_filled_circle_mut(&mut blend, (x, y), HIGHLIGHT_RADIUS, HIGHLIGHT_COLOR);
        *canvas = blend.0;
    }

    let fill: Vec<Point<i32>> = ARROW.iter().map(|(dx, dy)| Point::new(x + dx, y + dy)).collect();
    draw_polygon_mut(canvas, &fill, ARROW_FILL);
    let outline: Vec<Point<f32>> = fill
        .iter()
        .map(|p| Point::new(p.x as f32, p.y as f32))
        .collect();
    draw_hollow_polygon_mut(canvas, &outline, ARROW_OUTLINE);
}
