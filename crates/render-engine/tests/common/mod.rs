//! In-process collaborators for export pipeline tests.
//!
//! Every mock appends to one shared [`Log`] so tests can assert the exact
//! interleaving of seeks, writes and encoder control calls.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use glidecast_processing_core::planner::{export_info, CameraPathPlanner};
use glidecast_project_model::camera::{CameraFrame, CameraPath};
use glidecast_project_model::event::MouseEventType;
use glidecast_project_model::export::{ExportConfig, ExportInfo};
use glidecast_render_engine::encoder::{FrameEncoder, GpuExportJob, StreamSpec};
use glidecast_render_engine::orchestrator::{ExportOrchestrator, ExportSettings};
use glidecast_render_engine::progress::ExportProgress;
use glidecast_render_engine::renderer::{VideoLoader, VideoSource};
use image::{Rgba, RgbaImage};
use tokio::sync::watch;

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 36;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Prepare,
    OpenVideo,
    Seek(i64),
    SourceDropped,
    Start,
    Write(usize),
    Finish,
    Stop,
    Gpu(&'static str),
    StopGpu,
}

#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    pub fn writes(&self) -> usize {
        self.count(|e| matches!(e, Event::Write(_)))
    }

    pub fn gpu_calls(&self) -> usize {
        self.count(|e| matches!(e, Event::Gpu(_)))
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Seek(ts) => Some(ts),
                _ => None,
            })
            .collect()
    }
}

/// Scripted encoder behaviour.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub available: bool,
    /// GPU invocations that fail before one succeeds.
    pub gpu_failures: u32,
    pub gpu_duration: Duration,
    pub gpu_progress: Option<f64>,
    pub start_delay: Duration,
    pub write_delay: Duration,
    pub finish_delay: Duration,
    pub fail_stop: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            available: true,
            gpu_failures: 0,
            gpu_duration: Duration::ZERO,
            gpu_progress: None,
            start_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
            finish_delay: Duration::ZERO,
            fail_stop: false,
        }
    }
}

pub struct MockEncoder {
    log: Log,
    behavior: Behavior,
    gpu_failures_left: AtomicU32,
    gpu_stop: watch::Sender<bool>,
}

impl MockEncoder {
    pub fn new(log: Log, behavior: Behavior) -> Self {
        let (gpu_stop, _) = watch::channel(false);
        Self {
            log,
            gpu_failures_left: AtomicU32::new(behavior.gpu_failures),
            behavior,
            gpu_stop,
        }
    }

    async fn run_gpu(&self, label: &'static str) -> GlidecastResult<()> {
        self.log.push(Event::Gpu(label));
        self.gpu_stop.send_replace(false);

        let left = self.gpu_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.gpu_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(GlidecastError::gpu_export("ffmpeg exited with status 1"));
        }

        let mut stop = self.gpu_stop.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.behavior.gpu_duration) => Ok(()),
            _ = stop.wait_for(|s| *s) => Err(GlidecastError::Cancelled),
        }
    }
}

#[async_trait]
impl FrameEncoder for MockEncoder {
    async fn is_available(&self) -> bool {
        self.behavior.available
    }

    async fn start(&self, _spec: &StreamSpec) -> GlidecastResult<()> {
        tokio::time::sleep(self.behavior.start_delay).await;
        self.log.push(Event::Start);
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> GlidecastResult<()> {
        tokio::time::sleep(self.behavior.write_delay).await;
        self.log.push(Event::Write(frame.len()));
        Ok(())
    }

    async fn finish(&self) -> GlidecastResult<()> {
        tokio::time::sleep(self.behavior.finish_delay).await;
        self.log.push(Event::Finish);
        Ok(())
    }

    async fn stop(&self) -> GlidecastResult<()> {
        self.log.push(Event::Stop);
        if self.behavior.fail_stop {
            return Err(GlidecastError::encoder_finish("stop failed"));
        }
        Ok(())
    }

    async fn export_with_gpu(&self, _job: &GpuExportJob) -> GlidecastResult<()> {
        self.run_gpu("single-shot").await
    }

    async fn export_with_gpu_segmented(&self, _job: &GpuExportJob) -> GlidecastResult<()> {
        self.run_gpu("segmented").await
    }

    async fn stop_gpu_export(&self) -> GlidecastResult<()> {
        self.log.push(Event::StopGpu);
        self.gpu_stop.send_replace(true);
        Ok(())
    }

    fn gpu_export_progress(&self) -> Option<f64> {
        self.behavior.gpu_progress
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockPlanner {
    log: Log,
    frames: Vec<CameraFrame>,
    failures_left: AtomicU32,
    prepare_delay: Duration,
}

impl MockPlanner {
    pub fn new(log: Log, frames: Vec<CameraFrame>) -> Self {
        Self::failing(log, frames, 0)
    }

    /// Planner whose first `failures` calls are rejected.
    pub fn failing(log: Log, frames: Vec<CameraFrame>, failures: u32) -> Self {
        Self {
            log,
            frames,
            failures_left: AtomicU32::new(failures),
            prepare_delay: Duration::ZERO,
        }
    }

    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = delay;
        self
    }
}

#[async_trait]
impl CameraPathPlanner for MockPlanner {
    async fn prepare(&self, config: &ExportConfig) -> GlidecastResult<ExportInfo> {
        self.log.push(Event::Prepare);
        tokio::time::sleep(self.prepare_delay).await;
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(GlidecastError::planning("mouse data unreadable"));
        }
        Ok(export_info(
            self.frames.len(),
            &CameraPath::new(self.frames.clone()),
            config.fps,
        ))
    }

    fn camera_frames(&self) -> CameraPath {
        CameraPath::new(self.frames.clone())
    }

    async fn save_camera_path(&self, path: &Path) -> GlidecastResult<()> {
        self.camera_frames().save_json(path)
    }
}

pub struct MockLoader {
    log: Log,
    stall: bool,
}

impl MockLoader {
    pub fn new(log: Log) -> Self {
        Self { log, stall: false }
    }

    /// Loader whose sources never finish seeking.
    pub fn stalled(log: Log) -> Self {
        Self { log, stall: true }
    }
}

#[async_trait]
impl VideoLoader for MockLoader {
    async fn open(&self, _path: &Path) -> GlidecastResult<Box<dyn VideoSource>> {
        self.log.push(Event::OpenVideo);
        Ok(Box::new(MockSource {
            log: self.log.clone(),
            stall: self.stall,
        }))
    }
}

struct MockSource {
    log: Log,
    stall: bool,
}

#[async_trait]
impl VideoSource for MockSource {
    fn dimensions(&self) -> (u32, u32) {
        (WIDTH * 2, HEIGHT * 2)
    }

    async fn frame_at(&self, seconds: f64) -> GlidecastResult<RgbaImage> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.log.push(Event::Seek((seconds * 1000.0).round() as i64));
        Ok(RgbaImage::from_pixel(WIDTH * 2, HEIGHT * 2, Rgba([40, 80, 120, 255])))
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.log.push(Event::SourceDropped);
    }
}

/// `n` frames at 30 fps, pressing the button halfway.
pub fn frames(n: usize) -> Vec<CameraFrame> {
    (0..n)
        .map(|i| CameraFrame {
            timestamp_ms: (i as f64 * 1000.0 / 30.0).round() as i64,
            x: WIDTH as f64 / 2.0,
            y: HEIGHT as f64 / 2.0,
            zoom: 1.0 + i as f64 * 0.01,
            mouse_x: 10.0,
            mouse_y: 10.0,
            event_type: if i >= n / 2 {
                MouseEventType::LeftDown
            } else {
                MouseEventType::Move
            },
        })
        .collect()
}

pub fn export_config() -> ExportConfig {
    ExportConfig::new("rec.mp4", "rec.json", "out/export.mp4", WIDTH, HEIGHT)
}

pub fn orchestrator(
    log: &Log,
    planner: MockPlanner,
    behavior: Behavior,
    loader: MockLoader,
) -> ExportOrchestrator {
    orchestrator_with_settings(log, planner, behavior, loader, ExportSettings::default())
}

pub fn orchestrator_with_settings(
    log: &Log,
    planner: MockPlanner,
    behavior: Behavior,
    loader: MockLoader,
    settings: ExportSettings,
) -> ExportOrchestrator {
    ExportOrchestrator::new(
        Arc::new(planner),
        Arc::new(MockEncoder::new(log.clone(), behavior)),
        Arc::new(loader),
        settings,
    )
}

/// Orchestrator over `n` frames with default behaviour.
pub fn simple(log: &Log, n: usize, behavior: Behavior) -> ExportOrchestrator {
    orchestrator(
        log,
        MockPlanner::new(log.clone(), frames(n)),
        behavior,
        MockLoader::new(log.clone()),
    )
}

/// Collects progress reports.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<ExportProgress>>);

impl Recorder {
    pub fn callback(&self) -> impl Fn(ExportProgress) + Send + Sync + '_ {
        move |p| self.0.lock().unwrap().push(p)
    }

    pub fn percents(&self) -> Vec<f64> {
        self.0.lock().unwrap().iter().map(|p| p.percent).collect()
    }

    pub fn assert_monotonic(&self) {
        let percents = self.percents();
        assert!(
            percents.windows(2).all(|w| w[0] <= w[1]),
            "progress went backwards: {percents:?}"
        );
    }

    pub fn completions(&self) -> usize {
        self.percents().iter().filter(|p| **p == 100.0).count()
    }
}
