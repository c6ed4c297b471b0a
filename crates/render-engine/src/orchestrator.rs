//! Export orchestrator: the public entry point of the export pipeline.
//!
//! One orchestrator runs at most one export at a time. It owns the
//! [`ExportSession`], lends a [`FrameRenderer`] and a [`StreamingFramePipe`]
//! to the software path for the duration of one export, and wraps
//! whole-strategy work (prepare, GPU dispatch) in [`with_retry`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use glidecast_common::clock::Stopwatch;
use glidecast_common::config::{AppConfig, ProgressConfig, TimeoutConfig};
use glidecast_common::error::{GlidecastError, GlidecastResult};
use glidecast_processing_core::camera_path::CameraSettings;
use glidecast_processing_core::planner::{CameraPathPlanner, MousePathPlanner};
use glidecast_project_model::camera::CameraPath;
use glidecast_project_model::export::{ExportConfig, ExportInfo, ExportResult};
use tokio::time::MissedTickBehavior;

use crate::encoder::{FrameEncoder, FrameFormat, GpuExportJob, StreamSpec};
use crate::ffmpeg::FfmpegEncoder;
use crate::gpu::{self, GpuMode};
use crate::pipe::StreamingFramePipe;
use crate::progress::{
    frame_progress, ProgressCallback, ProgressEstimator, ProgressReporter, ESTIMATE_CEILING,
};
use crate::renderer::{FfmpegVideoLoader, FrameRenderer, VideoLoader};
use crate::retry::{with_retry, RetryPolicy};
use crate::session::{CancelSignal, ExportSession, ExportState, Strategy};

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub timeouts: TimeoutConfig,
    pub retry: RetryPolicy,
    pub progress: ProgressConfig,
    pub frame_format: FrameFormat,
    pub max_segment_frames: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ExportSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeouts: config.timeouts.clone(),
            retry: RetryPolicy::from(&config.retry),
            progress: config.progress.clone(),
            frame_format: FrameFormat::default(),
            max_segment_frames: config.encoder.segment_frames.max(1),
        }
    }
}

type SharedReporter<'a> = Mutex<ProgressReporter<'a>>;

pub struct ExportOrchestrator {
    planner: Arc<dyn CameraPathPlanner>,
    encoder: Arc<dyn FrameEncoder>,
    loader: Arc<dyn VideoLoader>,
    settings: ExportSettings,
    session: Mutex<ExportSession>,
    cancel: CancelSignal,
}

impl ExportOrchestrator {
    pub fn new(
        planner: Arc<dyn CameraPathPlanner>,
        encoder: Arc<dyn FrameEncoder>,
        loader: Arc<dyn VideoLoader>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            planner,
            encoder,
            loader,
            settings,
            session: Mutex::new(ExportSession::default()),
            cancel: CancelSignal::new(),
        }
    }

    /// Orchestrator backed by the mouse-log planner and ffmpeg.
    pub fn with_ffmpeg(config: &AppConfig) -> Self {
        Self::new(
            Arc::new(MousePathPlanner::new(CameraSettings::from(&config.export))),
            Arc::new(FfmpegEncoder::new(config.encoder.clone(), &config.timeouts)),
            Arc::new(FfmpegVideoLoader::new(&config.encoder)),
            ExportSettings::from(config),
        )
    }

    /// Wire format for rendered frames on the software path.
    pub fn with_frame_format(mut self, format: FrameFormat) -> Self {
        self.settings.frame_format = format;
        self
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> ExportSession {
        self.lock_session().clone()
    }

    pub fn state(&self) -> ExportState {
        self.lock_session().state
    }

    pub async fn is_encoder_available(&self) -> bool {
        self.encoder.is_available().await
    }

    /// Plan the camera path without exporting.
    pub async fn prepare_export(&self, config: &ExportConfig) -> GlidecastResult<ExportInfo> {
        self.begin(None)?;
        match self.prepare(config).await {
            Ok(info) => {
                self.lock_session().transition_to(ExportState::Idle)?;
                Ok(info)
            }
            Err(e) if e.is_cancelled() => {
                self.lock_session().cancel();
                Err(e)
            }
            Err(e) => {
                self.lock_session().transition_to(ExportState::Idle).ok();
                Err(e)
            }
        }
    }

    /// Write the most recently planned camera path as JSON.
    pub async fn save_camera_path(&self, path: &Path) -> GlidecastResult<()> {
        self.planner.save_camera_path(path).await
    }

    /// Software export: render every camera frame and stream it to the encoder.
    pub async fn export(
        &self,
        config: &ExportConfig,
        on_progress: ProgressCallback<'_>,
    ) -> GlidecastResult<ExportResult> {
        self.begin(Some(Strategy::Software))?;
        let reporter = Mutex::new(ProgressReporter::new(on_progress));

        let result = self.run_software(config, &reporter).await;
        self.conclude(config, result.map(Some), &reporter)
    }

    /// GPU export: hand the whole camera path to the encoder.
    pub async fn export_gpu(
        &self,
        config: &ExportConfig,
        on_progress: ProgressCallback<'_>,
    ) -> GlidecastResult<ExportResult> {
        let mode = GpuMode::from_segmented(config.segmented);
        let strategy = match mode {
            GpuMode::SingleShot => Strategy::GpuSingleShot,
            GpuMode::Segmented => Strategy::GpuSegmented,
        };
        self.begin(Some(strategy))?;
        let reporter = Mutex::new(ProgressReporter::new(on_progress));

        let result = self.run_gpu(config, mode, &reporter).await;
        self.conclude(config, result.map(|_| None), &reporter)
    }

    /// Stop the running export.
    ///
    /// Once this returns, no further frame is written and no further GPU
    /// invocation is issued. Work already handed to the encoder is told
    /// to stop.
    pub async fn cancel(&self) {
        self.cancel.cancel();

        let (state, strategy) = {
            let session = self.lock_session();
            (session.state, session.strategy)
        };
        if !state.is_active() {
            return;
        }
        tracing::info!(state = %state, "Cancelling export");

        let stopped = match (state, strategy) {
            (ExportState::Encoding, _) => self.encoder.stop_gpu_export().await,
            (ExportState::Rendering | ExportState::Finishing, Some(Strategy::Software)) => {
                self.encoder.stop().await
            }
            _ => Ok(()),
        };
        if let Err(e) = stopped {
            tracing::warn!(error = %e, "Failed to stop encoder during cancel");
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, ExportSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, strategy: Option<Strategy>) -> GlidecastResult<()> {
        let mut session = self.lock_session();
        session.begin()?;
        session.strategy = strategy;
        self.cancel.reset();
        Ok(())
    }

    fn transition(&self, next: ExportState) -> GlidecastResult<()> {
        self.lock_session().transition_to(next)
    }

    /// Deliver progress and mirror it into the session.
    fn emit(&self, reporter: &SharedReporter<'_>, percent: f64, message: &str) {
        let (state, written, total) = {
            let mut session = self.lock_session();
            session.advance(percent.min(ESTIMATE_CEILING));
            (session.state, session.frames_written, session.total_frames)
        };
        reporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .report(percent, message, state, written, total);
    }

    async fn ensure_encoder(&self) -> GlidecastResult<()> {
        if self.encoder.is_available().await {
            Ok(())
        } else {
            Err(GlidecastError::encoder_unavailable(format!(
                "Encoder '{}' is not available",
                self.encoder.name()
            )))
        }
    }

    async fn prepare(&self, config: &ExportConfig) -> GlidecastResult<ExportInfo> {
        with_retry(self.settings.retry, &self.cancel, "prepare", |_| {
            self.planner.prepare(config)
        })
        .await
    }

    /// Prepare and fetch a non-empty, well-formed camera path.
    async fn planned_path(&self, config: &ExportConfig) -> GlidecastResult<CameraPath> {
        let info = self.prepare(config).await?;
        let path = self.planner.camera_frames();
        if path.is_empty() {
            return Err(GlidecastError::planning(format!(
                "No camera frames to export ({} mouse events)",
                info.mouse_event_count
            )));
        }
        path.validate()?;
        Ok(path)
    }

    async fn run_software(
        &self,
        config: &ExportConfig,
        reporter: &SharedReporter<'_>,
    ) -> GlidecastResult<u64> {
        self.ensure_encoder().await?;
        self.emit(reporter, 0.0, "Preparing export");

        let path = self.planned_path(config).await?;
        let total = path.len() as u64;
        self.lock_session().total_frames = total;
        self.emit(reporter, 5.0, "Camera path ready");

        self.cancel.check()?;
        self.transition(ExportState::Rendering)?;
        self.emit(reporter, 10.0, "Loading video");
        let mut renderer = FrameRenderer::open(
            self.loader.as_ref(),
            &config.video_path,
            config.screen_width,
            config.screen_height,
            self.settings.frame_format,
            self.settings.timeouts.seek(),
        )
        .await?;
        self.emit(reporter, 15.0, "Starting encoder");

        let mut pipe = StreamingFramePipe::new(self.encoder.clone(), &self.settings.timeouts);
        let result = self
            .stream_frames(config, &path, &mut renderer, &mut pipe, reporter)
            .await;
        if result.is_err() {
            pipe.abort().await;
        }
        renderer.dispose();
        result
    }

    async fn stream_frames(
        &self,
        config: &ExportConfig,
        path: &CameraPath,
        renderer: &mut FrameRenderer,
        pipe: &mut StreamingFramePipe,
        reporter: &SharedReporter<'_>,
    ) -> GlidecastResult<u64> {
        let total = path.len() as u64;
        let spec = StreamSpec {
            output_path: config.output_path.clone(),
            fps: config.fps,
            width: config.screen_width,
            height: config.screen_height,
            format: renderer.format(),
        };
        self.cancel.check()?;
        pipe.start(&spec).await?;
        self.emit(reporter, 20.0, "Rendering frames");

        let stopwatch = Stopwatch::start();
        for frame in path.frames() {
            self.cancel.check()?;
            let bytes = renderer
                .render_frame(frame, config.screen_width, config.screen_height, config.show_cursor)
                .await?;

            self.cancel.check()?;
            pipe.write_frame(frame.timestamp_ms, &bytes).await?;

            let written = pipe.frames_written();
            self.lock_session().frames_written = written;
            self.emit(
                reporter,
                frame_progress(written, total),
                &format!("Rendering frame {written}/{total}"),
            );
        }

        self.cancel.check()?;
        self.transition(ExportState::Finishing)?;
        self.emit(reporter, 95.0, "Finalizing video");
        pipe.finish().await?;
        self.cancel.check()?;

        tracing::info!(
            frames = total,
            elapsed_ms = stopwatch.elapsed_ms(),
            output = %config.output_path.display(),
            "Frames streamed"
        );
        Ok(total)
    }

    async fn run_gpu(
        &self,
        config: &ExportConfig,
        mode: GpuMode,
        reporter: &SharedReporter<'_>,
    ) -> GlidecastResult<()> {
        self.ensure_encoder().await?;
        self.emit(reporter, 0.0, "Preparing export");

        let path = self.planned_path(config).await?;
        self.lock_session().total_frames = path.len() as u64;
        self.transition(ExportState::Encoding)?;

        let job = GpuExportJob {
            video_path: config.video_path.clone(),
            output_path: config.output_path.clone(),
            width: config.screen_width,
            height: config.screen_height,
            fps: config.fps,
            path,
            max_segment_frames: self.settings.max_segment_frames,
        };

        with_retry(self.settings.retry, &self.cancel, mode.as_str(), |attempt| {
            self.gpu_attempt(&job, mode, attempt, reporter)
        })
        .await?;

        self.cancel.check()?;
        self.transition(ExportState::Finishing)?;
        self.emit(reporter, ESTIMATE_CEILING, "Finalizing");
        Ok(())
    }

    /// One GPU invocation, raced against cancellation, with progress polling.
    async fn gpu_attempt(
        &self,
        job: &GpuExportJob,
        mode: GpuMode,
        attempt: u32,
        reporter: &SharedReporter<'_>,
    ) -> GlidecastResult<()> {
        tracing::debug!(attempt, mode = mode.as_str(), "GPU export attempt");
        let mut estimator =
            ProgressEstimator::new(Duration::from_millis(self.settings.progress.estimated_duration_ms));
        let stopwatch = Stopwatch::start();
        let mut ticker = tokio::time::interval(Duration::from_millis(
            self.settings.progress.poll_interval_ms.max(1),
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let dispatch = gpu::dispatch(self.encoder.as_ref(), job, mode);
        tokio::pin!(dispatch);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    if let Err(e) = self.encoder.stop_gpu_export().await {
                        tracing::warn!(error = %e, "Failed to stop GPU export");
                    }
                    return Err(GlidecastError::Cancelled);
                }
                result = &mut dispatch => return result,
                _ = ticker.tick() => {
                    let percent = match self.encoder.gpu_export_progress() {
                        Some(real) => Some(real.min(ESTIMATE_CEILING)),
                        None => estimator.poll(Duration::from_millis(stopwatch.elapsed_ms())),
                    };
                    if let Some(percent) = percent {
                        self.emit(reporter, percent, ProgressEstimator::message_for(percent));
                    }
                }
            }
        }
    }

    /// Settle the session from the outcome of an export.
    fn conclude(
        &self,
        config: &ExportConfig,
        result: GlidecastResult<Option<u64>>,
        reporter: &SharedReporter<'_>,
    ) -> GlidecastResult<ExportResult> {
        let result = result.and_then(|frames| {
            self.transition(ExportState::Completed)?;
            Ok(frames)
        });

        match result {
            Ok(total_frames) => {
                let (written, total) = {
                    let mut session = self.lock_session();
                    session.advance(100.0);
                    (session.frames_written, session.total_frames)
                };
                reporter
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .complete("Export complete", written, total);
                tracing::info!(output = %config.output_path.display(), "Export completed");
                Ok(ExportResult {
                    success: true,
                    output_path: config.output_path.clone(),
                    total_frames,
                })
            }
            Err(e) => {
                let e = if self.cancel.is_cancelled() && !e.is_cancelled() {
                    tracing::debug!(error = %e, "Error after cancellation");
                    GlidecastError::Cancelled
                } else {
                    e
                };
                self.lock_session().fail(e.kind());
                if e.is_cancelled() {
                    tracing::info!(output = %config.output_path.display(), "Export cancelled");
                } else {
                    tracing::error!(error = %e, kind = ?e.kind(), "Export failed");
                }
                Err(e)
            }
        }
    }
}
