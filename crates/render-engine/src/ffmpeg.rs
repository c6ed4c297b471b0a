//! ffmpeg-backed [`FrameEncoder`].
//!
//! Streaming exports pipe frames into `ffmpeg` over stdin. GPU exports hand
//! ffmpeg the whole camera path as a filter graph and read its
//! `-progress pipe:1` output for a real progress signal.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use glidecast_common::clock::ms_to_secs;
use glidecast_common::config::{EncoderConfig, TimeoutConfig};
use glidecast_common::error::{GlidecastError, GlidecastResult};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::JoinHandle;

use crate::encoder::{FrameEncoder, FrameFormat, GpuExportJob, StreamSpec};
use crate::gpu::{build_zoompan_filter, concat_list, plan_segments};

/// Stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Sentinel stored in the progress cell while nothing is known.
const NO_PROGRESS: u64 = u64::MAX;

/// H.264 encoder chosen for GPU exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCodec {
    Nvenc,
    Libx264,
}

impl HardwareCodec {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Libx264 => "libx264",
        }
    }

    /// Decoder-side arguments, placed before `-i`.
    pub fn input_args(&self) -> Vec<String> {
        match self {
            Self::Nvenc => vec!["-hwaccel".into(), "cuda".into()],
            Self::Libx264 => Vec::new(),
        }
    }

    /// Encoder arguments, placed after the filter graph.
    pub fn output_args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Nvenc => &[
                "-c:v", "h264_nvenc", "-preset", "p4", "-rc", "vbr", "-cq", "23", "-b:v", "5M",
                "-maxrate", "8M", "-bufsize", "10M",
            ],
            Self::Libx264 => &["-c:v", "libx264", "-preset", "ultrafast", "-crf", "23"],
        };
        args.iter().map(|s| s.to_string()).collect()
    }
}

/// Pick the best codec from `ffmpeg -encoders` output.
pub fn select_codec(encoders_listing: &str, prefer_hardware: bool) -> HardwareCodec {
    if prefer_hardware && encoders_listing.contains("h264_nvenc") {
        HardwareCodec::Nvenc
    } else {
        HardwareCodec::Libx264
    }
}

/// Arguments for a streaming export reading frames from stdin.
pub fn stream_args(spec: &StreamSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    match spec.format {
        FrameFormat::Png => {
            args.extend(["-f", "image2pipe", "-c:v", "png"].map(String::from));
        }
        FrameFormat::RawRgba => {
            args.extend(["-f", "rawvideo", "-pix_fmt", "rgba"].map(String::from));
            args.push("-s".into());
            args.push(format!("{}x{}", spec.width, spec.height));
        }
    }
    args.push("-framerate".into());
    args.push(spec.fps.to_string());
    args.extend(["-i", "-"].map(String::from));
    args.extend(
        ["-c:v", "libx264", "-preset", "medium", "-crf", "20", "-pix_fmt", "yuv420p"]
            .map(String::from),
    );
    args.push(spec.output_path.to_string_lossy().into_owned());
    args
}

/// Arguments for a single-shot GPU export.
pub fn single_shot_args(job: &GpuExportJob, codec: HardwareCodec) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
    args.extend(codec.input_args());
    args.push("-ss".into());
    args.push(format!("{:.3}", job.start_secs()));
    args.push("-t".into());
    args.push(format!("{:.3}", job.duration_secs()));
    args.push("-i".into());
    args.push(job.video_path.to_string_lossy().into_owned());
    args.push("-filter_complex".into());
    args.push(build_zoompan_filter(job));
    args.extend(codec.output_args());
    args.push("-r".into());
    args.push(job.fps.to_string());
    args.push("-an".into());
    args.push(job.output_path.to_string_lossy().into_owned());
    args
}

/// Arguments for one segment of a segmented GPU export.
pub fn segment_args(
    job: &GpuExportJob,
    codec: HardwareCodec,
    start_ms: i64,
    duration_ms: i64,
    filter: &str,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
    args.extend(codec.input_args());
    args.push("-ss".into());
    args.push(format!("{:.3}", ms_to_secs(start_ms)));
    args.push("-t".into());
    args.push(format!("{:.3}", ms_to_secs(duration_ms)));
    args.push("-i".into());
    args.push(job.video_path.to_string_lossy().into_owned());
    args.push("-filter_complex".into());
    args.push(filter.to_string());
    args.extend(codec.output_args());
    args.push("-r".into());
    args.push(job.fps.to_string());
    args.push("-an".into());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Arguments joining segments listed in `list` into `output`.
pub fn concat_args(list: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
    args.push(list.to_string_lossy().into_owned());
    args.extend(["-c", "copy"].map(String::from));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Accumulates `key=value` lines from ffmpeg's `-progress` output.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub frame: u64,
    pub complete: bool,
}

impl ProgressState {
    /// Apply one line. Returns true at the end of a progress block.
    pub fn update_line(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        match key {
            // ffmpeg reports microseconds under both names.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
                false
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
                false
            }
            "progress" => {
                self.complete = value == "end";
                true
            }
            _ => false,
        }
    }

    /// Percentage of `expected_secs` produced so far.
    pub fn percent(&self, expected_secs: f64) -> f64 {
        if self.complete {
            return 100.0;
        }
        if expected_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_secs * 100.0).clamp(0.0, 100.0)
    }
}

/// An open streaming export.
struct StreamProcess {
    child: Child,
    stderr_task: JoinHandle<String>,
    output_path: PathBuf,
}

/// [`FrameEncoder`] that drives the `ffmpeg` binary.
pub struct FfmpegEncoder {
    config: EncoderConfig,
    stop_grace: Duration,
    binary: OnceCell<Option<PathBuf>>,
    codec: OnceCell<HardwareCodec>,
    stdin: Mutex<Option<ChildStdin>>,
    stream: Mutex<Option<StreamProcess>>,
    stream_stop: watch::Sender<bool>,
    gpu_stop: watch::Sender<bool>,
    gpu_progress: Arc<AtomicU64>,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig, timeouts: &TimeoutConfig) -> Self {
        let (stream_stop, _) = watch::channel(false);
        let (gpu_stop, _) = watch::channel(false);
        Self {
            config,
            stop_grace: timeouts.stop_grace(),
            binary: OnceCell::new(),
            codec: OnceCell::new(),
            stdin: Mutex::new(None),
            stream: Mutex::new(None),
            stream_stop,
            gpu_stop,
            gpu_progress: Arc::new(AtomicU64::new(NO_PROGRESS)),
        }
    }

    /// Resolved ffmpeg binary, if any.
    pub async fn binary(&self) -> Option<PathBuf> {
        self.binary
            .get_or_init(|| async {
                let configured = self.config.ffmpeg_path.clone();
                tokio::task::spawn_blocking(move || match configured {
                    Some(path) if path.is_file() => Some(path),
                    Some(path) => which::which(path).ok(),
                    None => which::which("ffmpeg").ok(),
                })
                .await
                .ok()
                .flatten()
            })
            .await
            .clone()
    }

    async fn require_binary(&self) -> GlidecastResult<PathBuf> {
        self.binary().await.ok_or_else(|| {
            GlidecastError::encoder_unavailable("ffmpeg not found (set encoder.ffmpeg_path or add it to PATH)")
        })
    }

    /// Codec used for GPU exports, probed once.
    pub async fn codec(&self) -> HardwareCodec {
        *self
            .codec
            .get_or_init(|| async {
                let Some(binary) = self.binary().await else {
                    return HardwareCodec::Libx264;
                };
                let listing = Command::new(&binary)
                    .args(["-hide_banner", "-encoders"])
                    .stdin(Stdio::null())
                    .stderr(Stdio::null())
                    .output()
                    .await
                    .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
                    .unwrap_or_default();
                let codec = select_codec(&listing, self.config.prefer_hardware);
                tracing::info!(codec = codec.name(), "Selected GPU export codec");
                codec
            })
            .await
    }

    fn set_gpu_progress(&self, percent: Option<f64>) {
        let bits = percent.map(f64::to_bits).unwrap_or(NO_PROGRESS);
        self.gpu_progress.store(bits, Ordering::Relaxed);
    }

    /// Run one ffmpeg invocation to completion, honouring `stop_gpu_export`.
    ///
    /// Progress is mapped into `[base, base + span]` of the whole job.
    async fn run_gpu_command(
        &self,
        binary: &Path,
        args: &[String],
        expected_secs: f64,
        base: f64,
        span: f64,
    ) -> GlidecastResult<()> {
        let mut stop_rx = self.gpu_stop.subscribe();
        if *stop_rx.borrow_and_update() {
            return Err(GlidecastError::Cancelled);
        }

        tracing::debug!(args = ?args, "Running ffmpeg");
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GlidecastError::gpu_export(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stderr_task = drain_stderr(&mut child);
        let progress_task = child.stdout.take().map(|stdout| {
            let cell = self.gpu_progress.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut state = ProgressState::default();
                while let Ok(Some(line)) = lines.next_line().await {
                    if state.update_line(&line) {
                        let percent = base + span * state.percent(expected_secs) / 100.0;
                        cell.store(percent.to_bits(), Ordering::Relaxed);
                    }
                }
            })
        });

        let outcome = tokio::select! {
            status = child.wait() => Some(status),
            _ = stop_rx.wait_for(|stop| *stop) => None,
        };

        let status = match outcome {
            Some(status) => status
                .map_err(|e| GlidecastError::gpu_export(format!("Failed to wait on ffmpeg: {e}")))?,
            None => {
                tracing::info!("GPU export stop requested, killing ffmpeg");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ffmpeg");
                }
                if let Some(task) = progress_task {
                    task.abort();
                }
                return Err(GlidecastError::Cancelled);
            }
        };

        if let Some(task) = progress_task {
            task.await.ok();
        }
        let stderr = stderr_task.await.unwrap_or_default();
        check_status(status, &stderr).map_err(GlidecastError::gpu_export)
    }
}

fn drain_stderr(child: &mut Child) -> JoinHandle<String> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let Some(mut stderr) = stderr else {
            return String::new();
        };
        let mut output = String::new();
        match stderr.read_to_string(&mut output).await {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

fn check_status(status: ExitStatus, stderr: &str) -> Result<(), String> {
    if status.success() {
        return Ok(());
    }
    let trimmed = stderr.trim();
    let tail_start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_BYTES)
        .map(|(i, _)| i)
        .unwrap_or(0);
    Err(format!(
        "ffmpeg exited with {status}: {}",
        &trimmed[tail_start..]
    ))
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    async fn is_available(&self) -> bool {
        self.binary().await.is_some()
    }

    async fn start(&self, spec: &StreamSpec) -> GlidecastResult<()> {
        let binary = self.require_binary().await?;
        let mut stream = self.stream.lock().await;
        if stream.is_some() {
            return Err(GlidecastError::encoder_start("Export already in progress"));
        }

        let args = stream_args(spec);
        tracing::debug!(args = ?args, "Starting ffmpeg stream");
        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GlidecastError::encoder_start(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GlidecastError::encoder_start("Failed to capture ffmpeg stdin"))?;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(GlidecastError::encoder_start(format!(
                "ffmpeg exited immediately with {status}"
            )));
        }

        tracing::info!(
            pid = child.id(),
            output = %spec.output_path.display(),
            fps = spec.fps,
            format = ?spec.format,
            "ffmpeg stream started"
        );

        let stderr_task = drain_stderr(&mut child);
        self.stream_stop.send_replace(false);
        *self.stdin.lock().await = Some(stdin);
        *stream = Some(StreamProcess {
            child,
            stderr_task,
            output_path: spec.output_path.clone(),
        });
        Ok(())
    }

    async fn write_frame(&self, frame: &[u8]) -> GlidecastResult<()> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| GlidecastError::encoder_write("Encoder stream is not open"))?;
        pipe.write_all(frame)
            .await
            .map_err(|e| GlidecastError::encoder_write(format!("Failed to write frame: {e}")))
    }

    async fn finish(&self) -> GlidecastResult<()> {
        let mut stop_rx = self.stream_stop.subscribe();
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            stdin.flush().await.ok();
            drop(stdin);
        }

        let Some(mut process) = self.stream.lock().await.take() else {
            if *stop_rx.borrow() {
                return Err(GlidecastError::Cancelled);
            }
            return Err(GlidecastError::encoder_finish("Encoder stream is not open"));
        };

        // The process is owned here now, so `stop` reaches it through the watch.
        let outcome = tokio::select! {
            status = process.child.wait() => Some(status),
            _ = stop_rx.wait_for(|stop| *stop) => None,
        };

        let status = match outcome {
            Some(status) => status
                .map_err(|e| GlidecastError::encoder_finish(format!("Failed to wait on ffmpeg: {e}")))?,
            None => {
                tracing::info!("Stop requested while ffmpeg was finishing, killing");
                if let Err(e) = process.child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill ffmpeg");
                }
                process.stderr_task.abort();
                return Err(GlidecastError::Cancelled);
            }
        };
        let stderr = process.stderr_task.await.unwrap_or_default();
        check_status(status, &stderr).map_err(GlidecastError::encoder_finish)?;

        tracing::info!(output = %process.output_path.display(), "ffmpeg stream finished");
        Ok(())
    }

    async fn stop(&self) -> GlidecastResult<()> {
        self.stream_stop.send_replace(true);

        // Closing stdin lets ffmpeg finalize what it already has. A write in
        // flight keeps the lock, and only the kill unblocks it.
        let stdin_closed = match self.stdin.try_lock() {
            Ok(mut stdin) => {
                stdin.take();
                true
            }
            Err(_) => false,
        };

        let Some(mut process) = self.stream.lock().await.take() else {
            return Ok(());
        };

        if !stdin_closed {
            tracing::warn!("Frame write in flight, killing ffmpeg");
            process.child.kill().await?;
        } else if tokio::time::timeout(self.stop_grace, process.child.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                grace_ms = self.stop_grace.as_millis() as u64,
                "ffmpeg did not exit after stdin closed, killing"
            );
            process.child.kill().await?;
        }
        process.stderr_task.abort();
        tracing::info!(output = %process.output_path.display(), "ffmpeg stream stopped");
        Ok(())
    }

    async fn export_with_gpu(&self, job: &GpuExportJob) -> GlidecastResult<()> {
        let binary = self.require_binary().await?;
        let codec = self.codec().await;
        self.gpu_stop.send_replace(false);
        self.set_gpu_progress(None);

        let args = single_shot_args(job, codec);
        let result = self
            .run_gpu_command(&binary, &args, job.duration_secs(), 0.0, 100.0)
            .await;
        self.set_gpu_progress(None);
        result?;

        tracing::info!(output = %job.output_path.display(), codec = codec.name(), "GPU export finished");
        Ok(())
    }

    async fn export_with_gpu_segmented(&self, job: &GpuExportJob) -> GlidecastResult<()> {
        let binary = self.require_binary().await?;
        let codec = self.codec().await;
        self.gpu_stop.send_replace(false);
        self.set_gpu_progress(None);

        let segments = plan_segments(
            job.path.frames(),
            job.width,
            job.height,
            job.fps,
            job.max_segment_frames,
        );
        if segments.is_empty() {
            return Err(GlidecastError::gpu_export("Camera path produced no segments"));
        }

        let out_dir = match job.output_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // Removed on drop, on every exit path.
        let temp_dir = tempfile::Builder::new()
            .prefix(".glidecast-segments-")
            .tempdir_in(&out_dir)?;

        tracing::info!(
            segments = segments.len(),
            frames = job.path.len(),
            dir = %temp_dir.path().display(),
            "Starting segmented GPU export"
        );

        // Segment encoding is mapped onto 0-90%, the concat onto the rest.
        let total_frames = job.path.len().max(1) as f64;
        let mut files = Vec::with_capacity(segments.len());
        for segment in &segments {
            let file = temp_dir.path().join(segment.file_name());
            let base = segment.start_frame as f64 / total_frames * 90.0;
            let span = segment.frame_count() as f64 / total_frames * 90.0;
            let args = segment_args(
                job,
                codec,
                segment.start_ms,
                segment.duration_ms,
                &segment.filter(job.width, job.height),
                &file,
            );
            let result = self
                .run_gpu_command(&binary, &args, segment.duration_ms as f64 / 1000.0, base, span)
                .await;
            if let Err(e) = result {
                self.set_gpu_progress(None);
                return Err(match e {
                    GlidecastError::GpuExport { message } => GlidecastError::gpu_export(format!(
                        "Segment {} (frames {}-{}) failed: {message}",
                        segment.index, segment.start_frame, segment.end_frame
                    )),
                    other => other,
                });
            }
            tracing::debug!(
                segment = segment.index,
                frames = segment.frame_count(),
                "Segment encoded"
            );
            files.push(file);
        }

        let list_path = temp_dir.path().join("segments.txt");
        tokio::fs::write(&list_path, concat_list(&files)).await?;
        let result = self
            .run_gpu_command(&binary, &concat_args(&list_path, &job.output_path), 0.0, 90.0, 10.0)
            .await;
        self.set_gpu_progress(None);
        result?;

        tracing::info!(
            output = %job.output_path.display(),
            segments = segments.len(),
            "Segmented GPU export finished"
        );
        Ok(())
    }

    async fn stop_gpu_export(&self) -> GlidecastResult<()> {
        self.gpu_stop.send_replace(true);
        Ok(())
    }

    fn gpu_export_progress(&self) -> Option<f64> {
        match self.gpu_progress.load(Ordering::Relaxed) {
            NO_PROGRESS => None,
            bits => Some(f64::from_bits(bits)),
        }
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}
