//! Streaming frame pipe between the renderer and the encoder process.

use std::sync::Arc;
use std::time::Duration;

use glidecast_common::config::TimeoutConfig;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use glidecast_project_model::event::TimestampMs;

use crate::encoder::{FrameEncoder, StreamSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Idle,
    Open,
    Finished,
    Aborted,
}

/// Sequential, ordered frame delivery to a [`FrameEncoder`].
///
/// Each write is awaited before the next frame is accepted, so at most one
/// frame is in flight. Frames must arrive in strictly increasing timestamp
/// order.
pub struct StreamingFramePipe {
    encoder: Arc<dyn FrameEncoder>,
    start_timeout: Duration,
    finish_timeout: Duration,
    state: PipeState,
    last_timestamp: Option<TimestampMs>,
    frames_written: u64,
}

impl StreamingFramePipe {
    pub fn new(encoder: Arc<dyn FrameEncoder>, timeouts: &TimeoutConfig) -> Self {
        Self {
            encoder,
            start_timeout: timeouts.encoder_start(),
            finish_timeout: timeouts.encoder_finish(),
            state: PipeState::Idle,
            last_timestamp: None,
            frames_written: 0,
        }
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Open the encoder for sequential input.
    pub async fn start(&mut self, spec: &StreamSpec) -> GlidecastResult<()> {
        if self.state != PipeState::Idle {
            return Err(GlidecastError::encoder_start(format!(
                "Pipe cannot start from {:?}",
                self.state
            )));
        }

        match tokio::time::timeout(self.start_timeout, self.encoder.start(spec)).await {
            Ok(Ok(())) => {
                self.state = PipeState::Open;
                tracing::debug!(
                    encoder = self.encoder.name(),
                    output = %spec.output_path.display(),
                    "Frame pipe open"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = PipeState::Aborted;
                Err(match e {
                    GlidecastError::EncoderStart { .. } => e,
                    other => GlidecastError::encoder_start(other.to_string()),
                })
            }
            Err(_) => {
                self.abort().await;
                Err(GlidecastError::encoder_start(format!(
                    "Encoder did not start within {}ms",
                    self.start_timeout.as_millis()
                )))
            }
        }
    }

    /// Send one frame captured at `timestamp_ms`.
    pub async fn write_frame(&mut self, timestamp_ms: TimestampMs, frame: &[u8]) -> GlidecastResult<()> {
        if self.state != PipeState::Open {
            return Err(GlidecastError::encoder_write(format!(
                "Pipe is not open ({:?})",
                self.state
            )));
        }
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                return Err(GlidecastError::encoder_write(format!(
                    "Frame at {timestamp_ms}ms is not after {last}ms"
                )));
            }
        }

        self.encoder.write_frame(frame).await.map_err(|e| match e {
            GlidecastError::EncoderWrite { .. } => e,
            other => GlidecastError::encoder_write(other.to_string()),
        })?;

        self.last_timestamp = Some(timestamp_ms);
        self.frames_written += 1;
        Ok(())
    }

    /// Signal end-of-stream and wait for the encoder to flush.
    pub async fn finish(&mut self) -> GlidecastResult<()> {
        if self.state != PipeState::Open {
            return Err(GlidecastError::encoder_finish(format!(
                "Pipe is not open ({:?})",
                self.state
            )));
        }

        match tokio::time::timeout(self.finish_timeout, self.encoder.finish()).await {
            Ok(Ok(())) => {
                self.state = PipeState::Finished;
                tracing::debug!(frames = self.frames_written, "Frame pipe finished");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = PipeState::Aborted;
                Err(match e {
                    GlidecastError::EncoderFinish { .. } => e,
                    other => GlidecastError::encoder_finish(other.to_string()),
                })
            }
            Err(_) => {
                self.abort().await;
                Err(GlidecastError::encoder_finish(format!(
                    "Encoder did not finish within {}ms",
                    self.finish_timeout.as_millis()
                )))
            }
        }
    }

    /// Best-effort immediate teardown. Never fails.
    pub async fn abort(&mut self) {
        if matches!(self.state, PipeState::Finished) {
            return;
        }
        if let Err(e) = self.encoder.stop().await {
            tracing::warn!(error = %e, "Failed to stop encoder during abort");
        }
        self.state = PipeState::Aborted;
    }
}
