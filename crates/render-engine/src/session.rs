//! Export session state machine and the cancellation signal.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glidecast_common::error::{ErrorKind, GlidecastError, GlidecastResult};
use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle state of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Idle,
    Preparing,
    /// Software path: frames are rendered and streamed.
    Rendering,
    /// GPU path: the encoder owns the pixel work.
    Encoding,
    Finishing,
    Completed,
    Cancelled,
    Failed(ErrorKind),
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }

    /// Whether an export is in flight.
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != Self::Idle
    }

    fn can_transition_to(&self, next: ExportState) -> bool {
        use ExportState::*;
        match (*self, next) {
            (s, Cancelled | Failed(_)) => !s.is_terminal(),
            (Idle, Preparing) => true,
            (Preparing, Idle | Rendering | Encoding) => true,
            (Rendering | Encoding, Finishing) => true,
            (Finishing, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Preparing => write!(f, "preparing"),
            Self::Rendering => write!(f, "rendering"),
            Self::Encoding => write!(f, "encoding"),
            Self::Finishing => write!(f, "finishing"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Which way frames reach the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Software,
    GpuSingleShot,
    GpuSegmented,
}

/// State of the current export, owned by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSession {
    pub state: ExportState,
    pub progress: f64,
    pub total_frames: u64,
    pub frames_written: u64,
    pub strategy: Option<Strategy>,
}

impl ExportSession {
    /// Start a new export, replacing a finished session.
    pub fn begin(&mut self) -> GlidecastResult<()> {
        if self.state.is_active() {
            return Err(GlidecastError::session(format!(
                "An export is already {}",
                self.state
            )));
        }
        *self = Self::default();
        self.transition_to(ExportState::Preparing)
    }

    pub fn transition_to(&mut self, next: ExportState) -> GlidecastResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(GlidecastError::session(format!(
                "Invalid export transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(from = %self.state, to = %next, "Export state change");
        self.state = next;
        Ok(())
    }

    /// Record a failure. No-op once terminal.
    pub fn fail(&mut self, kind: ErrorKind) {
        if kind == ErrorKind::Cancelled {
            self.cancel();
        } else if !self.state.is_terminal() {
            self.state = ExportState::Failed(kind);
        }
    }

    /// Record a cancellation. No-op once terminal.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            self.state = ExportState::Cancelled;
        }
    }

    /// Raise progress, never lowering it.
    pub fn advance(&mut self, percent: f64) {
        if percent > self.progress {
            self.progress = percent.min(100.0);
        }
    }
}

/// Cooperative cancellation flag shared between the caller and a running export.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
    notify: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(notify),
        }
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Cancelled` if cancellation was requested.
    pub fn check(&self) -> GlidecastResult<()> {
        if self.is_cancelled() {
            Err(GlidecastError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.notify.subscribe();
        // The sender lives in self, so this only ends on `true`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Clear the flag for the next export.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        self.notify.send_replace(false);
    }
}
