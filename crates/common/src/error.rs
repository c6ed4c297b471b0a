//! Error types shared across Glidecast crates.

use std::path::PathBuf;

/// Top-level error type for Glidecast operations.
///
/// Every export failure maps to exactly one variant so callers can tell
/// a missing encoder apart from a seek that never completed.
#[derive(Debug, thiserror::Error)]
pub enum GlidecastError {
    #[error("Encoder unavailable: {message}")]
    EncoderUnavailable { message: String },

    #[error("Planning error: {message}")]
    Planning { message: String },

    #[error("Video load error: {message}")]
    VideoLoad { message: String },

    #[error("Seek timed out at {timestamp_ms}ms after {timeout_ms}ms")]
    SeekTimeout { timestamp_ms: i64, timeout_ms: u64 },

    #[error("Encoder start error: {message}")]
    EncoderStart { message: String },

    #[error("Encoder write error: {message}")]
    EncoderWrite { message: String },

    #[error("Encoder finish error: {message}")]
    EncoderFinish { message: String },

    #[error("GPU export error: {message}")]
    GpuExport { message: String },

    #[error("Export cancelled")]
    Cancelled,

    #[error("Export session error: {message}")]
    Session { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GlidecastError.
pub type GlidecastResult<T> = Result<T, GlidecastError>;

/// Discriminant of a [`GlidecastError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ErrorKind {
    EncoderUnavailable,
    Planning,
    VideoLoad,
    SeekTimeout,
    EncoderStart,
    EncoderWrite,
    EncoderFinish,
    GpuExport,
    Cancelled,
    Session,
    Config,
    FileNotFound,
    Io,
    Json,
    Other,
}

impl GlidecastError {
    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            message: msg.into(),
        }
    }

    pub fn planning(msg: impl Into<String>) -> Self {
        Self::Planning {
            message: msg.into(),
        }
    }

    pub fn video_load(msg: impl Into<String>) -> Self {
        Self::VideoLoad {
            message: msg.into(),
        }
    }

    pub fn seek_timeout(timestamp_ms: i64, timeout_ms: u64) -> Self {
        Self::SeekTimeout {
            timestamp_ms,
            timeout_ms,
        }
    }

    pub fn encoder_start(msg: impl Into<String>) -> Self {
        Self::EncoderStart {
            message: msg.into(),
        }
    }

    pub fn encoder_write(msg: impl Into<String>) -> Self {
        Self::EncoderWrite {
            message: msg.into(),
        }
    }

    pub fn encoder_finish(msg: impl Into<String>) -> Self {
        Self::EncoderFinish {
            message: msg.into(),
        }
    }

    pub fn gpu_export(msg: impl Into<String>) -> Self {
        Self::GpuExport {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// The payload-free kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EncoderUnavailable { .. } => ErrorKind::EncoderUnavailable,
            Self::Planning { .. } => ErrorKind::Planning,
            Self::VideoLoad { .. } => ErrorKind::VideoLoad,
            Self::SeekTimeout { .. } => ErrorKind::SeekTimeout,
            Self::EncoderStart { .. } => ErrorKind::EncoderStart,
            Self::EncoderWrite { .. } => ErrorKind::EncoderWrite,
            Self::EncoderFinish { .. } => ErrorKind::EncoderFinish,
            Self::GpuExport { .. } => ErrorKind::GpuExport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Session { .. } => ErrorKind::Session,
            Self::Config { .. } => ErrorKind::Config,
            Self::FileNotFound { .. } => ErrorKind::FileNotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Json(_) => ErrorKind::Json,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this error ends an export because the caller asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
