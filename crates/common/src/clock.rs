//! Timing utilities for export pacing and progress estimation.
//!
//! Built on `tokio::time::Instant` so elapsed time follows the runtime
//! clock, including a paused clock under test.

use tokio::time::Instant;

/// Measures wall time since a strategy started.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start a stopwatch anchored to now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds elapsed since start.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Milliseconds between frames at the given rate.
pub fn frame_interval_ms(fps: u32) -> f64 {
    1000.0 / fps.max(1) as f64
}

/// Convert a millisecond timestamp to seconds.
pub fn ms_to_secs(ms: i64) -> f64 {
    ms as f64 / 1000.0
}
