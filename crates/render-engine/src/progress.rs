//! Progress reporting for exports.
//!
//! The software path knows exactly how many frames it has written. GPU
//! paths either read ffmpeg's own progress or fall back to
//! [`ProgressEstimator`], a logarithmic curve that approaches but never
//! reaches [`ESTIMATE_CEILING`].

use std::time::Duration;

use serde::Serialize;

use crate::session::ExportState;

/// Highest value reported before completion is confirmed.
pub const ESTIMATE_CEILING: f64 = 95.0;

/// One progress report delivered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Overall progress in `[0, 100]`.
    pub percent: f64,
    pub message: String,
    pub state: ExportState,
    pub frames_written: u64,
    pub total_frames: u64,
}

/// Time-based progress for strategies that report none.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    estimated_ms: f64,
    last: Option<f64>,
}

impl ProgressEstimator {
    pub fn new(estimated_duration: Duration) -> Self {
        Self {
            estimated_ms: estimated_duration.as_millis().max(1) as f64,
            last: None,
        }
    }

    /// `min(95, 100 * ln(elapsed + 1) / ln(estimated + 1))`.
    pub fn progress_at(&self, elapsed: Duration) -> f64 {
        let elapsed_ms = elapsed.as_millis() as f64;
        let value = 100.0 * (elapsed_ms + 1.0).ln() / (self.estimated_ms + 1.0).ln();
        value.clamp(0.0, ESTIMATE_CEILING)
    }

    /// Next value to report, or `None` when it would not exceed the last one.
    pub fn poll(&mut self, elapsed: Duration) -> Option<f64> {
        let value = self.progress_at(elapsed);
        match self.last {
            Some(last) if value <= last => None,
            _ => {
                self.last = Some(value);
                Some(value)
            }
        }
    }

    /// Status line for an estimated percentage.
    pub fn message_for(percent: f64) -> &'static str {
        if percent < 20.0 {
            "Initializing encoder"
        } else if percent < 50.0 {
            "Applying camera transform"
        } else if percent < 80.0 {
            "Encoding"
        } else {
            "Finalizing"
        }
    }
}

/// Progress callback supplied by the caller.
pub type ProgressCallback<'a> = &'a (dyn Fn(ExportProgress) + Send + Sync);

/// Delivers progress to a callback, dropping anything that would go backwards.
///
/// Intermediate values are clamped below 100. Only
/// [`ProgressReporter::complete`] emits 100, and only once.
pub struct ProgressReporter<'a> {
    callback: ProgressCallback<'a>,
    last: Option<f64>,
    completed: bool,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback,
            last: None,
            completed: false,
        }
    }

    /// Report an intermediate value. Returns whether it was delivered.
    pub fn report(
        &mut self,
        percent: f64,
        message: &str,
        state: ExportState,
        frames_written: u64,
        total_frames: u64,
    ) -> bool {
        if self.completed || !percent.is_finite() {
            return false;
        }
        let percent = percent.clamp(0.0, 99.9);
        if self.last.is_some_and(|last| percent < last) {
            return false;
        }
        self.last = Some(percent);
        (self.callback)(ExportProgress {
            percent,
            message: message.to_string(),
            state,
            frames_written,
            total_frames,
        });
        true
    }

    /// Report 100%. Later calls are ignored.
    pub fn complete(&mut self, message: &str, frames_written: u64, total_frames: u64) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.last = Some(100.0);
        (self.callback)(ExportProgress {
            percent: 100.0,
            message: message.to_string(),
            state: ExportState::Completed,
            frames_written,
            total_frames,
        });
    }

    /// Last delivered value.
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

/// Progress of the software path after `written` of `total` frames.
pub fn frame_progress(written: u64, total: u64) -> f64 {
    if total == 0 {
        return 20.0;
    }
    20.0 + 75.0 * (written.min(total) as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn estimator() -> ProgressEstimator {
        ProgressEstimator::new(Duration::from_millis(10_000))
    }

    #[test]
    fn test_estimator_starts_at_zero() {
        assert_eq!(estimator().progress_at(Duration::ZERO), 0.0);
    }

    #[test]
    fn test_estimator_caps_at_ceiling() {
        let est = estimator();
        assert_eq!(est.progress_at(Duration::from_millis(10_000)), ESTIMATE_CEILING);
        assert_eq!(est.progress_at(Duration::from_secs(3600)), ESTIMATE_CEILING);
    }

    #[test]
    fn test_estimator_grows_fast_early() {
        let est = estimator();
        // ln(1001) / ln(10001) is about 0.75
        let at_one_second = est.progress_at(Duration::from_secs(1));
        assert!(at_one_second > 70.0 && at_one_second < 80.0);
    }

    #[test]
    fn test_poll_suppresses_non_increasing_values() {
        let mut est = estimator();
        assert_eq!(est.poll(Duration::ZERO), Some(0.0));
        assert_eq!(est.poll(Duration::ZERO), None);
        let v = est.poll(Duration::from_millis(100)).unwrap();
        assert!(v > 0.0);
        assert_eq!(est.poll(Duration::from_millis(50)), None);
        assert_eq!(est.poll(Duration::from_secs(20)), Some(ESTIMATE_CEILING));
        assert_eq!(est.poll(Duration::from_secs(40)), None);
    }

    #[test]
    fn test_message_bands() {
        assert_eq!(ProgressEstimator::message_for(5.0), "Initializing encoder");
        assert_eq!(ProgressEstimator::message_for(30.0), "Applying camera transform");
        assert_eq!(ProgressEstimator::message_for(60.0), "Encoding");
        assert_eq!(ProgressEstimator::message_for(95.0), "Finalizing");
    }

    #[test]
    fn test_frame_progress_spans_20_to_95() {
        assert_eq!(frame_progress(0, 10), 20.0);
        assert_eq!(frame_progress(5, 10), 57.5);
        assert_eq!(frame_progress(10, 10), 95.0);
        assert_eq!(frame_progress(0, 0), 20.0);
    }

    #[test]
    fn test_reporter_drops_regressions_and_completes_once() {
        let seen = Mutex::new(Vec::new());
        let callback = |p: ExportProgress| seen.lock().unwrap().push(p.percent);
        let mut reporter = ProgressReporter::new(&callback);

        assert!(reporter.report(10.0, "a", ExportState::Encoding, 0, 0));
        assert!(!reporter.report(5.0, "b", ExportState::Encoding, 0, 0));
        assert!(reporter.report(10.0, "c", ExportState::Encoding, 0, 0));
        assert!(reporter.report(150.0, "d", ExportState::Encoding, 0, 0));
        reporter.complete("done", 0, 0);
        reporter.complete("done", 0, 0);
        assert!(!reporter.report(50.0, "late", ExportState::Encoding, 0, 0));

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![10.0, 10.0, 99.9, 100.0]);
    }

    proptest! {
        #[test]
        fn prop_estimator_is_monotonic_and_bounded(
            est_ms in 1u64..120_000,
            mut samples in proptest::collection::vec(0u64..1_000_000, 1..50),
        ) {
            samples.sort_unstable();
            let est = ProgressEstimator::new(Duration::from_millis(est_ms));
            let values: Vec<f64> = samples
                .iter()
                .map(|ms| est.progress_at(Duration::from_millis(*ms)))
                .collect();
            prop_assert!(values.windows(2).all(|w| w[0] <= w[1]));
            prop_assert!(values.iter().all(|v| (0.0..=ESTIMATE_CEILING).contains(v)));
        }

        #[test]
        fn prop_poll_emits_strictly_increasing(
            samples in proptest::collection::vec(0u64..50_000, 1..50),
        ) {
            let mut est = ProgressEstimator::new(Duration::from_millis(10_000));
            let emitted: Vec<f64> = samples
                .iter()
                .filter_map(|ms| est.poll(Duration::from_millis(*ms)))
                .collect();
            prop_assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
