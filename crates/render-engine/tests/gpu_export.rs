mod common;

use std::time::Duration;

use common::*;
use glidecast_common::error::ErrorKind;
use glidecast_render_engine::session::{ExportState, Strategy};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn single_shot_succeeds_after_two_transient_failures() {
    let log = Log::default();
    let behavior = Behavior {
        gpu_failures: 2,
        ..Behavior::default()
    };
    let orch = simple(&log, 30, behavior);
    let recorder = Recorder::default();

    let started = Instant::now();
    let result = orch
        .export_gpu(&export_config(), &recorder.callback())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.total_frames, None);
    assert_eq!(log.count(|e| *e == Event::Gpu("single-shot")), 3);
    assert!(started.elapsed() >= Duration::from_millis(6000));

    assert_eq!(orch.state(), ExportState::Completed);
    assert_eq!(orch.session().strategy, Some(Strategy::GpuSingleShot));
    recorder.assert_monotonic();
    assert_eq!(recorder.percents().last(), Some(&100.0));
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn segmented_flag_selects_segmented_dispatch() {
    let log = Log::default();
    let orch = simple(&log, 30, Behavior::default());
    let recorder = Recorder::default();

    let config = export_config().with_segmented(true);
    orch.export_gpu(&config, &recorder.callback()).await.unwrap();

    assert_eq!(log.count(|e| *e == Event::Gpu("segmented")), 1);
    assert_eq!(log.count(|e| *e == Event::Gpu("single-shot")), 0);
    assert_eq!(orch.session().strategy, Some(Strategy::GpuSegmented));
}

#[tokio::test(start_paused = true)]
async fn persistent_gpu_failure_keeps_its_kind() {
    let log = Log::default();
    let behavior = Behavior {
        gpu_failures: u32::MAX,
        ..Behavior::default()
    };
    let orch = simple(&log, 30, behavior);
    let recorder = Recorder::default();

    let err = orch
        .export_gpu(&export_config(), &recorder.callback())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::GpuExport);
    assert_eq!(log.gpu_calls(), 3);
    assert_eq!(orch.state(), ExportState::Failed(ErrorKind::GpuExport));
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_gpu_export_without_retrying() {
    let log = Log::default();
    let behavior = Behavior {
        gpu_duration: Duration::from_secs(60),
        ..Behavior::default()
    };
    let orch = simple(&log, 30, behavior);
    let recorder = Recorder::default();
    let callback = recorder.callback();

    let config = export_config();
    let started = Instant::now();
    let (result, ()) = tokio::join!(orch.export_gpu(&config, &callback), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        orch.cancel().await;
    });

    assert!(result.unwrap_err().is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(log.gpu_calls(), 1);
    assert!(log.count(|e| *e == Event::StopGpu) >= 1);
    assert_eq!(orch.state(), ExportState::Cancelled);
    assert_eq!(recorder.completions(), 0);
}

#[tokio::test(start_paused = true)]
async fn estimated_progress_stays_below_completion_until_done() {
    let log = Log::default();
    let behavior = Behavior {
        gpu_duration: Duration::from_secs(30),
        ..Behavior::default()
    };
    let orch = simple(&log, 30, behavior);
    let recorder = Recorder::default();

    orch.export_gpu(&export_config(), &recorder.callback())
        .await
        .unwrap();

    let percents = recorder.percents();
    recorder.assert_monotonic();
    assert!(percents.len() > 10);
    let (last, intermediate) = percents.split_last().unwrap();
    assert_eq!(*last, 100.0);
    assert!(intermediate.iter().all(|p| *p <= 95.0));
    // The estimator saturates well before the 30 s job ends.
    assert!(intermediate.contains(&95.0));
}

#[tokio::test(start_paused = true)]
async fn encoder_progress_is_preferred_over_the_estimate() {
    let log = Log::default();
    let behavior = Behavior {
        gpu_duration: Duration::from_secs(2),
        gpu_progress: Some(42.0),
        ..Behavior::default()
    };
    let orch = simple(&log, 30, behavior);
    let recorder = Recorder::default();

    orch.export_gpu(&export_config(), &recorder.callback())
        .await
        .unwrap();

    let percents = recorder.percents();
    assert!(percents.contains(&42.0));
    assert!(percents.iter().all(|p| *p == 0.0 || *p == 42.0 || *p >= 95.0));
    assert_eq!(recorder.completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn gpu_export_with_no_frames_is_a_planning_error() {
    let log = Log::default();
    let orch = simple(&log, 0, Behavior::default());
    let recorder = Recorder::default();

    let err = orch
        .export_gpu(&export_config(), &recorder.callback())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Planning);
    assert_eq!(log.gpu_calls(), 0);
}
