//! Camera path planner contract and its mouse-log implementation.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use glidecast_common::error::{GlidecastError, GlidecastResult};
use glidecast_project_model::camera::CameraPath;
use glidecast_project_model::event::{parse_mouse_events, MouseEvent};
use glidecast_project_model::export::{ExportConfig, ExportInfo};

use crate::camera_path::{generate_camera_path, CameraSettings};

/// Produces the camera path for an export.
///
/// `prepare` may be called again after a failure; a successful call
/// replaces any previously planned path.
#[async_trait]
pub trait CameraPathPlanner: Send + Sync {
    /// Load inputs and plan the camera path for `config`.
    async fn prepare(&self, config: &ExportConfig) -> GlidecastResult<ExportInfo>;

    /// The most recently planned path, in timestamp order.
    fn camera_frames(&self) -> CameraPath;

    /// Write the planned path as JSON for debugging.
    async fn save_camera_path(&self, path: &Path) -> GlidecastResult<()>;
}

/// Plans a camera path from a recorded mouse log.
#[derive(Debug, Default)]
pub struct MousePathPlanner {
    settings: CameraSettings,
    planned: Mutex<CameraPath>,
}

impl MousePathPlanner {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            planned: Mutex::new(CameraPath::default()),
        }
    }

    /// Plan from already-loaded events.
    pub fn plan_events(&self, events: &[MouseEvent], config: &ExportConfig) -> ExportInfo {
        let frames = generate_camera_path(
            events,
            config.screen_width,
            config.screen_height,
            config.fps,
            self.settings,
        );
        let path = CameraPath::new(frames);
        let info = export_info(events.len(), &path, config.fps);

        *self.planned.lock().unwrap_or_else(PoisonError::into_inner) = path;
        info
    }
}

#[async_trait]
impl CameraPathPlanner for MousePathPlanner {
    async fn prepare(&self, config: &ExportConfig) -> GlidecastResult<ExportInfo> {
        config.validate()?;

        let mouse_path = config.mouse_data_path.as_path();
        let content = tokio::fs::read_to_string(mouse_path).await.map_err(|e| {
            GlidecastError::planning(format!(
                "Failed to read mouse data {}: {e}",
                mouse_path.display()
            ))
        })?;
        let events = parse_mouse_events(&content).map_err(|e| {
            GlidecastError::planning(format!(
                "Failed to parse mouse data {}: {e}",
                mouse_path.display()
            ))
        })?;

        if let Some(parent) = config.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let info = self.plan_events(&events, config);
        tracing::info!(
            mouse_events = info.mouse_event_count,
            camera_frames = info.camera_frame_count,
            duration_ms = info.duration_ms,
            "Camera path planned"
        );
        Ok(info)
    }

    fn camera_frames(&self) -> CameraPath {
        self.planned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn save_camera_path(&self, path: &Path) -> GlidecastResult<()> {
        self.camera_frames().save_json(path)
    }
}

/// Summarize a planned path.
pub fn export_info(mouse_event_count: usize, path: &CameraPath, fps: u32) -> ExportInfo {
    let duration_ms = path.duration_ms();
    ExportInfo {
        mouse_event_count,
        camera_frame_count: path.len(),
        fps,
        duration_ms,
        estimated_frames: (duration_ms.max(0) as f64 / 1000.0 * fps as f64) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glidecast_common::error::ErrorKind;

    fn config_in(dir: &Path) -> ExportConfig {
        ExportConfig::new(
            dir.join("rec.mp4"),
            dir.join("rec.json"),
            dir.join("out").join("export.mp4"),
            1920,
            1080,
        )
    }

    #[tokio::test]
    async fn test_prepare_plans_from_mouse_log() {
        let dir = std::env::temp_dir().join("glidecast_test_planner_prepare");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("rec.json"),
            r#"[{"t":0,"x":960,"y":540,"type":"move"},{"t":500,"x":100,"y":100,"type":"l_down"},{"t":1000,"x":100,"y":100,"type":"l_up"}]"#,
        )
        .unwrap();

        let planner = MousePathPlanner::default();
        let info = planner.prepare(&config_in(&dir)).await.unwrap();

        assert_eq!(info.mouse_event_count, 3);
        assert_eq!(info.camera_frame_count, 31);
        assert_eq!(info.duration_ms, 1000);
        assert_eq!(info.estimated_frames, 30);
        assert_eq!(planner.camera_frames().len(), 31);
        assert!(dir.join("out").exists());

        let dump = dir.join("camera_path.json");
        planner.save_camera_path(&dump).await.unwrap();
        assert_eq!(CameraPath::load_json(&dump).unwrap().len(), 31);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_prepare_with_empty_log_succeeds_with_no_frames() {
        let dir = std::env::temp_dir().join("glidecast_test_planner_empty");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("rec.json"), "[]").unwrap();

        let planner = MousePathPlanner::default();
        let info = planner.prepare(&config_in(&dir)).await.unwrap();
        assert_eq!(info.camera_frame_count, 0);
        assert!(planner.camera_frames().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_new_plan_replaces_old_after_poisoned_lock() {
        let planner = MousePathPlanner::default();
        let config = config_in(Path::new("/tmp"));
        let events = parse_mouse_events(
            r#"[{"t":0,"x":960,"y":540,"type":"move"},{"t":500,"x":960,"y":540,"type":"move"}]"#,
        )
        .unwrap();

        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = planner.planned.lock().unwrap();
                    panic!("poison the plan lock");
                })
                .join()
                .unwrap_err();
        });
        assert!(planner.planned.is_poisoned());

        let info = planner.plan_events(&events, &config);
        assert!(info.camera_frame_count > 0);
        assert_eq!(planner.camera_frames().len(), info.camera_frame_count);
    }

    #[tokio::test]
    async fn test_prepare_missing_log_is_planning_error() {
        let dir = std::env::temp_dir().join("glidecast_test_planner_missing");
        let planner = MousePathPlanner::default();
        let err = planner.prepare(&config_in(&dir)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Planning);
    }

    #[tokio::test]
    async fn test_prepare_rejects_invalid_config() {
        let dir = std::env::temp_dir().join("glidecast_test_planner_invalid");
        let config = config_in(&dir).with_fps(0);
        let err = MousePathPlanner::default().prepare(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
