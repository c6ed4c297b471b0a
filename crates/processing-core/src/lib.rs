//! Glidecast Processing Core
//!
//! Turns a recorded mouse log into the camera path every export strategy
//! consumes:
//! - **Camera Path:** Smoothed camera that follows the pointer and zooms
//!   while a button is held
//! - **Planner:** The prepare/frames/save contract the export orchestrator
//!   drives, and its mouse-log implementation
//!
//! `camera_path` is pure computation; file access lives in `planner`.

pub mod camera_path;
pub mod planner;

pub use camera_path::{generate_camera_path, CameraController, CameraSettings};
pub use planner::{CameraPathPlanner, MousePathPlanner};
