//! Mouse-following virtual camera.
//!
//! The camera eases toward the latest pointer position every output frame
//! and eases toward a click zoom while a button is held. Zoom moves at half
//! the positional rate so presses read as a gentle push-in.

use glidecast_common::clock::frame_interval_ms;
use glidecast_common::config::ExportDefaults;
use glidecast_project_model::camera::CameraFrame;
use glidecast_project_model::event::{MouseEvent, MouseEventType};
use glidecast_project_model::viewport::{Point2D, Viewport};

/// Tuning for the camera controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSettings {
    /// Fraction of the remaining distance covered per update, in `[0, 1]`.
    pub smooth_factor: f64,

    /// Zoom target while a button is held.
    pub click_zoom: f64,

    /// Zoom target otherwise.
    pub default_zoom: f64,

    /// Disable to keep the camera at `default_zoom`.
    pub zoom_on_click: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            smooth_factor: 0.15,
            click_zoom: 1.5,
            default_zoom: 1.0,
            zoom_on_click: true,
        }
    }
}

impl From<&ExportDefaults> for CameraSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            smooth_factor: defaults.smooth_factor.clamp(0.0, 1.0),
            click_zoom: defaults.click_zoom.max(0.1),
            ..Self::default()
        }
    }
}

/// Camera state: centre in source pixels and magnification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub center: Point2D,
    pub zoom: f64,
}

/// Smoothed camera following the pointer.
#[derive(Debug, Clone)]
pub struct CameraController {
    settings: CameraSettings,
    current: CameraState,
    target: CameraState,
}

impl CameraController {
    /// Camera centred on a `screen_w x screen_h` screen at default zoom.
    pub fn new(screen_w: u32, screen_h: u32, settings: CameraSettings) -> Self {
        let start = CameraState {
            center: Point2D::new(screen_w as f64 / 2.0, screen_h as f64 / 2.0),
            zoom: settings.default_zoom,
        };
        Self {
            settings,
            current: start,
            target: start,
        }
    }

    /// Retarget on an event and advance one easing step.
    pub fn update(&mut self, event: &MouseEvent) {
        self.target.center = Point2D::new(event.x as f64, event.y as f64);

        if self.settings.zoom_on_click {
            if event.event_type.is_press() {
                self.target.zoom = self.settings.click_zoom;
            } else if event.event_type.is_release() {
                self.target.zoom = self.settings.default_zoom;
            }
        }

        let f = self.settings.smooth_factor;
        self.current.center = Point2D::lerp(&self.current.center, &self.target.center, f);
        self.current.zoom += (self.target.zoom - self.current.zoom) * (f * 0.5);
    }

    pub fn state(&self) -> CameraState {
        self.current
    }

    pub fn target(&self) -> CameraState {
        self.target
    }
}

/// Sample the camera at `fps` from the first to the last event.
///
/// Each frame carries the most recent event's type and pointer position,
/// projected into output-frame space through that frame's viewport.
/// Timestamps are `start + round(i * 1000 / fps)`, skipping any that would
/// not advance.
pub fn generate_camera_path(
    events: &[MouseEvent],
    screen_w: u32,
    screen_h: u32,
    fps: u32,
    settings: CameraSettings,
) -> Vec<CameraFrame> {
    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Vec::new();
    };
    let fps = fps.max(1);

    let start_ms = first.timestamp_ms;
    let end_ms = last.timestamp_ms;
    let interval_ms = frame_interval_ms(fps);

    let mut controller = CameraController::new(screen_w, screen_h, settings);
    let mut frames = Vec::with_capacity(
        (((end_ms - start_ms).max(0) as f64 / interval_ms) as usize).saturating_add(1),
    );

    let mut next_event = 0usize;
    let mut last_ts: Option<i64> = None;
    let mut index = 0u64;
    loop {
        let timestamp_ms = start_ms + (index as f64 * interval_ms).round() as i64;
        index += 1;
        if timestamp_ms > end_ms {
            break;
        }
        if last_ts.is_some_and(|prev| timestamp_ms <= prev) {
            continue;
        }
        last_ts = Some(timestamp_ms);

        while next_event < events.len() && events[next_event].timestamp_ms <= timestamp_ms {
            controller.update(&events[next_event]);
            next_event += 1;
        }

        let state = controller.state();
        let recent = &events[next_event.saturating_sub(1)];
        let viewport = Viewport::for_frame(
            screen_w,
            screen_h,
            state.center.x,
            state.center.y,
            state.zoom,
        );
        let cursor = viewport.output_point(recent.x as f64, recent.y as f64, state.zoom);

        frames.push(CameraFrame {
            timestamp_ms,
            x: state.center.x,
            y: state.center.y,
            zoom: state.zoom,
            mouse_x: cursor.x,
            mouse_y: cursor.y,
            event_type: if next_event > 0 {
                recent.event_type.clone()
            } else {
                MouseEventType::Move
            },
        });
    }

    tracing::debug!(
        events = events.len(),
        frames = frames.len(),
        fps,
        "Generated camera path"
    );
    frames
}
