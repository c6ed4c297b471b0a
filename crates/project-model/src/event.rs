//! Mouse event types recorded during capture.
//!
//! The mouse log is a JSON array of objects, each timestamped in
//! milliseconds relative to the start of the screen recording:
//!
//! ```json
//! [{"t":0,"x":960,"y":540,"type":"move"},{"t":120,"x":961,"y":540,"type":"l_down","button":"left"}]
//! ```

use std::fmt;
use std::path::Path;

use glidecast_common::error::{GlidecastError, GlidecastResult};
use serde::{Deserialize, Serialize};

/// Milliseconds since recording start.
pub type TimestampMs = i64;

/// A single recorded mouse event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MouseEvent {
    /// Milliseconds since recording start.
    #[serde(rename = "t")]
    pub timestamp_ms: TimestampMs,

    /// Pointer position in source pixels.
    pub x: i32,
    pub y: i32,

    #[serde(rename = "type")]
    pub event_type: MouseEventType,

    /// Hold duration in milliseconds (only for `hold`).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: i64,

    /// Wheel delta (only for `scroll`).
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub delta: i32,

    /// Button identifier (`left`, `right`, `middle`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

/// Kind of mouse event.
///
/// Unknown strings are preserved as [`MouseEventType::Other`] so newer
/// capture builds do not break older exporters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MouseEventType {
    Move,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    Scroll,
    Hold,
    Other(String),
}

impl MouseEventType {
    /// Wire name of this event type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Move => "move",
            Self::LeftDown => "l_down",
            Self::LeftUp => "l_up",
            Self::RightDown => "r_down",
            Self::RightUp => "r_up",
            Self::MiddleDown => "m_down",
            Self::MiddleUp => "m_up",
            Self::Scroll => "scroll",
            Self::Hold => "hold",
            Self::Other(s) => s,
        }
    }

    /// A button is held down after this event.
    pub fn is_press(&self) -> bool {
        match self {
            Self::LeftDown | Self::RightDown | Self::MiddleDown | Self::Hold => true,
            Self::Other(s) => s.contains("down"),
            _ => false,
        }
    }

    /// A button was released by this event.
    pub fn is_release(&self) -> bool {
        match self {
            Self::LeftUp | Self::RightUp | Self::MiddleUp => true,
            Self::Other(s) => s.ends_with("_up"),
            _ => false,
        }
    }
}

impl From<String> for MouseEventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "move" => Self::Move,
            "l_down" => Self::LeftDown,
            "l_up" => Self::LeftUp,
            "r_down" => Self::RightDown,
            "r_up" => Self::RightUp,
            "m_down" => Self::MiddleDown,
            "m_up" => Self::MiddleUp,
            "scroll" => Self::Scroll,
            "hold" => Self::Hold,
            _ => Self::Other(s),
        }
    }
}

impl From<MouseEventType> for String {
    fn from(t: MouseEventType) -> Self {
        match t {
            MouseEventType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl Default for MouseEventType {
    fn default() -> Self {
        Self::Move
    }
}

impl fmt::Display for MouseEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MouseEvent {
    /// Create a pointer move event.
    pub fn moved(timestamp_ms: TimestampMs, x: i32, y: i32) -> Self {
        Self::new(timestamp_ms, x, y, MouseEventType::Move)
    }

    /// Create an event of the given type.
    pub fn new(timestamp_ms: TimestampMs, x: i32, y: i32, event_type: MouseEventType) -> Self {
        Self {
            timestamp_ms,
            x,
            y,
            event_type,
            duration: 0,
            delta: 0,
            button: None,
        }
    }
}

/// Parse a mouse log from its JSON array form.
///
/// Events are stable-sorted by timestamp; capture hooks occasionally
/// flush slightly out of order.
pub fn parse_mouse_events(json: &str) -> Result<Vec<MouseEvent>, serde_json::Error> {
    let mut events: Vec<MouseEvent> = serde_json::from_str(json)?;
    events.sort_by_key(|e| e.timestamp_ms);
    Ok(events)
}

/// Load a mouse log from disk.
pub fn load_mouse_events(path: &Path) -> GlidecastResult<Vec<MouseEvent>> {
    if !path.exists() {
        return Err(GlidecastError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    let events = parse_mouse_events(&content).map_err(|e| {
        GlidecastError::planning(format!(
            "Failed to parse mouse data {}: {e}",
            path.display()
        ))
    })?;
    tracing::debug!(path = %path.display(), events = events.len(), "Loaded mouse events");
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capture_log() {
        let raw = r#"[
            {"t":0,"x":100,"y":200,"type":"move"},
            {"t":40,"x":101,"y":200,"type":"l_down","button":"left"},
            {"t":900,"x":101,"y":200,"type":"hold","duration":860},
            {"t":950,"x":105,"y":210,"type":"l_up","button":"left"},
            {"t":1200,"x":105,"y":210,"type":"scroll","delta":-120}
        ]"#;
        let events = parse_mouse_events(raw).unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(events[1].event_type, MouseEventType::LeftDown);
        assert_eq!(events[1].button.as_deref(), Some("left"));
        assert_eq!(events[2].duration, 860);
        assert_eq!(events[4].delta, -120);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let raw = r#"[{"t":5,"x":1,"y":1,"type":"x1_down"}]"#;
        let events = parse_mouse_events(raw).unwrap();
        assert_eq!(
            events[0].event_type,
            MouseEventType::Other("x1_down".to_string())
        );
        assert!(events[0].event_type.is_press());

        let json = serde_json::to_string(&events[0]).unwrap();
        assert!(json.contains("\"type\":\"x1_down\""));
    }

    #[test]
    fn test_press_and_release_classification() {
        for t in ["l_down", "r_down", "m_down", "hold"] {
            assert!(MouseEventType::from(t.to_string()).is_press(), "{t}");
        }
        for t in ["l_up", "r_up", "m_up"] {
            let ty = MouseEventType::from(t.to_string());
            assert!(ty.is_release(), "{t}");
            assert!(!ty.is_press(), "{t}");
        }
        assert!(!MouseEventType::Move.is_press());
        assert!(!MouseEventType::Scroll.is_release());
    }

    #[test]
    fn test_parse_sorts_by_timestamp() {
        let raw = r#"[
            {"t":30,"x":3,"y":3,"type":"move"},
            {"t":10,"x":1,"y":1,"type":"move"},
            {"t":20,"x":2,"y":2,"type":"move"}
        ]"#;
        let events = parse_mouse_events(raw).unwrap();
        let ts: Vec<i64> = events.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(ts, vec![10, 20, 30]);
    }

    #[test]
    fn test_serialize_omits_empty_fields() {
        let json = serde_json::to_string(&MouseEvent::moved(7, 10, 20)).unwrap();
        assert_eq!(json, r#"{"t":7,"x":10,"y":20,"type":"move"}"#);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("glidecast_no_such_mouse.json");
        let err = load_mouse_events(&path).unwrap_err();
        assert!(matches!(err, GlidecastError::FileNotFound { .. }));
    }
}
