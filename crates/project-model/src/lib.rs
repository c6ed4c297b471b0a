//! Glidecast Project Model
//!
//! Defines the data contracts shared by the planner and the export pipeline:
//! - **Events:** Timestamped mouse events recorded alongside the screen capture
//! - **Camera:** The ordered camera path consumed by every export strategy
//! - **Viewport:** The source-pixel rectangle a camera frame looks at
//! - **Export:** Export configuration, preparation info, and results
//!
//! Coordinates are in source pixels unless a field says otherwise.

pub mod camera;
pub mod event;
pub mod export;
pub mod viewport;

pub use camera::*;
pub use event::*;
pub use export::*;
pub use viewport::*;
