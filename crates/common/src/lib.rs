//! Glidecast Common Utilities
//!
//! Shared infrastructure for all Glidecast crates:
//! - Export error taxonomy and result aliases
//! - Timing utilities that follow the tokio clock
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
