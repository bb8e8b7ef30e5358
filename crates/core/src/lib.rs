//! Core utilities shared by the renderer crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timer
//! - Renderer configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    FogConfig, LightConfig, MapConfig, RenderConfig, RenderMode, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging, init_logging_with};
pub use timer::Timer;
