//! Renderer configuration.
//!
//! Configuration is read from an optional TOML file. Every field has a default,
//! so a partial file (or no file at all) is valid:
//!
//! ```toml
//! [window]
//! width = 1600
//! height = 900
//!
//! [render]
//! mode = "retro"
//! frames_in_flight = 3
//!
//! [fog]
//! start = 4.0
//! end = 12.0
//!
//! [maps]
//! normal = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Capacity of the point-light array in the global uniform block.
pub const MAX_POINT_LIGHTS: usize = 10;

/// Upper bound on frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Which set of render systems the renderer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Opaque objects, skybox and point-light billboards straight into the swap chain.
    #[default]
    Standard,
    /// Scene rendered into a low-resolution target and upscaled with fog.
    Retro,
}

impl std::str::FromStr for RenderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(RenderMode::Standard),
            "retro" => Ok(RenderMode::Retro),
            other => Err(Error::Config(format!("unknown render mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "dither".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub frames_in_flight: usize,
    /// Enable the Khronos validation layer.
    pub validation: bool,
    pub mode: RenderMode,
    pub clear_color: [f32; 4],
    /// Size of the low-resolution target used in retro mode.
    pub offscreen_width: u32,
    pub offscreen_height: u32,
    pub max_point_lights: usize,
    /// Directory holding compiled SPIR-V shaders.
    pub shader_dir: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            mode: RenderMode::Standard,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            offscreen_width: 320,
            offscreen_height: 240,
            max_point_lights: MAX_POINT_LIGHTS,
            shader_dir: "shaders/spirv".to_string(),
        }
    }
}

/// Distance fog applied by the retro composite pass.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FogConfig {
    pub enabled: bool,
    pub near: f32,
    pub far: f32,
    pub start: f32,
    pub end: f32,
    pub color: [f32; 3],
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            near: 0.1,
            far: 1000.0,
            start: 5.0,
            end: 10.0,
            color: [0.42, 0.42, 0.45],
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    /// Scale applied to every point light's own intensity.
    pub intensity: f32,
    /// Orbit speed of point lights, in radians per second.
    pub rotation_multiplier: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            intensity: 0.5,
            rotation_multiplier: 0.5,
        }
    }
}

/// Which material maps the opaque passes sample. A disabled map falls back
/// to its neutral value even when the material provides one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub albedo: bool,
    pub normal: bool,
    pub emissive: bool,
    pub ao: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            albedo: true,
            normal: true,
            emissive: true,
            ao: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives.
    pub filter: Option<String>,
}

/// Complete renderer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub fog: FogConfig,
    pub lights: LightConfig,
    pub maps: MapConfig,
    pub log: LogConfig,
}

impl RendererConfig {
    /// Default config file name, looked up in the working directory.
    pub const DEFAULT_PATH: &'static str = "dither.toml";

    /// Load configuration from `path`.
    ///
    /// A missing file yields the defaults. A file that exists but does not
    /// parse, or parses to invalid values, is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.render.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.render.frames_in_flight
            )));
        }
        if self.render.offscreen_width == 0 || self.render.offscreen_height == 0 {
            return Err(Error::Config("offscreen target size must be non-zero".into()));
        }
        if self.render.max_point_lights > MAX_POINT_LIGHTS {
            return Err(Error::Config(format!(
                "max_point_lights {} exceeds uniform capacity {MAX_POINT_LIGHTS}",
                self.render.max_point_lights
            )));
        }
        if self.lights.intensity.is_nan() || self.lights.intensity < 0.0 {
            return Err(Error::Config(format!(
                "light intensity must be non-negative, got {}",
                self.lights.intensity
            )));
        }
        if self.fog.start > self.fog.end {
            return Err(Error::Config(format!(
                "fog start {} is beyond fog end {}",
                self.fog.start, self.fog.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.frames_in_flight, 2);
        assert_eq!(config.render.offscreen_width, 320);
        assert_eq!(config.render.offscreen_height, 240);
        assert_eq!(config.render.mode, RenderMode::Standard);
        assert_eq!(config.fog.color, [0.42, 0.42, 0.45]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml(
            r#"
            [render]
            mode = "retro"
            frames_in_flight = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.render.mode, RenderMode::Retro);
        assert_eq!(config.render.frames_in_flight, 3);
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.fog.start, 5.0);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = RendererConfig::from_toml("[render\nmode = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_frames_in_flight_out_of_range() {
        let err = RendererConfig::from_toml("[render]\nframes_in_flight = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = RendererConfig::from_toml("[render]\nframes_in_flight = 4").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_too_many_lights_rejected() {
        let mut config = RendererConfig::default();
        config.render.max_point_lights = MAX_POINT_LIGHTS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_fog_range_rejected() {
        let mut config = RendererConfig::default();
        config.fog.start = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_map_toggles_parse() {
        let config = RendererConfig::from_toml("[maps]\nnormal = false\nao = false\n").unwrap();
        assert!(config.maps.albedo);
        assert!(!config.maps.normal);
        assert!(config.maps.emissive);
        assert!(!config.maps.ao);
        assert_eq!(RendererConfig::default().maps, MapConfig::default());
    }

    #[test]
    fn test_negative_light_intensity_rejected() {
        let err = RendererConfig::from_toml("[lights]\nintensity = -1.0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = RendererConfig::load("definitely/not/here.toml").unwrap();
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_render_mode_from_str() {
        assert_eq!("retro".parse::<RenderMode>().unwrap(), RenderMode::Retro);
        assert_eq!("standard".parse::<RenderMode>().unwrap(), RenderMode::Standard);
        assert!("ps2".parse::<RenderMode>().is_err());
    }
}
