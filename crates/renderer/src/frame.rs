//! Per-frame views handed to render systems.

use ash::vk;
use glam::Vec4;

use dither_core::{FogConfig, RendererConfig};
use dither_rhi::command::CommandBuffer;
use dither_scene::{Camera, ObjectRegistry};

use crate::ubo::GlobalUbo;

/// Settings that may change between frames without rebuilding anything.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameToggles {
    pub use_albedo_map: bool,
    pub use_normal_map: bool,
    pub use_emissive_map: bool,
    pub use_ao_map: bool,
    /// Scale on every point light's own intensity.
    pub light_intensity: f32,
    /// Orbit speed of the point lights, in radians per second.
    pub rotation_multiplier: f32,
}

impl Default for FrameToggles {
    fn default() -> Self {
        Self::from_config(&RendererConfig::default())
    }
}

impl FrameToggles {
    /// Initial values from the `[maps]` and `[lights]` sections.
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            use_albedo_map: config.maps.albedo,
            use_normal_map: config.maps.normal,
            use_emissive_map: config.maps.emissive,
            use_ao_map: config.maps.ao,
            light_intensity: config.lights.intensity,
            rotation_multiplier: config.lights.rotation_multiplier,
        }
    }

    /// Map flags in push constant order: `(albedo, normal, emissive, ao)`.
    pub fn map_mask(&self) -> Vec4 {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        Vec4::new(
            flag(self.use_albedo_map),
            flag(self.use_normal_map),
            flag(self.use_emissive_map),
            flag(self.use_ao_map),
        )
    }

    /// Flags for one draw: a map is sampled only if the material has it and
    /// it is switched on.
    pub fn use_maps(&self, material_maps: Vec4) -> Vec4 {
        material_maps * self.map_mask()
    }
}

/// Mutable view for the CPU update that runs before the global UBO is uploaded.
///
/// Lights are already orbited and packed into `ubo` when systems see it.
pub struct FrameUpdate<'a> {
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub camera: &'a Camera,
    pub objects: &'a mut ObjectRegistry,
    pub ubo: &'a mut GlobalUbo,
    pub toggles: &'a FrameToggles,
    /// Swap-chain extent.
    pub extent: vk::Extent2D,
}

/// Read-only view for command recording.
///
/// Only built between `begin_frame` and `end_frame`, so `command_buffer` is
/// always the buffer recording the current frame.
pub struct FrameContext<'a> {
    pub frame_index: usize,
    pub frame_time: f32,
    pub command_buffer: &'a CommandBuffer,
    pub camera: &'a Camera,
    pub global_descriptor_set: vk::DescriptorSet,
    pub objects: &'a ObjectRegistry,
    pub fog: &'a FogConfig,
    pub toggles: &'a FrameToggles,
    /// Swap-chain extent.
    pub extent: vk::Extent2D,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_follow_config() {
        let mut config = RendererConfig::default();
        config.maps.emissive = false;
        config.lights.intensity = 0.8;
        config.lights.rotation_multiplier = 2.0;

        let toggles = FrameToggles::from_config(&config);
        assert!(toggles.use_albedo_map);
        assert!(!toggles.use_emissive_map);
        assert_eq!(toggles.light_intensity, 0.8);
        assert_eq!(toggles.rotation_multiplier, 2.0);
        assert_eq!(toggles.map_mask(), Vec4::new(1.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn test_disabled_map_is_masked_even_when_present() {
        let toggles = FrameToggles {
            use_normal_map: false,
            ..FrameToggles::default()
        };
        let material_maps = Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert_eq!(toggles.use_maps(material_maps), Vec4::new(1.0, 0.0, 0.0, 1.0));

        // Enabling a map the material lacks does not turn it on.
        assert_eq!(FrameToggles::default().use_maps(material_maps), material_maps);
    }
}
