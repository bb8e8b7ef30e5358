//! Uniform buffer and push constant layouts shared with the shaders.
//!
//! All structures are `#[repr(C)]` with explicit padding so that the Rust
//! layout matches the GLSL std140 (uniform) or std430 (push constant) layout
//! byte for byte. Each one implements `Pod` for direct upload.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

pub use dither_core::config::MAX_POINT_LIGHTS;

/// Ambient term every frame starts from: white at 2% intensity.
pub const AMBIENT_LIGHT: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.02);

/// One entry of the global point-light array.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightData {
    /// World position; `w` unused.
    pub position: Vec4,
    /// RGB color, intensity in `w`.
    pub color: Vec4,
}

impl PointLightData {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
        }
    }
}

/// Global per-frame data, binding 0 of the global set.
///
/// # Memory Layout
///
/// - Offset 0: projection
/// - Offset 64: inverse projection
/// - Offset 128: view
/// - Offset 192: inverse view
/// - Offset 256: ambient light color (rgb, intensity in `w`)
/// - Offset 272: point lights (10 x 32 bytes)
/// - Offset 592: light count
/// - Offset 600: framebuffer resolution
/// - Total size: 608 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub inverse_projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub ambient_light_color: Vec4,
    pub point_lights: [PointLightData; MAX_POINT_LIGHTS],
    pub num_lights: u32,
    pub _padding: u32,
    pub resolution: Vec2,
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            inverse_projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: AMBIENT_LIGHT,
            point_lights: [PointLightData::default(); MAX_POINT_LIGHTS],
            num_lights: 0,
            _padding: 0,
            resolution: Vec2::ZERO,
        }
    }
}

impl GlobalUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Fresh block with camera matrices and no lights.
    pub fn new(projection: Mat4, view: Mat4, inverse_view: Mat4, resolution: Vec2) -> Self {
        Self {
            projection,
            inverse_projection: projection.inverse(),
            view,
            inverse_view,
            resolution,
            ..Self::default()
        }
    }

    /// Append a light.
    ///
    /// # Panics
    ///
    /// Panics if the array already holds [`MAX_POINT_LIGHTS`] lights.
    pub fn push_light(&mut self, light: PointLightData) {
        let index = self.num_lights as usize;
        assert!(
            index < MAX_POINT_LIGHTS,
            "point light count exceeds the uniform array capacity of {MAX_POINT_LIGHTS}"
        );
        self.point_lights[index] = light;
        self.num_lights += 1;
    }

    /// Lights written so far this frame.
    pub fn lights(&self) -> &[PointLightData] {
        &self.point_lights[..self.num_lights as usize]
    }

    pub fn clear_lights(&mut self) {
        self.point_lights = [PointLightData::default(); MAX_POINT_LIGHTS];
        self.num_lights = 0;
    }
}

/// Upscale parameters for the retro composite, binding 0 of the composite set.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ScaleUbo {
    pub window_size: Vec2,
    pub scale_factor: f32,
    pub _padding: f32,
}

impl ScaleUbo {
    pub fn new(window_size: Vec2, scale_factor: u32) -> Self {
        Self {
            window_size,
            scale_factor: scale_factor as f32,
            _padding: 0.0,
        }
    }
}

/// Per-draw data for the opaque pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ObjectPush {
    pub model: Mat4,
    pub normal: Mat4,
    /// `x` albedo, `y` normal, `z` emissive, `w` ambient occlusion;
    /// 1.0 when the map should be sampled.
    pub use_maps: Vec4,
}

/// Per-light data for the billboard pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightPush {
    pub position: Vec4,
    pub color: Vec4,
    pub radius: f32,
    pub _padding: [f32; 3],
}

impl PointLightPush {
    pub fn new(position: Vec3, color: Vec3, intensity: f32, radius: f32) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(intensity),
            radius,
            _padding: [0.0; 3],
        }
    }
}

/// Per-draw data for the retro scene pass.
///
/// `viewport_size` lets the vertex shader snap positions to the low-res pixel grid.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct RetroObjectPush {
    pub model: Mat4,
    pub normal: Mat4,
    /// Same layout as [`ObjectPush::use_maps`].
    pub use_maps: Vec4,
    pub viewport_size: Vec2,
    pub _padding: [f32; 2],
}

/// Fog parameters for the composite fragment shader.
///
/// `fog_color` and `camera_position` are `vec3`s and start on 16-byte boundaries.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FogPush {
    pub fog_enabled: u32,
    pub near: f32,
    pub far: f32,
    pub fog_start: f32,
    pub fog_end: f32,
    pub _padding0: [f32; 3],
    pub fog_color: Vec3,
    pub _padding1: f32,
    pub camera_position: Vec3,
    pub _padding2: f32,
}

impl FogPush {
    pub fn new(fog: &dither_core::FogConfig, camera_position: Vec3) -> Self {
        Self {
            fog_enabled: u32::from(fog.enabled),
            near: fog.near,
            far: fog.far,
            fog_start: fog.start,
            fog_end: fog.end,
            fog_color: Vec3::from_array(fog.color),
            camera_position,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, offset_of, size_of};

    use super::*;

    #[test]
    fn test_global_ubo_layout() {
        assert_eq!(GlobalUbo::SIZE, 608);
        assert_eq!(align_of::<GlobalUbo>(), 16);
        assert_eq!(offset_of!(GlobalUbo, inverse_projection), 64);
        assert_eq!(offset_of!(GlobalUbo, view), 128);
        assert_eq!(offset_of!(GlobalUbo, inverse_view), 192);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 256);
        assert_eq!(offset_of!(GlobalUbo, point_lights), 272);
        assert_eq!(offset_of!(GlobalUbo, num_lights), 592);
        assert_eq!(offset_of!(GlobalUbo, resolution), 600);
    }

    #[test]
    fn test_push_constant_layouts() {
        assert_eq!(size_of::<PointLightData>(), 32);
        assert_eq!(size_of::<ScaleUbo>(), 16);
        assert_eq!(size_of::<ObjectPush>(), 144);
        assert_eq!(size_of::<PointLightPush>(), 48);
        assert_eq!(offset_of!(PointLightPush, radius), 32);
        assert_eq!(offset_of!(ObjectPush, use_maps), 128);
        assert_eq!(size_of::<RetroObjectPush>(), 160);
        assert_eq!(offset_of!(RetroObjectPush, use_maps), 128);
        assert_eq!(offset_of!(RetroObjectPush, viewport_size), 144);

        assert_eq!(offset_of!(FogPush, fog_end), 16);
        assert_eq!(offset_of!(FogPush, fog_color), 32);
        assert_eq!(offset_of!(FogPush, camera_position), 48);
        assert_eq!(size_of::<FogPush>(), 64);
    }

    #[test]
    fn test_global_ubo_new() {
        let projection = Mat4::perspective_lh(1.0, 1.5, 0.1, 100.0);
        let ubo = GlobalUbo::new(projection, Mat4::IDENTITY, Mat4::IDENTITY, Vec2::new(800.0, 600.0));
        assert_eq!(ubo.ambient_light_color, AMBIENT_LIGHT);
        assert_eq!(ubo.num_lights, 0);
        let product = ubo.projection * ubo.inverse_projection;
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_push_light_fills_in_order() {
        let mut ubo = GlobalUbo::default();
        for i in 0..MAX_POINT_LIGHTS {
            ubo.push_light(PointLightData::new(Vec3::splat(i as f32), Vec3::ONE, 0.5));
        }
        assert_eq!(ubo.lights().len(), MAX_POINT_LIGHTS);
        assert_eq!(ubo.lights()[3].position, Vec4::new(3.0, 3.0, 3.0, 1.0));
        assert_eq!(ubo.lights()[3].color.w, 0.5);

        ubo.clear_lights();
        assert!(ubo.lights().is_empty());
    }

    #[test]
    #[should_panic(expected = "exceeds the uniform array capacity")]
    fn test_push_light_overflow_panics() {
        let mut ubo = GlobalUbo::default();
        for _ in 0..=MAX_POINT_LIGHTS {
            ubo.push_light(PointLightData::default());
        }
    }

    #[test]
    fn test_fog_push_from_config() {
        let fog = dither_core::FogConfig::default();
        let push = FogPush::new(&fog, Vec3::new(0.0, 0.0, -2.5));
        assert_eq!(push.fog_enabled, 1);
        assert_eq!(push.fog_start, 5.0);
        assert_eq!(push.fog_end, 10.0);
        assert_eq!(push.fog_color, Vec3::new(0.42, 0.42, 0.45));
        assert_eq!(push.camera_position.z, -2.5);

        let disabled = dither_core::FogConfig {
            enabled: false,
            ..fog
        };
        assert_eq!(FogPush::new(&disabled, Vec3::ZERO).fog_enabled, 0);
    }

    #[test]
    fn test_scale_ubo_bytes() {
        let ubo = ScaleUbo::new(Vec2::new(1280.0, 960.0), 4);
        let bytes = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), 16);
        assert_eq!(ubo.scale_factor, 4.0);
    }
}
