//! Per-frame global data: camera matrices and point lights.
//!
//! Built once per frame before any render system runs, so every mode sees
//! the same lights whatever systems it is made of.

use glam::{Quat, Vec2, Vec3};
use tracing::trace;

use dither_scene::{Camera, GameObject, ObjectRegistry};

use crate::frame::FrameToggles;
use crate::ubo::{GlobalUbo, PointLightData};

/// Rotate `position` about the world up axis (through the origin) by `angle` radians.
pub fn orbit_y(position: Vec3, angle: f32) -> Vec3 {
    Quat::from_axis_angle(Vec3::NEG_Y, angle) * position
}

/// Write every light in `objects` into `ubo`, replacing last frame's lights.
///
/// Each light's intensity is multiplied by `intensity_scale`.
///
/// # Panics
///
/// Panics if there are more than `max_lights` lights.
pub fn pack_lights<'a>(
    objects: impl Iterator<Item = &'a GameObject>,
    max_lights: usize,
    intensity_scale: f32,
    ubo: &mut GlobalUbo,
) {
    ubo.clear_lights();
    for object in objects {
        let Some(light) = &object.point_light else {
            continue;
        };
        assert!(
            (ubo.num_lights as usize) < max_lights,
            "point light count exceeds the configured maximum of {max_lights}"
        );
        ubo.push_light(PointLightData::new(
            object.transform.translation,
            object.color,
            light.intensity * intensity_scale,
        ));
    }
}

/// Advance the light orbit by `frame_time` and build the frame's global block.
///
/// `resolution` is the swap-chain size in pixels.
///
/// # Panics
///
/// Panics if `objects` holds more than `max_point_lights` lights.
pub fn prepare_frame_ubo(
    objects: &mut ObjectRegistry,
    camera: &Camera,
    resolution: Vec2,
    frame_time: f32,
    toggles: &FrameToggles,
    max_point_lights: usize,
) -> GlobalUbo {
    let angle = frame_time * toggles.rotation_multiplier;
    for object in objects.point_lights_mut() {
        object.transform.translation = orbit_y(object.transform.translation, angle);
    }

    let mut ubo = GlobalUbo::new(
        camera.projection(),
        camera.view(),
        camera.inverse_view(),
        resolution,
    );
    pack_lights(objects.iter(), max_point_lights, toggles.light_intensity, &mut ubo);
    trace!("Packed {} point light(s)", ubo.num_lights);
    ubo
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use dither_scene::Transform;
    use glam::Mat4;

    use super::*;
    use crate::ubo::MAX_POINT_LIGHTS;

    fn horizontal_radius(v: Vec3) -> f32 {
        Vec3::new(v.x, 0.0, v.z).length()
    }

    fn lit_scene(lights: usize) -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.create(Transform::default());
        for i in 0..lights {
            let id = registry.make_point_light(1.0, 0.1, Vec3::new(1.0, 0.1, 0.1));
            if let Some(object) = registry.get_mut(id) {
                object.transform.translation = Vec3::new(-1.0, -1.0, -1.0 - i as f32);
            }
        }
        registry
    }

    #[test]
    fn test_orbit_preserves_height_and_radius() {
        let start = Vec3::new(-1.0, -1.0, -1.0);
        let moved = orbit_y(start, 0.7);
        assert_abs_diff_eq!(moved.y, start.y, epsilon = 1e-6);
        assert_abs_diff_eq!(horizontal_radius(moved), horizontal_radius(start), epsilon = 1e-6);
        assert_abs_diff_eq!(orbit_y(start, std::f32::consts::TAU), start, epsilon = 1e-5);
        assert_abs_diff_eq!(orbit_y(start, 0.0), start, epsilon = 1e-6);
    }

    #[test]
    fn test_pack_lights_uses_object_color_and_scaled_intensity() {
        let mut registry = ObjectRegistry::new();
        registry.create(Transform::default());
        let light = registry.make_point_light(0.5, 0.1, Vec3::new(1.0, 0.1, 0.1));
        if let Some(object) = registry.get_mut(light) {
            object.transform.translation = Vec3::new(1.0, -1.0, 2.0);
        }

        let mut ubo = GlobalUbo::default();
        pack_lights(registry.iter(), MAX_POINT_LIGHTS, 1.0, &mut ubo);
        assert_eq!(ubo.num_lights, 1);
        let packed = ubo.lights()[0];
        assert_eq!(packed.position.truncate(), Vec3::new(1.0, -1.0, 2.0));
        assert_eq!(packed.color.truncate(), Vec3::new(1.0, 0.1, 0.1));
        assert_eq!(packed.color.w, 0.5);

        // Repacking replaces rather than appends.
        pack_lights(registry.iter(), MAX_POINT_LIGHTS, 0.5, &mut ubo);
        assert_eq!(ubo.num_lights, 1);
        assert_eq!(ubo.lights()[0].color.w, 0.25);
    }

    #[test]
    #[should_panic(expected = "exceeds the configured maximum")]
    fn test_pack_lights_overflow_panics() {
        let registry = lit_scene(4);
        pack_lights(registry.iter(), 3, 1.0, &mut GlobalUbo::default());
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_pack_lights_beyond_uniform_capacity_panics() {
        let registry = lit_scene(MAX_POINT_LIGHTS + 1);
        pack_lights(registry.iter(), MAX_POINT_LIGHTS, 1.0, &mut GlobalUbo::default());
    }

    #[test]
    fn test_prepare_frame_ubo_packs_lights_and_camera() {
        let mut registry = lit_scene(6);
        let mut camera = Camera::new();
        camera.set_perspective_projection(1.0, 4.0 / 3.0, 0.1, 100.0);
        camera.set_view_yxz(Vec3::new(0.0, 0.0, -2.5), Vec3::ZERO);
        let toggles = FrameToggles {
            light_intensity: 0.5,
            ..FrameToggles::default()
        };

        let ubo = prepare_frame_ubo(
            &mut registry,
            &camera,
            Vec2::new(320.0, 240.0),
            0.0,
            &toggles,
            MAX_POINT_LIGHTS,
        );
        assert_eq!(ubo.num_lights, 6);
        assert!(ubo.lights().iter().all(|light| light.color.w == 0.5));
        assert_eq!(ubo.resolution, Vec2::new(320.0, 240.0));
        assert_eq!(ubo.view, camera.view());
        assert!((ubo.projection * ubo.inverse_projection).abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_prepare_frame_ubo_orbits_by_frame_time() {
        let mut registry = lit_scene(1);
        let toggles = FrameToggles {
            rotation_multiplier: 2.0,
            ..FrameToggles::default()
        };
        let start = Vec3::new(-1.0, -1.0, -1.0);

        let ubo = prepare_frame_ubo(&mut registry, &Camera::new(), Vec2::ONE, 0.25, &toggles, 1);
        let expected = orbit_y(start, 0.5);
        assert_abs_diff_eq!(ubo.lights()[0].position.truncate(), expected, epsilon = 1e-6);
        let moved = registry.point_lights().next().map(|l| l.transform.translation);
        assert_abs_diff_eq!(moved.unwrap(), expected, epsilon = 1e-6);

        // A stopped orbit leaves the lights in place.
        let still = FrameToggles {
            rotation_multiplier: 0.0,
            ..toggles
        };
        let ubo = prepare_frame_ubo(&mut registry, &Camera::new(), Vec2::ONE, 1.0, &still, 1);
        assert_abs_diff_eq!(ubo.lights()[0].position.truncate(), expected, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "exceeds the configured maximum of 2")]
    fn test_prepare_frame_ubo_rejects_too_many_lights() {
        let mut registry = lit_scene(3);
        prepare_frame_ubo(
            &mut registry,
            &Camera::new(),
            Vec2::ONE,
            0.016,
            &FrameToggles::default(),
            2,
        );
    }
}
