//! Camera producing Vulkan clip-space matrices.
//!
//! The world is left-handed with `-Y` up, so world `+Y` maps straight onto
//! Vulkan's downward clip-space Y and no projection flip is needed. Depth
//! maps to `[0, 1]`.

use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};

/// Up direction used by [`Camera::set_view_direction`] and [`Camera::set_view_target`].
pub const WORLD_UP: Vec3 = Vec3::NEG_Y;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box projection; `top` maps to the top of the screen.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (bottom - top), 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / (far - near), 0.0),
            Vec4::new(
                -(right + left) / (right - left),
                -(bottom + top) / (bottom - top),
                -near / (far - near),
                1.0,
            ),
        );
    }

    /// # Panics
    ///
    /// Panics if `aspect` is zero.
    pub fn set_perspective_projection(&mut self, fovy: f32, aspect: f32, near: f32, far: f32) {
        assert!(aspect.abs() > f32::EPSILON, "camera aspect ratio must be non-zero");
        self.projection = Mat4::perspective_lh(fovy, aspect, near, far);
    }

    /// Look from `position` along `direction`.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let w = direction.normalize();
        let u = w.cross(up).normalize();
        let v = w.cross(u);
        self.set_view_basis(position, u, v, w);
    }

    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from a position and Y-X-Z Euler rotation, matching [`crate::Transform`].
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let orientation = Quat::from_euler(EulerRot::YXZ, rotation.y, rotation.x, rotation.z);
        self.set_view_basis(
            position,
            orientation * Vec3::X,
            orientation * Vec3::Y,
            orientation * Vec3::Z,
        );
    }

    /// `u`, `v`, `w` are the camera's right, down and forward axes in world space.
    fn set_view_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn clip(camera: &Camera, world: Vec3) -> Vec3 {
        camera
            .projection()
            .project_point3(camera.view().transform_point3(world))
    }

    #[test]
    fn test_perspective_depth_range() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(50f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        assert_abs_diff_eq!(clip(&camera, Vec3::new(0.0, 0.0, 0.1)).z, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(clip(&camera, Vec3::new(0.0, 0.0, 1000.0)).z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_world_up_is_screen_up() {
        let mut camera = Camera::new();
        camera.set_perspective_projection(1.0, 1.0, 0.1, 100.0);
        camera.set_view_direction(Vec3::ZERO, Vec3::Z, WORLD_UP);

        // Vulkan clip Y points down the screen.
        let above = clip(&camera, Vec3::new(0.0, -1.0, 5.0));
        assert!(above.y < 0.0);
        let right = clip(&camera, Vec3::new(1.0, 0.0, 5.0));
        assert!(right.x > 0.0);
    }

    #[test]
    fn test_orthographic_maps_box_to_clip() {
        let mut camera = Camera::new();
        camera.set_orthographic_projection(-2.0, 2.0, -1.0, 1.0, 0.0, 10.0);
        let p = camera.projection();
        assert_abs_diff_eq!(
            p.transform_point3(Vec3::new(-2.0, -1.0, 0.0)),
            Vec3::new(-1.0, -1.0, 0.0),
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(
            p.transform_point3(Vec3::new(2.0, 1.0, 10.0)),
            Vec3::new(1.0, 1.0, 1.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_view_target_centers_target() {
        let mut camera = Camera::new();
        let position = Vec3::new(3.0, -2.0, -4.0);
        camera.set_view_target(position, Vec3::ZERO, WORLD_UP);
        let view_space = camera.view().transform_point3(Vec3::ZERO);
        assert_abs_diff_eq!(view_space.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(view_space.y, 0.0, epsilon = 1e-5);
        assert!(view_space.z > 0.0);
        assert_abs_diff_eq!(camera.position(), position, epsilon = 1e-5);
    }

    #[test]
    fn test_inverse_view() {
        let mut camera = Camera::new();
        camera.set_view_yxz(Vec3::new(1.0, -0.5, -2.5), Vec3::new(0.2, 0.7, 0.0));
        assert_abs_diff_eq!(
            camera.view() * camera.inverse_view(),
            Mat4::IDENTITY,
            epsilon = 1e-5
        );
        assert_abs_diff_eq!(camera.position(), Vec3::new(1.0, -0.5, -2.5), epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "aspect ratio")]
    fn test_zero_aspect_panics() {
        Camera::new().set_perspective_projection(1.0, 0.0, 0.1, 10.0);
    }
}
