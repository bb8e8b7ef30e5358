//! Transform component for scene objects.
//!
//! Rotation is stored as Euler angles (radians) and applied in Y-X-Z order:
//! yaw about Y, then pitch about X, then roll about Z. World space is
//! left-handed with `-Y` up.
//!
//! # Example
//!
//! ```
//! use dither_scene::Transform;
//! use glam::Vec3;
//!
//! let t = Transform::new()
//!     .with_translation(Vec3::new(0.0, 0.5, 0.0))
//!     .with_scale(Vec3::new(3.0, 1.0, 3.0));
//!
//! let world = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
//! assert!((world - Vec3::new(3.0, 0.5, 0.0)).length() < 1e-5);
//! ```

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Translation, Y-X-Z Euler rotation and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    /// Euler angles in radians, `(pitch, yaw, roll)` as `(x, y, z)`.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotation as a quaternion, `Ry * Rx * Rz`.
    pub fn orientation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// Model matrix: `translate * Ry * Rx * Rz * scale`.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation(), self.translation)
    }

    /// Inverse transpose of [`Transform::matrix`], for transforming normals.
    ///
    /// A singular transform (zero scale on any axis) yields the identity
    /// instead of NaN/Inf.
    pub fn normal_matrix(&self) -> Mat4 {
        const EPSILON: f32 = 1e-6;
        let model = self.matrix();
        if model.determinant().abs() < EPSILON {
            Mat4::IDENTITY
        } else {
            model.inverse().transpose()
        }
    }

    /// Direction the transform faces (`+Z` rotated).
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    /// Local up, which is `-Y` rotated.
    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.translation, Vec3::ZERO);
        assert_eq!(t.rotation, Vec3::ZERO);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_then_rotation_then_translation() {
        let t = Transform::new()
            .with_translation(Vec3::new(10.0, 0.0, 0.0))
            .with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0))
            .with_scale(Vec3::splat(2.0));

        let p = t.matrix().transform_point3(Vec3::X);
        // X scaled to 2, yawed 90 degrees onto -Z, then moved.
        assert_abs_diff_eq!(p, Vec3::new(10.0, 0.0, -2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_rotation_order_is_yxz() {
        let rotation = Vec3::new(0.3, 1.1, -0.4);
        let t = Transform::new().with_rotation(rotation);
        let expected = Mat4::from_rotation_y(rotation.y)
            * Mat4::from_rotation_x(rotation.x)
            * Mat4::from_rotation_z(rotation.z);
        assert_abs_diff_eq!(t.matrix(), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 2.0, 1.0));
        let expected = t.matrix().inverse().transpose();
        assert_eq!(t.normal_matrix(), expected);

        let n = t.normal_matrix().transform_vector3(Vec3::Y);
        assert_abs_diff_eq!(n, Vec3::new(0.0, 0.5, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let t = Transform::new().with_scale(Vec3::new(0.1, 0.0, 0.0));
        let normal = t.normal_matrix();
        assert_eq!(normal, Mat4::IDENTITY);
        assert!(!normal.is_nan());
    }

    #[test]
    fn test_direction_vectors() {
        let t = Transform::default();
        assert_eq!(t.forward(), Vec3::Z);
        assert_eq!(t.right(), Vec3::X);
        assert_eq!(t.up(), Vec3::NEG_Y);

        let yawed = Transform::new().with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0));
        assert_abs_diff_eq!(yawed.forward(), Vec3::X, epsilon = 1e-6);
        assert_abs_diff_eq!(yawed.right(), Vec3::NEG_Z, epsilon = 1e-6);
    }
}
