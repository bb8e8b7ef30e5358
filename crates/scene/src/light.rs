//! Point light component.

/// Marks a scene object as a point light.
///
/// Position comes from the object's translation, color from the object's
/// color, and the billboard radius from `transform.scale.x`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLightComponent {
    pub intensity: f32,
}

impl Default for PointLightComponent {
    fn default() -> Self {
        Self { intensity: 1.0 }
    }
}
