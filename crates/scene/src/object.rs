//! Scene objects and the registry that owns them.

use std::collections::BTreeMap;
use std::sync::Arc;

use glam::Vec3;

use crate::light::PointLightComponent;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::transform::Transform;

/// Stable object identifier. Assigned in creation order and never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything placed in the world: a mesh, a light, or both.
///
/// Meshes and materials are reference counted so several objects can share them.
#[derive(Clone, Debug)]
pub struct GameObject {
    id: ObjectId,
    pub transform: Transform,
    pub color: Vec3,
    pub mesh: Option<Arc<Mesh>>,
    pub material: Option<Arc<Material>>,
    pub point_light: Option<PointLightComponent>,
}

impl GameObject {
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// True when the opaque passes can draw this object.
    pub fn is_renderable(&self) -> bool {
        self.mesh.is_some() && self.material.is_some()
    }
}

/// Owns every [`GameObject`] in the scene, iterated in ID order.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    objects: BTreeMap<ObjectId, GameObject>,
    next_id: u32,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty object (white, no mesh, no light).
    pub fn create(&mut self, transform: Transform) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            GameObject {
                id,
                transform,
                color: Vec3::ONE,
                mesh: None,
                material: None,
                point_light: None,
            },
        );
        id
    }

    /// Add a point light. `radius` is stored in `transform.scale.x`.
    pub fn make_point_light(&mut self, intensity: f32, radius: f32, color: Vec3) -> ObjectId {
        let mut transform = Transform::default();
        transform.scale.x = radius;
        let id = self.create(transform);
        if let Some(object) = self.objects.get_mut(&id) {
            object.color = color;
            object.point_light = Some(PointLightComponent { intensity });
        }
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut GameObject> {
        self.objects.get_mut(&id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<GameObject> {
        self.objects.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.objects.values_mut()
    }

    /// Objects carrying a [`PointLightComponent`].
    pub fn point_lights(&self) -> impl Iterator<Item = &GameObject> {
        self.iter().filter(|o| o.point_light.is_some())
    }

    pub fn point_lights_mut(&mut self) -> impl Iterator<Item = &mut GameObject> {
        self.iter_mut().filter(|o| o.point_light.is_some())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic_and_not_reused() {
        let mut registry = ObjectRegistry::new();
        let a = registry.create(Transform::default());
        let b = registry.create(Transform::default());
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);

        assert!(registry.remove(b).is_some());
        let c = registry.create(Transform::default());
        assert_eq!(c.raw(), 2);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(b).is_none());
    }

    #[test]
    fn test_make_point_light() {
        let mut registry = ObjectRegistry::new();
        registry.create(Transform::default());
        let light = registry.make_point_light(0.5, 0.1, Vec3::new(1.0, 0.1, 0.1));

        let object = registry.get(light).unwrap();
        assert_eq!(object.id(), light);
        assert_eq!(object.transform.scale.x, 0.1);
        assert_eq!(object.color, Vec3::new(1.0, 0.1, 0.1));
        assert_eq!(object.point_light, Some(PointLightComponent { intensity: 0.5 }));
        assert!(!object.is_renderable());

        let lights: Vec<ObjectId> = registry.point_lights().map(|o| o.id()).collect();
        assert_eq!(lights, vec![light]);
    }

    #[test]
    fn test_iteration_follows_creation_order() {
        let mut registry = ObjectRegistry::new();
        let ids: Vec<ObjectId> = (0..5)
            .map(|i| registry.create(Transform::new().with_translation(Vec3::splat(i as f32))))
            .collect();
        let seen: Vec<ObjectId> = registry.iter().map(|o| o.id()).collect();
        assert_eq!(seen, ids);

        for object in registry.iter_mut() {
            object.transform.translation.y += 1.0;
        }
        let first = registry.get(ids[0]).unwrap();
        assert_eq!(first.transform.translation, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_point_lights_mut() {
        let mut registry = ObjectRegistry::new();
        let light = registry.make_point_light(1.0, 0.2, Vec3::ONE);
        registry.create(Transform::default());
        for object in registry.point_lights_mut() {
            object.transform.translation = Vec3::X;
        }
        assert_eq!(registry.get(light).unwrap().transform.translation, Vec3::X);
        assert_eq!(registry.point_lights().count(), 1);
    }
}
