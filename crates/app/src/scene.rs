//! Demo scene: a checkered cube on a floor, circled by coloured lights.

use std::f32::consts::TAU;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use tracing::info;

use dither_assets::{MeshData, TextureData};
use dither_renderer::Renderer;
use dither_rhi::descriptor::DescriptorPool;
use dither_scene::{Material, MaterialMaps, Mesh, ObjectRegistry, Transform};

const LIGHT_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.1, 0.1),
    Vec3::new(0.1, 0.1, 1.0),
    Vec3::new(0.1, 1.0, 0.1),
    Vec3::new(1.0, 1.0, 0.1),
    Vec3::new(0.1, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];

const LIGHT_RADIUS: f32 = 0.1;

/// Per-light intensity before the global `[lights] intensity` scale.
const LIGHT_INTENSITY: f32 = 1.0;

/// Objects plus the pool their material sets came from.
///
/// Fields drop in order, so materials are released before their pool.
pub struct Scene {
    pub objects: ObjectRegistry,
    _material_pool: DescriptorPool,
}

impl Scene {
    pub fn build(renderer: &Renderer) -> Result<Self> {
        let device = renderer.device();

        let mut material_pool = renderer
            .create_material_pool(2)
            .context("Failed to create material pool")?;
        let checker = TextureData::checkerboard(64, 8, [200, 200, 200, 255], [60, 60, 70, 255])?;
        let floor_material = Arc::new(
            Material::new(
                device.clone(),
                MaterialMaps::new(&checker),
                renderer.material_layout(),
                &mut material_pool,
            )
            .context("Failed to create floor material")?,
        );
        let occlusion = edge_occlusion(64)?;
        let cube_material = Arc::new(
            Material::new(
                device.clone(),
                MaterialMaps::new(&checker).with_ao(&occlusion),
                renderer.material_layout(),
                &mut material_pool,
            )
            .context("Failed to create cube material")?,
        );

        let cube = Arc::new(Mesh::new(device.clone(), &MeshData::cube())?);
        let floor = Arc::new(Mesh::new(
            device.clone(),
            &MeshData::plane(8.0).with_color(Vec3::splat(0.8)),
        )?);

        let mut objects = ObjectRegistry::new();

        let id = objects.create(Transform::new().with_scale(Vec3::splat(0.5)));
        if let Some(object) = objects.get_mut(id) {
            object.mesh = Some(cube);
            object.material = Some(cube_material);
        }

        let id = objects.create(Transform::new().with_translation(Vec3::new(0.0, 0.5, 0.0)));
        if let Some(object) = objects.get_mut(id) {
            object.mesh = Some(floor);
            object.material = Some(floor_material);
        }

        for (i, position) in light_positions().into_iter().enumerate() {
            let id = objects.make_point_light(LIGHT_INTENSITY, LIGHT_RADIUS, LIGHT_COLORS[i]);
            if let Some(light) = objects.get_mut(id) {
                light.transform.translation = position;
            }
        }

        info!("Scene built with {} objects", objects.len());
        Ok(Self {
            objects,
            _material_pool: material_pool,
        })
    }
}

/// `(-1, -1, -1)` turned about the vertical axis in equal steps.
fn light_positions() -> [Vec3; LIGHT_COLORS.len()] {
    let count = LIGHT_COLORS.len();
    std::array::from_fn(|i| {
        let angle = i as f32 * TAU / count as f32;
        Quat::from_axis_angle(Vec3::NEG_Y, angle) * Vec3::new(-1.0, -1.0, -1.0)
    })
}

/// Fraction of a face, from each border, over which occlusion fades out.
const OCCLUSION_FADE: f32 = 0.15;

/// Occlusion map that darkens texels toward the border, so cube edges read as creases.
fn edge_occlusion(size: u32) -> dither_assets::AssetResult<TextureData> {
    let border_distance = |c: u32| {
        let t = (c as f32 + 0.5) / size as f32;
        t.min(1.0 - t)
    };
    TextureData::from_fn(size, size, |x, y| {
        let fade = (border_distance(x).min(border_distance(y)) / OCCLUSION_FADE).min(1.0);
        let value = ((0.6 + 0.4 * fade) * 255.0).round() as u8;
        [value, value, value, 255]
    })
}
