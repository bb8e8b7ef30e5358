//! Textured materials and their descriptor sets.
//!
//! A material's set is written once and never changes afterwards, so a
//! single set is shared by every object and every frame in flight that uses
//! the material.
//!
//! Set layout (all combined image samplers, fragment stage):
//!
//! | binding | map                | color space | when absent          |
//! |---------|--------------------|-------------|----------------------|
//! | 0       | albedo             | sRGB        | required             |
//! | 1       | normal             | linear      | flat `(0.5, 0.5, 1)` |
//! | 2       | emissive           | sRGB        | black                |
//! | 3       | ambient occlusion  | linear      | white                |
//! | 4       | metallic/roughness | linear      | `(0, 0, 0)`          |
//!
//! Absent maps are bound as 1x1 textures holding the neutral value, so every
//! binding is always valid.

use std::sync::Arc;

use ash::vk;
use dither_assets::TextureData;
use dither_rhi::RhiResult;
use dither_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorWriter,
};
use dither_rhi::device::Device;
use dither_rhi::texture::Texture;
use glam::Vec4;
use tracing::debug;

/// Combined image samplers in one material set.
pub const TEXTURES_PER_MATERIAL: u32 = 5;

const ALBEDO_BINDING: u32 = 0;
const NORMAL_BINDING: u32 = 1;
const EMISSIVE_BINDING: u32 = 2;
const AO_BINDING: u32 = 3;
const METALLIC_ROUGHNESS_BINDING: u32 = 4;

const NO_EMISSION: [u8; 4] = [0, 0, 0, 255];
const NO_OCCLUSION: [u8; 4] = [255, 255, 255, 255];
const SMOOTH_DIELECTRIC: [u8; 4] = [0, 0, 0, 255];

/// Source images of one material.
#[derive(Clone, Copy, Debug)]
pub struct MaterialMaps<'a> {
    pub albedo: &'a TextureData,
    pub normal: Option<&'a TextureData>,
    pub emissive: Option<&'a TextureData>,
    pub ao: Option<&'a TextureData>,
    /// Roughness in green, metalness in blue.
    pub metallic_roughness: Option<&'a TextureData>,
}

impl<'a> MaterialMaps<'a> {
    pub fn new(albedo: &'a TextureData) -> Self {
        Self {
            albedo,
            normal: None,
            emissive: None,
            ao: None,
            metallic_roughness: None,
        }
    }

    pub fn with_normal(mut self, normal: &'a TextureData) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_emissive(mut self, emissive: &'a TextureData) -> Self {
        self.emissive = Some(emissive);
        self
    }

    pub fn with_ao(mut self, ao: &'a TextureData) -> Self {
        self.ao = Some(ao);
        self
    }

    pub fn with_metallic_roughness(mut self, metallic_roughness: &'a TextureData) -> Self {
        self.metallic_roughness = Some(metallic_roughness);
        self
    }

    /// Which maps were provided: `(albedo, normal, emissive, ao)`.
    pub fn flags(&self) -> Vec4 {
        let flag = |present: bool| if present { 1.0 } else { 0.0 };
        Vec4::new(
            1.0,
            flag(self.normal.is_some()),
            flag(self.emissive.is_some()),
            flag(self.ao.is_some()),
        )
    }
}

pub struct Material {
    textures: [Texture; TEXTURES_PER_MATERIAL as usize],
    map_flags: Vec4,
    descriptor_set: vk::DescriptorSet,
}

impl Material {
    /// Layout every material set is allocated with (set index 1 in the opaque passes).
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be created.
    pub fn set_layout(device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        layout_builder().build(device)
    }

    /// Pool with room for exactly `material_count` material sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn pool(device: Arc<Device>, material_count: u32) -> RhiResult<DescriptorPool> {
        let (max_sets, samplers) = pool_capacity(material_count);
        DescriptorPool::builder()
            .max_sets(max_sets)
            .pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, samplers)
            .build(device)
    }

    /// Upload the maps and write a set for them.
    ///
    /// Absent maps are bound as neutral 1x1 textures and reported as off in
    /// [`Material::use_maps`].
    ///
    /// # Errors
    ///
    /// Returns an error if an upload fails or `pool` has no room for another set.
    pub fn new(
        device: Arc<Device>,
        maps: MaterialMaps<'_>,
        layout: &DescriptorSetLayout,
        pool: &mut DescriptorPool,
    ) -> RhiResult<Self> {
        let flat = TextureData::flat_normal();
        let black = TextureData::solid(NO_EMISSION);
        let white = TextureData::solid(NO_OCCLUSION);
        let smooth = TextureData::solid(SMOOTH_DIELECTRIC);

        let srgb = |data: &TextureData| {
            Texture::from_rgba8(device.clone(), data.width, data.height, &data.pixels)
        };
        let linear = |data: &TextureData| {
            Texture::from_rgba8_linear(device.clone(), data.width, data.height, &data.pixels)
        };

        let textures = [
            srgb(maps.albedo)?,
            linear(maps.normal.unwrap_or(&flat))?,
            srgb(maps.emissive.unwrap_or(&black))?,
            linear(maps.ao.unwrap_or(&white))?,
            linear(maps.metallic_roughness.unwrap_or(&smooth))?,
        ];

        let bindings = [
            ALBEDO_BINDING,
            NORMAL_BINDING,
            EMISSIVE_BINDING,
            AO_BINDING,
            METALLIC_ROUGHNESS_BINDING,
        ];
        let descriptor_set = bindings
            .iter()
            .zip(&textures)
            .fold(DescriptorWriter::new(layout), |writer, (&binding, texture)| {
                writer.write_image(binding, texture.descriptor_info())
            })
            .build(pool)?;

        let map_flags = maps.flags();
        debug!("Created material (maps: {:?})", map_flags);
        Ok(Self {
            textures,
            map_flags,
            descriptor_set,
        })
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    #[inline]
    pub fn albedo(&self) -> &Texture {
        &self.textures[ALBEDO_BINDING as usize]
    }

    /// Which maps this material provides, in push constant order
    /// `(albedo, normal, emissive, ao)`.
    pub fn use_maps(&self) -> Vec4 {
        self.map_flags
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("descriptor_set", &self.descriptor_set)
            .field("map_flags", &self.map_flags)
            .finish()
    }
}

fn layout_builder() -> DescriptorSetLayoutBuilder {
    [
        ALBEDO_BINDING,
        NORMAL_BINDING,
        EMISSIVE_BINDING,
        AO_BINDING,
        METALLIC_ROUGHNESS_BINDING,
    ]
    .into_iter()
    .fold(DescriptorSetLayout::builder(), |builder, binding| {
        builder.add_binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
            1,
        )
    })
}

/// `(max_sets, combined image samplers)` for `material_count` materials.
pub fn pool_capacity(material_count: u32) -> (u32, u32) {
    let sets = material_count.max(1);
    (sets, sets * TEXTURES_PER_MATERIAL)
}

#[cfg(test)]
mod tests {
    use dither_rhi::RhiError;
    use dither_rhi::descriptor::{PoolBudget, descriptor_demand};

    use super::*;

    const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

    #[test]
    fn test_pool_capacity() {
        assert_eq!(pool_capacity(1), (1, 5));
        assert_eq!(pool_capacity(4), (4, 20));
        // An empty pool is still a valid pool.
        assert_eq!(pool_capacity(0), (1, 5));
    }

    #[test]
    fn test_layout_declares_every_map() {
        let builder = layout_builder();
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), TEXTURES_PER_MATERIAL as usize);
        assert_eq!(descriptor_demand(bindings), vec![(SAMPLER, TEXTURES_PER_MATERIAL)]);
    }

    #[test]
    fn test_pool_fits_exactly_c_materials() {
        let demand = descriptor_demand(layout_builder().bindings());
        for count in [1, 3, 8] {
            let (max_sets, samplers) = pool_capacity(count);
            assert_eq!(samplers, count * TEXTURES_PER_MATERIAL);

            let mut budget = PoolBudget::new(max_sets, &[(SAMPLER, samplers)]);
            for _ in 0..count {
                budget.try_reserve(&demand).unwrap();
            }
            assert_eq!(budget.remaining(SAMPLER), 0);
            assert!(matches!(
                budget.try_reserve(&demand),
                Err(RhiError::SetsExhausted { .. } | RhiError::PoolExhausted { .. })
            ));
        }
    }

    #[test]
    fn test_map_flags_follow_provided_maps() {
        let albedo = TextureData::solid([255; 4]);
        let normal = TextureData::flat_normal();
        let ao = TextureData::solid([200, 200, 200, 255]);

        assert_eq!(MaterialMaps::new(&albedo).flags(), Vec4::new(1.0, 0.0, 0.0, 0.0));
        let maps = MaterialMaps::new(&albedo).with_normal(&normal).with_ao(&ao);
        assert_eq!(maps.flags(), Vec4::new(1.0, 1.0, 0.0, 1.0));

        // Metallic/roughness has no flag; its neutral texel is always safe to sample.
        let mr = TextureData::solid(SMOOTH_DIELECTRIC);
        let maps = MaterialMaps::new(&albedo).with_metallic_roughness(&mr);
        assert_eq!(maps.flags(), Vec4::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_neutral_texels() {
        assert_eq!(TextureData::solid(NO_EMISSION).texel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(TextureData::solid(NO_OCCLUSION).texel(0, 0), Some([255; 4]));
    }
}
