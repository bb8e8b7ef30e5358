//! Global descriptor set and uniform buffer, one of each per frame slot.
//!
//! Set 0 in every pipeline:
//! - binding 0: [`GlobalUbo`] (all graphics stages)
//! - binding 1: skybox cubemap (fragment)

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use dither_rhi::RhiResult;
use dither_rhi::buffer::{Buffer, BufferUsage};
use dither_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use dither_rhi::device::Device;
use dither_rhi::texture::Texture;

use crate::ubo::GlobalUbo;

const UBO_BINDING: u32 = 0;
const SKYBOX_BINDING: u32 = 1;

/// `(max_sets, pool sizes)` of the global pool for `frames_in_flight` slots.
pub fn global_pool_sizes(frames_in_flight: usize) -> (u32, [(vk::DescriptorType, u32); 2]) {
    let n = frames_in_flight as u32;
    (
        n,
        [
            (vk::DescriptorType::UNIFORM_BUFFER, n),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, n),
        ],
    )
}

struct FrameSlot {
    ubo: Buffer,
    descriptor_set: vk::DescriptorSet,
}

pub struct FrameResources {
    slots: Vec<FrameSlot>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
}

impl FrameResources {
    /// One uniform buffer and one global set per slot, each set pointing at
    /// its slot's buffer and at `skybox`.
    ///
    /// # Errors
    ///
    /// Returns an error if a buffer, the layout, the pool or a set cannot be created.
    pub fn new(device: Arc<Device>, frames_in_flight: usize, skybox: &Texture) -> RhiResult<Self> {
        let layout = DescriptorSetLayout::builder()
            .add_binding(
                UBO_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                1,
            )
            .add_binding(
                SKYBOX_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .build(device.clone())?;

        let (max_sets, sizes) = global_pool_sizes(frames_in_flight);
        let mut pool = sizes
            .iter()
            .fold(DescriptorPool::builder().max_sets(max_sets), |builder, &(kind, count)| {
                builder.pool_size(kind, count)
            })
            .build(device.clone())?;

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let ubo = Buffer::new(device.clone(), BufferUsage::Uniform, GlobalUbo::SIZE as u64)?;
            ubo.write_pod(&GlobalUbo::default())?;
            let descriptor_set = DescriptorWriter::new(&layout)
                .write_buffer(UBO_BINDING, ubo.descriptor_info())
                .write_image(SKYBOX_BINDING, skybox.descriptor_info())
                .build(&mut pool)?;
            slots.push(FrameSlot {
                ubo,
                descriptor_set,
            });
        }

        debug!("Created global descriptor sets for {} frame slot(s)", frames_in_flight);
        Ok(Self {
            slots,
            pool,
            layout,
        })
    }

    #[inline]
    pub fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    #[inline]
    pub fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.slots[slot].descriptor_set
    }

    /// Overwrite the slot's uniform buffer.
    ///
    /// The slot's fence must have been waited on, which `begin_frame` does.
    pub fn upload(&self, slot: usize, ubo: &GlobalUbo) -> RhiResult<()> {
        self.slots[slot].ubo.write_pod(ubo)
    }

    /// Sets left in the pool. Zero once every slot is allocated.
    pub fn sets_remaining(&self) -> u32 {
        self.pool.budget().sets_remaining()
    }
}
