//! Device-local images with a default view.
//!
//! Covers the three kinds the renderer needs: 2D color images (offscreen
//! targets, textures), depth attachments, and 6-layer cube maps.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    D2,
    /// Six square layers viewed as a cube.
    Cube,
}

impl ImageKind {
    pub fn layer_count(self) -> u32 {
        match self {
            ImageKind::D2 => 1,
            ImageKind::Cube => 6,
        }
    }

    fn view_type(self) -> vk::ImageViewType {
        match self {
            ImageKind::D2 => vk::ImageViewType::TYPE_2D,
            ImageKind::Cube => vk::ImageViewType::CUBE,
        }
    }

    fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            ImageKind::D2 => vk::ImageCreateFlags::empty(),
            ImageKind::Cube => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        }
    }
}

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub kind: ImageKind,
    pub name: &'static str,
}

impl ImageDesc {
    /// Color image that can be rendered to and sampled.
    pub fn color_target(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            kind: ImageKind::D2,
            name: "color_target",
        }
    }

    /// Depth attachment; add `SAMPLED` to `usage` to read it in a later pass.
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            kind: ImageKind::D2,
            name: "depth",
        }
    }

    /// Sampled image filled by a transfer.
    pub fn texture(extent: vk::Extent2D, format: vk::Format, kind: ImageKind) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            kind,
            name: "texture",
        }
    }

    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        if is_depth_format(self.format) {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }
}

/// A `VkImage`, its memory, and a view over all layers.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        let vk::Extent2D { width, height } = desc.extent;
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidResource(format!(
                "{} image must have a non-zero extent",
                desc.name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .flags(desc.kind.create_flags())
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(desc.kind.layer_count())
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator()?.allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.kind.view_type())
            .format(desc.format)
            .subresource_range(subresource_range(desc.aspect(), desc.kind.layer_count()));
        let view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {} image {}x{} ({:?}, {} layer(s))",
            desc.name,
            width,
            height,
            desc.format,
            desc.kind.layer_count()
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn kind(&self) -> ImageKind {
        self.desc.kind
    }

    /// Record a layout transition over all layers.
    ///
    /// Only the transitions listed in [`transition_masks`] are supported.
    pub fn transition_layout(
        &self,
        cmd: &CommandBuffer,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) -> RhiResult<()> {
        let masks = transition_masks(from, to)
            .ok_or(RhiError::UnsupportedLayoutTransition { from, to })?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(from)
            .new_layout(to)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(subresource_range(
                self.desc.aspect(),
                self.desc.kind.layer_count(),
            ))
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access);

        cmd.image_barrier(masks.src_stage, masks.dst_stage, &barrier);
        Ok(())
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} image allocation: {:?}", self.desc.name, e);
                    }
                }
                Err(e) => error!("Leaking {} image allocation: {}", self.desc.name, e),
            }
        }
    }
}

/// Access masks and pipeline stages for one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for the supported layout transitions, `None` otherwise.
pub fn transition_masks(from: vk::ImageLayout, to: vk::ImageLayout) -> Option<TransitionMasks> {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};

    let masks = match (from, to) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::TRANSFER_WRITE,
            A::SHADER_READ,
            S::TRANSFER,
            S::FRAGMENT_SHADER,
        ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::COLOR_ATTACHMENT_OUTPUT,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        (L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            A::SHADER_READ,
            S::LATE_FRAGMENT_TESTS,
            S::FRAGMENT_SHADER,
        ),
        _ => return None,
    };

    Some(TransitionMasks {
        src_access: masks.0,
        dst_access: masks.1,
        src_stage: masks.2,
        dst_stage: masks.3,
    })
}

pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Best depth format the device supports as an optimal-tiling attachment.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    device
        .find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or_else(|| RhiError::InvalidResource("no supported depth format".into()))
}

fn subresource_range(aspect: vk::ImageAspectFlags, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(layer_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_transitions() {
        let upload = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let depth_read = transition_masks(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(depth_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(depth_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        assert!(
            transition_masks(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            )
            .is_some()
        );
        assert!(
            transition_masks(
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            )
            .is_some()
        );
    }

    #[test]
    fn test_unsupported_transition_is_none() {
        assert!(
            transition_masks(
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL
            )
            .is_none()
        );
        assert!(
            transition_masks(
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR
            )
            .is_none()
        );
    }

    #[test]
    fn test_depth_format_classification() {
        assert!(is_depth_format(vk::Format::D32_SFLOAT));
        assert!(!is_depth_format(vk::Format::R8G8B8A8_UNORM));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_desc_aspect_and_layers() {
        let extent = vk::Extent2D {
            width: 320,
            height: 240,
        };
        let depth = ImageDesc::depth(extent, vk::Format::D32_SFLOAT)
            .with_usage(vk::ImageUsageFlags::SAMPLED);
        assert_eq!(depth.aspect(), vk::ImageAspectFlags::DEPTH);
        assert!(depth.usage.contains(vk::ImageUsageFlags::SAMPLED));

        let cube = ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB, ImageKind::Cube);
        assert_eq!(cube.aspect(), vk::ImageAspectFlags::COLOR);
        assert_eq!(cube.kind.layer_count(), 6);
    }
}
