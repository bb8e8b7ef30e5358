//! Fixed-resolution offscreen render target.
//!
//! The target never follows the window size. The composite pass scales it up
//! by an integer factor instead, see [`upscale_factor`].

use std::sync::Arc;

use ash::vk;
use tracing::info;

use dither_rhi::RhiResult;
use dither_rhi::device::Device;
use dither_rhi::image::{Image, ImageDesc, find_depth_format};
use dither_rhi::render_pass::{Framebuffer, RenderPass, RenderPassKind};
use dither_rhi::sampler::Sampler;

/// Color format of the offscreen target.
pub const OFFSCREEN_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Largest whole-number factor by which `target` is scaled to cover `window`.
///
/// `floor(max(window.w / target.w, window.h / target.h))`, never less than 1.
pub fn upscale_factor(window: vk::Extent2D, target: vk::Extent2D) -> u32 {
    if target.width == 0 || target.height == 0 {
        return 1;
    }
    let horizontal = window.width / target.width;
    let vertical = window.height / target.height;
    horizontal.max(vertical).max(1)
}

/// Color and depth images plus the pass and framebuffer that render into them.
///
/// Both attachments end the pass in `SHADER_READ_ONLY_OPTIMAL` and are sampled
/// with [`OffscreenTarget::sampler`].
pub struct OffscreenTarget {
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    color: Image,
    depth: Image,
    sampler: Sampler,
    extent: vk::Extent2D,
}

impl OffscreenTarget {
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let depth_format = find_depth_format(&device)?;
        let color = Image::new(
            device.clone(),
            ImageDesc::color_target(extent, OFFSCREEN_COLOR_FORMAT),
        )?;
        let depth = Image::new(
            device.clone(),
            ImageDesc::depth(extent, depth_format).with_usage(vk::ImageUsageFlags::SAMPLED),
        )?;
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassKind::Offscreen,
            OFFSCREEN_COLOR_FORMAT,
            depth_format,
        )?;
        let framebuffer = Framebuffer::new(
            device.clone(),
            &render_pass,
            &[color.view(), depth.view()],
            extent,
        )?;
        let sampler = Sampler::nearest_clamp(device)?;

        info!(
            "Offscreen target: {}x{}, {:?} + {:?}",
            extent.width, extent.height, OFFSCREEN_COLOR_FORMAT, depth_format
        );
        Ok(Self {
            framebuffer,
            render_pass,
            color,
            depth,
            sampler,
            extent,
        })
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    #[inline]
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn color_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.handle())
            .image_view(self.color.view())
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    pub fn depth_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.handle())
            .image_view(self.depth.view())
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_upscale_factor() {
        let target = extent(320, 240);
        assert_eq!(upscale_factor(extent(1280, 960), target), 4);
        assert_eq!(upscale_factor(extent(1000, 700), target), 3);
        assert_eq!(upscale_factor(extent(1280, 720), target), 4);
        assert_eq!(upscale_factor(extent(640, 480), target), 2);
    }

    #[test]
    fn test_upscale_factor_never_below_one() {
        let target = extent(320, 240);
        assert_eq!(upscale_factor(extent(200, 100), target), 1);
        assert_eq!(upscale_factor(extent(0, 0), target), 1);
        assert_eq!(upscale_factor(extent(800, 600), extent(0, 240)), 1);
    }
}
