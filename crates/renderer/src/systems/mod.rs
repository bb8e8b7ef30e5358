//! Render systems.
//!
//! Each system owns one pipeline layout and the pipeline(s) built from it, and
//! reads the shared per-frame data through [`FrameContext`]. The renderer runs
//! them in a fixed order every frame:
//!
//! 1. [`RenderSystem::begin_frame`] for every system, after lights are packed
//!    and before the global UBO upload
//! 2. [`RenderSystem::record_offscreen`], outside the swap-chain render pass
//! 3. [`RenderSystem::record`], inside the swap-chain render pass

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use dither_rhi::descriptor::DescriptorSetLayout;
use dither_rhi::device::Device;
use dither_rhi::{RhiError, RhiResult};

use crate::frame::{FrameContext, FrameUpdate};

mod point_light;
mod retro;
mod simple;
mod skybox;

pub use point_light::{PointLightSystem, light_draw_order};
pub use retro::RetroRenderSystem;
pub use simple::SimpleRenderSystem;
pub use skybox::SkyboxSystem;

pub trait RenderSystem {
    fn name(&self) -> &'static str;

    /// CPU-side update. Runs before the global UBO is uploaded, so changes
    /// to `frame.ubo` here are visible to every pass.
    fn begin_frame(&mut self, _frame: &mut FrameUpdate<'_>) -> RhiResult<()> {
        Ok(())
    }

    /// Commands recorded before the swap-chain render pass begins.
    fn record_offscreen(&self, _frame: &FrameContext<'_>) {}

    /// Commands recorded inside the swap-chain render pass.
    fn record(&self, frame: &FrameContext<'_>);
}

/// What every system needs to build its pipelines.
pub struct SystemInit<'a> {
    pub device: Arc<Device>,
    pub shader_dir: &'a Path,
    /// Swap-chain render pass.
    pub render_pass: vk::RenderPass,
    pub global_layout: &'a DescriptorSetLayout,
    pub material_layout: &'a DescriptorSetLayout,
}

/// Fail early when `T` does not fit the device's push constant budget.
pub(crate) fn check_push_constants<T>(device: &Device, system: &str) -> RhiResult<()> {
    let size = std::mem::size_of::<T>() as u32;
    let limit = device.info().properties.limits.max_push_constants_size;
    if size > limit {
        return Err(RhiError::PipelineError(format!(
            "{system}: {size} bytes of push constants exceed the device limit of {limit}"
        )));
    }
    Ok(())
}
