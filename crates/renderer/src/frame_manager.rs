//! Vulkan presentation backend.
//!
//! [`FrameManager`] owns the swap chain and everything that is replicated per
//! frame slot: a command buffer and a [`FrameSync`] set. It implements
//! [`PresentBackend`], so all sequencing decisions are left to the
//! [`FrameOrchestrator`](crate::orchestrator::FrameOrchestrator).
//!
//! # Synchronization
//!
//! ```text
//! acquire(slot)            wait in_flight[slot], acquire -> signals image_available[slot]
//! submit_and_present(..)   wait images_in_flight[image] (if an older slot still owns it)
//!                          images_in_flight[image] = in_flight[slot]
//!                          reset in_flight[slot], submit:
//!                              wait image_available[slot] @ COLOR_ATTACHMENT_OUTPUT
//!                              signal render_finished[slot], in_flight[slot]
//!                          present, waits render_finished[slot]
//! ```
//!
//! The swap chain may hold more images than there are frame slots. The
//! `images_in_flight` table maps each image to the fence of the slot that last
//! rendered into it and is resized whenever recreation changes the image count.
//!
//! A slot's fence is reset right before its submit. If the submit fails the
//! fence never signals again, so the backend marks itself lost and every
//! later acquire returns `ERROR_DEVICE_LOST` instead of waiting on it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use dither_rhi::{RhiError, RhiResult};
use dither_rhi::command::{CommandBuffer, CommandPool};
use dither_rhi::device::Device;
use dither_rhi::instance::Instance;
use dither_rhi::render_pass::clear_values;
use dither_rhi::swapchain::{SwapStatus, Swapchain};
use dither_rhi::sync::FrameSync;

use crate::orchestrator::PresentBackend;

/// Whether the slot fences can still be waited on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SubmitHealth {
    #[default]
    Healthy,
    /// A submit failed after its fence was reset.
    Lost(vk::Result),
}

impl SubmitHealth {
    fn check(self) -> RhiResult<()> {
        match self {
            SubmitHealth::Healthy => Ok(()),
            SubmitHealth::Lost(_) => Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)),
        }
    }

    /// Pass a submit result through, remembering a failure.
    fn record(&mut self, submitted: Result<(), vk::Result>) -> RhiResult<()> {
        if let Err(e) = submitted {
            error!("Queue submit failed, no further frames will be rendered: {}", e);
            *self = SubmitHealth::Lost(e);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Swap chain plus per-slot command buffers and sync objects.
pub struct FrameManager {
    device: Arc<Device>,
    swapchain: Swapchain,
    command_pool: CommandPool,
    command_buffers: Vec<CommandBuffer>,
    sync: Vec<FrameSync>,
    images_in_flight: Vec<vk::Fence>,
    clear_color: [f32; 4],
    health: SubmitHealth,
}

impl FrameManager {
    /// Create the swap chain for `surface` plus `frames_in_flight` slots.
    ///
    /// Every slot gets a primary command buffer and a [`FrameSync`] set whose
    /// fence starts signaled, so the first acquire of each slot does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the swap chain, the command pool, the command
    /// buffers or any sync object cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if `frames_in_flight` is zero.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        extent: vk::Extent2D,
        frames_in_flight: usize,
        clear_color: [f32; 4],
    ) -> RhiResult<Self> {
        assert!(frames_in_flight > 0, "at least one frame must be in flight");

        let swapchain = Swapchain::new(instance, device.clone(), surface, extent)?;
        let command_pool =
            CommandPool::new(device.clone(), device.queue_families().graphics)?;
        let command_buffers = command_pool.allocate(frames_in_flight as u32)?;
        let sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        let images_in_flight = vec![vk::Fence::null(); swapchain.image_count()];

        info!(
            "Frame manager: {} slot(s) over {} swap image(s)",
            frames_in_flight,
            swapchain.image_count()
        );

        Ok(Self {
            device,
            swapchain,
            command_pool,
            command_buffers,
            sync,
            images_in_flight,
            clear_color,
            health: SubmitHealth::default(),
        })
    }

    /// Swap chain the slots present to.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Device every slot's objects were created on.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Render pass every swap-chain framebuffer is compatible with.
    #[inline]
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass().handle()
    }

    /// Recording wrapper around a command buffer handed out by this backend.
    ///
    /// The wrapper does not own the handle; the slot keeps it.
    pub fn command_buffer(&self, commands: vk::CommandBuffer) -> CommandBuffer {
        CommandBuffer::from_handle(self.device.clone(), commands)
    }

    fn slot_buffer(&self, slot: usize) -> &CommandBuffer {
        &self.command_buffers[slot]
    }
}

impl PresentBackend for FrameManager {
    type Commands = vk::CommandBuffer;

    fn frames_in_flight(&self) -> usize {
        self.sync.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<(u32, SwapStatus)> {
        self.health.check()?;
        let sync = &self.sync[slot];
        sync.in_flight().wait(u64::MAX)?;
        self.swapchain.acquire_next_image(sync.image_available())
    }

    fn begin_commands(&mut self, slot: usize, _image: u32) -> RhiResult<vk::CommandBuffer> {
        let cmd = self.slot_buffer(slot);
        cmd.begin()?;
        Ok(cmd.handle())
    }

    fn begin_render_pass(&mut self, commands: vk::CommandBuffer, image: u32) {
        let cmd = self.command_buffer(commands);
        let extent = self.swapchain.extent();
        cmd.begin_render_pass(
            self.render_pass(),
            self.swapchain.framebuffer(image),
            extent,
            &clear_values(self.clear_color),
        );
        cmd.set_full_viewport(extent);
    }

    fn end_render_pass(&mut self, commands: vk::CommandBuffer) {
        self.command_buffer(commands).end_render_pass();
    }

    fn submit_and_present(&mut self, slot: usize, image: u32) -> RhiResult<SwapStatus> {
        let cmd = self.slot_buffer(slot);
        cmd.end()?;
        let command_buffers = [cmd.handle()];

        let image_slot = image as usize;
        let previous = self.images_in_flight[image_slot];
        let sync = &self.sync[slot];
        let fence = sync.in_flight();
        if previous != vk::Fence::null() && previous != fence.handle() {
            unsafe {
                self.device
                    .handle()
                    .wait_for_fences(&[previous], true, u64::MAX)?;
            }
        }
        self.images_in_flight[image_slot] = fence.handle();

        let wait_semaphores = [sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        fence.reset()?;
        let submitted = unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                fence.handle(),
            )
        };
        self.health.record(submitted)?;

        self.swapchain
            .present(self.device.present_queue(), image, sync.render_finished())
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        let old_count = self.swapchain.image_count();
        self.swapchain.recreate(extent)?;
        let new_count = self.swapchain.image_count();
        if new_count != old_count {
            debug!("Swap image count changed: {} -> {}", old_count, new_count);
        }
        // The device is idle after recreation, so no image is owned by a slot.
        self.images_in_flight.clear();
        self.images_in_flight.resize(new_count, vk::Fence::null());
        Ok(())
    }
}

impl Drop for FrameManager {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during frame manager drop: {}", e);
        }
        self.command_pool.free(&self.command_buffers);
        debug!("Frame manager destroyed");
    }
}
