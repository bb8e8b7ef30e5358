//! Frame lifecycle state machine.
//!
//! [`FrameOrchestrator`] drives one frame at a time through
//!
//! ```text
//! Idle --begin_frame--> InProgress --begin_render_pass--> InPass
//!  ^                        ^                               |
//!  |                        +-------end_render_pass---------+
//!  +---------end_frame------+
//! ```
//!
//! and owns the policy for swap-chain staleness: an out-of-date acquire
//! recreates and skips the frame, a suboptimal acquire finishes the frame
//! and recreates afterwards, and a stale present or a pending resize
//! recreates at `end_frame`.
//!
//! The GPU side sits behind [`PresentBackend`], so the protocol can be
//! exercised without a device.
//!
//! # Frame tokens
//!
//! `begin_frame` hands out an [`ActiveFrame`] which is the only way to reach
//! the frame's command buffer. `end_frame` consumes it. Passing a token that
//! does not belong to the frame in progress is a contract violation and
//! panics.

use std::fmt::Debug;

use ash::vk;
use tracing::{debug, info, trace};

use dither_rhi::RhiResult;
use dither_rhi::swapchain::SwapStatus;

/// Presentation engine the orchestrator drives.
///
/// `slot` is the frame slot in `0..frames_in_flight()`, `image` a swap-chain
/// image index returned by [`PresentBackend::acquire`].
pub trait PresentBackend {
    /// Handle of a recording command buffer.
    type Commands: Copy + Eq + Debug;

    fn frames_in_flight(&self) -> usize;

    /// Current presentable extent.
    fn extent(&self) -> vk::Extent2D;

    /// Wait until `slot` is free on the GPU, then acquire the next image.
    fn acquire(&mut self, slot: usize) -> RhiResult<(u32, SwapStatus)>;

    /// Start recording the slot's command buffer.
    fn begin_commands(&mut self, slot: usize, image: u32) -> RhiResult<Self::Commands>;

    /// Begin the presentation render pass on `image`, clear it and set a
    /// full-extent viewport and scissor.
    fn begin_render_pass(&mut self, commands: Self::Commands, image: u32);

    fn end_render_pass(&mut self, commands: Self::Commands);

    /// Finish recording, submit, and queue `image` for presentation.
    fn submit_and_present(&mut self, slot: usize, image: u32) -> RhiResult<SwapStatus>;

    /// Rebuild the swap chain for `extent`.
    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()>;
}

/// Token for the frame between `begin_frame` and `end_frame`.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveFrame<C> {
    slot: usize,
    serial: u64,
    image_index: u32,
    commands: C,
}

impl<C: Copy> ActiveFrame<C> {
    /// Frame slot, in `0..frames_in_flight`.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Number of frames begun before this one.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Swap-chain image this frame renders into and presents.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Command buffer recording this frame.
    #[inline]
    pub fn commands(&self) -> C {
        self.commands
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState<C> {
    Idle,
    InProgress {
        serial: u64,
        commands: C,
        in_render_pass: bool,
    },
}

/// Drives a [`PresentBackend`] one frame at a time. See the module docs for
/// the state machine.
pub struct FrameOrchestrator<B: PresentBackend> {
    backend: B,
    state: FrameState<B::Commands>,
    frame_index: usize,
    next_serial: u64,
    /// Size the window wants. Diverges from the backend extent until recreation.
    window_extent: vk::Extent2D,
    resize_requested: bool,
    recreate_after_frame: bool,
}

impl<B: PresentBackend> FrameOrchestrator<B> {
    /// Take over `backend`, idle and at slot 0.
    ///
    /// The window is assumed to match the backend's current extent until
    /// [`FrameOrchestrator::request_resize`] says otherwise.
    pub fn new(backend: B) -> Self {
        let window_extent = backend.extent();
        info!(
            "Frame orchestrator: {} frame(s) in flight, {}x{}",
            backend.frames_in_flight(),
            window_extent.width,
            window_extent.height
        );
        Self {
            backend,
            state: FrameState::Idle,
            frame_index: 0,
            next_serial: 0,
            window_extent,
            resize_requested: false,
            recreate_after_frame: false,
        }
    }

    /// Start a frame.
    ///
    /// Returns `None` when nothing should be drawn this tick: the window has
    /// no area, or the swap chain was out of date and has just been rebuilt.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin_frame(&mut self) -> RhiResult<Option<ActiveFrame<B::Commands>>> {
        assert!(
            self.state == FrameState::Idle,
            "begin_frame called while a frame is already in progress"
        );

        if is_zero_area(self.window_extent) {
            trace!("Window has no area, skipping frame");
            return Ok(None);
        }

        let slot = self.frame_index;
        let (image_index, status) = self.backend.acquire(slot)?;
        match status {
            SwapStatus::OutOfDate => {
                debug!("Swap chain out of date on acquire");
                self.recreate()?;
                return Ok(None);
            }
            SwapStatus::Suboptimal => {
                debug!("Swap chain suboptimal on acquire, recreating after this frame");
                self.recreate_after_frame = true;
            }
            SwapStatus::Optimal => {}
        }

        let commands = self.backend.begin_commands(slot, image_index)?;
        let serial = self.next_serial;
        self.next_serial += 1;
        self.state = FrameState::InProgress {
            serial,
            commands,
            in_render_pass: false,
        };

        Ok(Some(ActiveFrame {
            slot,
            serial,
            image_index,
            commands,
        }))
    }

    /// # Panics
    ///
    /// Panics if `frame` is not the frame in progress or the pass is already open.
    pub fn begin_render_pass(&mut self, frame: &ActiveFrame<B::Commands>) {
        let in_render_pass = self.check_token(frame, "begin_render_pass");
        assert!(
            !in_render_pass,
            "begin_render_pass called while the render pass is already open"
        );
        self.backend
            .begin_render_pass(frame.commands, frame.image_index);
        self.set_in_render_pass(true);
    }

    /// # Panics
    ///
    /// Panics if `frame` is not the frame in progress or no pass is open.
    pub fn end_render_pass(&mut self, frame: &ActiveFrame<B::Commands>) {
        let in_render_pass = self.check_token(frame, "end_render_pass");
        assert!(
            in_render_pass,
            "end_render_pass called without an open render pass"
        );
        self.backend.end_render_pass(frame.commands);
        self.set_in_render_pass(false);
    }

    /// Submit and present, then advance to the next frame slot.
    ///
    /// The slot advances even when presentation reports a stale swap chain.
    ///
    /// # Panics
    ///
    /// Panics if `frame` is not the frame in progress or its render pass is still open.
    pub fn end_frame(&mut self, frame: ActiveFrame<B::Commands>) -> RhiResult<()> {
        let in_render_pass = self.check_token(&frame, "end_frame");
        assert!(
            !in_render_pass,
            "end_frame called before end_render_pass"
        );

        let presented = self
            .backend
            .submit_and_present(frame.slot, frame.image_index);
        self.state = FrameState::Idle;
        self.frame_index = (self.frame_index + 1) % self.backend.frames_in_flight();
        let status = presented?;

        if status.needs_recreate() || self.recreate_after_frame || self.resize_requested {
            debug!(
                "Recreating after frame (present: {:?}, resize requested: {})",
                status, self.resize_requested
            );
            self.recreate()?;
        }
        Ok(())
    }

    /// Record a new window size. The swap chain follows at the next opportunity.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        let extent = vk::Extent2D { width, height };
        if extent != self.window_extent {
            debug!("Resize requested: {}x{}", width, height);
            self.window_extent = extent;
            self.resize_requested = true;
        }
    }

    fn recreate(&mut self) -> RhiResult<()> {
        if is_zero_area(self.window_extent) {
            // Retried once the window has an area again.
            self.resize_requested = true;
            return Ok(());
        }
        self.backend.recreate(self.window_extent)?;
        self.resize_requested = false;
        self.recreate_after_frame = false;
        let extent = self.backend.extent();
        info!("Swap chain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Returns whether the render pass is open.
    fn check_token(&self, frame: &ActiveFrame<B::Commands>, call: &str) -> bool {
        match self.state {
            FrameState::Idle => panic!("{call} called without a frame in progress"),
            FrameState::InProgress {
                serial,
                commands,
                in_render_pass,
            } => {
                assert!(
                    frame.serial == serial && frame.commands == commands,
                    "{call}: command buffer {:?} does not belong to the current frame",
                    frame.commands
                );
                in_render_pass
            }
        }
    }

    fn set_in_render_pass(&mut self, open: bool) {
        if let FrameState::InProgress { in_render_pass, .. } = &mut self.state {
            *in_render_pass = open;
        }
    }

    /// Frame slot the next (or current) frame uses.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Whether a frame was begun and not yet ended.
    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Number of frame slots the backend was created with.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.backend.frames_in_flight()
    }

    /// Extent of the swap chain images being rendered.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.backend.extent()
    }

    /// Width over height of the swap-chain extent, or `1.0` when it has no height.
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    /// Shared backend access. Safe mid-frame; nothing here changes state.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend access, only between frames.
    ///
    /// # Panics
    ///
    /// Panics if a frame is in progress.
    pub fn backend_mut(&mut self) -> &mut B {
        assert!(
            self.state == FrameState::Idle,
            "backend_mut called while a frame is in progress"
        );
        &mut self.backend
    }
}

fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
