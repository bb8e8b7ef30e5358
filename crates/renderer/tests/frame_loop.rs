//! Frame loop driven against a simulated swap chain with per-slot fences.

use ash::vk;
use dither_renderer::{FrameOrchestrator, PresentBackend};
use dither_rhi::{RhiError, RhiResult};
use dither_rhi::swapchain::SwapStatus;

/// Swap chain whose GPU finishes a slot's work only when the slot's fence is waited on.
struct SimulatedSwapchain {
    frames_in_flight: usize,
    image_count: u32,
    next_image: u32,
    extent: vk::Extent2D,
    /// Slot has submitted work the host has not waited for.
    pending: Vec<bool>,
    /// Slot whose submission last used each image.
    image_owner: Vec<Option<usize>>,
    max_pending: usize,
    acquires: usize,
    recreations: Vec<vk::Extent2D>,
    /// Present reports out-of-date on these serial numbers of present calls.
    stale_presents: Vec<usize>,
    presents: usize,
    /// The next submit fails after the slot's fence was reset.
    fail_next_submit: bool,
    /// Slot whose fence was reset but never submitted.
    unsignaled: Option<usize>,
}

impl SimulatedSwapchain {
    fn new(frames_in_flight: usize, image_count: u32) -> Self {
        Self {
            frames_in_flight,
            image_count,
            next_image: 0,
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            pending: vec![false; frames_in_flight],
            image_owner: vec![None; image_count as usize],
            max_pending: 0,
            acquires: 0,
            recreations: Vec::new(),
            stale_presents: Vec::new(),
            presents: 0,
            fail_next_submit: false,
            unsignaled: None,
        }
    }
}

impl PresentBackend for SimulatedSwapchain {
    type Commands = usize;

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn acquire(&mut self, slot: usize) -> RhiResult<(u32, SwapStatus)> {
        if self.unsignaled.is_some() {
            return Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST));
        }
        self.acquires += 1;
        self.pending[slot] = false;

        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        if let Some(owner) = self.image_owner[image as usize] {
            self.pending[owner] = false;
        }
        Ok((image, SwapStatus::Optimal))
    }

    fn begin_commands(&mut self, slot: usize, _image: u32) -> RhiResult<usize> {
        assert!(!self.pending[slot], "slot {slot} reused while the GPU still owns it");
        Ok(100 + slot)
    }

    fn begin_render_pass(&mut self, _commands: usize, _image: u32) {}

    fn end_render_pass(&mut self, _commands: usize) {}

    fn submit_and_present(&mut self, slot: usize, image: u32) -> RhiResult<SwapStatus> {
        if std::mem::take(&mut self.fail_next_submit) {
            self.unsignaled = Some(slot);
            return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        self.pending[slot] = true;
        self.image_owner[image as usize] = Some(slot);
        self.max_pending = self.max_pending.max(self.pending.iter().filter(|p| **p).count());

        let present = self.presents;
        self.presents += 1;
        if self.stale_presents.contains(&present) {
            Ok(SwapStatus::OutOfDate)
        } else {
            Ok(SwapStatus::Optimal)
        }
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.extent = extent;
        self.next_image = 0;
        self.image_owner.iter_mut().for_each(|owner| *owner = None);
        self.recreations.push(extent);
        Ok(())
    }
}

fn run_frame(orchestrator: &mut FrameOrchestrator<SimulatedSwapchain>) -> Option<usize> {
    let frame = orchestrator.begin_frame().unwrap()?;
    assert_eq!(frame.commands(), 100 + frame.slot());
    orchestrator.begin_render_pass(&frame);
    orchestrator.end_render_pass(&frame);
    let slot = frame.slot();
    orchestrator.end_frame(frame).unwrap();
    Some(slot)
}

#[test]
fn test_pending_work_never_exceeds_frames_in_flight() {
    for (frames, images) in [(1, 3), (2, 3), (3, 2), (3, 4)] {
        let mut orchestrator = FrameOrchestrator::new(SimulatedSwapchain::new(frames, images));
        for _ in 0..50 {
            run_frame(&mut orchestrator).unwrap();
        }
        assert!(orchestrator.backend().max_pending <= frames);
        assert!(!orchestrator.is_frame_in_progress());
    }
}

#[test]
fn test_slots_rotate_in_order() {
    let mut orchestrator = FrameOrchestrator::new(SimulatedSwapchain::new(3, 3));
    let slots: Vec<usize> = (0..7).filter_map(|_| run_frame(&mut orchestrator)).collect();
    assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_resize_applies_at_frame_boundary() {
    let mut orchestrator = FrameOrchestrator::new(SimulatedSwapchain::new(2, 3));
    run_frame(&mut orchestrator);

    let frame = orchestrator.begin_frame().unwrap().unwrap();
    orchestrator.request_resize(800, 600);
    assert_eq!(orchestrator.extent().width, 1280);
    orchestrator.begin_render_pass(&frame);
    orchestrator.end_render_pass(&frame);
    orchestrator.end_frame(frame).unwrap();

    assert_eq!(
        orchestrator.extent(),
        vk::Extent2D {
            width: 800,
            height: 600
        }
    );
    assert_eq!(orchestrator.backend().recreations.len(), 1);
}

#[test]
fn test_minimized_window_skips_until_restored() {
    let mut orchestrator = FrameOrchestrator::new(SimulatedSwapchain::new(2, 3));
    run_frame(&mut orchestrator);
    orchestrator.request_resize(0, 0);
    let acquires = orchestrator.backend().acquires;

    for _ in 0..5 {
        assert!(run_frame(&mut orchestrator).is_none());
    }
    assert_eq!(orchestrator.backend().acquires, acquires);

    orchestrator.request_resize(1024, 768);
    assert!(run_frame(&mut orchestrator).is_some());
    assert_eq!(orchestrator.extent().width, 1024);
}

#[test]
fn test_stale_present_recreates_and_keeps_rotating() {
    let mut backend = SimulatedSwapchain::new(2, 3);
    backend.stale_presents = vec![2, 5];
    let mut orchestrator = FrameOrchestrator::new(backend);

    let slots: Vec<usize> = (0..8).filter_map(|_| run_frame(&mut orchestrator)).collect();
    assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1]);
    assert_eq!(orchestrator.backend().recreations.len(), 2);
    assert!(orchestrator.backend().max_pending <= 2);
}

#[test]
fn test_failed_submit_fails_later_frames_without_waiting() {
    let mut orchestrator = FrameOrchestrator::new(SimulatedSwapchain::new(2, 3));
    run_frame(&mut orchestrator).unwrap();
    orchestrator.backend_mut().fail_next_submit = true;

    let frame = orchestrator.begin_frame().unwrap().unwrap();
    orchestrator.begin_render_pass(&frame);
    orchestrator.end_render_pass(&frame);
    assert!(orchestrator.end_frame(frame).is_err());
    assert!(!orchestrator.is_frame_in_progress());
    assert_eq!(orchestrator.backend().unsignaled, Some(1));

    let acquires = orchestrator.backend().acquires;
    for _ in 0..3 {
        assert!(matches!(
            orchestrator.begin_frame(),
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
    }
    assert_eq!(orchestrator.backend().acquires, acquires);
}
