//! One frame, from acquire to present.
//!
//! [`draw_frame`] fixes the order of a frame's steps over any
//! [`PresentBackend`]; what gets recorded is supplied through [`FramePasses`].
//! The global block is built by [`prepare_frame_ubo`] before any pass runs,
//! so lights reach the shaders whatever passes are installed.

use ash::vk;
use glam::Vec2;

use dither_rhi::RhiResult;
use dither_scene::{Camera, ObjectRegistry};

use crate::frame::{FrameToggles, FrameUpdate};
use crate::frame_data::prepare_frame_ubo;
use crate::orchestrator::{ActiveFrame, FrameOrchestrator, PresentBackend};
use crate::ubo::GlobalUbo;

/// Scene state a frame is drawn from.
pub struct FrameInputs<'a> {
    pub camera: &'a Camera,
    pub objects: &'a mut ObjectRegistry,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub toggles: &'a FrameToggles,
    pub max_point_lights: usize,
}

/// Read-only scene state while commands are recorded.
pub struct FrameView<'a> {
    pub camera: &'a Camera,
    pub objects: &'a ObjectRegistry,
    pub frame_time: f32,
    pub toggles: &'a FrameToggles,
    /// Swap-chain extent.
    pub extent: vk::Extent2D,
}

/// Work done inside one frame.
pub trait FramePasses<B: PresentBackend> {
    /// CPU updates and uploads. `update.ubo` already holds this frame's
    /// camera and lights; passes may amend it before it is uploaded.
    fn prepare(&mut self, update: &mut FrameUpdate<'_>) -> RhiResult<()>;

    /// Commands recorded before the presentation render pass begins.
    fn record_offscreen(
        &mut self,
        _backend: &B,
        _frame: &ActiveFrame<B::Commands>,
        _view: &FrameView<'_>,
    ) {
    }

    /// Commands recorded inside the presentation render pass.
    fn record(&mut self, backend: &B, frame: &ActiveFrame<B::Commands>, view: &FrameView<'_>);
}

/// Draw one frame.
///
/// Returns the global block the frame was drawn with, or `None` when the
/// orchestrator skipped the frame. Skipped frames leave the scene untouched.
///
/// # Errors
///
/// Returns any error from acquiring, preparing, submitting or presenting.
///
/// # Panics
///
/// Panics if the scene holds more than `inputs.max_point_lights` lights.
pub fn draw_frame<B, P>(
    orchestrator: &mut FrameOrchestrator<B>,
    inputs: FrameInputs<'_>,
    passes: &mut P,
) -> RhiResult<Option<GlobalUbo>>
where
    B: PresentBackend,
    P: FramePasses<B>,
{
    let Some(frame) = orchestrator.begin_frame()? else {
        return Ok(None);
    };
    let extent = orchestrator.extent();

    // The slot's fence has been waited on, so its buffers are free to write.
    let mut ubo = prepare_frame_ubo(
        &mut *inputs.objects,
        inputs.camera,
        Vec2::new(extent.width as f32, extent.height as f32),
        inputs.frame_time,
        inputs.toggles,
        inputs.max_point_lights,
    );
    passes.prepare(&mut FrameUpdate {
        frame_index: frame.slot(),
        frame_time: inputs.frame_time,
        camera: inputs.camera,
        objects: &mut *inputs.objects,
        ubo: &mut ubo,
        toggles: inputs.toggles,
        extent,
    })?;

    let view = FrameView {
        camera: inputs.camera,
        objects: &*inputs.objects,
        frame_time: inputs.frame_time,
        toggles: inputs.toggles,
        extent,
    };
    passes.record_offscreen(orchestrator.backend(), &frame, &view);
    orchestrator.begin_render_pass(&frame);
    passes.record(orchestrator.backend(), &frame, &view);
    orchestrator.end_render_pass(&frame);
    orchestrator.end_frame(frame)?;
    Ok(Some(ubo))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use dither_rhi::swapchain::SwapStatus;
    use dither_scene::Transform;
    use glam::Vec3;

    use super::*;
    use crate::ubo::MAX_POINT_LIGHTS;

    struct ScriptedBackend {
        acquire_script: VecDeque<SwapStatus>,
        recreations: usize,
        presents: usize,
    }

    impl ScriptedBackend {
        fn new(acquire_script: impl IntoIterator<Item = SwapStatus>) -> Self {
            Self {
                acquire_script: acquire_script.into_iter().collect(),
                recreations: 0,
                presents: 0,
            }
        }
    }

    impl PresentBackend for ScriptedBackend {
        type Commands = u64;

        fn frames_in_flight(&self) -> usize {
            2
        }

        fn extent(&self) -> vk::Extent2D {
            vk::Extent2D {
                width: 640,
                height: 480,
            }
        }

        fn acquire(&mut self, _slot: usize) -> RhiResult<(u32, SwapStatus)> {
            let status = self.acquire_script.pop_front().unwrap_or(SwapStatus::Optimal);
            Ok((0, status))
        }

        fn begin_commands(&mut self, slot: usize, _image: u32) -> RhiResult<u64> {
            Ok(100 + slot as u64)
        }

        fn begin_render_pass(&mut self, _commands: u64, _image: u32) {}

        fn end_render_pass(&mut self, _commands: u64) {}

        fn submit_and_present(&mut self, _slot: usize, _image: u32) -> RhiResult<SwapStatus> {
            self.presents += 1;
            Ok(SwapStatus::Optimal)
        }

        fn recreate(&mut self, _extent: vk::Extent2D) -> RhiResult<()> {
            self.recreations += 1;
            Ok(())
        }
    }

    /// Installs nothing, like a mode without a light pass.
    struct NoPasses;

    impl FramePasses<ScriptedBackend> for NoPasses {
        fn prepare(&mut self, _update: &mut FrameUpdate<'_>) -> RhiResult<()> {
            Ok(())
        }

        fn record(&mut self, _: &ScriptedBackend, _: &ActiveFrame<u64>, _: &FrameView<'_>) {}
    }

    /// Remembers what each step saw.
    #[derive(Default)]
    struct RecordingPasses {
        prepared_lights: Vec<u32>,
        recorded: Vec<(usize, u64)>,
        offscreen: usize,
    }

    impl FramePasses<ScriptedBackend> for RecordingPasses {
        fn prepare(&mut self, update: &mut FrameUpdate<'_>) -> RhiResult<()> {
            self.prepared_lights.push(update.ubo.num_lights);
            Ok(())
        }

        fn record_offscreen(&mut self, _: &ScriptedBackend, _: &ActiveFrame<u64>, _: &FrameView<'_>) {
            self.offscreen += 1;
        }

        fn record(&mut self, _: &ScriptedBackend, frame: &ActiveFrame<u64>, view: &FrameView<'_>) {
            assert_eq!(view.extent.width, 640);
            self.recorded.push((frame.slot(), frame.commands()));
        }
    }

    fn scene_with_lights(count: usize) -> ObjectRegistry {
        let mut objects = ObjectRegistry::new();
        objects.create(Transform::default());
        for _ in 0..count {
            let id = objects.make_point_light(1.0, 0.1, Vec3::ONE);
            if let Some(light) = objects.get_mut(id) {
                light.transform.translation = Vec3::new(-1.0, -1.0, -1.0);
            }
        }
        objects
    }

    fn inputs<'a>(
        camera: &'a Camera,
        objects: &'a mut ObjectRegistry,
        toggles: &'a FrameToggles,
    ) -> FrameInputs<'a> {
        FrameInputs {
            camera,
            objects,
            frame_time: 0.016,
            toggles,
            max_point_lights: MAX_POINT_LIGHTS,
        }
    }

    #[test]
    fn test_lights_are_packed_without_any_passes() {
        let mut orchestrator = FrameOrchestrator::new(ScriptedBackend::new([]));
        let camera = Camera::new();
        let toggles = FrameToggles::default();
        let mut objects = scene_with_lights(6);

        let ubo = draw_frame(&mut orchestrator, inputs(&camera, &mut objects, &toggles), &mut NoPasses)
            .unwrap()
            .unwrap();
        assert_eq!(ubo.num_lights, 6);
        assert_eq!(ubo.resolution, Vec2::new(640.0, 480.0));
        assert_eq!(orchestrator.backend().presents, 1);
    }

    #[test]
    fn test_passes_see_packed_lights() {
        let mut orchestrator = FrameOrchestrator::new(ScriptedBackend::new([]));
        let camera = Camera::new();
        let toggles = FrameToggles::default();
        let mut objects = scene_with_lights(3);
        let mut passes = RecordingPasses::default();

        for _ in 0..3 {
            draw_frame(&mut orchestrator, inputs(&camera, &mut objects, &toggles), &mut passes)
                .unwrap();
        }
        assert_eq!(passes.prepared_lights, vec![3, 3, 3]);
        assert_eq!(passes.offscreen, 3);
        assert_eq!(passes.recorded, vec![(0, 100), (1, 101), (0, 100)]);
    }

    #[test]
    fn test_skipped_frame_then_next_frame_draws() {
        let mut orchestrator =
            FrameOrchestrator::new(ScriptedBackend::new([SwapStatus::OutOfDate]));
        let camera = Camera::new();
        let toggles = FrameToggles {
            rotation_multiplier: 1.0,
            ..FrameToggles::default()
        };
        let mut objects = scene_with_lights(2);
        let mut passes = RecordingPasses::default();

        let skipped =
            draw_frame(&mut orchestrator, inputs(&camera, &mut objects, &toggles), &mut passes)
                .unwrap();
        assert!(skipped.is_none());
        assert_eq!(orchestrator.backend().recreations, 1);
        assert!(passes.prepared_lights.is_empty());
        // The orbit does not advance on a skipped frame.
        let light = objects.point_lights().next().map(|l| l.transform.translation);
        assert_eq!(light, Some(Vec3::new(-1.0, -1.0, -1.0)));

        let ubo = draw_frame(&mut orchestrator, inputs(&camera, &mut objects, &toggles), &mut passes)
            .unwrap()
            .unwrap();
        assert_eq!(ubo.num_lights, 2);
        assert_eq!(passes.prepared_lights, vec![2]);
        assert_eq!(passes.recorded, vec![(0, 100)]);
        assert!(!orchestrator.is_frame_in_progress());
    }
}
