//! Point-light billboards.
//!
//! Lights are orbited and packed into the global block by
//! [`prepare_frame_ubo`](crate::frame_data::prepare_frame_ubo); this system
//! only draws them. Billboards are alpha blended, so they are drawn back to front.

use ash::vk;
use glam::Vec3;
use tracing::debug;

use dither_rhi::RhiResult;
use dither_rhi::pipeline::{
    BlendMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range,
};
use dither_rhi::shader::Shader;
use dither_scene::GameObject;

use super::{RenderSystem, SystemInit, check_push_constants};
use crate::frame::FrameContext;
use crate::ubo::PointLightPush;

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Two triangles forming a camera-facing quad, generated in the vertex shader.
const BILLBOARD_VERTICES: u32 = 6;

/// Indices into `positions`, farthest from `camera` first.
///
/// Equal distances keep their input order.
pub fn light_draw_order(positions: &[Vec3], camera: Vec3) -> Vec<usize> {
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| {
        let da = positions[a].distance_squared(camera);
        let db = positions[b].distance_squared(camera);
        db.total_cmp(&da)
    });
    order
}

/// Layout: set 0 global, push constants [`PointLightPush`]. No vertex input.
pub struct PointLightSystem {
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl PointLightSystem {
    /// Build the billboard pipeline: alpha blended, depth tested but not
    /// written, no vertex input.
    ///
    /// # Errors
    ///
    /// Returns an error if [`PointLightPush`] exceeds the device's push
    /// constant limit, a shader cannot be loaded, or pipeline creation fails.
    pub fn new(init: &SystemInit<'_>) -> RhiResult<Self> {
        check_push_constants::<PointLightPush>(&init.device, "point_light")?;
        let layout = PipelineLayout::new(
            init.device.clone(),
            &[init.global_layout.handle()],
            &[push_constant_range::<PointLightPush>(PUSH_STAGES)],
        )?;

        let vert = Shader::load(init.device.clone(), init.shader_dir, "point_light.vert")?;
        let frag = Shader::load(init.device.clone(), init.shader_dir, "point_light.frag")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .depth_write_enable(false)
            .blend(BlendMode::Alpha)
            .layout(&layout)
            .render_pass(init.render_pass, 0)
            .build(init.device.clone())?;

        debug!("Point light system ready");
        Ok(Self { pipeline, layout })
    }
}

impl RenderSystem for PointLightSystem {
    fn name(&self) -> &'static str {
        "point_light"
    }

    fn record(&self, frame: &FrameContext<'_>) {
        let lights: Vec<&GameObject> = frame.objects.point_lights().collect();
        if lights.is_empty() {
            return;
        }
        let positions: Vec<Vec3> = lights.iter().map(|l| l.transform.translation).collect();
        let order = light_draw_order(&positions, frame.camera.position());

        let cmd = frame.command_buffer;
        let layout = self.layout.handle();
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(layout, 0, &[frame.global_descriptor_set]);

        for index in order {
            let object = lights[index];
            let intensity = object.point_light.map_or(0.0, |l| l.intensity)
                * frame.toggles.light_intensity;
            let push = PointLightPush::new(
                object.transform.translation,
                object.color,
                intensity,
                object.transform.scale.x,
            );
            cmd.push_constants(layout, PUSH_STAGES, &push);
            cmd.draw(BILLBOARD_VERTICES, 1, 0, 0);
        }
    }
}
