//! Low-resolution "retro" rendering.
//!
//! Two stages per frame:
//!
//! 1. `record_offscreen` draws the scene into a fixed-size [`OffscreenTarget`]
//!    with its own render pass.
//! 2. `record` draws one full-screen triangle inside the swap-chain pass that
//!    samples the target's color and depth with nearest filtering, scales it by
//!    a whole-number factor and applies depth fog.
//!
//! Composite set layout:
//! - binding 0: [`ScaleUbo`] (fragment)
//! - binding 1: offscreen color (fragment)
//! - binding 2: offscreen depth (fragment)

use ash::vk;
use glam::{Vec2, Vec4};
use tracing::info;

use dither_core::RenderConfig;
use dither_rhi::RhiResult;
use dither_rhi::buffer::{Buffer, BufferUsage};
use dither_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
use dither_rhi::pipeline::{
    CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range,
};
use dither_rhi::render_pass::clear_values;
use dither_rhi::shader::Shader;
use dither_rhi::vertex::Vertex;
use dither_scene::Transform;

use super::simple::drawables;
use super::{RenderSystem, SystemInit, check_push_constants};
use crate::frame::{FrameContext, FrameToggles, FrameUpdate};
use crate::offscreen::{OffscreenTarget, upscale_factor};
use crate::ubo::{FogPush, RetroObjectPush, ScaleUbo};

const SCENE_PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

const SCALE_BINDING: u32 = 0;
const COLOR_BINDING: u32 = 1;
const DEPTH_BINDING: u32 = 2;

/// Full-screen triangle generated from `gl_VertexIndex`.
const FULLSCREEN_VERTICES: u32 = 3;

/// `(max_sets, pool sizes)` of the composite pool for `frames_in_flight` slots.
fn composite_pool_sizes(frames_in_flight: usize) -> (u32, [(vk::DescriptorType, u32); 2]) {
    let n = frames_in_flight as u32;
    (
        n,
        [
            (vk::DescriptorType::UNIFORM_BUFFER, n),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2 * n),
        ],
    )
}

/// Scene-pass push constants for one draw into a `viewport_size` target.
fn retro_object_push(
    transform: &Transform,
    material_maps: Vec4,
    toggles: &FrameToggles,
    viewport_size: Vec2,
) -> RetroObjectPush {
    RetroObjectPush {
        model: transform.matrix(),
        normal: transform.normal_matrix(),
        use_maps: toggles.use_maps(material_maps),
        viewport_size,
        _padding: [0.0; 2],
    }
}

struct CompositeSlot {
    scale_ubo: Buffer,
    descriptor_set: vk::DescriptorSet,
}

pub struct RetroRenderSystem {
    scene_pipeline: Pipeline,
    scene_layout: PipelineLayout,
    composite_pipeline: Pipeline,
    composite_layout: PipelineLayout,
    slots: Vec<CompositeSlot>,
    _composite_pool: DescriptorPool,
    _composite_set_layout: DescriptorSetLayout,
    target: OffscreenTarget,
    clear_color: [f32; 4],
}

impl RetroRenderSystem {
    /// Build the offscreen target, both pipelines and one composite set per
    /// frame slot.
    ///
    /// # Errors
    ///
    /// Returns an error if [`RetroObjectPush`] exceeds the device's push
    /// constant limit, or any target, shader, pipeline or descriptor fails to
    /// be created.
    pub fn new(init: &SystemInit<'_>, render: &RenderConfig) -> RhiResult<Self> {
        check_push_constants::<RetroObjectPush>(&init.device, "retro")?;
        let target = OffscreenTarget::new(
            init.device.clone(),
            vk::Extent2D {
                width: render.offscreen_width,
                height: render.offscreen_height,
            },
        )?;

        // Scene stage, compatible with the offscreen pass.
        let scene_layout = PipelineLayout::new(
            init.device.clone(),
            &[init.global_layout.handle(), init.material_layout.handle()],
            &[push_constant_range::<RetroObjectPush>(SCENE_PUSH_STAGES)],
        )?;
        let scene_vert = Shader::load(init.device.clone(), init.shader_dir, "retro_scene.vert")?;
        let scene_frag = Shader::load(init.device.clone(), init.shader_dir, "retro_scene.frag")?;
        let scene_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&scene_vert)
            .fragment_shader(&scene_frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .layout(&scene_layout)
            .render_pass(target.render_pass().handle(), 0)
            .build(init.device.clone())?;

        // Composite stage, compatible with the swap-chain pass.
        let composite_set_layout = DescriptorSetLayout::builder()
            .add_binding(
                SCALE_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .add_binding(
                COLOR_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .add_binding(
                DEPTH_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .build(init.device.clone())?;

        let frames_in_flight = render.frames_in_flight;
        let (max_sets, sizes) = composite_pool_sizes(frames_in_flight);
        let mut composite_pool = sizes
            .iter()
            .fold(DescriptorPool::builder().max_sets(max_sets), |builder, &(kind, count)| {
                builder.pool_size(kind, count)
            })
            .build(init.device.clone())?;

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            let scale_ubo = Buffer::new(
                init.device.clone(),
                BufferUsage::Uniform,
                std::mem::size_of::<ScaleUbo>() as u64,
            )?;
            scale_ubo.write_pod(&ScaleUbo::default())?;
            let descriptor_set = DescriptorWriter::new(&composite_set_layout)
                .write_buffer(SCALE_BINDING, scale_ubo.descriptor_info())
                .write_image(COLOR_BINDING, target.color_info())
                .write_image(DEPTH_BINDING, target.depth_info())
                .build(&mut composite_pool)?;
            slots.push(CompositeSlot {
                scale_ubo,
                descriptor_set,
            });
        }

        let composite_layout = PipelineLayout::new(
            init.device.clone(),
            &[composite_set_layout.handle()],
            &[push_constant_range::<FogPush>(vk::ShaderStageFlags::FRAGMENT)],
        )?;
        let composite_vert =
            Shader::load(init.device.clone(), init.shader_dir, "retro_composite.vert")?;
        let composite_frag =
            Shader::load(init.device.clone(), init.shader_dir, "retro_composite.frag")?;
        let composite_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&composite_vert)
            .fragment_shader(&composite_frag)
            .cull_mode(CullMode::None)
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_compare_op(CompareOp::Always)
            .layout(&composite_layout)
            .render_pass(init.render_pass, 0)
            .build(init.device.clone())?;

        info!(
            "Retro render system ready: {}x{} target, {} composite set(s)",
            render.offscreen_width, render.offscreen_height, frames_in_flight
        );
        Ok(Self {
            scene_pipeline,
            scene_layout,
            composite_pipeline,
            composite_layout,
            slots,
            _composite_pool: composite_pool,
            _composite_set_layout: composite_set_layout,
            target,
            clear_color: render.clear_color,
        })
    }
}

impl RenderSystem for RetroRenderSystem {
    fn name(&self) -> &'static str {
        "retro"
    }

    fn begin_frame(&mut self, frame: &mut FrameUpdate<'_>) -> RhiResult<()> {
        let scale = upscale_factor(frame.extent, self.target.extent());
        let window_size = Vec2::new(frame.extent.width as f32, frame.extent.height as f32);
        self.slots[frame.frame_index]
            .scale_ubo
            .write_pod(&ScaleUbo::new(window_size, scale))
    }

    fn record_offscreen(&self, frame: &FrameContext<'_>) {
        let cmd = frame.command_buffer;
        let extent = self.target.extent();
        cmd.begin_render_pass(
            self.target.render_pass().handle(),
            self.target.framebuffer(),
            extent,
            &clear_values(self.clear_color),
        );
        cmd.set_full_viewport(extent);

        let layout = self.scene_layout.handle();
        cmd.bind_pipeline(self.scene_pipeline.bind_point(), self.scene_pipeline.handle());
        cmd.bind_descriptor_sets(layout, 0, &[frame.global_descriptor_set]);

        let viewport_size = Vec2::new(extent.width as f32, extent.height as f32);
        let mut bound_material = vk::DescriptorSet::null();
        for (object, mesh, material) in drawables(frame.objects.iter()) {
            if material.descriptor_set() != bound_material {
                bound_material = material.descriptor_set();
                cmd.bind_descriptor_sets(layout, 1, &[bound_material]);
            }
            let push = retro_object_push(
                &object.transform,
                material.use_maps(),
                frame.toggles,
                viewport_size,
            );
            cmd.push_constants(layout, SCENE_PUSH_STAGES, &push);
            mesh.bind(cmd);
            mesh.draw(cmd);
        }

        cmd.end_render_pass();
    }

    fn record(&self, frame: &FrameContext<'_>) {
        let cmd = frame.command_buffer;
        let layout = self.composite_layout.handle();
        cmd.bind_pipeline(
            self.composite_pipeline.bind_point(),
            self.composite_pipeline.handle(),
        );
        cmd.bind_descriptor_sets(layout, 0, &[self.slots[frame.frame_index].descriptor_set]);
        let fog = FogPush::new(frame.fog, frame.camera.position());
        cmd.push_constants(layout, vk::ShaderStageFlags::FRAGMENT, &fog);
        cmd.draw(FULLSCREEN_VERTICES, 1, 0, 0);
    }
}
