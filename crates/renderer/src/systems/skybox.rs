//! Cubemap sky drawn behind everything else.
//!
//! The vertex shader forces depth to the far plane, so the pass tests with
//! `LESS_OR_EQUAL` against the cleared depth and never writes it.

use tracing::debug;

use dither_assets::MeshData;
use dither_rhi::RhiResult;
use dither_rhi::pipeline::{CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use dither_rhi::shader::Shader;
use dither_rhi::vertex::SkyboxVertex;
use dither_scene::Mesh;

use super::{RenderSystem, SystemInit};
use crate::frame::FrameContext;

pub struct SkyboxSystem {
    cube: Mesh,
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl SkyboxSystem {
    /// Upload the inward-facing cube and build the depth-`LESS_OR_EQUAL` pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the cube upload, a shader load or pipeline creation fails.
    pub fn new(init: &SystemInit<'_>) -> RhiResult<Self> {
        let layout = PipelineLayout::new(init.device.clone(), &[init.global_layout.handle()], &[])?;

        let vert = Shader::load(init.device.clone(), init.shader_dir, "skybox.vert")?;
        let frag = Shader::load(init.device.clone(), init.shader_dir, "skybox.frag")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_binding(SkyboxVertex::binding_description())
            .vertex_attributes(&SkyboxVertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_write_enable(false)
            .depth_compare_op(CompareOp::LessOrEqual)
            .layout(&layout)
            .render_pass(init.render_pass, 0)
            .build(init.device.clone())?;

        let cube = Mesh::new(init.device.clone(), &MeshData::<SkyboxVertex>::skybox_cube())?;

        debug!("Skybox system ready ({} indices)", cube.index_count());
        Ok(Self {
            cube,
            pipeline,
            layout,
        })
    }
}

impl RenderSystem for SkyboxSystem {
    fn name(&self) -> &'static str {
        "skybox"
    }

    fn record(&self, frame: &FrameContext<'_>) {
        let cmd = frame.command_buffer;
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(self.layout.handle(), 0, &[frame.global_descriptor_set]);
        self.cube.bind(cmd);
        self.cube.draw(cmd);
    }
}
