//! Opaque textured geometry.

use ash::vk;
use tracing::debug;

use dither_rhi::RhiResult;
use dither_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, push_constant_range};
use dither_rhi::shader::Shader;
use dither_rhi::vertex::Vertex;
use dither_scene::{GameObject, Material, Mesh, Transform};
use glam::Vec4;

use super::{RenderSystem, SystemInit, check_push_constants};
use crate::frame::{FrameContext, FrameToggles};
use crate::ubo::ObjectPush;

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Objects the opaque pass draws, in registry order. Anything without both a
/// mesh and a material is skipped.
pub(crate) fn drawables<'a>(
    objects: impl Iterator<Item = &'a GameObject>,
) -> impl Iterator<Item = (&'a GameObject, &'a Mesh, &'a Material)> {
    objects.filter_map(|object| match (&object.mesh, &object.material) {
        (Some(mesh), Some(material)) => Some((object, mesh.as_ref(), material.as_ref())),
        _ => None,
    })
}

/// Push constants for one draw. `material_maps` are the maps the material
/// provides; switched-off maps are cleared.
pub(crate) fn object_push(
    transform: &Transform,
    material_maps: Vec4,
    toggles: &FrameToggles,
) -> ObjectPush {
    ObjectPush {
        model: transform.matrix(),
        normal: transform.normal_matrix(),
        use_maps: toggles.use_maps(material_maps),
    }
}

/// Layout: set 0 global, set 1 material, push constants [`ObjectPush`].
pub struct SimpleRenderSystem {
    pipeline: Pipeline,
    layout: PipelineLayout,
}

impl SimpleRenderSystem {
    /// Build the opaque pipeline against the swap-chain render pass.
    ///
    /// # Errors
    ///
    /// Returns an error if [`ObjectPush`] exceeds the device's push constant
    /// limit, a shader cannot be loaded, or pipeline creation fails.
    pub fn new(init: &SystemInit<'_>) -> RhiResult<Self> {
        check_push_constants::<ObjectPush>(&init.device, "simple")?;
        let layout = PipelineLayout::new(
            init.device.clone(),
            &[init.global_layout.handle(), init.material_layout.handle()],
            &[push_constant_range::<ObjectPush>(PUSH_STAGES)],
        )?;

        let vert = Shader::load(init.device.clone(), init.shader_dir, "simple.vert")?;
        let frag = Shader::load(init.device.clone(), init.shader_dir, "simple.frag")?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vert)
            .fragment_shader(&frag)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .layout(&layout)
            .render_pass(init.render_pass, 0)
            .build(init.device.clone())?;

        debug!("Simple render system ready");
        Ok(Self { pipeline, layout })
    }
}

impl RenderSystem for SimpleRenderSystem {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn record(&self, frame: &FrameContext<'_>) {
        let cmd = frame.command_buffer;
        let layout = self.layout.handle();
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
        cmd.bind_descriptor_sets(layout, 0, &[frame.global_descriptor_set]);

        let mut bound_material = vk::DescriptorSet::null();
        for (object, mesh, material) in drawables(frame.objects.iter()) {
            // Shared materials stay bound across consecutive objects.
            if material.descriptor_set() != bound_material {
                bound_material = material.descriptor_set();
                cmd.bind_descriptor_sets(layout, 1, &[bound_material]);
            }
            let push = object_push(&object.transform, material.use_maps(), frame.toggles);
            cmd.push_constants(layout, PUSH_STAGES, &push);
            mesh.bind(cmd);
            mesh.draw(cmd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dither_scene::{ObjectRegistry, Transform};
    use glam::Vec3;

    #[test]
    fn test_objects_without_mesh_are_skipped() {
        let mut registry = ObjectRegistry::new();
        registry.create(Transform::default());
        registry.make_point_light(1.0, 0.1, Vec3::ONE);
        assert_eq!(drawables(registry.iter()).count(), 0);
    }

    #[test]
    fn test_disabled_map_reaches_push_constants() {
        let transform = Transform::new().with_scale(Vec3::splat(0.5));
        let all_maps = Vec4::ONE;

        let push = object_push(&transform, all_maps, &FrameToggles::default());
        assert_eq!(push.use_maps, Vec4::ONE);
        assert_eq!(push.model, transform.matrix());

        let toggles = FrameToggles {
            use_normal_map: false,
            use_ao_map: false,
            ..FrameToggles::default()
        };
        let push = object_push(&transform, all_maps, &toggles);
        assert_eq!(push.use_maps, Vec4::new(1.0, 0.0, 1.0, 0.0));

        let bytes = bytemuck::bytes_of(&push);
        let flags: &[f32] = bytemuck::cast_slice(&bytes[128..144]);
        assert_eq!(flags, &[1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_push_stages() {
        assert!(PUSH_STAGES.contains(vk::ShaderStageFlags::VERTEX));
        assert!(PUSH_STAGES.contains(vk::ShaderStageFlags::FRAGMENT));
    }
}
