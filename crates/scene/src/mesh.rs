//! GPU meshes built from [`MeshData`].

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use dither_assets::MeshData;
use dither_rhi::RhiResult;
use dither_rhi::buffer::{Buffer, BufferUsage};
use dither_rhi::command::CommandBuffer;
use dither_rhi::device::Device;
use tracing::debug;

/// Device-local vertex buffer plus an optional 32-bit index buffer.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    pub fn new<V: Pod>(device: Arc<Device>, data: &MeshData<V>) -> RhiResult<Self> {
        let vertex_buffer = Buffer::new_device_local_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = if data.is_indexed() {
            Some(Buffer::new_device_local_with_data(
                device,
                BufferUsage::Index,
                bytemuck::cast_slice(&data.indices),
            )?)
        } else {
            None
        };

        debug!(
            "Created mesh: {} vertices, {} indices",
            data.vertex_count(),
            data.index_count()
        );
        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertex_count(),
            index_count: data.index_count(),
        })
    }

    pub fn bind(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        if let Some(indices) = &self.index_buffer {
            cmd.bind_index_buffer(indices.handle(), 0, vk::IndexType::UINT32);
        }
    }

    pub fn draw(&self, cmd: &CommandBuffer) {
        if self.index_buffer.is_some() {
            cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
        } else {
            cmd.draw(self.vertex_count, 1, 0, 0);
        }
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("vertex_count", &self.vertex_count)
            .field("index_count", &self.index_count)
            .finish()
    }
}
