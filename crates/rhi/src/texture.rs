//! Sampled textures uploaded from RGBA8 pixel data.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, ImageKind};
use crate::sampler::Sampler;

/// Bytes per RGBA8 texel.
pub const RGBA8_TEXEL_SIZE: usize = 4;

/// An image in `SHADER_READ_ONLY_OPTIMAL` plus the sampler it is read with.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Upload a 2D sRGB texture with a linear repeating sampler.
    pub fn from_rgba8(device: Arc<Device>, width: u32, height: u32, pixels: &[u8]) -> RhiResult<Self> {
        Self::new_2d(device, width, height, pixels, vk::Format::R8G8B8A8_SRGB)
    }

    /// Same as [`Texture::from_rgba8`] but without sRGB decoding. For normal maps.
    pub fn from_rgba8_linear(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        Self::new_2d(device, width, height, pixels, vk::Format::R8G8B8A8_UNORM)
    }

    fn new_2d(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
        format: vk::Format,
    ) -> RhiResult<Self> {
        check_pixel_len(width, height, 1, pixels.len())?;
        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            ImageDesc::texture(extent, format, ImageKind::D2),
        )?;
        upload(&device, &image, pixels)?;
        let sampler = Sampler::linear_repeat(device)?;
        debug!("Uploaded {}x{} texture ({:?})", width, height, format);
        Ok(Self { image, sampler })
    }

    /// Upload a cube map from six square faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn cube_from_rgba8(device: Arc<Device>, size: u32, faces: [&[u8]; 6]) -> RhiResult<Self> {
        let face_len = size as usize * size as usize * RGBA8_TEXEL_SIZE;
        let mut pixels = Vec::with_capacity(face_len * 6);
        for face in faces {
            check_pixel_len(size, size, 1, face.len())?;
            pixels.extend_from_slice(face);
        }

        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let image = Image::new(
            device.clone(),
            ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB, ImageKind::Cube),
        )?;
        upload(&device, &image, &pixels)?;
        let sampler = Sampler::linear_repeat(device)?;
        debug!("Uploaded {}x{} cube map", size, size);
        Ok(Self { image, sampler })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler.handle())
            .image_view(self.image.view())
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }
}

/// Stage `pixels`, copy them into every layer of `image`, and leave it shader-readable.
fn upload(device: &Arc<Device>, image: &Image, pixels: &[u8]) -> RhiResult<()> {
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
    let extent = image.extent();

    device.execute_single_time(|_, cmd| {
        let cmd = CommandBuffer::from_handle(device.clone(), cmd);
        image.transition_layout(
            &cmd,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
    })?;
    device.copy_buffer_to_image(
        staging.handle(),
        image.handle(),
        extent.width,
        extent.height,
        image.kind().layer_count(),
    )?;
    device.execute_single_time(|_, cmd| {
        let cmd = CommandBuffer::from_handle(device.clone(), cmd);
        image.transition_layout(
            &cmd,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    })
}

fn check_pixel_len(width: u32, height: u32, layers: u32, len: usize) -> RhiResult<()> {
    let expected = width as usize * height as usize * layers as usize * RGBA8_TEXEL_SIZE;
    if width == 0 || height == 0 || len != expected {
        return Err(RhiError::InvalidResource(format!(
            "expected {expected} bytes of RGBA8 data for {width}x{height}, got {len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_len_validation() {
        assert!(check_pixel_len(2, 2, 1, 16).is_ok());
        assert!(check_pixel_len(2, 2, 1, 15).is_err());
        assert!(check_pixel_len(0, 2, 1, 0).is_err());
        assert!(check_pixel_len(4, 4, 6, 4 * 4 * 6 * 4).is_ok());
    }
}
