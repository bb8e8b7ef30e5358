//! Procedural RGBA8 texture data.

use glam::Vec3;

use crate::error::{AssetError, AssetResult};

const TEXEL_SIZE: usize = 4;

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> AssetResult<Self> {
        if width == 0 || height == 0 {
            return Err(AssetError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * TEXEL_SIZE;
        if pixels.len() != expected {
            return Err(AssetError::PixelDataLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build a texture by evaluating `f(x, y)` for every texel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 4],
    ) -> AssetResult<Self> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * TEXEL_SIZE);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    /// 1x1 texture of a single color.
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: color.to_vec(),
        }
    }

    /// Tangent-space normal map pointing straight out of the surface.
    pub fn flat_normal() -> Self {
        Self::solid([128, 128, 255, 255])
    }

    /// `size`x`size` checkerboard with `cells` squares per side.
    pub fn checkerboard(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> AssetResult<Self> {
        let cell = (size / cells.max(1)).max(1);
        Self::from_fn(size, size, |x, y| {
            if (x / cell + y / cell).is_multiple_of(2) {
                a
            } else {
                b
            }
        })
    }

    /// RGBA at texel `(x, y)`, or `None` outside the image.
    pub fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * TEXEL_SIZE;
        let mut texel = [0; 4];
        texel.copy_from_slice(&self.pixels[offset..offset + TEXEL_SIZE]);
        Some(texel)
    }
}

/// Vertical sky gradient baked into six cube map faces.
///
/// World up is `-Y`, so the zenith lands on the `-Y` face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyGradient {
    pub zenith: Vec3,
    pub horizon: Vec3,
    pub ground: Vec3,
}

impl Default for SkyGradient {
    fn default() -> Self {
        Self {
            zenith: Vec3::new(0.10, 0.22, 0.55),
            horizon: Vec3::new(0.62, 0.70, 0.80),
            ground: Vec3::new(0.18, 0.16, 0.14),
        }
    }
}

impl SkyGradient {
    /// Color seen looking along `direction`.
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        let up = -direction.normalize_or_zero().y;
        if up >= 0.0 {
            self.horizon.lerp(self.zenith, up.sqrt())
        } else {
            self.horizon.lerp(self.ground, (-up * 4.0).min(1.0))
        }
    }

    /// Faces in `+X, -X, +Y, -Y, +Z, -Z` order, each `size`x`size`.
    pub fn cube_faces(&self, size: u32) -> AssetResult<[TextureData; 6]> {
        let face = |index: usize| {
            TextureData::from_fn(size, size, |x, y| {
                let s = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
                let t = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
                to_rgba8(self.sample(cube_direction(index, s, t)))
            })
        };
        Ok([face(0)?, face(1)?, face(2)?, face(3)?, face(4)?, face(5)?])
    }
}

/// Direction addressed by face-local coordinates `s`, `t` in `[-1, 1]`.
///
/// Inverse of the Vulkan cube map face selection table.
pub fn cube_direction(face: usize, s: f32, t: f32) -> Vec3 {
    match face {
        0 => Vec3::new(1.0, -t, -s),
        1 => Vec3::new(-1.0, -t, s),
        2 => Vec3::new(s, 1.0, t),
        3 => Vec3::new(s, -1.0, -t),
        4 => Vec3::new(s, -t, 1.0),
        _ => Vec3::new(-s, -t, -1.0),
    }
}

fn to_rgba8(color: Vec3) -> [u8; 4] {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, 255]
}
