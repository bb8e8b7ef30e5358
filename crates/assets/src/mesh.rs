//! Procedural triangle meshes.
//!
//! World space is Y-down: `-Y` is up. Every triangle is wound so that
//! `(b - a) x (c - a)` points out of the surface, which rasterizes
//! counter-clockwise under the camera's Vulkan clip-space projection.

use dither_rhi::vertex::{SkyboxVertex, Vertex};
use glam::{Vec2, Vec3};

use crate::error::{AssetError, AssetResult};

/// Indices of one quad `[0, 1, 2, 3]` as two triangles.
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex and index lists ready to upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData<V = Vertex> {
    pub vertices: Vec<V>,
    pub indices: Vec<u32>,
}

impl<V> MeshData<V> {
    /// Build a mesh, checking that `indices` form whole triangles inside `vertices`.
    ///
    /// An empty index list means non-indexed drawing and is always accepted.
    pub fn new(vertices: Vec<V>, indices: Vec<u32>) -> AssetResult<Self> {
        if !indices.len().is_multiple_of(3) {
            return Err(AssetError::IncompleteTriangles(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(AssetError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }
        Ok(Self { vertices, indices })
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// One cube face: outward normal plus two in-plane axes with `u x v == normal`.
struct Face {
    normal: Vec3,
    u: Vec3,
    v: Vec3,
    color: Vec3,
}

/// Faces in front (+Z), back (-Z), left (-X), right (+X), top (-Y), bottom (+Y) order.
const CUBE_FACES: [Face; 6] = [
    Face {
        normal: Vec3::Z,
        u: Vec3::X,
        v: Vec3::Y,
        color: Vec3::new(0.1, 0.1, 0.8),
    },
    Face {
        normal: Vec3::NEG_Z,
        u: Vec3::Y,
        v: Vec3::X,
        color: Vec3::new(0.1, 0.8, 0.1),
    },
    Face {
        normal: Vec3::NEG_X,
        u: Vec3::Z,
        v: Vec3::Y,
        color: Vec3::new(0.9, 0.9, 0.9),
    },
    Face {
        normal: Vec3::X,
        u: Vec3::Y,
        v: Vec3::Z,
        color: Vec3::new(0.8, 0.8, 0.1),
    },
    Face {
        normal: Vec3::NEG_Y,
        u: Vec3::X,
        v: Vec3::Z,
        color: Vec3::new(0.9, 0.6, 0.1),
    },
    Face {
        normal: Vec3::Y,
        u: Vec3::Z,
        v: Vec3::X,
        color: Vec3::new(0.8, 0.1, 0.1),
    },
];

/// Corners of a face quad in winding order, as (u, v) signs.
const QUAD_CORNERS: [Vec2; 4] = [
    Vec2::new(-1.0, -1.0),
    Vec2::new(1.0, -1.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(-1.0, 1.0),
];

impl MeshData<Vertex> {
    /// Unit cube centered on the origin (half extent 0.5), one color per face.
    pub fn cube() -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (i, face) in CUBE_FACES.iter().enumerate() {
            let base = (i * 4) as u32;
            for corner in QUAD_CORNERS {
                let position = 0.5 * (face.normal + corner.x * face.u + corner.y * face.v);
                let uv = (corner + Vec2::ONE) * 0.5;
                vertices.push(Vertex::new(position, face.color, face.normal, uv));
            }
            indices.extend(QUAD_INDICES.iter().map(|i| base + i));
        }

        Self { vertices, indices }
    }

    /// Square floor in the XZ plane facing up (`-Y`), UVs repeating once per unit.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let normal = Vec3::NEG_Y;
        let vertices = QUAD_CORNERS
            .iter()
            .map(|corner| {
                let position = Vec3::new(corner.x * half, 0.0, corner.y * half);
                let uv = (*corner + Vec2::ONE) * half;
                Vertex::new(position, Vec3::ONE, normal, uv)
            })
            .collect();

        Self {
            vertices,
            indices: QUAD_INDICES.to_vec(),
        }
    }

    /// Copy of this mesh with every vertex color replaced.
    pub fn with_color(mut self, color: Vec3) -> Self {
        for vertex in &mut self.vertices {
            vertex.color = color;
        }
        self
    }
}

impl MeshData<SkyboxVertex> {
    /// 24-vertex, 36-index cube of half extent 1 for the skybox.
    ///
    /// Drawn from the inside with culling disabled, so winding does not matter.
    pub fn skybox_cube() -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (i, face) in CUBE_FACES.iter().enumerate() {
            let base = (i * 4) as u32;
            vertices.extend(QUAD_CORNERS.iter().map(|corner| SkyboxVertex {
                position: face.normal + corner.x * face.u + corner.y * face.v,
            }));
            indices.extend(QUAD_INDICES.iter().map(|i| base + i));
        }

        Self { vertices, indices }
    }
}
