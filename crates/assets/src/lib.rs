//! Procedural CPU-side asset data.
//!
//! Nothing here touches the GPU. The scene crate turns these into buffers
//! and textures:
//! - [`MeshData`]: cube, floor plane and the position-only skybox cube
//! - [`TextureData`]: solid colors, checkerboards, flat normal maps and
//!   gradient sky cube faces

mod error;

pub mod mesh;
pub mod texture;

pub use error::{AssetError, AssetResult};
pub use mesh::MeshData;
pub use texture::{SkyGradient, TextureData};
