//! Error types for procedural asset data.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssetError {
    /// Width or height is zero.
    #[error("Invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Pixel buffer does not match `width * height * 4`.
    #[error("Expected {expected} bytes of RGBA8 pixel data, got {actual}")]
    PixelDataLength { expected: usize, actual: usize },

    /// An index points past the end of the vertex list.
    #[error("Index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    /// Index count is not a multiple of three.
    #[error("Index count {0} does not form whole triangles")]
    IncompleteTriangles(usize),
}

pub type AssetResult<T> = Result<T, AssetError>;
