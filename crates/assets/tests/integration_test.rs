//! Procedural assets feed the GPU upload paths unchanged.

use dither_assets::{AssetError, MeshData, SkyGradient, TextureData};
use dither_rhi::texture::RGBA8_TEXEL_SIZE;
use dither_rhi::vertex::{SkyboxVertex, Vertex};

#[test]
fn test_mesh_bytes_match_vertex_stride() {
    let cube = MeshData::cube();
    let bytes: &[u8] = bytemuck::cast_slice(&cube.vertices);
    assert_eq!(
        bytes.len(),
        cube.vertices.len() * Vertex::binding_description().stride as usize
    );

    let sky = MeshData::skybox_cube();
    let bytes: &[u8] = bytemuck::cast_slice(&sky.vertices);
    assert_eq!(bytes.len(), 24 * SkyboxVertex::binding_description().stride as usize);
}

#[test]
fn test_every_generated_mesh_is_valid() {
    for mesh in [MeshData::cube(), MeshData::plane(10.0)] {
        let rebuilt = MeshData::new(mesh.vertices.clone(), mesh.indices.clone());
        assert_eq!(rebuilt.as_ref(), Ok(&mesh));
    }
    let sky = MeshData::skybox_cube();
    assert!(MeshData::new(sky.vertices, sky.indices).is_ok());
}

#[test]
fn test_cube_faces_have_texture_upload_size() {
    let size = 16;
    let faces = SkyGradient::default().cube_faces(size).unwrap();
    for face in &faces {
        assert_eq!(
            face.pixels.len(),
            size as usize * size as usize * RGBA8_TEXEL_SIZE
        );
    }
}

#[test]
fn test_checkerboard_rejects_zero_size() {
    let result = TextureData::checkerboard(0, 4, [255; 4], [0; 4]);
    assert!(matches!(result, Err(AssetError::InvalidDimensions { .. })));
}
