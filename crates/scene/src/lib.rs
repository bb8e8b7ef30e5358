//! Scene description consumed by the render systems.
//!
//! - [`Transform`] and [`Camera`] in a left-handed, `-Y` up world
//! - [`ObjectRegistry`] of [`GameObject`]s with stable [`ObjectId`]s
//! - GPU-backed [`Mesh`] and shareable [`Material`]

pub mod camera;
pub mod light;
pub mod material;
pub mod mesh;
pub mod object;
pub mod transform;

pub use camera::{Camera, WORLD_UP};
pub use light::PointLightComponent;
pub use material::{Material, MaterialMaps};
pub use mesh::Mesh;
pub use object::{GameObject, ObjectId, ObjectRegistry};
pub use transform::Transform;
