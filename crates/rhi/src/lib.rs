//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash` for everything the renderer touches:
//! - Instance, GPU selection and the logical device
//! - Buffers, images, samplers and textures (memory from `gpu-allocator`)
//! - Command recording and synchronization primitives
//! - Descriptor layouts, fixed-capacity pools and writers
//! - Render passes, shaders and graphics pipelines
//! - The swap chain
//!
//! Every wrapper holds an `Arc<Device>` and releases its handle on drop.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
