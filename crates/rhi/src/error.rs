//! RHI error types.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// A descriptor pool has too few descriptors of `kind` left.
    #[error("Descriptor pool exhausted: requested {requested} x {kind:?}, {remaining} remaining")]
    PoolExhausted {
        kind: vk::DescriptorType,
        requested: u32,
        remaining: u32,
    },

    /// A descriptor pool has handed out all of its sets.
    #[error("Descriptor pool exhausted: all {max_sets} sets allocated")]
    SetsExhausted { max_sets: u32 },

    /// Swap chain recreation produced a different format than the render pass was built for.
    #[error("Swapchain format changed from {old:?} to {new:?}")]
    SwapchainFormatChanged { old: vk::Format, new: vk::Format },

    #[error("Unsupported layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
