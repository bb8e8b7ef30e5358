//! SPIR-V shader modules.
//!
//! Shaders are compiled ahead of time (`shaders/compile.sh`) and loaded at
//! runtime. A file named `simple.vert.spv` is a vertex shader, `*.frag.spv` a
//! fragment shader.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use dither_rhi::device::Device;
//! use dither_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> dither_rhi::RhiResult<()> {
//! let vert = Shader::load(device.clone(), Path::new("shaders/spirv"), "simple.vert")?;
//! let frag = Shader::load(device, Path::new("shaders/spirv"), "simple.frag")?;
//! let stages = [vert.stage_create_info(), frag.stage_create_info()];
//! # let _ = stages;
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

const ENTRY_POINT: &CStr = c"main";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    /// Stage implied by a shader name such as `point_light.frag`.
    pub fn from_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".spv").unwrap_or(name);
        if stem.ends_with(".vert") {
            Some(ShaderStage::Vertex)
        } else if stem.ends_with(".frag") {
            Some(ShaderStage::Fragment)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Vulkan shader module wrapper. Only needed until the pipeline is built.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Load `<dir>/<name>.spv`, taking the stage from `name`.
    pub fn load(device: Arc<Device>, dir: &Path, name: &str) -> RhiResult<Self> {
        let stage = ShaderStage::from_name(name).ok_or_else(|| {
            RhiError::ShaderError(format!("cannot tell the stage of shader '{name}'"))
        })?;
        let path = dir.join(format!("{name}.spv"));
        Self::from_spirv_file(device, &path, stage)
    }

    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("failed to read shader file {}: {}", path.display(), e))
        })?;
        Self::from_spirv_bytes(device, &bytes, stage)
    }

    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };
        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage info borrowing this module, entry point `main`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

/// Reinterpret little-endian SPIR-V bytes as code words.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(RhiError::ShaderError(format!(
            "bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_name() {
        assert_eq!(ShaderStage::from_name("simple.vert"), Some(ShaderStage::Vertex));
        assert_eq!(
            ShaderStage::from_name("retro_composite.frag.spv"),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_name("skybox.comp"), None);
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.to_vk_stage(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(spirv_words(&[0u8; 5]).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_spirv_words_checks_magic() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);

        assert!(spirv_words(&[0u8; 8]).is_err());
    }
}
