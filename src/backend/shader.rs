// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Shaders are pre-compiled blobs loaded
// from disk at startup; nothing here inspects their contents.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

/// Load a pre-compiled SPIR-V blob and create a shader module from it.
pub fn load_shader_module(device: &VulkanDevice, path: impl AsRef<Path>) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file: {}", path.display()))?;

    // SPIR-V is a stream of 4-byte words; read_spv handles alignment
    let code = ash::util::read_spv(&mut Cursor::new(&bytes))
        .with_context(|| format!("Invalid SPIR-V in {}", path.display()))?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .with_context(|| format!("Failed to create shader module from {}", path.display()))
    }
}
