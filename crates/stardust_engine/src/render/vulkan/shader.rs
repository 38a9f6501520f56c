//! SPIR-V shader module loading.

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};
use std::path::Path;

/// RAII shader module. Loaded at pipeline-build time and dropped as soon as
/// the pipeline holding it is created.
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Load a SPIR-V binary from disk. A missing or malformed file is a
    /// fatal initialization error.
    pub fn from_file(device: Device, path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(device, &bytes).map_err(|e| match e {
            VulkanError::InvalidOperation { reason } => VulkanError::ShaderLoad {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_bytes(device: Device, bytes: &[u8]) -> VulkanResult<Self> {
        if bytes.len() % 4 != 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("SPIR-V size {} is not a multiple of 4", bytes.len()),
            });
        }
        let mut cursor = std::io::Cursor::new(bytes);
        let words = ash::util::read_spv(&mut cursor).map_err(|e| VulkanError::InvalidOperation {
            reason: e.to_string(),
        })?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, module })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
