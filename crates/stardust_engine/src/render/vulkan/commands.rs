//! Command pool wrapper.
//!
//! Each recording thread owns a private pool; the primary command buffers
//! allocated from it are `Copy` handles that the orchestrator keeps for
//! submission while the pool itself stays with its thread.

use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

pub struct CommandPool {
    device: Device,
    pool: vk::CommandPool,
}

impl CommandPool {
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let pool = unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, pool })
    }

    /// Allocate `count` primary command buffers. Freed with the pool.
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Begin recording, implicitly resetting the buffer.
    pub fn begin(&self, cmdbuf: vk::CommandBuffer) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .begin_command_buffer(cmdbuf, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    pub fn end(&self, cmdbuf: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device
                .end_command_buffer(cmdbuf)
                .map_err(VulkanError::Api)
        }
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
