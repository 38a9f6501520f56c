//! Triple-buffered per-frame resources.
//!
//! Each in-flight frame owns a slot: its constants buffer, overlay vertex
//! buffers, the orchestrator-recorded command buffers, and the fence that
//! gates slot reuse. Workers keep their own command buffers per slot in
//! [`super::workers`].

use crate::overlay::{GraphVertex, TextVertex, COMMON_VERTEX_CAPACITY, MAX_TEXT_VERTICES};
use crate::render::vulkan::buffer::HostBuffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::pipeline::CONSTANTS_RANGE;
use crate::render::vulkan::sync::{Fence, Semaphore};
use crate::render::vulkan::VulkanResult;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;

/// Swapchain depth requested at startup. The surface may grant more; every
/// per-slot resource is sized from the granted image count, not from this.
pub const FRAME_BUFFERING: usize = 3;

/// Shader-visible per-frame constants, laid out as the shaders expect.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FrameConstants {
    pub view_proj: [[f32; 4]; 4],
    /// Word 0 carries the generator seed, word 1 the eased transform phase
    /// as raw float bits; the rest is scratch space the shaders index freely.
    pub data: [u32; 48],
    /// Eased palette cross-fade factor.
    pub palette_factor: f32,
}

impl FrameConstants {
    pub fn new(
        view_proj: &Matrix4<f32>,
        seed: u32,
        transform_time: f32,
        palette_factor: f32,
    ) -> Self {
        let mut data = [0u32; 48];
        data[0] = seed;
        data[1] = transform_time.to_bits();
        Self {
            view_proj: (*view_proj).into(),
            data,
            palette_factor,
        }
    }
}

/// Resources owned by one frame slot.
pub struct FrameSlot {
    /// Signals that this slot's previous submission retired.
    pub fence: Fence,
    /// Acquire semaphore of the submission currently riding this slot.
    /// Parked here so it outlives the submission; replaced only after the
    /// fence proves the old one retired.
    pub acquire: Option<Semaphore>,
    pub constants: HostBuffer,
    /// Background, frame, grid, and legend vertices shared by all graphs.
    pub graph_common: HostBuffer,
    pub text_vertices: HostBuffer,
    /// Clear-and-skybox command buffer, recorded by the orchestrator.
    pub clear_cmd: vk::CommandBuffer,
    /// Window pass (display quad, graphs, text), also orchestrator-recorded.
    pub display_cmd: vk::CommandBuffer,
}

/// Build one slot per swapchain image. Fences start signaled so the first
/// wait on each slot passes immediately.
pub fn create_slots(
    ctx: &VulkanContext,
    cmds: &CommandPool,
    count: usize,
) -> VulkanResult<Vec<FrameSlot>> {
    let clear_cmds = cmds.allocate(count as u32)?;
    let display_cmds = cmds.allocate(count as u32)?;

    let mut slots = Vec::with_capacity(count);
    for (clear_cmd, display_cmd) in clear_cmds.into_iter().zip(display_cmds) {
        slots.push(FrameSlot {
            fence: Fence::new(ctx.device().clone(), true)?,
            acquire: None,
            constants: HostBuffer::new(
                ctx,
                CONSTANTS_RANGE,
                vk::BufferUsageFlags::STORAGE_BUFFER,
            )?,
            graph_common: HostBuffer::new(
                ctx,
                (COMMON_VERTEX_CAPACITY * std::mem::size_of::<GraphVertex>()) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?,
            text_vertices: HostBuffer::new(
                ctx,
                (MAX_TEXT_VERTICES * std::mem::size_of::<TextVertex>()) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?,
            clear_cmd,
            display_cmd,
        });
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_shader_layout() {
        assert_eq!(std::mem::size_of::<FrameConstants>(), 260);
        assert_eq!(std::mem::size_of::<FrameConstants>() as u64, CONSTANTS_RANGE);
    }

    #[test]
    fn animation_words_land_where_shaders_expect() {
        let constants = FrameConstants::new(&Matrix4::identity(), 0xDEAD_BEEF, 0.75, 0.5);
        assert_eq!(constants.data[0], 0xDEAD_BEEF);
        assert_eq!(f32::from_bits(constants.data[1]), 0.75);
        assert!(constants.data[2..].iter().all(|&w| w == 0));
        assert_eq!(constants.palette_factor, 0.5);
    }

    #[test]
    fn view_proj_is_column_major() {
        let m = Matrix4::new(
            1.0, 2.0, 3.0, 4.0, //
            5.0, 6.0, 7.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        );
        let constants = FrameConstants::new(&m, 0, 0.0, 0.0);
        // First column of the matrix is the first array row.
        assert_eq!(constants.view_proj[0], [1.0, 5.0, 9.0, 13.0]);
    }
}
