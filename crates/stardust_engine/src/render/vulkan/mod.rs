//! Thin RAII layer over ash.
//!
//! Every wrapper owns the handles it creates and releases them on drop;
//! drop order inside the renderer keeps the device alive until the last
//! wrapper is gone.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptors;
pub mod mempool;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::HostBuffer;
pub use commands::CommandPool;
pub use context::{VulkanContext, VulkanError, VulkanResult};
pub use mempool::{align_page, ImageMemoryPool, PoolAllocator, BufferMemoryPool};
pub use shader::ShaderModule;
pub use swapchain::Swapchain;
pub use sync::{Fence, Semaphore};
