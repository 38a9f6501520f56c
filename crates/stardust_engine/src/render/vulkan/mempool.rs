//! Fixed-size memory pools with bump allocation.
//!
//! Bulk GPU resources (render targets, textures, the particle seed buffer)
//! are sub-allocated out of a few big `vk::DeviceMemory` blocks sized up
//! front. Allocation only ever moves forward; running out of pool space is a
//! hard initialization failure, there is no eviction or defragmentation.

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// Allocation granularity used when sizing pools.
pub const PAGE_SIZE: u64 = 64 * 1024;

/// Round `size` up to a whole number of pages.
pub fn align_page(size: u64) -> u64 {
    (size + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE
}

/// Pure bump-allocator state.
///
/// The offset is aligned up before carving each allocation. A failed
/// allocation leaves the state untouched, so callers can probe and fall
/// back; the offset is monotone across the pool's lifetime.
#[derive(Debug, Clone)]
pub struct PoolAllocator {
    size: u64,
    offset: u64,
}

impl PoolAllocator {
    pub fn new(size: u64) -> Self {
        Self { size, offset: 0 }
    }

    /// Reserve `size` bytes at the next `alignment`-aligned offset.
    pub fn alloc(&mut self, size: u64, alignment: u64) -> VulkanResult<u64> {
        debug_assert!(alignment.is_power_of_two());
        let aligned = (self.offset + alignment - 1) & !(alignment - 1);
        let end = aligned
            .checked_add(size)
            .ok_or(VulkanError::OutOfPoolMemory {
                requested: size,
                available: self.size.saturating_sub(self.offset),
            })?;
        if end > self.size {
            return Err(VulkanError::OutOfPoolMemory {
                requested: size,
                available: self.size.saturating_sub(self.offset),
            });
        }
        self.offset = end;
        Ok(aligned)
    }

    pub fn capacity(&self) -> u64 {
        self.size
    }

    pub fn used(&self) -> u64 {
        self.offset
    }
}

/// One device-memory block that images are bound into. The pool owns the
/// images it binds and destroys them before freeing the block.
pub struct ImageMemoryPool {
    device: Device,
    memory: vk::DeviceMemory,
    allocator: PoolAllocator,
    images: Vec<vk::Image>,
}

impl ImageMemoryPool {
    pub fn new(
        ctx: &VulkanContext,
        size: u64,
        properties: vk::MemoryPropertyFlags,
        memory_type_bits: u32,
    ) -> VulkanResult<Self> {
        let memory = allocate_block(ctx, size, properties, memory_type_bits)?;
        Ok(Self {
            device: ctx.device().clone(),
            memory,
            allocator: PoolAllocator::new(size),
            images: Vec::new(),
        })
    }

    /// Bind `image` into the pool at the next fitting offset and take
    /// ownership of it.
    pub fn bind_image(&mut self, image: vk::Image) -> VulkanResult<()> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let offset = self
            .allocator
            .alloc(requirements.size, requirements.alignment)?;
        unsafe {
            self.device
                .bind_image_memory(image, self.memory, offset)
                .map_err(VulkanError::Api)?;
        }
        self.images.push(image);
        Ok(())
    }
}

impl Drop for ImageMemoryPool {
    fn drop(&mut self) {
        unsafe {
            for image in self.images.drain(..) {
                self.device.destroy_image(image, None);
            }
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Buffer variant of [`ImageMemoryPool`].
pub struct BufferMemoryPool {
    device: Device,
    memory: vk::DeviceMemory,
    allocator: PoolAllocator,
    buffers: Vec<vk::Buffer>,
}

impl BufferMemoryPool {
    pub fn new(
        ctx: &VulkanContext,
        size: u64,
        properties: vk::MemoryPropertyFlags,
        memory_type_bits: u32,
    ) -> VulkanResult<Self> {
        let memory = allocate_block(ctx, size, properties, memory_type_bits)?;
        Ok(Self {
            device: ctx.device().clone(),
            memory,
            allocator: PoolAllocator::new(size),
            buffers: Vec::new(),
        })
    }

    /// Bind `buffer` into the pool, returning its byte offset for later
    /// mapped writes.
    pub fn bind_buffer(&mut self, buffer: vk::Buffer) -> VulkanResult<u64> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let offset = self
            .allocator
            .alloc(requirements.size, requirements.alignment)?;
        unsafe {
            self.device
                .bind_buffer_memory(buffer, self.memory, offset)
                .map_err(VulkanError::Api)?;
        }
        self.buffers.push(buffer);
        Ok(offset)
    }

    /// Map a bound range and overwrite it with `data`.
    pub fn write_slice<T: bytemuck::Pod>(&self, offset: u64, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        unsafe {
            let ptr = self
                .device
                .map_memory(
                    self.memory,
                    offset,
                    bytes.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for BufferMemoryPool {
    fn drop(&mut self) {
        unsafe {
            for buffer in self.buffers.drain(..) {
                self.device.destroy_buffer(buffer, None);
            }
            self.device.free_memory(self.memory, None);
        }
    }
}

fn allocate_block(
    ctx: &VulkanContext,
    size: u64,
    properties: vk::MemoryPropertyFlags,
    memory_type_bits: u32,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type = ctx.memory_type_index(memory_type_bits, properties)?;
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(size)
        .memory_type_index(memory_type);
    unsafe {
        ctx.device()
            .allocate_memory(&alloc_info, None)
            .map_err(VulkanError::Api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carves_sequentially() {
        let mut pool = PoolAllocator::new(1024);
        assert_eq!(pool.alloc(100, 1).unwrap(), 0);
        assert_eq!(pool.alloc(100, 1).unwrap(), 100);
        assert_eq!(pool.used(), 200);
    }

    #[test]
    fn aligns_offsets_up() {
        let mut pool = PoolAllocator::new(1024);
        pool.alloc(10, 1).unwrap();
        assert_eq!(pool.alloc(16, 256).unwrap(), 256);
        // Already-aligned offsets are used as-is.
        assert_eq!(pool.alloc(4, 16).unwrap(), 272);
    }

    #[test]
    fn failed_alloc_leaves_state_untouched() {
        let mut pool = PoolAllocator::new(256);
        pool.alloc(200, 1).unwrap();
        let err = pool.alloc(100, 1).unwrap_err();
        match err {
            VulkanError::OutOfPoolMemory {
                requested,
                available,
            } => {
                assert_eq!(requested, 100);
                assert_eq!(available, 56);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // A smaller follow-up still fits.
        assert_eq!(pool.used(), 200);
        assert_eq!(pool.alloc(56, 1).unwrap(), 200);
    }

    #[test]
    fn alignment_padding_counts_against_capacity() {
        let mut pool = PoolAllocator::new(300);
        pool.alloc(10, 1).unwrap();
        // 16 bytes at alignment 256 needs offset 256..272, which fits; the
        // next allocation sees only what is left after the padding.
        pool.alloc(16, 256).unwrap();
        assert!(pool.alloc(40, 1).is_err());
        assert_eq!(pool.alloc(28, 1).unwrap(), 272);
    }

    #[test]
    fn offset_is_monotone() {
        let mut pool = PoolAllocator::new(10_000);
        let mut last = 0;
        for i in 1..20 {
            let offset = pool.alloc(i * 7, 8).unwrap();
            assert!(offset >= last);
            last = offset;
        }
    }

    #[test]
    fn page_alignment() {
        assert_eq!(align_page(0), 0);
        assert_eq!(align_page(1), PAGE_SIZE);
        assert_eq!(align_page(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(align_page(PAGE_SIZE + 1), 2 * PAGE_SIZE);
        // Seed buffer for the stock demo: 2M u32s round to ~7.63 MiB.
        assert_eq!(align_page(2_000_000 * 4), 8_000_000 / PAGE_SIZE * PAGE_SIZE + PAGE_SIZE);
    }
}
