//! GPU images and demo asset buffers.
//!
//! Render targets and textures are sub-allocated from the fixed memory
//! pools; texture contents are staged through a host buffer and copied with
//! a one-shot command buffer. All images are moved to `GENERAL` at upload
//! or first-frame time and stay there.

use crate::overlay::FontAtlas;
use crate::render::vulkan::buffer::HostBuffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::mempool::{align_page, BufferMemoryPool, ImageMemoryPool, PAGE_SIZE};
use crate::render::vulkan::pipeline::{DEPTH_FORMAT, SKYBOX_GEOMETRY_RANGE, TARGET_FORMAT};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::sim::animation::{seed_sequence, PALETTE_COUNT};
use ash::{vk, Device};
use std::path::Path;

/// Edge length of one skybox cube face.
pub const SKYBOX_DIM: u32 = 1024;
/// Palette strip width; palettes are `PALETTE_WIDTH` x 1.
pub const PALETTE_WIDTH: u32 = 256;
/// Palette image slots; one more than distinct palettes so the cross-fade
/// can always bind a "next" view.
pub const PALETTE_IMAGE_COUNT: usize = PALETTE_COUNT + 1;

const FACE_FILES: [&str; 6] = [
    "Skybox_right1.png",
    "Skybox_left2.png",
    "Skybox_top3.png",
    "Skybox_bottom4.png",
    "Skybox_front5.png",
    "Skybox_back6.png",
];

const PALETTE_FILES: [&str; PALETTE_COUNT] = [
    "Palette_Fire.png",
    "Palette_Purple.png",
    "Palette_Muted.png",
    "Palette_Rainbow.png",
    "Palette_Sky.png",
];

/// Off-screen accumulation color target plus the shared depth-stencil, both
/// bound into one device-local pool.
pub struct RenderTargets {
    device: Device,
    pub accum_image: vk::Image,
    pub accum_view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    _pool: ImageMemoryPool,
}

impl RenderTargets {
    pub fn new(ctx: &VulkanContext, width: u32, height: u32) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let pool_size = align_page(u64::from(width) * u64::from(height) * 32);
        let mut pool = ImageMemoryPool::new(
            ctx,
            pool_size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            !0,
        )?;

        let accum_image = create_image_2d(
            &device,
            TARGET_FORMAT,
            width,
            height,
            vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        pool.bind_image(accum_image)?;
        let accum_view = create_view_2d(&device, accum_image, TARGET_FORMAT, vk::ImageAspectFlags::COLOR)?;

        let depth_image = match create_image_2d(
            &device,
            DEPTH_FORMAT,
            width,
            height,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        ) {
            Ok(image) => image,
            Err(e) => {
                unsafe { device.destroy_image_view(accum_view, None) };
                return Err(e);
            }
        };
        if let Err(e) = pool.bind_image(depth_image) {
            unsafe {
                device.destroy_image(depth_image, None);
                device.destroy_image_view(accum_view, None);
            }
            return Err(e);
        }
        let depth_view = match create_view_2d(
            &device,
            depth_image,
            DEPTH_FORMAT,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        ) {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image_view(accum_view, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            accum_image,
            accum_view,
            depth_image,
            depth_view,
            _pool: pool,
        })
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.accum_view, None);
            self.device.destroy_image_view(self.depth_view, None);
        }
    }
}

/// Skybox cube map and the palette strip images, uploaded from PNG assets.
pub struct TextureSet {
    device: Device,
    pub skybox_view: vk::ImageView,
    pub palette_views: [vk::ImageView; PALETTE_IMAGE_COUNT],
    _pool: ImageMemoryPool,
}

impl TextureSet {
    pub fn new(ctx: &VulkanContext, cmds: &CommandPool, asset_dir: &Path) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let mut pool = ImageMemoryPool::new(
            ctx,
            32 * 1024 * 1024,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            !0,
        )?;
        let mut views: Vec<vk::ImageView> = Vec::new();
        let destroy_views = |device: &Device, views: &mut Vec<vk::ImageView>| {
            for view in views.drain(..) {
                unsafe { device.destroy_image_view(view, None) };
            }
        };

        // Cube map: six faces packed into one staging buffer, one copy
        // region per layer.
        let face_bytes = (SKYBOX_DIM * SKYBOX_DIM * 4) as usize;
        let mut pixels = vec![0u8; face_bytes * 6];
        for (i, file) in FACE_FILES.iter().enumerate() {
            let face = load_rgba(&asset_dir.join(file), SKYBOX_DIM, SKYBOX_DIM)?;
            pixels[i * face_bytes..(i + 1) * face_bytes].copy_from_slice(&face);
        }

        let skybox_info = vk::ImageCreateInfo::builder()
            .flags(vk::ImageCreateFlags::CUBE_COMPATIBLE)
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: SKYBOX_DIM,
                height: SKYBOX_DIM,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(6)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let skybox_image = unsafe {
            device
                .create_image(&skybox_info, None)
                .map_err(VulkanError::Api)?
        };
        if let Err(e) = pool.bind_image(skybox_image) {
            unsafe { device.destroy_image(skybox_image, None) };
            return Err(e);
        }

        let staging = HostBuffer::new(
            ctx,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write_slice(&pixels)?;

        submit_once(ctx, cmds, |cmd| {
            transition_to_general(&device, cmd, skybox_image, vk::ImageAspectFlags::COLOR, 6);
            let regions: Vec<vk::BufferImageCopy> = (0..6)
                .map(|layer| vk::BufferImageCopy {
                    buffer_offset: (layer as u64) * face_bytes as u64,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: vk::Extent3D {
                        width: SKYBOX_DIM,
                        height: SKYBOX_DIM,
                        depth: 1,
                    },
                })
                .collect();
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    skybox_image,
                    vk::ImageLayout::GENERAL,
                    &regions,
                );
            }
        })?;

        let cube_view_info = vk::ImageViewCreateInfo::builder()
            .image(skybox_image)
            .view_type(vk::ImageViewType::CUBE)
            .format(vk::Format::R8G8B8A8_UNORM)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 6,
            });
        let skybox_view = unsafe {
            device
                .create_image_view(&cube_view_info, None)
                .map_err(VulkanError::Api)?
        };
        views.push(skybox_view);

        // Palette strips; the spare slot repeats the last palette so the
        // cross-fade always has a valid pair to bind.
        let mut palette_views = [vk::ImageView::null(); PALETTE_IMAGE_COUNT];
        for (i, view_slot) in palette_views.iter_mut().enumerate() {
            let file = PALETTE_FILES[i.min(PALETTE_COUNT - 1)];
            let strip = match load_rgba(&asset_dir.join(file), PALETTE_WIDTH, 1) {
                Ok(strip) => strip,
                Err(e) => {
                    destroy_views(&device, &mut views);
                    return Err(e);
                }
            };

            let result = (|| {
                let image = create_image_2d(
                    &device,
                    vk::Format::R8G8B8A8_UNORM,
                    PALETTE_WIDTH,
                    1,
                    vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                )?;
                if let Err(e) = pool.bind_image(image) {
                    unsafe { device.destroy_image(image, None) };
                    return Err(e);
                }

                let staging = HostBuffer::new(
                    ctx,
                    strip.len() as vk::DeviceSize,
                    vk::BufferUsageFlags::TRANSFER_SRC,
                )?;
                staging.write_slice(&strip)?;
                submit_once(ctx, cmds, |cmd| {
                    transition_to_general(&device, cmd, image, vk::ImageAspectFlags::COLOR, 1);
                    let region = vk::BufferImageCopy {
                        buffer_offset: 0,
                        buffer_row_length: 0,
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                        image_extent: vk::Extent3D {
                            width: PALETTE_WIDTH,
                            height: 1,
                            depth: 1,
                        },
                    };
                    unsafe {
                        device.cmd_copy_buffer_to_image(
                            cmd,
                            staging.handle(),
                            image,
                            vk::ImageLayout::GENERAL,
                            &[region],
                        );
                    }
                })?;
                create_view_2d(
                    &device,
                    image,
                    vk::Format::R8G8B8A8_UNORM,
                    vk::ImageAspectFlags::COLOR,
                )
            })();
            match result {
                Ok(view) => {
                    views.push(view);
                    *view_slot = view;
                }
                Err(e) => {
                    destroy_views(&device, &mut views);
                    return Err(e);
                }
            }
        }

        log::info!(
            "Textures: skybox {sky}x{sky} cube, {count} palette strips",
            sky = SKYBOX_DIM,
            count = PALETTE_IMAGE_COUNT,
        );

        Ok(Self {
            device,
            skybox_view,
            palette_views,
            _pool: pool,
        })
    }
}

impl Drop for TextureSet {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.skybox_view, None);
            for view in self.palette_views {
                self.device.destroy_image_view(view, None);
            }
        }
    }
}

/// Linear-tiled R8 font atlas image with a dedicated host-visible
/// allocation; pixels are written directly through a mapping.
pub struct FontTexture {
    device: Device,
    image: vk::Image,
    pub view: vk::ImageView,
    memory: vk::DeviceMemory,
}

impl FontTexture {
    pub fn new(ctx: &VulkanContext, cmds: &CommandPool, atlas: &FontAtlas) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let width = atlas.width();
        let height = atlas.height();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8_UNORM)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::PREINITIALIZED);
        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type = ctx.memory_type_index(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        );
        let memory_type = match memory_type {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(VulkanError::Api(e));
            }
        };
        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        // Linear tiling can pad rows; honor the reported pitch.
        let subresource = vk::ImageSubresource {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            array_layer: 0,
        };
        let layout = unsafe { device.get_image_subresource_layout(image, subresource) };
        unsafe {
            let ptr = device
                .map_memory(memory, 0, requirements.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?
                .cast::<u8>();
            let src = atlas.pixels();
            for row in 0..height as usize {
                let dst = ptr.add(layout.offset as usize + row * layout.row_pitch as usize);
                std::ptr::copy_nonoverlapping(
                    src.as_ptr().add(row * width as usize),
                    dst,
                    width as usize,
                );
            }
            device.unmap_memory(memory);
        }

        submit_once(ctx, cmds, |cmd| {
            let barrier = vk::ImageMemoryBarrier::builder()
                .old_layout(vk::ImageLayout::PREINITIALIZED)
                .new_layout(vk::ImageLayout::GENERAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .build();
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::HOST,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        })?;

        let view = create_view_2d(&device, image, vk::Format::R8_UNORM, vk::ImageAspectFlags::COLOR)?;

        Ok(Self {
            device,
            image,
            view,
            memory,
        })
    }
}

impl Drop for FontTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Demo geometry sharing one host-visible pool: the per-particle seed
/// vertex buffer and the compute-written skybox strip.
pub struct SceneBuffers {
    pub seed_buffer: vk::Buffer,
    pub skybox_geometry: vk::Buffer,
    _pool: BufferMemoryPool,
}

/// Pool budget for the scene buffers; the spare page absorbs the driver's
/// size and alignment rounding plus the skybox strip.
pub(crate) fn scene_pool_size(point_count: u32) -> u64 {
    align_page(u64::from(point_count) * 4) + PAGE_SIZE
}

impl SceneBuffers {
    pub fn new(ctx: &VulkanContext, point_count: u32, seed: u32) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let mut pool = BufferMemoryPool::new(
            ctx,
            scene_pool_size(point_count),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            !0,
        )?;

        let seeds = seed_sequence(seed, point_count as usize);
        let seed_buffer = create_buffer(
            &device,
            (seeds.len() * 4) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let seed_offset = match pool.bind_buffer(seed_buffer) {
            Ok(offset) => offset,
            Err(e) => {
                unsafe { device.destroy_buffer(seed_buffer, None) };
                return Err(e);
            }
        };
        pool.write_slice(seed_offset, &seeds)?;

        // Left empty on the host; the generator compute shader fills it
        // through the storage binding before the first draw.
        let skybox_geometry = create_buffer(
            &device,
            SKYBOX_GEOMETRY_RANGE,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
        )?;
        if let Err(e) = pool.bind_buffer(skybox_geometry) {
            unsafe { device.destroy_buffer(skybox_geometry, None) };
            return Err(e);
        }

        log::info!(
            "Scene buffers: {} seeds from {:#010x} plus the skybox strip, pooled",
            point_count,
            seed
        );

        Ok(Self {
            seed_buffer,
            skybox_geometry,
            _pool: pool,
        })
    }
}

fn create_buffer(
    device: &Device,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
) -> VulkanResult<vk::Buffer> {
    let info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    unsafe { device.create_buffer(&info, None).map_err(VulkanError::Api) }
}

fn create_image_2d(
    device: &Device,
    format: vk::Format,
    width: u32,
    height: u32,
    usage: vk::ImageUsageFlags,
) -> VulkanResult<vk::Image> {
    let info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    unsafe { device.create_image(&info, None).map_err(VulkanError::Api) }
}

fn create_view_2d(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe {
        device
            .create_image_view(&info, None)
            .map_err(VulkanError::Api)
    }
}

fn transition_to_general(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    layer_count: u32,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::GENERAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        })
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Record with `f`, submit, and wait for the queue to drain.
fn submit_once<F: FnOnce(vk::CommandBuffer)>(
    ctx: &VulkanContext,
    cmds: &CommandPool,
    f: F,
) -> VulkanResult<()> {
    let device = ctx.device();
    let cmd = cmds.allocate(1)?[0];
    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe {
        device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(VulkanError::Api)?;
    }
    f(cmd);
    unsafe {
        device.end_command_buffer(cmd).map_err(VulkanError::Api)?;
        let cmds_to_submit = [cmd];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&cmds_to_submit)
            .build();
        device
            .queue_submit(ctx.queue(), &[submit], vk::Fence::null())
            .map_err(VulkanError::Api)?;
        device
            .queue_wait_idle(ctx.queue())
            .map_err(VulkanError::Api)?;
        device.free_command_buffers(cmds.handle(), &cmds_to_submit);
    }
    Ok(())
}

/// Load a PNG and require exact dimensions.
fn load_rgba(path: &Path, width: u32, height: u32) -> VulkanResult<Vec<u8>> {
    let image = image::open(path).map_err(|e| VulkanError::InitializationFailed(format!(
        "failed to load {}: {e}",
        path.display()
    )))?;
    let rgba = image.to_rgba8();
    if rgba.width() != width || rgba.height() != height {
        return Err(VulkanError::InitializationFailed(format!(
            "{} is {}x{}, expected {}x{}",
            path.display(),
            rgba.width(),
            rgba.height(),
            width,
            height
        )));
    }
    Ok(rgba.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_pool_covers_seeds_and_geometry() {
        let size = scene_pool_size(2_000_000);
        assert_eq!(size % PAGE_SIZE, 0);
        assert!(size >= 2_000_000 * 4 + SKYBOX_GEOMETRY_RANGE);
        // Tiny scenes still get at least one whole page.
        assert!(scene_pool_size(1) >= PAGE_SIZE);
    }
}
