//! Descriptor pool, per-slot sets, and the samplers they reference.
//!
//! One descriptor set exists per frame slot and every binding in it is
//! rewritten each frame; the palette bindings rotate through the palette
//! views as the cross-fade advances, so nothing in a set is stable enough
//! to cache.

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::pipeline::{
    binding, CommonLayout, CONSTANTS_RANGE, SKYBOX_GEOMETRY_RANGE,
};
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};

/// The three samplers shared by every frame.
pub struct Samplers {
    device: Device,
    pub linear_clamp: vk::Sampler,
    pub linear_repeat: vk::Sampler,
    pub nearest: vk::Sampler,
}

impl Samplers {
    pub fn new(ctx: &VulkanContext) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let make = |filter, address_mode| {
            let info = vk::SamplerCreateInfo::builder()
                .mag_filter(filter)
                .min_filter(filter)
                .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
                .address_mode_u(address_mode)
                .address_mode_v(address_mode)
                .address_mode_w(address_mode)
                .compare_op(vk::CompareOp::ALWAYS)
                .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE);
            unsafe { device.create_sampler(&info, None).map_err(VulkanError::Api) }
        };

        let linear_clamp = make(vk::Filter::LINEAR, vk::SamplerAddressMode::CLAMP_TO_EDGE)?;
        let linear_repeat = match make(vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_sampler(linear_clamp, None) };
                return Err(e);
            }
        };
        let nearest = match make(vk::Filter::NEAREST, vk::SamplerAddressMode::CLAMP_TO_EDGE) {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe {
                    device.destroy_sampler(linear_clamp, None);
                    device.destroy_sampler(linear_repeat, None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            device,
            linear_clamp,
            linear_repeat,
            nearest,
        })
    }
}

impl Drop for Samplers {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.linear_clamp, None);
            self.device.destroy_sampler(self.linear_repeat, None);
            self.device.destroy_sampler(self.nearest, None);
        }
    }
}

/// Resource handles written into a frame slot's descriptor set.
pub struct FrameBindings<'a> {
    pub constants: vk::Buffer,
    pub accum_view: vk::ImageView,
    pub skybox_view: vk::ImageView,
    /// Current and next palette views, in cross-fade order.
    pub palette_views: (vk::ImageView, vk::ImageView),
    pub font_view: vk::ImageView,
    pub skybox_geometry: vk::Buffer,
    pub samplers: &'a Samplers,
}

/// Fixed-size descriptor pool plus one set per frame slot.
pub struct DescriptorArena {
    device: Device,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl DescriptorArena {
    pub fn new(ctx: &VulkanContext, layout: &CommonLayout, set_count: u32) -> VulkanResult<Self> {
        let device = ctx.device().clone();
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 2 * set_count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 5 * set_count,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let layouts = vec![layout.set_layout(); set_count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(e) => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self { device, pool, sets })
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    /// Rewrite every binding of `slot`'s set for this frame.
    pub fn write_frame(&self, slot: usize, bindings: &FrameBindings<'_>) {
        let set = self.sets[slot];

        let constants_info = [vk::DescriptorBufferInfo {
            buffer: bindings.constants,
            offset: 0,
            range: CONSTANTS_RANGE,
        }];
        let geometry_info = [vk::DescriptorBufferInfo {
            buffer: bindings.skybox_geometry,
            offset: 0,
            range: SKYBOX_GEOMETRY_RANGE,
        }];
        let image = |view, sampler| {
            [vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::GENERAL,
            }]
        };
        let accum_info = image(bindings.accum_view, bindings.samplers.linear_clamp);
        let skybox_info = image(bindings.skybox_view, bindings.samplers.linear_clamp);
        let palette_a_info = image(bindings.palette_views.0, bindings.samplers.linear_repeat);
        let palette_b_info = image(bindings.palette_views.1, bindings.samplers.linear_repeat);
        let font_info = image(bindings.font_view, bindings.samplers.nearest);

        let buffer_write = |binding, info| {
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(info)
                .build()
        };
        let image_write = |binding, info| {
            vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(info)
                .build()
        };

        let writes = [
            buffer_write(binding::CONSTANTS, &constants_info),
            image_write(binding::ACCUM_IMAGE, &accum_info),
            image_write(binding::SKYBOX, &skybox_info),
            image_write(binding::PALETTE_A, &palette_a_info),
            image_write(binding::PALETTE_B, &palette_b_info),
            image_write(binding::FONT, &font_info),
            buffer_write(binding::SKYBOX_GEOMETRY, &geometry_info),
        ];
        unsafe {
            self.device.update_descriptor_sets(&writes, &[]);
        }
    }
}

impl Drop for DescriptorArena {
    fn drop(&mut self) {
        unsafe {
            // Sets are returned with the pool.
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
