//! Swapchain creation, acquire, and present.

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::extensions::khr;
use ash::{vk, Device};

/// Preferred presentation format; anything else is a logged fallback.
const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

pub struct Swapchain {
    device: Device,
    loader: khr::Swapchain,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain with `desired_images` images if the surface
    /// allows it; the count is clamped (with a warning) otherwise.
    pub fn new(ctx: &VulkanContext, desired_images: u32, width: u32, height: u32) -> VulkanResult<Self> {
        let surface = ctx.surface();
        let surface_loader = ctx.surface_loader();
        let physical_device = ctx.physical_device();

        let caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        if formats.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "surface reports no formats".into(),
            ));
        }

        let surface_format = formats
            .iter()
            .copied()
            .find(|f| {
                f.format == PREFERRED_FORMAT
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .unwrap_or_else(|| {
                log::warn!(
                    "Preferred surface format {:?} unavailable, using {:?}",
                    PREFERRED_FORMAT,
                    formats[0].format
                );
                formats[0]
            });

        let image_count =
            clamp_image_count(desired_images, caps.min_image_count, caps.max_image_count);
        if image_count != desired_images {
            log::warn!(
                "Surface limits swapchain to {} images ({} requested)",
                image_count,
                desired_images
            );
        }

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let device = ctx.device().clone();
        let loader = khr::Swapchain::new(ctx.instance(), &device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        log::info!(
            "Swapchain: {} images, {:?}, {}x{}",
            images.len(),
            surface_format.format,
            extent.width,
            extent.height
        );

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = match unsafe { device.create_image_view(&view_info, None) } {
                Ok(view) => view,
                Err(e) => {
                    for view in views.drain(..) {
                        unsafe { device.destroy_image_view(view, None) };
                    }
                    unsafe { loader.destroy_swapchain(swapchain, None) };
                    return Err(VulkanError::Api(e));
                }
            };
            views.push(view);
        }

        Ok(Self {
            device,
            loader,
            swapchain,
            images,
            views,
            format: surface_format.format,
            extent,
        })
    }

    /// Blocking acquire of the next presentable image. Any API failure,
    /// including an out-of-date surface, is fatal to the frame loop.
    pub fn acquire(&self, signal: vk::Semaphore) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, signal, vk::Fence::null())?
        };
        if suboptimal {
            log::warn!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    pub fn present(&self, queue: vk::Queue, index: u32) -> VulkanResult<()> {
        let swapchains = [self.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&indices);
        let suboptimal = unsafe { self.loader.queue_present(queue, &present_info)? };
        if suboptimal {
            log::warn!("Present reported a suboptimal swapchain");
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    pub fn view(&self, index: usize) -> vk::ImageView {
        self.views[index]
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Clamp the requested image count into the surface's supported range
/// (`max == 0` means unbounded). A surface demanding more images than
/// requested is fine; callers size every per-image resource from the
/// granted count.
fn clamp_image_count(desired: u32, min: u32, max: u32) -> u32 {
    let count = desired.max(min);
    if max != 0 {
        count.min(max)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_respects_surface_limits() {
        assert_eq!(clamp_image_count(3, 2, 8), 3);
        assert_eq!(clamp_image_count(3, 2, 0), 3);
        assert_eq!(clamp_image_count(3, 2, 2), 2);
        assert_eq!(clamp_image_count(3, 3, 3), 3);
    }

    #[test]
    fn surfaces_demanding_more_images_are_accommodated() {
        // A driver whose minimum is above the requested depth grants more
        // images than asked for; creation proceeds with the larger count.
        assert_eq!(clamp_image_count(3, 4, 8), 4);
        assert_eq!(clamp_image_count(3, 4, 0), 4);
    }
}
