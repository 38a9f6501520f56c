//! Instance, surface, and device setup.
//!
//! One graphics queue family that can also present is all the demo needs;
//! devices without such a family are rejected as unsupported.

use ash::extensions::khr;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use thiserror::Error;

/// Errors surfaced by the Vulkan layer.
#[derive(Debug, Error)]
pub enum VulkanError {
    #[error("Vulkan API error: {0}")]
    Api(#[from] vk::Result),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("No Vulkan device with a graphics+present queue family")]
    NoSuitableDevice,

    #[error("No suitable memory type available")]
    NoSuitableMemoryType,

    #[error("Memory pool exhausted: requested {requested} bytes, {available} available")]
    OutOfPoolMemory { requested: u64, available: u64 },

    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("Shader load failed for {path}: {reason}")]
    ShaderLoad { path: String, reason: String },
}

pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Owns the instance, surface, logical device, and the single graphics queue.
pub struct VulkanContext {
    _entry: Entry,
    instance: Instance,
    surface_loader: khr::Surface,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device: Device,
    queue: vk::Queue,
    queue_family_index: u32,
    device_name: String,
}

impl VulkanContext {
    /// Build the full context.
    ///
    /// `instance_extensions` comes from the windowing layer; `create_surface`
    /// is called once the instance exists and hands back the surface the
    /// swapchain will present to.
    pub fn new<F>(
        app_name: &str,
        instance_extensions: &[String],
        create_surface: F,
    ) -> VulkanResult<Self>
    where
        F: FnOnce(&Entry, &Instance) -> VulkanResult<vk::SurfaceKHR>,
    {
        let entry = Entry::linked();

        let app_name_c = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("app name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 1, 1, 0))
            .engine_name(&app_name_c)
            .api_version(vk::API_VERSION_1_0);

        let extension_names: Vec<CString> = instance_extensions
            .iter()
            .map(|name| {
                CString::new(name.as_str()).map_err(|_| {
                    VulkanError::InitializationFailed(format!("bad extension name {name:?}"))
                })
            })
            .collect::<VulkanResult<_>>()?;
        let extension_ptrs: Vec<*const i8> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let layer_ptrs = if cfg!(debug_assertions) && has_validation_layer(&entry) {
            log::info!("Enabling {}", VALIDATION_LAYER.to_string_lossy());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let surface = match create_surface(&entry, &instance) {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        let surface_loader = khr::Surface::new(&entry, &instance);

        let (physical_device, queue_family_index) =
            match pick_device(&instance, &surface_loader, surface) {
                Ok(pair) => pair,
                Err(e) => {
                    unsafe {
                        surface_loader.destroy_surface(surface, None);
                        instance.destroy_instance(None);
                    }
                    return Err(e);
                }
            };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();
        log::info!(
            "Using {} (queue family {})",
            device_name,
            queue_family_index
        );

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities);
        let device_extensions = [khr::Swapchain::name().as_ptr()];
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_extension_names(&device_extensions);

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) }
        {
            Ok(device) => device,
            Err(e) => {
                unsafe {
                    surface_loader.destroy_surface(surface, None);
                    instance.destroy_instance(None);
                }
                return Err(VulkanError::Api(e));
            }
        };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        Ok(Self {
            _entry: entry,
            instance,
            surface_loader,
            surface,
            physical_device,
            device,
            queue,
            queue_family_index,
            device_name,
        })
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    /// Marketing name of the physical device, shown in the overlay.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// First memory type satisfying `type_bits` and `properties`.
    pub fn memory_type_index(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        let mem_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };
        for i in 0..mem_properties.memory_type_count {
            if (type_bits & (1 << i)) != 0
                && mem_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
            {
                return Ok(i);
            }
        }
        Err(VulkanError::NoSuitableMemoryType)
    }

    /// Block until the GPU has drained all submitted work.
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("device_wait_idle failed: {e}");
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

fn has_validation_layer(entry: &Entry) -> bool {
    match entry.enumerate_instance_layer_properties() {
        Ok(layers) => layers.iter().any(|layer| {
            (unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }) == VALIDATION_LAYER
        }),
        Err(_) => false,
    }
}

/// Pick a physical device with a queue family doing both graphics and
/// present, preferring discrete GPUs.
fn pick_device(
    instance: &Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
) -> VulkanResult<(vk::PhysicalDevice, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut fallback = None;
    for device in devices {
        let Some(family) = find_queue_family(instance, surface_loader, surface, device)? else {
            continue;
        };
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            return Ok((device, family));
        }
        if fallback.is_none() {
            fallback = Some((device, family));
        }
    }
    fallback.ok_or(VulkanError::NoSuitableDevice)
}

fn find_queue_family(
    instance: &Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> VulkanResult<Option<u32>> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        let presentable = unsafe {
            surface_loader.get_physical_device_surface_support(device, index, surface)?
        };
        if presentable {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
