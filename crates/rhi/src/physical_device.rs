//! GPU selection and queue family negotiation.
//!
//! A candidate must expose the swapchain extension, report at least one
//! surface format and present mode, and have some family that draws and some
//! family that presents. The two families are negotiated independently.
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(surface: vk::SurfaceKHR) -> Result<(), vkframe_rhi::RhiError> {
//! let instance = Instance::new(c"demo", &[], false)?;
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let gpu = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("{:?}", gpu);
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::facade::QueueFamilies;
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every candidate GPU must expose.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Families found so far; either may be missing on an unsuitable GPU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Distinct families, graphics first. One queue is created per entry.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }

    /// Converts complete indices into [`QueueFamilies`].
    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// What one queue family can do, as far as family negotiation cares.
#[derive(Clone, Copy, Debug, Default)]
pub struct FamilySupport {
    pub queue_count: u32,
    pub graphics: bool,
    pub present: bool,
}

/// Picks the graphics and present families.
///
/// A family that supports both wins. Otherwise the first graphics family and
/// the first present family are chosen separately.
pub fn pick_queue_families(families: &[FamilySupport]) -> QueueFamilyIndices {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, family)| (i as u32, family))
    };

    if let Some((index, _)) = usable().find(|(_, family)| family.graphics && family.present) {
        return QueueFamilyIndices {
            graphics_family: Some(index),
            present_family: Some(index),
        };
    }

    QueueFamilyIndices {
        graphics_family: usable()
            .find(|(_, family)| family.graphics)
            .map(|(index, _)| index),
        present_family: usable()
            .find(|(_, family)| family.present)
            .map(|(index, _)| index),
    }
}

/// The selected GPU and the facts the logical device is built from.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// `(major, minor, patch)` of the supported API.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Sum of the device-local heaps, in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU can both draw and present,
/// expose the swapchain extension and report at least one surface format and
/// present mode.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();

    for device in devices {
        if let Some(info) = check_device_suitability(instance, device, surface, surface_loader) {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            suitable_devices.push((info, score));
        }
    }

    // Highest score first
    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let Some((selected_device, score)) = suitable_devices.into_iter().next() else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}, graphics family {}, present family {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        score,
        selected_device.queue_families.graphics,
        selected_device.queue_families.present
    );

    Ok(selected_device)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown")
        .to_string();

    let indices = find_queue_families(instance, device, surface, surface_loader);
    let Some(queue_families) = indices.resolve() else {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            indices.graphics_family.is_some(),
            indices.present_family.is_some()
        );
        return None;
    };

    if !supports_device_extensions(instance, device) {
        debug!("GPU '{}' skipped: swapchain extension missing", device_name);
        return None;
    }

    match SwapchainSupportDetails::query(device, surface, surface_loader) {
        Ok(support) if support.is_adequate() => {}
        _ => {
            debug!("GPU '{}' skipped: inadequate surface support", device_name);
            return None;
        }
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

fn supports_device_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(available) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };

    DEVICE_EXTENSIONS.iter().all(|required| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str() == Ok(*required))
    })
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let properties = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let families: Vec<FamilySupport> = properties
        .iter()
        .enumerate()
        .map(|(i, family)| FamilySupport {
            queue_count: family.queue_count,
            graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present: unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, i as u32, surface)
                    .unwrap_or(false)
            },
        })
        .collect();

    pick_queue_families(&families)
}

fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    device_score(
        info.properties.device_type,
        info.properties.limits.max_image_dimension2_d,
        info.device_local_memory(),
        info.queue_families,
    )
}

/// Higher is better. Device type dominates; a shared graphics/present family
/// breaks ties because it avoids concurrent image sharing.
fn device_score(
    device_type: vk::PhysicalDeviceType,
    max_image_dimension: u32,
    device_local_bytes: u64,
    queue_families: QueueFamilies,
) -> u32 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10_000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1_000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };
    // Memory counts in MiB, capped at 16 GiB.
    let memory_score = (device_local_bytes >> 20).min(16_000) as u32;
    let family_score = if queue_families.is_unified() { 100 } else { 0 };

    type_score + max_image_dimension + memory_score + family_score
}
