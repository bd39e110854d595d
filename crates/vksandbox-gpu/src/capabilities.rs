//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    pub driver_version: u32,
    pub supports_sampler_anisotropy: bool,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| {
                CStr::from_ptr(ext.extension_name.as_ptr())
                    .to_str()
                    .ok()
                    .map(String::from)
            })
            .collect();

        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            device_local_memory_mb,
            available_extensions,
        }
    }

    /// Check if the GPU can run the renderer: Vulkan 1.1 (negative viewport
    /// heights), sampler anisotropy and the swapchain extension.
    pub fn meets_requirements(&self) -> bool {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);

        if api_major < 1 || (api_major == 1 && api_minor < 1) {
            return false;
        }

        if !self.supports_sampler_anisotropy {
            return false;
        }

        self.available_extensions
            .contains(ash::khr::swapchain::NAME.to_str().unwrap_or_default())
    }

    /// Preference score among suitable devices; discrete GPUs first, then VRAM.
    pub fn score(&self) -> u64 {
        let type_score = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 0,
        };
        // +1 per GB
        type_score + self.device_local_memory_mb / 1024
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(api_version: u32, device_type: vk::PhysicalDeviceType) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".to_string(),
            device_type,
            api_version,
            driver_version: 0,
            supports_sampler_anisotropy: true,
            device_local_memory_mb: 4096,
            available_extensions: ["VK_KHR_swapchain".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requirements() {
        let integrated = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(caps(vk::API_VERSION_1_1, integrated).meets_requirements());
        assert!(!caps(vk::API_VERSION_1_0, integrated).meets_requirements());

        let mut no_aniso = caps(vk::API_VERSION_1_2, integrated);
        no_aniso.supports_sampler_anisotropy = false;
        assert!(!no_aniso.meets_requirements());

        let mut no_swapchain = caps(vk::API_VERSION_1_2, integrated);
        no_swapchain.available_extensions.clear();
        assert!(!no_swapchain.meets_requirements());
    }

    #[test]
    fn discrete_outscores_integrated() {
        let discrete = caps(vk::API_VERSION_1_2, vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = caps(vk::API_VERSION_1_2, vk::PhysicalDeviceType::INTEGRATED_GPU);
        assert!(discrete.score() > integrated.score());
    }
}
