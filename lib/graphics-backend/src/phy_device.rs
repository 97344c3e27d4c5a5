//! Physical device enumeration and selection (C1).

use ash::vk;

use crate::error::{BackendError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuType {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

fn vk_gputype_to_gpu_type(ty: vk::PhysicalDeviceType) -> GpuType {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => GpuType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => GpuType::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => GpuType::Virtual,
        vk::PhysicalDeviceType::CPU => GpuType::Cpu,
        _ => GpuType::Other,
    }
}

fn vendor_name(vendor_id: u32) -> &'static str {
    match vendor_id {
        0x1002 => "AMD",
        0x1010 => "ImgTec",
        0x106b => "Apple",
        0x10de => "NVIDIA",
        0x13b5 => "ARM",
        0x5143 => "Qualcomm",
        0x8086 => "INTEL",
        0x10005 => "Mesa",
        _ => "unknown",
    }
}

/// Decodes `driverVersion` per the vendor's own packing scheme, matching
/// the teacher's `get_driver_verson`.
fn decode_driver_version(vendor_id: u32, version: u32) -> (u32, u32, u32) {
    if vendor_id == 0x10de {
        (
            (version >> 22) & 0x3ff,
            (version >> 14) & 0xff,
            (version >> 6) & 0xff,
        )
    } else if vendor_id == 0x8086 && cfg!(target_os = "windows") {
        ((version >> 14) & 0x3ffff, version & 0x3fff, 0)
    } else {
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

pub struct PhyDevice {
    pub raw: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_family_index: u32,
    pub gpu_type: GpuType,
    pub renderer_name: String,
    pub vendor_name: &'static str,
    pub driver_version_string: String,
    pub supports_vulkan_1_3: bool,
}

impl PhyDevice {
    /// Selects a physical device honoring `gpu_selector` (`"auto"` or a
    /// case-insensitive substring of the device name), requiring a
    /// graphics-capable queue family and (outside headless mode) Vulkan
    /// 1.3, matching `PhyDevice::new`'s device walk.
    pub fn select(
        instance: &ash::Instance,
        gpu_selector: &str,
        headless_allows_1_2: bool,
    ) -> Result<PhyDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| BackendError::vk("enumerate_physical_devices", e))?;
        if devices.is_empty() {
            return Err(BackendError::DeviceUnavailable("no Vulkan physical devices found".into()));
        }

        let auto = gpu_selector.eq_ignore_ascii_case("auto");
        let mut best: Option<PhyDevice> = None;

        for raw in devices {
            let properties = unsafe { instance.get_physical_device_properties(raw) };
            let memory_properties = unsafe { instance.get_physical_device_memory_properties(raw) };
            let renderer_name = unsafe {
                std::ffi::CStr::from_ptr(properties.device_name.as_ptr())
                    .to_string_lossy()
                    .into_owned()
            };

            let meets_version = properties.api_version >= vk::API_VERSION_1_3
                || (headless_allows_1_2 && properties.api_version >= vk::API_VERSION_1_2);
            if !meets_version {
                continue;
            }

            if !auto && !renderer_name.to_lowercase().contains(&gpu_selector.to_lowercase()) {
                continue;
            }

            let queue_families =
                unsafe { instance.get_physical_device_queue_family_properties(raw) };
            let Some(queue_family_index) = queue_families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|i| i as u32)
            else {
                continue;
            };

            let gpu_type = vk_gputype_to_gpu_type(properties.device_type);
            let (maj, min, patch) = decode_driver_version(properties.vendor_id, properties.driver_version);

            let candidate = PhyDevice {
                raw,
                properties,
                memory_properties,
                queue_family_index,
                gpu_type,
                renderer_name,
                vendor_name: vendor_name(properties.vendor_id),
                driver_version_string: format!("{maj}.{min}.{patch}"),
                supports_vulkan_1_3: properties.api_version >= vk::API_VERSION_1_3,
            };

            let better = match &best {
                None => true,
                Some(b) => {
                    !auto
                        || (candidate.gpu_type == GpuType::Discrete
                            && b.gpu_type != GpuType::Discrete)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        best.ok_or_else(|| {
            BackendError::DeviceUnavailable(format!(
                "no suitable physical device for selector {gpu_selector:?}"
            ))
        })
    }

    pub fn supports_linear_blit(&self, instance: &ash::Instance, format: vk::Format) -> bool {
        let props = unsafe { instance.get_physical_device_format_properties(self.raw, format) };
        props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    pub fn supports_blit_src_dst(&self, instance: &ash::Instance, format: vk::Format) -> bool {
        let props = unsafe { instance.get_physical_device_format_properties(self.raw, format) };
        let flags = props.optimal_tiling_features;
        flags.contains(vk::FormatFeatureFlags::BLIT_SRC) && flags.contains(vk::FormatFeatureFlags::BLIT_DST)
    }

    pub fn max_msaa_samples(&self) -> vk::SampleCountFlags {
        let limits = &self.properties.limits;
        let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
        for flag in [
            vk::SampleCountFlags::TYPE_64,
            vk::SampleCountFlags::TYPE_32,
            vk::SampleCountFlags::TYPE_16,
            vk::SampleCountFlags::TYPE_8,
            vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_2,
        ] {
            if counts.contains(flag) {
                return flag;
            }
        }
        vk::SampleCountFlags::TYPE_1
    }
}
