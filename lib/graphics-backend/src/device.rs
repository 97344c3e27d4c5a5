//! Logical device and queue bring-up (C1), requiring the explicit feature
//! set the spec's data model depends on: dynamic rendering, synchronization2,
//! descriptor indexing, buffer device address.

use std::ffi::CString;

use ash::vk;
use parking_lot::Mutex;

use crate::error::{BackendError, Result};
use crate::phy_device::PhyDevice;

pub struct Queue {
    pub raw: vk::Queue,
    pub family_index: u32,
    /// Guards submissions to this queue from multiple threads (§5
    /// "parallel producers ... serialize on the mutex").
    pub submit_lock: Mutex<()>,
}

pub struct LogicalDevice {
    pub raw: ash::Device,
    pub graphics_queue: Queue,
    /// The spec's "transfer" queue kind; if the device exposes no distinct
    /// transfer-only family this aliases the graphics queue, which is
    /// always valid for transfer operations.
    pub transfer_queue: Queue,
}

impl LogicalDevice {
    pub fn new(instance: &ash::Instance, phy: &PhyDevice) -> Result<LogicalDevice> {
        let priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(phy.queue_family_index)
            .queue_priorities(&priorities);
        let queue_infos = [queue_info];

        let extension_names: Vec<CString> = vec![
            CString::new("VK_KHR_swapchain").unwrap(),
            CString::new("VK_KHR_dynamic_rendering").unwrap(),
            CString::new("VK_KHR_synchronization2").unwrap(),
            CString::new("VK_KHR_buffer_device_address").unwrap(),
            CString::new("VK_EXT_descriptor_indexing").unwrap(),
        ];
        let extension_ptrs: Vec<*const i8> = extension_names.iter().map(|e| e.as_ptr()).collect();

        let mut dynamic_rendering =
            vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut sync2 =
            vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut buffer_device_address =
            vk::PhysicalDeviceBufferDeviceAddressFeatures::default().buffer_device_address(true);
        let mut descriptor_indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .shader_sampled_image_array_non_uniform_indexing(true)
            .descriptor_binding_partially_bound(true)
            .runtime_descriptor_array(true);

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features)
            .push_next(&mut dynamic_rendering)
            .push_next(&mut sync2)
            .push_next(&mut buffer_device_address)
            .push_next(&mut descriptor_indexing);

        let raw = unsafe { instance.create_device(phy.raw, &create_info, None) }
            .map_err(|e| BackendError::DeviceUnavailable(format!("vkCreateDevice failed: {e}")))?;

        let queue = unsafe { raw.get_device_queue(phy.queue_family_index, 0) };

        Ok(LogicalDevice {
            graphics_queue: Queue {
                raw: queue,
                family_index: phy.queue_family_index,
                submit_lock: Mutex::new(()),
            },
            transfer_queue: Queue {
                raw: queue,
                family_index: phy.queue_family_index,
                submit_lock: Mutex::new(()),
            },
            raw,
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(|e| BackendError::vk("device_wait_idle", e))
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_device(None) };
    }
}
