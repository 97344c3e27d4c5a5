use ash::vk;
use graphics_types::{BufferUsage, MemoryLocation};

use crate::allocator::DeviceMemory;

/// A buffer resource (§3 "Buffer"). `device_address` is only populated if
/// the buffer was created with [`BufferUsage::SHADER_DEVICE_ADDRESS`]
/// (§4.1 `buffer_get_device_address`).
pub struct Buffer {
    pub raw: vk::Buffer,
    pub memory: DeviceMemory,
    pub size: u64,
    pub usage: BufferUsage,
    pub location: MemoryLocation,
    pub device_address: Option<vk::DeviceAddress>,
}

impl Buffer {
    /// `None` if this buffer is GPU-only (§3 "GPU-only buffers fail to
    /// map").
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        if self.location != MemoryLocation::CpuVisible {
            return None;
        }
        self.memory.mapped_ptr
    }
}
