//! Thin typed wrapper around a GPU-visible storage buffer (C11, §3
//! "StorageBuffer ... derived entity").

use graphics_types::{BufferUsage, MemoryLocation};

use crate::context::Context;
use crate::error::Result;
use crate::handles::BufferHandle;

/// A storage buffer sized once at creation, optionally device-addressable
/// (for buffer-reference-style shader access, e.g. the per-draw
/// `vertex_buffer_address` pushed by `MeshPass`, §4.9).
pub struct StorageBuffer {
    pub handle: BufferHandle,
    pub size: u64,
}

impl StorageBuffer {
    pub fn create(ctx: &mut Context, size: u64, cpu_visible: bool, device_addressable: bool) -> Result<StorageBuffer> {
        let mut usage = BufferUsage::STORAGE | BufferUsage::TRANSFER_DST;
        if device_addressable {
            usage |= BufferUsage::SHADER_DEVICE_ADDRESS;
        }
        let location = if cpu_visible { MemoryLocation::CpuVisible } else { MemoryLocation::GpuOnly };
        let handle = ctx.buffer_create(size, usage, location)?;
        Ok(StorageBuffer { handle, size })
    }

    pub fn device_address(&self, ctx: &Context) -> Result<ash::vk::DeviceAddress> {
        ctx.buffer_get_device_address(self.handle)
    }

    /// Copies `data` into the buffer. For a CPU-visible buffer this is a
    /// direct `memcpy`; for a GPU-only buffer this stages through
    /// `immediate_submit` on the transfer queue.
    pub fn upload(&self, ctx: &mut Context, data: &[u8]) -> Result<()> {
        if let Ok(ptr) = ctx.buffer_map(self.handle) {
            unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len()) };
            return Ok(());
        }

        let staging = ctx.buffer_create(data.len() as u64, BufferUsage::TRANSFER_SRC, MemoryLocation::CpuVisible)?;
        unsafe {
            let ptr = ctx.buffer_map(staging)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        let staging_raw = ctx.buffer(staging).unwrap().raw;
        let dst_raw = ctx.buffer(self.handle).unwrap().raw;
        let size = data.len() as u64;
        ctx.immediate_submit.immediate_submit(&ctx.device.raw, graphics_types::QueueKind::Transfer, |cmd| {
            crate::commands::copy_buffer(&ctx.device.raw, cmd, staging_raw, dst_raw, 0, 0, size);
        })?;
        ctx.buffer_free(staging);
        Ok(())
    }

    pub fn free(self, ctx: &mut Context) {
        ctx.buffer_free(self.handle);
    }
}
