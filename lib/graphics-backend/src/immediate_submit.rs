//! Immediate submit channel (C6, §4.6). Grounded in the original engine's
//! `ImmediateBuffer` pair (transfer/graphics), each with its own fence,
//! command pool, pre-allocated buffer, and mutex.

use ash::vk;
use graphics_types::QueueKind;
use parking_lot::Mutex;

use crate::error::{BackendError, Result};

struct ImmediateBuffer {
    fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    queue: vk::Queue,
}

/// One serialized channel per queue kind (§4.6 "This gives a single serial
/// channel per queue kind; parallel producers serialize on the mutex").
pub struct ImmediateSubmitChannel {
    transfer: Mutex<ImmediateBuffer>,
    graphics: Mutex<ImmediateBuffer>,
}

impl ImmediateSubmitChannel {
    pub fn new(
        device: &ash::Device,
        graphics_queue: vk::Queue,
        transfer_queue: vk::Queue,
        queue_family_index: u32,
    ) -> Result<ImmediateSubmitChannel> {
        let make = || -> Result<ImmediateBuffer> {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                .queue_family_index(queue_family_index);
            let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
                .map_err(|e| BackendError::vk("create_command_pool", e))?;

            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
                .map_err(|e| BackendError::vk("allocate_command_buffers", e))?[0];

            let fence_info =
                vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let fence = unsafe { device.create_fence(&fence_info, None) }
                .map_err(|e| BackendError::vk("create_fence", e))?;

            Ok(ImmediateBuffer { fence, command_pool, command_buffer, queue: vk::Queue::null() })
        };

        let mut transfer = make()?;
        let mut graphics = make()?;
        transfer.queue = transfer_queue;
        graphics.queue = graphics_queue;

        Ok(ImmediateSubmitChannel {
            transfer: Mutex::new(transfer),
            graphics: Mutex::new(graphics),
        })
    }

    /// Acquires the queue's mutex, resets fence and buffer, records via
    /// `record`, submits, and blocks until the fence signals (§4.6 steps
    /// 1–5). The recording closure's effects are guaranteed visible to the
    /// caller once this returns.
    pub fn immediate_submit(
        &self,
        device: &ash::Device,
        kind: QueueKind,
        record: impl FnOnce(vk::CommandBuffer),
    ) -> Result<()> {
        let slot = match kind {
            QueueKind::Transfer => &self.transfer,
            QueueKind::Graphics => &self.graphics,
        };
        let guard = slot.lock();

        unsafe {
            device
                .wait_for_fences(&[guard.fence], true, u64::MAX)
                .map_err(|e| BackendError::vk("wait_for_fences", e))?;
            device
                .reset_fences(&[guard.fence])
                .map_err(|e| BackendError::vk("reset_fences", e))?;
            device
                .reset_command_buffer(guard.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| BackendError::vk("reset_command_buffer", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(guard.command_buffer, &begin_info)
                .map_err(|e| BackendError::vk("begin_command_buffer", e))?;

            record(guard.command_buffer);

            device
                .end_command_buffer(guard.command_buffer)
                .map_err(|e| BackendError::vk("end_command_buffer", e))?;

            let buffers = [guard.command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
            device
                .queue_submit(guard.queue, &[submit_info], guard.fence)
                .map_err(|e| BackendError::vk("queue_submit", e))?;

            device
                .wait_for_fences(&[guard.fence], true, u64::MAX)
                .map_err(|e| BackendError::vk("wait_for_fences (completion)", e))?;
        }

        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        for buf in [self.transfer.lock(), self.graphics.lock()] {
            unsafe {
                device.destroy_command_pool(buf.command_pool, None);
                device.destroy_fence(buf.fence, None);
            }
        }
    }
}
