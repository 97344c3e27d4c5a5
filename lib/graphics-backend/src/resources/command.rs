use ash::vk;

/// A command pool, bound to a single queue family (§3 "CommandPool").
pub struct CommandPool {
    pub raw: vk::CommandPool,
    pub queue_family_index: u32,
}

/// Observable recording states (§4.5): a command buffer is in one of
/// *initial* (just reset), *recording* (after `begin`), or *executable*
/// (after `end`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
}

/// A primary command buffer (§3 "buffers are primary").
pub struct CommandBuffer {
    pub raw: vk::CommandBuffer,
    pub state: CommandBufferState,
}
