use ash::vk;

/// Optional classical render-pass path (§3 "RenderPass, FrameBuffer.
/// Optional path for drivers that prefer classical passes; otherwise
/// dynamic rendering is used"). The renderer itself always uses dynamic
/// rendering (§4.2 "Pipeline creation uses dynamic rendering ... not a
/// classical render pass"); these exist so a pipeline built for a classical
/// render pass (e.g. the original engine's non-dynamic-rendering fallback)
/// can still be expressed with the same resource-manager contract.
pub struct RenderPass {
    pub raw: vk::RenderPass,
}

pub struct FrameBuffer {
    pub raw: vk::Framebuffer,
    pub width: u32,
    pub height: u32,
}
