//! The resource manager's concrete per-kind storage (C2, §3 "Data Model").
//! Each module defines the bookkeeping struct a [`crate::handles::Handle`]
//! of that kind resolves to; creation/free logic lives on
//! [`crate::context::Context`] since it needs the device, allocator, and
//! (for images/buffers with initial data) the immediate-submit channel.

pub mod buffer;
pub mod command;
pub mod image;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod uniform_set;

pub use buffer::Buffer;
pub use command::{CommandBuffer, CommandBufferState, CommandPool};
pub use image::Image;
pub use pipeline::Pipeline;
pub use render_pass::{FrameBuffer, RenderPass};
pub use sampler::Sampler;
pub use shader::Shader;
pub use sync::{Fence, Semaphore};
pub use uniform_set::UniformSet;
