//! The Vulkan backend core (§2 scope): a single explicit [`Context`], typed
//! resource handles, a [`renderer::Renderer`] frame loop, and a user-
//! extensible [`pass::Pass`] pipeline.
//!
//! Nothing here is a complete renderer on its own — [`crate::material`] and
//! [`crate::pass`] supply the scene-facing vocabulary, but the actual scene
//! representation and asset loading live outside this crate (§6 "the core
//! has no opinion on ... mesh/texture loading").

pub mod allocator;
pub mod commands;
pub mod context;
pub mod descriptor_pool;
pub mod device;
pub mod error;
pub mod handles;
pub mod immediate_submit;
pub mod instance;
pub mod material;
pub mod pass;
pub mod phy_device;
pub mod pipeline_factory;
pub mod reflect;
pub mod renderer;
pub mod resources;
pub mod storage_buffer;
pub mod texture;

pub use context::{Context, MainThreadQueueHandle};
pub use error::{BackendError, Result};
pub use handles::*;
pub use renderer::Renderer;
