//! Driver-agnostic types shared between the backend and its collaborators.
//!
//! Nothing in this crate depends on `ash`; it only describes the shapes of
//! data the backend consumes (formats, usage flags, uniform schemas,
//! configuration). Keeping it driver-free means a collaborator crate can
//! depend on it without pulling in Vulkan.

mod config;
mod flags;
mod format;
mod uniform;

pub use config::*;
pub use flags::*;
pub use format::*;
pub use uniform::*;
