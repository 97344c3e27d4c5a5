use ash::vk;
use graphics_types::{Format, ImageUsage};

use crate::allocator::DeviceMemory;

/// An image resource (§3 "Image"). Current layout is intentionally not
/// stored here — the core trusts the layout the caller passes to
/// transition/copy operations (§3 "application-tracked").
pub struct Image {
    pub raw: vk::Image,
    pub view: vk::ImageView,
    pub memory: Option<DeviceMemory>,
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: ImageUsage,
    /// `true` if this image's lifetime is owned by a swapchain — such
    /// images must not be freed individually (§3 "Swapchain images are
    /// owned by the swapchain").
    pub swapchain_owned: bool,
}

impl Image {
    /// Mip level count derived from requesting mipmaps on a `width x
    /// height` image (§3 "mip level count (derived from mipmapped flag)").
    pub fn mip_levels_for(width: u32, height: u32, mipmapped: bool) -> u32 {
        if !mipmapped {
            return 1;
        }
        (32 - width.max(height).max(1).leading_zeros()).max(1)
    }
}
