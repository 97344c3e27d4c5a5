//! Swapchain lifecycle helpers (C7, §4.7), adapted from the teacher's
//! `Swapchain` static helper methods (`get_presentation_mode`,
//! `get_swap_image_size`, `get_format`, ...).

use ash::vk;

use crate::error::{BackendError, Result};

pub struct SwapchainSurfaceProperties {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn get_surface_properties(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SwapchainSurfaceProperties> {
    unsafe {
        let capabilities = surface_loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .map_err(|e| BackendError::vk("get_physical_device_surface_capabilities", e))?;
        let formats = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(|e| BackendError::vk("get_physical_device_surface_formats", e))?;
        let present_modes = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_err(|e| BackendError::vk("get_physical_device_surface_present_modes", e))?;
        Ok(SwapchainSurfaceProperties { capabilities, formats, present_modes })
    }
}

/// FIFO/IMMEDIATE preference by vsync flag, falling back through
/// FIFO_RELAXED/MAILBOX, then the first available mode.
pub fn get_presentation_mode(
    present_modes: &[vk::PresentModeKHR],
    vsync: bool,
) -> vk::PresentModeKHR {
    let preferred = if vsync {
        [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::FIFO_RELAXED]
    } else {
        [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
    };
    for mode in preferred {
        if present_modes.contains(&mode) {
            return mode;
        }
    }
    present_modes.first().copied().unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn get_number_of_swap_images(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Handles the `current_extent.width == u32::MAX` sentinel meaning "the
/// surface lets us pick", clamped to the requested window size.
pub fn get_swap_image_size(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_width: u32,
    window_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

pub fn our_image_usages() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT
        | vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
}

pub fn get_image_usage(capabilities: &vk::SurfaceCapabilitiesKHR) -> Result<vk::ImageUsageFlags> {
    let wanted = our_image_usages();
    if capabilities.supported_usage_flags.contains(wanted) {
        Ok(wanted)
    } else {
        Err(BackendError::DeviceUnavailable(
            "surface does not support required swapchain image usages".into(),
        ))
    }
}

pub fn get_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// Prefers an SRGB-nonlinear-space format; `R8G8B8A8_UNORM`/
/// `B8G8R8A8_UNORM` in that order, else the first reported format with a
/// warning.
pub fn get_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let srgb_preferred = formats.iter().find(|f| {
        f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            && matches!(f.format, vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM)
    });
    if let Some(f) = srgb_preferred {
        return *f;
    }
    if let Some(f) = formats
        .iter()
        .find(|f| matches!(f.format, vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM))
    {
        return *f;
    }
    formats.first().copied().unwrap_or(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    })
}

/// Memcmp-style dirty check: recreate if the surface's reported capability
/// fields drifted since the swapchain was last built.
pub fn needs_recreate(old_extent: vk::Extent2D, new_extent: vk::Extent2D) -> bool {
    old_extent.width != new_extent.width || old_extent.height != new_extent.height
}

/// The live swapchain object (§3 "Swapchain"): format, extent, and the
/// per-image render targets built by [`crate::renderer::Renderer`].
pub struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub raw: vk::SwapchainKHR,
    pub surface: vk::SurfaceKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// Builds (or rebuilds) the platform swapchain for `(window_width,
    /// window_height)` (§4.7 "`resize` rebuilds the platform swapchain, the
    /// per-image view list, and reports the chosen format"). `old` is
    /// passed to `old_swapchain` so the driver can recycle resources; the
    /// caller is responsible for dropping `old` afterwards.
    pub fn create(
        instance: &ash::Instance,
        device: &ash::Device,
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        window_width: u32,
        window_height: u32,
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        let props = get_surface_properties(surface_loader, physical_device, surface)?;
        let format = get_format(&props.formats);
        let present_mode = get_presentation_mode(&props.present_modes, vsync);
        let extent = get_swap_image_size(&props.capabilities, window_width.max(1), window_height.max(1));
        let image_count = get_number_of_swap_images(&props.capabilities);
        let usage = get_image_usage(&props.capabilities)?;
        let transform = get_transform(&props.capabilities);

        let loader = ash::khr::swapchain::Device::new(instance, device);
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map(|s| s.raw).unwrap_or(vk::SwapchainKHR::null()));
        let raw = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(|e| BackendError::vk("create_swapchain", e))?;

        let images = unsafe { loader.get_swapchain_images(raw) }
            .map_err(|e| BackendError::vk("get_swapchain_images", e))?;
        let image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { device.create_image_view(&view_info, None) }
                    .map_err(|e| BackendError::vk("create_image_view (swapchain)", e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Swapchain { loader, raw, surface, format: format.format, extent, images, image_views })
    }

    /// Destroys this swapchain's image views and the swapchain itself, but
    /// not the surface (shared with the replacement swapchain on resize).
    pub fn destroy_keep_surface(&mut self, device: &ash::Device) {
        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
        self.raw = vk::SwapchainKHR::null();
    }

    pub fn acquire_image(
        &self,
        semaphore: vk::Semaphore,
    ) -> Result<u32> {
        let result = unsafe {
            self.loader.acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, _suboptimal)) => Ok(index),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(BackendError::OutOfDate),
            Err(e) => Err(BackendError::vk("acquire_next_image", e)),
        }
    }

    /// Returns `false` on out-of-date, matching §4.7's `present` contract.
    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore, image_index: u32) -> Result<bool> {
        let wait = [wait_semaphore];
        let swapchains = [self.raw];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.loader.queue_present(queue, &info) } {
            Ok(_) => Ok(true),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
            Err(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Err(e) => Err(BackendError::vk("queue_present", e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in &self.image_views {
                // Image views are destroyed by the owning device elsewhere
                // if the swapchain is torn down as part of full context
                // teardown; kept here as a reminder this type does not own
                // the device.
                let _ = view;
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsync_prefers_fifo_then_relaxed() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(get_presentation_mode(&modes, true), vk::PresentModeKHR::FIFO_RELAXED);
    }

    #[test]
    fn no_vsync_prefers_immediate() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(get_presentation_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn falls_back_to_first_available() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(get_presentation_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn swap_image_count_clamped_to_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(get_number_of_swap_images(&caps), 2);
    }
}
