//! Renderer frame loop (C8, §4.8): double-buffered per-frame resources,
//! the fixed transition/resolve sequence around the ordered pass list, and
//! swapchain resize.

use std::collections::HashMap;

use ash::vk;
use graphics_backend_traits::imgui::ImguiIntegration;
use graphics_backend_traits::scene::Scene;
use graphics_backend_traits::window::Window;
use graphics_types::{Format, ImageLayout, ImageUsage, RendererConfig};

use crate::context::Context;
use crate::error::{BackendError, Result};
use crate::handles::{
    CommandBufferHandle, CommandPoolHandle, FenceHandle, ImageHandle, SamplerHandle, SemaphoreHandle,
};
use crate::pass::{ClearPass, MeshPass, MeshPassResources, Pass};
use crate::resources::swapchain::Swapchain;

const FRAMES_IN_FLIGHT: usize = 2;

/// `ImguiIntegration` with its associated types pinned to this backend's
/// concrete Vulkan types, so `Renderer` can hold one behind a plain `dyn`
/// (§4.8 "if imgui_used: run imgui pass on swap image").
pub trait VulkanImgui:
    ImguiIntegration<CommandBuffer = vk::CommandBuffer, Image = vk::Image, Sampler = vk::Sampler, TextureId = u64>
    + Send
{
}

impl<T> VulkanImgui for T where
    T: ImguiIntegration<CommandBuffer = vk::CommandBuffer, Image = vk::Image, Sampler = vk::Sampler, TextureId = u64>
        + Send
{
}

struct FrameData {
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    render_fence: FenceHandle,
}

/// Remembers how a named render image (§4.9 `create_render_image`) was
/// declared, so `resize` can rebuild it at the new render extent.
struct RenderImageSpec {
    format: Format,
    usage: ImageUsage,
    samples: u32,
}

fn samples_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

/// Snaps to 1 with a logged error if the device doesn't support
/// `requested` (§4.8 "validated against the device max at set time").
fn validate_msaa(requested: u32, phy_device: &crate::phy_device::PhyDevice) -> u32 {
    let max = phy_device.max_msaa_samples();
    if max.contains(samples_to_vk(requested)) {
        requested
    } else {
        log::error!("requested MSAA sample count {requested} unsupported by this device; snapping to 1");
        1
    }
}

fn compute_render_extent(window_size: (u32, u32), scale: f32) -> (u32, u32) {
    let w = ((window_size.0 as f32 * scale).floor() as u32).max(1);
    let h = ((window_size.1 as f32 * scale).floor() as u32).max(1);
    (w, h)
}

/// Owns the platform swapchain, the fixed color/depth/final render
/// targets, per-frame synchronization, and the ordered pass list (§3
/// "Renderer", §4.8).
pub struct Renderer {
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    swapchain: Swapchain,
    frames: [FrameData; FRAMES_IN_FLIGHT],
    final_image: ImageHandle,
    default_sampler: SamplerHandle,
    named_images: HashMap<String, ImageHandle>,
    named_image_specs: HashMap<String, RenderImageSpec>,
    passes: Vec<Box<dyn Pass>>,
    frame_number: u64,
    resize_needed: bool,
    window_size: (u32, u32),
    render_extent: (u32, u32),
    msaa: u32,
    resolution_scale: f32,
    present_to_swapchain: bool,
    clear_color: [f32; 4],
    /// The frame's present target (swap image or `final_image`), set right
    /// before passes execute so `MeshPass` can resolve into it when MSAA is
    /// in use (§4.9 "resolve was performed inline by the last pass").
    current_target: Option<(vk::Image, vk::ImageView)>,
    imgui: Option<Box<dyn VulkanImgui>>,
}

impl Renderer {
    pub fn new(ctx: &mut Context, window: &dyn Window, config: &RendererConfig) -> Result<Renderer> {
        use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

        let display_handle = window
            .display_handle()
            .map_err(|e| BackendError::DeviceUnavailable(format!("display handle unavailable: {e}")))?
            .as_raw();
        let window_handle = window
            .window_handle()
            .map_err(|e| BackendError::DeviceUnavailable(format!("window handle unavailable: {e}")))?
            .as_raw();
        let surface = unsafe {
            ash_window::create_surface(&ctx.instance.entry, &ctx.instance.raw, display_handle, window_handle, None)
        }
        .map_err(|e| BackendError::vk("create_surface", e))?;
        let surface_loader = ash::khr::surface::Instance::new(&ctx.instance.entry, &ctx.instance.raw);

        let window_size = window.pixel_size();
        let msaa = validate_msaa(config.msaa, &ctx.phy_device);
        let render_extent = compute_render_extent(window_size, config.resolution_scale);

        let swapchain = Swapchain::create(
            &ctx.instance.raw,
            &ctx.device.raw,
            &surface_loader,
            ctx.phy_device.raw,
            surface,
            window_size.0,
            window_size.1,
            config.vsync,
            None,
        )?;

        let final_image = Self::create_final_image(ctx, render_extent)?;
        let default_sampler = ctx.sampler_create(
            graphics_types::ImageFiltering::Linear,
            graphics_types::ImageFiltering::Linear,
            graphics_types::ImageWrappingMode::Repeat,
            graphics_types::ImageWrappingMode::Repeat,
        )?;

        let mut frames = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for _ in 0..FRAMES_IN_FLIGHT {
            let command_pool = ctx.command_pool_create(ctx.phy_device.queue_family_index)?;
            let command_buffer = ctx.command_buffer_create(command_pool)?;
            let image_available = ctx.semaphore_create()?;
            let render_finished = ctx.semaphore_create()?;
            let render_fence = ctx.fence_create(true)?;
            frames.push(FrameData { command_pool, command_buffer, image_available, render_finished, render_fence });
        }
        let frames: [FrameData; FRAMES_IN_FLIGHT] = frames
            .try_into()
            .unwrap_or_else(|_| unreachable!("exactly FRAMES_IN_FLIGHT frames were pushed above"));

        let mut renderer = Renderer {
            surface_loader,
            surface,
            swapchain,
            frames,
            final_image,
            default_sampler,
            named_images: HashMap::new(),
            named_image_specs: HashMap::new(),
            passes: Vec::new(),
            frame_number: 0,
            resize_needed: false,
            window_size,
            render_extent,
            msaa,
            resolution_scale: config.resolution_scale,
            present_to_swapchain: config.present_to_swapchain,
            clear_color: config.clear_color,
            current_target: None,
            imgui: None,
        };

        renderer.register_pass(ctx, Box::new(ClearPass))?;
        renderer.register_pass(ctx, Box::new(MeshPass))?;

        Ok(renderer)
    }

    fn create_final_image(ctx: &mut Context, extent: (u32, u32)) -> Result<ImageHandle> {
        ctx.image_create(
            extent.0,
            extent.1,
            Format::R8G8B8A8Unorm,
            ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            1,
            false,
            None,
        )
    }

    /// Registers a pass, running its one-time `setup` immediately (§4.9).
    /// Kept sorted by ascending priority so `render_frame` can just iterate.
    pub fn register_pass(&mut self, ctx: &mut Context, mut pass: Box<dyn Pass>) -> Result<()> {
        pass.setup(ctx, self)?;
        self.passes.push(pass);
        self.passes.sort_by_key(|p| p.priority());
        Ok(())
    }

    /// Allocates a named render image at the current render extent,
    /// remembering its spec so `resize` can rebuild it (§4.9
    /// `create_render_image`).
    pub fn create_render_image(
        &mut self,
        ctx: &mut Context,
        name: &str,
        format: Format,
        usage: ImageUsage,
        samples: u32,
    ) -> Result<ImageHandle> {
        let handle = ctx.image_create(self.render_extent.0, self.render_extent.1, format, usage, samples, false, None)?;
        self.named_images.insert(name.to_string(), handle);
        self.named_image_specs.insert(name.to_string(), RenderImageSpec { format, usage, samples });
        Ok(handle)
    }

    pub fn get_render_image(&self, name: &str) -> Option<ImageHandle> {
        self.named_images.get(name).copied()
    }

    pub fn color_image(&self) -> ImageHandle {
        *self.named_images.get("geo_albedo").expect("ClearPass registers geo_albedo at construction")
    }

    pub fn depth_image(&self) -> ImageHandle {
        *self.named_images.get("geo_depth").expect("ClearPass registers geo_depth at construction")
    }

    pub fn default_sampler(&self) -> SamplerHandle {
        self.default_sampler
    }

    /// Installs the driver's ImGui integration. Once set, every frame runs
    /// its draw pass on the swap image (§4.8, §6).
    pub fn set_imgui_integration(&mut self, integration: Box<dyn VulkanImgui>) {
        self.imgui = Some(integration);
    }

    pub fn msaa(&self) -> u32 {
        self.msaa
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn render_extent(&self) -> (u32, u32) {
        self.render_extent
    }

    pub fn render_extent_vk(&self) -> vk::Extent2D {
        vk::Extent2D { width: self.render_extent.0, height: self.render_extent.1 }
    }

    /// The view `MeshPass` should resolve into this frame, valid only
    /// while a frame is being recorded.
    pub fn current_resolve_target(&self) -> Option<vk::ImageView> {
        self.current_target.map(|(_, view)| view)
    }

    /// Rebuilds the platform swapchain and every named render image at the
    /// new window size / resolution scale (§4.7, §4.8 "changing scale
    /// triggers a device wait and reallocation").
    pub fn resize(&mut self, ctx: &mut Context, window: &dyn Window, vsync: bool) -> Result<()> {
        ctx.device_wait_idle()?;

        self.window_size = window.pixel_size();
        self.render_extent = compute_render_extent(self.window_size, self.resolution_scale);

        let new_swapchain = Swapchain::create(
            &ctx.instance.raw,
            &ctx.device.raw,
            &self.surface_loader,
            ctx.phy_device.raw,
            self.surface,
            self.window_size.0,
            self.window_size.1,
            vsync,
            Some(&self.swapchain),
        )?;
        self.swapchain.destroy_keep_surface(&ctx.device.raw);
        self.swapchain = new_swapchain;

        ctx.image_free(self.final_image);
        self.final_image = Self::create_final_image(ctx, self.render_extent)?;

        let specs: Vec<(String, Format, ImageUsage, u32)> = self
            .named_image_specs
            .iter()
            .map(|(name, spec)| (name.clone(), spec.format, spec.usage, spec.samples))
            .collect();
        for (name, format, usage, samples) in specs {
            if let Some(old) = self.named_images.remove(&name) {
                ctx.image_free(old);
            }
            self.create_render_image(ctx, &name, format, usage, samples)?;
        }

        self.resize_needed = false;
        Ok(())
    }

    pub fn resize_needed(&self) -> bool {
        self.resize_needed
    }

    /// Releases every resource this renderer owns. Explicit rather than
    /// `Drop` since freeing goes through `ctx`'s slot maps (§9 "single
    /// context object").
    pub fn destroy(mut self, ctx: &mut Context) {
        let _ = ctx.device_wait_idle();
        for (_, handle) in self.named_images.drain() {
            ctx.image_free(handle);
        }
        ctx.image_free(self.final_image);
        ctx.sampler_free(self.default_sampler);
        for frame in self.frames {
            ctx.command_pool_free(frame.command_pool);
            ctx.semaphore_free(frame.image_available);
            ctx.semaphore_free(frame.render_finished);
            ctx.fence_free(frame.render_fence);
        }
        self.swapchain.destroy_keep_surface(&ctx.device.raw);
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }

    /// The fixed per-frame algorithm (§4.8). Returns `Ok(())` and sets
    /// `resize_needed` on a recoverable out-of-date condition instead of
    /// erroring; the caller must call [`Renderer::resize`] before the next
    /// `render_frame`.
    pub fn render_frame(
        &mut self,
        ctx: &mut Context,
        scene: &dyn Scene,
        resources: &mut dyn MeshPassResources,
    ) -> Result<()> {
        if self.resize_needed {
            return Ok(());
        }

        ctx.drain_main_thread_queue();

        let slot = (self.frame_number % FRAMES_IN_FLIGHT as u64) as usize;
        let (command_buffer, render_fence, image_available_handle, render_finished_handle) = {
            let frame = &self.frames[slot];
            (frame.command_buffer, frame.render_fence, frame.image_available, frame.render_finished)
        };

        ctx.fence_wait(render_fence)?;

        let image_available = ctx.semaphore(image_available_handle).expect("frame semaphore").raw;
        let image_index = match self.swapchain.acquire_image(image_available) {
            Ok(index) => index,
            Err(BackendError::OutOfDate) => {
                self.resize_needed = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        ctx.fence_reset(render_fence)?;
        ctx.command_buffer_reset(command_buffer)?;
        let cmd = ctx.command_buffer_begin(command_buffer)?;

        let color = ctx.image(self.color_image()).expect("geo_albedo must exist");
        let (color_raw, color_w, color_h) = (color.raw, color.width, color.height);
        let depth_raw = ctx.image(self.depth_image()).expect("geo_depth must exist").raw;

        crate::commands::transition_image(&ctx.device.raw, cmd, color_raw, ImageLayout::Undefined, ImageLayout::ColorAttachmentOptimal, 0, 1);
        crate::commands::transition_image(&ctx.device.raw, cmd, depth_raw, ImageLayout::Undefined, ImageLayout::DepthAttachmentOptimal, 0, 1);

        let swap_image = self.swapchain.images[image_index as usize];
        let swap_view = self.swapchain.image_views[image_index as usize];
        crate::commands::transition_image(&ctx.device.raw, cmd, swap_image, ImageLayout::Undefined, ImageLayout::ColorAttachmentOptimal, 0, 1);

        let (final_raw, final_view) = {
            let final_image = ctx.image(self.final_image).expect("final_image must exist");
            (final_image.raw, final_image.view)
        };
        crate::commands::transition_image(&ctx.device.raw, cmd, final_raw, ImageLayout::Undefined, ImageLayout::ColorAttachmentOptimal, 0, 1);

        crate::commands::set_viewport_scissor(&ctx.device.raw, cmd, color_w, color_h);

        self.current_target = Some(if self.present_to_swapchain {
            (swap_image, swap_view)
        } else {
            (final_raw, final_view)
        });

        let mut passes = std::mem::take(&mut self.passes);
        for pass in passes.iter_mut() {
            pass.execute(ctx, self, cmd, scene, resources)?;
        }
        self.passes = passes;

        let target = self.current_target.take().expect("set above");

        if self.msaa == 1 {
            crate::commands::transition_image(&ctx.device.raw, cmd, color_raw, ImageLayout::ColorAttachmentOptimal, ImageLayout::TransferSrcOptimal, 0, 1);
            crate::commands::transition_image(&ctx.device.raw, cmd, target.0, ImageLayout::ColorAttachmentOptimal, ImageLayout::TransferDstOptimal, 0, 1);
            let dst_extent = if self.present_to_swapchain {
                (self.swapchain.extent.width, self.swapchain.extent.height)
            } else {
                (color_w, color_h)
            };
            crate::commands::copy_image_to_image(
                &ctx.device.raw,
                cmd,
                color_raw,
                ImageLayout::TransferSrcOptimal,
                (color_w, color_h),
                0,
                target.0,
                ImageLayout::TransferDstOptimal,
                dst_extent,
                0,
            );
        }

        if !self.present_to_swapchain {
            let from = if self.msaa == 1 { ImageLayout::TransferDstOptimal } else { ImageLayout::ColorAttachmentOptimal };
            crate::commands::transition_image(&ctx.device.raw, cmd, final_raw, from, ImageLayout::ShaderReadOnlyOptimal, 0, 1);
        }

        let mut swap_from = if self.present_to_swapchain {
            if self.msaa == 1 { ImageLayout::TransferDstOptimal } else { ImageLayout::ColorAttachmentOptimal }
        } else {
            ImageLayout::ColorAttachmentOptimal
        };

        if let Some(imgui) = self.imgui.as_mut() {
            if swap_from != ImageLayout::ColorAttachmentOptimal {
                crate::commands::transition_image(&ctx.device.raw, cmd, swap_image, swap_from, ImageLayout::ColorAttachmentOptimal, 0, 1);
            }
            imgui.imgui_new_frame_for_platform();
            let imgui_attachment = crate::commands::ColorAttachment {
                image_view: swap_view,
                layout: ImageLayout::ColorAttachmentOptimal,
                load_op: graphics_types::AttachmentLoadOp::Load,
                store_op: graphics_types::AttachmentStoreOp::Store,
                clear_color: None,
                resolve: None,
            };
            crate::commands::begin_rendering(&ctx.device.raw, cmd, self.swapchain.extent, &[imgui_attachment], None);
            imgui.imgui_render_for_platform(&cmd);
            crate::commands::end_rendering(&ctx.device.raw, cmd);
            swap_from = ImageLayout::ColorAttachmentOptimal;
        }

        crate::commands::transition_image(&ctx.device.raw, cmd, swap_image, swap_from, ImageLayout::PresentSrc, 0, 1);

        ctx.command_buffer_end(command_buffer)?;

        let render_finished = ctx.semaphore(render_finished_handle).expect("frame semaphore").raw;
        let render_fence_raw = ctx.fence(render_fence).expect("frame fence").raw;
        ctx.submit(
            &ctx.device.graphics_queue,
            cmd,
            Some((image_available, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
            Some(render_finished),
            Some(render_fence_raw),
        )?;

        if !self.swapchain.present(ctx.device.graphics_queue.raw, render_finished, image_index)? {
            self.resize_needed = true;
        }

        self.frame_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_extent_rounds_down_and_never_zero() {
        assert_eq!(compute_render_extent((1920, 1080), 0.5), (960, 540));
        assert_eq!(compute_render_extent((3, 3), 0.1), (1, 1));
    }

    #[test]
    fn render_extent_at_full_scale_matches_window() {
        assert_eq!(compute_render_extent((1280, 720), 1.0), (1280, 720));
    }
}
