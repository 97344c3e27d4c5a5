//! The resource manager (C1 + C2, §4.1): a single explicit context object
//! owning the instance/device/allocator and one slot map per resource kind
//! (§9 "Global mutable state ... represent the core as a single context
//! object passed explicitly").

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use crossbeam::channel::{bounded, Receiver, Sender};
use graphics_types::{
    BufferUsage, Format, ImageFiltering, ImageUsage, ImageWrappingMode, MemoryLocation, QueueKind,
    RendererConfig, ShaderUniform, ShaderUniformType,
};

use crate::allocator::Allocator;
use crate::descriptor_pool::DescriptorPoolAllocator;
use crate::device::LogicalDevice;
use crate::error::{BackendError, Result};
use crate::handles::*;
use crate::immediate_submit::ImmediateSubmitChannel;
use crate::instance::Instance;
use crate::phy_device::PhyDevice;
use crate::pipeline_factory::PipelineCacheHeader;
use crate::resources::{Buffer, CommandBuffer, CommandBufferState, CommandPool, Fence, FrameBuffer, Image, RenderPass, Sampler, Semaphore, Shader, UniformSet};

/// Work scheduled onto the render thread from elsewhere (§5, "Any thread
/// may schedule work onto the render thread via a bounded main-thread
/// queue"). Runs with exclusive access to the `Context` once drained.
pub type MainThreadTask = Box<dyn FnOnce(&mut Context) + Send + 'static>;

/// Capacity of the bounded main-thread queue. A producer that outpaces one
/// frame's drain blocks rather than growing the queue unbounded.
const MAIN_THREAD_QUEUE_CAPACITY: usize = 256;

/// A cloneable handle other threads use to schedule work onto the render
/// thread, without needing access to `Context` itself.
#[derive(Clone)]
pub struct MainThreadQueueHandle {
    sender: Sender<MainThreadTask>,
}

impl MainThreadQueueHandle {
    pub fn schedule(&self, task: impl FnOnce(&mut Context) + Send + 'static) {
        // The receiver lives as long as its owning `Context`; a send past
        // that point (context torn down mid-schedule) is silently dropped.
        let _ = self.sender.send(Box::new(task));
    }
}

/// Owns every GPU resource slot map plus the subsystems that allocate into
/// them. This is the "single context object" of §9; all backend operations
/// are methods on it or on objects it hands out.
pub struct Context {
    pub instance: Instance,
    pub phy_device: PhyDevice,
    pub device: Arc<LogicalDevice>,
    pub allocator: Allocator,
    pub descriptor_pools: DescriptorPoolAllocator,
    pub immediate_submit: ImmediateSubmitChannel,
    pub config: RendererConfig,

    main_thread_queue_tx: Sender<MainThreadTask>,
    main_thread_queue_rx: Receiver<MainThreadTask>,

    buffers: SlotMap<Buffer, BufferKind>,
    images: SlotMap<Image, ImageKind>,
    samplers: SlotMap<Sampler, SamplerKind>,
    shaders: SlotMap<Shader, ShaderKind>,
    pipelines: SlotMap<crate::resources::Pipeline, PipelineKind>,
    uniform_sets: SlotMap<UniformSet, UniformSetKind>,
    fences: SlotMap<Fence, FenceKind>,
    semaphores: SlotMap<Semaphore, SemaphoreKind>,
    command_pools: SlotMap<CommandPool, CommandPoolKind>,
    command_buffers: SlotMap<CommandBuffer, CommandBufferKind>,
    render_passes: SlotMap<RenderPass, RenderPassKind>,
    frame_buffers: SlotMap<FrameBuffer, FrameBufferKind>,
}

impl Context {
    pub fn new(instance: Instance, phy_device: PhyDevice, device: LogicalDevice, config: RendererConfig) -> Result<Context> {
        let device = Arc::new(device);
        let immediate_submit = ImmediateSubmitChannel::new(
            &device.raw,
            device.graphics_queue.raw,
            device.transfer_queue.raw,
            phy_device.queue_family_index,
        )?;
        let (main_thread_queue_tx, main_thread_queue_rx) = bounded(MAIN_THREAD_QUEUE_CAPACITY);
        Ok(Context {
            instance,
            phy_device,
            allocator: Allocator::new(config.small_allocation_threshold),
            descriptor_pools: DescriptorPoolAllocator::new(),
            immediate_submit,
            config,
            device,
            main_thread_queue_tx,
            main_thread_queue_rx,
            buffers: SlotMap::new(),
            images: SlotMap::new(),
            samplers: SlotMap::new(),
            shaders: SlotMap::new(),
            pipelines: SlotMap::new(),
            uniform_sets: SlotMap::new(),
            fences: SlotMap::new(),
            semaphores: SlotMap::new(),
            command_pools: SlotMap::new(),
            command_buffers: SlotMap::new(),
            render_passes: SlotMap::new(),
            frame_buffers: SlotMap::new(),
        })
    }

    pub fn device_identity(&self) -> PipelineCacheHeader {
        let props = &self.phy_device.properties;
        PipelineCacheHeader {
            magic: crate::pipeline_factory::PIPELINE_CACHE_MAGIC,
            payload_size: 0,
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            driver_version: props.driver_version,
            driver_uuid: props.pipeline_cache_uuid,
        }
    }

    pub fn pipeline_cache_path(&self, shader_hash: u64) -> PathBuf {
        PathBuf::from(&self.config.pipeline_cache_dir).join(format!("{shader_hash:016x}.cache"))
    }

    /// A handle other threads can clone to schedule work onto this context
    /// (§5's bounded main-thread queue).
    pub fn main_thread_queue_handle(&self) -> MainThreadQueueHandle {
        MainThreadQueueHandle { sender: self.main_thread_queue_tx.clone() }
    }

    /// Runs every task queued since the last drain. Called once per frame
    /// by [`crate::renderer::Renderer::render_frame`]; never blocks.
    pub fn drain_main_thread_queue(&mut self) {
        while let Ok(task) = self.main_thread_queue_rx.try_recv() {
            task(self);
        }
    }

    // --- Buffer -----------------------------------------------------

    fn usage_to_vk(usage: BufferUsage) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if usage.contains(BufferUsage::TRANSFER_SRC) {
            flags |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if usage.contains(BufferUsage::TRANSFER_DST) {
            flags |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if usage.contains(BufferUsage::STORAGE) {
            flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if usage.contains(BufferUsage::INDEX) {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if usage.contains(BufferUsage::VERTEX) {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if usage.contains(BufferUsage::INDIRECT) {
            flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
        }
        if usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS) {
            flags |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        }
        flags
    }

    /// §4.1 / §3 Buffer. Zero-size is `InvalidArgument` (§8 boundary
    /// behavior).
    pub fn buffer_create(&mut self, size: u64, usage: BufferUsage, location: MemoryLocation) -> Result<BufferHandle> {
        if size == 0 {
            return Err(BackendError::InvalidArgument("buffer size must be non-zero".into()));
        }
        let needs_device_address = usage.contains(BufferUsage::SHADER_DEVICE_ADDRESS);
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(Self::usage_to_vk(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { self.device.raw.create_buffer(&create_info, None) }
            .map_err(|e| BackendError::vk("create_buffer", e))?;
        let requirements = unsafe { self.device.raw.get_buffer_memory_requirements(raw) };

        let cpu_visible = location == MemoryLocation::CpuVisible;
        let memory = self.allocator.allocate(
            &self.device.raw,
            &self.phy_device.memory_properties,
            requirements,
            cpu_visible,
            needs_device_address,
            cpu_visible,
        )?;
        unsafe { self.device.raw.bind_buffer_memory(raw, memory.memory, memory.offset) }
            .map_err(|e| BackendError::vk("bind_buffer_memory", e))?;

        let device_address = if needs_device_address {
            let info = vk::BufferDeviceAddressInfo::default().buffer(raw);
            Some(unsafe { self.device.raw.get_buffer_device_address(&info) })
        } else {
            None
        };

        Ok(self.buffers.insert(Buffer { raw, memory, size, usage, location, device_address }))
    }

    pub fn buffer_free(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.remove(handle) {
            unsafe { self.device.raw.destroy_buffer(buffer.raw, None) };
            self.allocator.free(&self.device.raw, buffer.memory);
        }
    }

    /// §4.1 "only valid if the buffer was created with the device-address
    /// usage bit".
    pub fn buffer_get_device_address(&self, handle: BufferHandle) -> Result<vk::DeviceAddress> {
        let buffer = self
            .buffers
            .get(handle)
            .ok_or_else(|| BackendError::InvalidArgument("stale buffer handle".into()))?;
        buffer
            .device_address
            .ok_or_else(|| BackendError::InvalidArgument("buffer was not created with device-address usage".into()))
    }

    pub fn buffer_map(&self, handle: BufferHandle) -> Result<*mut u8> {
        let buffer = self
            .buffers
            .get(handle)
            .ok_or_else(|| BackendError::InvalidArgument("stale buffer handle".into()))?;
        buffer
            .mapped_ptr()
            .ok_or_else(|| BackendError::InvalidArgument("buffer is not CPU-visible".into()))
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers.get(handle)
    }

    // --- Image --------------------------------------------------------

    fn image_usage_to_vk(usage: ImageUsage) -> vk::ImageUsageFlags {
        let mut flags = vk::ImageUsageFlags::empty();
        if usage.contains(ImageUsage::TRANSFER_SRC) {
            flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if usage.contains(ImageUsage::TRANSFER_DST) {
            flags |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        if usage.contains(ImageUsage::SAMPLED) {
            flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if usage.contains(ImageUsage::STORAGE) {
            flags |= vk::ImageUsageFlags::STORAGE;
        }
        if usage.contains(ImageUsage::COLOR_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        flags
    }

    fn format_to_vk(format: Format) -> vk::Format {
        crate::pipeline_factory::format_to_vk(format)
    }

    fn aspect_of(format: Format) -> vk::ImageAspectFlags {
        if format.is_depth() {
            if format.has_stencil() {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        }
    }

    /// §4.1 `image_create`'s dual contract. With `data == None` allocates
    /// an empty image; with `data == Some(..)` additionally stages,
    /// uploads, optionally generates mipmaps, and leaves the image in
    /// shader-read-only layout.
    pub fn image_create(
        &mut self,
        width: u32,
        height: u32,
        format: Format,
        usage: ImageUsage,
        samples: u32,
        mipmapped: bool,
        data: Option<&[u8]>,
    ) -> Result<ImageHandle> {
        if width == 0 || height == 0 {
            return Err(BackendError::InvalidArgument("image extent must be non-zero".into()));
        }
        let mip_levels = Image::mip_levels_for(width, height, mipmapped);
        let mut effective_usage = usage;
        if data.is_some() {
            effective_usage |= ImageUsage::TRANSFER_DST;
            if mipmapped {
                effective_usage |= ImageUsage::TRANSFER_SRC;
            }
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(Self::format_to_vk(format))
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(samples_to_vk(samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(Self::image_usage_to_vk(effective_usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let raw = unsafe { self.device.raw.create_image(&create_info, None) }
            .map_err(|e| BackendError::vk("create_image", e))?;
        let requirements = unsafe { self.device.raw.get_image_memory_requirements(raw) };
        let memory = self.allocator.allocate(
            &self.device.raw,
            &self.phy_device.memory_properties,
            requirements,
            false,
            false,
            false,
        )?;
        unsafe { self.device.raw.bind_image_memory(raw, memory.memory, memory.offset) }
            .map_err(|e| BackendError::vk("bind_image_memory", e))?;

        let aspect = Self::aspect_of(format);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(raw)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::format_to_vk(format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.device.raw.create_image_view(&view_info, None) }
            .map_err(|e| BackendError::vk("create_image_view", e))?;

        if let Some(bytes) = data {
            self.upload_image_data(raw, width, height, mip_levels, bytes)?;
        }

        Ok(self.images.insert(Image {
            raw,
            view,
            memory: Some(memory),
            format,
            width,
            height,
            mip_levels,
            samples,
            usage: effective_usage,
            swapchain_owned: false,
        }))
    }

    /// Staging upload + optional mipmap generation, mirroring the original
    /// engine's sequence: staging buffer -> copy -> blit chain -> leave in
    /// shader-read-only layout.
    fn upload_image_data(
        &mut self,
        image: vk::Image,
        width: u32,
        height: u32,
        mip_levels: u32,
        data: &[u8],
    ) -> Result<()> {
        let staging = self.buffer_create(
            data.len() as u64,
            BufferUsage::TRANSFER_SRC,
            MemoryLocation::CpuVisible,
        )?;
        unsafe {
            let ptr = self.buffer_map(staging)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
        }
        let staging_buffer = self.buffers.get(staging).unwrap().raw;

        self.immediate_submit.immediate_submit(&self.device.raw, QueueKind::Graphics, |cmd| {
            crate::commands::transition_image(
                &self.device.raw,
                cmd,
                image,
                graphics_types::ImageLayout::Undefined,
                graphics_types::ImageLayout::TransferDstOptimal,
                0,
                mip_levels,
            );
            crate::commands::copy_buffer_to_image(
                &self.device.raw,
                cmd,
                staging_buffer,
                image,
                graphics_types::ImageLayout::TransferDstOptimal,
                crate::commands::BufferImageCopyRegion {
                    buffer_offset: 0,
                    mip_level: 0,
                    image_extent: (width, height),
                },
            );

            if mip_levels > 1 {
                let mut mip_w = width;
                let mut mip_h = height;
                for level in 1..mip_levels {
                    crate::commands::transition_image(
                        &self.device.raw,
                        cmd,
                        image,
                        graphics_types::ImageLayout::Undefined,
                        graphics_types::ImageLayout::TransferDstOptimal,
                        level,
                        1,
                    );
                    let next_w = (mip_w / 2).max(1);
                    let next_h = (mip_h / 2).max(1);
                    crate::commands::transition_image(
                        &self.device.raw,
                        cmd,
                        image,
                        graphics_types::ImageLayout::TransferDstOptimal,
                        graphics_types::ImageLayout::TransferSrcOptimal,
                        level - 1,
                        1,
                    );
                    crate::commands::copy_image_to_image(
                        &self.device.raw,
                        cmd,
                        image,
                        graphics_types::ImageLayout::TransferSrcOptimal,
                        (mip_w, mip_h),
                        level - 1,
                        image,
                        graphics_types::ImageLayout::TransferDstOptimal,
                        (next_w, next_h),
                        level,
                    );
                    crate::commands::transition_image(
                        &self.device.raw,
                        cmd,
                        image,
                        graphics_types::ImageLayout::TransferSrcOptimal,
                        graphics_types::ImageLayout::ShaderReadOnlyOptimal,
                        level - 1,
                        1,
                    );
                    mip_w = next_w;
                    mip_h = next_h;
                }
                crate::commands::transition_image(
                    &self.device.raw,
                    cmd,
                    image,
                    graphics_types::ImageLayout::TransferDstOptimal,
                    graphics_types::ImageLayout::ShaderReadOnlyOptimal,
                    mip_levels - 1,
                    1,
                );
            } else {
                crate::commands::transition_image(
                    &self.device.raw,
                    cmd,
                    image,
                    graphics_types::ImageLayout::TransferDstOptimal,
                    graphics_types::ImageLayout::ShaderReadOnlyOptimal,
                    0,
                    1,
                );
            }
        })?;

        self.buffer_free(staging);
        Ok(())
    }

    pub fn image_free(&mut self, handle: ImageHandle) {
        if let Some(image) = self.images.remove(handle) {
            if image.swapchain_owned {
                log::warn!("attempted to free a swapchain-owned image; ignoring (§3 invariant)");
                return;
            }
            unsafe { self.device.raw.destroy_image_view(image.view, None) };
            unsafe { self.device.raw.destroy_image(image.raw, None) };
            if let Some(memory) = image.memory {
                self.allocator.free(&self.device.raw, memory);
            }
        }
    }

    pub fn image(&self, handle: ImageHandle) -> Option<&Image> {
        self.images.get(handle)
    }

    // --- Sampler --------------------------------------------------------

    fn filter_to_vk(filter: ImageFiltering) -> vk::Filter {
        match filter {
            ImageFiltering::Nearest => vk::Filter::NEAREST,
            ImageFiltering::Linear => vk::Filter::LINEAR,
        }
    }

    fn wrap_to_vk(mode: ImageWrappingMode) -> vk::SamplerAddressMode {
        match mode {
            ImageWrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
            ImageWrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            ImageWrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            ImageWrappingMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        }
    }

    pub fn sampler_create(
        &mut self,
        min_filter: ImageFiltering,
        mag_filter: ImageFiltering,
        wrap_u: ImageWrappingMode,
        wrap_v: ImageWrappingMode,
    ) -> Result<SamplerHandle> {
        let create_info = vk::SamplerCreateInfo::default()
            .min_filter(Self::filter_to_vk(min_filter))
            .mag_filter(Self::filter_to_vk(mag_filter))
            .address_mode_u(Self::wrap_to_vk(wrap_u))
            .address_mode_v(Self::wrap_to_vk(wrap_v))
            .max_lod(vk::LOD_CLAMP_NONE);
        let raw = unsafe { self.device.raw.create_sampler(&create_info, None) }
            .map_err(|e| BackendError::vk("create_sampler", e))?;
        Ok(self.samplers.insert(Sampler { raw, min_filter, mag_filter, wrap_u, wrap_v }))
    }

    pub fn sampler_free(&mut self, handle: SamplerHandle) {
        if let Some(sampler) = self.samplers.remove(handle) {
            unsafe { self.device.raw.destroy_sampler(sampler.raw, None) };
        }
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Option<&Sampler> {
        self.samplers.get(handle)
    }

    // --- Shader / Pipeline handles live on the pipeline-factory surface;
    //     thin wrappers here insert/remove them from this context's slot
    //     maps so callers only ever deal in opaque handles.

    pub fn shader_create(&mut self, blobs: &[(graphics_types::ShaderStage, &[u8])]) -> Result<ShaderHandle> {
        let shader = crate::pipeline_factory::create_shader(&self.device.raw, blobs)?;
        Ok(self.shaders.insert(shader))
    }

    pub fn shader_free(&mut self, handle: ShaderHandle) {
        if let Some(shader) = self.shaders.remove(handle) {
            unsafe {
                for stage in &shader.stages {
                    self.device.raw.destroy_shader_module(stage.module, None);
                }
                for layout in &shader.descriptor_set_layouts {
                    self.device.raw.destroy_descriptor_set_layout(*layout, None);
                }
                self.device.raw.destroy_pipeline_layout(shader.pipeline_layout, None);
            }
        }
    }

    pub fn shader(&self, handle: ShaderHandle) -> Option<&Shader> {
        self.shaders.get(handle)
    }

    pub fn pipeline_insert(&mut self, pipeline: crate::resources::Pipeline) -> PipelineHandle {
        self.pipelines.insert(pipeline)
    }

    pub fn pipeline_free(&mut self, handle: PipelineHandle) {
        if let Some(pipeline) = self.pipelines.remove(handle) {
            let identity = self.device_identity();
            let path = self.pipeline_cache_path(pipeline.shader_hash);
            if let Err(e) = crate::pipeline_factory::save_pipeline_cache(
                &self.device.raw,
                pipeline.pipeline_cache,
                &path,
                &identity,
            ) {
                log::warn!("failed to persist pipeline cache for {:016x}: {e}", pipeline.shader_hash);
            }
            unsafe {
                self.device.raw.destroy_pipeline(pipeline.raw, None);
                self.device.raw.destroy_pipeline_cache(pipeline.pipeline_cache, None);
            }
        }
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&crate::resources::Pipeline> {
        self.pipelines.get(handle)
    }

    // --- UniformSet ------------------------------------------------

    pub fn uniform_set_insert(&mut self, set: UniformSet) -> UniformSetHandle {
        self.uniform_sets.insert(set)
    }

    pub fn uniform_set_free(&mut self, handle: UniformSetHandle) {
        if let Some(set) = self.uniform_sets.remove(handle) {
            self.descriptor_pools.free(&self.device.raw, set.shape, set.pool_id, set.raw);
        }
    }

    pub fn uniform_set(&self, handle: UniformSetHandle) -> Option<&UniformSet> {
        self.uniform_sets.get(handle)
    }

    /// Creates one descriptor set for `shader`'s `set_index` from a list of
    /// bindings (C4, §4.4). Builds and applies every write-descriptor in a
    /// single `vkUpdateDescriptorSets` call.
    ///
    /// Built in two passes: first every `DescriptorImageInfo`/
    /// `DescriptorBufferInfo` vector is materialized in full (so none of
    /// these `Vec`s reallocate again), then `WriteDescriptorSet`s borrowing
    /// them are constructed — reversed, since a `WriteDescriptorSet` built
    /// before its info `Vec` stopped growing would dangle.
    pub fn uniform_set_create(
        &mut self,
        shader: ShaderHandle,
        set_index: u32,
        uniforms: &[ShaderUniform<UniformResource>],
    ) -> Result<UniformSetHandle> {
        let shader_ref = self
            .shaders
            .get(shader)
            .ok_or_else(|| BackendError::InvalidArgument("stale shader handle".into()))?;
        let layout = *shader_ref
            .descriptor_set_layouts
            .get(set_index as usize)
            .ok_or_else(|| BackendError::InvalidArgument(format!("shader has no set index {set_index}")))?;

        let shape = graphics_types::PoolShapeKey::from_uniforms(uniforms);
        let (raw_set, pool_id) = self.descriptor_pools.allocate(&self.device.raw, shape, layout)?;

        enum Infos {
            Image(Vec<vk::DescriptorImageInfo>),
            Buffer(Vec<vk::DescriptorBufferInfo>),
        }

        let per_entry: Vec<Infos> = uniforms
            .iter()
            .map(|entry| match entry.kind {
                ShaderUniformType::UniformBuffer | ShaderUniformType::StorageBuffer => {
                    Infos::Buffer(
                        entry
                            .data
                            .iter()
                            .filter_map(|r| match r {
                                UniformResource::Buffer(h) => self.buffers.get(*h),
                                _ => None,
                            })
                            .map(|b| vk::DescriptorBufferInfo::default().buffer(b.raw).offset(0).range(b.size))
                            .collect(),
                    )
                }
                ShaderUniformType::Sampler => Infos::Image(
                    entry
                        .data
                        .iter()
                        .filter_map(|r| match r {
                            UniformResource::Sampler(h) => self.samplers.get(*h),
                            _ => None,
                        })
                        .map(|s| vk::DescriptorImageInfo::default().sampler(s.raw))
                        .collect(),
                ),
                ShaderUniformType::SamplerWithTexture => Infos::Image(
                    entry
                        .data
                        .iter()
                        .filter_map(|r| match r {
                            UniformResource::SamplerWithTexture(s, i) => {
                                let sampler = self.samplers.get(*s)?;
                                let image = self.images.get(*i)?;
                                Some(
                                    vk::DescriptorImageInfo::default()
                                        .sampler(sampler.raw)
                                        .image_view(image.view)
                                        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                                )
                            }
                            _ => None,
                        })
                        .collect(),
                ),
                ShaderUniformType::Texture | ShaderUniformType::StorageImage | ShaderUniformType::InputAttachment => {
                    let image_layout = if entry.kind == ShaderUniformType::StorageImage {
                        vk::ImageLayout::GENERAL
                    } else {
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                    };
                    Infos::Image(
                        entry
                            .data
                            .iter()
                            .filter_map(|r| match r {
                                UniformResource::Image(h) => self.images.get(*h),
                                _ => None,
                            })
                            .map(|img| {
                                vk::DescriptorImageInfo::default().image_view(img.view).image_layout(image_layout)
                            })
                            .collect(),
                    )
                }
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = uniforms
            .iter()
            .zip(per_entry.iter())
            .map(|(entry, infos)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(raw_set)
                    .dst_binding(entry.binding)
                    .descriptor_type(descriptor_type_of(entry.kind));
                match infos {
                    Infos::Image(v) => write.image_info(v),
                    Infos::Buffer(v) => write.buffer_info(v),
                }
            })
            .collect();

        unsafe { self.device.raw.update_descriptor_sets(&writes, &[]) };

        Ok(self.uniform_sets.insert(UniformSet { raw: raw_set, shape, pool_id }))
    }

    // --- Fence / Semaphore ------------------------------------------

    pub fn fence_create(&mut self, signaled: bool) -> Result<FenceHandle> {
        let mut flags = vk::FenceCreateFlags::empty();
        if signaled {
            flags |= vk::FenceCreateFlags::SIGNALED;
        }
        let raw = unsafe { self.device.raw.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| BackendError::vk("create_fence", e))?;
        Ok(self.fences.insert(Fence { raw }))
    }

    pub fn fence_wait(&self, handle: FenceHandle) -> Result<()> {
        let fence = self.fences.get(handle).ok_or_else(|| BackendError::InvalidArgument("stale fence".into()))?;
        unsafe { self.device.raw.wait_for_fences(&[fence.raw], true, u64::MAX) }
            .map_err(|e| BackendError::vk("wait_for_fences", e))
    }

    pub fn fence_reset(&self, handle: FenceHandle) -> Result<()> {
        let fence = self.fences.get(handle).ok_or_else(|| BackendError::InvalidArgument("stale fence".into()))?;
        unsafe { self.device.raw.reset_fences(&[fence.raw]) }.map_err(|e| BackendError::vk("reset_fences", e))
    }

    pub fn fence_free(&mut self, handle: FenceHandle) {
        if let Some(fence) = self.fences.remove(handle) {
            unsafe { self.device.raw.destroy_fence(fence.raw, None) };
        }
    }

    pub fn fence(&self, handle: FenceHandle) -> Option<&Fence> {
        self.fences.get(handle)
    }

    pub fn semaphore_create(&mut self) -> Result<SemaphoreHandle> {
        let raw = unsafe { self.device.raw.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| BackendError::vk("create_semaphore", e))?;
        Ok(self.semaphores.insert(Semaphore { raw }))
    }

    pub fn semaphore_free(&mut self, handle: SemaphoreHandle) {
        if let Some(sem) = self.semaphores.remove(handle) {
            unsafe { self.device.raw.destroy_semaphore(sem.raw, None) };
        }
    }

    pub fn semaphore(&self, handle: SemaphoreHandle) -> Option<&Semaphore> {
        self.semaphores.get(handle)
    }

    // --- CommandPool / CommandBuffer ---------------------------------

    pub fn command_pool_create(&mut self, queue_family_index: u32) -> Result<CommandPoolHandle> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let raw = unsafe { self.device.raw.create_command_pool(&info, None) }
            .map_err(|e| BackendError::vk("create_command_pool", e))?;
        Ok(self.command_pools.insert(CommandPool { raw, queue_family_index }))
    }

    pub fn command_pool_free(&mut self, handle: CommandPoolHandle) {
        if let Some(pool) = self.command_pools.remove(handle) {
            unsafe { self.device.raw.destroy_command_pool(pool.raw, None) };
        }
    }

    pub fn command_buffer_create(&mut self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let pool_ref = self
            .command_pools
            .get(pool)
            .ok_or_else(|| BackendError::InvalidArgument("stale command pool".into()))?;
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool_ref.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let raw = unsafe { self.device.raw.allocate_command_buffers(&info) }
            .map_err(|e| BackendError::vk("allocate_command_buffers", e))?[0];
        Ok(self.command_buffers.insert(CommandBuffer { raw, state: CommandBufferState::Initial }))
    }

    pub fn command_buffer_begin(&mut self, handle: CommandBufferHandle) -> Result<vk::CommandBuffer> {
        let cmd = self
            .command_buffers
            .get_mut(handle)
            .ok_or_else(|| BackendError::InvalidArgument("stale command buffer".into()))?;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { self.device.raw.begin_command_buffer(cmd.raw, &begin_info) }
            .map_err(|e| BackendError::vk("begin_command_buffer", e))?;
        cmd.state = CommandBufferState::Recording;
        Ok(cmd.raw)
    }

    pub fn command_buffer_end(&mut self, handle: CommandBufferHandle) -> Result<()> {
        let cmd = self
            .command_buffers
            .get_mut(handle)
            .ok_or_else(|| BackendError::InvalidArgument("stale command buffer".into()))?;
        unsafe { self.device.raw.end_command_buffer(cmd.raw) }.map_err(|e| BackendError::vk("end_command_buffer", e))?;
        cmd.state = CommandBufferState::Executable;
        Ok(())
    }

    pub fn command_buffer_reset(&mut self, handle: CommandBufferHandle) -> Result<()> {
        let cmd = self
            .command_buffers
            .get_mut(handle)
            .ok_or_else(|| BackendError::InvalidArgument("stale command buffer".into()))?;
        unsafe { self.device.raw.reset_command_buffer(cmd.raw, vk::CommandBufferResetFlags::empty()) }
            .map_err(|e| BackendError::vk("reset_command_buffer", e))?;
        cmd.state = CommandBufferState::Initial;
        Ok(())
    }

    pub fn command_buffer_raw(&self, handle: CommandBufferHandle) -> Option<vk::CommandBuffer> {
        self.command_buffers.get(handle).map(|c| c.raw)
    }

    pub fn submit(
        &self,
        queue: &crate::device::Queue,
        cmd: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
        fence: Option<vk::Fence>,
    ) -> Result<()> {
        let cmds = [cmd];
        let waits = wait.map(|(s, _)| [s]).unwrap_or_default();
        let wait_stages = wait.map(|(_, stage)| [stage]).unwrap_or_default();
        let signals = signal.map(|s| [s]).unwrap_or_default();
        let mut info = vk::SubmitInfo::default().command_buffers(&cmds);
        if wait.is_some() {
            info = info.wait_semaphores(&waits).wait_dst_stage_mask(&wait_stages);
        }
        if signal.is_some() {
            info = info.signal_semaphores(&signals);
        }
        let _guard = queue.submit_lock.lock();
        unsafe { self.device.raw.queue_submit(queue.raw, &[info], fence.unwrap_or(vk::Fence::null())) }
            .map_err(|e| BackendError::vk("queue_submit", e))
    }

    pub fn device_wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

/// One bound resource in a [`ShaderUniform`] entry (§4.4's handle table).
/// `SamplerWithTexture` carries both handles per array slot since a
/// combined-image-sampler binding needs them together.
#[derive(Debug, Clone, Copy)]
pub enum UniformResource {
    Sampler(SamplerHandle),
    SamplerWithTexture(SamplerHandle, ImageHandle),
    Image(ImageHandle),
    Buffer(BufferHandle),
}

fn descriptor_type_of(kind: ShaderUniformType) -> vk::DescriptorType {
    match kind {
        ShaderUniformType::Sampler => vk::DescriptorType::SAMPLER,
        ShaderUniformType::SamplerWithTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ShaderUniformType::Texture => vk::DescriptorType::SAMPLED_IMAGE,
        ShaderUniformType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        ShaderUniformType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        ShaderUniformType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        ShaderUniformType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
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
