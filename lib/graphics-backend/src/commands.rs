//! Command recording primitives (C5, §4.5). Grounded in the original
//! engine's `vk_commands.cpp`: stateless recording calls, dynamic-rendering
//! begin/end, full-range pipeline barriers with aspect selection, linear
//! blits, buffer/image copies.

use ash::vk;
use graphics_types::{
    AttachmentLoadOp, AttachmentStoreOp, ImageAspect, ImageLayout, PipelineKind, ResolveMode,
};

use crate::resources::shader::Shader;

pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: ImageLayout,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    /// `None` means "transparent black" (§4.5: "no clear color specified").
    pub clear_color: Option<[f32; 4]>,
    pub resolve: Option<ResolveAttachment>,
}

pub struct ResolveAttachment {
    pub image_view: vk::ImageView,
    pub layout: ImageLayout,
    pub mode: ResolveMode,
}

pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: ImageLayout,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub clear_depth: f32,
}

fn layout_to_vk(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::General => vk::ImageLayout::GENERAL,
        ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachmentOptimal => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthStencilAttachmentOptimal => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

fn load_op_to_vk(op: AttachmentLoadOp) -> vk::AttachmentLoadOp {
    match op {
        AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
        AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

fn store_op_to_vk(op: AttachmentStoreOp) -> vk::AttachmentStoreOp {
    match op {
        AttachmentStoreOp::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

fn resolve_mode_to_vk(mode: ResolveMode) -> vk::ResolveModeFlags {
    match mode {
        ResolveMode::None => vk::ResolveModeFlags::NONE,
        ResolveMode::Average => vk::ResolveModeFlags::AVERAGE,
        ResolveMode::Min => vk::ResolveModeFlags::MIN,
        ResolveMode::Max => vk::ResolveModeFlags::MAX,
    }
}

/// Starts dynamic rendering (§4.5 `begin_rendering`).
pub fn begin_rendering(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    extent: vk::Extent2D,
    color_attachments: &[ColorAttachment],
    depth_attachment: Option<&DepthAttachment>,
) {
    let vk_colors: Vec<vk::RenderingAttachmentInfo> = color_attachments
        .iter()
        .map(|a| {
            let mut info = vk::RenderingAttachmentInfo::default()
                .image_view(a.image_view)
                .image_layout(layout_to_vk(a.layout))
                .load_op(load_op_to_vk(a.load_op))
                .store_op(store_op_to_vk(a.store_op))
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue { float32: a.clear_color.unwrap_or([0.0; 4]) },
                });
            if let Some(resolve) = &a.resolve {
                info = info
                    .resolve_mode(resolve_mode_to_vk(resolve.mode))
                    .resolve_image_view(resolve.image_view)
                    .resolve_image_layout(layout_to_vk(resolve.layout));
            }
            info
        })
        .collect();

    let depth_info = depth_attachment.map(|d| {
        vk::RenderingAttachmentInfo::default()
            .image_view(d.image_view)
            .image_layout(layout_to_vk(d.layout))
            .load_op(load_op_to_vk(d.load_op))
            .store_op(store_op_to_vk(d.store_op))
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: d.clear_depth, stencil: 0 },
            })
    });

    let mut rendering_info = vk::RenderingInfo::default()
        .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
        .layer_count(1)
        .color_attachments(&vk_colors);
    if let Some(depth) = &depth_info {
        rendering_info = rendering_info.depth_attachment(depth);
    }

    unsafe { device.cmd_begin_rendering(cmd, &rendering_info) };
}

pub fn end_rendering(device: &ash::Device, cmd: vk::CommandBuffer) {
    unsafe { device.cmd_end_rendering(cmd) };
}

/// Full-range pipeline barrier. Depth-layout endpoints select the depth
/// aspect; anything else selects color (§4.5 `transition_image`).
pub fn transition_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    base_mip: u32,
    level_count: u32,
) {
    let aspect = if old_layout.is_depth_layout() || new_layout.is_depth_layout() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(layout_to_vk(old_layout))
        .new_layout(layout_to_vk(new_layout))
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: base_mip,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        });
    let barriers = [barrier];
    let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

/// A linear blit between possibly different extents and mip levels (§4.5
/// `copy_image_to_image`).
pub fn copy_image_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    src_layout: ImageLayout,
    src_extent: (u32, u32),
    src_mip: u32,
    dst: vk::Image,
    dst_layout: ImageLayout,
    dst_extent: (u32, u32),
    dst_mip: u32,
) {
    let region = vk::ImageBlit2::default()
        .src_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: src_mip,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_offsets([
            vk::Offset3D::default(),
            vk::Offset3D { x: src_extent.0 as i32, y: src_extent.1 as i32, z: 1 },
        ])
        .dst_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: dst_mip,
            base_array_layer: 0,
            layer_count: 1,
        })
        .dst_offsets([
            vk::Offset3D::default(),
            vk::Offset3D { x: dst_extent.0 as i32, y: dst_extent.1 as i32, z: 1 },
        ]);
    let regions = [region];
    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(layout_to_vk(src_layout))
        .dst_image(dst)
        .dst_image_layout(layout_to_vk(dst_layout))
        .regions(&regions)
        .filter(vk::Filter::LINEAR);
    unsafe { device.cmd_blit_image2(cmd, &blit_info) };
}

#[derive(Debug, Clone, Copy)]
pub struct BufferImageCopyRegion {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub image_extent: (u32, u32),
}

pub fn copy_buffer_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    image: vk::Image,
    image_layout: ImageLayout,
    region: BufferImageCopyRegion,
) {
    let copy = vk::BufferImageCopy::default()
        .buffer_offset(region.buffer_offset)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: region.mip_level,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D { width: region.image_extent.0, height: region.image_extent.1, depth: 1 });
    unsafe {
        device.cmd_copy_buffer_to_image(cmd, buffer, image, layout_to_vk(image_layout), &[copy])
    };
}

pub fn copy_image_to_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    image_layout: ImageLayout,
    buffer: vk::Buffer,
    region: BufferImageCopyRegion,
) {
    let copy = vk::BufferImageCopy::default()
        .buffer_offset(region.buffer_offset)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: region.mip_level,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(vk::Extent3D { width: region.image_extent.0, height: region.image_extent.1, depth: 1 });
    unsafe {
        device.cmd_copy_image_to_buffer(cmd, image, layout_to_vk(image_layout), buffer, &[copy])
    };
}

pub fn copy_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    src_offset: u64,
    dst_offset: u64,
    size: u64,
) {
    let region = vk::BufferCopy::default().src_offset(src_offset).dst_offset(dst_offset).size(size);
    unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
}

/// Requires `image` to be in `General` layout (§4.5 `clear_color`).
pub fn clear_color(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    color: [f32; 4],
    aspect: ImageAspect,
) {
    let vk_aspect = if aspect.contains(ImageAspect::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };
    let range = vk::ImageSubresourceRange {
        aspect_mask: vk_aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: 1,
    };
    unsafe {
        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::GENERAL,
            &vk::ClearColorValue { float32: color },
            &[range],
        )
    };
}

pub fn draw(device: &ash::Device, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
    unsafe { device.cmd_draw(cmd, vertex_count, instance_count, 0, 0) };
}

pub fn draw_indexed(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    index_count: u32,
    instance_count: u32,
) {
    unsafe { device.cmd_draw_indexed(cmd, index_count, instance_count, 0, 0, 0) };
}

pub fn draw_indexed_indirect(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    offset: u64,
    draw_count: u32,
    stride: u32,
) {
    unsafe { device.cmd_draw_indexed_indirect(cmd, buffer, offset, draw_count, stride) };
}

pub fn dispatch(device: &ash::Device, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
    unsafe { device.cmd_dispatch(cmd, x, y, z) };
}

/// Binds to the shader's pipeline layout, starting at `first_set` (§4.5
/// `bind_uniform_sets`). An empty `sets` is a no-op (§8 boundary behavior
/// "Bind 0 uniform sets: succeeds, is a no-op").
pub fn bind_uniform_sets(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    shader: &Shader,
    first_set: u32,
    sets: &[vk::DescriptorSet],
    kind: PipelineKind,
) {
    if sets.is_empty() {
        return;
    }
    let bind_point = match kind {
        PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
    };
    unsafe {
        device.cmd_bind_descriptor_sets(cmd, bind_point, shader.pipeline_layout, first_set, sets, &[])
    };
}

/// Uses the shader's declared push-constant stage mask (§4.5 `push_constants`).
pub fn push_constants(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    shader: &Shader,
    offset: u32,
    data: &[u8],
) {
    let mut stage_flags = vk::ShaderStageFlags::empty();
    if shader.push_constant_stage_mask.contains(graphics_types::ShaderStage::VERTEX) {
        stage_flags |= vk::ShaderStageFlags::VERTEX;
    }
    if shader.push_constant_stage_mask.contains(graphics_types::ShaderStage::FRAGMENT) {
        stage_flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if shader.push_constant_stage_mask.contains(graphics_types::ShaderStage::COMPUTE) {
        stage_flags |= vk::ShaderStageFlags::COMPUTE;
    }
    unsafe { device.cmd_push_constants(cmd, shader.pipeline_layout, stage_flags, offset, data) };
}

pub fn bind_pipeline(device: &ash::Device, cmd: vk::CommandBuffer, pipeline: vk::Pipeline, kind: PipelineKind) {
    let bind_point = match kind {
        PipelineKind::Graphics => vk::PipelineBindPoint::GRAPHICS,
        PipelineKind::Compute => vk::PipelineBindPoint::COMPUTE,
    };
    unsafe { device.cmd_bind_pipeline(cmd, bind_point, pipeline) };
}

pub fn set_viewport_scissor(device: &ash::Device, cmd: vk::CommandBuffer, width: u32, height: u32) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: width as f32,
        height: height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width, height } };
    unsafe {
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);
    }
}
