//! Shader module creation, descriptor/pipeline-layout synthesis, and
//! pipeline creation with the on-disk versioned cache (C3, §4.2).
//! Grounded in the original engine's `vk_pipeline.cpp` (cache header
//! format, cache validation, vertex-input-state building, dynamic-rendering
//! pipeline creation) and `vk_shader.cpp` (reflection → layout synthesis).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;

use ash::vk;
use graphics_types::{Format, PipelineKind, RenderPrimitive, ShaderStage, ShaderUniformType};
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, Result};
use crate::reflect::{merge_reflections, reflect_stage, ReflectedShader};
use crate::resources::shader::{Shader, ShaderStageModule, VertexInputVariable};

pub const PIPELINE_CACHE_MAGIC: u32 = 0xBBA786CF;

/// Exact on-disk layout from §4.2. Mismatches in any field discard the
/// cached payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineCacheHeader {
    pub magic: u32,
    pub payload_size: u64,
    pub vendor_id: u32,
    pub device_id: u32,
    pub driver_version: u32,
    pub driver_uuid: [u8; 16],
}

impl PipelineCacheHeader {
    pub const ENCODED_LEN: usize = 4 + 8 + 4 + 4 + 4 + 16;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.payload_size.to_le_bytes());
        out.extend_from_slice(&self.vendor_id.to_le_bytes());
        out.extend_from_slice(&self.device_id.to_le_bytes());
        out.extend_from_slice(&self.driver_version.to_le_bytes());
        out.extend_from_slice(&self.driver_uuid);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<PipelineCacheHeader> {
        if bytes.len() < Self::ENCODED_LEN {
            return None;
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let payload_size = u64::from_le_bytes(bytes[4..12].try_into().ok()?);
        let vendor_id = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
        let device_id = u32::from_le_bytes(bytes[16..20].try_into().ok()?);
        let driver_version = u32::from_le_bytes(bytes[20..24].try_into().ok()?);
        let mut driver_uuid = [0u8; 16];
        driver_uuid.copy_from_slice(&bytes[24..40]);
        Some(PipelineCacheHeader { magic, payload_size, vendor_id, device_id, driver_version, driver_uuid })
    }
}

/// Reads `path`; returns `None` (discarding any payload) unless the header
/// matches the live device identity exactly, per §4.2 "On load, mismatches
/// in any header field discard the payload".
pub fn load_pipeline_cache_payload(
    path: &Path,
    device_identity: &PipelineCacheHeader,
) -> Option<Vec<u8>> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    let header = PipelineCacheHeader::from_bytes(&bytes)?;
    if header.magic != PIPELINE_CACHE_MAGIC {
        return None;
    }
    let expected = PipelineCacheHeader { payload_size: header.payload_size, ..device_identity.clone() };
    if header != expected {
        return None;
    }
    let payload = &bytes[PipelineCacheHeader::ENCODED_LEN..];
    if payload.len() as u64 != header.payload_size {
        return None;
    }
    Some(payload.to_vec())
}

pub fn save_pipeline_cache_payload(
    path: &Path,
    device_identity: &PipelineCacheHeader,
    payload: &[u8],
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let header = PipelineCacheHeader {
        magic: PIPELINE_CACHE_MAGIC,
        payload_size: payload.len() as u64,
        ..device_identity.clone()
    };
    let mut bytes = header.to_bytes();
    bytes.extend_from_slice(payload);
    std::fs::write(path, bytes)
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

fn stage_flags_of(stages: ShaderStage) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStage::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStage::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStage::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

fn component_count_format(component_count: u32) -> Format {
    match component_count {
        1 => Format::R32Sfloat,
        2 => Format::R32G32Sfloat,
        3 => Format::R32G32B32Sfloat,
        _ => Format::R32G32B32A32Sfloat,
    }
}

/// Builds descriptor-set layouts, the pipeline layout, and reflected
/// vertex inputs/push-constant range from a set of SPIR-V blobs tagged
/// with stages (§4.2 steps 1–5).
pub fn create_shader(
    device: &ash::Device,
    blobs: &[(ShaderStage, &[u8])],
) -> Result<Shader> {
    if blobs.is_empty() {
        return Err(BackendError::InvalidArgument("shader requires at least one SPIR-V blob".into()));
    }

    let mut stage_modules = Vec::new();
    let mut reflections: Vec<ReflectedShader> = Vec::new();
    let mut hasher = DefaultHasher::new();

    for (stage, spirv) in blobs {
        if spirv.is_empty() {
            return Err(BackendError::InvalidArgument("empty SPIR-V bytecode".into()));
        }
        let (_module, reflected) = reflect_stage(spirv, *stage)?;
        spirv.hash(&mut hasher);

        let create_info = vk::ShaderModuleCreateInfo::default().code(bytemuck_u32_slice(spirv));
        let module = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(|e| BackendError::PipelineCreationFailed(format!("shader module: {e}")))?;

        stage_modules.push(ShaderStageModule {
            stage: *stage,
            module,
            entry_point: crate::reflect::stage_entry_point_name(*stage).to_string(),
        });
        reflections.push(reflected);
    }

    let merged = merge_reflections(&reflections);

    // §4.2 step 3: one layout per set, bindings sorted by index.
    let mut by_set: std::collections::BTreeMap<u32, Vec<&crate::reflect::ReflectedBinding>> =
        std::collections::BTreeMap::new();
    for binding in merged.bindings.values() {
        by_set.entry(binding.set).or_default().push(binding);
    }

    let mut set_layouts = Vec::new();
    let max_set = by_set.keys().copied().max().unwrap_or(0);
    for set_index in 0..=max_set {
        let mut bindings = by_set.get(&set_index).cloned().unwrap_or_default();
        bindings.sort_by_key(|b| b.binding);
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(descriptor_type_of(b.kind))
                    .descriptor_count(b.count.max(1))
                    .stage_flags(stage_flags_of(b.stages))
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| BackendError::PipelineCreationFailed(format!("descriptor set layout: {e}")))?;
        set_layouts.push(layout);
    }

    let push_constant_ranges = if merged.push_constant_size > 0 {
        vec![vk::PushConstantRange::default()
            .stage_flags(stage_flags_of(merged.push_constant_stages))
            .offset(0)
            .size(merged.push_constant_size)]
    } else {
        Vec::new()
    };

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);
    let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(|e| BackendError::PipelineCreationFailed(format!("pipeline layout: {e}")))?;

    // §4.2 step 5: hash over module bytes, layout identity, declared stage mask.
    pipeline_layout.as_raw().hash(&mut hasher);
    for (stage, _) in blobs {
        (*stage).bits().hash(&mut hasher);
    }
    let shader_hash = hasher.finish();

    let mut offset = 0u32;
    let vertex_inputs: Vec<VertexInputVariable> = merged
        .vertex_inputs
        .iter()
        .map(|v| {
            let format = component_count_format(v.component_count);
            let var = VertexInputVariable { location: v.location, format, offset };
            offset += format.size_bytes();
            var
        })
        .collect();

    Ok(Shader {
        stages: stage_modules,
        descriptor_set_layouts: set_layouts,
        pipeline_layout,
        vertex_inputs,
        push_constant_stage_mask: merged.push_constant_stages,
        push_constant_size: merged.push_constant_size,
        shader_hash,
    })
}

fn bytemuck_u32_slice(bytes: &[u8]) -> &[u32] {
    // SPIR-V is defined to be a stream of little-endian u32 words; callers
    // supply blobs that are already word-aligned (the standard SPIR-V
    // container format).
    assert_eq!(bytes.len() % 4, 0, "SPIR-V blob length must be a multiple of 4");
    unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const u32, bytes.len() / 4) }
}

pub struct GraphicsPipelineOptions {
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
    pub blend_enabled: bool,
    pub primitive: RenderPrimitive,
    pub samples: u32,
    pub sample_shading_min_fraction: f32,
    pub vertex_stride: u32,
}

pub fn compare_op_to_vk(op: graphics_types::CompareOperator) -> vk::CompareOp {
    use graphics_types::CompareOperator as Op;
    match op {
        Op::Never => vk::CompareOp::NEVER,
        Op::Less => vk::CompareOp::LESS,
        Op::Equal => vk::CompareOp::EQUAL,
        Op::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        Op::Greater => vk::CompareOp::GREATER,
        Op::NotEqual => vk::CompareOp::NOT_EQUAL,
        Op::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        Op::Always => vk::CompareOp::ALWAYS,
    }
}

fn primitive_topology(primitive: RenderPrimitive) -> vk::PrimitiveTopology {
    match primitive {
        RenderPrimitive::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        RenderPrimitive::Lines => vk::PrimitiveTopology::LINE_LIST,
        RenderPrimitive::Points => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub fn format_to_vk(format: Format) -> vk::Format {
    match format {
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::R8G8Unorm => vk::Format::R8G8_UNORM,
        Format::R8G8B8Unorm => vk::Format::R8G8B8_UNORM,
        Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        Format::R32Sfloat => vk::Format::R32_SFLOAT,
        Format::R32G32Sfloat => vk::Format::R32G32_SFLOAT,
        Format::R32G32B32Sfloat => vk::Format::R32G32B32_SFLOAT,
        Format::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
        Format::D32Sfloat => vk::Format::D32_SFLOAT,
        Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
        Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
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

/// Creates a dynamic-rendering graphics pipeline (§4.2 "Pipeline creation
/// uses dynamic rendering"), loading/creating a `vk::PipelineCache` from
/// the on-disk payload if present and consistent with `device_identity`.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    shader: &Shader,
    options: &GraphicsPipelineOptions,
    cache_path: &Path,
    device_identity: &PipelineCacheHeader,
) -> Result<(vk::Pipeline, vk::PipelineCache)> {
    let initial_data = load_pipeline_cache_payload(cache_path, device_identity);
    let mut cache_info = vk::PipelineCacheCreateInfo::default();
    if let Some(data) = &initial_data {
        cache_info = cache_info.initial_data(data);
    }
    let pipeline_cache = unsafe { device.create_pipeline_cache(&cache_info, None) }
        .map_err(|e| BackendError::PipelineCreationFailed(format!("pipeline cache: {e}")))?;

    let entry_names: Vec<std::ffi::CString> = shader
        .stages
        .iter()
        .map(|s| std::ffi::CString::new(s.entry_point.as_str()).unwrap_or_default())
        .collect();
    let stages: Vec<vk::PipelineShaderStageCreateInfo> = shader
        .stages
        .iter()
        .zip(entry_names.iter())
        .map(|(s, name)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(match s.stage {
                    ShaderStage::VERTEX => vk::ShaderStageFlags::VERTEX,
                    ShaderStage::FRAGMENT => vk::ShaderStageFlags::FRAGMENT,
                    _ => vk::ShaderStageFlags::VERTEX,
                })
                .module(s.module)
                .name(name)
        })
        .collect();

    let bindings = if options.vertex_stride != 0 {
        vec![vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(options.vertex_stride)
            .input_rate(vk::VertexInputRate::VERTEX)]
    } else {
        Vec::new()
    };
    let attributes: Vec<vk::VertexInputAttributeDescription> = shader
        .vertex_inputs
        .iter()
        .map(|v| {
            vk::VertexInputAttributeDescription::default()
                .binding(0)
                .location(v.location)
                .format(format_to_vk(v.format))
                .offset(v.offset)
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(primitive_topology(options.primitive));

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let samples_flag = samples_to_vk(options.samples);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(samples_flag)
        .sample_shading_enable(options.sample_shading_min_fraction > 0.0)
        .min_sample_shading(options.sample_shading_min_fraction);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(options.depth_test)
        .depth_write_enable(options.depth_write)
        .depth_compare_op(options.compare_op);

    let color_blend_attachment = if options.blend_enabled {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    } else {
        vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    };
    let color_blend_attachments = vec![color_blend_attachment; options.color_formats.len()];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats: Vec<vk::Format> = options.color_formats.iter().map(|f| format_to_vk(*f)).collect();
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
    if let Some(depth) = options.depth_format {
        rendering_info = rendering_info.depth_attachment_format(format_to_vk(depth));
    }

    let mut create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(shader.pipeline_layout)
        .push_next(&mut rendering_info);

    create_info.render_pass = vk::RenderPass::null();

    let pipelines = unsafe {
        device.create_graphics_pipelines(pipeline_cache, &[create_info], None)
    }
    .map_err(|(_, e)| BackendError::PipelineCreationFailed(format!("{e}")))?;

    Ok((pipelines[0], pipeline_cache))
}

pub fn create_compute_pipeline(
    device: &ash::Device,
    shader: &Shader,
    cache_path: &Path,
    device_identity: &PipelineCacheHeader,
) -> Result<(vk::Pipeline, vk::PipelineCache)> {
    let initial_data = load_pipeline_cache_payload(cache_path, device_identity);
    let mut cache_info = vk::PipelineCacheCreateInfo::default();
    if let Some(data) = &initial_data {
        cache_info = cache_info.initial_data(data);
    }
    let pipeline_cache = unsafe { device.create_pipeline_cache(&cache_info, None) }
        .map_err(|e| BackendError::PipelineCreationFailed(format!("pipeline cache: {e}")))?;

    let stage = shader
        .stages
        .first()
        .ok_or_else(|| BackendError::InvalidArgument("compute shader requires one stage".into()))?;
    let entry_name = std::ffi::CString::new(stage.entry_point.as_str()).unwrap_or_default();
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(stage.module)
        .name(&entry_name);
    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info)
        .layout(shader.pipeline_layout);

    let pipelines = unsafe { device.create_compute_pipelines(pipeline_cache, &[create_info], None) }
        .map_err(|(_, e)| BackendError::PipelineCreationFailed(format!("{e}")))?;

    Ok((pipelines[0], pipeline_cache))
}

/// Writes the pipeline cache payload back to disk on free (§3 "Pipelines
/// written back to a versioned on-disk cache on free").
pub fn save_pipeline_cache(
    device: &ash::Device,
    pipeline_cache: vk::PipelineCache,
    cache_path: &Path,
    device_identity: &PipelineCacheHeader,
) -> Result<()> {
    let data = unsafe { device.get_pipeline_cache_data(pipeline_cache) }
        .map_err(|e| BackendError::vk("get_pipeline_cache_data", e))?;
    save_pipeline_cache_payload(cache_path, device_identity, &data)
        .map_err(BackendError::FileError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> PipelineCacheHeader {
        PipelineCacheHeader {
            magic: PIPELINE_CACHE_MAGIC,
            payload_size: 3,
            vendor_id: 0x10de,
            device_id: 42,
            driver_version: 7,
            driver_uuid: [9; 16],
        }
    }

    #[test]
    fn header_round_trips_through_bytes() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), PipelineCacheHeader::ENCODED_LEN);
        assert_eq!(PipelineCacheHeader::from_bytes(&bytes), Some(header));
    }

    #[test]
    fn load_discards_payload_on_device_id_mismatch() {
        let dir = std::env::temp_dir().join(format!("pipeline-cache-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.cache");

        let identity = sample_header();
        save_pipeline_cache_payload(&path, &identity, &[1, 2, 3]).unwrap();
        assert_eq!(load_pipeline_cache_payload(&path, &identity), Some(vec![1, 2, 3]));

        let mutated = PipelineCacheHeader { device_id: identity.device_id + 1, ..identity };
        assert_eq!(load_pipeline_cache_payload(&path, &mutated), None);

        std::fs::remove_dir_all(&dir).ok();
    }
}
