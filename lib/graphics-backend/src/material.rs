//! Material definition/instance system (C9, §4.10).

use std::collections::HashMap;
use std::path::Path;

use ash::vk;
use graphics_types::{
    BufferUsage, CompareOperator, Format, MaterialParamType, MaterialUniformDecl, MemoryLocation,
    RenderPrimitive, ShaderStage, ShaderUniform, ShaderUniformType,
};

use crate::context::{Context, UniformResource};
use crate::error::{BackendError, Result};
use crate::handles::{BufferHandle, PipelineHandle, SamplerHandle, ShaderHandle, UniformSetHandle};
use crate::pipeline_factory::GraphicsPipelineOptions;
use crate::texture::Texture;

/// Creation-time options for a material's pipeline (§4.10).
pub struct MaterialOptions {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: CompareOperator,
    pub blend: bool,
    pub primitive: RenderPrimitive,
    pub samples: u32,
}

impl Default for MaterialOptions {
    fn default() -> Self {
        MaterialOptions {
            depth_test: true,
            depth_write: true,
            compare_op: CompareOperator::Less,
            blend: false,
            primitive: RenderPrimitive::Triangles,
            samples: 1,
        }
    }
}

/// A reusable shader + pipeline + declared parameter schema (§3
/// "MaterialDefinition"). Instances (see [`MaterialInstance`]) each get
/// their own parameter buffer and uniform set built against this shader.
pub struct MaterialDefinition {
    pub shader: ShaderHandle,
    pub pipeline: PipelineHandle,
    pub uniforms: Vec<MaterialUniformDecl>,
}

fn align_up(offset: u64, align: u64) -> u64 {
    if align == 0 {
        return offset;
    }
    offset.div_ceil(align) * align
}

/// Computes each non-texture parameter's byte offset in declared order,
/// plus the total packed buffer size (§4.10's alignment rule; Testable
/// Property 7).
fn layout_params(uniforms: &[MaterialUniformDecl]) -> (Vec<(String, u64, u64)>, u64) {
    let mut offset = 0u64;
    let mut fields = Vec::new();
    for decl in uniforms.iter().filter(|d| !d.ty.is_texture()) {
        let size = decl.ty.packed_size() as u64;
        offset = align_up(offset, size);
        fields.push((decl.name.clone(), offset, size));
        offset += size;
    }
    (fields, offset)
}

impl MaterialDefinition {
    /// Reflects `vertex_spirv`/`fragment_spirv`, synthesizes the pipeline
    /// layout and a dynamic-rendering pipeline for `color_formats` /
    /// `depth_format`, and stores `uniforms` as the instance parameter
    /// schema (§4.10).
    pub fn create(
        ctx: &mut Context,
        vertex_spirv: &[u8],
        fragment_spirv: &[u8],
        color_formats: &[Format],
        depth_format: Option<Format>,
        uniforms: Vec<MaterialUniformDecl>,
        options: &MaterialOptions,
        cache_dir: &Path,
    ) -> Result<MaterialDefinition> {
        let shader = ctx.shader_create(&[
            (ShaderStage::VERTEX, vertex_spirv),
            (ShaderStage::FRAGMENT, fragment_spirv),
        ])?;
        let shader_ref = ctx
            .shader(shader)
            .ok_or_else(|| BackendError::Fatal("shader vanished immediately after creation".into()))?;

        let vertex_stride = shader_ref.vertex_inputs.iter().map(|v| v.offset + format_size(v.format)).max().unwrap_or(0);

        let pipeline_options = GraphicsPipelineOptions {
            color_formats: color_formats.to_vec(),
            depth_format,
            depth_test: options.depth_test,
            depth_write: options.depth_write,
            compare_op: crate::pipeline_factory::compare_op_to_vk(options.compare_op),
            blend_enabled: options.blend,
            primitive: options.primitive,
            samples: options.samples,
            sample_shading_min_fraction: 0.0,
            vertex_stride,
        };

        let identity = ctx.device_identity();
        let cache_path = cache_dir.join(format!("{:016x}.cache", shader_ref.shader_hash));
        let (raw_pipeline, pipeline_cache) = crate::pipeline_factory::create_graphics_pipeline(
            &ctx.device.raw,
            shader_ref,
            &pipeline_options,
            &cache_path,
            &identity,
        )?;
        let shader_hash = shader_ref.shader_hash;

        let pipeline = ctx.pipeline_insert(crate::resources::Pipeline {
            raw: raw_pipeline,
            kind: graphics_types::PipelineKind::Graphics,
            shader_hash,
            pipeline_cache,
        });

        Ok(MaterialDefinition { shader, pipeline, uniforms })
    }
}

fn format_size(format: Format) -> u32 {
    format.size_bytes()
}

enum MaterialParamValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color([f32; 4]),
    Texture(Texture),
}

/// A live instance of a [`MaterialDefinition`] (§3 "MaterialInstance"):
/// its own packed parameter buffer, uniform set (set index 1), and a
/// dirty-tracked parameter map.
pub struct MaterialInstance {
    definition_shader: ShaderHandle,
    definition_pipeline: PipelineHandle,
    pub param_buffer: BufferHandle,
    pub uniform_set: UniformSetHandle,
    buffer_size: u64,
    field_offsets: HashMap<String, (u64, u64)>,
    texture_bindings: HashMap<String, u32>,
    params: HashMap<String, MaterialParamValue>,
    dirty: bool,
}

impl MaterialInstance {
    pub fn create(ctx: &mut Context, def: &MaterialDefinition, default_sampler: SamplerHandle) -> Result<MaterialInstance> {
        let (fields, buffer_size) = layout_params(&def.uniforms);
        let buffer_size = buffer_size.max(4);
        let param_buffer = ctx.buffer_create(buffer_size, BufferUsage::UNIFORM, MemoryLocation::CpuVisible)?;

        let field_offsets: HashMap<String, (u64, u64)> =
            fields.into_iter().map(|(name, offset, size)| (name, (offset, size))).collect();
        let texture_bindings: HashMap<String, u32> = def
            .uniforms
            .iter()
            .filter(|d| d.ty.is_texture())
            .map(|d| (d.name.clone(), d.binding))
            .collect();

        let mut set_entries = vec![ShaderUniform {
            kind: ShaderUniformType::UniformBuffer,
            binding: 0,
            data: vec![UniformResource::Buffer(param_buffer)],
        }];
        for decl in def.uniforms.iter().filter(|d| d.ty.is_texture()) {
            set_entries.push(ShaderUniform {
                kind: ShaderUniformType::SamplerWithTexture,
                binding: decl.binding,
                data: vec![UniformResource::SamplerWithTexture(default_sampler, default_white_image(ctx)?)],
            });
        }

        let uniform_set = ctx.uniform_set_create(def.shader, 1, &set_entries)?;

        Ok(MaterialInstance {
            definition_shader: def.shader,
            definition_pipeline: def.pipeline,
            param_buffer,
            uniform_set,
            buffer_size,
            field_offsets,
            texture_bindings,
            params: HashMap::new(),
            dirty: true,
        })
    }

    pub fn set_param_int(&mut self, name: &str, value: i32) {
        self.params.insert(name.to_string(), MaterialParamValue::Int(value));
        self.dirty = true;
    }

    pub fn set_param_float(&mut self, name: &str, value: f32) {
        self.params.insert(name.to_string(), MaterialParamValue::Float(value));
        self.dirty = true;
    }

    pub fn set_param_vec2(&mut self, name: &str, value: [f32; 2]) {
        self.params.insert(name.to_string(), MaterialParamValue::Vec2(value));
        self.dirty = true;
    }

    pub fn set_param_vec3(&mut self, name: &str, value: [f32; 3]) {
        self.params.insert(name.to_string(), MaterialParamValue::Vec3(value));
        self.dirty = true;
    }

    pub fn set_param_vec4(&mut self, name: &str, value: [f32; 4]) {
        self.params.insert(name.to_string(), MaterialParamValue::Vec4(value));
        self.dirty = true;
    }

    pub fn set_param_color(&mut self, name: &str, value: [f32; 4]) {
        self.params.insert(name.to_string(), MaterialParamValue::Color(value));
        self.dirty = true;
    }

    pub fn set_param_texture(&mut self, name: &str, texture: Texture) {
        self.params.insert(name.to_string(), MaterialParamValue::Texture(texture));
        self.dirty = true;
    }

    /// Writes dirty parameter bytes into the mapped uniform buffer and
    /// re-binds any texture params that changed (§4.10 "called
    /// automatically at render time if dirty"). A no-op when not dirty.
    pub fn upload(&mut self, ctx: &mut Context) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let ptr = ctx.buffer_map(self.param_buffer)?;
        let mut scratch = vec![0u8; self.buffer_size as usize];
        for (name, value) in &self.params {
            let Some(&(offset, size)) = self.field_offsets.get(name) else { continue };
            let bytes: [u8; 16] = match value {
                MaterialParamValue::Int(v) => {
                    let mut b = [0u8; 16];
                    b[..4].copy_from_slice(&v.to_le_bytes());
                    b
                }
                MaterialParamValue::Float(v) => {
                    let mut b = [0u8; 16];
                    b[..4].copy_from_slice(&v.to_le_bytes());
                    b
                }
                MaterialParamValue::Vec2(v) => {
                    let mut b = [0u8; 16];
                    b[..4].copy_from_slice(&v[0].to_le_bytes());
                    b[4..8].copy_from_slice(&v[1].to_le_bytes());
                    b
                }
                MaterialParamValue::Vec3(v) => {
                    let mut b = [0u8; 16];
                    for (i, c) in v.iter().enumerate() {
                        b[i * 4..i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                    }
                    b
                }
                MaterialParamValue::Vec4(v) | MaterialParamValue::Color(v) => {
                    let mut b = [0u8; 16];
                    for (i, c) in v.iter().enumerate() {
                        b[i * 4..i * 4 + 4].copy_from_slice(&c.to_le_bytes());
                    }
                    b
                }
                MaterialParamValue::Texture(_) => continue,
            };
            let end = (offset as usize + size as usize).min(scratch.len());
            scratch[offset as usize..end].copy_from_slice(&bytes[..end - offset as usize]);
        }
        unsafe { std::ptr::copy_nonoverlapping(scratch.as_ptr(), ptr, scratch.len()) };

        let texture_updates: Vec<(u32, Texture)> = self
            .params
            .iter()
            .filter_map(|(name, value)| match value {
                MaterialParamValue::Texture(t) => self.texture_bindings.get(name).map(|&b| (b, *t)),
                _ => None,
            })
            .collect();
        for (binding, texture) in texture_updates {
            self.bind_texture(ctx, binding, texture)?;
        }

        self.dirty = false;
        Ok(())
    }

    /// Re-binds a texture parameter at `binding` in place (§9 Open Question
    /// 4: in-place descriptor update, no set reallocation).
    fn bind_texture(&self, ctx: &Context, binding: u32, texture: Texture) -> Result<()> {
        let set = ctx
            .uniform_set(self.uniform_set)
            .ok_or_else(|| BackendError::InvalidArgument("stale uniform set".into()))?;
        let image = ctx
            .image(texture.image)
            .ok_or_else(|| BackendError::InvalidArgument("stale image handle".into()))?;
        let sampler = ctx
            .sampler(texture.sampler)
            .ok_or_else(|| BackendError::InvalidArgument("stale sampler handle".into()))?;
        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(sampler.raw)
            .image_view(image.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set.raw)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe { ctx.device.raw.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    pub fn shader(&self) -> ShaderHandle {
        self.definition_shader
    }

    pub fn pipeline_hint(&self) -> PipelineHandle {
        self.definition_pipeline
    }
}

/// A 1x1 white texture used as the placeholder binding for texture
/// parameters until `set_param_texture` supplies a real one, so a freshly
/// created instance's uniform set is always fully bound.
fn default_white_image(ctx: &mut Context) -> Result<crate::handles::ImageHandle> {
    ctx.image_create(1, 1, Format::R8G8B8A8Unorm, graphics_types::ImageUsage::SAMPLED, 1, false, Some(&[255, 255, 255, 255]))
}

/// Registers the built-in unlit and PBR-standard material definitions
/// (§4.10's closing paragraph) under fixed asset paths.
pub const UNLIT_MATERIAL_PATH: &str = "res://materials/unlit.json";
pub const PBR_STANDARD_MATERIAL_PATH: &str = "res://materials/pbr_standard.json";

pub fn unlit_uniform_schema() -> Vec<MaterialUniformDecl> {
    vec![
        MaterialUniformDecl { name: "base_color".into(), binding: 0, ty: MaterialParamType::Color },
        MaterialUniformDecl { name: "diffuse".into(), binding: 1, ty: MaterialParamType::Texture },
    ]
}

pub fn pbr_standard_uniform_schema() -> Vec<MaterialUniformDecl> {
    vec![
        MaterialUniformDecl { name: "base_color".into(), binding: 0, ty: MaterialParamType::Color },
        MaterialUniformDecl { name: "metallic".into(), binding: 0, ty: MaterialParamType::Float },
        MaterialUniformDecl { name: "roughness".into(), binding: 0, ty: MaterialParamType::Float },
        MaterialUniformDecl { name: "diffuse".into(), binding: 1, ty: MaterialParamType::Texture },
        MaterialUniformDecl { name: "normal".into(), binding: 2, ty: MaterialParamType::Texture },
        MaterialUniformDecl { name: "metallic_roughness".into(), binding: 3, ty: MaterialParamType::Texture },
        MaterialUniformDecl { name: "ambient_occlusion".into(), binding: 4, ty: MaterialParamType::Texture },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_matches_seed_scenario_s6() {
        let decls = vec![
            MaterialUniformDecl { name: "color".into(), binding: 0, ty: MaterialParamType::Color },
            MaterialUniformDecl { name: "metallic".into(), binding: 0, ty: MaterialParamType::Float },
            MaterialUniformDecl { name: "roughness".into(), binding: 0, ty: MaterialParamType::Float },
        ];
        let (_, size) = layout_params(&decls);
        assert_eq!(size, 24);
    }

    #[test]
    fn adding_vec3_param_grows_to_48_bytes_with_padding() {
        let decls = vec![
            MaterialUniformDecl { name: "color".into(), binding: 0, ty: MaterialParamType::Color },
            MaterialUniformDecl { name: "metallic".into(), binding: 0, ty: MaterialParamType::Float },
            MaterialUniformDecl { name: "roughness".into(), binding: 0, ty: MaterialParamType::Float },
            MaterialUniformDecl { name: "x".into(), binding: 0, ty: MaterialParamType::Vec3 },
        ];
        let (_, size) = layout_params(&decls);
        assert_eq!(size, 48);
    }

    #[test]
    fn texture_params_excluded_from_buffer_layout() {
        let decls = vec![
            MaterialUniformDecl { name: "diffuse".into(), binding: 1, ty: MaterialParamType::Texture },
            MaterialUniformDecl { name: "metallic".into(), binding: 0, ty: MaterialParamType::Float },
        ];
        let (fields, size) = layout_params(&decls);
        assert_eq!(fields.len(), 1);
        assert_eq!(size, 4);
    }
}
