//! SPIR-V reflection (§4.2 steps 1–2), built on `naga`'s SPIR-V frontend.
//! Grounded in the original engine's `vk_shader.cpp` reflection walk
//! (entry-point validation, binding merge with stage-flag OR-ing, array-
//! dimension multiplication, built-in vertex input skip) but implemented
//! against `naga::Module` instead of `spirv_reflect`.

use std::collections::BTreeMap;

use graphics_types::{ShaderStage, ShaderUniformType};
use naga::{AddressSpace, TypeInner};

use crate::error::{BackendError, Result};

#[derive(Debug, Clone)]
pub struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    pub kind: ShaderUniformType,
    pub count: u32,
    pub stages: ShaderStage,
}

#[derive(Debug, Clone)]
pub struct ReflectedVertexInput {
    pub location: u32,
    /// Number of 32-bit components, used to pick a tightly-packed format.
    pub component_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ReflectedShader {
    pub bindings: BTreeMap<(u32, u32), ReflectedBinding>,
    pub vertex_inputs: Vec<ReflectedVertexInput>,
    pub push_constant_size: u32,
    pub push_constant_stages: ShaderStage,
}

pub fn stage_entry_point_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::VERTEX => "vertexMain",
        ShaderStage::FRAGMENT => "fragmentMain",
        ShaderStage::COMPUTE => "computeMain",
        _ => "main",
    }
}

fn array_len(module: &naga::Module, ty: naga::Handle<naga::Type>) -> (ShaderUniformType, u32) {
    match &module.types[ty].inner {
        TypeInner::Array { base, size, .. } => {
            let (kind, inner_count) = array_len(module, *base);
            let count = match size {
                naga::ArraySize::Constant(n) => n.get(),
                _ => 1,
            };
            (kind, inner_count * count)
        }
        TypeInner::Image { class, .. } => {
            let kind = match class {
                naga::ImageClass::Storage { .. } => ShaderUniformType::StorageImage,
                _ => ShaderUniformType::Texture,
            };
            (kind, 1)
        }
        TypeInner::Sampler { .. } => (ShaderUniformType::Sampler, 1),
        _ => (ShaderUniformType::UniformBuffer, 1),
    }
}

/// Classifies one global variable's resource kind. Combined sampler+texture
/// bindings (the common GLSL/HLSL-style `sampler2D`) are not separately
/// representable in SPIR-V bindings reflected this way; callers that need
/// `SamplerWithTexture` semantics declare a sampler binding and a texture
/// binding at adjacent indices and pair them at uniform-set-creation time
/// (§4.4), which is also how the original engine's material definitions do
/// it (separate `sampler`/`texture` uniform entries).
fn classify_global(module: &naga::Module, var: &naga::GlobalVariable) -> Option<(ShaderUniformType, u32)> {
    match var.space {
        AddressSpace::Uniform => Some((ShaderUniformType::UniformBuffer, 1)),
        AddressSpace::Storage { .. } => Some((ShaderUniformType::StorageBuffer, 1)),
        AddressSpace::Handle => {
            let (kind, count) = array_len(module, var.ty);
            Some((kind, count))
        }
        _ => None,
    }
}

/// Reflects one SPIR-V blob for the given stage, requiring the stage's
/// fixed entry-point name to exist (§4.2 step 1).
pub fn reflect_stage(spirv: &[u8], stage: ShaderStage) -> Result<(naga::Module, ReflectedShader)> {
    let options = naga::front::spv::Options::default();
    let module = naga::front::spv::parse_u8_slice(spirv, &options)
        .map_err(|e| BackendError::ShaderReflectionError(format!("{e}")))?;

    let entry_name = stage_entry_point_name(stage);
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_name)
        .ok_or_else(|| {
            BackendError::ShaderReflectionError(format!(
                "missing entry point {entry_name:?} for stage {stage:?}"
            ))
        })?;

    let mut reflected = ReflectedShader::default();

    for (handle, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else { continue };
        let Some((kind, count)) = classify_global(&module, var) else { continue };
        let key = (binding.group, binding.binding);
        reflected
            .bindings
            .entry(key)
            .and_modify(|b| b.stages |= stage)
            .or_insert(ReflectedBinding { set: binding.group, binding: binding.binding, kind, count, stages: stage });
        let _ = handle;
    }

    for var in module.global_variables.iter().map(|(_, v)| v) {
        if var.space == AddressSpace::PushConstant {
            let size = module.types[var.ty].inner.size(module.to_ctx());
            reflected.push_constant_size = reflected.push_constant_size.max(size);
            reflected.push_constant_stages |= stage;
        }
    }

    if stage == ShaderStage::VERTEX {
        for arg in &entry.function.arguments {
            let Some(naga::Binding::Location { location, .. }) = &arg.binding else { continue };
            let component_count = match &module.types[arg.ty].inner {
                TypeInner::Scalar(_) => 1,
                TypeInner::Vector { size, .. } => *size as u32,
                _ => 1,
            };
            reflected.vertex_inputs.push(ReflectedVertexInput { location: *location, component_count });
        }
        reflected.vertex_inputs.sort_by_key(|v| v.location);
    }

    Ok((module, reflected))
}

/// Merges per-stage reflections by `(set, binding)`, OR-ing stage flags
/// (§4.2 step 2).
pub fn merge_reflections(stages: &[ReflectedShader]) -> ReflectedShader {
    let mut merged = ReflectedShader::default();
    for r in stages {
        for (key, binding) in &r.bindings {
            merged
                .bindings
                .entry(*key)
                .and_modify(|b| b.stages |= binding.stages)
                .or_insert_with(|| binding.clone());
        }
        if r.vertex_inputs.len() > merged.vertex_inputs.len() {
            merged.vertex_inputs = r.vertex_inputs.clone();
        }
        merged.push_constant_size = merged.push_constant_size.max(r.push_constant_size);
        merged.push_constant_stages |= r.push_constant_stages;
    }
    merged
}
