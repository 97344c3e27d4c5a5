use ash::vk;
use graphics_types::{Format, ShaderStage};

/// One reflected vertex input variable, sorted by `location` (§4.2 "Vertex
/// input order policy").
#[derive(Debug, Clone)]
pub struct VertexInputVariable {
    pub location: u32,
    pub format: Format,
    /// Tightly packed offset: sum of the sizes of preceding variables.
    pub offset: u32,
}

/// A shader resource (§3 "Shader"): the set of stages in use, the
/// synthesized pipeline layout, one descriptor-set layout per set index
/// that appeared in the SPIR-V, the reflected vertex inputs, the merged
/// push-constant stage mask, and the content hash naming its pipeline
/// cache file (§4.2).
pub struct Shader {
    pub stages: Vec<ShaderStageModule>,
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_inputs: Vec<VertexInputVariable>,
    pub push_constant_stage_mask: ShaderStage,
    pub push_constant_size: u32,
    pub shader_hash: u64,
}

pub struct ShaderStageModule {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
    pub entry_point: String,
}
