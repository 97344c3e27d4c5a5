use ash::vk;
use graphics_types::PipelineKind;

/// A pipeline resource (§3 "Pipeline"): the live pipeline object plus the
/// identity needed to write its on-disk cache back on free (§4.2).
pub struct Pipeline {
    pub raw: vk::Pipeline,
    pub kind: PipelineKind,
    pub shader_hash: u64,
    pub pipeline_cache: vk::PipelineCache,
}
