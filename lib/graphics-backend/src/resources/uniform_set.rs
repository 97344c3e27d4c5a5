use ash::vk;
use graphics_types::PoolShapeKey;

/// A descriptor set allocated from a shape-keyed pool (§3 "UniformSet").
/// `pool_id` is the back-pointer the descriptor pool allocator uses for
/// reference-counted freeing (§4.3) — not a shared-ownership pointer, just
/// an index the allocator's map is keyed by (§9 "do not attempt to
/// back-pointer with shared ownership").
pub struct UniformSet {
    pub raw: vk::DescriptorSet,
    pub shape: PoolShapeKey,
    pub pool_id: u64,
}
