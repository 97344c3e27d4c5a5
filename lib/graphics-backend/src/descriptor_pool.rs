//! Descriptor-set pool allocator (C4, §4.3). Grounded in the original
//! engine's `DescriptorSetPoolKey`/`DescriptorSetPools` declarations in
//! `vk_backend.h` (the allocator body itself wasn't present in the
//! retrieved source; this implements the algorithm directly from §4.3).

use std::collections::BTreeMap;

use ash::vk;
use graphics_types::{PoolShapeKey, ShaderUniformType, UNIFORM_TYPE_COUNT};

use crate::error::{BackendError, Result};

pub const MAX_DESCRIPTORS_PER_POOL: u32 = 10;
pub const MAX_SETS_PER_TYPE_IN_POOL: u32 = 65_535;

struct PoolEntry {
    raw: vk::DescriptorPool,
    live_count: u32,
}

/// `shape -> pool_id -> live_set_count` (§4.3). `pool_id` is a small
/// monotonically increasing counter, not the raw `vk::DescriptorPool`
/// handle, so the map's keys stay stable even if a driver ever recycled a
/// handle value.
#[derive(Default)]
pub struct DescriptorPoolAllocator {
    buckets: BTreeMap<PoolShapeKey, BTreeMap<u64, PoolEntry>>,
    next_pool_id: u64,
}

impl DescriptorPoolAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Property 2 (§8): for every shape, the sum of live counts across its
    /// pools equals the number of live uniform sets with that shape.
    pub fn live_count_for_shape(&self, shape: PoolShapeKey) -> u32 {
        self.buckets
            .get(&shape)
            .map(|pools| pools.values().map(|p| p.live_count).sum())
            .unwrap_or(0)
    }

    pub fn pool_count_for_shape(&self, shape: PoolShapeKey) -> usize {
        self.buckets.get(&shape).map(|p| p.len()).unwrap_or(0)
    }

    fn fixed_pool_sizes(shape: PoolShapeKey) -> Vec<vk::DescriptorPoolSize> {
        use strum::IntoEnumIterator;
        ShaderUniformType::iter()
            .filter_map(|kind| {
                let per_set = shape.count_of(kind);
                if per_set == 0 {
                    return None;
                }
                let total = (per_set as u32 * MAX_DESCRIPTORS_PER_POOL).min(MAX_SETS_PER_TYPE_IN_POOL);
                Some(
                    vk::DescriptorPoolSize::default()
                        .ty(descriptor_type_of(kind))
                        .descriptor_count(total),
                )
            })
            .collect()
    }

    /// Allocates one descriptor set of `layout` matching `shape`, creating
    /// a new pool if every existing pool under this shape is full (§4.3
    /// "Allocate").
    pub fn allocate(
        &mut self,
        device: &ash::Device,
        shape: PoolShapeKey,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorSet, u64)> {
        for kind_count in shape.counts.iter() {
            if *kind_count as u32 > MAX_SETS_PER_TYPE_IN_POOL {
                return Err(BackendError::CapacityExceeded(shape));
            }
        }

        let bucket = self.buckets.entry(shape).or_default();
        let existing_pool = bucket
            .iter_mut()
            .find(|(_, entry)| entry.live_count < MAX_DESCRIPTORS_PER_POOL);

        let (pool_id, raw_pool) = if let Some((id, entry)) = existing_pool {
            (*id, entry.raw)
        } else {
            let sizes = Self::fixed_pool_sizes(shape);
            let pool_info = vk::DescriptorPoolCreateInfo::default()
                .max_sets(MAX_DESCRIPTORS_PER_POOL)
                .pool_sizes(&sizes)
                .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
            let raw = unsafe { device.create_descriptor_pool(&pool_info, None) }
                .map_err(|e| BackendError::AllocationFailed(format!("descriptor pool: {e}")))?;
            let id = self.next_pool_id;
            self.next_pool_id += 1;
            bucket.insert(id, PoolEntry { raw, live_count: 0 });
            (id, raw)
        };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(raw_pool)
            .set_layouts(&layouts);
        match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => {
                bucket.get_mut(&pool_id).unwrap().live_count += 1;
                Ok((sets[0], pool_id))
            }
            Err(e) => Err(BackendError::AllocationFailed(format!("allocate_descriptor_sets: {e}"))),
        }
    }

    /// Frees one set (§4.3 "Free"): decrements the pool's live count,
    /// destroying the pool (and erasing the bucket if it becomes empty)
    /// once it reaches zero.
    pub fn free(
        &mut self,
        device: &ash::Device,
        shape: PoolShapeKey,
        pool_id: u64,
        set: vk::DescriptorSet,
    ) {
        let Some(bucket) = self.buckets.get_mut(&shape) else { return };
        let Some(entry) = bucket.get_mut(&pool_id) else { return };

        unsafe {
            let _ = device.free_descriptor_sets(entry.raw, &[set]);
        }
        entry.live_count = entry.live_count.saturating_sub(1);

        if entry.live_count == 0 {
            unsafe { device.destroy_descriptor_pool(entry.raw, None) };
            bucket.remove(&pool_id);
        }
        if bucket.is_empty() {
            self.buckets.remove(&shape);
        }
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    // S2 seed scenario (§8) exercises the host-side bucketing bookkeeping
    // without a live device; `allocate`/`free` themselves need a real
    // `ash::Device` and are covered indirectly through the uniform-set
    // creation tests instead.

    #[test]
    fn shape_key_groups_equal_vectors() {
        let mut counts_a = [0u16; UNIFORM_TYPE_COUNT];
        counts_a[ShaderUniformType::UniformBuffer as usize] = 1;
        counts_a[ShaderUniformType::SamplerWithTexture as usize] = 1;
        let key_a = PoolShapeKey { counts: counts_a };
        let key_b = PoolShapeKey { counts: counts_a };
        assert_eq!(key_a, key_b);

        let allocator = DescriptorPoolAllocator::new();
        assert_eq!(allocator.live_count_for_shape(key_a), 0);
    }
}
