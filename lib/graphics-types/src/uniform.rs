use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter};

/// Maximum number of descriptor sets a shader may declare (§4.4 inputs use
/// set indices up to this bound; material instances use set index 1).
pub const MAX_UNIFORM_SETS: usize = 16;

/// The seven uniform kinds the descriptor-pool allocator buckets by (§4.3,
/// §4.4 table). Order here fixes the index each kind occupies in a
/// [`PoolShapeKey`] — it must stay stable since the key's `Ord` impl
/// compares the raw count array, not named fields.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, Serialize, Deserialize,
)]
pub enum ShaderUniformType {
    Sampler,
    SamplerWithTexture,
    Texture,
    StorageImage,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

pub const UNIFORM_TYPE_COUNT: usize = ShaderUniformType::COUNT;

/// One declared binding inside a uniform set (§4.4). `data` is left to the
/// caller to fill with the resource handles appropriate to `kind` (see the
/// table in §4.4): one handle per array slot for `Sampler`/`Texture`-like
/// kinds, handle pairs for `SamplerWithTexture`, and exactly one handle for
/// `UniformBuffer`/`StorageBuffer`.
#[derive(Debug, Clone)]
pub struct ShaderUniform<H> {
    pub kind: ShaderUniformType,
    pub binding: u32,
    pub data: Vec<H>,
}

/// The descriptor-pool bucketing key: a fixed-length count vector over
/// [`ShaderUniformType`], compared element-wise (§4.3 "two sets have the
/// same shape iff their vectors are equal element-wise"). `Ord` gives the
/// total order the pool map needs for its `BTreeMap` key; it carries no
/// meaning beyond grouping equal shapes together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolShapeKey {
    pub counts: [u16; UNIFORM_TYPE_COUNT],
}

impl PoolShapeKey {
    pub const ZERO: PoolShapeKey = PoolShapeKey {
        counts: [0; UNIFORM_TYPE_COUNT],
    };

    pub fn from_uniforms<H>(uniforms: &[ShaderUniform<H>]) -> Self {
        let mut counts = [0u16; UNIFORM_TYPE_COUNT];
        for u in uniforms {
            let idx = u.kind as usize;
            counts[idx] = counts[idx].saturating_add(u.data.len().max(1) as u16);
        }
        PoolShapeKey { counts }
    }

    pub fn count_of(&self, kind: ShaderUniformType) -> u16 {
        self.counts[kind as usize]
    }
}

/// A material's declared scalar/vector parameter kinds (§3 MaterialDefinition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialParamType {
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Color,
    Texture,
}

impl MaterialParamType {
    /// Byte size used by the packing rule in §4.10. Vec3 is sized (and
    /// aligned) as a vec4 "to match typical shader layouts".
    pub fn packed_size(self) -> usize {
        match self {
            MaterialParamType::Int | MaterialParamType::Float => 4,
            MaterialParamType::Vec2 => 8,
            MaterialParamType::Vec3 => 16,
            MaterialParamType::Vec4 | MaterialParamType::Color => 16,
            MaterialParamType::Texture => 0,
        }
    }

    pub fn is_texture(self) -> bool {
        matches!(self, MaterialParamType::Texture)
    }
}

/// One entry in a material definition's declared uniform schema (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialUniformDecl {
    pub name: String,
    pub binding: u32,
    pub ty: MaterialParamType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_key_equal_for_equal_vectors() {
        let a: Vec<ShaderUniform<u32>> = vec![
            ShaderUniform { kind: ShaderUniformType::UniformBuffer, binding: 0, data: vec![1] },
            ShaderUniform { kind: ShaderUniformType::SamplerWithTexture, binding: 1, data: vec![2, 3] },
        ];
        let b: Vec<ShaderUniform<u32>> = vec![
            ShaderUniform { kind: ShaderUniformType::SamplerWithTexture, binding: 1, data: vec![9, 9] },
            ShaderUniform { kind: ShaderUniformType::UniformBuffer, binding: 0, data: vec![7] },
        ];
        assert_eq!(PoolShapeKey::from_uniforms(&a), PoolShapeKey::from_uniforms(&b));
    }

    #[test]
    fn shape_key_differs_on_count() {
        let a: Vec<ShaderUniform<u32>> = vec![ShaderUniform {
            kind: ShaderUniformType::Texture,
            binding: 0,
            data: vec![1],
        }];
        let b: Vec<ShaderUniform<u32>> = vec![ShaderUniform {
            kind: ShaderUniformType::Texture,
            binding: 0,
            data: vec![1, 2],
        }];
        assert_ne!(PoolShapeKey::from_uniforms(&a), PoolShapeKey::from_uniforms(&b));
    }
}
