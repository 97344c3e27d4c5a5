use ash::vk;
use graphics_types::{ImageFiltering, ImageWrappingMode};

/// A sampler resource (§3 "Sampler").
pub struct Sampler {
    pub raw: vk::Sampler,
    pub min_filter: ImageFiltering,
    pub mag_filter: ImageFiltering,
    pub wrap_u: ImageWrappingMode,
    pub wrap_v: ImageWrappingMode,
}
