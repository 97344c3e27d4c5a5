use ash::vk;

/// A binary GPU→CPU sync primitive, created signaled (§3 "Fences are
/// created signaled").
pub struct Fence {
    pub raw: vk::Fence,
}

/// A binary GPU→GPU sync primitive.
pub struct Semaphore {
    pub raw: vk::Semaphore,
}
