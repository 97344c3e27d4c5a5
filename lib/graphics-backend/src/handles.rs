//! Opaque typed resource handles over a generational slot map (§3, §9
//! "Opaque handles"). One slot map per resource kind rather than one
//! paged variant-cell allocator shared across kinds — the source's single
//! "cell size = max of all struct sizes" pool buys memory compactness we
//! don't need in a managed language; a slot map per kind keeps each arena
//! densely packed with its own struct and still returns O(1) indices.

use std::marker::PhantomData;

/// Raw index/generation pair. Using a stale pair is caught cheaply by the
/// generation check rather than being undefined behavior; a true
/// use-after-free across a fence-wait boundary remains the caller's
/// contract (§3 "using a handle after free is undefined").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle {
    pub index: u32,
    pub generation: u32,
}

/// A handle to a `T` stored in a [`SlotMap<T>`]. Zero-sized beyond the raw
/// index/generation pair; `Kind` only exists to keep e.g. a `Handle<Buffer>`
/// from being accepted where a `Handle<Image>` is expected.
pub struct Handle<Kind> {
    pub(crate) raw: RawHandle,
    _marker: PhantomData<fn() -> Kind>,
}

impl<Kind> Handle<Kind> {
    fn new(raw: RawHandle) -> Self {
        Handle { raw, _marker: PhantomData }
    }
}

impl<Kind> Clone for Handle<Kind> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<Kind> Copy for Handle<Kind> {}
impl<Kind> PartialEq for Handle<Kind> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<Kind> Eq for Handle<Kind> {}
impl<Kind> std::hash::Hash for Handle<Kind> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state)
    }
}
impl<Kind> std::fmt::Debug for Handle<Kind> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}, gen {})", self.raw.index, self.raw.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A generational arena. `create` returns a handle valid until the matching
/// `free`; `get`/`get_mut` return `None` for a stale or freed handle.
pub struct SlotMap<T, Kind> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    _marker: PhantomData<fn() -> Kind>,
}

impl<T, Kind> Default for SlotMap<T, Kind> {
    fn default() -> Self {
        SlotMap { slots: Vec::new(), free_list: Vec::new(), _marker: PhantomData }
    }
}

impl<T, Kind> SlotMap<T, Kind> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: T) -> Handle<Kind> {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(RawHandle { index, generation: slot.generation });
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, value: Some(value) });
        Handle::new(RawHandle { index, generation: 0 })
    }

    pub fn remove(&mut self, handle: Handle<Kind>) -> Option<T> {
        let slot = self.slots.get_mut(handle.raw.index as usize)?;
        if slot.generation != handle.raw.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.raw.index);
        Some(value)
    }

    pub fn get(&self, handle: Handle<Kind>) -> Option<&T> {
        let slot = self.slots.get(handle.raw.index as usize)?;
        if slot.generation != handle.raw.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<Kind>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.raw.index as usize)?;
        if slot.generation != handle.raw.generation {
            return None;
        }
        slot.value.as_mut()
    }

    pub fn contains(&self, handle: Handle<Kind>) -> bool {
        self.get(handle).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<Kind>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value.as_ref().map(|v| {
                (Handle::new(RawHandle { index: i as u32, generation: slot.generation }), v)
            })
        })
    }
}

pub struct BufferKind;
pub struct ImageKind;
pub struct SamplerKind;
pub struct ShaderKind;
pub struct PipelineKind;
pub struct UniformSetKind;
pub struct FenceKind;
pub struct SemaphoreKind;
pub struct CommandPoolKind;
pub struct CommandBufferKind;
pub struct SwapchainKind;
pub struct RenderPassKind;
pub struct FrameBufferKind;

pub type BufferHandle = Handle<BufferKind>;
pub type ImageHandle = Handle<ImageKind>;
pub type SamplerHandle = Handle<SamplerKind>;
pub type ShaderHandle = Handle<ShaderKind>;
pub type PipelineHandle = Handle<PipelineKind>;
pub type UniformSetHandle = Handle<UniformSetKind>;
pub type FenceHandle = Handle<FenceKind>;
pub type SemaphoreHandle = Handle<SemaphoreKind>;
pub type CommandPoolHandle = Handle<CommandPoolKind>;
pub type CommandBufferHandle = Handle<CommandBufferKind>;
pub type SwapchainHandle = Handle<SwapchainKind>;
pub type RenderPassHandle = Handle<RenderPassKind>;
pub type FrameBufferHandle = Handle<FrameBufferKind>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn insert_get_remove() {
        let mut map: SlotMap<u32, Marker> = SlotMap::new();
        let h = map.insert(42);
        assert_eq!(map.get(h), Some(&42));
        assert_eq!(map.remove(h), Some(42));
        assert_eq!(map.get(h), None);
    }

    #[test]
    fn stale_handle_after_reuse_is_rejected() {
        let mut map: SlotMap<u32, Marker> = SlotMap::new();
        let h1 = map.insert(1);
        map.remove(h1);
        let h2 = map.insert(2);
        assert_eq!(h1.raw.index, h2.raw.index);
        assert_ne!(h1.raw.generation, h2.raw.generation);
        assert_eq!(map.get(h1), None);
        assert_eq!(map.get(h2), Some(&2));
    }
}
