//! GPU memory allocation (C1 "memory allocator, small-alloc pools"). Below
//! `small_allocation_threshold` bytes, allocations are sub-allocated out of
//! a per-memory-type arena (§4.1 "Small allocations ... are routed to
//! per-memory-type sub-pools so that many tiny buffers/images do not
//! exhaust the driver's allocation count limit"); larger requests get a
//! dedicated `vkAllocateMemory` call.
//!
//! This is a linear bump sub-allocator, not a general free-list allocator:
//! small allocations in this engine are short-lived staging buffers and
//! uniform buffers sized once at creation, so reclaiming individual
//! sub-allocations inside a block is not required — freeing drops the
//! whole block's refcount instead. A block is freed once every
//! sub-allocation carved from it has been freed.

use std::collections::HashMap;

use ash::vk;

use crate::error::{BackendError, Result};

const ARENA_BLOCK_SIZE: vk::DeviceSize = 8 * 1024 * 1024;

pub struct DeviceMemory {
    pub memory: vk::DeviceMemory,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
    pub mapped_ptr: Option<*mut u8>,
    /// `None` for a dedicated allocation; `Some(block_id)` for a
    /// sub-allocation, used to drop the arena block's refcount on free.
    block: Option<(u32, u32)>,
}

unsafe impl Send for DeviceMemory {}
unsafe impl Sync for DeviceMemory {}

struct ArenaBlock {
    memory: vk::DeviceMemory,
    cursor: vk::DeviceSize,
    live_allocations: u32,
    mapped_ptr: Option<*mut u8>,
}

#[derive(Default)]
struct Arena {
    blocks: Vec<ArenaBlock>,
}

pub struct Allocator {
    small_allocation_threshold: vk::DeviceSize,
    arenas: HashMap<u32, Arena>,
    next_block_id: u32,
    block_ids: HashMap<(u32, usize), u32>,
}

impl Allocator {
    pub fn new(small_allocation_threshold: u64) -> Allocator {
        Allocator {
            small_allocation_threshold,
            arenas: HashMap::new(),
            next_block_id: 0,
            block_ids: HashMap::new(),
        }
    }

    fn find_memory_type(
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        type_bits: u32,
        required_flags: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        (0..memory_properties.memory_type_count).find(|&i| {
            let type_supported = (type_bits & (1 << i)) != 0;
            let flags_supported = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(required_flags);
            type_supported && flags_supported
        })
    }

    pub fn allocate(
        &mut self,
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        cpu_visible: bool,
        needs_device_address: bool,
        map: bool,
    ) -> Result<DeviceMemory> {
        let required_flags = if cpu_visible {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };
        let memory_type_index =
            Self::find_memory_type(memory_properties, requirements.memory_type_bits, required_flags)
                .ok_or_else(|| BackendError::AllocationFailed("no compatible memory type".into()))?;

        if requirements.size <= self.small_allocation_threshold && !needs_device_address {
            return self.allocate_small(device, memory_type_index, requirements, map);
        }
        self.allocate_dedicated(device, memory_type_index, requirements.size, needs_device_address, map)
    }

    fn allocate_dedicated(
        &mut self,
        device: &ash::Device,
        memory_type_index: u32,
        size: vk::DeviceSize,
        needs_device_address: bool,
        map: bool,
    ) -> Result<DeviceMemory> {
        let mut flags_info =
            vk::MemoryAllocateFlagsInfo::default().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        if needs_device_address {
            info = info.push_next(&mut flags_info);
        }
        let memory = unsafe { device.allocate_memory(&info, None) }
            .map_err(|e| BackendError::vk("vkAllocateMemory", e))?;
        let mapped_ptr = if map {
            Some(unsafe { device.map_memory(memory, 0, size, vk::MemoryMapFlags::empty()) }
                .map_err(|e| BackendError::vk("vkMapMemory", e))? as *mut u8)
        } else {
            None
        };
        Ok(DeviceMemory { memory, offset: 0, size, mapped_ptr, block: None })
    }

    fn allocate_small(
        &mut self,
        device: &ash::Device,
        memory_type_index: u32,
        requirements: vk::MemoryRequirements,
        map: bool,
    ) -> Result<DeviceMemory> {
        let arena = self.arenas.entry(memory_type_index).or_default();
        let alignment = requirements.alignment.max(1);

        for (i, block) in arena.blocks.iter_mut().enumerate() {
            let aligned = block.cursor.div_ceil(alignment) * alignment;
            if aligned + requirements.size <= ARENA_BLOCK_SIZE {
                block.cursor = aligned + requirements.size;
                block.live_allocations += 1;
                let block_id = *self.block_ids.get(&(memory_type_index, i)).unwrap();
                return Ok(DeviceMemory {
                    memory: block.memory,
                    offset: aligned,
                    size: requirements.size,
                    mapped_ptr: block.mapped_ptr.map(|p| unsafe { p.add(aligned as usize) }),
                    block: Some((memory_type_index, block_id)),
                });
            }
        }

        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(ARENA_BLOCK_SIZE)
            .memory_type_index(memory_type_index);
        let memory = unsafe { device.allocate_memory(&info, None) }
            .map_err(|e| BackendError::vk("vkAllocateMemory (arena block)", e))?;
        let mapped_ptr = if map {
            Some(
                unsafe { device.map_memory(memory, 0, ARENA_BLOCK_SIZE, vk::MemoryMapFlags::empty()) }
                    .map_err(|e| BackendError::vk("vkMapMemory (arena block)", e))? as *mut u8,
            )
        } else {
            None
        };

        let block_id = self.next_block_id;
        self.next_block_id += 1;
        let index = arena.blocks.len();
        arena.blocks.push(ArenaBlock {
            memory,
            cursor: requirements.size,
            live_allocations: 1,
            mapped_ptr,
        });
        self.block_ids.insert((memory_type_index, index), block_id);

        Ok(DeviceMemory {
            memory,
            offset: 0,
            size: requirements.size,
            mapped_ptr,
            block: Some((memory_type_index, block_id)),
        })
    }

    pub fn free(&mut self, device: &ash::Device, allocation: DeviceMemory) {
        match allocation.block {
            None => unsafe { device.free_memory(allocation.memory, None) },
            Some((memory_type_index, block_id)) => {
                if let Some(arena) = self.arenas.get_mut(&memory_type_index) {
                    if let Some(index) = self
                        .block_ids
                        .iter()
                        .find(|(k, v)| k.0 == memory_type_index && **v == block_id)
                        .map(|(k, _)| k.1)
                    {
                        if let Some(block) = arena.blocks.get_mut(index) {
                            block.live_allocations = block.live_allocations.saturating_sub(1);
                            if block.live_allocations == 0 {
                                unsafe { device.free_memory(block.memory, None) };
                                arena.blocks.remove(index);
                                self.block_ids.retain(|k, _| *k != (memory_type_index, index));
                            }
                        }
                    }
                }
            }
        }
    }
}
