//! Scratch Allocator
//!
//! Per-frame bump allocator for transient GPU-visible data: uniform blocks
//! and texture descriptor slots. One pool exists per block-size bucket
//! (`(i + 1) * block_step_size`), each owning
//!
//! - a shader-visible CBV/SRV descriptor heap with a fixed slot count, and
//! - one persistently mapped upload-heap buffer.
//!
//! Both carry a cursor that only moves forward until [`ScratchAllocator::reset`]
//! at the start of the slot's next frame. There is no free list.
//!
//! ```text
//!   pool 0 (256 B)   [blk][blk][blk]|cursor ............ ]
//!   pool 1 (512 B)   [ blk  ][ blk  ]|cursor ........... ]
//!   ...
//! ```
//!
//! Texture descriptors always go into pool 0's heap: only one CBV/SRV heap
//! can be bound per command list and pool 0's is the one bound at the start
//! of every frame.

use crate::error::{GraphicsError, Result};
use crate::hal::{
    CommandList, CpuDescriptor, DescriptorHeapDesc, DescriptorHeapKind, Device, GpuDescriptor,
    HeapType, MappedMemory, RawDescriptorHeap, RawResource, ResourceDesc, ResourceState,
    ShaderResourceViewDesc,
};
use crate::settings::ScratchSettings;

struct ScratchPool {
    block_size: u32,
    descriptor_heap: RawDescriptorHeap,
    cpu_descriptor_start: CpuDescriptor,
    gpu_descriptor_start: GpuDescriptor,
    descriptor_capacity: u32,
    descriptor_cursor: u32,
    memory: RawResource,
    mapped: MappedMemory,
    gpu_address: u64,
    memory_cursor: u32,
}

/// A uniform block placed in scratch memory.
pub struct UniformBlock<'a> {
    /// Mapped bytes of the whole block (the bucket's block size).
    pub data: &'a mut [u8],
    pub gpu_address: u64,
    pub pool: usize,
    pub offset: u32,
}

/// View of a texture as needed for an SRV.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureView {
    pub resource: RawResource,
    pub format: wgpu::TextureFormat,
    pub mip_levels: u32,
}

pub struct ScratchAllocator {
    settings: ScratchSettings,
    pools: Vec<ScratchPool>,
    descriptor_increment: u32,
}

impl ScratchAllocator {
    /// Creates one pool per bucket up to `settings.max_block_size`.
    pub fn new<D: Device>(device: &mut D, settings: &ScratchSettings) -> Result<Self> {
        let descriptor_increment = device.descriptor_increment_size(DescriptorHeapKind::CbvSrvUav);
        let mut pools = Vec::with_capacity(settings.pool_count());

        for i in 0..settings.pool_count() {
            let descriptor_heap = device.create_descriptor_heap(&DescriptorHeapDesc {
                kind: DescriptorHeapKind::CbvSrvUav,
                count: settings.descriptors_per_pool,
                shader_visible: true,
            })?;
            let memory = device.create_committed_resource(
                &ResourceDesc::buffer(u64::from(settings.pool_memory_size)),
                HeapType::Upload,
                ResourceState::GenericRead,
            )?;
            device.set_name(memory, "ScratchPool");
            let mapped = device.map(memory)?;

            pools.push(ScratchPool {
                block_size: (i as u32 + 1) * settings.block_step_size,
                descriptor_heap,
                cpu_descriptor_start: device.cpu_descriptor_start(descriptor_heap),
                gpu_descriptor_start: device.gpu_descriptor_start(descriptor_heap),
                descriptor_capacity: settings.descriptors_per_pool,
                descriptor_cursor: 0,
                memory,
                mapped,
                gpu_address: device.gpu_virtual_address(memory),
                memory_cursor: 0,
            });
        }

        Ok(Self {
            settings: *settings,
            pools,
            descriptor_increment,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Smallest bucket whose block holds `byte_size` bytes.
    #[must_use]
    pub fn pool_index_for(&self, byte_size: u32) -> Option<usize> {
        if byte_size > self.settings.max_block_size {
            return None;
        }
        let index = byte_size.div_ceil(self.settings.block_step_size).saturating_sub(1);
        Some(index as usize)
    }

    #[must_use]
    pub fn block_size(&self, pool: usize) -> u32 {
        self.pools[pool].block_size
    }

    #[must_use]
    pub fn memory_cursor(&self, pool: usize) -> u32 {
        self.pools[pool].memory_cursor
    }

    #[must_use]
    pub fn descriptor_cursor(&self, pool: usize) -> u32 {
        self.pools[pool].descriptor_cursor
    }

    /// The heap bound for descriptor tables this frame (pool 0's).
    #[must_use]
    pub fn descriptor_heap(&self) -> RawDescriptorHeap {
        self.pools[0].descriptor_heap
    }

    // ── Allocation ───────────────────────────────────────────────────────────

    /// Places a uniform block of `byte_size` bytes and binds its address as
    /// root CBV `root_index`. Both cursors of the bucket advance; memory by
    /// the whole block size.
    pub fn allocate_uniform_block<L: CommandList>(
        &mut self,
        list: &mut L,
        root_index: u32,
        byte_size: u32,
    ) -> Result<UniformBlock<'_>> {
        let index = self
            .pool_index_for(byte_size)
            .ok_or(GraphicsError::ScratchBlockTooLarge {
                size: byte_size,
                max: self.settings.max_block_size,
            })?;
        let memory_size = self.settings.pool_memory_size;
        let pool = &mut self.pools[index];

        if pool.memory_cursor + pool.block_size > memory_size {
            return Err(GraphicsError::ScratchExhausted {
                pool: index,
                what: "memory",
            });
        }
        if pool.descriptor_cursor >= pool.descriptor_capacity {
            return Err(GraphicsError::ScratchExhausted {
                pool: index,
                what: "descriptors",
            });
        }

        let offset = pool.memory_cursor;
        let gpu_address = pool.gpu_address + u64::from(offset);
        list.set_graphics_root_constant_buffer_view(root_index, gpu_address);

        pool.memory_cursor += pool.block_size;
        pool.descriptor_cursor += 1;

        let start = offset as usize;
        let end = start + pool.block_size as usize;
        Ok(UniformBlock {
            data: &mut pool.mapped.as_mut_slice()[start..end],
            gpu_address,
            pool: index,
            offset,
        })
    }

    /// Writes an SRV for `texture` into the next slot of pool 0's heap and
    /// binds it, together with the sampler table, as descriptor-table root
    /// parameters.
    pub fn allocate_texture_binding<D: Device>(
        &mut self,
        device: &mut D,
        list: &mut D::CommandList,
        texture: &TextureView,
        texture_root_index: u32,
        sampler: GpuDescriptor,
        sampler_root_index: u32,
    ) -> Result<GpuDescriptor> {
        let increment = self.descriptor_increment;
        let pool = &mut self.pools[0];
        if pool.descriptor_cursor >= pool.descriptor_capacity {
            return Err(GraphicsError::ScratchExhausted {
                pool: 0,
                what: "descriptors",
            });
        }

        let slot = pool.descriptor_cursor;
        device.create_shader_resource_view(
            texture.resource,
            &ShaderResourceViewDesc {
                format: texture.format,
                mip_levels: texture.mip_levels,
            },
            pool.cpu_descriptor_start.offset(slot, increment),
        );
        let table = pool.gpu_descriptor_start.offset(slot, increment);
        pool.descriptor_cursor += 1;

        list.set_graphics_root_descriptor_table(texture_root_index, table);
        list.set_graphics_root_descriptor_table(sampler_root_index, sampler);
        Ok(table)
    }

    /// Rewinds every cursor. Called once per frame before any allocation.
    pub fn reset(&mut self) {
        for pool in &mut self.pools {
            pool.memory_cursor = 0;
            pool.descriptor_cursor = 0;
        }
    }

    /// Releases all pools. The GPU must be idle with respect to this frame.
    pub fn release<D: Device>(self, device: &mut D) {
        for pool in self.pools {
            device.release_descriptor_heap(pool.descriptor_heap);
            device.release_resource(pool.memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::{Command, HeadlessCommandList, HeadlessDevice};

    fn setup() -> (HeadlessDevice, HeadlessCommandList, ScratchAllocator) {
        let mut device = HeadlessDevice::new();
        let scratch = ScratchAllocator::new(&mut device, &ScratchSettings::default()).unwrap();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(allocator).unwrap();
        list.reset(allocator).unwrap();
        (device, list, scratch)
    }

    #[test]
    fn test_bucket_selection() {
        let (_device, _list, scratch) = setup();
        assert_eq!(scratch.pool_count(), 16);
        assert_eq!(scratch.pool_index_for(0), Some(0));
        assert_eq!(scratch.pool_index_for(16), Some(0));
        assert_eq!(scratch.pool_index_for(256), Some(0));
        assert_eq!(scratch.pool_index_for(257), Some(1));
        assert_eq!(scratch.pool_index_for(4096), Some(15));
        assert_eq!(scratch.pool_index_for(4097), None);
        assert_eq!(scratch.block_size(15), 4096);
    }

    #[test]
    fn test_allocations_are_disjoint_and_reset_rewinds() {
        let (_device, mut list, mut scratch) = setup();
        let sizes = [16u32, 64, 300, 16, 1000, 256];

        let first_pass: Vec<(usize, u32)> = sizes
            .iter()
            .map(|&size| {
                let block = scratch.allocate_uniform_block(&mut list, 0, size).unwrap();
                assert!(block.data.len() >= size as usize);
                (block.pool, block.offset)
            })
            .collect();

        for (i, a) in first_pass.iter().enumerate() {
            for b in &first_pass[i + 1..] {
                assert_ne!(a, b, "two allocations share a block");
            }
        }

        scratch.reset();
        let second_pass: Vec<(usize, u32)> = sizes
            .iter()
            .map(|&size| {
                let block = scratch.allocate_uniform_block(&mut list, 0, size).unwrap();
                (block.pool, block.offset)
            })
            .collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_uniform_block_binds_own_pool_address() {
        let (device, mut list, mut scratch) = setup();
        let block = scratch.allocate_uniform_block(&mut list, 3, 300).unwrap();
        let (pool, address) = (block.pool, block.gpu_address);
        assert_eq!(pool, 1);
        assert_eq!(
            address,
            device.gpu_virtual_address(scratch.pools[1].memory)
        );
        assert_eq!(
            list.commands().last(),
            Some(&Command::SetRootConstantBufferView {
                root_index: 3,
                address
            })
        );
        assert_eq!(scratch.memory_cursor(1), 512);
        assert_eq!(scratch.descriptor_cursor(1), 1);
    }

    #[test]
    fn test_oversized_block_is_rejected() {
        let (_device, mut list, mut scratch) = setup();
        assert!(matches!(
            scratch.allocate_uniform_block(&mut list, 0, 5000),
            Err(GraphicsError::ScratchBlockTooLarge { size: 5000, .. })
        ));
    }

    #[test]
    fn test_pool_memory_exhaustion() {
        let (_device, mut list, mut scratch) = setup();
        // 64 KiB / 4096 B = 16 blocks in the largest bucket.
        for _ in 0..16 {
            scratch.allocate_uniform_block(&mut list, 0, 4096).unwrap();
        }
        assert!(matches!(
            scratch.allocate_uniform_block(&mut list, 0, 4096),
            Err(GraphicsError::ScratchExhausted { pool: 15, what: "memory" })
        ));
    }

    #[test]
    fn test_texture_binding_uses_pool_zero() {
        let (mut device, mut list, mut scratch) = setup();
        let view = TextureView {
            resource: RawResource(99),
            format: wgpu::TextureFormat::Rgba8Unorm,
            mip_levels: 1,
        };
        let sampler = GpuDescriptor(0xABC0);

        let first = scratch
            .allocate_texture_binding(&mut device, &mut list, &view, 1, sampler, 2)
            .unwrap();
        let second = scratch
            .allocate_texture_binding(&mut device, &mut list, &view, 1, sampler, 2)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(scratch.descriptor_cursor(0), 2);
        assert_eq!(scratch.memory_cursor(0), 0);
        assert!(list.commands().contains(&Command::SetRootDescriptorTable {
            root_index: 2,
            base: sampler
        }));
    }
}
