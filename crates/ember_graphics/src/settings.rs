//! Context Settings
//!
//! [`ContextParams`] configures a [`Context`](crate::Context) at creation
//! time. Every field has a sensible default; override only what you need:
//!
//! ```rust,ignore
//! use ember_graphics::{ContextParams, ScratchSettings};
//!
//! let params = ContextParams {
//!     frames_in_flight: 3,
//!     verify_graphics_calls: false,
//!     scratch: ScratchSettings {
//!         max_block_size: 8192,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```
//!
//! # Scratch Layout
//!
//! The scratch allocator keeps one pool per block-size bucket. With the
//! defaults that is 16 pools:
//!
//! | Pool | Block size | Blocks per pool (64 KiB) |
//! |------|------------|--------------------------|
//! | 0    | 256 B      | 256                      |
//! | 1    | 512 B      | 128                      |
//! | …    | …          | …                        |
//! | 15   | 4096 B     | 16                       |

use crate::types::TextureFilter;

/// Upper bound on frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Uniform-buffer placement alignment of the target API.
pub const CONSTANT_BUFFER_ALIGNMENT: u32 = 256;

// ---------------------------------------------------------------------------
// ScratchSettings
// ---------------------------------------------------------------------------

/// Sizing of the per-frame scratch pools.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScratchSettings {
    /// Block size of the smallest bucket; each further bucket adds one step.
    pub block_step_size: u32,
    /// Block size of the largest bucket.
    pub max_block_size: u32,
    /// Descriptor slots in each pool's heap.
    pub descriptors_per_pool: u32,
    /// Bytes of mapped upload memory per pool.
    pub pool_memory_size: u32,
}

impl Default for ScratchSettings {
    fn default() -> Self {
        Self {
            block_step_size: 256,
            max_block_size: 4096,
            descriptors_per_pool: 512,
            pool_memory_size: 64 * 1024,
        }
    }
}

impl ScratchSettings {
    #[inline]
    #[must_use]
    pub fn pool_count(&self) -> usize {
        (self.max_block_size / self.block_step_size) as usize
    }
}

// ---------------------------------------------------------------------------
// ContextParams
// ---------------------------------------------------------------------------

/// Creation parameters for a graphics context.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextParams {
    /// Back-buffer width; `0` uses the window's width.
    pub width: u32,
    /// Back-buffer height; `0` uses the window's height.
    pub height: u32,
    /// Number of frame slots (swap-chain buffers), `1..=3`.
    pub frames_in_flight: u32,
    /// Trap on any failing device call inside the frame loop.
    pub verify_graphics_calls: bool,
    /// Log adapter details at creation.
    pub print_device_info: bool,
    pub default_texture_min_filter: TextureFilter,
    pub default_texture_mag_filter: TextureFilter,
    pub back_buffer_format: wgpu::TextureFormat,
    /// Capacity of the global sampler heap.
    pub sampler_pool_capacity: u32,
    pub scratch: ScratchSettings,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            frames_in_flight: 2,
            verify_graphics_calls: true,
            print_device_info: false,
            default_texture_min_filter: TextureFilter::Linear,
            default_texture_mag_filter: TextureFilter::Linear,
            back_buffer_format: wgpu::TextureFormat::Rgba8Unorm,
            sampler_pool_capacity: 128,
            scratch: ScratchSettings::default(),
        }
    }
}

impl ContextParams {
    /// Checks that the settings describe a buildable context.
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            ));
        }
        let scratch = &self.scratch;
        if scratch.block_step_size == 0
            || scratch.block_step_size % CONSTANT_BUFFER_ALIGNMENT != 0
        {
            return Err(format!(
                "scratch block step must be a non-zero multiple of {CONSTANT_BUFFER_ALIGNMENT}, got {}",
                scratch.block_step_size
            ));
        }
        if scratch.max_block_size < scratch.block_step_size
            || scratch.max_block_size % scratch.block_step_size != 0
        {
            return Err(format!(
                "scratch max block size {} is not a multiple of the step {}",
                scratch.max_block_size, scratch.block_step_size
            ));
        }
        if scratch.pool_memory_size < scratch.max_block_size {
            return Err(format!(
                "scratch pool memory ({} bytes) cannot hold one block of {} bytes",
                scratch.pool_memory_size, scratch.max_block_size
            ));
        }
        if scratch.descriptors_per_pool == 0 || self.sampler_pool_capacity == 0 {
            return Err("descriptor capacities must be non-zero".to_owned());
        }
        Ok(())
    }
}
