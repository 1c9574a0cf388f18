//! Low-Level API Seam
//!
//! The resource layer targets one explicit graphics API family: command
//! lists recorded against per-frame allocators, root signatures with root
//! descriptors and descriptor tables, explicit resource-state transitions,
//! committed resources in default or upload heaps, and fences for CPU/GPU
//! synchronization.
//!
//! [`Device`], [`CommandList`] and [`Fence`] express exactly the primitives
//! the layer consumes. Every object the device hands out is an opaque `Raw*`
//! handle; descriptors are plain data. The [`headless`] backend implements
//! the whole seam in memory.
//!
//! ```text
//!  Context ──► Device ──────────► swap chain, heaps, resources, pipelines
//!     │           │
//!     │           └─ execute / signal / present
//!     └──► CommandList ─────────► barriers, root bindings, draws, copies
//! ```

pub mod headless;

use std::ptr::NonNull;

use raw_window_handle::RawWindowHandle;
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure reported by a low-level API call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    #[error("no compatible adapter found")]
    NoAdapter,

    #[error("device removed or lost")]
    DeviceLost,

    #[error("out of device memory")]
    OutOfMemory,

    #[error("invalid call: {0}")]
    InvalidCall(String),

    #[error("pipeline compilation failed: {0}")]
    CompilationFailed(String),
}

pub type HalResult<T> = std::result::Result<T, HalError>;

// ─── Raw Handles ─────────────────────────────────────────────────────────────

macro_rules! raw_handle {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);
        )*
    };
}

raw_handle! {
    /// A committed buffer or texture.
    RawResource,
    RawDescriptorHeap,
    RawCommandAllocator,
    RawSwapChain,
    RawRootSignature,
    /// A compiled graphics pipeline state object.
    RawPipeline,
}

/// CPU-side descriptor address, used when writing views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CpuDescriptor(pub u64);

/// GPU-side descriptor address, used when binding descriptor tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct GpuDescriptor(pub u64);

impl CpuDescriptor {
    #[inline]
    #[must_use]
    pub const fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }
}

impl GpuDescriptor {
    #[inline]
    #[must_use]
    pub const fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }

    /// Offsets by a precomputed byte distance (`index * increment`).
    #[inline]
    #[must_use]
    pub const fn offset_bytes(self, bytes: u32) -> Self {
        Self(self.0 + bytes as u64)
    }
}

// ─── Resource Descriptions ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// GPU-local memory, filled through copies.
    Default,
    /// Host-visible memory, mappable for CPU writes.
    Upload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    CbvSrvUav,
    Sampler,
    RenderTarget,
    DepthStencil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorHeapDesc {
    pub kind: DescriptorHeapKind,
    pub count: u32,
    pub shader_visible: bool,
}

/// Resource usage state for transition barriers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    CopyDest,
    CopySource,
    GenericRead,
    PixelShaderResource,
    Present,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceDimension {
    Buffer,
    Texture2D,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceDesc {
    pub dimension: ResourceDimension,
    /// Byte size for buffers, pixel width for textures.
    pub width: u64,
    pub height: u32,
    pub mip_levels: u32,
    pub format: Option<wgpu::TextureFormat>,
}

impl ResourceDesc {
    #[must_use]
    pub const fn buffer(size: u64) -> Self {
        Self {
            dimension: ResourceDimension::Buffer,
            width: size,
            height: 1,
            mip_levels: 1,
            format: None,
        }
    }

    #[must_use]
    pub const fn texture_2d(
        width: u32,
        height: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            dimension: ResourceDimension::Texture2D,
            width: width as u64,
            height,
            mip_levels,
            format: Some(format),
        }
    }
}

/// Transition of one subresource (or all, when `subresource` is `None`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionBarrier {
    pub resource: RawResource,
    pub subresource: Option<u32>,
    pub before: ResourceState,
    pub after: ResourceState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    pub format: wgpu::TextureFormat,
    pub mip_levels: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: wgpu::FilterMode,
    pub mag_filter: wgpu::FilterMode,
    pub mip_filter: wgpu::FilterMode,
    pub address_u: wgpu::AddressMode,
    pub address_v: wgpu::AddressMode,
    pub max_lod: f32,
    pub max_anisotropy: u32,
}

// ─── Root Signature ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Pixel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorRangeKind {
    ShaderResourceView,
    Sampler,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RootParameter {
    /// Root constant-buffer view, bound by GPU virtual address.
    ConstantBufferView {
        shader_register: u32,
        register_space: u32,
        visibility: ShaderVisibility,
    },
    /// Single-entry descriptor table.
    DescriptorTable {
        range: DescriptorRangeKind,
        shader_register: u32,
        register_space: u32,
        visibility: ShaderVisibility,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RootSignatureDesc {
    pub parameters: Vec<RootParameter>,
    pub allow_input_layout: bool,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub semantic_index: u32,
    pub format: wgpu::VertexFormat,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
    pub step_mode: wgpu::VertexStepMode,
}

impl InputElement {
    /// Every stream binds through the generic `TEXCOORD` semantic; the
    /// semantic index carries the shader location.
    pub const SEMANTIC: &'static str = "TEXCOORD";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TopologyType {
    Point,
    Line,
    Triangle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterizerDesc {
    pub cull_mode: Option<wgpu::Face>,
    pub front_face: wgpu::FrontFace,
    pub depth_bias_enabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendDesc {
    pub blend: Option<wgpu::BlendState>,
    pub write_mask: wgpu::ColorWrites,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub stencil_enabled: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: wgpu::StencilFaceState,
    pub back: wgpu::StencilFaceState,
}

#[derive(Clone, Copy, Debug)]
pub struct GraphicsPipelineDesc<'a> {
    pub root_signature: RawRootSignature,
    pub vertex_shader: &'a [u8],
    pub fragment_shader: &'a [u8],
    pub input_layout: &'a [InputElement],
    pub rasterizer: RasterizerDesc,
    pub blend: BlendDesc,
    pub depth_stencil: DepthStencilDesc,
    pub topology_type: TopologyType,
    pub render_target_format: wgpu::TextureFormat,
    pub sample_count: u32,
}

// ─── Command Data ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub stride_in_bytes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer_location: u64,
    pub size_in_bytes: u32,
    pub format: wgpu::IndexFormat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Copy of a pitched buffer footprint into a region of one texture mip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureRegionCopy {
    pub dst: RawResource,
    pub mip_level: u32,
    pub dst_x: u32,
    pub dst_y: u32,
    pub src: RawResource,
    pub src_offset: u64,
    pub row_pitch: u32,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

// ─── Presentation ────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct SwapChainDesc {
    pub window: RawWindowHandle,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub buffer_count: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub dedicated_video_memory: u64,
}

// ─── Mapped Memory ───────────────────────────────────────────────────────────

/// CPU view of a persistently mapped upload resource.
///
/// The mapping stays valid until the resource it came from is released.
pub struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain host memory; exclusive access is guaranteed by
// `&mut self` on every write path.
unsafe impl Send for MappedMemory {}

impl MappedMemory {
    /// Wraps a mapped pointer returned by the device.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// backing resource is released, and must not be written through any
    /// other path while this value is alive.
    #[must_use]
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, len })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: upheld by the `from_raw_parts` contract.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: upheld by the `from_raw_parts` contract.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// CPU/GPU synchronization primitive.
pub trait Fence {
    /// Highest value the GPU has reached.
    fn completed_value(&self) -> u64;

    /// Blocks the calling thread until `completed_value() >= value`.
    fn wait_for(&self, value: u64) -> HalResult<()>;
}

/// Recorder for GPU commands. Recording calls are infallible; errors surface
/// on `close` or at submission.
pub trait CommandList {
    fn reset(&mut self, allocator: RawCommandAllocator) -> HalResult<()>;
    fn close(&mut self) -> HalResult<()>;

    fn set_descriptor_heaps(&mut self, heaps: &[RawDescriptorHeap]);
    fn resource_barrier(&mut self, barrier: &TransitionBarrier);

    fn set_render_target(&mut self, rtv: CpuDescriptor);
    fn clear_render_target_view(&mut self, rtv: CpuDescriptor, color: [f32; 4]);
    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor_rect(&mut self, rect: &ScissorRect);

    fn set_graphics_root_signature(&mut self, root_signature: RawRootSignature);
    fn set_pipeline_state(&mut self, pipeline: RawPipeline);
    fn set_primitive_topology(&mut self, topology: wgpu::PrimitiveTopology);
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);
    fn set_index_buffer(&mut self, view: &IndexBufferView);
    fn set_graphics_root_constant_buffer_view(&mut self, root_index: u32, address: u64);
    fn set_graphics_root_descriptor_table(&mut self, root_index: u32, base: GpuDescriptor);

    fn copy_buffer_region(
        &mut self,
        dst: RawResource,
        dst_offset: u64,
        src: RawResource,
        src_offset: u64,
        size: u64,
    );
    fn copy_texture_region(&mut self, copy: &TextureRegionCopy);

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    );
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );
}

/// Device, direct queue and swap chain of one adapter.
pub trait Device {
    type CommandList: CommandList;
    type Fence: Fence;

    fn adapter_info(&self) -> AdapterInfo;

    // ---- Presentation ----
    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> HalResult<RawSwapChain>;
    fn swap_chain_buffer(&mut self, swap_chain: RawSwapChain, index: u32)
    -> HalResult<RawResource>;
    /// Back buffer the next frame renders into. Not necessarily round-robin.
    fn current_back_buffer_index(&self, swap_chain: RawSwapChain) -> u32;
    fn present(&mut self, swap_chain: RawSwapChain) -> HalResult<()>;
    /// Releases the swap chain together with its back buffers.
    fn release_swap_chain(&mut self, swap_chain: RawSwapChain);

    // ---- Recording & submission ----
    fn create_command_allocator(&mut self) -> HalResult<RawCommandAllocator>;
    fn reset_command_allocator(&mut self, allocator: RawCommandAllocator) -> HalResult<()>;
    fn release_command_allocator(&mut self, allocator: RawCommandAllocator);
    /// Creates a command list in the closed state.
    fn create_command_list(
        &mut self,
        allocator: RawCommandAllocator,
    ) -> HalResult<Self::CommandList>;
    fn execute(&mut self, list: &Self::CommandList) -> HalResult<()>;
    fn create_fence(&mut self, initial_value: u64) -> HalResult<Self::Fence>;
    fn signal(&mut self, fence: &Self::Fence, value: u64) -> HalResult<()>;

    // ---- Descriptors ----
    fn create_descriptor_heap(&mut self, desc: &DescriptorHeapDesc)
    -> HalResult<RawDescriptorHeap>;
    fn release_descriptor_heap(&mut self, heap: RawDescriptorHeap);
    fn descriptor_increment_size(&self, kind: DescriptorHeapKind) -> u32;
    fn cpu_descriptor_start(&self, heap: RawDescriptorHeap) -> CpuDescriptor;
    fn gpu_descriptor_start(&self, heap: RawDescriptorHeap) -> GpuDescriptor;
    fn create_render_target_view(&mut self, resource: RawResource, dest: CpuDescriptor);
    fn create_shader_resource_view(
        &mut self,
        resource: RawResource,
        desc: &ShaderResourceViewDesc,
        dest: CpuDescriptor,
    );
    fn create_sampler(&mut self, desc: &SamplerDesc, dest: CpuDescriptor);

    // ---- Resources ----
    fn create_committed_resource(
        &mut self,
        desc: &ResourceDesc,
        heap: HeapType,
        initial_state: ResourceState,
    ) -> HalResult<RawResource>;
    fn gpu_virtual_address(&self, resource: RawResource) -> u64;
    fn map(&mut self, resource: RawResource) -> HalResult<MappedMemory>;
    fn set_name(&mut self, resource: RawResource, name: &str);
    fn release_resource(&mut self, resource: RawResource);

    // ---- Pipelines ----
    fn create_root_signature(&mut self, desc: &RootSignatureDesc)
    -> HalResult<RawRootSignature>;
    fn release_root_signature(&mut self, root_signature: RawRootSignature);
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc<'_>)
    -> HalResult<RawPipeline>;
    fn release_pipeline(&mut self, pipeline: RawPipeline);
}
