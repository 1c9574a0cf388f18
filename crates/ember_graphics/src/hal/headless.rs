//! Headless Backend
//!
//! A complete in-memory implementation of the [`Device`] seam. Nothing is
//! rendered; instead every device call is logged as a [`DeviceEvent`] and
//! every executed command list as a list of [`Command`]s, so frame-loop
//! behaviour can be asserted exactly.
//!
//! Buffers own real host memory: upload-heap buffers can be mapped, and
//! executed `copy_buffer_region` commands move bytes into default-heap
//! buffers, which makes upload paths observable through
//! [`HeadlessController::buffer_contents`].
//!
//! Fences complete on signal by default. With
//! [`HeadlessConfig::auto_complete_fences`] off, a test drives completion via
//! [`HeadlessFence::complete`] (possibly from another thread) to simulate a
//! GPU that lags behind the CPU.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use raw_window_handle::{RawWindowHandle, WebWindowHandle};
use rustc_hash::FxHashMap;

use super::{
    AdapterInfo, CommandList, CpuDescriptor, DescriptorHeapDesc, DescriptorHeapKind, Device,
    Fence, GpuDescriptor, GraphicsPipelineDesc, HalError, HalResult, HeapType, IndexBufferView,
    InputElement, MappedMemory, RawCommandAllocator, RawDescriptorHeap, RawPipeline, RawResource,
    RawRootSignature, RawSwapChain, ResourceDesc, ResourceDimension, ResourceState,
    RootSignatureDesc, SamplerDesc, ScissorRect, ShaderResourceViewDesc, SwapChainDesc,
    TextureRegionCopy, TransitionBarrier, VertexBufferView, Viewport,
};
use crate::window::WindowSurface;

/// Byte distance between consecutive descriptors, per heap kind.
const CBV_SRV_UAV_INCREMENT: u32 = 32;
const SAMPLER_INCREMENT: u32 = 32;
const RTV_INCREMENT: u32 = 32;
const DSV_INCREMENT: u32 = 8;

// ─── Recorded Data ───────────────────────────────────────────────────────────

/// One recorded command-list entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetDescriptorHeaps(Vec<RawDescriptorHeap>),
    Barrier(TransitionBarrier),
    SetRenderTarget(CpuDescriptor),
    ClearRenderTarget {
        rtv: CpuDescriptor,
        color: [f32; 4],
    },
    SetViewport(Viewport),
    SetScissorRect(ScissorRect),
    SetRootSignature(RawRootSignature),
    SetPipelineState(RawPipeline),
    SetPrimitiveTopology(wgpu::PrimitiveTopology),
    SetVertexBuffers {
        start_slot: u32,
        views: Vec<VertexBufferView>,
    },
    SetIndexBuffer(IndexBufferView),
    SetRootConstantBufferView {
        root_index: u32,
        address: u64,
    },
    SetRootDescriptorTable {
        root_index: u32,
        base: GpuDescriptor,
    },
    CopyBufferRegion {
        dst: RawResource,
        dst_offset: u64,
        src: RawResource,
        src_offset: u64,
        size: u64,
    },
    CopyTextureRegion(TextureRegionCopy),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    },
}

/// One device-level call.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    CreateResource {
        resource: RawResource,
        desc: ResourceDesc,
        heap: HeapType,
    },
    ReleaseResource(RawResource),
    CreateRenderTargetView {
        resource: RawResource,
        dest: CpuDescriptor,
    },
    CreateShaderResourceView {
        resource: RawResource,
        dest: CpuDescriptor,
    },
    CreateSampler {
        desc: SamplerDesc,
        dest: CpuDescriptor,
    },
    CreateRootSignature(RawRootSignature),
    CreatePipeline {
        pipeline: RawPipeline,
        input_layout: Vec<InputElement>,
    },
    ResetCommandAllocator(RawCommandAllocator),
    Execute {
        command_count: usize,
    },
    Signal {
        fence: u64,
        value: u64,
    },
    Present {
        back_buffer: u32,
    },
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Behaviour switches for [`HeadlessDevice`].
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    /// Fences reach a signalled value immediately.
    pub auto_complete_fences: bool,
    pub adapter_name: String,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            auto_complete_fences: true,
            adapter_name: "Headless Adapter".to_owned(),
        }
    }
}

// ─── Fence ───────────────────────────────────────────────────────────────────

struct FenceValues {
    completed: u64,
    signaled: u64,
}

struct FenceInner {
    id: u64,
    values: Mutex<FenceValues>,
    reached: Condvar,
}

/// Shareable fence. Clones observe the same values.
#[derive(Clone)]
pub struct HeadlessFence {
    inner: Arc<FenceInner>,
}

impl HeadlessFence {
    fn new(id: u64, initial_value: u64) -> Self {
        Self {
            inner: Arc::new(FenceInner {
                id,
                values: Mutex::new(FenceValues {
                    completed: initial_value,
                    signaled: initial_value,
                }),
                reached: Condvar::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Last value queued by `Device::signal`.
    #[must_use]
    pub fn signaled_value(&self) -> u64 {
        self.inner.values.lock().signaled
    }

    /// Marks the GPU as having reached `value` and wakes any waiter.
    pub fn complete(&self, value: u64) {
        let mut values = self.inner.values.lock();
        values.completed = values.completed.max(value);
        self.inner.reached.notify_all();
    }

    /// Completes everything signalled so far.
    pub fn complete_pending(&self) {
        let signaled = self.signaled_value();
        self.complete(signaled);
    }

    fn signal(&self, value: u64, auto_complete: bool) {
        let mut values = self.inner.values.lock();
        values.signaled = value;
        if auto_complete {
            values.completed = values.completed.max(value);
            self.inner.reached.notify_all();
        }
    }
}

impl Fence for HeadlessFence {
    fn completed_value(&self) -> u64 {
        self.inner.values.lock().completed
    }

    fn wait_for(&self, value: u64) -> HalResult<()> {
        let mut values = self.inner.values.lock();
        while values.completed < value {
            self.inner.reached.wait(&mut values);
        }
        Ok(())
    }
}

impl std::fmt::Debug for HeadlessFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.inner.values.lock();
        f.debug_struct("HeadlessFence")
            .field("id", &self.inner.id)
            .field("completed", &values.completed)
            .field("signaled", &values.signaled)
            .finish()
    }
}

// ─── Command List ────────────────────────────────────────────────────────────

/// Command list that stores its commands until executed.
#[derive(Debug, Default)]
pub struct HeadlessCommandList {
    recording: bool,
    allocator: Option<RawCommandAllocator>,
    commands: Vec<Command>,
}

impl HeadlessCommandList {
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn record(&mut self, command: Command) {
        if !self.recording {
            log::warn!("Headless: command recorded on a closed list: {command:?}");
        }
        self.commands.push(command);
    }
}

impl CommandList for HeadlessCommandList {
    fn reset(&mut self, allocator: RawCommandAllocator) -> HalResult<()> {
        if self.recording {
            return Err(HalError::InvalidCall(
                "reset of a command list that is still recording".into(),
            ));
        }
        self.recording = true;
        self.allocator = Some(allocator);
        self.commands.clear();
        Ok(())
    }

    fn close(&mut self) -> HalResult<()> {
        if !self.recording {
            return Err(HalError::InvalidCall(
                "close of a command list that is not recording".into(),
            ));
        }
        self.recording = false;
        Ok(())
    }

    fn set_descriptor_heaps(&mut self, heaps: &[RawDescriptorHeap]) {
        self.record(Command::SetDescriptorHeaps(heaps.to_vec()));
    }

    fn resource_barrier(&mut self, barrier: &TransitionBarrier) {
        self.record(Command::Barrier(*barrier));
    }

    fn set_render_target(&mut self, rtv: CpuDescriptor) {
        self.record(Command::SetRenderTarget(rtv));
    }

    fn clear_render_target_view(&mut self, rtv: CpuDescriptor, color: [f32; 4]) {
        self.record(Command::ClearRenderTarget { rtv, color });
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.record(Command::SetViewport(*viewport));
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.record(Command::SetScissorRect(*rect));
    }

    fn set_graphics_root_signature(&mut self, root_signature: RawRootSignature) {
        self.record(Command::SetRootSignature(root_signature));
    }

    fn set_pipeline_state(&mut self, pipeline: RawPipeline) {
        self.record(Command::SetPipelineState(pipeline));
    }

    fn set_primitive_topology(&mut self, topology: wgpu::PrimitiveTopology) {
        self.record(Command::SetPrimitiveTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.record(Command::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, view: &IndexBufferView) {
        self.record(Command::SetIndexBuffer(*view));
    }

    fn set_graphics_root_constant_buffer_view(&mut self, root_index: u32, address: u64) {
        self.record(Command::SetRootConstantBufferView {
            root_index,
            address,
        });
    }

    fn set_graphics_root_descriptor_table(&mut self, root_index: u32, base: GpuDescriptor) {
        self.record(Command::SetRootDescriptorTable { root_index, base });
    }

    fn copy_buffer_region(
        &mut self,
        dst: RawResource,
        dst_offset: u64,
        src: RawResource,
        src_offset: u64,
        size: u64,
    ) {
        self.record(Command::CopyBufferRegion {
            dst,
            dst_offset,
            src,
            src_offset,
            size,
        });
    }

    fn copy_texture_region(&mut self, copy: &TextureRegionCopy) {
        self.record(Command::CopyTextureRegion(*copy));
    }

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.record(Command::Draw {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.record(Command::DrawIndexed {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        });
    }
}

// ─── Shared State ────────────────────────────────────────────────────────────

struct ResourceEntry {
    desc: ResourceDesc,
    heap: HeapType,
    memory: Box<[u8]>,
    name: String,
}

struct SwapChainEntry {
    buffers: Vec<RawResource>,
    current: u32,
    script: VecDeque<u32>,
}

#[derive(Default)]
struct Shared {
    next_id: u64,
    auto_complete_fences: bool,
    resources: FxHashMap<RawResource, ResourceEntry>,
    released: Vec<RawResource>,
    heaps: FxHashMap<RawDescriptorHeap, DescriptorHeapDesc>,
    swap_chains: FxHashMap<RawSwapChain, SwapChainEntry>,
    root_signatures: FxHashMap<RawRootSignature, RootSignatureDesc>,
    pipelines: Vec<RawPipeline>,
    fences: Vec<HeadlessFence>,
    events: Vec<DeviceEvent>,
    submissions: Vec<Vec<Command>>,
    fail_next_pipeline: Option<String>,
    pending_script: Vec<u32>,
    presents: usize,
}

impl Shared {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn apply_copy(&mut self, dst: RawResource, dst_offset: u64, src: RawResource, src_offset: u64, size: u64) {
        let (src_offset, dst_offset, size) = (src_offset as usize, dst_offset as usize, size as usize);
        let Some(bytes) = self
            .resources
            .get(&src)
            .and_then(|entry| entry.memory.get(src_offset..src_offset + size))
            .map(<[u8]>::to_vec)
        else {
            log::warn!("Headless: copy from invalid source range of {src:?}");
            return;
        };
        match self
            .resources
            .get_mut(&dst)
            .and_then(|entry| entry.memory.get_mut(dst_offset..dst_offset + size))
        {
            Some(target) => target.copy_from_slice(&bytes),
            None => log::warn!("Headless: copy into invalid destination range of {dst:?}"),
        }
    }
}

// ─── Device ──────────────────────────────────────────────────────────────────

/// In-memory device. See the module docs.
pub struct HeadlessDevice {
    shared: Arc<Mutex<Shared>>,
    info: AdapterInfo,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HeadlessConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HeadlessConfig) -> Self {
        let shared = Shared {
            auto_complete_fences: config.auto_complete_fences,
            ..Shared::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            info: AdapterInfo {
                name: config.adapter_name,
                vendor_id: 0,
                device_id: 0,
                dedicated_video_memory: 0,
            },
        }
    }

    /// Inspection handle that stays valid after the device is moved into a
    /// context.
    #[must_use]
    pub fn controller(&self) -> HeadlessController {
        HeadlessController {
            shared: Arc::clone(&self.shared),
        }
    }

    fn increment(kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::CbvSrvUav => CBV_SRV_UAV_INCREMENT,
            DescriptorHeapKind::Sampler => SAMPLER_INCREMENT,
            DescriptorHeapKind::RenderTarget => RTV_INCREMENT,
            DescriptorHeapKind::DepthStencil => DSV_INCREMENT,
        }
    }
}

impl Device for HeadlessDevice {
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;

    fn adapter_info(&self) -> AdapterInfo {
        self.info.clone()
    }

    fn create_swap_chain(&mut self, desc: &SwapChainDesc) -> HalResult<RawSwapChain> {
        if desc.buffer_count == 0 {
            return Err(HalError::InvalidCall("swap chain needs at least one buffer".into()));
        }
        let mut shared = self.shared.lock();
        let mut buffers = Vec::with_capacity(desc.buffer_count as usize);
        for _ in 0..desc.buffer_count {
            let resource = RawResource(shared.allocate_id());
            shared.resources.insert(
                resource,
                ResourceEntry {
                    desc: ResourceDesc::texture_2d(desc.width, desc.height, 1, desc.format),
                    heap: HeapType::Default,
                    memory: Box::default(),
                    name: "SwapChainBuffer".to_owned(),
                },
            );
            buffers.push(resource);
        }

        let mut script: VecDeque<u32> = shared.pending_script.drain(..).collect();
        let current = script.pop_front().unwrap_or(0);
        let swap_chain = RawSwapChain(shared.allocate_id());
        shared.swap_chains.insert(
            swap_chain,
            SwapChainEntry {
                buffers,
                current,
                script,
            },
        );
        Ok(swap_chain)
    }

    fn swap_chain_buffer(
        &mut self,
        swap_chain: RawSwapChain,
        index: u32,
    ) -> HalResult<RawResource> {
        let shared = self.shared.lock();
        shared
            .swap_chains
            .get(&swap_chain)
            .and_then(|entry| entry.buffers.get(index as usize).copied())
            .ok_or_else(|| HalError::InvalidCall(format!("no swap chain buffer {index}")))
    }

    fn current_back_buffer_index(&self, swap_chain: RawSwapChain) -> u32 {
        let shared = self.shared.lock();
        shared
            .swap_chains
            .get(&swap_chain)
            .map_or(0, |entry| entry.current)
    }

    fn present(&mut self, swap_chain: RawSwapChain) -> HalResult<()> {
        let mut shared = self.shared.lock();
        let entry = shared
            .swap_chains
            .get_mut(&swap_chain)
            .ok_or_else(|| HalError::InvalidCall("present on unknown swap chain".into()))?;
        let presented = entry.current;
        let count = entry.buffers.len() as u32;
        entry.current = entry
            .script
            .pop_front()
            .unwrap_or((presented + 1) % count);
        shared.presents += 1;
        shared.events.push(DeviceEvent::Present {
            back_buffer: presented,
        });
        Ok(())
    }

    fn release_swap_chain(&mut self, swap_chain: RawSwapChain) {
        let mut shared = self.shared.lock();
        let Some(entry) = shared.swap_chains.remove(&swap_chain) else {
            return;
        };
        for buffer in entry.buffers {
            shared.resources.remove(&buffer);
        }
    }

    fn create_command_allocator(&mut self) -> HalResult<RawCommandAllocator> {
        Ok(RawCommandAllocator(self.shared.lock().allocate_id()))
    }

    fn reset_command_allocator(&mut self, allocator: RawCommandAllocator) -> HalResult<()> {
        self.shared
            .lock()
            .events
            .push(DeviceEvent::ResetCommandAllocator(allocator));
        Ok(())
    }

    fn release_command_allocator(&mut self, _allocator: RawCommandAllocator) {}

    fn create_command_list(
        &mut self,
        allocator: RawCommandAllocator,
    ) -> HalResult<Self::CommandList> {
        Ok(HeadlessCommandList {
            recording: false,
            allocator: Some(allocator),
            commands: Vec::new(),
        })
    }

    fn execute(&mut self, list: &Self::CommandList) -> HalResult<()> {
        if list.recording {
            return Err(HalError::InvalidCall(
                "execute of a command list that is still recording".into(),
            ));
        }
        let mut shared = self.shared.lock();
        for command in &list.commands {
            if let Command::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } = *command
            {
                shared.apply_copy(dst, dst_offset, src, src_offset, size);
            }
        }
        shared.events.push(DeviceEvent::Execute {
            command_count: list.commands.len(),
        });
        shared.submissions.push(list.commands.clone());
        Ok(())
    }

    fn create_fence(&mut self, initial_value: u64) -> HalResult<Self::Fence> {
        let mut shared = self.shared.lock();
        let fence = HeadlessFence::new(shared.allocate_id(), initial_value);
        shared.fences.push(fence.clone());
        Ok(fence)
    }

    fn signal(&mut self, fence: &Self::Fence, value: u64) -> HalResult<()> {
        let mut shared = self.shared.lock();
        fence.signal(value, shared.auto_complete_fences);
        shared.events.push(DeviceEvent::Signal {
            fence: fence.id(),
            value,
        });
        Ok(())
    }

    fn create_descriptor_heap(
        &mut self,
        desc: &DescriptorHeapDesc,
    ) -> HalResult<RawDescriptorHeap> {
        if desc.count == 0 {
            return Err(HalError::InvalidCall("empty descriptor heap".into()));
        }
        let mut shared = self.shared.lock();
        let heap = RawDescriptorHeap(shared.allocate_id());
        shared.heaps.insert(heap, *desc);
        Ok(heap)
    }

    fn release_descriptor_heap(&mut self, heap: RawDescriptorHeap) {
        self.shared.lock().heaps.remove(&heap);
    }

    fn descriptor_increment_size(&self, kind: DescriptorHeapKind) -> u32 {
        Self::increment(kind)
    }

    fn cpu_descriptor_start(&self, heap: RawDescriptorHeap) -> CpuDescriptor {
        CpuDescriptor(heap.0 << 32)
    }

    fn gpu_descriptor_start(&self, heap: RawDescriptorHeap) -> GpuDescriptor {
        GpuDescriptor(heap.0 << 32)
    }

    fn create_render_target_view(&mut self, resource: RawResource, dest: CpuDescriptor) {
        self.shared
            .lock()
            .events
            .push(DeviceEvent::CreateRenderTargetView { resource, dest });
    }

    fn create_shader_resource_view(
        &mut self,
        resource: RawResource,
        _desc: &ShaderResourceViewDesc,
        dest: CpuDescriptor,
    ) {
        self.shared
            .lock()
            .events
            .push(DeviceEvent::CreateShaderResourceView { resource, dest });
    }

    fn create_sampler(&mut self, desc: &SamplerDesc, dest: CpuDescriptor) {
        self.shared
            .lock()
            .events
            .push(DeviceEvent::CreateSampler { desc: *desc, dest });
    }

    fn create_committed_resource(
        &mut self,
        desc: &ResourceDesc,
        heap: HeapType,
        _initial_state: ResourceState,
    ) -> HalResult<RawResource> {
        if desc.width == 0 {
            return Err(HalError::InvalidCall("zero-sized resource".into()));
        }
        let memory = match desc.dimension {
            ResourceDimension::Buffer => vec![0u8; desc.width as usize].into_boxed_slice(),
            ResourceDimension::Texture2D => Box::default(),
        };
        let mut shared = self.shared.lock();
        let resource = RawResource(shared.allocate_id());
        shared.resources.insert(
            resource,
            ResourceEntry {
                desc: *desc,
                heap,
                memory,
                name: String::new(),
            },
        );
        shared.events.push(DeviceEvent::CreateResource {
            resource,
            desc: *desc,
            heap,
        });
        Ok(resource)
    }

    fn gpu_virtual_address(&self, resource: RawResource) -> u64 {
        resource.0 << 32
    }

    fn map(&mut self, resource: RawResource) -> HalResult<MappedMemory> {
        let mut shared = self.shared.lock();
        let entry = shared
            .resources
            .get_mut(&resource)
            .ok_or_else(|| HalError::InvalidCall(format!("map of unknown {resource:?}")))?;
        if entry.heap != HeapType::Upload {
            return Err(HalError::InvalidCall(
                "only upload-heap resources can be mapped".into(),
            ));
        }
        // SAFETY: the boxed slice never moves and lives until `release_resource`.
        unsafe { MappedMemory::from_raw_parts(entry.memory.as_mut_ptr(), entry.memory.len()) }
            .ok_or_else(|| HalError::InvalidCall("map of empty resource".into()))
    }

    fn set_name(&mut self, resource: RawResource, name: &str) {
        if let Some(entry) = self.shared.lock().resources.get_mut(&resource) {
            name.clone_into(&mut entry.name);
        }
    }

    fn release_resource(&mut self, resource: RawResource) {
        let mut shared = self.shared.lock();
        if shared.resources.remove(&resource).is_none() {
            log::warn!("Headless: double release of {resource:?}");
        }
        shared.released.push(resource);
        shared.events.push(DeviceEvent::ReleaseResource(resource));
    }

    fn create_root_signature(
        &mut self,
        desc: &RootSignatureDesc,
    ) -> HalResult<RawRootSignature> {
        let mut shared = self.shared.lock();
        let root_signature = RawRootSignature(shared.allocate_id());
        shared.root_signatures.insert(root_signature, desc.clone());
        shared
            .events
            .push(DeviceEvent::CreateRootSignature(root_signature));
        Ok(root_signature)
    }

    fn release_root_signature(&mut self, root_signature: RawRootSignature) {
        self.shared.lock().root_signatures.remove(&root_signature);
    }

    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> HalResult<RawPipeline> {
        let mut shared = self.shared.lock();
        if let Some(reason) = shared.fail_next_pipeline.take() {
            return Err(HalError::CompilationFailed(reason));
        }
        if !shared.root_signatures.contains_key(&desc.root_signature) {
            return Err(HalError::InvalidCall("pipeline with unknown root signature".into()));
        }
        let pipeline = RawPipeline(shared.allocate_id());
        shared.pipelines.push(pipeline);
        shared.events.push(DeviceEvent::CreatePipeline {
            pipeline,
            input_layout: desc.input_layout.to_vec(),
        });
        Ok(pipeline)
    }

    fn release_pipeline(&mut self, pipeline: RawPipeline) {
        self.shared.lock().pipelines.retain(|p| *p != pipeline);
    }
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Test-side view of a [`HeadlessDevice`].
#[derive(Clone)]
pub struct HeadlessController {
    shared: Arc<Mutex<Shared>>,
}

impl HeadlessController {
    #[must_use]
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.shared.lock().events.clone()
    }

    /// Every executed command list, oldest first.
    #[must_use]
    pub fn submissions(&self) -> Vec<Vec<Command>> {
        self.shared.lock().submissions.clone()
    }

    #[must_use]
    pub fn last_submission(&self) -> Option<Vec<Command>> {
        self.shared.lock().submissions.last().cloned()
    }

    /// Drops recorded events and submissions.
    pub fn clear_log(&self) {
        let mut shared = self.shared.lock();
        shared.events.clear();
        shared.submissions.clear();
    }

    #[must_use]
    pub fn pipelines_created(&self) -> usize {
        self.shared
            .lock()
            .events
            .iter()
            .filter(|e| matches!(e, DeviceEvent::CreatePipeline { .. }))
            .count()
    }

    #[must_use]
    pub fn present_count(&self) -> usize {
        self.shared.lock().presents
    }

    #[must_use]
    pub fn released_resources(&self) -> Vec<RawResource> {
        self.shared.lock().released.clone()
    }

    #[must_use]
    pub fn is_live(&self, resource: RawResource) -> bool {
        self.shared.lock().resources.contains_key(&resource)
    }

    #[must_use]
    pub fn live_resource_count(&self) -> usize {
        self.shared.lock().resources.len()
    }

    #[must_use]
    pub fn buffer_contents(&self, resource: RawResource) -> Option<Vec<u8>> {
        self.shared
            .lock()
            .resources
            .get(&resource)
            .map(|entry| entry.memory.to_vec())
    }

    #[must_use]
    pub fn resource_desc(&self, resource: RawResource) -> Option<ResourceDesc> {
        self.shared.lock().resources.get(&resource).map(|e| e.desc)
    }

    #[must_use]
    pub fn resource_name(&self, resource: RawResource) -> Option<String> {
        self.shared
            .lock()
            .resources
            .get(&resource)
            .map(|e| e.name.clone())
    }

    #[must_use]
    pub fn root_signature(&self, root_signature: RawRootSignature) -> Option<RootSignatureDesc> {
        self.shared
            .lock()
            .root_signatures
            .get(&root_signature)
            .cloned()
    }

    /// Makes the next `create_graphics_pipeline` fail with `reason`.
    pub fn fail_next_pipeline(&self, reason: &str) {
        self.shared.lock().fail_next_pipeline = Some(reason.to_owned());
    }

    /// Sets the order in which back buffers are handed out. The first entry
    /// becomes current immediately (or on swap-chain creation); the rest are
    /// consumed one per present, after which rotation is round-robin.
    pub fn script_back_buffers(&self, order: &[u32]) {
        let mut shared = self.shared.lock();
        if shared.swap_chains.is_empty() {
            shared.pending_script = order.to_vec();
            return;
        }
        for entry in shared.swap_chains.values_mut() {
            let mut script: VecDeque<u32> = order.iter().copied().collect();
            if let Some(first) = script.pop_front() {
                entry.current = first;
            }
            entry.script = script;
        }
    }

    pub fn set_auto_complete_fences(&self, enabled: bool) {
        self.shared.lock().auto_complete_fences = enabled;
    }

    /// Completes every fence up to its last signalled value.
    pub fn complete_all_fences(&self) {
        let fences = self.shared.lock().fences.clone();
        for fence in fences {
            fence.complete_pending();
        }
    }

    /// Splits a descriptor address into its heap and slot index.
    #[must_use]
    pub fn resolve_descriptor(&self, address: u64) -> Option<(RawDescriptorHeap, u32)> {
        let heap = RawDescriptorHeap(address >> 32);
        let shared = self.shared.lock();
        let desc = shared.heaps.get(&heap)?;
        let offset = (address & 0xffff_ffff) as u32;
        Some((heap, offset / HeadlessDevice::increment(desc.kind)))
    }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// Fixed-size window stand-in for headless contexts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessWindow {
    pub width: u32,
    pub height: u32,
    pub open: bool,
}

impl HeadlessWindow {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            open: true,
        }
    }
}

impl WindowSurface for HeadlessWindow {
    fn native_surface_handle(&self) -> Option<RawWindowHandle> {
        self.open
            .then(|| RawWindowHandle::Web(WebWindowHandle::new(1)))
    }

    fn window_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_copy_reaches_default_buffer() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        let dst = device
            .create_committed_resource(&ResourceDesc::buffer(4), HeapType::Default, ResourceState::CopyDest)
            .unwrap();
        let src = device
            .create_committed_resource(&ResourceDesc::buffer(4), HeapType::Upload, ResourceState::GenericRead)
            .unwrap();
        device.map(src).unwrap().as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);

        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(allocator).unwrap();
        list.reset(allocator).unwrap();
        list.copy_buffer_region(dst, 0, src, 0, 4);
        list.close().unwrap();
        device.execute(&list).unwrap();

        assert_eq!(controller.buffer_contents(dst).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_default_heap_cannot_be_mapped() {
        let mut device = HeadlessDevice::new();
        let res = device
            .create_committed_resource(&ResourceDesc::buffer(16), HeapType::Default, ResourceState::Common)
            .unwrap();
        assert!(device.map(res).is_err());
    }

    #[test]
    fn test_command_list_state_checks() {
        let mut device = HeadlessDevice::new();
        let allocator = device.create_command_allocator().unwrap();
        let mut list = device.create_command_list(allocator).unwrap();
        assert!(list.close().is_err());
        list.reset(allocator).unwrap();
        assert!(list.reset(allocator).is_err());
        assert!(device.execute(&list).is_err());
        list.close().unwrap();
        assert!(device.execute(&list).is_ok());
    }

    #[test]
    fn test_manual_fence_completion() {
        let mut device = HeadlessDevice::with_config(HeadlessConfig {
            auto_complete_fences: false,
            ..HeadlessConfig::default()
        });
        let fence = device.create_fence(0).unwrap();
        device.signal(&fence, 3).unwrap();
        assert_eq!(fence.completed_value(), 0);
        assert_eq!(fence.signaled_value(), 3);
        fence.complete_pending();
        assert_eq!(fence.completed_value(), 3);
        fence.wait_for(3).unwrap();
    }

    #[test]
    fn test_scripted_back_buffer_order() {
        let mut device = HeadlessDevice::new();
        let controller = device.controller();
        controller.script_back_buffers(&[2, 0]);
        let sc = device
            .create_swap_chain(&SwapChainDesc {
                window: HeadlessWindow::new(8, 8).native_surface_handle().unwrap(),
                width: 8,
                height: 8,
                format: wgpu::TextureFormat::Rgba8Unorm,
                buffer_count: 3,
            })
            .unwrap();
        assert_eq!(device.current_back_buffer_index(sc), 2);
        device.present(sc).unwrap();
        assert_eq!(device.current_back_buffer_index(sc), 0);
        device.present(sc).unwrap();
        assert_eq!(device.current_back_buffer_index(sc), 1);
    }
}
