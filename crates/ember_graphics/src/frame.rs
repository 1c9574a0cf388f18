//! Frame Controller
//!
//! Drives the per-frame state machine over a ring of [`FrameResource`]s,
//! one per swap-chain buffer:
//!
//! ```text
//!   Idle ──begin_frame──► FrameBegun ──► RenderPassOpen ◄──┐ begin_render_pass
//!    ▲                                        │  ──────────┘
//!    │                                 end_render_pass
//!    │                                        ▼
//!    └──────── end_frame ◄── Submitted ◄── RenderPassClosed
//! ```
//!
//! The slot is selected by the back-buffer index the swap chain reports,
//! which need not be round-robin. `begin_frame` is the only blocking point:
//! it waits on the slot's fence before the slot's allocator, graveyard and
//! scratch memory are reused.

use raw_window_handle::RawWindowHandle;

use crate::error::{GraphicsError, Result, verify};
use crate::graveyard::ResourceGraveyard;
use crate::hal::{
    CommandList, CpuDescriptor, DescriptorHeapDesc, DescriptorHeapKind, Device, Fence, HalError,
    RawCommandAllocator, RawDescriptorHeap, RawResource, RawSwapChain, ResourceState,
    SwapChainDesc, TransitionBarrier,
};
use crate::pipeline::PipelineTarget;
use crate::scratch::ScratchAllocator;
use crate::settings::ContextParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    FrameBegun,
    RenderPassOpen,
    RenderPassClosed,
    Submitted,
}

impl FrameState {
    /// Commands may be recorded.
    #[inline]
    #[must_use]
    pub const fn is_recording(self) -> bool {
        matches!(
            self,
            Self::FrameBegun | Self::RenderPassOpen | Self::RenderPassClosed
        )
    }
}

// ─── Render Targets ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub(crate) u32);

impl RenderTargetId {
    /// The swap chain's back buffer.
    pub const MAIN: Self = Self(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub resource: RawResource,
    pub rtv: CpuDescriptor,
    pub is_backbuffer: bool,
}

impl RenderTarget {
    #[must_use]
    pub fn pipeline_target(&self) -> PipelineTarget {
        PipelineTarget {
            id: self.id.0,
            format: self.format,
            sample_count: self.sample_count,
        }
    }
}

// ─── Frame Resource ──────────────────────────────────────────────────────────

/// Everything one frame slot owns.
pub struct FrameResource<D: Device> {
    pub(crate) command_allocator: RawCommandAllocator,
    pub(crate) fence: D::Fence,
    /// Value the fence reaches once this slot's current frame completes.
    pub(crate) fence_value: u64,
    /// Last value actually submitted for signalling.
    pub(crate) signaled_value: u64,
    pub(crate) scratch: ScratchAllocator,
    pub(crate) graveyard: ResourceGraveyard,
    pub(crate) render_target: RawResource,
    pub(crate) rtv: CpuDescriptor,
}

impl<D: Device> FrameResource<D> {
    #[inline]
    #[must_use]
    pub fn fence(&self) -> &D::Fence {
        &self.fence
    }

    #[inline]
    #[must_use]
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    #[inline]
    #[must_use]
    pub fn scratch(&self) -> &ScratchAllocator {
        &self.scratch
    }

    #[inline]
    #[must_use]
    pub fn graveyard(&self) -> &ResourceGraveyard {
        &self.graveyard
    }

    #[inline]
    #[must_use]
    pub fn render_target(&self) -> RawResource {
        self.render_target
    }
}

// ─── Controller ──────────────────────────────────────────────────────────────

pub struct FrameController<D: Device> {
    frames: Vec<FrameResource<D>>,
    current: usize,
    state: FrameState,
    command_list: D::CommandList,
    swap_chain: RawSwapChain,
    rtv_heap: RawDescriptorHeap,
    main_target: RenderTarget,
    bound_target: Option<RenderTargetId>,
    strict: bool,
}

impl<D: Device> FrameController<D> {
    pub(crate) fn new(
        device: &mut D,
        window: RawWindowHandle,
        width: u32,
        height: u32,
        params: &ContextParams,
    ) -> Result<Self> {
        let count = params.frames_in_flight;
        let swap_chain = device.create_swap_chain(&SwapChainDesc {
            window,
            width,
            height,
            format: params.back_buffer_format,
            buffer_count: count,
        })?;
        let rtv_heap = device.create_descriptor_heap(&DescriptorHeapDesc {
            kind: DescriptorHeapKind::RenderTarget,
            count,
            shader_visible: false,
        })?;
        let rtv_start = device.cpu_descriptor_start(rtv_heap);
        let rtv_increment = device.descriptor_increment_size(DescriptorHeapKind::RenderTarget);

        let mut frames = Vec::with_capacity(count as usize);
        for index in 0..count {
            let render_target = device.swap_chain_buffer(swap_chain, index)?;
            let rtv = rtv_start.offset(index, rtv_increment);
            device.create_render_target_view(render_target, rtv);
            frames.push(FrameResource {
                command_allocator: device.create_command_allocator()?,
                fence: device.create_fence(0)?,
                fence_value: 0,
                signaled_value: 0,
                scratch: ScratchAllocator::new(device, &params.scratch)?,
                graveyard: ResourceGraveyard::new(),
                render_target,
                rtv,
            });
        }

        let command_list = device.create_command_list(frames[0].command_allocator)?;
        let current = (device.current_back_buffer_index(swap_chain) as usize).min(frames.len() - 1);
        let main_target = RenderTarget {
            id: RenderTargetId::MAIN,
            format: params.back_buffer_format,
            sample_count: 1,
            resource: frames[current].render_target,
            rtv: frames[current].rtv,
            is_backbuffer: true,
        };

        Ok(Self {
            frames,
            current,
            state: FrameState::Idle,
            command_list,
            swap_chain,
            rtv_heap,
            main_target,
            bound_target: None,
            strict: params.verify_graphics_calls,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&FrameResource<D>> {
        self.frames.get(index)
    }

    #[inline]
    #[must_use]
    pub fn main_target(&self) -> &RenderTarget {
        &self.main_target
    }

    #[inline]
    #[must_use]
    pub fn bound_target(&self) -> Option<&RenderTarget> {
        self.bound_target.map(|_| &self.main_target)
    }

    #[inline]
    #[must_use]
    pub fn command_list(&self) -> &D::CommandList {
        &self.command_list
    }

    /// The recording command list plus the current slot, borrowed together.
    pub(crate) fn recording_parts(&mut self) -> (&mut D::CommandList, &mut FrameResource<D>) {
        (&mut self.command_list, &mut self.frames[self.current])
    }

    /// Graveyard of the current slot. Resources retired here are released the
    /// next time this slot is acquired, after its fence has been waited on.
    pub(crate) fn graveyard_mut(&mut self) -> &mut ResourceGraveyard {
        &mut self.frames[self.current].graveyard
    }

    pub(crate) fn expect_recording(&self, operation: &'static str) -> Result<()> {
        if self.state.is_recording() {
            Ok(())
        } else {
            Err(GraphicsError::InvalidFrameState {
                operation,
                actual: self.state,
            })
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Acquires the next slot and opens the main render pass.
    pub(crate) fn begin_frame(&mut self, device: &mut D, sampler_heap: RawDescriptorHeap) -> Result<()> {
        if self.state != FrameState::Idle {
            return Err(GraphicsError::InvalidFrameState {
                operation: "begin_frame",
                actual: self.state,
            });
        }

        let index = device.current_back_buffer_index(self.swap_chain) as usize;
        if index >= self.frames.len() {
            return Err(HalError::InvalidCall(format!(
                "back buffer index {index} outside {} frame slots",
                self.frames.len()
            ))
            .into());
        }
        self.current = index;
        let strict = self.strict;
        let frame = &mut self.frames[index];

        if frame.fence.completed_value() < frame.fence_value {
            log::trace!("Waiting on frame slot {index} (fence value {})", frame.fence_value);
            verify(frame.fence.wait_for(frame.fence_value), strict);
        }
        frame.fence_value += 1;

        verify(device.reset_command_allocator(frame.command_allocator), strict);
        frame.graveyard.flush(device);
        verify(self.command_list.reset(frame.command_allocator), strict);
        frame.scratch.reset();

        self.main_target.resource = frame.render_target;
        self.main_target.rtv = frame.rtv;
        self.command_list
            .set_descriptor_heaps(&[sampler_heap, frame.scratch.descriptor_heap()]);
        self.state = FrameState::FrameBegun;

        self.begin_render_pass(RenderTargetId::MAIN)
    }

    /// Binds `target` for output. A no-op if it is already open.
    pub(crate) fn begin_render_pass(&mut self, target: RenderTargetId) -> Result<()> {
        self.expect_recording("begin_render_pass")?;
        if self.state == FrameState::RenderPassOpen && self.bound_target == Some(target) {
            return Ok(());
        }
        if target != self.main_target.id {
            return Err(GraphicsError::Unsupported("offscreen render targets".to_owned()));
        }
        self.end_render_pass();

        if self.main_target.is_backbuffer {
            self.command_list.resource_barrier(&TransitionBarrier {
                resource: self.main_target.resource,
                subresource: None,
                before: ResourceState::Present,
                after: ResourceState::RenderTarget,
            });
        }
        self.command_list.set_render_target(self.main_target.rtv);
        self.bound_target = Some(target);
        self.state = FrameState::RenderPassOpen;
        Ok(())
    }

    /// Closes the open pass, returning the back buffer to `Present`.
    pub(crate) fn end_render_pass(&mut self) {
        if self.state != FrameState::RenderPassOpen {
            return;
        }
        if self.main_target.is_backbuffer {
            self.command_list.resource_barrier(&TransitionBarrier {
                resource: self.main_target.resource,
                subresource: None,
                before: ResourceState::RenderTarget,
                after: ResourceState::Present,
            });
        }
        self.bound_target = None;
        self.state = FrameState::RenderPassClosed;
    }

    /// Closes, submits, signals and presents.
    pub(crate) fn end_frame(&mut self, device: &mut D) -> Result<()> {
        self.expect_recording("end_frame")?;
        self.end_render_pass();

        let strict = self.strict;
        verify(self.command_list.close(), strict);
        verify(device.execute(&self.command_list), strict);
        let frame = &mut self.frames[self.current];
        verify(device.signal(&frame.fence, frame.fence_value), strict);
        frame.signaled_value = frame.fence_value;
        self.state = FrameState::Submitted;

        verify(device.present(self.swap_chain), strict);
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Waits for every submitted frame and releases all retired resources.
    /// An unsubmitted frame is abandoned.
    pub(crate) fn drain(&mut self, device: &mut D) {
        if self.state.is_recording() {
            log::warn!("Abandoning frame {} that was never submitted", self.current);
            if let Err(err) = self.command_list.close() {
                log::debug!("Closing abandoned command list failed: {err}");
            }
            self.bound_target = None;
            self.state = FrameState::Idle;
        }
        for (index, frame) in self.frames.iter_mut().enumerate() {
            if frame.fence.completed_value() < frame.signaled_value
                && let Err(err) = frame.fence.wait_for(frame.signaled_value)
            {
                log::error!("Waiting on frame slot {index} failed: {err}");
            }
            frame.graveyard.flush(device);
        }
    }

    /// Releases every slot-owned object. Call after [`drain`](Self::drain).
    pub(crate) fn release(&mut self, device: &mut D) {
        for frame in self.frames.drain(..) {
            frame.scratch.release(device);
            device.release_command_allocator(frame.command_allocator);
        }
        device.release_descriptor_heap(self.rtv_heap);
        device.release_swap_chain(self.swap_chain);
    }
}
