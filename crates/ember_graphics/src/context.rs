//! Graphics Context
//!
//! [`Context`] owns the device and everything built on it: the frame ring,
//! the resource arena, the bound state, the pipeline cache and the sampler
//! pool. It is constructed and passed explicitly; at most one may exist per
//! process at a time.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut ctx = Context::new(device, &window, ContextParams::default())?;
//! let vb = ctx.new_vertex_buffer(bytemuck::cast_slice(&vertices))?;
//! let program = ctx.new_program(vs, fs)?;
//!
//! ctx.begin_frame()?;
//! ctx.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0, 0)?;
//! ctx.enable_program(program)?;
//! ctx.enable_vertex_buffer(vb, 0)?;
//! ctx.enable_vertex_declaration(decl, 0, program)?;
//! ctx.draw(PrimitiveType::Triangles, 0, 3)?;
//! ctx.end_frame()?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use ember_core::NameHash;
use glam::{Mat4, Vec4};

use crate::binding_state::{BindingState, MAX_TEXTURE_UNITS, MAX_VERTEX_BUFFERS};
use crate::device_buffer::{BufferKind, DeviceBuffer};
use crate::draw::{self, DrawTargets};
use crate::error::{GraphicsError, Result, fatal, verify};
use crate::frame::{FrameController, FrameResource, FrameState, RenderTargetId};
use crate::graveyard::ResourceGraveyard;
use crate::hal::{CommandList, Device, Fence, IndexBufferView, RawCommandAllocator, RawRootSignature};
use crate::pipeline::PipelineCache;
use crate::program::{AttributeInfo, Program};
use crate::resources::{
    ArenaLookup, IndexBufferHandle, ProgramHandle, ResourceArena, ShaderModuleHandle,
    TextureHandle, VertexBufferHandle, VertexDeclarationHandle,
};
use crate::settings::ContextParams;
use crate::shader::binding::{UniformInfo, UniformLocation};
use crate::shader::{ShaderMeta, ShaderModule, ShaderStage};
use crate::texture::{SamplerPool, Texture, TextureCreationParams, TextureParams, sampler_desc};
use crate::types::{
    ClearFlags, ColorMask, FaceType, IndexType, PrimitiveType, State, TextureFilter, TextureWrap,
};
use crate::vertex::{VertexDeclaration, VertexStreamDeclaration};
use crate::window::WindowSurface;

// ─── Single Instance ─────────────────────────────────────────────────────────

static CONTEXT_ALIVE: AtomicBool = AtomicBool::new(false);

/// Held by the live context; dropping it allows a new one to be created.
struct InstanceGuard(());

impl InstanceGuard {
    fn acquire() -> Result<Self> {
        CONTEXT_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(()))
            .map_err(|_| GraphicsError::ContextAlreadyExists)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        CONTEXT_ALIVE.store(false, Ordering::Release);
    }
}

// ─── Out-of-frame Uploads ────────────────────────────────────────────────────

struct UploadContext<D: Device> {
    allocator: RawCommandAllocator,
    list: D::CommandList,
    fence: D::Fence,
    fence_value: u64,
    graveyard: ResourceGraveyard,
}

impl<D: Device> UploadContext<D> {
    fn new(device: &mut D) -> Result<Self> {
        let allocator = device.create_command_allocator()?;
        Ok(Self {
            list: device.create_command_list(allocator)?,
            fence: device.create_fence(0)?,
            allocator,
            fence_value: 0,
            graveyard: ResourceGraveyard::new(),
        })
    }
}

// ─── Context ─────────────────────────────────────────────────────────────────

pub struct Context<D: Device> {
    device: D,
    frames: FrameController<D>,
    arena: ResourceArena,
    bindings: BindingState,
    pipelines: PipelineCache,
    samplers: SamplerPool,
    default_sampler: u32,
    upload: UploadContext<D>,
    /// Root signatures of deleted programs; cached pipelines may still
    /// reference them.
    retired_root_signatures: Vec<RawRootSignature>,
    params: ContextParams,
    width: u32,
    height: u32,
    _guard: InstanceGuard,
}

impl<D: Device> Context<D> {
    /// Builds the swap chain, frame slots, sampler pool and upload queue.
    ///
    /// Fails with [`GraphicsError::ContextAlreadyExists`] while another
    /// context is alive.
    pub fn new(mut device: D, window: &impl WindowSurface, params: ContextParams) -> Result<Self> {
        let guard = InstanceGuard::acquire()?;
        params.validate().map_err(GraphicsError::InvalidSettings)?;

        if !window.is_open() {
            return Err(GraphicsError::WindowUnavailable);
        }
        let handle = window
            .native_surface_handle()
            .ok_or(GraphicsError::WindowUnavailable)?;
        let (window_width, window_height) = window.window_size();
        let width = if params.width == 0 { window_width } else { params.width };
        let height = if params.height == 0 { window_height } else { params.height };
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidSettings(format!(
                "back buffer size {width}x{height}"
            )));
        }

        let adapter = device.adapter_info();
        log::info!("Graphics adapter: {}", adapter.name);
        if params.print_device_info {
            log::info!(
                "  vendor 0x{:04x}, device 0x{:04x}, {} MiB dedicated video memory",
                adapter.vendor_id,
                adapter.device_id,
                adapter.dedicated_video_memory / (1024 * 1024)
            );
            log::info!(
                "  {} frames in flight, {}x{} {:?}",
                params.frames_in_flight,
                width,
                height,
                params.back_buffer_format
            );
        }

        let frames = FrameController::new(&mut device, handle, width, height, &params)?;
        let mut samplers = SamplerPool::new(&mut device, params.sampler_pool_capacity)?;
        let default_sampler = samplers.get_or_create(
            &mut device,
            &sampler_desc(
                TextureFilter::Default,
                TextureFilter::Default,
                TextureWrap::Repeat,
                TextureWrap::Repeat,
                f32::MAX,
                1.0,
                (params.default_texture_min_filter, params.default_texture_mag_filter),
            ),
        )?;
        let upload = UploadContext::new(&mut device)?;

        Ok(Self {
            device,
            frames,
            arena: ResourceArena::default(),
            bindings: BindingState::new(width, height),
            pipelines: PipelineCache::new(),
            samplers,
            default_sampler,
            upload,
            retired_root_signatures: Vec::new(),
            params,
            width,
            height,
            _guard: guard,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> &ContextParams {
        &self.params
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn frame_state(&self) -> FrameState {
        self.frames.state()
    }

    #[inline]
    #[must_use]
    pub fn current_frame_index(&self) -> usize {
        self.frames.current_index()
    }

    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.frame_count()
    }

    #[must_use]
    pub fn frame(&self, slot: usize) -> Option<&FrameResource<D>> {
        self.frames.frame(slot)
    }

    #[inline]
    #[must_use]
    pub fn command_list(&self) -> &D::CommandList {
        self.frames.command_list()
    }

    #[inline]
    #[must_use]
    pub fn binding_state(&self) -> &BindingState {
        &self.bindings
    }

    #[inline]
    #[must_use]
    pub fn pipeline_cache(&self) -> &PipelineCache {
        &self.pipelines
    }

    #[inline]
    #[must_use]
    pub fn sampler_pool(&self) -> &SamplerPool {
        &self.samplers
    }

    #[inline]
    #[must_use]
    pub fn default_sampler(&self) -> u32 {
        self.default_sampler
    }

    #[inline]
    #[must_use]
    pub fn main_render_target(&self) -> RenderTargetId {
        RenderTargetId::MAIN
    }

    // ── Frame ────────────────────────────────────────────────────────────────

    /// Acquires the next frame slot, blocking until the GPU has finished
    /// with it, and opens the main render pass.
    pub fn begin_frame(&mut self) -> Result<()> {
        self.frames.begin_frame(&mut self.device, self.samplers.heap())?;
        // A reset list carries no viewport or scissor.
        self.bindings.viewport_changed = true;
        self.bindings.scissor_changed = true;
        Ok(())
    }

    /// Submits the frame and presents.
    pub fn end_frame(&mut self) -> Result<()> {
        self.frames.end_frame(&mut self.device)
    }

    pub fn begin_render_pass(&mut self, target: RenderTargetId) -> Result<()> {
        self.frames.begin_render_pass(target)
    }

    pub fn end_render_pass(&mut self) {
        self.frames.end_render_pass();
    }

    /// Clears the bound target's colour view. The main target has no
    /// depth-stencil view, so depth and stencil flags are ignored.
    pub fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32, stencil: u32) -> Result<()> {
        self.frames.expect_recording("clear")?;
        let Some(target) = self.frames.bound_target().copied() else {
            return Err(GraphicsError::InvalidFrameState {
                operation: "clear",
                actual: self.frames.state(),
            });
        };
        if flags.contains(ClearFlags::COLOR) {
            let (list, _) = self.frames.recording_parts();
            list.clear_render_target_view(target.rtv, color);
        }
        if flags.intersects(ClearFlags::DEPTH | ClearFlags::STENCIL) {
            log::trace!("No depth-stencil view on {:?}; depth {depth} stencil {stencil} skipped", target.id);
        }
        Ok(())
    }

    // ── Uploads ──────────────────────────────────────────────────────────────

    /// Runs `record` against the frame's list while a frame is recording,
    /// otherwise against the upload list, which is submitted and waited on
    /// before returning.
    fn record_upload<R>(
        &mut self,
        record: impl FnOnce(&mut D, &mut D::CommandList, &mut ResourceGraveyard, &mut ResourceArena) -> Result<R>,
    ) -> Result<R> {
        if self.frames.state().is_recording() {
            let (list, frame) = self.frames.recording_parts();
            return record(&mut self.device, list, &mut frame.graveyard, &mut self.arena);
        }

        let strict = self.params.verify_graphics_calls;
        let upload = &mut self.upload;
        verify(self.device.reset_command_allocator(upload.allocator), strict);
        verify(upload.list.reset(upload.allocator), strict);
        let result = record(&mut self.device, &mut upload.list, &mut upload.graveyard, &mut self.arena);
        verify(upload.list.close(), strict);
        verify(self.device.execute(&upload.list), strict);
        upload.fence_value += 1;
        verify(self.device.signal(&upload.fence, upload.fence_value), strict);
        verify(upload.fence.wait_for(upload.fence_value), strict);
        // The queue is in order: every earlier frame has completed as well.
        upload.graveyard.flush(&mut self.device);
        result
    }

    // ── Vertex & Index Buffers ───────────────────────────────────────────────

    pub fn new_vertex_buffer(&mut self, data: &[u8]) -> Result<VertexBufferHandle> {
        let handle = self.arena.vertex_buffers.insert(DeviceBuffer::new(BufferKind::Vertex));
        if let Err(err) = self.set_vertex_buffer_data(handle, data) {
            self.arena.vertex_buffers.remove(handle);
            return Err(err);
        }
        Ok(handle)
    }

    /// Replaces the buffer's contents. A size change reallocates and retires
    /// the old resource.
    pub fn set_vertex_buffer_data(&mut self, buffer: VertexBufferHandle, data: &[u8]) -> Result<()> {
        self.arena.vertex_buffers.lookup(buffer, "vertex buffer")?;
        if data.is_empty() {
            return Ok(());
        }
        self.record_upload(|device, list, graveyard, arena| {
            arena
                .vertex_buffers
                .lookup_mut(buffer, "vertex buffer")?
                .upload(device, list, graveyard, data)
        })
    }

    pub fn set_vertex_buffer_sub_data(&mut self, _buffer: VertexBufferHandle, _offset: u32, _data: &[u8]) -> Result<()> {
        Err(GraphicsError::Unsupported("vertex buffer sub-range update".to_owned()))
    }

    pub fn delete_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> Result<()> {
        let mut removed = self
            .arena
            .vertex_buffers
            .remove(buffer)
            .ok_or(GraphicsError::InvalidHandle("vertex buffer"))?;
        removed.retire(self.frames.graveyard_mut());
        self.bindings.unbind_vertex_buffer(buffer);
        Ok(())
    }

    pub fn vertex_buffer(&self, buffer: VertexBufferHandle) -> Result<&DeviceBuffer> {
        self.arena.vertex_buffers.lookup(buffer, "vertex buffer")
    }

    pub fn new_index_buffer(&mut self, data: &[u8]) -> Result<IndexBufferHandle> {
        let handle = self.arena.index_buffers.insert(DeviceBuffer::new(BufferKind::Index));
        if let Err(err) = self.set_index_buffer_data(handle, data) {
            self.arena.index_buffers.remove(handle);
            return Err(err);
        }
        Ok(handle)
    }

    pub fn set_index_buffer_data(&mut self, buffer: IndexBufferHandle, data: &[u8]) -> Result<()> {
        self.arena.index_buffers.lookup(buffer, "index buffer")?;
        if data.is_empty() {
            return Ok(());
        }
        self.record_upload(|device, list, graveyard, arena| {
            arena
                .index_buffers
                .lookup_mut(buffer, "index buffer")?
                .upload(device, list, graveyard, data)
        })
    }

    pub fn set_index_buffer_sub_data(&mut self, _buffer: IndexBufferHandle, _offset: u32, _data: &[u8]) -> Result<()> {
        Err(GraphicsError::Unsupported("index buffer sub-range update".to_owned()))
    }

    pub fn delete_index_buffer(&mut self, buffer: IndexBufferHandle) -> Result<()> {
        let mut removed = self
            .arena
            .index_buffers
            .remove(buffer)
            .ok_or(GraphicsError::InvalidHandle("index buffer"))?;
        removed.retire(self.frames.graveyard_mut());
        Ok(())
    }

    pub fn index_buffer(&self, buffer: IndexBufferHandle) -> Result<&DeviceBuffer> {
        self.arena.index_buffers.lookup(buffer, "index buffer")
    }

    /// Binds `buffer` to vertex slot `binding`.
    pub fn enable_vertex_buffer(&mut self, buffer: VertexBufferHandle, binding: usize) -> Result<()> {
        self.arena.vertex_buffers.lookup(buffer, "vertex buffer")?;
        let slot = self
            .bindings
            .vertex_buffers
            .get_mut(binding)
            .ok_or_else(|| vertex_slot_error(binding))?;
        *slot = Some(buffer);
        Ok(())
    }

    pub fn disable_vertex_buffer(&mut self, binding: usize) {
        if let Some(slot) = self.bindings.vertex_buffers.get_mut(binding) {
            *slot = None;
        }
    }

    // ── Vertex Declarations ──────────────────────────────────────────────────

    pub fn new_vertex_declaration(
        &mut self,
        decl: &VertexStreamDeclaration,
        stride: Option<u32>,
    ) -> Result<VertexDeclarationHandle> {
        let declaration = VertexDeclaration::new(decl, stride)?;
        Ok(self.arena.vertex_declarations.insert(declaration))
    }

    pub fn delete_vertex_declaration(&mut self, decl: VertexDeclarationHandle) -> Result<()> {
        self.arena
            .vertex_declarations
            .remove(decl)
            .map(drop)
            .ok_or(GraphicsError::InvalidHandle("vertex declaration"))
    }

    /// Resolves `decl` against `program`'s vertex inputs and binds the
    /// resulting layout to slot `binding`.
    pub fn enable_vertex_declaration(
        &mut self,
        decl: VertexDeclarationHandle,
        binding: usize,
        program: ProgramHandle,
    ) -> Result<()> {
        if binding >= MAX_VERTEX_BUFFERS {
            return Err(vertex_slot_error(binding));
        }
        let declaration = self.arena.vertex_declarations.lookup(decl, "vertex declaration")?;
        let program = self.arena.programs.lookup(program, "program")?;
        self.bindings.vertex_layouts[binding] = Some(declaration.bind(binding as u32, program.vertex_inputs()));
        Ok(())
    }

    pub fn disable_vertex_declaration(&mut self, binding: usize) {
        if let Some(layout) = self.bindings.vertex_layouts.get_mut(binding) {
            *layout = None;
        }
    }

    // ── Shaders & Programs ───────────────────────────────────────────────────

    pub fn new_shader(&mut self, stage: ShaderStage, bytecode: &[u8], meta: ShaderMeta) -> Result<ShaderModuleHandle> {
        if stage == ShaderStage::Compute {
            return Err(GraphicsError::Unsupported("compute shaders".to_owned()));
        }
        Ok(self.arena.shader_modules.insert(ShaderModule::new(stage, bytecode, meta)))
    }

    pub fn delete_shader(&mut self, shader: ShaderModuleHandle) -> Result<()> {
        self.arena
            .shader_modules
            .remove(shader)
            .map(drop)
            .ok_or(GraphicsError::InvalidHandle("shader module"))
    }

    /// Links a vertex and a fragment module into a program.
    pub fn new_program(&mut self, vertex: ShaderModuleHandle, fragment: ShaderModuleHandle) -> Result<ProgramHandle> {
        let vs = self.arena.shader_modules.lookup(vertex, "vertex shader")?;
        let fs = self.arena.shader_modules.lookup(fragment, "fragment shader")?;
        let program = Program::link(&mut self.device, vs, fs)?;
        Ok(self.arena.programs.insert(program))
    }

    pub fn delete_program(&mut self, program: ProgramHandle) -> Result<()> {
        let removed = self
            .arena
            .programs
            .remove(program)
            .ok_or(GraphicsError::InvalidHandle("program"))?;
        if self.bindings.program == Some(program) {
            self.bindings.program = None;
        }
        self.retired_root_signatures.push(removed.root_signature());
        Ok(())
    }

    #[must_use]
    pub fn program(&self, program: ProgramHandle) -> Option<&Program> {
        self.arena.programs.get(program)
    }

    pub fn enable_program(&mut self, program: ProgramHandle) -> Result<()> {
        self.arena.programs.lookup(program, "program")?;
        self.bindings.program = Some(program);
        Ok(())
    }

    pub fn disable_program(&mut self) {
        self.bindings.program = None;
    }

    #[inline]
    #[must_use]
    pub fn bound_program(&self) -> Option<ProgramHandle> {
        self.bindings.program
    }

    pub fn get_attribute_count(&self, program: ProgramHandle) -> Result<u32> {
        Ok(self.arena.programs.lookup(program, "program")?.attribute_count())
    }

    pub fn get_attribute(&self, program: ProgramHandle, index: u32) -> Result<Option<AttributeInfo>> {
        Ok(self.arena.programs.lookup(program, "program")?.attribute(index))
    }

    pub fn get_uniform_count(&self, program: ProgramHandle) -> Result<u32> {
        Ok(self.arena.programs.lookup(program, "program")?.uniform_count())
    }

    /// Name, type, element count and location of uniform `index`.
    pub fn get_uniform_name(&self, program: ProgramHandle, index: u32) -> Result<Option<UniformInfo>> {
        Ok(self.arena.programs.lookup(program, "program")?.uniform_info(index))
    }

    pub fn get_uniform_location(&self, program: ProgramHandle, name: &str) -> Result<UniformLocation> {
        self.get_uniform_location_by_hash(program, NameHash::new(name))
    }

    pub fn get_uniform_location_by_hash(&self, program: ProgramHandle, name: NameHash) -> Result<UniformLocation> {
        Ok(self.arena.programs.lookup(program, "program")?.uniform_location(name))
    }

    fn bound_program_mut(&mut self) -> Result<&mut Program> {
        let handle = self.bindings.program.ok_or(GraphicsError::NoProgramBound)?;
        self.arena.programs.lookup_mut(handle, "program")
    }

    /// Writes `values` into the bound program's uniform blob.
    pub fn set_constant_v4(&mut self, location: UniformLocation, values: &[Vec4]) -> Result<()> {
        self.bound_program_mut()?.set_constant_v4(location, values)
    }

    pub fn set_constant_m4(&mut self, location: UniformLocation, values: &[Mat4]) -> Result<()> {
        self.bound_program_mut()?.set_constant_m4(location, values)
    }

    /// Points the bound program's texture at `location` to `unit`.
    pub fn set_sampler(&mut self, location: UniformLocation, unit: u32) -> Result<()> {
        self.bound_program_mut()?.set_sampler(location, unit)
    }

    // ── Textures ─────────────────────────────────────────────────────────────

    /// Registers a texture. Its resource is created on the first upload.
    pub fn new_texture(&mut self, params: &TextureCreationParams) -> TextureHandle {
        self.arena.textures.insert(Texture::new(params, self.default_sampler))
    }

    /// Uploads one mip level (or a sub-rectangle of it). Full uploads also
    /// apply the sampling parameters.
    pub fn set_texture(&mut self, texture: TextureHandle, params: &TextureParams<'_>) -> Result<()> {
        self.arena.textures.lookup(texture, "texture")?;
        self.record_upload(|device, list, graveyard, arena| {
            arena
                .textures
                .lookup_mut(texture, "texture")?
                .upload(device, list, graveyard, params)
        })?;
        if !params.sub_update {
            self.set_texture_params(
                texture,
                params.min_filter,
                params.mag_filter,
                params.u_wrap,
                params.v_wrap,
                params.max_anisotropy,
            )?;
        }
        Ok(())
    }

    /// Selects the sampler the texture is read through.
    pub fn set_texture_params(
        &mut self,
        texture: TextureHandle,
        min_filter: TextureFilter,
        mag_filter: TextureFilter,
        u_wrap: TextureWrap,
        v_wrap: TextureWrap,
        max_anisotropy: f32,
    ) -> Result<()> {
        let mip_count = self.arena.textures.lookup(texture, "texture")?.mip_map_count();
        let desc = sampler_desc(
            min_filter,
            mag_filter,
            u_wrap,
            v_wrap,
            f32::from(mip_count),
            max_anisotropy,
            (self.params.default_texture_min_filter, self.params.default_texture_mag_filter),
        );
        let index = self
            .samplers
            .get_or_create(&mut self.device, &desc)
            .unwrap_or_else(|err| fatal(&err));
        self.arena.textures.lookup_mut(texture, "texture")?.set_sampler_index(index);
        Ok(())
    }

    pub fn delete_texture(&mut self, texture: TextureHandle) -> Result<()> {
        let mut removed = self
            .arena
            .textures
            .remove(texture)
            .ok_or(GraphicsError::InvalidHandle("texture"))?;
        removed.retire(self.frames.graveyard_mut());
        self.bindings.unbind_texture(texture);
        Ok(())
    }

    /// Size, format and mip metadata of `texture`.
    pub fn texture(&self, texture: TextureHandle) -> Result<&Texture> {
        self.arena.textures.lookup(texture, "texture")
    }

    pub fn enable_texture(&mut self, unit: usize, texture: TextureHandle) -> Result<()> {
        self.arena.textures.lookup(texture, "texture")?;
        let slot = self.bindings.textures.get_mut(unit).ok_or_else(|| {
            GraphicsError::Unsupported(format!("texture unit {unit} (max {MAX_TEXTURE_UNITS})"))
        })?;
        *slot = Some(texture);
        Ok(())
    }

    pub fn disable_texture(&mut self, unit: usize) {
        if let Some(slot) = self.bindings.textures.get_mut(unit) {
            *slot = None;
        }
    }

    // ── Pipeline State ───────────────────────────────────────────────────────

    pub fn enable_state(&mut self, state: State) {
        self.set_state(state, true);
    }

    pub fn disable_state(&mut self, state: State) {
        self.set_state(state, false);
    }

    fn set_state(&mut self, state: State, enabled: bool) {
        if !self.bindings.pipeline_state.set_state(state, enabled) {
            self.bindings.set_scissor_enabled(enabled);
        }
    }

    pub fn set_blend_func(&mut self, src: wgpu::BlendFactor, dst: wgpu::BlendFactor) {
        self.bindings.pipeline_state.blend_src_factor = src;
        self.bindings.pipeline_state.blend_dst_factor = dst;
    }

    pub fn set_color_mask(&mut self, red: bool, green: bool, blue: bool, alpha: bool) {
        self.bindings.pipeline_state.write_color_mask = ColorMask::from_channels(red, green, blue, alpha);
    }

    pub fn set_depth_mask(&mut self, enabled: bool) {
        self.bindings.pipeline_state.write_depth = enabled;
    }

    pub fn set_depth_func(&mut self, func: wgpu::CompareFunction) {
        self.bindings.pipeline_state.depth_test_func = func;
    }

    pub fn set_stencil_mask(&mut self, mask: u8) {
        self.bindings.pipeline_state.stencil_write_mask = mask;
    }

    pub fn set_stencil_func(&mut self, func: wgpu::CompareFunction, reference: u8, mask: u8) {
        self.set_stencil_func_separate(FaceType::FrontAndBack, func, reference, mask);
    }

    pub fn set_stencil_func_separate(&mut self, face: FaceType, func: wgpu::CompareFunction, reference: u8, mask: u8) {
        self.bindings.pipeline_state.set_stencil_func(face, func, reference, mask);
    }

    pub fn set_stencil_op(
        &mut self,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    ) {
        self.set_stencil_op_separate(FaceType::FrontAndBack, fail, depth_fail, pass);
    }

    pub fn set_stencil_op_separate(
        &mut self,
        face: FaceType,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    ) {
        self.bindings.pipeline_state.set_stencil_op(face, fail, depth_fail, pass);
    }

    pub fn set_cull_face(&mut self, face: FaceType) {
        self.bindings.pipeline_state.cull_face_type = face;
    }

    pub fn set_face_winding(&mut self, winding: wgpu::FrontFace) {
        self.bindings.pipeline_state.face_winding = winding;
    }

    /// Takes effect at the next draw.
    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.bindings.set_viewport(x, y, width, height);
    }

    /// Takes effect at the next draw while [`State::ScissorTest`] is enabled.
    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.bindings.set_scissor(x, y, width, height);
    }

    // ── Draw ─────────────────────────────────────────────────────────────────

    fn prepare_draw(&mut self, operation: &'static str, primitive: PrimitiveType) -> Result<()> {
        let state = self.frames.state();
        if state != FrameState::RenderPassOpen {
            return Err(GraphicsError::InvalidFrameState {
                operation,
                actual: state,
            });
        }
        let target = *self.frames.main_target();
        let (list, frame) = self.frames.recording_parts();
        draw::prepare_draw(
            DrawTargets {
                device: &mut self.device,
                list,
                frame,
                target: &target,
            },
            &self.arena,
            &mut self.bindings,
            &mut self.pipelines,
            &self.samplers,
            primitive,
        )
    }

    pub fn draw(&mut self, primitive: PrimitiveType, first: u32, count: u32) -> Result<()> {
        self.prepare_draw("draw", primitive)?;
        let (list, _) = self.frames.recording_parts();
        list.draw_instanced(count, 1, first, 0);
        Ok(())
    }

    /// Indexed draw. `first` is a byte offset into `index_buffer`.
    pub fn draw_elements(
        &mut self,
        primitive: PrimitiveType,
        first: u32,
        count: u32,
        index_type: IndexType,
        index_buffer: IndexBufferHandle,
    ) -> Result<()> {
        let buffer = self.arena.index_buffers.lookup(index_buffer, "index buffer")?;
        let view = IndexBufferView {
            buffer_location: buffer
                .gpu_address(&self.device)
                .ok_or(GraphicsError::InvalidHandle("index buffer"))?,
            size_in_bytes: buffer.data_size(),
            format: index_type.format(),
        };
        self.prepare_draw("draw_elements", primitive)?;
        let (list, _) = self.frames.recording_parts();
        list.set_index_buffer(&view);
        list.draw_indexed_instanced(count, 1, first / index_type.size(), 0, 0);
        Ok(())
    }
}

fn vertex_slot_error(binding: usize) -> GraphicsError {
    GraphicsError::Unsupported(format!("vertex binding {binding} (max {MAX_VERTEX_BUFFERS})"))
}

impl<D: Device> Drop for Context<D> {
    fn drop(&mut self) {
        self.frames.drain(&mut self.device);

        let device = &mut self.device;
        let arena = &mut self.arena;
        let mut released = 0usize;
        let buffers = arena.vertex_buffers.drain().map(|(_, buffer)| buffer);
        for buffer in buffers.chain(arena.index_buffers.drain().map(|(_, buffer)| buffer)) {
            if let Some(resource) = buffer.resource() {
                device.release_resource(resource);
                released += 1;
            }
        }
        for (_, texture) in arena.textures.drain() {
            if let Some(resource) = texture.resource() {
                device.release_resource(resource);
                released += 1;
            }
        }
        self.pipelines.release(device);
        for (_, program) in arena.programs.drain() {
            program.release(device);
        }
        for root_signature in self.retired_root_signatures.drain(..) {
            device.release_root_signature(root_signature);
        }
        self.upload.graveyard.flush(device);
        self.samplers.release(device);
        self.frames.release(device);
        device.release_command_allocator(self.upload.allocator);
        log::info!("Graphics context destroyed ({released} live resources released)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::headless::{HeadlessDevice, HeadlessWindow};

    // The instance guard is process-global.
    static SERIAL: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn test_second_context_rejected() {
        let _lock = SERIAL.lock();
        let window = HeadlessWindow::new(64, 64);
        let first = Context::new(HeadlessDevice::new(), &window, ContextParams::default()).unwrap();
        assert!(matches!(
            Context::new(HeadlessDevice::new(), &window, ContextParams::default()),
            Err(GraphicsError::ContextAlreadyExists)
        ));
        drop(first);
        assert!(Context::new(HeadlessDevice::new(), &window, ContextParams::default()).is_ok());
    }

    #[test]
    fn test_invalid_settings_release_guard() {
        let _lock = SERIAL.lock();
        let window = HeadlessWindow::new(64, 64);
        let params = ContextParams {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(
            Context::new(HeadlessDevice::new(), &window, params),
            Err(GraphicsError::InvalidSettings(_))
        ));
        assert!(Context::new(HeadlessDevice::new(), &window, ContextParams::default()).is_ok());
    }

    #[test]
    fn test_size_defaults_to_window() {
        let _lock = SERIAL.lock();
        let window = HeadlessWindow::new(320, 200);
        let ctx = Context::new(HeadlessDevice::new(), &window, ContextParams::default()).unwrap();
        assert_eq!((ctx.width(), ctx.height()), (320, 200));
        assert_eq!(ctx.binding_state().viewport.width, 320.0);
    }

    #[test]
    fn test_scissor_state_is_not_a_pipeline_state() {
        let _lock = SERIAL.lock();
        let window = HeadlessWindow::new(64, 64);
        let mut ctx = Context::new(HeadlessDevice::new(), &window, ContextParams::default()).unwrap();
        let before = ctx.binding_state().pipeline_state;
        ctx.enable_state(State::ScissorTest);
        assert!(ctx.binding_state().scissor_enabled);
        assert_eq!(ctx.binding_state().pipeline_state, before);
    }
}
