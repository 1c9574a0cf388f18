//! Shared fixtures for the integration tests.
//!
//! Only one `Context` may exist per process, so every fixture holds a
//! global lock for as long as its context lives.

#![allow(dead_code)]

use ember::graphics::hal::headless::{HeadlessConfig, HeadlessController, HeadlessDevice, HeadlessWindow};
use ember::graphics::shader::{
    ResourceMember, ResourceType, ResourceTypeInfo, ShaderDataType, ShaderMeta,
    ShaderResourceBinding, ShaderStage,
};
use ember::graphics::texture::{TextureCreationParams, TextureParams};
use ember::graphics::types::{DataType, TextureFormat};
use ember::graphics::vertex::VertexStreamDeclaration;
use ember::graphics::{ProgramHandle, TextureHandle, VertexDeclarationHandle};
use ember::{Context, ContextParams};
use parking_lot::{Mutex, MutexGuard};

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

static CONTEXT_LOCK: Mutex<()> = Mutex::new(());

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A context over a headless device plus the device's inspection handle.
pub struct Fixture {
    pub ctx: Context<HeadlessDevice>,
    pub probe: HeadlessController,
    _lock: MutexGuard<'static, ()>,
}

pub fn fixture() -> Fixture {
    fixture_with(HeadlessDevice::new(), ContextParams::default())
}

/// Fences only complete when the test says so.
pub fn manual_fence_fixture(params: ContextParams) -> Fixture {
    let device = HeadlessDevice::with_config(HeadlessConfig {
        auto_complete_fences: false,
        ..Default::default()
    });
    fixture_with(device, params)
}

pub fn fixture_with(device: HeadlessDevice, params: ContextParams) -> Fixture {
    let lock = CONTEXT_LOCK.lock();
    init_logger();
    let probe = device.controller();
    let ctx = Context::new(device, &HeadlessWindow::new(WIDTH, HEIGHT), params).expect("context");
    Fixture {
        ctx,
        probe,
        _lock: lock,
    }
}

/// Holds the lock without building a context.
pub fn lock() -> MutexGuard<'static, ()> {
    init_logger();
    CONTEXT_LOCK.lock()
}

// ============================================================================
// Programs
// ============================================================================

pub fn vertex_meta() -> ShaderMeta {
    ShaderMeta {
        inputs: vec![
            ShaderResourceBinding::new("position", ResourceType::Data(ShaderDataType::Vec3), 0, 0),
            ShaderResourceBinding::new("texcoord0", ResourceType::Data(ShaderDataType::Vec2), 0, 1),
        ],
        ..Default::default()
    }
}

/// One 16-byte uniform block (`tint`) at (0, 0) and one texture at (0, 1).
pub fn textured_fragment_meta() -> ShaderMeta {
    ShaderMeta {
        uniform_buffers: vec![
            ShaderResourceBinding::new("FsUniforms", ResourceType::TypeIndex(0), 0, 0).with_block_size(16),
        ],
        textures: vec![ShaderResourceBinding::new(
            "texture_sampler",
            ResourceType::Data(ShaderDataType::Sampler2D),
            0,
            1,
        )],
        type_infos: vec![ResourceTypeInfo::new(
            "FsUniforms",
            vec![ResourceMember::new("tint", ShaderDataType::Vec4, 1, 0)],
        )],
        ..Default::default()
    }
}

/// A vertex-stage block with a `mat4` and a `vec4` member.
pub fn transform_vertex_meta() -> ShaderMeta {
    ShaderMeta {
        uniform_buffers: vec![
            ShaderResourceBinding::new("VsUniforms", ResourceType::TypeIndex(0), 0, 0).with_block_size(80),
        ],
        type_infos: vec![ResourceTypeInfo::new(
            "VsUniforms",
            vec![
                ResourceMember::new("view_proj", ShaderDataType::Mat4, 1, 0),
                ResourceMember::new("offset", ShaderDataType::Vec4, 1, 64),
            ],
        )],
        ..vertex_meta()
    }
}

pub fn link(ctx: &mut Context<HeadlessDevice>, vs: ShaderMeta, fs: ShaderMeta) -> ProgramHandle {
    let vs = ctx.new_shader(ShaderStage::Vertex, b"vs-bytecode", vs).unwrap();
    let fs = ctx.new_shader(ShaderStage::Fragment, b"fs-bytecode", fs).unwrap();
    ctx.new_program(vs, fs).unwrap()
}

pub fn textured_program(ctx: &mut Context<HeadlessDevice>) -> ProgramHandle {
    link(ctx, vertex_meta(), textured_fragment_meta())
}

pub fn plain_program(ctx: &mut Context<HeadlessDevice>) -> ProgramHandle {
    link(ctx, vertex_meta(), ShaderMeta::default())
}

// ============================================================================
// Geometry & Textures
// ============================================================================

/// Interleaved position (3 floats) and texcoord (2 floats).
pub fn quad_declaration(ctx: &mut Context<HeadlessDevice>) -> VertexDeclarationHandle {
    let mut decl = VertexStreamDeclaration::new();
    decl.add_stream("position", 3, DataType::Float, false)
        .add_stream("texcoord0", 2, DataType::Float, false);
    ctx.new_vertex_declaration(&decl, None).unwrap()
}

pub fn quad_vertices() -> Vec<u8> {
    let vertices: [f32; 20] = [
        0.0, 0.0, 0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, 1.0, 0.0, //
        1.0, 1.0, 0.0, 1.0, 1.0, //
        0.0, 1.0, 0.0, 0.0, 1.0, //
    ];
    bytemuck::cast_slice(&vertices).to_vec()
}

pub fn rgba_texture(ctx: &mut Context<HeadlessDevice>, width: u32, height: u32) -> TextureHandle {
    let texture = ctx.new_texture(&TextureCreationParams::new(width, height));
    let pixels = vec![0xffu8; (width * height * 4) as usize];
    ctx.set_texture(texture, &TextureParams::new(&pixels, TextureFormat::Rgba, width, height))
        .unwrap();
    texture
}
