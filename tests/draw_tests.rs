//! Draw Path Tests
//!
//! Tests for:
//! - Uniform commit: one root CBV per uniform block, one descriptor table per texture
//! - Scratch cursors advance by exactly one block / descriptor per binding
//! - Vertex and index buffer binding, index offset conversion
//! - Lazy viewport and scissor application
//! - Draw preconditions and fatal pipeline failures

mod common;

use ember::graphics::hal::headless::Command;
use ember::graphics::hal::{RawResource, ScissorRect, VertexBufferView};
use ember::graphics::{GraphicsError, UniformLocation};
use ember::{FrameState, IndexType, NameHash, PrimitiveType, State};
use glam::Vec4;

use common::{Fixture, fixture, plain_program, quad_declaration, quad_vertices, rgba_texture, textured_program};

fn frame_commands(f: &Fixture) -> Vec<Command> {
    f.ctx.command_list().commands().to_vec()
}

/// Binds the quad geometry and `program`, and opens a frame.
fn prepare(f: &mut Fixture, program: ember::graphics::ProgramHandle) {
    let vb = f.ctx.new_vertex_buffer(&quad_vertices()).unwrap();
    let decl = quad_declaration(&mut f.ctx);
    f.ctx.begin_frame().unwrap();
    f.ctx.enable_program(program).unwrap();
    f.ctx.enable_vertex_buffer(vb, 0).unwrap();
    f.ctx.enable_vertex_declaration(decl, 0, program).unwrap();
}

// ============================================================================
// Uniform & Texture Commit
// ============================================================================

#[test]
fn draw_commits_one_cbv_and_one_texture_table() {
    let mut f = fixture();
    let program = textured_program(&mut f.ctx);
    let texture = rgba_texture(&mut f.ctx, 4, 4);
    prepare(&mut f, program);
    f.ctx.enable_texture(0, texture).unwrap();

    let tint = f.ctx.get_uniform_location(program, "tint").unwrap();
    f.ctx.set_constant_v4(tint, &[Vec4::new(1.0, 0.5, 0.25, 1.0)]).unwrap();

    f.probe.clear_log();
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();

    let commands = frame_commands(&f);
    let cbvs: Vec<(u32, u64)> = commands
        .iter()
        .filter_map(|c| match c {
            Command::SetRootConstantBufferView { root_index, address } => Some((*root_index, *address)),
            _ => None,
        })
        .collect();
    let tables: Vec<u32> = commands
        .iter()
        .filter_map(|c| match c {
            Command::SetRootDescriptorTable { root_index, .. } => Some(*root_index),
            _ => None,
        })
        .collect();
    let srvs = f
        .probe
        .events()
        .iter()
        .filter(|e| matches!(e, ember::graphics::hal::headless::DeviceEvent::CreateShaderResourceView { .. }))
        .count();

    assert_eq!(cbvs.len(), 1);
    assert_eq!(cbvs[0].0, 0);
    // Texture table then its sampler table.
    assert_eq!(tables, vec![1, 2]);
    assert_eq!(srvs, 1);

    let scratch = f.ctx.frame(f.ctx.current_frame_index()).unwrap().scratch();
    assert_eq!(scratch.memory_cursor(0), 256);
    assert_eq!(scratch.descriptor_cursor(0), 2);
    for pool in 1..scratch.pool_count() {
        assert_eq!(scratch.memory_cursor(pool), 0);
    }

    // The committed block holds the program's uniform data.
    let address = cbvs[0].1;
    let memory = f.probe.buffer_contents(RawResource(address >> 32)).unwrap();
    let offset = (address & 0xffff_ffff) as usize;
    assert_eq!(
        &memory[offset..offset + 16],
        bytemuck::bytes_of(&Vec4::new(1.0, 0.5, 0.25, 1.0))
    );

    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_scratch_restarts_each_frame() {
    let mut f = fixture();
    let program = textured_program(&mut f.ctx);
    let texture = rgba_texture(&mut f.ctx, 2, 2);
    prepare(&mut f, program);
    f.ctx.enable_texture(0, texture).unwrap();

    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    f.ctx.draw(PrimitiveType::Triangles, 3, 3).unwrap();
    let slot = f.ctx.current_frame_index();
    assert_eq!(f.ctx.frame(slot).unwrap().scratch().memory_cursor(0), 512);
    f.ctx.end_frame().unwrap();

    // Both slots again: the same slot restarts from its base.
    for _ in 0..f.ctx.frame_count() {
        f.ctx.begin_frame().unwrap();
        f.ctx.enable_texture(0, texture).unwrap();
        f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
        let current = f.ctx.current_frame_index();
        assert_eq!(f.ctx.frame(current).unwrap().scratch().memory_cursor(0), 256);
        f.ctx.end_frame().unwrap();
    }
}

#[test]
fn draw_missing_texture_is_skipped() {
    let mut f = fixture();
    let program = textured_program(&mut f.ctx);
    prepare(&mut f, program);

    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    let tables = frame_commands(&f)
        .iter()
        .filter(|c| matches!(c, Command::SetRootDescriptorTable { .. }))
        .count();
    assert_eq!(tables, 0);
    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_set_sampler_selects_unit() {
    let mut f = fixture();
    let program = textured_program(&mut f.ctx);
    let texture = rgba_texture(&mut f.ctx, 2, 2);
    prepare(&mut f, program);
    f.ctx.enable_texture(3, texture).unwrap();

    let sampler = f.ctx.get_uniform_location(program, "texture_sampler").unwrap();
    f.ctx.set_sampler(sampler, 3).unwrap();
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();

    let slot = f.ctx.current_frame_index();
    assert_eq!(f.ctx.frame(slot).unwrap().scratch().descriptor_cursor(0), 2);
    f.ctx.end_frame().unwrap();
}

// ============================================================================
// Geometry
// ============================================================================

#[test]
fn draw_binds_vertex_buffer_with_declared_stride() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    prepare(&mut f, program);
    f.ctx.draw(PrimitiveType::Triangles, 0, 4).unwrap();

    let views: Vec<VertexBufferView> = frame_commands(&f)
        .into_iter()
        .find_map(|c| match c {
            Command::SetVertexBuffers { start_slot: 0, views } => Some(views),
            _ => None,
        })
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].stride_in_bytes, 20);
    assert_eq!(views[0].size_in_bytes, 80);

    assert!(frame_commands(&f).contains(&Command::Draw {
        vertex_count: 4,
        instance_count: 1,
        start_vertex: 0,
        start_instance: 0,
    }));
    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_elements_converts_byte_offset() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
    let ib = f.ctx.new_index_buffer(bytemuck::cast_slice(&indices)).unwrap();
    prepare(&mut f, program);

    f.ctx
        .draw_elements(PrimitiveType::Triangles, 6, 3, IndexType::U16, ib)
        .unwrap();

    let commands = frame_commands(&f);
    let view = commands
        .iter()
        .find_map(|c| match c {
            Command::SetIndexBuffer(view) => Some(*view),
            _ => None,
        })
        .unwrap();
    assert_eq!(view.format, wgpu::IndexFormat::Uint16);
    assert_eq!(view.size_in_bytes, 12);
    assert!(commands.contains(&Command::DrawIndexed {
        index_count: 3,
        instance_count: 1,
        start_index: 3,
        base_vertex: 0,
        start_instance: 0,
    }));

    f.ctx
        .draw_elements(PrimitiveType::Triangles, 8, 1, IndexType::U32, ib)
        .unwrap();
    assert!(frame_commands(&f).iter().any(|c| matches!(
        c,
        Command::DrawIndexed { start_index: 2, .. }
    )));
    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_line_topology() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    prepare(&mut f, program);

    f.ctx.draw(PrimitiveType::Lines, 0, 2).unwrap();
    f.ctx.draw(PrimitiveType::TriangleStrip, 0, 4).unwrap();
    let topologies: Vec<wgpu::PrimitiveTopology> = frame_commands(&f)
        .iter()
        .filter_map(|c| match c {
            Command::SetPrimitiveTopology(t) => Some(*t),
            _ => None,
        })
        .collect();
    assert_eq!(
        topologies,
        vec![wgpu::PrimitiveTopology::LineList, wgpu::PrimitiveTopology::TriangleStrip]
    );
    // Line and triangle pipelines differ.
    assert_eq!(f.ctx.pipeline_cache().len(), 2);
    f.ctx.end_frame().unwrap();
}

// ============================================================================
// Viewport & Scissor
// ============================================================================

#[test]
fn draw_applies_viewport_lazily() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    prepare(&mut f, program);

    let count_viewports = |f: &Fixture| {
        frame_commands(f)
            .iter()
            .filter(|c| matches!(c, Command::SetViewport(_)))
            .count()
    };

    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(count_viewports(&f), 1);
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(count_viewports(&f), 1);

    f.ctx.set_viewport(0, 0, 100, 100);
    assert_eq!(count_viewports(&f), 1);
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(count_viewports(&f), 2);
    f.ctx.end_frame().unwrap();

    // A new frame starts from a reset list.
    f.ctx.begin_frame().unwrap();
    f.ctx.enable_program(program).unwrap();
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(count_viewports(&f), 1);
    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_scissor_follows_enable_state() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    prepare(&mut f, program);

    let last_scissor = |f: &Fixture| {
        frame_commands(f)
            .iter()
            .rev()
            .find_map(|c| match c {
                Command::SetScissorRect(rect) => Some(*rect),
                _ => None,
            })
            .unwrap()
    };

    f.ctx.set_scissor(10, 10, 20, 20);
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(
        last_scissor(&f),
        ScissorRect { left: 0, top: 0, right: common::WIDTH as i32, bottom: common::HEIGHT as i32 }
    );

    f.ctx.enable_state(State::ScissorTest);
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
    assert_eq!(last_scissor(&f), ScissorRect { left: 10, top: 10, right: 30, bottom: 30 });
    f.ctx.end_frame().unwrap();
}

// ============================================================================
// Preconditions
// ============================================================================

#[test]
fn draw_requires_bound_program() {
    let mut f = fixture();
    f.ctx.begin_frame().unwrap();
    assert!(matches!(
        f.ctx.draw(PrimitiveType::Triangles, 0, 3),
        Err(GraphicsError::NoProgramBound)
    ));
    assert!(matches!(
        f.ctx.set_constant_v4(UniformLocation::INVALID, &[Vec4::ZERO]),
        Err(GraphicsError::NoProgramBound)
    ));
    f.ctx.end_frame().unwrap();
}

#[test]
fn draw_requires_open_pass() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    f.ctx.enable_program(program).unwrap();
    assert!(matches!(
        f.ctx.draw(PrimitiveType::Triangles, 0, 3),
        Err(GraphicsError::InvalidFrameState { operation: "draw", actual: FrameState::Idle })
    ));
}

#[test]
fn draw_unknown_uniform_location_is_invalid() {
    let mut f = fixture();
    let program = textured_program(&mut f.ctx);
    let missing = f
        .ctx
        .get_uniform_location_by_hash(program, NameHash::new("nope"))
        .unwrap();
    assert!(!missing.is_valid());
    f.ctx.enable_program(program).unwrap();
    assert!(f.ctx.set_constant_v4(missing, &[Vec4::ONE]).is_err());
}

#[test]
#[should_panic(expected = "fatal graphics error")]
fn draw_pipeline_failure_is_fatal() {
    let mut f = fixture();
    let program = plain_program(&mut f.ctx);
    prepare(&mut f, program);
    f.probe.fail_next_pipeline("shader bytecode rejected");
    let _ = f.ctx.draw(PrimitiveType::Triangles, 0, 3);
}
