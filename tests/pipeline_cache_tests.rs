//! Pipeline Cache Tests
//!
//! Tests for:
//! - Identical state, target, program and layout reuse one compiled pipeline
//! - Each differing input (blend, depth, stencil, cull, program, vertex layout) misses
//! - Compilation failures are never cached

mod common;

use ember::graphics::hal::headless::Command;
use ember::graphics::types::DataType;
use ember::{PrimitiveType, State, VertexStreamDeclaration};

use common::{Fixture, fixture, link, plain_program, quad_declaration, quad_vertices, vertex_meta};

fn setup(f: &mut Fixture) -> ember::graphics::ProgramHandle {
    let program = plain_program(&mut f.ctx);
    let vb = f.ctx.new_vertex_buffer(&quad_vertices()).unwrap();
    let decl = quad_declaration(&mut f.ctx);
    f.ctx.begin_frame().unwrap();
    f.ctx.enable_program(program).unwrap();
    f.ctx.enable_vertex_buffer(vb, 0).unwrap();
    f.ctx.enable_vertex_declaration(decl, 0, program).unwrap();
    program
}

fn draw(f: &mut Fixture) {
    f.ctx.draw(PrimitiveType::Triangles, 0, 3).unwrap();
}

// ============================================================================
// Hits
// ============================================================================

#[test]
fn cache_reuses_pipeline_for_identical_inputs() {
    let mut f = fixture();
    setup(&mut f);
    draw(&mut f);
    draw(&mut f);
    f.ctx.end_frame().unwrap();

    f.ctx.begin_frame().unwrap();
    draw(&mut f);
    f.ctx.end_frame().unwrap();

    assert_eq!(f.probe.pipelines_created(), 1);
    assert_eq!(f.ctx.pipeline_cache().compile_count(), 1);
    assert_eq!(f.ctx.pipeline_cache().len(), 1);

    let pipelines: Vec<_> = f
        .probe
        .submissions()
        .iter()
        .flatten()
        .filter_map(|c| match c {
            Command::SetPipelineState(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(pipelines.len(), 3);
    assert!(pipelines.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn cache_state_round_trip_hits_again() {
    let mut f = fixture();
    setup(&mut f);
    draw(&mut f);
    f.ctx.enable_state(State::Blend);
    draw(&mut f);
    f.ctx.disable_state(State::Blend);
    draw(&mut f);
    f.ctx.end_frame().unwrap();
    assert_eq!(f.probe.pipelines_created(), 2);
}

// ============================================================================
// Misses
// ============================================================================

#[test]
fn cache_misses_on_each_state_change() {
    let mut f = fixture();
    setup(&mut f);
    draw(&mut f);

    f.ctx.set_blend_func(wgpu::BlendFactor::SrcAlpha, wgpu::BlendFactor::OneMinusSrcAlpha);
    draw(&mut f);
    f.ctx.set_depth_func(wgpu::CompareFunction::Greater);
    draw(&mut f);
    f.ctx.set_depth_mask(false);
    draw(&mut f);
    f.ctx.set_color_mask(true, true, true, false);
    draw(&mut f);
    f.ctx.enable_state(State::CullFace);
    draw(&mut f);
    f.ctx.set_face_winding(wgpu::FrontFace::Cw);
    draw(&mut f);
    f.ctx.set_stencil_func(wgpu::CompareFunction::Equal, 1, 0xff);
    draw(&mut f);
    f.ctx.set_stencil_op(
        wgpu::StencilOperation::Keep,
        wgpu::StencilOperation::Keep,
        wgpu::StencilOperation::Replace,
    );
    draw(&mut f);
    f.ctx.set_stencil_mask(0x0f);
    draw(&mut f);
    f.ctx.end_frame().unwrap();

    assert_eq!(f.probe.pipelines_created(), 10);
}

#[test]
fn cache_misses_on_program_change() {
    let mut f = fixture();
    setup(&mut f);
    draw(&mut f);

    let other = link(&mut f.ctx, vertex_meta(), common::textured_fragment_meta());
    f.ctx.enable_program(other).unwrap();
    draw(&mut f);
    f.ctx.end_frame().unwrap();
    assert_eq!(f.probe.pipelines_created(), 2);
}

#[test]
fn cache_misses_on_vertex_layout_change() {
    let mut f = fixture();
    let program = setup(&mut f);
    draw(&mut f);

    // Same streams, padded stride.
    let mut decl = VertexStreamDeclaration::new();
    decl.add_stream("position", 3, DataType::Float, false)
        .add_stream("texcoord0", 2, DataType::Float, false);
    let padded = f.ctx.new_vertex_declaration(&decl, Some(32)).unwrap();
    f.ctx.enable_vertex_declaration(padded, 0, program).unwrap();
    draw(&mut f);
    f.ctx.end_frame().unwrap();

    assert_eq!(f.probe.pipelines_created(), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn cache_does_not_store_failed_compilation() {
    let mut f = fixture();
    setup(&mut f);
    f.probe.fail_next_pipeline("first attempt");

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = f.ctx.draw(PrimitiveType::Triangles, 0, 3);
    }));
    assert!(result.is_err());
    assert!(f.ctx.pipeline_cache().is_empty());

    draw(&mut f);
    assert_eq!(f.ctx.pipeline_cache().len(), 1);
    f.ctx.end_frame().unwrap();
}
