//! Frame Lifecycle Tests
//!
//! Tests for:
//! - FrameController state machine: begin/end frame, render pass reopen, misuse
//! - Fence blocking: begin_frame waits until the slot's previous frame completes
//! - Back-buffer selection: slots follow the swap chain's reported index
//! - Clear and present bookkeeping

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ember::graphics::hal::headless::{Command, DeviceEvent};
use ember::graphics::hal::{Fence, ResourceState, TransitionBarrier};
use ember::graphics::{GraphicsError, RenderTargetId};
use ember::{ClearFlags, ContextParams, FrameState};

use common::{fixture, manual_fence_fixture};

// ============================================================================
// State Machine
// ============================================================================

#[test]
fn frame_begin_opens_main_pass() {
    let mut f = fixture();
    assert_eq!(f.ctx.frame_state(), FrameState::Idle);

    f.ctx.begin_frame().unwrap();
    assert_eq!(f.ctx.frame_state(), FrameState::RenderPassOpen);

    f.ctx.end_frame().unwrap();
    assert_eq!(f.ctx.frame_state(), FrameState::Idle);
    assert_eq!(f.probe.present_count(), 1);
}

#[test]
fn frame_misuse_is_rejected() {
    let mut f = fixture();
    assert!(matches!(
        f.ctx.end_frame(),
        Err(GraphicsError::InvalidFrameState { operation: "end_frame", actual: FrameState::Idle })
    ));

    f.ctx.begin_frame().unwrap();
    assert!(matches!(
        f.ctx.begin_frame(),
        Err(GraphicsError::InvalidFrameState { operation: "begin_frame", .. })
    ));
    f.ctx.end_frame().unwrap();
}

#[test]
fn frame_reopening_bound_target_is_noop() {
    let mut f = fixture();
    f.ctx.begin_frame().unwrap();
    let recorded = f.ctx.command_list().commands().len();

    f.ctx.begin_render_pass(f.ctx.main_render_target()).unwrap();
    assert_eq!(f.ctx.command_list().commands().len(), recorded);

    f.ctx.end_render_pass();
    assert_eq!(f.ctx.frame_state(), FrameState::RenderPassClosed);
    f.ctx.begin_render_pass(RenderTargetId::MAIN).unwrap();
    assert_eq!(f.ctx.frame_state(), FrameState::RenderPassOpen);
    f.ctx.end_frame().unwrap();
}

#[test]
fn frame_back_buffer_transitions() {
    let mut f = fixture();
    f.ctx.begin_frame().unwrap();
    let back_buffer = f.ctx.frame(f.ctx.current_frame_index()).unwrap().render_target();
    f.ctx.end_frame().unwrap();

    let commands = f.probe.last_submission().unwrap();
    let barriers: Vec<TransitionBarrier> = commands
        .iter()
        .filter_map(|c| match c {
            Command::Barrier(barrier) => Some(*barrier),
            _ => None,
        })
        .collect();
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].resource, back_buffer);
    assert_eq!(
        (barriers[0].before, barriers[0].after),
        (ResourceState::Present, ResourceState::RenderTarget)
    );
    assert_eq!(
        (barriers[1].before, barriers[1].after),
        (ResourceState::RenderTarget, ResourceState::Present)
    );
}

#[test]
fn frame_clear_records_color_clear() {
    let mut f = fixture();
    f.ctx.begin_frame().unwrap();
    f.ctx
        .clear(ClearFlags::COLOR | ClearFlags::DEPTH, [0.1, 0.2, 0.3, 1.0], 1.0, 0)
        .unwrap();
    f.ctx.end_frame().unwrap();

    let clears: Vec<[f32; 4]> = f
        .probe
        .last_submission()
        .unwrap()
        .iter()
        .filter_map(|c| match c {
            Command::ClearRenderTarget { color, .. } => Some(*color),
            _ => None,
        })
        .collect();
    assert_eq!(clears, vec![[0.1, 0.2, 0.3, 1.0]]);
}

#[test]
fn frame_clear_outside_pass_fails() {
    let mut f = fixture();
    assert!(f.ctx.clear(ClearFlags::COLOR, [0.0; 4], 1.0, 0).is_err());
    f.ctx.begin_frame().unwrap();
    f.ctx.end_render_pass();
    assert!(f.ctx.clear(ClearFlags::COLOR, [0.0; 4], 1.0, 0).is_err());
    f.ctx.end_frame().unwrap();
}

// ============================================================================
// Fences & Slots
// ============================================================================

#[test]
fn frame_signals_increasing_fence_values() {
    let mut f = fixture();
    for _ in 0..4 {
        f.ctx.begin_frame().unwrap();
        f.ctx.end_frame().unwrap();
    }
    let signals: Vec<u64> = f
        .probe
        .events()
        .iter()
        .filter_map(|e| match e {
            DeviceEvent::Signal { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    // Two slots, each signalled twice.
    assert_eq!(signals, vec![1, 1, 2, 2]);
    assert_eq!(f.ctx.frame(0).unwrap().fence_value(), 2);
    assert_eq!(f.ctx.frame(0).unwrap().fence().completed_value(), 2);
}

#[test]
fn frame_begin_blocks_until_slot_fence_completes() {
    let mut f = manual_fence_fixture(ContextParams {
        frames_in_flight: 2,
        ..Default::default()
    });

    // Fill both slots without letting the GPU finish anything.
    for _ in 0..2 {
        f.ctx.begin_frame().unwrap();
        f.ctx.end_frame().unwrap();
    }
    assert_eq!(f.ctx.frame(0).unwrap().fence().completed_value(), 0);

    let released = Arc::new(AtomicBool::new(false));
    let gpu = {
        let probe = f.probe.clone();
        let released = Arc::clone(&released);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            released.store(true, Ordering::SeqCst);
            probe.complete_all_fences();
        })
    };

    // Slot 0 comes around again and must wait for its first frame.
    f.ctx.begin_frame().unwrap();
    assert!(released.load(Ordering::SeqCst), "begin_frame returned before the fence completed");
    assert_eq!(f.ctx.current_frame_index(), 0);
    gpu.join().unwrap();

    f.ctx.end_frame().unwrap();
    f.probe.complete_all_fences();
}

#[test]
fn frame_slots_follow_reported_back_buffer() {
    let mut f = fixture_with_three_frames();
    f.probe.script_back_buffers(&[2, 0, 1]);

    let mut order = Vec::new();
    for _ in 0..4 {
        f.ctx.begin_frame().unwrap();
        order.push(f.ctx.current_frame_index());
        f.ctx.end_frame().unwrap();
    }
    // Scripted, then round-robin.
    assert_eq!(order, vec![2, 0, 1, 2]);
}

#[test]
fn frame_drain_on_drop_waits_for_submitted_frames() {
    let mut f = manual_fence_fixture(ContextParams::default());
    f.ctx.begin_frame().unwrap();
    f.ctx.end_frame().unwrap();

    let probe = f.probe.clone();
    let gpu = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        probe.complete_all_fences();
    });
    drop(f);
    gpu.join().unwrap();
}

fn fixture_with_three_frames() -> common::Fixture {
    common::fixture_with(
        ember::graphics::hal::headless::HeadlessDevice::new(),
        ContextParams {
            frames_in_flight: 3,
            ..Default::default()
        },
    )
}
