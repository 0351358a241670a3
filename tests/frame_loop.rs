//! Frame loop integration tests.
//!
//! These drive the public renderer API end to end on the null backend,
//! which executes submissions in host memory and keeps the counters the
//! assertions read back.
//!
//! ```bash
//! cargo test --test frame_loop
//! ```

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{init_logging, populated_renderer, spied_renderer, test_config};
use render_core::backend::QueueKind;
use render_core::resources::{MaterialDescriptor, MeshData};
use render_core::scene::RenderObject;
use render_core::{RenderError, Renderer};

// ============================================================================
// Frame Pacing
// ============================================================================

/// A sustained loop must rotate through every slot in order and reclaim
/// each slot's previous submission before reusing it.
///
/// This test verifies:
/// 1. Slot indices cycle modulo the ring size
/// 2. Fence values grow by one per frame, starting at 1
/// 3. Once the ring wraps, each frame reclaims the value submitted on the
///    same slot one full ring earlier
#[rstest]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
#[case::quadruple_buffered(4)]
fn sustained_loop_reclaims_slots_in_order(#[case] frames_in_flight: usize) {
    let (mut renderer, spy) = spied_renderer(frames_in_flight);

    const FRAMES: u64 = 12;
    for frame in 0..FRAMES {
        let report = renderer.render_frame().expect("frame");
        assert_eq!(report.frame_number, frame);
        assert_eq!(report.slot_index, (frame as usize) % frames_in_flight);
        assert_eq!(report.fence_value, Some(frame + 1));
        let expected_reclaim =
            (frame >= frames_in_flight as u64).then(|| frame - frames_in_flight as u64 + 1);
        assert_eq!(report.reclaimed_fence_value, expected_reclaim);
        assert!(report.presented);
    }

    assert_eq!(renderer.frame_number(), FRAMES);
    assert_eq!(spy.submit_count(QueueKind::Graphics), FRAMES as usize);
    assert_eq!(spy.present_count(), FRAMES as u32);
    assert_eq!(spy.acquire_count(), FRAMES as u32);
}

/// A slot fence that never signals must surface as a device timeout once
/// every slot is in flight, not hang the loop.
#[test]
fn stuck_fence_reports_device_timeout() {
    let (mut renderer, spy) = spied_renderer(2);
    spy.set_auto_signal(false);

    renderer.render_frame().expect("first slot");
    renderer.render_frame().expect("second slot");

    let err = renderer.render_frame().expect_err("first slot reuse");
    assert_eq!(err, RenderError::DeviceTimeout);
    assert!(err.is_fatal());
}

// ============================================================================
// Resource Loading During the Loop
// ============================================================================

/// A loaded scene is drawn once per object per frame, and all of its mesh
/// data went up through a single transfer submission.
#[test]
fn loaded_scene_draws_every_object_each_frame() {
    let (mut renderer, spy, _handles) = populated_renderer(2);
    assert_eq!(spy.submit_count(QueueKind::Transfer), 1);

    for _ in 0..6 {
        renderer.render_frame().expect("frame");
    }
    assert_eq!(spy.draw_count(), 12);
}

/// Meshes and materials can be loaded while the loop is running; new
/// objects show up in the next frame's draws.
#[test]
fn resources_load_between_frames() {
    let (mut renderer, spy) = spied_renderer(2);
    let triangle = renderer.load_mesh(&MeshData::triangle()).expect("mesh");
    let flat = renderer
        .load_material(&MaterialDescriptor::unlit("flat"))
        .expect("material");
    renderer.finish_loading().expect("uploads");
    renderer
        .scene_mut()
        .add_object(RenderObject::new(triangle, flat));

    for _ in 0..2 {
        renderer.render_frame().expect("frame");
    }
    assert_eq!(spy.draw_count(), 2);

    let cube = renderer
        .load_mesh(&MeshData::cube(Vec3::new(0.2, 0.9, 0.4)))
        .expect("mesh");
    renderer.finish_loading().expect("uploads");
    renderer
        .scene_mut()
        .add_object(RenderObject::new(cube, flat).with_position(Vec3::new(1.5, 0.0, 0.0)));
    assert_eq!(spy.submit_count(QueueKind::Transfer), 2);

    for _ in 0..2 {
        renderer.render_frame().expect("frame");
    }
    assert_eq!(spy.draw_count(), 6);
}

// ============================================================================
// Surface Lifecycle
// ============================================================================

/// Resizing between frames must not disturb pacing: fence values keep
/// growing and the loop continues on the new surface.
#[test]
fn resize_between_frames_keeps_the_fence_sequence() {
    let (mut renderer, spy) = spied_renderer(2);
    for _ in 0..3 {
        renderer.render_frame().expect("frame");
    }

    renderer.resize(800, 600).expect("resize");
    assert_eq!(spy.resize_count(), 1);
    assert_eq!(renderer.config().width, 800);

    for frame in 3..6u64 {
        let report = renderer.render_frame().expect("frame");
        assert_eq!(report.fence_value, Some(frame + 1));
    }
    assert_eq!(renderer.frame_number(), 6);
}

/// An out-of-date surface at acquire skips exactly one frame. The loop
/// recovers on its own and the skipped frame is not counted.
#[test]
fn out_of_date_surface_recovery_mid_loop() {
    let (mut renderer, spy, _handles) = populated_renderer(2);
    renderer.render_frame().expect("frame");

    spy.inject_acquire_error(RenderError::SurfaceOutOfDate);
    let skipped = renderer.render_frame().expect("recovered frame");
    assert!(!skipped.presented);
    assert_eq!(skipped.fence_value, None);
    assert_eq!(spy.resize_count(), 1);

    let report = renderer.render_frame().expect("frame");
    assert!(report.presented);
    assert_eq!(report.frame_number, 1);
    assert_eq!(renderer.frame_number(), 2);
    assert_eq!(spy.present_count(), 2);
}

// ============================================================================
// Teardown
// ============================================================================

/// The headless constructor runs the whole loop with no window attached.
#[test]
fn headless_renderer_runs_and_shuts_down() {
    init_logging();
    let mut renderer = Renderer::headless(test_config(3)).expect("headless renderer");
    for frame in 0..5u64 {
        let report = renderer.render_frame().expect("frame");
        assert_eq!(report.frame_number, frame);
        assert!(report.presented);
    }
    renderer.shutdown().expect("shutdown");
}

/// Dropping a renderer mid-flight must release every backend resource,
/// with no unknown destroys along the way.
#[test]
fn teardown_after_sustained_load_releases_everything() {
    let (mut renderer, spy, _handles) = populated_renderer(3);
    for _ in 0..7 {
        renderer.render_frame().expect("frame");
    }
    drop(renderer);

    assert_eq!(spy.live_resource_count(), 0);
    assert_eq!(spy.unknown_destroy_count(), 0);
}
