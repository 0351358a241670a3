//! Shared infrastructure for frame loop integration tests.
//!
//! Tests run against the null backend: cloning it shares state, so a test
//! keeps one clone as a spy while the renderer owns the other.

use glam::Vec3;

use render_core::backend::NullBackend;
use render_core::resources::{MaterialDescriptor, MaterialIndex, MeshData, MeshIndex};
use render_core::scene::RenderObject;
use render_core::{BackendType, Renderer, RendererConfig};

/// Install the test logger once. `RUST_LOG=trace` shows the frame trail.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A configuration sized for tests: small surface, short fence deadline so
/// a stuck fence fails the test in milliseconds instead of seconds.
pub fn test_config(frames_in_flight: usize) -> RendererConfig {
    RendererConfig {
        title: "frame loop test".to_string(),
        width: 640,
        height: 480,
        backend: BackendType::Null,
        frames_in_flight,
        fence_timeout_ns: 50_000_000,
        acquire_timeout_ns: 50_000_000,
        ..RendererConfig::default()
    }
}

/// Renderer on a fresh null backend, plus a spy clone for assertions.
pub fn spied_renderer(frames_in_flight: usize) -> (Renderer, NullBackend) {
    init_logging();
    let backend = NullBackend::with_surface_size(640, 480);
    let spy = backend.clone();
    let renderer = Renderer::with_backend(Box::new(backend), test_config(frames_in_flight))
        .expect("renderer construction");
    (renderer, spy)
}

/// A renderer with a triangle and a cube loaded, one lit and one unlit
/// material built, and one object of each in the scene.
#[allow(dead_code)]
pub fn populated_renderer(
    frames_in_flight: usize,
) -> (Renderer, NullBackend, Vec<(MeshIndex, MaterialIndex)>) {
    let (mut renderer, spy) = spied_renderer(frames_in_flight);

    let triangle = renderer
        .load_mesh(&MeshData::triangle())
        .expect("triangle upload");
    let cube = renderer
        .load_mesh(&MeshData::cube(Vec3::new(0.8, 0.3, 0.2)))
        .expect("cube upload");
    let unlit = renderer
        .load_material(&MaterialDescriptor::unlit("flat"))
        .expect("unlit material");
    let lit = renderer
        .load_material(&MaterialDescriptor::lit("shaded"))
        .expect("lit material");
    renderer.finish_loading().expect("staged uploads");

    renderer
        .scene_mut()
        .add_object(RenderObject::new(triangle, unlit));
    renderer.scene_mut().add_object(
        RenderObject::new(cube, lit).with_position(Vec3::new(0.0, 0.0, -2.0)),
    );
    renderer
        .scene_mut()
        .look_at(Vec3::new(0.0, 1.5, 4.0), Vec3::ZERO, 640.0 / 480.0);

    (renderer, spy, vec![(triangle, unlit), (cube, lit)])
}
