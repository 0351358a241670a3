//! # Headless Demo
//!
//! Runs the frame loop on the null backend with no window or GPU, then
//! prints pacing statistics. Useful for CI and for profiling the CPU side
//! of the loop in isolation.
//!
//! ```bash
//! cargo run --example headless -- --frames 1000 --objects 64
//! ```

use std::time::Instant;

use clap::Parser;
use glam::Vec3;

use render_core::resources::{MaterialDescriptor, MeshData};
use render_core::scene::RenderObject;
use render_core::{BackendType, Renderer, RendererConfig};

#[derive(Parser, Debug)]
#[command(name = "headless", about = "Frame loop without a device", version)]
struct Args {
    /// Number of frames to run.
    #[arg(long, default_value = "1000")]
    frames: u64,

    /// Number of objects in the scene.
    #[arg(long, default_value = "16")]
    objects: usize,

    /// Number of frames the CPU may record ahead of the GPU.
    #[arg(long, default_value = "2")]
    frames_in_flight: usize,
}

fn main() -> render_core::RenderResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = RendererConfig {
        title: "headless".to_string(),
        backend: BackendType::Null,
        frames_in_flight: args.frames_in_flight,
        ..RendererConfig::default()
    };
    let mut renderer = Renderer::headless(config)?;

    let mesh = renderer.load_mesh(&MeshData::cube(Vec3::new(0.7, 0.4, 0.2)))?;
    let material = renderer.load_material(&MaterialDescriptor::lit("headless"))?;
    renderer.finish_loading()?;
    for i in 0..args.objects {
        let offset = Vec3::new((i % 4) as f32 * 1.5, 0.0, (i / 4) as f32 * -1.5);
        renderer
            .scene_mut()
            .add_object(RenderObject::new(mesh, material).with_position(offset));
    }
    let aspect = renderer.aspect_ratio();
    renderer
        .scene_mut()
        .look_at(Vec3::new(4.0, 3.0, 6.0), Vec3::ZERO, aspect);

    log::info!(
        "running {} frames, {} objects, {} slots",
        args.frames,
        args.objects,
        args.frames_in_flight
    );
    let started = Instant::now();
    for _ in 0..args.frames {
        renderer.render_frame()?;
    }
    let elapsed = started.elapsed();

    renderer.shutdown()?;
    log::info!(
        "{} frames in {:.1} ms ({:.2} us per frame)",
        args.frames,
        elapsed.as_secs_f64() * 1e3,
        elapsed.as_secs_f64() * 1e6 / args.frames as f64
    );
    Ok(())
}
