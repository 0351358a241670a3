//! # Triangle Demo
//!
//! Opens a window and renders a spinning triangle above a cube floor,
//! driving the full frame loop: slot pacing, staged uploads, deferred
//! destruction, and surface rebuilds on resize.
//!
//! ```bash
//! cargo run --example triangle -- --backend wgpu
//! cargo run --example triangle -- --backend vulkan --no-vsync
//! cargo run --example triangle -- --backend null --max-frames 100
//! ```

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use glam::{Mat4, Vec3};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::window::{Window, WindowBuilder};

use render_core::resources::{MaterialDescriptor, MeshData};
use render_core::scene::RenderObject;
use render_core::{BackendType, Renderer, RendererConfig};

/// Graphics backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliBackend {
    /// Cross-platform backend via wgpu.
    #[default]
    Wgpu,
    /// Native Vulkan via ash.
    Vulkan,
    /// No device; the frame loop runs against host memory.
    Null,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Vulkan => BackendType::Vulkan,
            CliBackend::Null => BackendType::Null,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "triangle",
    about = "Spinning geometry on the frames-in-flight renderer",
    version
)]
struct Args {
    /// Graphics backend to use.
    #[arg(long, default_value = "wgpu", value_enum)]
    backend: CliBackend,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    no_vsync: bool,

    /// Number of frames the CPU may record ahead of the GPU.
    #[arg(long, default_value = "2")]
    frames_in_flight: usize,

    /// Exit after rendering N frames (useful for automated testing).
    #[arg(long)]
    max_frames: Option<u64>,
}

fn build_renderer(args: &Args, window: Arc<Window>) -> render_core::RenderResult<Renderer> {
    let size = window.inner_size();
    let config = RendererConfig {
        title: "triangle".to_string(),
        width: size.width.max(1),
        height: size.height.max(1),
        backend: args.backend.into(),
        vsync: !args.no_vsync,
        frames_in_flight: args.frames_in_flight,
        ..RendererConfig::default()
    };
    let mut renderer = Renderer::new(config, window)?;

    let triangle = renderer.load_mesh(&MeshData::triangle())?;
    let floor = renderer.load_mesh(&MeshData::cube(Vec3::new(0.35, 0.35, 0.4)))?;
    let unlit = renderer.load_material(&MaterialDescriptor::unlit("triangle"))?;
    let lit = renderer.load_material(&MaterialDescriptor::lit("floor"))?;
    renderer.finish_loading()?;

    renderer
        .scene_mut()
        .add_object(RenderObject::new(triangle, unlit).with_position(Vec3::new(
            0.0, 0.6, 0.0,
        )));
    renderer.scene_mut().add_object(
        RenderObject::new(floor, lit)
            .with_transform(Mat4::from_scale(Vec3::new(4.0, 0.2, 4.0)))
            .with_position(Vec3::new(0.0, -1.0, 0.0)),
    );
    let aspect = renderer.aspect_ratio();
    renderer
        .scene_mut()
        .look_at(Vec3::new(0.0, 1.5, 4.0), Vec3::ZERO, aspect);
    Ok(renderer)
}

fn redraw(
    renderer: &mut Renderer,
    args: &Args,
    started: Instant,
    elwt: &EventLoopWindowTarget<()>,
) {
    let t = started.elapsed().as_secs_f32();
    renderer.scene_mut().objects[0].transform =
        Mat4::from_translation(Vec3::new(0.0, 0.6, 0.0)) * Mat4::from_rotation_y(t);

    match renderer.render_frame() {
        Ok(report) => {
            if report.frame_number % 600 == 0 {
                log::debug!(
                    "frame {} on slot {} (fence value {:?})",
                    report.frame_number,
                    report.slot_index,
                    report.fence_value
                );
            }
        }
        Err(err) => {
            log::error!("frame failed: {err}");
            if err.is_fatal() {
                elwt.exit();
                return;
            }
        }
    }

    if let Some(max) = args.max_frames {
        if renderer.frame_number() >= max {
            log::info!("rendered {max} frames, exiting");
            elwt.exit();
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("starting triangle demo on {:?} backend", args.backend);

    let event_loop = EventLoop::new().expect("failed to create event loop");
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("render-core triangle")
            .with_inner_size(PhysicalSize::new(args.width, args.height))
            .build(&event_loop)
            .expect("failed to create window"),
    );

    let mut renderer = match build_renderer(&args, Arc::clone(&window)) {
        Ok(renderer) => renderer,
        Err(err) => {
            log::error!("failed to build renderer: {err}");
            return;
        }
    };
    let started = Instant::now();

    let window_clone = Arc::clone(&window);
    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => {
                        log::info!("close requested, exiting");
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        if let Err(err) = renderer.resize(size.width, size.height) {
                            log::error!("resize failed: {err}");
                            elwt.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => redraw(&mut renderer, &args, started, elwt),
                    _ => {}
                },
                Event::AboutToWait => window_clone.request_redraw(),
                _ => {}
            }
        })
        .expect("event loop failed");
}
