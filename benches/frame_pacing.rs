use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glam::Vec3;
use render_core::backend::{
    BufferDescriptor, BufferUsage, DeletionRecord, GraphicsBackend, NullBackend,
};
use render_core::frame::FenceTimeline;
use render_core::resources::{DeferredDeletionQueue, MaterialDescriptor, MeshData, StagedUploadBuffer};
use render_core::scene::RenderObject;
use render_core::{BackendType, Renderer, RendererConfig, DEFAULT_TIMEOUT_NS};

fn bench_config() -> RendererConfig {
    RendererConfig {
        backend: BackendType::Null,
        ..RendererConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Full frame loop
// ---------------------------------------------------------------------------

fn bench_empty_frame(c: &mut Criterion) {
    let mut renderer = Renderer::headless(bench_config()).unwrap();

    c.bench_function("frame_loop_empty_scene", |b| {
        b.iter(|| {
            black_box(renderer.render_frame().unwrap());
        });
    });
}

fn bench_scene_frame(c: &mut Criterion) {
    let mut renderer = Renderer::headless(bench_config()).unwrap();
    let mesh = renderer.load_mesh(&MeshData::cube(Vec3::ONE)).unwrap();
    let material = renderer
        .load_material(&MaterialDescriptor::lit("bench"))
        .unwrap();
    renderer.finish_loading().unwrap();
    for i in 0..64 {
        let x = (i % 8) as f32 - 3.5;
        let z = (i / 8) as f32 - 3.5;
        renderer.scene_mut().add_object(
            RenderObject::new(mesh, material).with_position(Vec3::new(x * 2.0, 0.0, z * 2.0)),
        );
    }

    c.bench_function("frame_loop_64_objects", |b| {
        b.iter(|| {
            black_box(renderer.render_frame().unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Frame pacing primitives
// ---------------------------------------------------------------------------

fn bench_slot_reclaim(c: &mut Criterion) {
    let mut backend = NullBackend::new();
    let mut timeline = FenceTimeline::new(&mut backend, 2).unwrap();

    c.bench_function("timeline_reclaim_cycle", |b| {
        let mut frame = 0u64;
        b.iter(|| {
            let slot = (frame % 2) as usize;
            timeline
                .wait_until_slot_free(&mut backend, slot, DEFAULT_TIMEOUT_NS)
                .unwrap();
            let value = timeline.mark_submitted(slot);
            backend.signal_fence(timeline.fence(slot));
            frame += 1;
            black_box(value);
        });
    });
}

fn bench_deletion_flush(c: &mut Criterion) {
    let backend = NullBackend::new();
    let mut setup_backend = backend.clone();
    let mut flush_backend = backend;

    c.bench_function("deletion_queue_flush_64", |b| {
        b.iter_with_setup(
            || {
                let mut queue = DeferredDeletionQueue::new();
                for _ in 0..64 {
                    let fence = setup_backend.create_fence(false).unwrap();
                    queue.push(DeletionRecord::fence(fence));
                }
                queue
            },
            |mut queue| {
                black_box(queue.flush(&mut flush_backend));
            },
        );
    });
}

fn bench_staged_upload(c: &mut Criterion) {
    let mut backend = NullBackend::new();
    let mut uploader = StagedUploadBuffer::new(&mut backend).unwrap();
    let descriptor =
        BufferDescriptor::new(64 * 1024, BufferUsage::COPY_DST).with_label("bench target");
    let data = vec![0xa5u8; 64 * 1024];

    c.bench_function("staged_upload_64kb", |b| {
        b.iter(|| {
            let destination = uploader.upload(&mut backend, &descriptor, &data).unwrap();
            black_box(uploader.flush_pending_uploads(&mut backend).unwrap());
            // Keep the live-buffer set bounded across iterations.
            backend.destroy(DeletionRecord::buffer(&destination));
        });
    });
}

criterion_group!(
    benches,
    bench_empty_frame,
    bench_scene_frame,
    bench_slot_reclaim,
    bench_deletion_flush,
    bench_staged_upload,
);
criterion_main!(benches);
