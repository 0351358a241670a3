//! The renderer: frame loop, resource loading, and teardown.

use crate::backend::{
    BufferDescriptor, BufferUsage, DeletionRecord, GpuTexture, GraphicsBackend, PipelineDescriptor,
    QueueKind, TextureDescriptor, TextureFormat, TextureUsage,
};
use crate::error::{RenderError, RenderResult};
use crate::frame::FrameSlotRing;
use crate::resources::{
    DeferredDeletionQueue, GpuMaterial, GpuMesh, MaterialDescriptor, MaterialIndex, MeshData,
    MeshIndex, Registry, StagedUploadBuffer,
};
use crate::scene::{Scene, SceneUniform};
use crate::shader;
use crate::RendererConfig;

/// Where the frame loop currently stands. After a successful frame the
/// state is back at `Idle`; when `render_frame` returns an error the state
/// names the stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameBegin,
    Recording,
    Submitted,
    Presenting,
}

/// What one `render_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub slot_index: usize,
    /// Fence value the slot wait reclaimed, if the slot was still pending.
    pub reclaimed_fence_value: Option<u64>,
    /// Fence value attached to this frame's submission; `None` when the
    /// frame was skipped before submitting.
    pub fence_value: Option<u64>,
    pub presented: bool,
}

/// Owns the backend and every GPU resource, and drives the frame loop.
///
/// Dropping the renderer without calling [`shutdown`](Self::shutdown)
/// tears everything down best-effort.
pub struct Renderer {
    backend: Box<dyn GraphicsBackend>,
    config: RendererConfig,
    ring: FrameSlotRing,
    deletion_queue: DeferredDeletionQueue,
    uploader: StagedUploadBuffer,
    meshes: Registry<MeshIndex, GpuMesh>,
    materials: Registry<MaterialIndex, GpuMaterial>,
    depth: GpuTexture,
    scene: Scene,
    state: FrameState,
    frame_number: u64,
    shut_down: bool,
}

impl Renderer {
    /// Build a renderer presenting to a window, selecting the backend
    /// from the configuration.
    pub fn new(
        config: RendererConfig,
        window: std::sync::Arc<winit::window::Window>,
    ) -> RenderResult<Self> {
        let backend = crate::backend::create_backend(&config, window)?;
        Self::with_backend(backend, config)
    }

    /// Build a renderer with no window or device, backed by the null
    /// backend. Frames run through the full loop without touching a GPU.
    pub fn headless(config: RendererConfig) -> RenderResult<Self> {
        let backend = crate::backend::NullBackend::with_surface_size(config.width, config.height);
        Self::with_backend(Box::new(backend), config)
    }

    /// Build a renderer on an already constructed backend.
    pub fn with_backend(
        mut backend: Box<dyn GraphicsBackend>,
        config: RendererConfig,
    ) -> RenderResult<Self> {
        config.validate()?;
        let ring = FrameSlotRing::new(
            backend.as_mut(),
            config.frames_in_flight,
            std::mem::size_of::<SceneUniform>() as u64,
        )?;
        let uploader = StagedUploadBuffer::new(backend.as_mut())?;
        let (width, height) = backend.surface_size();
        let depth = Self::create_depth_target(backend.as_mut(), width, height)?;
        log::info!(
            "renderer ready on {} backend, {}x{}, {} frames in flight",
            backend.name(),
            width,
            height,
            config.frames_in_flight
        );
        Ok(Self {
            backend,
            config,
            ring,
            deletion_queue: DeferredDeletionQueue::new(),
            uploader,
            meshes: Registry::new(),
            materials: Registry::new(),
            depth,
            scene: Scene::new(),
            state: FrameState::Idle,
            frame_number: 0,
            shut_down: false,
        })
    }

    fn create_depth_target(
        backend: &mut dyn GraphicsBackend,
        width: u32,
        height: u32,
    ) -> RenderResult<GpuTexture> {
        backend.create_texture(
            &TextureDescriptor::new(
                width,
                height,
                TextureFormat::Depth32Float,
                TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label("depth target"),
        )
    }

    // --- Resource loading ---

    /// Create device buffers for a mesh and stage its data for upload.
    /// Nothing reaches the device until [`finish_loading`](Self::finish_loading).
    pub fn load_mesh(&mut self, data: &MeshData) -> RenderResult<MeshIndex> {
        let vertex_buffer = self.uploader.upload(
            self.backend.as_mut(),
            &BufferDescriptor::new(
                data.vertex_bytes().len() as u64,
                BufferUsage::VERTEX | BufferUsage::COPY_DST,
            )
            .with_label(format!("{} vertices", data.name)),
            data.vertex_bytes(),
        )?;
        let index_buffer = self.uploader.upload(
            self.backend.as_mut(),
            &BufferDescriptor::new(
                data.index_bytes().len() as u64,
                BufferUsage::INDEX | BufferUsage::COPY_DST,
            )
            .with_label(format!("{} indices", data.name)),
            data.index_bytes(),
        )?;
        let index = self.meshes.insert(
            &data.name,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: data.index_count() as u32,
            },
        );
        log::debug!(
            "mesh '{}' staged ({} vertices, {} indices)",
            data.name,
            data.vertex_count(),
            data.index_count()
        );
        Ok(index)
    }

    /// Compile a material's shader and build its pipeline.
    pub fn load_material(&mut self, descriptor: &MaterialDescriptor) -> RenderResult<MaterialIndex> {
        let compiled = shader::compile(&descriptor.shader)?;
        let vertex_shader = self.backend.create_shader_module(&compiled.vertex_spirv)?;
        let fragment_shader = self.backend.create_shader_module(&compiled.fragment_spirv)?;
        let pipeline = self.backend.create_pipeline(&PipelineDescriptor {
            label: Some(descriptor.name.clone()),
            vertex_shader,
            fragment_shader,
            depth_test: descriptor.depth_test,
        })?;
        let index = self.materials.insert(
            &descriptor.name,
            GpuMaterial {
                vertex_shader,
                fragment_shader,
                pipeline,
            },
        );
        log::debug!("material '{}' ready", descriptor.name);
        Ok(index)
    }

    /// Submit all staged uploads and wait for the transfer queue to drain.
    pub fn finish_loading(&mut self) -> RenderResult<usize> {
        let flushed = self.uploader.flush_pending_uploads(self.backend.as_mut())?;
        if flushed > 0 {
            log::info!("uploaded {} staged buffers", flushed);
        }
        Ok(flushed)
    }

    /// Queue a resource for destruction at the next safe point.
    pub fn defer_destroy(&mut self, record: DeletionRecord) {
        self.deletion_queue.push(record);
    }

    // --- Frame loop ---

    /// Run one frame: claim the slot, record the scene, submit, present.
    ///
    /// A surface that has gone out of date is handled here: the swapchain
    /// and depth target are rebuilt and the frame reports itself skipped.
    /// Every other error propagates to the caller.
    pub fn render_frame(&mut self) -> RenderResult<FrameReport> {
        if self.shut_down {
            return Err(RenderError::InvalidParameter(
                "render_frame after shutdown".into(),
            ));
        }
        if self.uploader.pending_count() > 0 {
            log::warn!(
                "{} staged uploads still pending at frame start, flushing now",
                self.uploader.pending_count()
            );
            self.uploader.flush_pending_uploads(self.backend.as_mut())?;
        }

        self.state = FrameState::FrameBegin;
        let begin = self.ring.begin_frame(
            self.backend.as_mut(),
            self.frame_number,
            self.config.fence_timeout_ns,
        )?;
        let mut report = FrameReport {
            frame_number: self.frame_number,
            slot_index: begin.slot_index,
            reclaimed_fence_value: begin.reclaimed_value,
            fence_value: None,
            presented: false,
        };

        // The slot's previous submission is observed complete, so every
        // deferred destruction up to now is safe to run.
        let destroyed = self.deletion_queue.flush(self.backend.as_mut());
        if destroyed > 0 {
            log::trace!("frame {}: released {} resources", self.frame_number, destroyed);
        }

        let (recorder, image_acquired, render_complete, uniform_buffer) = {
            let slot = self.ring.current_slot(self.frame_number);
            (
                slot.recorder,
                slot.image_acquired,
                slot.render_complete,
                slot.uniform_buffer,
            )
        };

        let image_index = match self
            .backend
            .acquire_next_image(image_acquired, self.config.acquire_timeout_ns)
        {
            Ok(index) => index,
            Err(RenderError::SurfaceOutOfDate) => {
                log::warn!("surface out of date at acquire, rebuilding");
                self.rebuild_surface()?;
                self.state = FrameState::Idle;
                return Ok(report);
            }
            Err(e) => return Err(e),
        };

        self.state = FrameState::Recording;
        let uniform = self.scene.uniform();
        self.backend
            .write_buffer(uniform_buffer.handle, 0, bytemuck::bytes_of(&uniform))?;

        let backend = self.backend.as_mut();
        backend.begin_recording(recorder)?;
        backend.begin_render_pass(
            recorder,
            image_index,
            self.config.clear_color,
            Some(self.depth.handle),
        )?;
        for object in &self.scene.objects {
            let Some(mesh) = self.meshes.get(object.mesh) else {
                log::warn!("skipping object with unknown mesh {:?}", object.mesh);
                continue;
            };
            let Some(material) = self.materials.get(object.material) else {
                log::warn!("skipping object with unknown material {:?}", object.material);
                continue;
            };
            backend.bind_pipeline(recorder, material.pipeline)?;
            backend.bind_scene_uniform(recorder, material.pipeline, uniform_buffer.handle)?;
            backend.push_constants(
                recorder,
                material.pipeline,
                bytemuck::bytes_of(&object.push_constants()),
            )?;
            backend.bind_vertex_buffer(recorder, mesh.vertex_buffer.handle)?;
            backend.bind_index_buffer(recorder, mesh.index_buffer.handle)?;
            backend.draw_indexed(recorder, mesh.index_count)?;
        }
        backend.end_render_pass(recorder)?;
        backend.end_recording(recorder)?;

        self.state = FrameState::Submitted;
        backend.submit(
            QueueKind::Graphics,
            recorder,
            &[image_acquired],
            &[render_complete],
            Some(self.ring.slot_fence(self.frame_number)),
        )?;
        let fence_value = self.ring.mark_submitted(self.frame_number);
        report.fence_value = Some(fence_value);
        log::trace!(
            "frame {} submitted on slot {} with fence value {}",
            self.frame_number,
            report.slot_index,
            fence_value
        );

        self.state = FrameState::Presenting;
        match self.backend.present(render_complete, image_index) {
            Ok(()) => report.presented = true,
            Err(RenderError::SurfaceOutOfDate) => {
                // The submission went through, so the frame still counts.
                log::warn!("surface out of date at present, rebuilding");
                self.frame_number += 1;
                self.rebuild_surface()?;
                self.state = FrameState::Idle;
                return Ok(report);
            }
            Err(e) => return Err(e),
        }

        self.frame_number += 1;
        self.state = FrameState::Idle;
        Ok(report)
    }

    /// Resize the surface and rebuild the depth target to match.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            log::debug!("ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        self.config.width = width;
        self.config.height = height;
        self.backend.resize(width, height)?;
        // The backend idles the device during resize, so all deferred
        // destructions are safe immediately.
        self.deletion_queue.push(DeletionRecord::texture(&self.depth));
        self.deletion_queue.flush(self.backend.as_mut());
        self.depth = Self::create_depth_target(self.backend.as_mut(), width, height)?;
        log::debug!("resized to {}x{}", width, height);
        Ok(())
    }

    fn rebuild_surface(&mut self) -> RenderResult<()> {
        let (width, height) = (self.config.width, self.config.height);
        self.resize(width, height)
    }

    /// Drain each queue and then the whole device, then release every
    /// owned resource.
    ///
    /// The transfer and graphics queues are distinct hardware queues and
    /// must drain independently before the device-wide wait. Safe to call
    /// more than once; later calls are no-ops. The renderer rejects further
    /// frames afterwards.
    pub fn shutdown(&mut self) -> RenderResult<()> {
        if self.shut_down {
            log::debug!("shutdown called again, ignoring");
            return Ok(());
        }
        log::info!("renderer shutting down after {} frames", self.frame_number);
        self.backend.queue_wait_idle(QueueKind::Transfer)?;
        self.backend.queue_wait_idle(QueueKind::Graphics)?;
        self.backend.device_wait_idle()?;

        // Push in creation order; the queue destroys in reverse.
        self.ring.destroy_into(&mut self.deletion_queue);
        self.uploader.destroy_into(&mut self.deletion_queue);
        self.deletion_queue.push(DeletionRecord::texture(&self.depth));
        for (_, mesh) in self.meshes.iter() {
            self.deletion_queue.push(DeletionRecord::buffer(&mesh.vertex_buffer));
            self.deletion_queue.push(DeletionRecord::buffer(&mesh.index_buffer));
        }
        for (_, material) in self.materials.iter() {
            self.deletion_queue.push(DeletionRecord::shader(material.vertex_shader));
            self.deletion_queue.push(DeletionRecord::shader(material.fragment_shader));
            self.deletion_queue.push(DeletionRecord::pipeline(material.pipeline));
        }
        let destroyed = self.deletion_queue.flush(self.backend.as_mut());
        log::info!("released {} resources", destroyed);
        self.shut_down = true;
        Ok(())
    }

    // --- Accessors ---

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn mesh(&self, index: MeshIndex) -> Option<&GpuMesh> {
        self.meshes.get(index)
    }

    pub fn material(&self, index: MaterialIndex) -> Option<&GpuMaterial> {
        self.materials.get(index)
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.shutdown() {
                log::error!("shutdown during drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::scene::RenderObject;
    use crate::BackendType;
    use glam::Vec3;

    fn test_config() -> RendererConfig {
        RendererConfig {
            backend: BackendType::Null,
            ..RendererConfig::default()
        }
    }

    fn test_renderer() -> (Renderer, NullBackend) {
        let backend = NullBackend::with_surface_size(640, 480);
        let spy = backend.clone();
        let renderer = Renderer::with_backend(Box::new(backend), test_config()).unwrap();
        (renderer, spy)
    }

    fn loaded_renderer() -> (Renderer, NullBackend, MeshIndex, MaterialIndex) {
        let (mut renderer, spy) = test_renderer();
        let mesh = renderer.load_mesh(&MeshData::triangle()).unwrap();
        let material = renderer
            .load_material(&MaterialDescriptor::unlit("flat"))
            .unwrap();
        renderer.finish_loading().unwrap();
        (renderer, spy, mesh, material)
    }

    #[test]
    fn five_frames_on_two_slots_reclaim_in_order() {
        let (mut renderer, spy) = test_renderer();

        let mut observed = Vec::new();
        for _ in 0..5 {
            let report = renderer.render_frame().unwrap();
            assert!(report.presented);
            observed.push((report.slot_index, report.reclaimed_fence_value));
        }

        assert_eq!(
            observed,
            vec![
                (0, None),
                (1, None),
                (0, Some(1)),
                (1, Some(2)),
                (0, Some(3)),
            ]
        );
        assert_eq!(renderer.frame_number(), 5);
        assert_eq!(spy.submit_count(QueueKind::Graphics), 5);
        assert_eq!(spy.present_count(), 5);
    }

    #[test]
    fn fence_values_grow_monotonically_across_frames() {
        let (mut renderer, _spy) = test_renderer();
        for expected in 1u64..=4 {
            let report = renderer.render_frame().unwrap();
            assert_eq!(report.fence_value, Some(expected));
        }
    }

    #[test]
    fn submission_waits_acquire_and_signals_present() {
        let (mut renderer, spy) = test_renderer();
        renderer.render_frame().unwrap();

        let submissions = spy.submissions();
        assert_eq!(submissions.len(), 1);
        let submission = &submissions[0];
        let slot = renderer.ring.current_slot(0);
        assert_eq!(submission.queue, QueueKind::Graphics);
        assert_eq!(submission.wait, vec![slot.image_acquired]);
        assert_eq!(submission.signal, vec![slot.render_complete]);
        assert_eq!(submission.fence, Some(renderer.ring.slot_fence(0)));
    }

    #[test]
    fn scene_objects_are_drawn_with_their_mesh() {
        let (mut renderer, spy, mesh, material) = loaded_renderer();
        renderer
            .scene_mut()
            .add_object(RenderObject::new(mesh, material));
        renderer.scene_mut().add_object(
            RenderObject::new(mesh, material).with_position(Vec3::new(1.0, 0.0, 0.0)),
        );

        renderer.render_frame().unwrap();
        assert_eq!(spy.draw_count(), 2);
    }

    #[test]
    fn objects_with_stale_indices_are_skipped() {
        let (mut renderer, spy, mesh, material) = loaded_renderer();
        renderer
            .scene_mut()
            .add_object(RenderObject::new(MeshIndex(99), material));
        renderer
            .scene_mut()
            .add_object(RenderObject::new(mesh, MaterialIndex(99)));

        let report = renderer.render_frame().unwrap();
        assert!(report.presented);
        assert_eq!(spy.draw_count(), 0);
    }

    #[test]
    fn frame_uniform_carries_the_scene_view_projection() {
        let (mut renderer, spy) = test_renderer();
        renderer
            .scene_mut()
            .look_at(Vec3::new(0.0, 1.0, 3.0), Vec3::ZERO, 4.0 / 3.0);
        let expected = renderer.scene().uniform();

        renderer.render_frame().unwrap();

        let uniform_buffer = renderer.ring.current_slot(0).uniform_buffer;
        let bytes = spy
            .read_buffer(uniform_buffer.handle, 0, uniform_buffer.size)
            .unwrap();
        assert_eq!(bytes, bytemuck::bytes_of(&expected));
    }

    #[test]
    fn mesh_data_reaches_device_buffers_after_finish_loading() {
        let (mut renderer, spy) = test_renderer();
        let data = MeshData::triangle();
        let mesh = renderer.load_mesh(&data).unwrap();
        assert_eq!(spy.submit_count(QueueKind::Transfer), 0);

        renderer.finish_loading().unwrap();
        assert_eq!(spy.submit_count(QueueKind::Transfer), 1);

        let gpu_mesh = *renderer.mesh(mesh).unwrap();
        let vertices = spy
            .read_buffer(gpu_mesh.vertex_buffer.handle, 0, gpu_mesh.vertex_buffer.size)
            .unwrap();
        assert_eq!(vertices, data.vertex_bytes());
        let indices = spy
            .read_buffer(gpu_mesh.index_buffer.handle, 0, gpu_mesh.index_buffer.size)
            .unwrap();
        assert_eq!(indices, data.index_bytes());
    }

    #[test]
    fn materials_load_from_precompiled_spirv() {
        let (mut renderer, _spy) = test_renderer();
        let crate::shader::ShaderSource::Wgsl(source) = MaterialDescriptor::unlit("x").shader
        else {
            panic!("presets carry WGSL");
        };
        let compiled = shader::compile_wgsl(&source).unwrap();
        let to_bytes =
            |words: &[u32]| -> Vec<u8> { words.iter().flat_map(|w| w.to_le_bytes()).collect() };

        let material = renderer
            .load_material(&MaterialDescriptor::from_spirv(
                "baked",
                to_bytes(&compiled.vertex_spirv),
                to_bytes(&compiled.fragment_spirv),
            ))
            .unwrap();
        assert!(renderer.material(material).is_some());
    }

    #[test]
    fn pending_uploads_flush_before_the_frame_renders() {
        let (mut renderer, spy) = test_renderer();
        let mesh = renderer.load_mesh(&MeshData::triangle()).unwrap();
        let material = renderer
            .load_material(&MaterialDescriptor::unlit("flat"))
            .unwrap();
        renderer
            .scene_mut()
            .add_object(RenderObject::new(mesh, material));

        // finish_loading was skipped; the frame flushes the stragglers.
        renderer.render_frame().unwrap();
        assert_eq!(spy.submit_count(QueueKind::Transfer), 1);
        assert_eq!(spy.draw_count(), 1);
    }

    #[test]
    fn out_of_date_acquire_rebuilds_and_skips_the_frame() {
        let (mut renderer, spy) = test_renderer();
        spy.inject_acquire_error(RenderError::SurfaceOutOfDate);

        let report = renderer.render_frame().unwrap();
        assert!(!report.presented);
        assert_eq!(report.fence_value, None);
        // Nothing was submitted, so the frame number holds.
        assert_eq!(renderer.frame_number(), 0);
        assert_eq!(spy.resize_count(), 1);

        let report = renderer.render_frame().unwrap();
        assert!(report.presented);
        assert_eq!(report.frame_number, 0);
        assert_eq!(renderer.frame_number(), 1);
    }

    #[test]
    fn out_of_date_present_rebuilds_but_counts_the_frame() {
        let (mut renderer, spy) = test_renderer();
        spy.inject_present_error(RenderError::SurfaceOutOfDate);

        let report = renderer.render_frame().unwrap();
        assert!(!report.presented);
        assert_eq!(report.fence_value, Some(1));
        assert_eq!(renderer.frame_number(), 1);
        assert_eq!(spy.resize_count(), 1);
    }

    #[test]
    fn fatal_submit_errors_propagate_with_the_failing_stage() {
        let (mut renderer, spy) = test_renderer();
        spy.inject_submit_error(RenderError::DeviceLost);

        let err = renderer.render_frame().unwrap_err();
        assert_eq!(err, RenderError::DeviceLost);
        assert!(err.is_fatal());
        assert_eq!(renderer.state(), FrameState::Submitted);
    }

    #[test]
    fn resize_rebuilds_the_depth_target() {
        let (mut renderer, spy) = test_renderer();
        let old_depth = renderer.depth.handle;

        renderer.resize(800, 600).unwrap();
        assert_ne!(renderer.depth.handle, old_depth);
        assert_eq!(renderer.depth.width, 800);
        assert_eq!(renderer.depth.height, 600);
        assert!(spy
            .destruction_log()
            .iter()
            .any(|r| r.handle.raw() == old_depth.0));

        renderer.resize(0, 600).unwrap();
        assert_eq!(renderer.config().width, 800);
    }

    #[test]
    fn deferred_destruction_waits_for_the_next_safe_point() {
        let (mut renderer, spy) = test_renderer();
        let scratch = spy
            .clone()
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_DST))
            .unwrap();

        renderer.defer_destroy(DeletionRecord::buffer(&scratch));
        assert!(spy.destruction_log().is_empty());

        renderer.render_frame().unwrap();
        assert!(spy
            .destruction_log()
            .iter()
            .any(|r| r.handle.raw() == scratch.handle.0));
    }

    #[test]
    fn shutdown_releases_every_resource_once() {
        let (mut renderer, spy, mesh, material) = loaded_renderer();
        renderer
            .scene_mut()
            .add_object(RenderObject::new(mesh, material));
        for _ in 0..3 {
            renderer.render_frame().unwrap();
        }

        renderer.shutdown().unwrap();
        assert_eq!(spy.live_resource_count(), 0);
        assert_eq!(spy.unknown_destroy_count(), 0);

        // Idempotent.
        renderer.shutdown().unwrap();
        assert_eq!(spy.unknown_destroy_count(), 0);

        let err = renderer.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }

    #[test]
    fn drop_tears_down_without_explicit_shutdown() {
        let backend = NullBackend::with_surface_size(320, 240);
        let spy = backend.clone();
        {
            let mut renderer =
                Renderer::with_backend(Box::new(backend), test_config()).unwrap();
            renderer.load_mesh(&MeshData::cube(Vec3::ONE)).unwrap();
            renderer.finish_loading().unwrap();
            renderer.render_frame().unwrap();
        }
        assert_eq!(spy.live_resource_count(), 0);
    }
}
