//! Null backend for tests and headless runs.
//!
//! Executes buffer copies in host memory, completes submissions instantly
//! (unless delayed signaling is requested), and keeps a destruction log so
//! tests can observe resource lifetime order. No GPU hardware required.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{RenderError, RenderResult};

use super::traits::GraphicsBackend;
use super::types::*;

/// One emulated fence. The condvar lets a test signal from another thread
/// while the core blocks in `wait_fence`.
struct FenceCell {
    signaled: Mutex<bool>,
    cond: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecorderState {
    Initial,
    Recording,
    Executable,
}

#[derive(Debug, Clone)]
enum RecordedOp {
    CopyBuffer { src: u64, dst: u64, size: u64 },
    BeginPass { image_index: u32 },
    EndPass,
    BindPipeline(u64),
    BindSceneUniform { buffer: u64 },
    PushConstants(usize),
    BindVertexBuffer(u64),
    BindIndexBuffer(u64),
    DrawIndexed(u32),
}

struct NullRecorder {
    queue: QueueKind,
    state: RecorderState,
    ops: Vec<RecordedOp>,
    reset_count: u32,
}

struct NullBuffer {
    data: Vec<u8>,
    usage: BufferUsage,
    size: u64,
}

/// What a submission looked like, for assertions on semaphore/fence wiring.
#[derive(Debug, Clone)]
pub struct SubmitRecord {
    pub queue: QueueKind,
    pub recorder: RecorderHandle,
    pub wait: Vec<SemaphoreHandle>,
    pub signal: Vec<SemaphoreHandle>,
    pub fence: Option<FenceHandle>,
}

#[derive(Default)]
struct Counters {
    acquires: u32,
    presents: u32,
    resizes: u32,
    draws: u64,
    copies: u64,
    unknown_destroys: u32,
}

struct NullInner {
    next_id: u64,
    buffers: HashMap<u64, NullBuffer>,
    textures: HashMap<u64, TextureDescriptor>,
    fences: HashMap<u64, Arc<FenceCell>>,
    semaphores: HashMap<u64, ()>,
    recorders: HashMap<u64, NullRecorder>,
    shaders: HashMap<u64, ()>,
    pipelines: HashMap<u64, ()>,
    surface_size: (u32, u32),
    image_count: u32,
    acquire_cursor: u64,
    auto_signal: bool,
    submissions: Vec<SubmitRecord>,
    destruction_log: Vec<DeletionRecord>,
    counters: Counters,
    inject_acquire: Option<RenderError>,
    inject_present: Option<RenderError>,
    inject_submit: Option<RenderError>,
    inject_create_buffer: Option<RenderError>,
}

/// Host-memory backend. Cloning shares state, so a test can keep one clone
/// as an inspection handle while the renderer owns the other.
#[derive(Clone)]
pub struct NullBackend {
    inner: Arc<Mutex<NullInner>>,
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NullBackend {
    pub fn new() -> Self {
        Self::with_surface_size(1280, 720)
    }

    pub fn with_surface_size(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(NullInner {
                next_id: 1,
                buffers: HashMap::new(),
                textures: HashMap::new(),
                fences: HashMap::new(),
                semaphores: HashMap::new(),
                recorders: HashMap::new(),
                shaders: HashMap::new(),
                pipelines: HashMap::new(),
                surface_size: (width, height),
                image_count: 3,
                acquire_cursor: 0,
                auto_signal: true,
                submissions: Vec::new(),
                destruction_log: Vec::new(),
                counters: Counters::default(),
                inject_acquire: None,
                inject_present: None,
                inject_submit: None,
                inject_create_buffer: None,
            })),
        }
    }

    /// When disabled, submissions leave their fence unsignaled until a test
    /// calls `signal_fence` itself.
    pub fn set_auto_signal(&self, enabled: bool) {
        self.inner.lock().auto_signal = enabled;
    }

    pub fn inject_acquire_error(&self, error: RenderError) {
        self.inner.lock().inject_acquire = Some(error);
    }

    pub fn inject_present_error(&self, error: RenderError) {
        self.inner.lock().inject_present = Some(error);
    }

    pub fn inject_submit_error(&self, error: RenderError) {
        self.inner.lock().inject_submit = Some(error);
    }

    pub fn inject_create_buffer_error(&self, error: RenderError) {
        self.inner.lock().inject_create_buffer = Some(error);
    }

    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.inner.lock().submissions.clone()
    }

    pub fn submit_count(&self, queue: QueueKind) -> usize {
        self.inner
            .lock()
            .submissions
            .iter()
            .filter(|s| s.queue == queue)
            .count()
    }

    pub fn acquire_count(&self) -> u32 {
        self.inner.lock().counters.acquires
    }

    pub fn present_count(&self) -> u32 {
        self.inner.lock().counters.presents
    }

    pub fn resize_count(&self) -> u32 {
        self.inner.lock().counters.resizes
    }

    pub fn draw_count(&self) -> u64 {
        self.inner.lock().counters.draws
    }

    pub fn copy_count(&self) -> u64 {
        self.inner.lock().counters.copies
    }

    pub fn unknown_destroy_count(&self) -> u32 {
        self.inner.lock().counters.unknown_destroys
    }

    pub fn live_buffer_count(&self) -> usize {
        self.inner.lock().buffers.len()
    }

    /// Live objects of every kind, for leak assertions after shutdown.
    pub fn live_resource_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.buffers.len()
            + inner.textures.len()
            + inner.fences.len()
            + inner.semaphores.len()
            + inner.recorders.len()
            + inner.shaders.len()
            + inner.pipelines.len()
    }

    /// Records in the order they were destroyed.
    pub fn destruction_log(&self) -> Vec<DeletionRecord> {
        self.inner.lock().destruction_log.clone()
    }

    pub fn recorder_reset_count(&self, recorder: RecorderHandle) -> u32 {
        self.inner
            .lock()
            .recorders
            .get(&recorder.0)
            .map(|r| r.reset_count)
            .unwrap_or(0)
    }

    fn alloc_id(inner: &mut NullInner) -> u64 {
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    fn fence_cell(&self, fence: FenceHandle) -> RenderResult<Arc<FenceCell>> {
        self.inner
            .lock()
            .fences
            .get(&fence.0)
            .cloned()
            .ok_or_else(|| RenderError::InvalidParameter(format!("unknown fence {:?}", fence)))
    }

    fn execute(inner: &mut NullInner, recorder: u64) -> RenderResult<()> {
        let ops = match inner.recorders.get(&recorder) {
            Some(r) => r.ops.clone(),
            None => {
                return Err(RenderError::InvalidParameter(format!(
                    "unknown recorder {}",
                    recorder
                )))
            }
        };
        for op in ops {
            match op {
                RecordedOp::CopyBuffer { src, dst, size } => {
                    let bytes = match inner.buffers.get(&src) {
                        Some(b) => b.data[..size as usize].to_vec(),
                        None => {
                            return Err(RenderError::InvalidParameter(format!(
                                "copy from unknown buffer {}",
                                src
                            )))
                        }
                    };
                    match inner.buffers.get_mut(&dst) {
                        Some(b) => b.data[..size as usize].copy_from_slice(&bytes),
                        None => {
                            return Err(RenderError::InvalidParameter(format!(
                                "copy into unknown buffer {}",
                                dst
                            )))
                        }
                    }
                    inner.counters.copies += 1;
                }
                RecordedOp::BeginPass { image_index } => {
                    log::trace!("NullBackend: pass on image {}", image_index)
                }
                RecordedOp::EndPass => {}
                RecordedOp::BindPipeline(id) => log::trace!("NullBackend: bind pipeline {}", id),
                RecordedOp::BindSceneUniform { buffer } => {
                    log::trace!("NullBackend: bind scene uniform {}", buffer)
                }
                RecordedOp::PushConstants(len) => {
                    log::trace!("NullBackend: push {} constant bytes", len)
                }
                RecordedOp::BindVertexBuffer(id) => {
                    log::trace!("NullBackend: bind vertex buffer {}", id)
                }
                RecordedOp::BindIndexBuffer(id) => {
                    log::trace!("NullBackend: bind index buffer {}", id)
                }
                RecordedOp::DrawIndexed(count) => {
                    log::trace!("NullBackend: draw {} indices", count);
                    inner.counters.draws += 1;
                }
            }
        }
        Ok(())
    }
}

impl GraphicsBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.inner.lock().surface_size
    }

    fn surface_format(&self) -> TextureFormat {
        TextureFormat::Bgra8Unorm
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        inner.surface_size = (width, height);
        inner.counters.resizes += 1;
        log::trace!("NullBackend: resized to {}x{}", width, height);
        Ok(())
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<FenceHandle> {
        let mut inner = self.inner.lock();
        let id = Self::alloc_id(&mut inner);
        inner.fences.insert(
            id,
            Arc::new(FenceCell {
                signaled: Mutex::new(signaled),
                cond: Condvar::new(),
            }),
        );
        Ok(FenceHandle(id))
    }

    fn wait_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> RenderResult<()> {
        let cell = self.fence_cell(fence)?;
        let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
        let mut signaled = cell.signaled.lock();
        while !*signaled {
            if cell.cond.wait_until(&mut signaled, deadline).timed_out() && !*signaled {
                return Err(RenderError::DeviceTimeout);
            }
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RenderResult<()> {
        let cell = self.fence_cell(fence)?;
        *cell.signaled.lock() = false;
        Ok(())
    }

    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool> {
        let cell = self.fence_cell(fence)?;
        let signaled = *cell.signaled.lock();
        Ok(signaled)
    }

    fn signal_fence(&mut self, fence: FenceHandle) {
        if let Ok(cell) = self.fence_cell(fence) {
            *cell.signaled.lock() = true;
            cell.cond.notify_all();
        }
    }

    fn create_semaphore(&mut self) -> RenderResult<SemaphoreHandle> {
        let mut inner = self.inner.lock();
        let id = Self::alloc_id(&mut inner);
        inner.semaphores.insert(id, ());
        Ok(SemaphoreHandle(id))
    }

    fn create_command_recorder(&mut self, queue: QueueKind) -> RenderResult<RecorderHandle> {
        let mut inner = self.inner.lock();
        let id = Self::alloc_id(&mut inner);
        inner.recorders.insert(
            id,
            NullRecorder {
                queue,
                state: RecorderState::Initial,
                ops: Vec::new(),
                reset_count: 0,
            },
        );
        Ok(RecorderHandle(id))
    }

    fn reset_recorder(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) => {
                r.ops.clear();
                r.state = RecorderState::Initial;
                r.reset_count += 1;
                Ok(())
            }
            None => Err(RenderError::InvalidParameter(format!(
                "unknown recorder {:?}",
                recorder
            ))),
        }
    }

    fn begin_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Initial => {
                r.state = RecorderState::Recording;
                Ok(())
            }
            Some(r) => Err(RenderError::InvalidParameter(format!(
                "begin_recording in state {:?}",
                r.state
            ))),
            None => Err(RenderError::InvalidParameter(format!(
                "unknown recorder {:?}",
                recorder
            ))),
        }
    }

    fn end_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.state = RecorderState::Executable;
                Ok(())
            }
            Some(r) => Err(RenderError::InvalidParameter(format!(
                "end_recording in state {:?}",
                r.state
            ))),
            None => Err(RenderError::InvalidParameter(format!(
                "unknown recorder {:?}",
                recorder
            ))),
        }
    }

    fn record_copy_buffer(
        &mut self,
        recorder: RecorderHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        let src_len = inner
            .buffers
            .get(&src.0)
            .map(|b| b.data.len() as u64)
            .ok_or_else(|| RenderError::InvalidParameter(format!("unknown buffer {:?}", src)))?;
        let dst_len = inner
            .buffers
            .get(&dst.0)
            .map(|b| b.data.len() as u64)
            .ok_or_else(|| RenderError::InvalidParameter(format!("unknown buffer {:?}", dst)))?;
        if size > src_len || size > dst_len {
            return Err(RenderError::InvalidParameter(format!(
                "copy of {} bytes exceeds buffer sizes ({}, {})",
                size, src_len, dst_len
            )));
        }
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::CopyBuffer {
                    src: src.0,
                    dst: dst.0,
                    size,
                });
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "copy recorded outside begin/end".into(),
            )),
        }
    }

    fn begin_render_pass(
        &mut self,
        recorder: RecorderHandle,
        image_index: u32,
        _clear_color: [f32; 4],
        _depth: Option<TextureHandle>,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::BeginPass { image_index });
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "render pass outside begin/end".into(),
            )),
        }
    }

    fn end_render_pass(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::EndPass);
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "render pass outside begin/end".into(),
            )),
        }
    }

    fn bind_pipeline(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::BindPipeline(pipeline.0));
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "bind outside begin/end".into(),
            )),
        }
    }

    fn bind_scene_uniform(
        &mut self,
        recorder: RecorderHandle,
        _pipeline: PipelineHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::BindSceneUniform { buffer: buffer.0 });
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "bind outside begin/end".into(),
            )),
        }
    }

    fn push_constants(
        &mut self,
        recorder: RecorderHandle,
        _pipeline: PipelineHandle,
        data: &[u8],
    ) -> RenderResult<()> {
        if data.len() > 128 {
            return Err(RenderError::InvalidParameter(format!(
                "push constant block of {} bytes exceeds 128",
                data.len()
            )));
        }
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::PushConstants(data.len()));
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "push outside begin/end".into(),
            )),
        }
    }

    fn bind_vertex_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::BindVertexBuffer(buffer.0));
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "bind outside begin/end".into(),
            )),
        }
    }

    fn bind_index_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::BindIndexBuffer(buffer.0));
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "bind outside begin/end".into(),
            )),
        }
    }

    fn draw_indexed(&mut self, recorder: RecorderHandle, index_count: u32) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.recorders.get_mut(&recorder.0) {
            Some(r) if r.state == RecorderState::Recording => {
                r.ops.push(RecordedOp::DrawIndexed(index_count));
                Ok(())
            }
            _ => Err(RenderError::InvalidParameter(
                "draw outside begin/end".into(),
            )),
        }
    }

    fn submit(
        &mut self,
        queue: QueueKind,
        recorder: RecorderHandle,
        wait: &[SemaphoreHandle],
        signal: &[SemaphoreHandle],
        fence: Option<FenceHandle>,
    ) -> RenderResult<()> {
        let fence_cell = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.inject_submit.take() {
                return Err(err);
            }
            match inner.recorders.get(&recorder.0) {
                Some(r) if r.state == RecorderState::Executable => {}
                Some(r) => {
                    return Err(RenderError::InvalidParameter(format!(
                        "submit in state {:?}",
                        r.state
                    )))
                }
                None => {
                    return Err(RenderError::InvalidParameter(format!(
                        "unknown recorder {:?}",
                        recorder
                    )))
                }
            }
            if let Some(r) = inner.recorders.get(&recorder.0) {
                if r.queue != queue {
                    log::warn!(
                        "NullBackend: recorder for {:?} submitted on {:?}",
                        r.queue,
                        queue
                    );
                }
            }
            Self::execute(&mut inner, recorder.0)?;
            inner.submissions.push(SubmitRecord {
                queue,
                recorder,
                wait: wait.to_vec(),
                signal: signal.to_vec(),
                fence,
            });
            match (inner.auto_signal, fence) {
                (true, Some(f)) => inner.fences.get(&f.0).cloned(),
                _ => None,
            }
        };
        // Instant completion: the emulated GPU finishes at submit time.
        if let Some(cell) = fence_cell {
            *cell.signaled.lock() = true;
            cell.cond.notify_all();
        }
        Ok(())
    }

    fn queue_wait_idle(&mut self, _queue: QueueKind) -> RenderResult<()> {
        Ok(())
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        Ok(())
    }

    fn acquire_next_image(&mut self, _ready: SemaphoreHandle, _timeout_ns: u64) -> RenderResult<u32> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.inject_acquire.take() {
            return Err(err);
        }
        let index = (inner.acquire_cursor % inner.image_count as u64) as u32;
        inner.acquire_cursor += 1;
        inner.counters.acquires += 1;
        Ok(index)
    }

    fn present(&mut self, _wait: SemaphoreHandle, image_index: u32) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.inject_present.take() {
            return Err(err);
        }
        if image_index >= inner.image_count {
            return Err(RenderError::InvalidParameter(format!(
                "present of unknown image {}",
                image_index
            )));
        }
        inner.counters.presents += 1;
        Ok(())
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> RenderResult<GpuBuffer> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.inject_create_buffer.take() {
            return Err(err);
        }
        let id = Self::alloc_id(&mut inner);
        inner.buffers.insert(
            id,
            NullBuffer {
                data: vec![0u8; descriptor.size as usize],
                usage: descriptor.usage,
                size: descriptor.size,
            },
        );
        log::trace!(
            "NullBackend: created buffer {:?} (size: {}, usage: {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.usage
        );
        Ok(GpuBuffer {
            handle: BufferHandle(id),
            allocation: None,
            size: descriptor.size,
        })
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let mut inner = self.inner.lock();
        match inner.buffers.get_mut(&buffer.0) {
            Some(b) => {
                let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
                    RenderError::InvalidParameter(format!(
                        "write of {} bytes at {} overflows",
                        data.len(),
                        offset
                    ))
                })?;
                if end > b.data.len() as u64 {
                    return Err(RenderError::InvalidParameter(format!(
                        "write of {} bytes at {} exceeds buffer size {}",
                        data.len(),
                        offset,
                        b.size
                    )));
                }
                if !b.usage.contains(BufferUsage::MAP_WRITE) {
                    return Err(RenderError::InvalidParameter(
                        "write to a buffer without MAP_WRITE".into(),
                    ));
                }
                b.data[offset as usize..end as usize].copy_from_slice(data);
                Ok(())
            }
            None => Err(RenderError::InvalidParameter(format!(
                "unknown buffer {:?}",
                buffer
            ))),
        }
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> RenderResult<Vec<u8>> {
        let inner = self.inner.lock();
        match inner.buffers.get(&buffer.0) {
            Some(b) => {
                let end = offset.checked_add(size).ok_or_else(|| {
                    RenderError::InvalidParameter(format!(
                        "read of {size} bytes at {offset} overflows"
                    ))
                })?;
                if end > b.data.len() as u64 {
                    return Err(RenderError::InvalidParameter(format!(
                        "read of {} bytes at {} exceeds buffer size {}",
                        size, offset, b.size
                    )));
                }
                Ok(b.data[offset as usize..end as usize].to_vec())
            }
            None => Err(RenderError::InvalidParameter(format!(
                "unknown buffer {:?}",
                buffer
            ))),
        }
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTexture> {
        let mut inner = self.inner.lock();
        let id = Self::alloc_id(&mut inner);
        inner.textures.insert(id, descriptor.clone());
        Ok(GpuTexture {
            handle: TextureHandle(id),
            allocation: None,
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
        })
    }

    fn create_shader_module(&mut self, spirv: &[u32]) -> RenderResult<ShaderHandle> {
        if spirv.is_empty() {
            return Err(RenderError::ShaderCompilationFailed(
                "empty SPIR-V module".into(),
            ));
        }
        let mut inner = self.inner.lock();
        let id = Self::alloc_id(&mut inner);
        inner.shaders.insert(id, ());
        Ok(ShaderHandle(id))
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> RenderResult<PipelineHandle> {
        let mut inner = self.inner.lock();
        if !inner.shaders.contains_key(&descriptor.vertex_shader.0)
            || !inner.shaders.contains_key(&descriptor.fragment_shader.0)
        {
            return Err(RenderError::InvalidParameter(
                "pipeline references unknown shader".into(),
            ));
        }
        let id = Self::alloc_id(&mut inner);
        inner.pipelines.insert(id, ());
        Ok(PipelineHandle(id))
    }

    fn destroy(&mut self, record: DeletionRecord) {
        let mut inner = self.inner.lock();
        let id = record.handle.raw();
        let found = match record.kind {
            ResourceKind::Buffer => inner.buffers.remove(&id).is_some(),
            ResourceKind::Texture => inner.textures.remove(&id).is_some(),
            ResourceKind::Fence => inner.fences.remove(&id).is_some(),
            ResourceKind::Semaphore => inner.semaphores.remove(&id).is_some(),
            ResourceKind::CommandRecorder => inner.recorders.remove(&id).is_some(),
            ResourceKind::Shader => inner.shaders.remove(&id).is_some(),
            ResourceKind::Pipeline => inner.pipelines.remove(&id).is_some(),
        };
        if found {
            inner.destruction_log.push(record);
        } else {
            inner.counters.unknown_destroys += 1;
            log::warn!(
                "NullBackend: destroy of unknown {:?} handle {}",
                record.kind,
                id
            );
        }
    }
}

static_assertions::assert_impl_all!(NullBackend: Send, Sync, Clone);

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded_copy(backend: &mut NullBackend, src: &GpuBuffer, dst: &GpuBuffer, size: u64) {
        let recorder = backend
            .create_command_recorder(QueueKind::Transfer)
            .unwrap();
        backend.begin_recording(recorder).unwrap();
        backend
            .record_copy_buffer(recorder, src.handle, dst.handle, size)
            .unwrap();
        backend.end_recording(recorder).unwrap();
        backend
            .submit(QueueKind::Transfer, recorder, &[], &[], None)
            .unwrap();
    }

    #[test]
    fn copy_executes_at_submit() {
        let mut backend = NullBackend::new();
        let src = backend
            .create_buffer(&BufferDescriptor::new(
                4,
                BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
            ))
            .unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(
                4,
                BufferUsage::MAP_READ | BufferUsage::COPY_DST,
            ))
            .unwrap();
        backend.write_buffer(src.handle, 0, &[1, 2, 3, 4]).unwrap();
        recorded_copy(&mut backend, &src, &dst, 4);
        assert_eq!(backend.read_buffer(dst.handle, 0, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn pathological_offsets_error_instead_of_wrapping() {
        let mut backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(
                8,
                BufferUsage::MAP_READ | BufferUsage::MAP_WRITE,
            ))
            .unwrap();

        let err = backend
            .write_buffer(buffer.handle, u64::MAX, &[1, 2])
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));

        let err = backend
            .read_buffer(buffer.handle, u64::MAX - 1, 4)
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }

    #[test]
    fn fence_wait_times_out_without_signal() {
        let mut backend = NullBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let err = backend.wait_fence(fence, 1_000_000).unwrap_err();
        assert_eq!(err, RenderError::DeviceTimeout);
    }

    #[test]
    fn fence_wait_returns_after_cross_thread_signal() {
        let mut backend = NullBackend::new();
        let fence = backend.create_fence(false).unwrap();
        let mut signaler = backend.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signaler.signal_fence(fence);
        });
        backend.wait_fence(fence, 1_000_000_000).unwrap();
        handle.join().unwrap();
        assert!(backend.fence_signaled(fence).unwrap());
    }

    #[test]
    fn recorder_state_transitions_are_enforced() {
        let mut backend = NullBackend::new();
        let recorder = backend
            .create_command_recorder(QueueKind::Graphics)
            .unwrap();
        // Submit before end_recording is rejected.
        backend.begin_recording(recorder).unwrap();
        assert!(backend
            .submit(QueueKind::Graphics, recorder, &[], &[], None)
            .is_err());
        backend.end_recording(recorder).unwrap();
        backend
            .submit(QueueKind::Graphics, recorder, &[], &[], None)
            .unwrap();
        // Reset returns the recorder to its initial state.
        backend.reset_recorder(recorder).unwrap();
        assert_eq!(backend.recorder_reset_count(recorder), 1);
        backend.begin_recording(recorder).unwrap();
    }

    #[test]
    fn destruction_log_preserves_destroy_order() {
        let mut backend = NullBackend::new();
        let a = backend
            .create_buffer(&BufferDescriptor::new(1, BufferUsage::COPY_DST))
            .unwrap();
        let b = backend
            .create_buffer(&BufferDescriptor::new(1, BufferUsage::COPY_DST))
            .unwrap();
        backend.destroy(DeletionRecord::buffer(&b));
        backend.destroy(DeletionRecord::buffer(&a));
        let log = backend.destruction_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].handle.raw(), b.handle.0);
        assert_eq!(log[1].handle.raw(), a.handle.0);
        assert_eq!(backend.live_buffer_count(), 0);
    }

    #[test]
    fn acquire_cycles_image_indices() {
        let mut backend = NullBackend::new();
        let ready = backend.create_semaphore().unwrap();
        let indices: Vec<u32> = (0..6)
            .map(|_| backend.acquire_next_image(ready, 1_000).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2]);
    }
}
