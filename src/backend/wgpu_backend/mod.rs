//! wgpu backend.
//!
//! Maps the explicit synchronization surface onto wgpu's implicit model:
//! fences carry queue submission indices, semaphores are validity tokens
//! (submission order on the single queue is already total), and command
//! recorders buffer their commands for replay into a `CommandEncoder` at
//! submit time.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::Vertex;
use crate::shader::{FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use crate::RendererConfig;

/// Push constant capacity declared in the shared pipeline layout. The same
/// value the Vulkan backend declares, so shaders run unchanged on both.
const PUSH_CONSTANT_BYTES: u32 = 128;

/// One buffered command. Recorders collect these between `begin_recording`
/// and `end_recording`; `submit` replays them into a fresh encoder.
#[derive(Debug, Clone)]
enum RecordedCommand {
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    },
    BeginPass {
        clear_color: [f32; 4],
        depth: Option<TextureHandle>,
    },
    EndPass,
    BindPipeline(PipelineHandle),
    BindUniform(BufferHandle),
    PushConstants(Vec<u8>),
    BindVertexBuffer(BufferHandle),
    BindIndexBuffer(BufferHandle),
    DrawIndexed(u32),
}

struct WgpuRecorder {
    queue_kind: QueueKind,
    commands: Vec<RecordedCommand>,
    recording: bool,
    pass_open: bool,
}

/// Emulated fence: host-signaled, or tracking the submission it was
/// attached to.
struct WgpuFence {
    signaled: bool,
    submission: Option<wgpu::SubmissionIndex>,
}

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
    usage: BufferUsage,
}

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// wgpu implementation of [`GraphicsBackend`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    // The acquired texture must drop before the surface, hence the field
    // order.
    current_texture: Option<wgpu::SurfaceTexture>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,

    // The binding model is fixed: one uniform buffer at group 0 binding 0
    // and one vertex-stage push constant block. Every pipeline shares the
    // same layout, created once at startup.
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_groups: HashMap<u64, wgpu::BindGroup>,

    buffers: HashMap<u64, WgpuBuffer>,
    textures: HashMap<u64, WgpuTexture>,
    fences: HashMap<u64, WgpuFence>,
    semaphores: HashSet<u64>,
    recorders: HashMap<u64, WgpuRecorder>,
    shaders: HashMap<u64, wgpu::ShaderModule>,
    pipelines: HashMap<u64, wgpu::RenderPipeline>,

    next_buffer_id: u64,
    next_texture_id: u64,
    next_fence_id: u64,
    next_semaphore_id: u64,
    next_recorder_id: u64,
    next_shader_id: u64,
    next_pipeline_id: u64,

    _instance: wgpu::Instance,
}

fn surface_err(err: wgpu::SurfaceError) -> RenderError {
    match err {
        wgpu::SurfaceError::Timeout => RenderError::DeviceTimeout,
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost => RenderError::SurfaceOutOfDate,
        wgpu::SurfaceError::OutOfMemory => RenderError::OutOfDeviceMemory,
    }
}

impl WgpuBackend {
    /// Create the backend for a window. Adapter and device acquisition are
    /// futures even on native targets, so this blocks on them.
    pub fn new(window: Arc<winit::window::Window>, config: &RendererConfig) -> RenderResult<Self> {
        pollster::block_on(Self::new_async(window, config))
    }

    async fn new_async(
        window: Arc<winit::window::Window>,
        config: &RendererConfig,
    ) -> RenderResult<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone()).map_err(|err| {
            RenderError::InitializationFailed(format!("surface creation failed: {err}"))
        })?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                RenderError::InitializationFailed("no compatible graphics adapter".into())
            })?;

        let info = adapter.get_info();
        log::info!("found GPU: {} (backend: {:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("render device"),
                    required_features: wgpu::Features::PUSH_CONSTANTS,
                    required_limits: wgpu::Limits {
                        max_push_constant_size: PUSH_CONSTANT_BYTES,
                        ..wgpu::Limits::default()
                    },
                },
                None,
            )
            .await
            .map_err(|err| {
                RenderError::InitializationFailed(format!("device request failed: {err}"))
            })?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| {
                RenderError::InitializationFailed("surface exposes no formats".into())
            })?;
        let present_mode = if config.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            desired_maximum_frame_latency: config.frames_in_flight as u32,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &surface_config);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("render pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..PUSH_CONSTANT_BYTES,
            }],
        });

        log::info!(
            "wgpu backend ready, surface {}x{}, {:?}, present mode {:?}",
            surface_config.width,
            surface_config.height,
            surface_config.format,
            present_mode
        );

        Ok(Self {
            device,
            queue,
            current_texture: None,
            surface,
            surface_config,
            bind_group_layout,
            pipeline_layout,
            uniform_groups: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashSet::new(),
            recorders: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            next_buffer_id: 1,
            next_texture_id: 1,
            next_fence_id: 1,
            next_semaphore_id: 1,
            next_recorder_id: 1,
            next_shader_id: 1,
            next_pipeline_id: 1,
            _instance: instance,
        })
    }

    fn convert_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_format_back(format: wgpu::TextureFormat) -> TextureFormat {
        match format {
            wgpu::TextureFormat::Rgba8Unorm => TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Bgra8Unorm => TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb => TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Depth32Float => TextureFormat::Depth32Float,
            _ => TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut out = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_SRC) {
            out |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            out |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            out |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            out |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            out |= wgpu::BufferUsages::UNIFORM;
        }
        // Host-visible buffers go through queue writes and readback copies
        // instead of persistent maps, so the map flags become copy usages.
        if usage.is_host_visible() {
            out |= wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        }
        out
    }

    /// Round a byte count up to [`wgpu::COPY_BUFFER_ALIGNMENT`]. wgpu
    /// validates queue writes and buffer copies in whole aligned units,
    /// so physical allocations and transfer lengths pad up while bounds
    /// checks keep the caller's logical size.
    fn pad_to_copy_alignment(size: u64) -> RenderResult<u64> {
        let remainder = size % wgpu::COPY_BUFFER_ALIGNMENT;
        if remainder == 0 {
            return Ok(size);
        }
        size.checked_add(wgpu::COPY_BUFFER_ALIGNMENT - remainder)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "size {size} cannot be padded to the {} byte copy alignment",
                    wgpu::COPY_BUFFER_ALIGNMENT
                ))
            })
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut out = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            out |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            out |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            out |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        out
    }

    fn recording_mut(&mut self, recorder: RecorderHandle) -> RenderResult<&mut WgpuRecorder> {
        let rec = self.recorders.get_mut(&recorder.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown recorder handle {}", recorder.0))
        })?;
        if !rec.recording {
            return Err(RenderError::InvalidParameter(format!(
                "recorder {} is not recording",
                recorder.0
            )));
        }
        Ok(rec)
    }

    fn pass_mut(&mut self, recorder: RecorderHandle) -> RenderResult<&mut WgpuRecorder> {
        let rec = self.recording_mut(recorder)?;
        if !rec.pass_open {
            return Err(RenderError::InvalidParameter(
                "no render pass is open on this recorder".into(),
            ));
        }
        Ok(rec)
    }

    /// Drain the queue, then mark every pending fence signaled; their
    /// submissions have completed by then.
    fn wait_all(&mut self) -> RenderResult<()> {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        for state in self.fences.values_mut() {
            if state.submission.take().is_some() {
                state.signaled = true;
            }
        }
        Ok(())
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    fn surface_format(&self) -> TextureFormat {
        Self::convert_format_back(self.surface_config.format)
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        // In-flight frames must release their surface textures before the
        // surface is reconfigured.
        self.wait_all()?;
        self.current_texture = None;
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        log::debug!("surface reconfigured to {width}x{height}");
        Ok(())
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<FenceHandle> {
        let id = self.next_fence_id;
        self.next_fence_id += 1;
        self.fences.insert(
            id,
            WgpuFence {
                signaled,
                submission: None,
            },
        );
        Ok(FenceHandle(id))
    }

    /// Waits have no deadline here; `Maintain::WaitForSubmissionIndex`
    /// blocks until the tracked submission retires. A fence that is
    /// neither signaled nor attached to a submission can never signal,
    /// which is what a timeout would eventually report.
    fn wait_fence(&mut self, fence: FenceHandle, _timeout_ns: u64) -> RenderResult<()> {
        let state = self.fences.get(&fence.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown fence handle {}", fence.0))
        })?;
        if state.signaled {
            return Ok(());
        }
        let Some(submission) = state.submission.clone() else {
            return Err(RenderError::DeviceTimeout);
        };

        let _ = self
            .device
            .poll(wgpu::Maintain::WaitForSubmissionIndex(submission));

        if let Some(state) = self.fences.get_mut(&fence.0) {
            state.signaled = true;
            state.submission = None;
        }
        Ok(())
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RenderResult<()> {
        let state = self.fences.get_mut(&fence.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown fence handle {}", fence.0))
        })?;
        state.signaled = false;
        state.submission = None;
        Ok(())
    }

    /// A fence attached to a live submission reports unsignaled until the
    /// queue drains or the next `wait_fence` observes it.
    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool> {
        let state = self.fences.get(&fence.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown fence handle {}", fence.0))
        })?;
        if state.signaled {
            return Ok(true);
        }
        if state.submission.is_some() && self.device.poll(wgpu::Maintain::Poll).is_queue_empty() {
            return Ok(true);
        }
        Ok(false)
    }

    fn signal_fence(&mut self, fence: FenceHandle) {
        match self.fences.get_mut(&fence.0) {
            Some(state) => {
                state.signaled = true;
                state.submission = None;
            }
            None => log::warn!("signal of unknown fence handle {}", fence.0),
        }
    }

    fn create_semaphore(&mut self) -> RenderResult<SemaphoreHandle> {
        let id = self.next_semaphore_id;
        self.next_semaphore_id += 1;
        self.semaphores.insert(id);
        Ok(SemaphoreHandle(id))
    }

    fn create_command_recorder(&mut self, queue: QueueKind) -> RenderResult<RecorderHandle> {
        let id = self.next_recorder_id;
        self.next_recorder_id += 1;
        self.recorders.insert(
            id,
            WgpuRecorder {
                queue_kind: queue,
                commands: Vec::new(),
                recording: false,
                pass_open: false,
            },
        );
        Ok(RecorderHandle(id))
    }

    fn reset_recorder(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let rec = self.recorders.get_mut(&recorder.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown recorder handle {}", recorder.0))
        })?;
        rec.commands.clear();
        rec.recording = false;
        rec.pass_open = false;
        Ok(())
    }

    fn begin_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let rec = self.recorders.get_mut(&recorder.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown recorder handle {}", recorder.0))
        })?;
        if rec.recording {
            return Err(RenderError::InvalidParameter(format!(
                "recorder {} is already recording",
                recorder.0
            )));
        }
        if !rec.commands.is_empty() {
            return Err(RenderError::InvalidParameter(format!(
                "recorder {} must be reset before recording again",
                recorder.0
            )));
        }
        rec.recording = true;
        Ok(())
    }

    fn end_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let rec = self.recording_mut(recorder)?;
        if rec.pass_open {
            return Err(RenderError::InvalidParameter(format!(
                "recorder {} still has an open render pass",
                recorder.0
            )));
        }
        rec.recording = false;
        Ok(())
    }

    fn record_copy_buffer(
        &mut self,
        recorder: RecorderHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> RenderResult<()> {
        let src_size = self
            .buffers
            .get(&src.0)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!("unknown buffer handle {}", src.0))
            })?
            .size;
        let dst_size = self
            .buffers
            .get(&dst.0)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!("unknown buffer handle {}", dst.0))
            })?
            .size;
        if size > src_size || size > dst_size {
            return Err(RenderError::InvalidParameter(format!(
                "copy of {} bytes exceeds a buffer of size {}",
                size,
                src_size.min(dst_size)
            )));
        }
        // wgpu validates copy sizes in whole COPY_BUFFER_ALIGNMENT units.
        // Both buffers carry physical padding to the same alignment, so
        // the rounded copy stays in bounds and any extra bytes land past
        // the logical ends.
        let padded_size = Self::pad_to_copy_alignment(size)?;

        let rec = self.recording_mut(recorder)?;
        if rec.pass_open {
            return Err(RenderError::InvalidParameter(
                "buffer copies are not valid inside a render pass".into(),
            ));
        }
        rec.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            size: padded_size,
        });
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        recorder: RecorderHandle,
        image_index: u32,
        clear_color: [f32; 4],
        depth: Option<TextureHandle>,
    ) -> RenderResult<()> {
        // A single surface texture is acquired at a time, always index 0.
        if image_index != 0 {
            return Err(RenderError::InvalidParameter(format!(
                "image index {image_index} out of range for a single acquired image"
            )));
        }
        if let Some(handle) = depth {
            if !self.textures.contains_key(&handle.0) {
                return Err(RenderError::InvalidParameter(format!(
                    "unknown texture handle {}",
                    handle.0
                )));
            }
        }

        let rec = self.recording_mut(recorder)?;
        if rec.pass_open {
            return Err(RenderError::InvalidParameter(format!(
                "a render pass is already open on recorder {}",
                recorder.0
            )));
        }
        rec.pass_open = true;
        rec.commands
            .push(RecordedCommand::BeginPass { clear_color, depth });
        Ok(())
    }

    fn end_render_pass(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let rec = self.pass_mut(recorder)?;
        rec.pass_open = false;
        rec.commands.push(RecordedCommand::EndPass);
        Ok(())
    }

    fn bind_pipeline(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
    ) -> RenderResult<()> {
        if !self.pipelines.contains_key(&pipeline.0) {
            return Err(RenderError::InvalidParameter(format!(
                "unknown pipeline handle {}",
                pipeline.0
            )));
        }
        let rec = self.pass_mut(recorder)?;
        rec.commands.push(RecordedCommand::BindPipeline(pipeline));
        Ok(())
    }

    fn bind_scene_uniform(
        &mut self,
        recorder: RecorderHandle,
        _pipeline: PipelineHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        // Bind groups are cached per buffer; destruction drops the cache
        // entry together with the buffer.
        if !self.uniform_groups.contains_key(&buffer.0) {
            let entry = self.buffers.get(&buffer.0).ok_or_else(|| {
                RenderError::InvalidParameter(format!("unknown buffer handle {}", buffer.0))
            })?;
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene uniforms"),
                layout: &self.bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: entry.buffer.as_entire_binding(),
                }],
            });
            self.uniform_groups.insert(buffer.0, group);
        }
        let rec = self.pass_mut(recorder)?;
        rec.commands.push(RecordedCommand::BindUniform(buffer));
        Ok(())
    }

    fn push_constants(
        &mut self,
        recorder: RecorderHandle,
        _pipeline: PipelineHandle,
        data: &[u8],
    ) -> RenderResult<()> {
        if data.len() > PUSH_CONSTANT_BYTES as usize {
            return Err(RenderError::InvalidParameter(format!(
                "push constant block of {} bytes exceeds the {} byte limit",
                data.len(),
                PUSH_CONSTANT_BYTES
            )));
        }
        if data.len() % wgpu::PUSH_CONSTANT_ALIGNMENT as usize != 0 {
            return Err(RenderError::InvalidParameter(format!(
                "push constant block of {} bytes is not {} byte aligned",
                data.len(),
                wgpu::PUSH_CONSTANT_ALIGNMENT
            )));
        }
        let rec = self.pass_mut(recorder)?;
        rec.commands
            .push(RecordedCommand::PushConstants(data.to_vec()));
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(RenderError::InvalidParameter(format!(
                "unknown buffer handle {}",
                buffer.0
            )));
        }
        let rec = self.pass_mut(recorder)?;
        rec.commands.push(RecordedCommand::BindVertexBuffer(buffer));
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(RenderError::InvalidParameter(format!(
                "unknown buffer handle {}",
                buffer.0
            )));
        }
        let rec = self.pass_mut(recorder)?;
        rec.commands.push(RecordedCommand::BindIndexBuffer(buffer));
        Ok(())
    }

    fn draw_indexed(&mut self, recorder: RecorderHandle, index_count: u32) -> RenderResult<()> {
        let rec = self.pass_mut(recorder)?;
        rec.commands.push(RecordedCommand::DrawIndexed(index_count));
        Ok(())
    }

    fn submit(
        &mut self,
        queue: QueueKind,
        recorder: RecorderHandle,
        wait: &[SemaphoreHandle],
        signal: &[SemaphoreHandle],
        fence: Option<FenceHandle>,
    ) -> RenderResult<()> {
        // Semaphores order nothing here; the single queue already executes
        // submissions in order. They are still validated so misuse shows
        // up on this backend too.
        for semaphore in wait.iter().chain(signal.iter()) {
            if !self.semaphores.contains(&semaphore.0) {
                return Err(RenderError::InvalidParameter(format!(
                    "unknown semaphore handle {}",
                    semaphore.0
                )));
            }
        }
        if let Some(handle) = fence {
            if !self.fences.contains_key(&handle.0) {
                return Err(RenderError::InvalidParameter(format!(
                    "unknown fence handle {}",
                    handle.0
                )));
            }
        }

        let rec = self.recorders.get(&recorder.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown recorder handle {}", recorder.0))
        })?;
        if rec.recording {
            return Err(RenderError::InvalidParameter(format!(
                "recorder {} is still recording",
                recorder.0
            )));
        }
        if rec.queue_kind != queue {
            return Err(RenderError::InvalidParameter(format!(
                "recorder was created for the {:?} queue, submitted to {:?}",
                rec.queue_kind, queue
            )));
        }

        let buffers = &self.buffers;
        let textures = &self.textures;
        let pipelines = &self.pipelines;
        let uniform_groups = &self.uniform_groups;
        let current_texture = &self.current_texture;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame commands"),
            });

        let mut commands = rec.commands.iter();
        while let Some(command) = commands.next() {
            match command {
                RecordedCommand::CopyBuffer { src, dst, size } => {
                    let src = buffers.get(&src.0).ok_or_else(|| {
                        RenderError::InvalidParameter(format!("unknown buffer handle {}", src.0))
                    })?;
                    let dst = buffers.get(&dst.0).ok_or_else(|| {
                        RenderError::InvalidParameter(format!("unknown buffer handle {}", dst.0))
                    })?;
                    encoder.copy_buffer_to_buffer(&src.buffer, 0, &dst.buffer, 0, *size);
                }
                RecordedCommand::BeginPass { clear_color, depth } => {
                    // Surface textures do not keep views across frames, so
                    // the swapchain view is created fresh per pass.
                    let target = current_texture
                        .as_ref()
                        .ok_or_else(|| {
                            RenderError::InvalidParameter("no surface image is acquired".into())
                        })?
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    let depth_view = match depth {
                        Some(handle) => {
                            let texture = textures.get(&handle.0).ok_or_else(|| {
                                RenderError::InvalidParameter(format!(
                                    "unknown texture handle {}",
                                    handle.0
                                ))
                            })?;
                            Some(&texture.view)
                        }
                        None => None,
                    };

                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("main pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &target,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: clear_color[0] as f64,
                                    g: clear_color[1] as f64,
                                    b: clear_color[2] as f64,
                                    a: clear_color[3] as f64,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: depth_view.map(|view| {
                            wgpu::RenderPassDepthStencilAttachment {
                                view,
                                depth_ops: Some(wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(1.0),
                                    store: wgpu::StoreOp::Discard,
                                }),
                                stencil_ops: None,
                            }
                        }),
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });

                    for command in commands.by_ref() {
                        match command {
                            RecordedCommand::EndPass => break,
                            RecordedCommand::BindPipeline(handle) => {
                                let pipeline = pipelines.get(&handle.0).ok_or_else(|| {
                                    RenderError::InvalidParameter(format!(
                                        "unknown pipeline handle {}",
                                        handle.0
                                    ))
                                })?;
                                pass.set_pipeline(pipeline);
                            }
                            RecordedCommand::BindUniform(handle) => {
                                let group = uniform_groups.get(&handle.0).ok_or_else(|| {
                                    RenderError::InvalidParameter(format!(
                                        "no bind group for buffer handle {}",
                                        handle.0
                                    ))
                                })?;
                                pass.set_bind_group(0, group, &[]);
                            }
                            RecordedCommand::PushConstants(data) => {
                                pass.set_push_constants(wgpu::ShaderStages::VERTEX, 0, data);
                            }
                            RecordedCommand::BindVertexBuffer(handle) => {
                                let buffer = buffers.get(&handle.0).ok_or_else(|| {
                                    RenderError::InvalidParameter(format!(
                                        "unknown buffer handle {}",
                                        handle.0
                                    ))
                                })?;
                                pass.set_vertex_buffer(0, buffer.buffer.slice(..));
                            }
                            RecordedCommand::BindIndexBuffer(handle) => {
                                let buffer = buffers.get(&handle.0).ok_or_else(|| {
                                    RenderError::InvalidParameter(format!(
                                        "unknown buffer handle {}",
                                        handle.0
                                    ))
                                })?;
                                pass.set_index_buffer(
                                    buffer.buffer.slice(..),
                                    wgpu::IndexFormat::Uint32,
                                );
                            }
                            RecordedCommand::DrawIndexed(count) => {
                                pass.draw_indexed(0..*count, 0, 0..1);
                            }
                            RecordedCommand::CopyBuffer { .. }
                            | RecordedCommand::BeginPass { .. } => {
                                return Err(RenderError::InvalidParameter(
                                    "unbalanced render pass commands in recorder".into(),
                                ));
                            }
                        }
                    }
                }
                other => {
                    return Err(RenderError::InvalidParameter(format!(
                        "{other:?} recorded outside a render pass"
                    )));
                }
            }
        }

        let submission = self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(handle) = fence {
            if let Some(state) = self.fences.get_mut(&handle.0) {
                state.signaled = false;
                state.submission = Some(submission);
            }
        }
        Ok(())
    }

    /// Both queue kinds share the one wgpu queue, so either drains it.
    fn queue_wait_idle(&mut self, _queue: QueueKind) -> RenderResult<()> {
        self.wait_all()
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        self.wait_all()
    }

    fn acquire_next_image(
        &mut self,
        ready: SemaphoreHandle,
        _timeout_ns: u64,
    ) -> RenderResult<u32> {
        if !self.semaphores.contains(&ready.0) {
            return Err(RenderError::InvalidParameter(format!(
                "unknown semaphore handle {}",
                ready.0
            )));
        }
        if self.current_texture.is_some() {
            return Err(RenderError::InvalidParameter(
                "a surface image is already acquired".into(),
            ));
        }
        let texture = self.surface.get_current_texture().map_err(surface_err)?;
        if texture.suboptimal {
            log::trace!("surface is suboptimal, presenting anyway");
        }
        self.current_texture = Some(texture);
        Ok(0)
    }

    fn present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RenderResult<()> {
        if !self.semaphores.contains(&wait.0) {
            return Err(RenderError::InvalidParameter(format!(
                "unknown semaphore handle {}",
                wait.0
            )));
        }
        if image_index != 0 {
            return Err(RenderError::InvalidParameter(format!(
                "image index {image_index} out of range for a single acquired image"
            )));
        }
        let texture = self
            .current_texture
            .take()
            .ok_or_else(|| RenderError::InvalidParameter("no surface image is acquired".into()))?;
        texture.present();
        Ok(())
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> RenderResult<GpuBuffer> {
        // The physical allocation pads up to the copy alignment so
        // transfers of any logical length stay in bounds; the recorded
        // size stays as requested so bounds checks still apply.
        let physical_size = Self::pad_to_copy_alignment(descriptor.size)?;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: physical_size,
            usage: Self::convert_buffer_usage(descriptor.usage),
            mapped_at_creation: false,
        });
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            WgpuBuffer {
                buffer,
                size: descriptor.size,
                usage: descriptor.usage,
            },
        );
        Ok(GpuBuffer {
            handle: BufferHandle(id),
            allocation: None,
            size: descriptor.size,
        })
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let entry = self.buffers.get(&buffer.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown buffer handle {}", buffer.0))
        })?;
        let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
            RenderError::InvalidParameter(format!(
                "write of {} bytes at offset {} overflows",
                data.len(),
                offset
            ))
        })?;
        if end > entry.size {
            return Err(RenderError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                entry.size
            )));
        }
        if !entry.usage.is_host_visible() {
            return Err(RenderError::InvalidParameter(format!(
                "buffer {} is not host visible",
                buffer.0
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(RenderError::InvalidParameter(format!(
                "write offset {} is not {} byte aligned",
                offset,
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }
        let padded_len = Self::pad_to_copy_alignment(data.len() as u64)?;
        if padded_len == data.len() as u64 {
            // Queue writes land before any later submission on this queue.
            self.queue.write_buffer(&entry.buffer, offset, data);
            return Ok(());
        }
        // An unaligned tail spills into the physical padding, which only
        // exists past the logical end of the buffer.
        if end != entry.size {
            return Err(RenderError::InvalidParameter(format!(
                "write of {} bytes at offset {} is not {} byte aligned and stops short of the buffer end",
                data.len(),
                offset,
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }
        let mut padded = data.to_vec();
        padded.resize(padded_len as usize, 0);
        self.queue.write_buffer(&entry.buffer, offset, &padded);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> RenderResult<Vec<u8>> {
        let entry = self.buffers.get(&buffer.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown buffer handle {}", buffer.0))
        })?;
        let end = offset.checked_add(size).ok_or_else(|| {
            RenderError::InvalidParameter(format!(
                "read of {size} bytes at offset {offset} overflows"
            ))
        })?;
        if end > entry.size {
            return Err(RenderError::InvalidParameter(format!(
                "read of {} bytes at offset {} exceeds buffer size {}",
                size, offset, entry.size
            )));
        }
        if !entry.usage.is_host_visible() {
            return Err(RenderError::InvalidParameter(format!(
                "buffer {} is not host visible",
                buffer.0
            )));
        }
        if size == 0 {
            return Ok(Vec::new());
        }
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(RenderError::InvalidParameter(format!(
                "read offset {} is not {} byte aligned",
                offset,
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }
        // The copy reads in whole aligned units; any padded tail comes
        // from the physical padding and is truncated after mapping.
        let padded_size = Self::pad_to_copy_alignment(size)?;

        // No persistent mapping here: copy into a transient readback
        // buffer, block until the copy retires, then map it.
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: padded_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback copy"),
            });
        encoder.copy_buffer_to_buffer(&entry.buffer, offset, &staging, 0, padded_size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RenderError::DeviceLost)?
            .map_err(|_| RenderError::DeviceLost)?;

        let mut data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data.truncate(size as usize);
        Ok(data)
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTexture> {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_format(descriptor.format),
            usage: Self::convert_texture_usage(descriptor.usage),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(id, WgpuTexture { texture, view });
        Ok(GpuTexture {
            handle: TextureHandle(id),
            allocation: None,
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
        })
    }

    fn create_shader_module(&mut self, spirv: &[u32]) -> RenderResult<ShaderHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: None,
                source: wgpu::ShaderSource::SpirV(Cow::Borrowed(spirv)),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderCompilationFailed(err.to_string()));
        }

        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(id, module);
        Ok(ShaderHandle(id))
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> RenderResult<PipelineHandle> {
        let vertex = self
            .shaders
            .get(&descriptor.vertex_shader.0)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "unknown vertex shader handle {}",
                    descriptor.vertex_shader.0
                ))
            })?;
        let fragment = self
            .shaders
            .get(&descriptor.fragment_shader.0)
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "unknown fragment shader handle {}",
                    descriptor.fragment_shader.0
                ))
            })?;

        let vertex_attributes = [
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: std::mem::offset_of!(Vertex, position) as wgpu::BufferAddress,
                shader_location: 0,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: std::mem::offset_of!(Vertex, normal) as wgpu::BufferAddress,
                shader_location: 1,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x3,
                offset: std::mem::offset_of!(Vertex, color) as wgpu::BufferAddress,
                shader_location: 2,
            },
        ];

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: VERTEX_ENTRY_POINT,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &vertex_attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: FRAGMENT_ENTRY_POINT,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_config.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                // The depth format stays declared even for pipelines that
                // skip the depth test, because the pass always binds the
                // depth target.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: wgpu::TextureFormat::Depth32Float,
                    depth_write_enabled: descriptor.depth_test,
                    depth_compare: if descriptor.depth_test {
                        wgpu::CompareFunction::LessEqual
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::InvalidParameter(format!(
                "pipeline creation failed: {err}"
            )));
        }

        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;
        self.pipelines.insert(id, pipeline);
        if let Some(label) = &descriptor.label {
            log::debug!("created pipeline '{label}' ({id})");
        }
        Ok(PipelineHandle(id))
    }

    fn destroy(&mut self, record: DeletionRecord) {
        let raw = record.handle.raw();
        match record.kind {
            ResourceKind::Buffer => {
                self.uniform_groups.remove(&raw);
                match self.buffers.remove(&raw) {
                    Some(entry) => entry.buffer.destroy(),
                    None => log::warn!("destroy of unknown buffer handle {raw}"),
                }
            }
            ResourceKind::Texture => match self.textures.remove(&raw) {
                Some(entry) => entry.texture.destroy(),
                None => log::warn!("destroy of unknown texture handle {raw}"),
            },
            ResourceKind::Fence => {
                if self.fences.remove(&raw).is_none() {
                    log::warn!("destroy of unknown fence handle {raw}");
                }
            }
            ResourceKind::Semaphore => {
                if !self.semaphores.remove(&raw) {
                    log::warn!("destroy of unknown semaphore handle {raw}");
                }
            }
            ResourceKind::CommandRecorder => {
                if self.recorders.remove(&raw).is_none() {
                    log::warn!("destroy of unknown recorder handle {raw}");
                }
            }
            ResourceKind::Shader => {
                if self.shaders.remove(&raw).is_none() {
                    log::warn!("destroy of unknown shader handle {raw}");
                }
            }
            ResourceKind::Pipeline => {
                if self.pipelines.remove(&raw).is_none() {
                    log::warn!("destroy of unknown pipeline handle {raw}");
                }
            }
        }
    }
}

impl Drop for WgpuBackend {
    fn drop(&mut self) {
        // Let in-flight submissions retire before the resource maps drop.
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 0)]
    #[case::one(1, 4)]
    #[case::three(3, 4)]
    #[case::aligned(4, 4)]
    #[case::five(5, 8)]
    #[case::large_unaligned(4097, 4100)]
    fn transfer_sizes_pad_up_to_the_copy_alignment(#[case] size: u64, #[case] padded: u64) {
        assert_eq!(WgpuBackend::pad_to_copy_alignment(size).unwrap(), padded);
    }

    #[test]
    fn padding_never_shrinks_or_misaligns() {
        for size in 0..64u64 {
            let padded = WgpuBackend::pad_to_copy_alignment(size).unwrap();
            assert!(padded >= size);
            assert!(padded - size < wgpu::COPY_BUFFER_ALIGNMENT);
            assert_eq!(padded % wgpu::COPY_BUFFER_ALIGNMENT, 0);
        }
    }

    #[test]
    fn unpaddable_sizes_are_rejected() {
        let err = WgpuBackend::pad_to_copy_alignment(u64::MAX).unwrap_err();
        assert!(matches!(err, RenderError::InvalidParameter(_)));
    }
}
