//! The capability interface the core is written against.

use crate::error::RenderResult;

use super::types::*;

/// Capability interface over a concrete graphics API.
///
/// The frame loop, slot ring, and upload orchestrator are written once
/// against this trait; the Vulkan variant maps it onto explicit binary
/// fences, the wgpu variant onto submission indices, and the null variant
/// onto host memory for tests and headless runs.
///
/// A backend is exclusively owned by its renderer; the loop is
/// single-threaded and no method is required to be reentrant.
pub trait GraphicsBackend: 'static {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Current surface size in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Format of the presentable surface images.
    fn surface_format(&self) -> TextureFormat;

    /// Rebuild the swapchain for a new surface size. Waits for the device
    /// to go idle internally; callers may destroy swapchain-dependent
    /// resources immediately afterwards.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    // --- Synchronization primitives ---

    /// Create a fence, optionally in the signaled state.
    fn create_fence(&mut self, signaled: bool) -> RenderResult<FenceHandle>;

    /// Block until the fence is signaled or the timeout elapses.
    /// Timeout maps to `DeviceTimeout`, device loss to `DeviceLost`.
    fn wait_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> RenderResult<()>;

    /// Return the fence to the unsignaled state.
    fn reset_fence(&mut self, fence: FenceHandle) -> RenderResult<()>;

    /// Non-blocking fence status query.
    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool>;

    /// Signal a fence from the CPU (test/dummy support; native backends
    /// without host-signalable fences log and ignore).
    fn signal_fence(&mut self, fence: FenceHandle);

    /// Create a queue-ordering semaphore.
    fn create_semaphore(&mut self) -> RenderResult<SemaphoreHandle>;

    // --- Command recording ---

    /// Create a command recorder on the given queue family.
    fn create_command_recorder(&mut self, queue: QueueKind) -> RenderResult<RecorderHandle>;

    /// Recycle a recorder for new recording. Must only be called once the
    /// recorder's previous submission has been observed complete.
    fn reset_recorder(&mut self, recorder: RecorderHandle) -> RenderResult<()>;

    /// Open the recorder for commands.
    fn begin_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()>;

    /// Close the recorder; it becomes submittable.
    fn end_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()>;

    /// Record a whole-range buffer copy.
    fn record_copy_buffer(
        &mut self,
        recorder: RecorderHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> RenderResult<()>;

    /// Begin a render pass targeting a swapchain image, clearing color and
    /// (when a depth target is given) depth.
    fn begin_render_pass(
        &mut self,
        recorder: RecorderHandle,
        image_index: u32,
        clear_color: [f32; 4],
        depth: Option<TextureHandle>,
    ) -> RenderResult<()>;

    /// End the current render pass.
    fn end_render_pass(&mut self, recorder: RecorderHandle) -> RenderResult<()>;

    /// Bind a render pipeline.
    fn bind_pipeline(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
    ) -> RenderResult<()>;

    /// Bind the per-frame uniform buffer at set/group 0, binding 0.
    fn bind_scene_uniform(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()>;

    /// Push vertex-stage constants (at most 128 bytes).
    fn push_constants(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
        data: &[u8],
    ) -> RenderResult<()>;

    /// Bind a vertex buffer at binding 0.
    fn bind_vertex_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()>;

    /// Bind a u32 index buffer.
    fn bind_index_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()>;

    /// Draw `index_count` indices, one instance.
    fn draw_indexed(&mut self, recorder: RecorderHandle, index_count: u32) -> RenderResult<()>;

    // --- Submission and presentation ---

    /// Submit a closed recorder: wait the given semaphores, signal the
    /// given semaphores, and signal `fence` (when provided) on completion.
    fn submit(
        &mut self,
        queue: QueueKind,
        recorder: RecorderHandle,
        wait: &[SemaphoreHandle],
        signal: &[SemaphoreHandle],
        fence: Option<FenceHandle>,
    ) -> RenderResult<()>;

    /// Block until the given queue has drained. Load-time and shutdown
    /// only; never part of the steady-state frame path.
    fn queue_wait_idle(&mut self, queue: QueueKind) -> RenderResult<()>;

    /// Block until the whole device is idle.
    fn device_wait_idle(&mut self) -> RenderResult<()>;

    /// Acquire the next presentable image, signaling `ready` when the image
    /// can be written. `SurfaceOutOfDate` is recoverable; timeout is fatal.
    fn acquire_next_image(&mut self, ready: SemaphoreHandle, timeout_ns: u64) -> RenderResult<u32>;

    /// Queue the image for presentation after `wait` signals.
    /// `SurfaceOutOfDate` is recoverable.
    fn present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RenderResult<()>;

    // --- Resources ---

    /// Create a buffer. MAP usage selects host-visible memory; allocation
    /// failure surfaces `OutOfDeviceMemory`.
    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> RenderResult<GpuBuffer>;

    /// Write bytes into a host-visible buffer.
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()>;

    /// Read bytes back from a host-visible buffer.
    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> RenderResult<Vec<u8>>;

    /// Create a device-local texture.
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTexture>;

    /// Create a shader module from SPIR-V words.
    fn create_shader_module(&mut self, spirv: &[u32]) -> RenderResult<ShaderHandle>;

    /// Create a render pipeline.
    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> RenderResult<PipelineHandle>;

    /// Destroy dispatch for deferred deletion records. Must tolerate
    /// unknown handles (logged, not fatal); callers order destruction via
    /// fence or idle waits, never the backend.
    fn destroy(&mut self, record: DeletionRecord);
}
