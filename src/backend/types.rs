//! Common types shared between backends.

use bitflags::bitflags;

/// Handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a CPU-waitable fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceHandle(pub(crate) u64);

/// Handle to a queue-ordering semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreHandle(pub(crate) u64);

/// Handle to a command recorder (command buffer plus its pool/allocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecorderHandle(pub(crate) u64);

/// Handle to a compiled shader module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub(crate) u64);

/// Handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) u64);

/// Hardware queue selector. Backends expose a graphics queue and a
/// transfer queue; on devices without a dedicated transfer family both
/// map to the same underlying queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Transfer,
}

/// Texture format enumeration (the subset the core creates or presents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth32Float => 4,
        }
    }
}

bitflags! {
    /// Buffer usage flags. `MAP_READ`/`MAP_WRITE` select host-visible
    /// memory; everything else lands in device-local memory.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const MAP_READ  = 1 << 0;
        const MAP_WRITE = 1 << 1;
        const COPY_SRC  = 1 << 2;
        const COPY_DST  = 1 << 3;
        const INDEX     = 1 << 4;
        const VERTEX    = 1 << 5;
        const UNIFORM   = 1 << 6;
    }
}

impl BufferUsage {
    /// Whether the buffer must be allocated in host-visible memory.
    pub fn is_host_visible(&self) -> bool {
        self.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
    }
}

bitflags! {
    /// Texture usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const COPY_SRC          = 1 << 0;
        const COPY_DST          = 1 << 1;
        const RENDER_ATTACHMENT = 1 << 2;
    }
}

/// Buffer creation descriptor.
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Texture creation descriptor.
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            format,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Render pipeline descriptor. The vertex layout is fixed to
/// [`crate::resources::Vertex`], the per-frame uniform sits at set/group 0
/// binding 0, and a 64-byte vertex-stage push-constant block carries the
/// per-object transform.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
    pub depth_test: bool,
}

/// A GPU buffer as a plain value record: native handle, allocator token,
/// requested byte size. Owned exclusively by its creator until handed to a
/// deletion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub handle: BufferHandle,
    pub allocation: Option<AllocationToken>,
    pub size: u64,
}

/// A GPU texture as a plain value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub allocation: Option<AllocationToken>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Raw backend handle carried inside a [`DeletionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub(crate) u64);

impl NativeHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Token identifying a backend memory allocation (a `gpu-allocator`
/// allocation on the Vulkan backend; unused on backends whose buffers own
/// their memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationToken(pub(crate) u64);

/// Kind tag for deferred destruction dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Fence,
    Semaphore,
    CommandRecorder,
    Shader,
    Pipeline,
}

/// A deferred destructor as data: resource kind, native handle, and the
/// allocation to release alongside it. Interpreted by each backend's
/// destroy dispatch; replaces by-value closure capture while keeping the
/// same LIFO flush semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletionRecord {
    pub kind: ResourceKind,
    pub handle: NativeHandle,
    pub allocation: Option<AllocationToken>,
}

impl DeletionRecord {
    pub fn buffer(buffer: &GpuBuffer) -> Self {
        Self {
            kind: ResourceKind::Buffer,
            handle: NativeHandle(buffer.handle.0),
            allocation: buffer.allocation,
        }
    }

    pub fn texture(texture: &GpuTexture) -> Self {
        Self {
            kind: ResourceKind::Texture,
            handle: NativeHandle(texture.handle.0),
            allocation: texture.allocation,
        }
    }

    pub fn fence(fence: FenceHandle) -> Self {
        Self {
            kind: ResourceKind::Fence,
            handle: NativeHandle(fence.0),
            allocation: None,
        }
    }

    pub fn semaphore(semaphore: SemaphoreHandle) -> Self {
        Self {
            kind: ResourceKind::Semaphore,
            handle: NativeHandle(semaphore.0),
            allocation: None,
        }
    }

    pub fn recorder(recorder: RecorderHandle) -> Self {
        Self {
            kind: ResourceKind::CommandRecorder,
            handle: NativeHandle(recorder.0),
            allocation: None,
        }
    }

    pub fn shader(shader: ShaderHandle) -> Self {
        Self {
            kind: ResourceKind::Shader,
            handle: NativeHandle(shader.0),
            allocation: None,
        }
    }

    pub fn pipeline(pipeline: PipelineHandle) -> Self {
        Self {
            kind: ResourceKind::Pipeline,
            handle: NativeHandle(pipeline.0),
            allocation: None,
        }
    }
}

static_assertions::assert_impl_all!(BufferHandle: Send, Sync, Copy);
static_assertions::assert_impl_all!(GpuBuffer: Send, Sync, Copy);
static_assertions::assert_impl_all!(GpuTexture: Send, Sync, Copy);
static_assertions::assert_impl_all!(DeletionRecord: Send, Sync, Copy);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visibility_follows_map_flags() {
        assert!((BufferUsage::UNIFORM | BufferUsage::MAP_WRITE).is_host_visible());
        assert!(BufferUsage::MAP_READ.is_host_visible());
        assert!(!(BufferUsage::VERTEX | BufferUsage::COPY_DST).is_host_visible());
    }

    #[test]
    fn buffer_descriptor_builder() {
        let desc = BufferDescriptor::new(256, BufferUsage::UNIFORM).with_label("per-frame");
        assert_eq!(desc.size, 256);
        assert_eq!(desc.label.as_deref(), Some("per-frame"));
        assert_eq!(desc.usage, BufferUsage::UNIFORM);
    }

    #[test]
    fn deletion_record_carries_allocation_token() {
        let buffer = GpuBuffer {
            handle: BufferHandle(7),
            allocation: Some(AllocationToken(3)),
            size: 64,
        };
        let record = DeletionRecord::buffer(&buffer);
        assert_eq!(record.kind, ResourceKind::Buffer);
        assert_eq!(record.handle.raw(), 7);
        assert_eq!(record.allocation, Some(AllocationToken(3)));

        let record = DeletionRecord::fence(FenceHandle(11));
        assert_eq!(record.kind, ResourceKind::Fence);
        assert_eq!(record.allocation, None);
    }

    #[test]
    fn depth_format_classification() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(!TextureFormat::Bgra8Unorm.is_depth());
        assert_eq!(TextureFormat::Rgba8Unorm.bytes_per_pixel(), 4);
    }
}
