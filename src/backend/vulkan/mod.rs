//! Vulkan backend built on ash and gpu-allocator.
//!
//! Uses Vulkan 1.3 dynamic rendering instead of render pass objects, binary
//! fences for slot reclamation, and a negative-height viewport so clip space
//! matches the wgpu backend.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use ash::khr::{dynamic_rendering, surface, swapchain};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::traits::GraphicsBackend;
use crate::backend::types::*;
use crate::error::{RenderError, RenderResult};
use crate::resources::Vertex;
use crate::shader::{FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use crate::RendererConfig;

/// Push constant capacity declared in every pipeline layout. Vulkan
/// guarantees at least this much.
const PUSH_CONSTANT_BYTES: u32 = 128;

struct VkBuffer {
    buffer: vk::Buffer,
    allocation: AllocationToken,
    size: u64,
}

struct VkTexture {
    image: vk::Image,
    view: vk::ImageView,
    allocation: AllocationToken,
}

#[derive(Clone, Copy)]
struct VkRecorder {
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    queue_family: u32,
}

/// Vulkan implementation of [`GraphicsBackend`].
pub struct VulkanBackend {
    _entry: ash::Entry,
    instance: ash::Instance,
    surface_fn: surface::Instance,
    swapchain_fn: swapchain::Device,
    dynamic_rendering_fn: dynamic_rendering::Device,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    graphics_queue: vk::Queue,
    graphics_queue_family: u32,
    transfer_queue: vk::Queue,
    transfer_queue_family: u32,
    allocator: Option<Arc<Mutex<Allocator>>>,

    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    swapchain_format: vk::Format,
    swapchain_extent: vk::Extent2D,

    // The binding model is fixed: one uniform buffer at set 0 binding 0 and
    // one vertex-stage push constant block. Every pipeline shares the same
    // layouts, created once at startup.
    descriptor_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    descriptor_pool: vk::DescriptorPool,
    uniform_sets: HashMap<u64, vk::DescriptorSet>,

    buffers: HashMap<u64, VkBuffer>,
    textures: HashMap<u64, VkTexture>,
    allocations: HashMap<u64, Allocation>,
    fences: HashMap<u64, vk::Fence>,
    semaphores: HashMap<u64, vk::Semaphore>,
    recorders: HashMap<u64, VkRecorder>,
    shaders: HashMap<u64, vk::ShaderModule>,
    pipelines: HashMap<u64, vk::Pipeline>,

    // Swapchain image the open render pass is drawing into; transitioned to
    // PRESENT_SRC when the pass ends.
    pass_target: Option<vk::Image>,

    next_buffer_id: u64,
    next_texture_id: u64,
    next_allocation_id: u64,
    next_fence_id: u64,
    next_semaphore_id: u64,
    next_recorder_id: u64,
    next_shader_id: u64,
    next_pipeline_id: u64,

    vsync: bool,
}

fn vk_err(err: vk::Result) -> RenderError {
    match err {
        vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => RenderError::DeviceTimeout,
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
            RenderError::OutOfDeviceMemory
        }
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => {
            RenderError::SurfaceOutOfDate
        }
        other => RenderError::InitializationFailed(format!("vulkan call failed: {other:?}")),
    }
}

fn alloc_err(err: gpu_allocator::AllocationError) -> RenderError {
    match err {
        gpu_allocator::AllocationError::OutOfMemory => RenderError::OutOfDeviceMemory,
        other => RenderError::InitializationFailed(format!("allocation failed: {other}")),
    }
}

impl VulkanBackend {
    pub fn new(window: Arc<winit::window::Window>, config: &RendererConfig) -> RenderResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let app_name = CString::new(config.title.as_str())
            .map_err(|_| RenderError::InvalidParameter("window title contains a null byte".into()))?;
        let engine_name = c"render-core";

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::make_api_version(0, 1, 3, 0));

        let display_handle = window
            .display_handle()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(vk_err)?
            .to_vec();

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions);

        let instance = unsafe { entry.create_instance(&instance_info, None) }.map_err(vk_err)?;

        let surface_fn = surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(vk_err)?;

        let physical_device = Self::pick_physical_device(&instance, &surface_fn, surface)?;

        let graphics_queue_family =
            Self::find_graphics_queue_family(&instance, physical_device, &surface_fn, surface)
                .ok_or_else(|| {
                    RenderError::InitializationFailed("no graphics queue family".into())
                })?;
        let transfer_queue_family =
            Self::find_transfer_queue_family(&instance, physical_device)
                .unwrap_or(graphics_queue_family);
        if transfer_queue_family == graphics_queue_family {
            log::warn!("no dedicated transfer queue family, sharing the graphics queue");
        }

        let queue_priorities = [1.0f32];
        let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)];
        if transfer_queue_family != graphics_queue_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(transfer_queue_family)
                    .queue_priorities(&queue_priorities),
            );
        }

        let device_extensions = [
            swapchain::NAME.as_ptr(),
            dynamic_rendering::NAME.as_ptr(),
        ];
        let features = vk::PhysicalDeviceFeatures::default();
        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extensions)
            .enabled_features(&features)
            .push_next(&mut vulkan_13_features);

        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(|e| {
                RenderError::InitializationFailed(format!("failed to create logical device: {e:?}"))
            })?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let transfer_queue = unsafe { device.get_device_queue(transfer_queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(alloc_err)?;

        let swapchain_fn = swapchain::Device::new(&instance, &device);
        let dynamic_rendering_fn = dynamic_rendering::Device::new(&instance, &device);

        let (descriptor_set_layout, pipeline_layout) = Self::create_layouts(&device)?;

        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1000,
        }];
        let descriptor_pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(1000)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
        let descriptor_pool =
            unsafe { device.create_descriptor_pool(&descriptor_pool_info, None) }
                .map_err(vk_err)?;

        let mut backend = Self {
            _entry: entry,
            instance,
            surface_fn,
            swapchain_fn,
            dynamic_rendering_fn,
            surface,
            physical_device,
            device,
            graphics_queue,
            graphics_queue_family,
            transfer_queue,
            transfer_queue_family,
            allocator: Some(Arc::new(Mutex::new(allocator))),
            swapchain: vk::SwapchainKHR::null(),
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            swapchain_format: vk::Format::B8G8R8A8_SRGB,
            swapchain_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            descriptor_set_layout,
            pipeline_layout,
            descriptor_pool,
            uniform_sets: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            allocations: HashMap::new(),
            fences: HashMap::new(),
            semaphores: HashMap::new(),
            recorders: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            pass_target: None,
            next_buffer_id: 1,
            next_texture_id: 1,
            next_allocation_id: 1,
            next_fence_id: 1,
            next_semaphore_id: 1,
            next_recorder_id: 1,
            next_shader_id: 1,
            next_pipeline_id: 1,
            vsync: config.vsync,
        };

        let size = window.inner_size();
        backend.create_swapchain(size.width.max(1), size.height.max(1))?;

        log::info!(
            "vulkan backend ready, surface {}x{}, graphics family {}, transfer family {}",
            backend.swapchain_extent.width,
            backend.swapchain_extent.height,
            graphics_queue_family,
            transfer_queue_family
        );

        Ok(backend)
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }.map_err(vk_err)?;

        let mut best_device = None;
        let mut best_score = 0;
        for device in devices {
            if Self::find_graphics_queue_family(instance, device, surface_fn, surface).is_none() {
                continue;
            }

            let properties = unsafe { instance.get_physical_device_properties(device) };
            let mut score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                _ => 0,
            };
            score += properties.limits.max_image_dimension2_d / 1024;

            let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
            log::info!(
                "found GPU: {:?} (type: {:?}, score: {})",
                device_name,
                properties.device_type,
                score
            );

            if best_device.is_none() || score > best_score {
                best_score = score;
                best_device = Some(device);
            }
        }

        best_device
            .ok_or_else(|| RenderError::InitializationFailed("no suitable GPU found".into()))
    }

    fn find_graphics_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface_fn: &surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        queue_families.iter().enumerate().find_map(|(index, family)| {
            let supports_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let supports_surface = unsafe {
                surface_fn
                    .get_physical_device_surface_support(physical_device, index as u32, surface)
                    .unwrap_or(false)
            };
            (supports_graphics && supports_surface).then_some(index as u32)
        })
    }

    /// Prefer a family that can transfer but not draw, so uploads do not
    /// contend with frame submissions.
    fn find_transfer_queue_family(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        queue_families.iter().enumerate().find_map(|(index, family)| {
            let dedicated = family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            dedicated.then_some(index as u32)
        })
    }

    fn create_layouts(
        device: &ash::Device,
    ) -> RenderResult<(vk::DescriptorSetLayout, vk::PipelineLayout)> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let descriptor_set_layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(vk_err)?;

        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PUSH_CONSTANT_BYTES)];
        let set_layouts = [descriptor_set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        let pipeline_layout =
            unsafe { device.create_pipeline_layout(&pipeline_layout_info, None) }
                .map_err(vk_err)?;

        Ok((descriptor_set_layout, pipeline_layout))
    }

    fn create_swapchain(&mut self, width: u32, height: u32) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(vk_err)?;

        unsafe {
            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            }
        }

        let capabilities = unsafe {
            self.surface_fn
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .map_err(vk_err)?;
        let formats = unsafe {
            self.surface_fn
                .get_physical_device_surface_formats(self.physical_device, self.surface)
        }
        .map_err(vk_err)?;
        let present_modes = unsafe {
            self.surface_fn
                .get_physical_device_surface_present_modes(self.physical_device, self.surface)
        }
        .map_err(vk_err)?;

        let format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .ok_or_else(|| {
                RenderError::InitializationFailed("surface reports no formats".into())
            })?;

        let present_mode = if self.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            present_modes
                .iter()
                .copied()
                .find(|&m| m == vk::PresentModeKHR::MAILBOX)
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let image_count = (capabilities.min_image_count + 1).min(
            if capabilities.max_image_count > 0 {
                capabilities.max_image_count
            } else {
                u32::MAX
            },
        );

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.swapchain = unsafe { self.swapchain_fn.create_swapchain(&swapchain_info, None) }
            .map_err(vk_err)?;
        self.swapchain_images = unsafe { self.swapchain_fn.get_swapchain_images(self.swapchain) }
            .map_err(vk_err)?;
        self.swapchain_format = format.format;
        self.swapchain_extent = extent;

        self.swapchain_image_views = self
            .swapchain_images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { self.device.create_image_view(&view_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(vk_err)?;

        log::debug!(
            "swapchain rebuilt: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            self.swapchain_images.len(),
            present_mode
        );

        Ok(())
    }

    fn convert_format(format: TextureFormat) -> vk::Format {
        match format {
            TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            TextureFormat::Bgra8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
            TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        }
    }

    fn convert_format_back(format: vk::Format) -> TextureFormat {
        match format {
            vk::Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
            vk::Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
            vk::Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
            vk::Format::D32_SFLOAT => TextureFormat::Depth32Float,
            _ => TextureFormat::Bgra8Unorm,
        }
    }

    fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics => self.graphics_queue,
            QueueKind::Transfer => self.transfer_queue,
        }
    }

    fn queue_family(&self, kind: QueueKind) -> u32 {
        match kind {
            QueueKind::Graphics => self.graphics_queue_family,
            QueueKind::Transfer => self.transfer_queue_family,
        }
    }

    fn buffer(&self, handle: BufferHandle) -> RenderResult<&VkBuffer> {
        self.buffers.get(&handle.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown buffer handle {}", handle.0))
        })
    }

    fn texture(&self, handle: TextureHandle) -> RenderResult<&VkTexture> {
        self.textures.get(&handle.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown texture handle {}", handle.0))
        })
    }

    fn fence(&self, handle: FenceHandle) -> RenderResult<vk::Fence> {
        self.fences.get(&handle.0).copied().ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown fence handle {}", handle.0))
        })
    }

    fn semaphore(&self, handle: SemaphoreHandle) -> RenderResult<vk::Semaphore> {
        self.semaphores.get(&handle.0).copied().ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown semaphore handle {}", handle.0))
        })
    }

    fn recorder(&self, handle: RecorderHandle) -> RenderResult<VkRecorder> {
        self.recorders.get(&handle.0).copied().ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown recorder handle {}", handle.0))
        })
    }

    /// Allocate and cache the descriptor set binding a uniform buffer at
    /// set 0 binding 0. One set per buffer for the lifetime of the buffer.
    fn uniform_set(&mut self, buffer: BufferHandle) -> RenderResult<vk::DescriptorSet> {
        if let Some(&set) = self.uniform_sets.get(&buffer.0) {
            return Ok(set);
        }

        let vk_buffer = self.buffer(buffer)?.buffer;
        let set_layouts = [self.descriptor_set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&set_layouts);
        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(vk_err)?[0];

        let buffer_infos = [vk::DescriptorBufferInfo::default()
            .buffer(vk_buffer)
            .offset(0)
            .range(vk::WHOLE_SIZE)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos);
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };

        self.uniform_sets.insert(buffer.0, set);
        Ok(set)
    }

    fn free_allocation(&mut self, token: AllocationToken) {
        if let Some(allocation) = self.allocations.remove(&token.0) {
            if let Some(allocator) = self.allocator.as_ref() {
                if let Err(err) = allocator.lock().free(allocation) {
                    log::warn!("failed to free allocation {}: {err}", token.0);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn transition_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }
}

impl GraphicsBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "vulkan"
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.swapchain_extent.width, self.swapchain_extent.height)
    }

    fn surface_format(&self) -> TextureFormat {
        Self::convert_format_back(self.swapchain_format)
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.create_swapchain(width, height)
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&fence_info, None) }.map_err(vk_err)?;

        let id = self.next_fence_id;
        self.next_fence_id += 1;
        self.fences.insert(id, fence);
        Ok(FenceHandle(id))
    }

    fn wait_fence(&mut self, fence: FenceHandle, timeout_ns: u64) -> RenderResult<()> {
        let fence = self.fence(fence)?;
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }.map_err(vk_err)
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RenderResult<()> {
        let fence = self.fence(fence)?;
        unsafe { self.device.reset_fences(&[fence]) }.map_err(vk_err)
    }

    fn fence_signaled(&self, fence: FenceHandle) -> RenderResult<bool> {
        let fence = self.fence(fence)?;
        unsafe { self.device.get_fence_status(fence) }.map_err(vk_err)
    }

    fn signal_fence(&mut self, fence: FenceHandle) {
        // Binary fences have no host signal path; the device signals them
        // at submission completion.
        log::debug!("ignoring host signal for fence {}", fence.0);
    }

    fn create_semaphore(&mut self) -> RenderResult<SemaphoreHandle> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let semaphore =
            unsafe { self.device.create_semaphore(&semaphore_info, None) }.map_err(vk_err)?;

        let id = self.next_semaphore_id;
        self.next_semaphore_id += 1;
        self.semaphores.insert(id, semaphore);
        Ok(SemaphoreHandle(id))
    }

    fn create_command_recorder(&mut self, queue: QueueKind) -> RenderResult<RecorderHandle> {
        let queue_family = self.queue_family(queue);
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device.create_command_pool(&pool_info, None) }.map_err(vk_err)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffer = match unsafe { self.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(err) => {
                unsafe { self.device.destroy_command_pool(pool, None) };
                return Err(vk_err(err));
            }
        };

        let id = self.next_recorder_id;
        self.next_recorder_id += 1;
        self.recorders.insert(
            id,
            VkRecorder {
                pool,
                buffer,
                queue_family,
            },
        );
        Ok(RecorderHandle(id))
    }

    fn reset_recorder(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        unsafe {
            self.device
                .reset_command_buffer(recorder.buffer, vk::CommandBufferResetFlags::empty())
        }
        .map_err(vk_err)
    }

    fn begin_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe { self.device.begin_command_buffer(recorder.buffer, &begin_info) }.map_err(vk_err)
    }

    fn end_recording(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        unsafe { self.device.end_command_buffer(recorder.buffer) }.map_err(vk_err)
    }

    fn record_copy_buffer(
        &mut self,
        recorder: RecorderHandle,
        src: BufferHandle,
        dst: BufferHandle,
        size: u64,
    ) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let src = self.buffer(src)?.buffer;
        let dst = self.buffer(dst)?.buffer;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe {
            self.device
                .cmd_copy_buffer(recorder.buffer, src, dst, &[region]);
        }
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        recorder: RecorderHandle,
        image_index: u32,
        clear_color: [f32; 4],
        depth: Option<TextureHandle>,
    ) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let index = image_index as usize;
        if index >= self.swapchain_images.len() {
            return Err(RenderError::InvalidParameter(format!(
                "image index {} out of range for {} swapchain images",
                image_index,
                self.swapchain_images.len()
            )));
        }
        let image = self.swapchain_images[index];
        let view = self.swapchain_image_views[index];
        let depth_target = depth
            .map(|handle| self.texture(handle).map(|t| (t.image, t.view)))
            .transpose()?;

        // The image comes back from acquire in an undefined layout; move it
        // to COLOR_ATTACHMENT_OPTIMAL before rendering.
        self.transition_image(
            recorder.buffer,
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::empty(),
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        );
        if let Some((depth_image, _)) = depth_target {
            self.transition_image(
                recorder.buffer,
                depth_image,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::AccessFlags::empty(),
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );
        }

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            })];
        let depth_attachment = depth_target.map(|(_, depth_view)| {
            vk::RenderingAttachmentInfo::default()
                .image_view(depth_view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                })
        });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain_extent,
        };
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(ref depth) = depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe {
            self.dynamic_rendering_fn
                .cmd_begin_rendering(recorder.buffer, &rendering_info);
        }

        // Negative-height viewport flips Y so clip space matches the wgpu
        // backend; pipelines compensate with a clockwise front face.
        let viewport = vk::Viewport {
            x: 0.0,
            y: render_area.extent.height as f32,
            width: render_area.extent.width as f32,
            height: -(render_area.extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: render_area.offset,
            extent: render_area.extent,
        };
        unsafe {
            self.device.cmd_set_viewport(recorder.buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(recorder.buffer, 0, &[scissor]);
        }

        self.pass_target = Some(image);
        Ok(())
    }

    fn end_render_pass(&mut self, recorder: RecorderHandle) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let image = self.pass_target.take().ok_or_else(|| {
            RenderError::InvalidParameter("no render pass is open on this recorder".into())
        })?;

        unsafe {
            self.dynamic_rendering_fn.cmd_end_rendering(recorder.buffer);
        }

        self.transition_image(
            recorder.buffer,
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::empty(),
        );
        Ok(())
    }

    fn bind_pipeline(
        &mut self,
        recorder: RecorderHandle,
        pipeline: PipelineHandle,
    ) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let pipeline = self.pipelines.get(&pipeline.0).copied().ok_or_else(|| {
            RenderError::InvalidParameter(format!("unknown pipeline handle {}", pipeline.0))
        })?;
        unsafe {
            self.device.cmd_bind_pipeline(
                recorder.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
        Ok(())
    }

    fn bind_scene_uniform(
        &mut self,
        recorder: RecorderHandle,
        _pipeline: PipelineHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let set = self.uniform_set(buffer)?;
        let recorder = self.recorder(recorder)?;
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                recorder.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[set],
                &[],
            );
        }
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
        let recorder = self.recorder(recorder)?;
        unsafe {
            self.device.cmd_push_constants(
                recorder.buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                data,
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let buffer = self.buffer(buffer)?.buffer;
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(recorder.buffer, 0, &[buffer], &[0]);
        }
        Ok(())
    }

    fn bind_index_buffer(
        &mut self,
        recorder: RecorderHandle,
        buffer: BufferHandle,
    ) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        let buffer = self.buffer(buffer)?.buffer;
        unsafe {
            self.device
                .cmd_bind_index_buffer(recorder.buffer, buffer, 0, vk::IndexType::UINT32);
        }
        Ok(())
    }

    fn draw_indexed(&mut self, recorder: RecorderHandle, index_count: u32) -> RenderResult<()> {
        let recorder = self.recorder(recorder)?;
        unsafe {
            self.device
                .cmd_draw_indexed(recorder.buffer, index_count, 1, 0, 0, 0);
        }
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
        let recorder = self.recorder(recorder)?;
        if recorder.queue_family != self.queue_family(queue) {
            return Err(RenderError::InvalidParameter(format!(
                "recorder was created for queue family {}, submitted to family {}",
                recorder.queue_family,
                self.queue_family(queue)
            )));
        }

        let wait_semaphores = wait
            .iter()
            .map(|&s| self.semaphore(s))
            .collect::<RenderResult<Vec<_>>>()?;
        let signal_semaphores = signal
            .iter()
            .map(|&s| self.semaphore(s))
            .collect::<RenderResult<Vec<_>>>()?;
        let wait_stages =
            vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
        let fence = match fence {
            Some(handle) => self.fence(handle)?,
            None => vk::Fence::null(),
        };

        let command_buffers = [recorder.buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queue(queue), &[submit_info], fence)
        }
        .map_err(vk_err)
    }

    fn queue_wait_idle(&mut self, queue: QueueKind) -> RenderResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue(queue)) }.map_err(vk_err)
    }

    fn device_wait_idle(&mut self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(vk_err)
    }

    fn acquire_next_image(&mut self, ready: SemaphoreHandle, timeout_ns: u64) -> RenderResult<u32> {
        let semaphore = self.semaphore(ready)?;
        let (image_index, _suboptimal) = unsafe {
            self.swapchain_fn.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        }
        .map_err(vk_err)?;
        Ok(image_index)
    }

    fn present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RenderResult<()> {
        let wait_semaphores = [self.semaphore(wait)?];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            self.swapchain_fn
                .queue_present(self.graphics_queue, &present_info)
        } {
            Ok(suboptimal) => {
                if suboptimal {
                    log::trace!("swapchain suboptimal after present");
                }
                Ok(())
            }
            Err(err) => Err(vk_err(err)),
        }
    }

    fn create_buffer(&mut self, descriptor: &BufferDescriptor) -> RenderResult<GpuBuffer> {
        let mut usage = vk::BufferUsageFlags::empty();
        if descriptor.usage.contains(BufferUsage::VERTEX) {
            usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if descriptor.usage.contains(BufferUsage::INDEX) {
            usage |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if descriptor.usage.contains(BufferUsage::UNIFORM) {
            usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if descriptor.usage.contains(BufferUsage::COPY_SRC) {
            usage |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if descriptor.usage.contains(BufferUsage::COPY_DST) {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }

        // Vulkan rejects zero-size buffers; the recorded size stays as
        // requested so bounds checks still apply.
        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size.max(4))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer =
            unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(vk_err)?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let location = if descriptor.usage.is_host_visible() {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let allocator = self.allocator.as_ref().ok_or_else(|| {
            RenderError::InitializationFailed("allocator already shut down".into())
        })?;
        let allocation = match allocator.lock().allocate(&AllocationCreateDesc {
            name: descriptor.label.as_deref().unwrap_or("buffer"),
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(alloc_err(err));
            }
        };

        if let Err(err) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_buffer(buffer, None) };
            if let Some(allocator) = self.allocator.as_ref() {
                let _ = allocator.lock().free(allocation);
            }
            return Err(vk_err(err));
        }

        let token = AllocationToken(self.next_allocation_id);
        self.next_allocation_id += 1;
        self.allocations.insert(token.0, allocation);

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(
            id,
            VkBuffer {
                buffer,
                allocation: token,
                size: descriptor.size,
            },
        );

        Ok(GpuBuffer {
            handle: BufferHandle(id),
            allocation: Some(token),
            size: descriptor.size,
        })
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> RenderResult<()> {
        let vk_buffer = self.buffer(buffer)?;
        let end = offset.checked_add(data.len() as u64).ok_or_else(|| {
            RenderError::InvalidParameter(format!(
                "write of {} bytes at offset {} overflows",
                data.len(),
                offset
            ))
        })?;
        if end > vk_buffer.size {
            return Err(RenderError::InvalidParameter(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                vk_buffer.size
            )));
        }
        let token = vk_buffer.allocation;

        let allocation = self.allocations.get_mut(&token.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("missing allocation for buffer {}", buffer.0))
        })?;
        let mapped = allocation.mapped_slice_mut().ok_or_else(|| {
            RenderError::InvalidParameter(format!("buffer {} is not host visible", buffer.0))
        })?;

        let start = offset as usize;
        mapped[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle, offset: u64, size: u64) -> RenderResult<Vec<u8>> {
        let vk_buffer = self.buffer(buffer)?;
        let end = offset.checked_add(size).ok_or_else(|| {
            RenderError::InvalidParameter(format!(
                "read of {size} bytes at offset {offset} overflows"
            ))
        })?;
        if end > vk_buffer.size {
            return Err(RenderError::InvalidParameter(format!(
                "read of {} bytes at offset {} exceeds buffer size {}",
                size, offset, vk_buffer.size
            )));
        }

        let allocation = self.allocations.get(&vk_buffer.allocation.0).ok_or_else(|| {
            RenderError::InvalidParameter(format!("missing allocation for buffer {}", buffer.0))
        })?;
        let mapped = allocation.mapped_slice().ok_or_else(|| {
            RenderError::InvalidParameter(format!("buffer {} is not host visible", buffer.0))
        })?;

        let start = offset as usize;
        Ok(mapped[start..start + size as usize].to_vec())
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> RenderResult<GpuTexture> {
        let format = Self::convert_format(descriptor.format);
        let is_depth = descriptor.format.is_depth();

        let mut usage = vk::ImageUsageFlags::empty();
        if descriptor.usage.contains(TextureUsage::COPY_SRC) {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if descriptor.usage.contains(TextureUsage::COPY_DST) {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        if descriptor.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            usage |= if is_depth {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
            };
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: descriptor.width,
                height: descriptor.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);
        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(vk_err)?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocator = self.allocator.as_ref().ok_or_else(|| {
            RenderError::InitializationFailed("allocator already shut down".into())
        })?;
        let allocation = match allocator.lock().allocate(&AllocationCreateDesc {
            name: descriptor.label.as_deref().unwrap_or("texture"),
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(alloc_err(err));
            }
        };

        if let Err(err) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            unsafe { self.device.destroy_image(image, None) };
            if let Some(allocator) = self.allocator.as_ref() {
                let _ = allocator.lock().free(allocation);
            }
            return Err(vk_err(err));
        }

        let aspect_mask = if is_depth {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                if let Some(allocator) = self.allocator.as_ref() {
                    let _ = allocator.lock().free(allocation);
                }
                return Err(vk_err(err));
            }
        };

        let token = AllocationToken(self.next_allocation_id);
        self.next_allocation_id += 1;
        self.allocations.insert(token.0, allocation);

        let id = self.next_texture_id;
        self.next_texture_id += 1;
        self.textures.insert(
            id,
            VkTexture {
                image,
                view,
                allocation: token,
            },
        );

        Ok(GpuTexture {
            handle: TextureHandle(id),
            allocation: Some(token),
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
        })
    }

    fn create_shader_module(&mut self, spirv: &[u32]) -> RenderResult<ShaderHandle> {
        let shader_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let module = unsafe { self.device.create_shader_module(&shader_info, None) }
            .map_err(|e| {
                RenderError::ShaderCompilationFailed(format!("shader module creation failed: {e:?}"))
            })?;

        let id = self.next_shader_id;
        self.next_shader_id += 1;
        self.shaders.insert(id, module);
        Ok(ShaderHandle(id))
    }

    fn create_pipeline(&mut self, descriptor: &PipelineDescriptor) -> RenderResult<PipelineHandle> {
        let vertex_module = self
            .shaders
            .get(&descriptor.vertex_shader.0)
            .copied()
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "unknown vertex shader handle {}",
                    descriptor.vertex_shader.0
                ))
            })?;
        let fragment_module = self
            .shaders
            .get(&descriptor.fragment_shader.0)
            .copied()
            .ok_or_else(|| {
                RenderError::InvalidParameter(format!(
                    "unknown fragment shader handle {}",
                    descriptor.fragment_shader.0
                ))
            })?;

        let vertex_entry = CString::new(VERTEX_ENTRY_POINT)
            .map_err(|_| RenderError::InvalidParameter("entry point contains a null byte".into()))?;
        let fragment_entry = CString::new(FRAGMENT_ENTRY_POINT)
            .map_err(|_| RenderError::InvalidParameter("entry point contains a null byte".into()))?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(&vertex_entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(&fragment_entry),
        ];

        let binding_descriptions = [vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(std::mem::size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)];
        let attribute_descriptions = [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, position) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, normal) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(std::mem::offset_of!(Vertex, color) as u32),
        ];
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // Clockwise front face compensates for the Y-flipped viewport.
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(descriptor.depth_test)
            .depth_write_enable(descriptor.depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // The depth format stays declared even for pipelines that skip the
        // depth test, because the pass always binds the depth target.
        let color_attachment_formats = [self.swapchain_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(vk::Format::D32_SFLOAT);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(self.pipeline_layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| {
            RenderError::InitializationFailed(format!("pipeline creation failed: {e:?}"))
        })?;

        let id = self.next_pipeline_id;
        self.next_pipeline_id += 1;
        self.pipelines.insert(id, pipelines[0]);

        if let Some(label) = descriptor.label.as_deref() {
            log::debug!("created pipeline '{label}' ({id})");
        }
        Ok(PipelineHandle(id))
    }

    fn destroy(&mut self, record: DeletionRecord) {
        let raw = record.handle.raw();
        match record.kind {
            ResourceKind::Buffer => {
                if let Some(set) = self.uniform_sets.remove(&raw) {
                    let _ = unsafe {
                        self.device
                            .free_descriptor_sets(self.descriptor_pool, &[set])
                    };
                }
                if let Some(buffer) = self.buffers.remove(&raw) {
                    unsafe { self.device.destroy_buffer(buffer.buffer, None) };
                    self.free_allocation(buffer.allocation);
                } else {
                    log::warn!("destroy of unknown buffer handle {raw}");
                }
            }
            ResourceKind::Texture => {
                if let Some(texture) = self.textures.remove(&raw) {
                    unsafe {
                        self.device.destroy_image_view(texture.view, None);
                        self.device.destroy_image(texture.image, None);
                    }
                    self.free_allocation(texture.allocation);
                } else {
                    log::warn!("destroy of unknown texture handle {raw}");
                }
            }
            ResourceKind::Fence => {
                if let Some(fence) = self.fences.remove(&raw) {
                    unsafe { self.device.destroy_fence(fence, None) };
                } else {
                    log::warn!("destroy of unknown fence handle {raw}");
                }
            }
            ResourceKind::Semaphore => {
                if let Some(semaphore) = self.semaphores.remove(&raw) {
                    unsafe { self.device.destroy_semaphore(semaphore, None) };
                } else {
                    log::warn!("destroy of unknown semaphore handle {raw}");
                }
            }
            ResourceKind::CommandRecorder => {
                if let Some(recorder) = self.recorders.remove(&raw) {
                    // Destroying the pool frees its command buffer.
                    unsafe { self.device.destroy_command_pool(recorder.pool, None) };
                } else {
                    log::warn!("destroy of unknown recorder handle {raw}");
                }
            }
            ResourceKind::Shader => {
                if let Some(module) = self.shaders.remove(&raw) {
                    unsafe { self.device.destroy_shader_module(module, None) };
                } else {
                    log::warn!("destroy of unknown shader handle {raw}");
                }
            }
            ResourceKind::Pipeline => {
                if let Some(pipeline) = self.pipelines.remove(&raw) {
                    unsafe { self.device.destroy_pipeline(pipeline, None) };
                } else {
                    log::warn!("destroy of unknown pipeline handle {raw}");
                }
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            if let Some(allocator) = self.allocator.as_ref() {
                for (_, buffer) in self.buffers.drain() {
                    self.device.destroy_buffer(buffer.buffer, None);
                }
                for (_, texture) in self.textures.drain() {
                    self.device.destroy_image_view(texture.view, None);
                    self.device.destroy_image(texture.image, None);
                }
                for (_, allocation) in self.allocations.drain() {
                    let _ = allocator.lock().free(allocation);
                }
            }
            drop(self.allocator.take());

            for (_, recorder) in self.recorders.drain() {
                self.device.destroy_command_pool(recorder.pool, None);
            }
            for (_, module) in self.shaders.drain() {
                self.device.destroy_shader_module(module, None);
            }
            for (_, pipeline) in self.pipelines.drain() {
                self.device.destroy_pipeline(pipeline, None);
            }
            for (_, fence) in self.fences.drain() {
                self.device.destroy_fence(fence, None);
            }
            for (_, semaphore) in self.semaphores.drain() {
                self.device.destroy_semaphore(semaphore, None);
            }

            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);

            for &view in &self.swapchain_image_views {
                self.device.destroy_image_view(view, None);
            }
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_fn.destroy_swapchain(self.swapchain, None);
            }

            self.device.destroy_device(None);
            self.surface_fn.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
