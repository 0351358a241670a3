//! Backend abstraction layer.
//!
//! [`traits::GraphicsBackend`] is the seam the renderer drives; the
//! submodules implement it for Vulkan, wgpu, and a host-only null device.

pub mod traits;
pub mod types;

mod null;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use null::NullBackend;
pub use traits::GraphicsBackend;
pub use types::*;

use std::sync::Arc;

use crate::error::RenderResult;
use crate::{BackendType, RendererConfig};

/// Construct the backend the configuration asks for.
///
/// The null backend ignores the window; it keeps its own surface size.
pub fn create_backend(
    config: &RendererConfig,
    window: Arc<winit::window::Window>,
) -> RenderResult<Box<dyn GraphicsBackend>> {
    match config.backend {
        #[cfg(feature = "wgpu-backend")]
        BackendType::Wgpu => {
            log::info!("selecting wgpu backend");
            Ok(Box::new(wgpu_backend::WgpuBackend::new(window, config)?))
        }
        #[cfg(not(feature = "wgpu-backend"))]
        BackendType::Wgpu => Err(crate::error::RenderError::InitializationFailed(
            "wgpu backend support is not compiled in".into(),
        )),
        #[cfg(feature = "vulkan-backend")]
        BackendType::Vulkan => {
            log::info!("selecting vulkan backend");
            Ok(Box::new(vulkan::VulkanBackend::new(window, config)?))
        }
        #[cfg(not(feature = "vulkan-backend"))]
        BackendType::Vulkan => Err(crate::error::RenderError::InitializationFailed(
            "vulkan backend support is not compiled in".into(),
        )),
        BackendType::Null => {
            log::info!("selecting null backend");
            let _ = window;
            Ok(Box::new(NullBackend::with_surface_size(
                config.width,
                config.height,
            )))
        }
    }
}
