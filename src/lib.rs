//! Frame lifecycle and GPU resource lifetime management.
//!
//! The crate paces CPU-side frame recording against GPU completion with a
//! fixed ring of frame slots, each guarded by a fence carrying a globally
//! monotonic value. Resource destruction is deferred until the owning
//! slot's fence has been observed, and uploads go through batched staging
//! copies on the transfer queue.
//!
//! Three backends implement the [`backend::GraphicsBackend`] trait:
//! - **Vulkan**: direct API access via ash (binary fences, explicit sync)
//! - **wgpu**: cross-platform, fences emulated on submission indices
//! - **Null**: no device at all, for tests and headless runs

pub mod backend;
pub mod error;
pub mod frame;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;

pub use error::{RenderError, RenderResult};
pub use frame::DEFAULT_TIMEOUT_NS;
pub use renderer::{FrameReport, FrameState, Renderer};

/// Backend selection for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// wgpu backend. Cross-platform, fences emulated on submission
    /// indices.
    #[default]
    Wgpu,
    /// Vulkan backend via ash. Native binary fences and semaphores.
    Vulkan,
    /// No device. Every operation is tracked host-side.
    Null,
}

/// Immutable renderer configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window title.
    pub title: String,
    /// Initial surface width.
    pub width: u32,
    /// Initial surface height.
    pub height: u32,
    /// Which backend to use.
    pub backend: BackendType,
    /// Enable vsync.
    pub vsync: bool,
    /// Number of frame slots. At least 2; CPU/GPU skew is bounded by one
    /// less than this.
    pub frames_in_flight: usize,
    /// How long a slot fence wait may block before the device is declared
    /// hung.
    pub fence_timeout_ns: u64,
    /// How long an image acquire may block.
    pub acquire_timeout_ns: u64,
    /// Clear color for the frame's render pass.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "render-core".to_string(),
            width: 1280,
            height: 720,
            backend: BackendType::default(),
            vsync: true,
            frames_in_flight: 2,
            fence_timeout_ns: DEFAULT_TIMEOUT_NS,
            acquire_timeout_ns: DEFAULT_TIMEOUT_NS,
            clear_color: [0.05, 0.05, 0.08, 1.0],
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> RenderResult<()> {
        if self.frames_in_flight < 2 {
            return Err(RenderError::InvalidParameter(format!(
                "frames_in_flight must be at least 2, got {}",
                self.frames_in_flight
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidParameter(format!(
                "surface size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.fence_timeout_ns == 0 || self.acquire_timeout_ns == 0 {
            return Err(RenderError::InvalidParameter(
                "timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RendererConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.backend, BackendType::Wgpu);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = RendererConfig::default();
        config.frames_in_flight = 1;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.width = 0;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.fence_timeout_ns = 0;
        assert!(config.validate().is_err());
    }
}
