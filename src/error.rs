//! Error types for the rendering core.

use thiserror::Error;

/// Errors surfaced by the rendering core and its backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The device was lost or reset; the session cannot continue.
    #[error("graphics device lost")]
    DeviceLost,

    /// A fence or acquire wait exceeded its timeout; treated like device loss.
    #[error("timed out waiting for the graphics device")]
    DeviceTimeout,

    /// Device-local or host-visible allocation failed.
    #[error("out of device memory")]
    OutOfDeviceMemory,

    /// The surface no longer matches the window; swapchain-dependent
    /// resources must be rebuilt before the next frame.
    #[error("surface out of date")]
    SurfaceOutOfDate,

    /// A shader blob failed to compile or validate.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// Mesh or other asset data failed validation.
    #[error("asset load failed: {0}")]
    AssetLoadFailed(String),

    /// A descriptor or configuration value is invalid.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Backend construction failed (instance, device, or surface).
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
}

impl RenderError {
    /// Whether the frame loop must terminate after this error.
    ///
    /// `SurfaceOutOfDate` is the only condition recoverable mid-loop.
    /// `OutOfDeviceMemory` and `InvalidParameter` are surfaced to the caller
    /// without forcing teardown; everything else ends the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::DeviceLost | RenderError::DeviceTimeout => true,
            RenderError::ShaderCompilationFailed(_)
            | RenderError::AssetLoadFailed(_)
            | RenderError::InitializationFailed(_) => true,
            RenderError::SurfaceOutOfDate
            | RenderError::OutOfDeviceMemory
            | RenderError::InvalidParameter(_) => false,
        }
    }
}

/// Result alias used across the crate.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(RenderError::DeviceLost.to_string(), "graphics device lost");
        assert_eq!(
            RenderError::OutOfDeviceMemory.to_string(),
            "out of device memory"
        );
        assert_eq!(
            RenderError::ShaderCompilationFailed("bad entry point".into()).to_string(),
            "shader compilation failed: bad entry point"
        );
    }

    #[test]
    fn fatal_classification() {
        assert!(RenderError::DeviceLost.is_fatal());
        assert!(RenderError::DeviceTimeout.is_fatal());
        assert!(RenderError::AssetLoadFailed("truncated".into()).is_fatal());
        assert!(!RenderError::SurfaceOutOfDate.is_fatal());
        assert!(!RenderError::OutOfDeviceMemory.is_fatal());
        assert!(!RenderError::InvalidParameter("n".into()).is_fatal());
    }
}
