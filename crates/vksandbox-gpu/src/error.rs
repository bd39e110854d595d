//! GPU error types.

use ash::vk;
use thiserror::Error;
use vksandbox_core::FrameError;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Failed to load Vulkan: {0}")]
    Loader(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocator creation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed or the surface cannot be presented to.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// A bounded fence wait expired.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

impl From<GpuError> for FrameError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::Vulkan(
                vk::Result::ERROR_SURFACE_LOST_KHR
                | vk::Result::ERROR_INITIALIZATION_FAILED
                | vk::Result::ERROR_INCOMPATIBLE_DRIVER
                | vk::Result::ERROR_EXTENSION_NOT_PRESENT
                | vk::Result::ERROR_LAYER_NOT_PRESENT,
            )
            | GpuError::Loader(_)
            | GpuError::NoSuitableDevice
            | GpuError::ExtensionNotSupported(_)
            | GpuError::AllocationFailed(_)
            | GpuError::SurfaceCreation(_)
            | GpuError::SwapchainCreation(_) => Self::BackendUnavailable(err.to_string()),
            GpuError::FenceTimeout { timeout_ns } => Self::WaitTimeout { timeout_ns },
            GpuError::InvalidState(message) => Self::InvalidState(message),
            GpuError::Vulkan(_) => Self::Backend(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_failures_map_to_unavailable() {
        for err in [
            GpuError::NoSuitableDevice,
            GpuError::SurfaceCreation("no present support".to_string()),
            GpuError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR),
        ] {
            assert!(matches!(
                FrameError::from(err),
                FrameError::BackendUnavailable(_)
            ));
        }
    }

    #[test]
    fn fence_timeout_keeps_duration() {
        let err = FrameError::from(GpuError::FenceTimeout { timeout_ns: 42 });
        assert!(matches!(err, FrameError::WaitTimeout { timeout_ns: 42 }));
    }

    #[test]
    fn device_lost_is_a_backend_error() {
        let err = FrameError::from(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(err, FrameError::Backend(_)));
    }
}
