//! RHI-specific error types.
//!
//! Surface staleness (out-of-date or suboptimal chains) is not an error in this
//! crate: it is reported through [`AcquireOutcome`](crate::swapchain::AcquireOutcome)
//! and [`PresentOutcome`](crate::swapchain::PresentOutcome). Everything in
//! [`RhiError`] ends the render session.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error without a more specific classification.
    #[error("Vulkan error: {0}")]
    VulkanError(vk::Result),

    /// The logical device was lost. Never retried.
    #[error("Device lost")]
    DeviceLost,

    /// Host or device memory exhausted.
    #[error("Out of memory: {0}")]
    OutOfMemory(vk::Result),

    /// A bounded fence wait expired.
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    /// Zero-length data handed to an upload or buffer allocation.
    #[error("Refusing to create a buffer from empty input")]
    EmptyInput,

    /// A surface image chain was requested with a zero-area drawable.
    #[error("Drawable extent {width}x{height} has zero area")]
    ZeroExtent { width: u32, height: u32 },

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or out-of-bounds access
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Contradictory construction parameters, rejected before any device call.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<vk::Result> for RhiError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                RhiError::OutOfMemory(result)
            }
            other => RhiError::VulkanError(other),
        }
    }
}

impl RhiError {
    /// Returns true when the device can no longer be used at all.
    ///
    /// Callers must not attempt to rebuild the surface image chain after this.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::DeviceLost)
    }

    /// Returns true for allocation failures (host, device or allocator).
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self,
            RhiError::OutOfMemory(_)
                | RhiError::AllocatorError(gpu_allocator::AllocationError::OutOfMemory)
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_lost_is_classified() {
        let error = RhiError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(error.is_device_lost());
        assert!(!error.is_resource_exhaustion());
    }

    #[test]
    fn test_out_of_memory_is_classified() {
        for code in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
        ] {
            let error = RhiError::from(code);
            assert!(error.is_resource_exhaustion());
            assert!(!error.is_device_lost());
        }
    }

    #[test]
    fn test_other_codes_stay_generic() {
        let error = RhiError::from(vk::Result::ERROR_INITIALIZATION_FAILED);
        assert!(matches!(
            error,
            RhiError::VulkanError(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
    }
}
