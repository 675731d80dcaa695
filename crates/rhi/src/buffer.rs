//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, and staging buffers.
//! Memory comes from the device facade (gpu-allocator on the real device).
//!
//! # Overview
//!
//! - [`BufferUsage`] is the usage tag of a buffer (vertex, index, uniform, staging)
//! - [`DeviceBuffer`] owns a `vk::Buffer` and its backing allocation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::buffer::{BufferUsage, DeviceBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let matrices = [0.0f32; 48];
//! let mut uniform = DeviceBuffer::host_visible(device, BufferUsage::Uniform, 192)?;
//! uniform.write(0, bytemuck::cast_slice(&matrices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::facade::DeviceFacade;

/// Buffer usage tag.
///
/// Defines the intended use of the buffer, which selects the Vulkan usage
/// flags. Vertex, index and uniform buffers can also be copy destinations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores 32-bit index data
    Index,
    /// Uniform buffer - stores shader uniform data
    Uniform,
    /// Staging buffer - CPU-writable source of a transfer
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => {
                vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with owned backing memory.
///
/// Dropping the buffer returns its memory to the allocator and destroys the
/// handle. The caller must make sure the GPU no longer reads it.
pub struct DeviceBuffer<D: DeviceFacade> {
    device: Arc<D>,
    buffer: vk::Buffer,
    allocation: Option<D::Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
    location: MemoryLocation,
}

impl<D: DeviceFacade> DeviceBuffer<D> {
    /// Creates a buffer in the given memory location.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::EmptyInput`] for a zero size, before touching the
    /// device, or the allocation error otherwise.
    pub fn new(
        device: Arc<D>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::EmptyInput);
        }

        let (buffer, allocation) =
            device.create_buffer(size, usage.to_vk_usage(), location, usage.name())?;

        debug!(
            "Created {} buffer: {} bytes ({:?})",
            usage.name(),
            size,
            location
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
            location,
        })
    }

    /// Creates a persistently mapped, CPU-writable buffer.
    pub fn host_visible(device: Arc<D>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::new(device, usage, size, MemoryLocation::CpuToGpu)
    }

    /// Creates a device-local buffer that can only be filled by a copy.
    pub fn device_local(device: Arc<D>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::new(device, usage, size, MemoryLocation::GpuOnly)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// The buffer must live in CPU-visible memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the write would exceed the buffer size or the
    /// memory is not mapped.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds {} buffer size: offset {} + data {} > buffer {}",
                self.usage.name(),
                offset,
                data.len(),
                self.size
            )));
        }

        let allocation = self.allocation.as_mut().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        self.device.write_buffer(allocation, offset as usize, data)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage tag.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn location(&self) -> MemoryLocation {
        self.location
    }
}

impl<D: DeviceFacade> Drop for DeviceBuffer<D> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_buffer(self.buffer, allocation);
            debug!("Destroyed {} buffer", self.usage.name());
        }
    }
}
