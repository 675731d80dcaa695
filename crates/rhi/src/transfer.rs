//! Staging uploads into device-local memory.
//!
//! [`TransferUploader`] copies CPU data into a device-local buffer through a
//! host-visible staging buffer and a one-time copy command. Every upload
//! blocks until the copy has completed on the GPU; it is meant for load time,
//! not for per-frame data.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::BufferUsage;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::transfer::TransferUploader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let mut uploader = TransferUploader::new(device)?;
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = uploader.upload_slice(&indices, BufferUsage::Index)?;
//! uploader.destroy();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{BufferUsage, DeviceBuffer};
use crate::error::{RhiError, RhiResult};
use crate::facade::{DeviceFacade, QueueRole, SubmitDesc};

/// Synchronous staging-buffer uploader on the graphics queue.
pub struct TransferUploader<D: DeviceFacade> {
    device: Arc<D>,
    /// Transient pool on the graphics family; null after [`destroy`](Self::destroy).
    pool: vk::CommandPool,
}

impl<D: DeviceFacade> TransferUploader<D> {
    /// Creates the uploader and its transient command pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the command pool cannot be created.
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let family = device.queue_families().graphics;
        let pool = device.create_command_pool(family, true)?;
        info!("Transfer uploader created on queue family {}", family);
        Ok(Self { device, pool })
    }

    /// Uploads `data` into a new device-local buffer tagged with `usage`.
    ///
    /// Blocks until the copy has finished. The staging buffer is released
    /// before returning, on success and on failure.
    ///
    /// # Errors
    ///
    /// - [`RhiError::EmptyInput`] for empty `data`, before any allocation
    /// - Allocation, submission or fence wait failures
    pub fn upload_static(&self, data: &[u8], usage: BufferUsage) -> RhiResult<DeviceBuffer<D>> {
        if data.is_empty() {
            return Err(RhiError::EmptyInput);
        }
        if self.pool == vk::CommandPool::null() {
            return Err(RhiError::InvalidHandle(
                "Transfer uploader was already destroyed".to_string(),
            ));
        }

        let size = data.len() as vk::DeviceSize;

        let mut staging =
            DeviceBuffer::host_visible(self.device.clone(), BufferUsage::Staging, size)?;
        staging.write(0, data)?;

        let destination = DeviceBuffer::device_local(self.device.clone(), usage, size)?;

        self.copy_now(staging.handle(), destination.handle(), size)?;

        debug!(
            "Uploaded {} bytes into {} buffer",
            size,
            usage.name()
        );
        Ok(destination)
    }

    /// Uploads a slice of plain-old-data values.
    ///
    /// # Errors
    ///
    /// Same as [`upload_static`](Self::upload_static).
    pub fn upload_slice<T: bytemuck::Pod>(
        &self,
        values: &[T],
        usage: BufferUsage,
    ) -> RhiResult<DeviceBuffer<D>> {
        self.upload_static(bytemuck::cast_slice(values), usage)
    }

    fn copy_now(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> RhiResult<()> {
        let command_buffer = self
            .device
            .allocate_command_buffers(self.pool, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("No command buffer allocated".to_string()))?;

        let result = self.submit_and_wait(command_buffer, src, dst, size);
        self.device.free_command_buffers(self.pool, &[command_buffer]);
        result
    }

    fn submit_and_wait(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> RhiResult<()> {
        self.device
            .begin_command_buffer(command_buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.device.cmd_copy_buffer(command_buffer, src, dst, size);
        self.device.end_command_buffer(command_buffer)?;

        let fence = self.device.create_fence(false)?;
        let result = self
            .device
            .queue_submit(
                QueueRole::Graphics,
                &SubmitDesc::standalone(command_buffer),
                fence,
            )
            .and_then(|()| self.device.wait_for_fences(&[fence], u64::MAX));
        self.device.destroy_fence(fence);
        result
    }

    /// Releases the command pool. Idempotent.
    pub fn destroy(&mut self) {
        if self.pool != vk::CommandPool::null() {
            self.device.destroy_command_pool(self.pool);
            self.pool = vk::CommandPool::null();
            info!("Transfer uploader destroyed");
        }
    }
}

impl<D: DeviceFacade> Drop for TransferUploader<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
