//! Per-frame uniform data.
//!
//! [`UniformData`] must match the `UniformBufferObject` block of the mesh
//! vertex shader (`set = 0, binding = 0`). The struct is `#[repr(C)]` and
//! `Pod` so it can be written to mapped memory as raw bytes.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{BufferUsage, DeviceBuffer};
use vkframe_rhi::facade::DeviceFacade;
use vkframe_rhi::vk;

/// Model, view and projection transforms.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformData {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformData {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { model, view, proj }
    }
}

impl Default for UniformData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Right-handed perspective projection with a 0..1 depth range and the Y axis
/// flipped for Vulkan clip space.
pub fn vulkan_perspective(fov_y_radians: f32, aspect_ratio: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect_ratio, near, far);
    proj.y_axis.y *= -1.0;
    proj
}

/// Persistently mapped uniform buffer owned by one frame slot.
///
/// Written once per frame after the slot's fence has signaled; never
/// reallocated.
pub struct UniformSnapshot<D: DeviceFacade> {
    buffer: DeviceBuffer<D>,
}

impl<D: DeviceFacade> UniformSnapshot<D> {
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let buffer =
            DeviceBuffer::host_visible(device, BufferUsage::Uniform, UniformData::SIZE as u64)?;
        Ok(Self { buffer })
    }

    pub fn write(&mut self, data: &UniformData) -> RhiResult<()> {
        self.buffer.write(0, bytemuck::bytes_of(data))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}
