//! Descriptor set management for the per-frame uniform binding.
//!
//! - [`DescriptorSetLayout`] defines the layout of shader bindings
//! - [`UniformDescriptorPool`] owns a pool sized for one uniform-buffer set per
//!   frame slot and hands those sets out
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::descriptor::{uniform_buffer_binding, DescriptorSetLayout, UniformDescriptorPool};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
//! let layout = DescriptorSetLayout::new(device.clone(), &[binding])?;
//!
//! let pool = UniformDescriptorPool::new(device, layout.handle(), 2)?;
//! let sets = pool.sets();
//! assert_eq!(sets.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::facade::DeviceFacade;

/// Descriptor set layout wrapper.
///
/// The layout is immutable after creation and can be shared between threads
/// when wrapped in `Arc`.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Layout with a single uniform buffer at binding 0, visible to the vertex stage.
    pub fn uniform_only(device: Arc<Device>) -> RhiResult<Self> {
        Self::new(
            device,
            &[uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX)],
        )
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Creates a uniform buffer binding.
#[inline]
pub fn uniform_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Descriptor pool holding one uniform-buffer set per frame slot.
///
/// Sets are allocated once at construction and live until the pool is
/// destroyed; they are never freed individually.
pub struct UniformDescriptorPool<D: DeviceFacade> {
    device: Arc<D>,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl<D: DeviceFacade> UniformDescriptorPool<D> {
    /// Creates a pool and allocates `set_count` sets with `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::EmptyInput`] for a zero `set_count`, or the device
    /// error if pool creation or set allocation fails. The pool is released
    /// when allocation fails.
    pub fn new(
        device: Arc<D>,
        layout: vk::DescriptorSetLayout,
        set_count: u32,
    ) -> RhiResult<Self> {
        if set_count == 0 {
            return Err(RhiError::EmptyInput);
        }

        let pool = device.create_descriptor_pool(set_count, set_count)?;
        let sets = match device.allocate_descriptor_sets(pool, layout, set_count) {
            Ok(sets) => sets,
            Err(e) => {
                device.destroy_descriptor_pool(pool);
                return Err(e);
            }
        };

        debug!("Created descriptor pool with {} uniform set(s)", set_count);

        Ok(Self { device, pool, sets })
    }

    /// Points binding 0 of the set at `index` to the first `range` bytes of `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `index` is out of range.
    pub fn bind_uniform(
        &self,
        index: usize,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> RhiResult<()> {
        let set = self.set(index).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "descriptor set index {} out of range ({} sets)",
                index,
                self.sets.len()
            ))
        })?;
        self.device.write_uniform_descriptor(set, 0, buffer, range);
        Ok(())
    }

    #[inline]
    pub fn set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    #[inline]
    pub fn sets(&self) -> &[vk::DescriptorSet] {
        &self.sets
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl<D: DeviceFacade> Drop for UniformDescriptorPool<D> {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
        debug!("Destroyed descriptor pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDevice;
    use ash::vk::Handle;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_pool_allocates_one_set_per_slot() {
        let device = Arc::new(MockDevice::new());
        let pool =
            UniformDescriptorPool::new(device.clone(), vk::DescriptorSetLayout::null(), 2).unwrap();

        assert_eq!(pool.sets().len(), 2);
        assert_ne!(pool.set(0), pool.set(1));
        assert!(pool.set(2).is_none());
    }

    #[test]
    fn test_bind_uniform_records_binding() {
        let device = Arc::new(MockDevice::new());
        let pool =
            UniformDescriptorPool::new(device.clone(), vk::DescriptorSetLayout::null(), 2).unwrap();

        let buffer = vk::Buffer::from_raw(0xbeef);
        pool.bind_uniform(1, buffer, 192).unwrap();

        let set = pool.set(1).unwrap();
        assert_eq!(device.descriptor_binding(set, 0), Some(buffer));
        assert!(matches!(
            pool.bind_uniform(5, buffer, 192),
            Err(RhiError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_zero_sets_rejected() {
        let device = Arc::new(MockDevice::new());
        let result = UniformDescriptorPool::new(device.clone(), vk::DescriptorSetLayout::null(), 0);
        assert!(matches!(result, Err(RhiError::EmptyInput)));
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_drop_releases_pool() {
        let device = Arc::new(MockDevice::new());
        {
            let _pool =
                UniformDescriptorPool::new(device.clone(), vk::DescriptorSetLayout::null(), 2)
                    .unwrap();
            assert!(device.live_object_count() > 0);
        }
        assert_eq!(device.live_object_count(), 0);
    }
}
