//! Device facade.
//!
//! [`DeviceFacade`] is the seam between the frame lifecycle components and the
//! Vulkan driver. The surface image chain, transfer uploader, command recorder
//! and frame scheduler only talk to the device through this trait, so the same
//! code drives the ash-backed [`Device`](crate::device::Device) in the
//! application and the in-memory [`MockDevice`](crate::mock::MockDevice) in tests.
//!
//! Handles are plain `vk` handles. Memory allocations are an associated type so
//! that each backend can carry its own bookkeeping.

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::error::RhiResult;
use crate::swapchain::SwapchainSupportDetails;

/// Queue a submission or wait targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Graphics-capable queue (also used for transfers).
    Graphics,
    /// Queue that supports presentation to the window surface.
    Present,
}

/// Negotiated graphics and present queue families.
///
/// The two families are selected independently and may differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Returns true when one family serves both graphics and presentation.
    #[inline]
    pub fn is_unified(&self) -> bool {
        self.graphics == self.present
    }

    /// Sharing mode and family list for images touched by both queues.
    ///
    /// EXCLUSIVE with no family list when unified, CONCURRENT over both
    /// families otherwise.
    pub fn image_sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        if self.is_unified() {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                vec![self.graphics, self.present],
            )
        }
    }
}

/// Parameters for creating a swapchain on the facade's surface.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub queue_families: QueueFamilies,
}

/// Single command buffer submission with optional semaphore wait and signal.
#[derive(Clone, Copy, Debug)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: Option<vk::Semaphore>,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: Option<vk::Semaphore>,
}

impl SubmitDesc {
    /// Submission with no semaphores (one-time transfer work).
    pub fn standalone(command_buffer: vk::CommandBuffer) -> Self {
        Self {
            command_buffer,
            wait_semaphore: None,
            wait_stage: vk::PipelineStageFlags::empty(),
            signal_semaphore: None,
        }
    }
}

/// Capability provider consumed by the frame lifecycle.
///
/// Methods that create objects return `RhiResult`; destroy methods never fail.
/// `acquire_next_image` and `queue_present` return the raw `vk::Result` so
/// that callers can branch on `ERROR_OUT_OF_DATE_KHR` without going through
/// the error path.
pub trait DeviceFacade {
    /// Backing memory of a buffer or image.
    type Allocation;

    fn queue_families(&self) -> QueueFamilies;

    /// Queries formats, present modes and extent bounds of the window surface.
    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    // Synchronization

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Waits until all `fences` are signaled or `timeout_ns` expires.
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> RhiResult<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> RhiResult<()>;
    fn create_semaphore(&self) -> RhiResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // Command pools and buffers

    fn create_command_pool(&self, queue_family: u32, transient: bool)
    -> RhiResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RhiResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()>;
    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()>;

    // Recording

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    );
    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    );
    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32);
    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    );

    // Queues

    fn queue_submit(&self, queue: QueueRole, submit: &SubmitDesc, fence: vk::Fence)
    -> RhiResult<()>;

    // Presentation

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR>;
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Returns `(image_index, suboptimal)` or the raw Vulkan result.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result>;
    /// Presents on the present queue. `Ok(true)` means suboptimal.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result>;

    // Images and framebuffers

    /// Creates a device-local 2D image with dedicated backing memory.
    fn create_image(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> RhiResult<(vk::Image, Self::Allocation)>;
    fn destroy_image(&self, image: vk::Image, allocation: Self::Allocation);
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Buffers

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> RhiResult<(vk::Buffer, Self::Allocation)>;
    /// Copies `data` into a host-visible allocation at `offset`.
    fn write_buffer(
        &self,
        allocation: &mut Self::Allocation,
        offset: usize,
        data: &[u8],
    ) -> RhiResult<()>;
    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Self::Allocation);

    // Descriptors

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        uniform_descriptors: u32,
    ) -> RhiResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>>;
    /// Points `binding` of `set` at the first `range` bytes of `buffer`.
    fn write_uniform_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_families_use_exclusive_sharing() {
        let families = QueueFamilies {
            graphics: 0,
            present: 0,
        };
        let (mode, indices) = families.image_sharing();
        assert!(families.is_unified());
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }

    #[test]
    fn test_split_families_use_concurrent_sharing() {
        let families = QueueFamilies {
            graphics: 0,
            present: 2,
        };
        let (mode, indices) = families.image_sharing();
        assert!(!families.is_unified());
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
