//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, gpu-allocator
//! initialization, and the [`DeviceFacade`] implementation the frame lifecycle
//! runs on.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical device,
//! including:
//! - Logical device creation with the swapchain extension
//! - Separate graphics and present queues (possibly the same queue)
//! - Memory allocation via gpu-allocator
//! - Swapchain creation and presentation on the window surface
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use vkframe_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(surface: vk::SurfaceKHR) -> Result<(), vkframe_rhi::RhiError> {
//! let instance = Instance::new(c"demo", &[], false)?;
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(&instance, &physical_device_info, surface)?;
//!
//! let graphics_queue = device.graphics_queue();
//! let present_queue = device.present_queue();
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::facade::{DeviceFacade, QueueFamilies, QueueRole, SubmitDesc, SwapchainDesc};
use crate::instance::Instance;
use crate::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo};
use crate::swapchain::SwapchainSupportDetails;

/// Vulkan logical device wrapper.
///
/// This struct manages the lifetime of the Vulkan logical device and its associated
/// resources including queues and the memory allocator. It does not own the
/// surface: the surface must outlive the device and be destroyed after it.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared across threads using `Arc`. The internal
/// allocator is protected by a `Mutex` for thread-safe memory allocation.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator. Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    queue_families: QueueFamilies,
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl Device {
    /// Creates a new logical device that renders and presents to `surface`.
    ///
    /// One queue is created per unique family, so the graphics and present
    /// queues are the same queue when the families match.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        surface: vk::SurfaceKHR,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;

        let mut unique_families = vec![queue_families.graphics];
        if !queue_families.is_unified() {
            unique_families.push(queue_families.present);
        }
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default();

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        debug!(
            "Graphics queue retrieved from family {}",
            queue_families.graphics
        );

        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        debug!(
            "Present queue retrieved from family {}",
            queue_families.present
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
            surface,
            surface_loader,
            swapchain_loader,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    fn queue(&self, role: QueueRole) -> vk::Queue {
        match role {
            QueueRole::Graphics => self.graphics_queue,
            QueueRole::Present => self.present_queue,
        }
    }

    fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| {
            RhiError::AllocatorError(gpu_allocator::AllocationError::Internal(
                "allocator lock poisoned".to_string(),
            ))
        })
    }

    fn free_allocation(&self, allocation: Allocation) {
        match self.allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free allocation: {:?}", e);
                }
            }
            Err(e) => error!("Leaking allocation: {}", e),
        }
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let allocation = self.allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }
}

impl DeviceFacade for Device {
    type Allocation = Allocation;

    fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails> {
        SwapchainSupportDetails::query(self.physical_device, self.surface, &self.surface_loader)
    }

    fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&create_info, None)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> RhiResult<()> {
        match unsafe { self.device.wait_for_fences(fences, true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::FenceTimeout { timeout_ns }),
            Err(e) => Err(e.into()),
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> RhiResult<()> {
        unsafe { self.device.reset_fences(fences)? };
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&create_info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_command_pool(
        &self,
        queue_family: u32,
        transient: bool,
    ) -> RhiResult<vk::CommandPool> {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { self.device.create_command_pool(&create_info, None)? };
        debug!(
            "{} command pool created for queue family {}",
            if transient { "Transient" } else { "Resettable" },
            queue_family
        );
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        Ok(unsafe { self.device.allocate_command_buffers(&alloc_info)? })
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) };
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)?
        };
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer)? };
        Ok(())
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(
                command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) };
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(command_buffer, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(command_buffer, 0, &[scissor]) };
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(command_buffer, buffer, 0, index_type);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(command_buffer, layout, stages, 0, data);
        }
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.device.cmd_copy_buffer(command_buffer, src, dst, &[region]) };
    }

    fn queue_submit(
        &self,
        queue: QueueRole,
        submit: &SubmitDesc,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        let command_buffers = [submit.command_buffer];
        let wait_semaphores: Vec<vk::Semaphore> = submit.wait_semaphore.into_iter().collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = submit
            .wait_semaphore
            .map(|_| submit.wait_stage)
            .into_iter()
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal_semaphore.into_iter().collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.queue(queue), &[submit_info], fence)?
        };
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR> {
        let (sharing_mode, family_indices) = desc.queue_families.image_sharing();

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true);

        let swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| match e {
                    vk::Result::ERROR_DEVICE_LOST
                    | vk::Result::ERROR_OUT_OF_HOST_MEMORY
                    | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => RhiError::from(e),
                    other => {
                        RhiError::SwapchainError(format!("Failed to create swapchain: {:?}", other))
                    }
                })?
        };
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        Ok(unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                timeout_ns,
                signal,
                vk::Fence::null(),
            )
        }
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.present_queue, &present_info)
        }
    }

    fn create_image(
        &self,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> RhiResult<(vk::Image, Allocation)> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            self.free_allocation(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(e.into());
        }

        debug!(
            "Created {} image: {}x{} ({:?})",
            name, extent.width, extent.height, format
        );
        Ok((image, allocation))
    }

    fn destroy_image(&self, image: vk::Image, allocation: Allocation) {
        self.free_allocation(allocation);
        unsafe { self.device.destroy_image(image, None) };
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        Ok(unsafe { self.device.create_image_view(&create_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        Ok(unsafe { self.device.create_framebuffer(&create_info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> RhiResult<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            self.free_allocation(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    fn write_buffer(&self, allocation: &mut Allocation, offset: usize, data: &[u8]) -> RhiResult<()> {
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        let end = offset + data.len();
        let target = mapped.get_mut(offset..end).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "Write of {} bytes at {} exceeds mapped range",
                data.len(),
                offset
            ))
        })?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Allocation) {
        // Free allocation first, then destroy buffer
        self.free_allocation(allocation);
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        uniform_descriptors: u32,
    ) -> RhiResult<vk::DescriptorPool> {
        let pool_sizes = [vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: uniform_descriptors,
        }];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; count as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        Ok(unsafe { self.device.allocate_descriptor_sets(&alloc_info)? })
    }

    fn write_uniform_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device, so it
            // has to go first.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the extension loaders are Send+Sync
// - vk handles are Copy types
// - Allocator is protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
