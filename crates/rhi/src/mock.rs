//! In-memory device for exercising the frame lifecycle without a GPU.
//!
//! [`MockDevice`] implements [`DeviceFacade`] with plain bookkeeping:
//!
//! - Submitted work stays pending until a fence wait (or an idle wait) retires
//!   it. Waiting on an unsignaled fence that no pending submission will signal
//!   fails with [`RhiError::FenceTimeout`] instead of hanging.
//! - A submission that renders into an image still used by another pending
//!   submission is counted as an image race.
//! - Buffer copies are executed at submit time so uploads can be read back.
//! - Acquire and present results can be scripted to simulate stale surfaces.
//!
//! Available with `cfg(test)` inside this crate and through the `mock`
//! feature for dependents.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk::{self, Handle};
use gpu_allocator::MemoryLocation;

use crate::error::{RhiError, RhiResult};
use crate::facade::{DeviceFacade, QueueFamilies, QueueRole, SubmitDesc, SwapchainDesc};
use crate::swapchain::SwapchainSupportDetails;

/// Backing memory handed out by the mock.
#[derive(Debug)]
pub struct MockAllocation {
    id: u64,
    mapped: bool,
}

/// A command captured while recording a command buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_value_count: usize,
    },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor {
        width: u32,
        height: u32,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    BindDescriptorSet(vk::DescriptorSet),
    PushConstants {
        stages: vk::ShaderStageFlags,
        data: Vec<u8>,
    },
    DrawIndexed(u32),
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
}

/// Scripted result of the next `acquire_next_image` call.
#[derive(Clone, Copy, Debug)]
pub enum ScriptedAcquire {
    Image(u32),
    Suboptimal(u32),
    OutOfDate,
    Error(vk::Result),
}

/// Scripted result of the next `queue_present` call.
#[derive(Clone, Copy, Debug)]
pub enum ScriptedPresent {
    Presented,
    Suboptimal,
    OutOfDate,
    Error(vk::Result),
}

/// Counters collected by the mock.
#[derive(Clone, Debug, Default)]
pub struct MockStats {
    pub fence_waits: usize,
    /// Fence waits that had to retire pending GPU work.
    pub blocking_fence_waits: usize,
    pub fence_resets: usize,
    pub acquire_calls: usize,
    pub present_calls: usize,
    pub submit_calls: usize,
    pub wait_idle_calls: usize,
    pub swapchains_created: usize,
    pub swapchains_destroyed: usize,
    /// Highest number of unsignaled fences observed at any point.
    pub max_unsignaled_fences: usize,
    /// Highest number of submissions pending at once.
    pub max_pending_submissions: usize,
    /// Submissions that targeted an image another pending submission uses.
    pub image_races: usize,
    /// Submissions handed a fence that was still signaled.
    pub submits_with_signaled_fence: usize,
}

struct BufferRecord {
    allocation: u64,
    size: vk::DeviceSize,
}

struct SwapchainRecord {
    images: Vec<vk::Image>,
    next_image: u32,
}

struct PendingSubmission {
    fence: vk::Fence,
    images: Vec<vk::Image>,
}

struct MockState {
    next_handle: u64,
    queue_families: QueueFamilies,
    support: SwapchainSupportDetails,
    image_count_override: Option<u32>,

    fences: HashMap<vk::Fence, bool>,
    semaphores: HashSet<vk::Semaphore>,
    command_pools: HashSet<vk::CommandPool>,
    command_buffers: HashMap<vk::CommandBuffer, Vec<RecordedCommand>>,
    buffers: HashMap<vk::Buffer, BufferRecord>,
    memory: HashMap<u64, Vec<u8>>,
    images: HashMap<vk::Image, u64>,
    views: HashMap<vk::ImageView, vk::Image>,
    framebuffers: HashMap<vk::Framebuffer, Vec<vk::ImageView>>,
    swapchains: HashMap<vk::SwapchainKHR, SwapchainRecord>,
    descriptor_pools: HashSet<vk::DescriptorPool>,
    descriptor_sets: HashMap<vk::DescriptorSet, HashMap<u32, vk::Buffer>>,

    pending: Vec<PendingSubmission>,
    acquire_script: VecDeque<ScriptedAcquire>,
    present_script: VecDeque<ScriptedPresent>,
    fail_next_submit: Option<vk::Result>,
    fail_next_allocation: Option<vk::Result>,
    last_swapchain_desc: Option<SwapchainDesc>,
    stats: MockStats,
}

impl MockState {
    fn handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn unsignaled_fences(&self) -> usize {
        self.fences.values().filter(|signaled| !**signaled).count()
    }

    fn note_fence_state(&mut self) {
        let unsignaled = self.unsignaled_fences();
        self.stats.max_unsignaled_fences = self.stats.max_unsignaled_fences.max(unsignaled);
        self.stats.max_pending_submissions =
            self.stats.max_pending_submissions.max(self.pending.len());
    }

    fn retire_all(&mut self) {
        for submission in std::mem::take(&mut self.pending) {
            if let Some(signaled) = self.fences.get_mut(&submission.fence) {
                *signaled = true;
            }
        }
    }

    // Shared attachments (depth) are serialized by the render pass and never
    // count as a race, only presentable images do.
    fn is_presentable(&self, image: vk::Image) -> bool {
        self.swapchains
            .values()
            .any(|record| record.images.contains(&image))
    }

    fn images_targeted_by(&self, command_buffer: vk::CommandBuffer) -> Vec<vk::Image> {
        let Some(commands) = self.command_buffers.get(&command_buffer) else {
            return Vec::new();
        };
        commands
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginRenderPass { framebuffer, .. } => {
                    self.framebuffers.get(framebuffer)
                }
                _ => None,
            })
            .flatten()
            .filter_map(|view| self.views.get(view).copied())
            .filter(|image| self.is_presentable(*image))
            .collect()
    }

    fn execute_copies(&mut self, command_buffer: vk::CommandBuffer) {
        let copies: Vec<(vk::Buffer, vk::Buffer, vk::DeviceSize)> = self
            .command_buffers
            .get(&command_buffer)
            .map(|commands| {
                commands
                    .iter()
                    .filter_map(|command| match command {
                        RecordedCommand::CopyBuffer { src, dst, size } => Some((*src, *dst, *size)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        for (src, dst, size) in copies {
            let (Some(src), Some(dst)) = (self.buffers.get(&src), self.buffers.get(&dst)) else {
                continue;
            };
            let (src_id, dst_id) = (src.allocation, dst.allocation);
            let len = size as usize;
            let bytes = self
                .memory
                .get(&src_id)
                .map(|memory| memory[..len.min(memory.len())].to_vec())
                .unwrap_or_default();
            if let Some(memory) = self.memory.get_mut(&dst_id) {
                let len = bytes.len().min(memory.len());
                memory[..len].copy_from_slice(&bytes[..len]);
            }
        }
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: RecordedCommand) {
        if let Some(commands) = self.command_buffers.get_mut(&command_buffer) {
            commands.push(command);
        }
    }
}

/// Scripted stand-in for the Vulkan device.
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device with one queue family, an 800x600 surface that reports 2 to 3
    /// images, sRGB BGRA format, and FIFO plus MAILBOX present modes.
    pub fn new() -> Self {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        Self {
            state: Mutex::new(MockState {
                next_handle: 0x1000,
                queue_families: QueueFamilies {
                    graphics: 0,
                    present: 0,
                },
                support,
                image_count_override: None,
                fences: HashMap::new(),
                semaphores: HashSet::new(),
                command_pools: HashSet::new(),
                command_buffers: HashMap::new(),
                buffers: HashMap::new(),
                memory: HashMap::new(),
                images: HashMap::new(),
                views: HashMap::new(),
                framebuffers: HashMap::new(),
                swapchains: HashMap::new(),
                descriptor_pools: HashSet::new(),
                descriptor_sets: HashMap::new(),
                pending: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_next_submit: None,
                fail_next_allocation: None,
                last_swapchain_desc: None,
                stats: MockStats::default(),
            }),
        }
    }

    /// Shorthand for `Arc::new(MockDevice::new())`.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Configuration

    pub fn set_queue_families(&self, queue_families: QueueFamilies) {
        self.state().queue_families = queue_families;
    }

    pub fn set_surface_support(&self, support: SwapchainSupportDetails) {
        self.state().support = support;
    }

    /// Changes the surface's current extent, as a window resize would.
    pub fn set_surface_extent(&self, width: u32, height: u32) {
        self.state().support.capabilities.current_extent = vk::Extent2D { width, height };
    }

    /// Replaces the formats the surface reports, as a display change would.
    pub fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state().support.formats = formats;
    }

    /// Forces the number of images created per swapchain.
    pub fn set_swapchain_image_count(&self, count: Option<u32>) {
        self.state().image_count_override = count;
    }

    pub fn script_acquire(&self, result: ScriptedAcquire) {
        self.state().acquire_script.push_back(result);
    }

    pub fn script_present(&self, result: ScriptedPresent) {
        self.state().present_script.push_back(result);
    }

    pub fn fail_next_submit(&self, result: vk::Result) {
        self.state().fail_next_submit = Some(result);
    }

    pub fn fail_next_allocation(&self, result: vk::Result) {
        self.state().fail_next_allocation = Some(result);
    }

    // Inspection

    pub fn stats(&self) -> MockStats {
        self.state().stats.clone()
    }

    pub fn pending_submission_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn unsignaled_fence_count(&self) -> usize {
        self.state().unsignaled_fences()
    }

    pub fn recorded_commands(&self, command_buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state()
            .command_buffers
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default()
    }

    /// Bytes currently held by a buffer's memory.
    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<Vec<u8>> {
        let state = self.state();
        let record = state.buffers.get(&buffer)?;
        state.memory.get(&record.allocation).cloned()
    }

    pub fn buffer_size(&self, buffer: vk::Buffer) -> Option<vk::DeviceSize> {
        self.state().buffers.get(&buffer).map(|record| record.size)
    }

    pub fn framebuffer_attachments(&self, framebuffer: vk::Framebuffer) -> Vec<vk::ImageView> {
        self.state()
            .framebuffers
            .get(&framebuffer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn descriptor_binding(&self, set: vk::DescriptorSet, binding: u32) -> Option<vk::Buffer> {
        self.state()
            .descriptor_sets
            .get(&set)
            .and_then(|bindings| bindings.get(&binding).copied())
    }

    pub fn last_swapchain_desc(&self) -> Option<SwapchainDesc> {
        self.state().last_swapchain_desc
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state().buffers.len()
    }

    pub fn live_image_count(&self) -> usize {
        self.state().images.len()
    }

    pub fn live_view_count(&self) -> usize {
        self.state().views.len()
    }

    pub fn live_framebuffer_count(&self) -> usize {
        self.state().framebuffers.len()
    }

    pub fn live_swapchain_count(&self) -> usize {
        self.state().swapchains.len()
    }

    pub fn live_fence_count(&self) -> usize {
        self.state().fences.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.state().semaphores.len()
    }

    pub fn live_command_pool_count(&self) -> usize {
        self.state().command_pools.len()
    }

    /// Every object the device still owns, of any kind.
    pub fn live_object_count(&self) -> usize {
        let state = self.state();
        state.buffers.len()
            + state.images.len()
            + state.views.len()
            + state.framebuffers.len()
            + state.swapchains.len()
            + state.fences.len()
            + state.semaphores.len()
            + state.command_pools.len()
            + state.command_buffers.len()
            + state.descriptor_pools.len()
    }
}

impl DeviceFacade for MockDevice {
    type Allocation = MockAllocation;

    fn queue_families(&self) -> QueueFamilies {
        self.state().queue_families
    }

    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails> {
        Ok(self.state().support.clone())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state();
        state.stats.wait_idle_calls += 1;
        state.retire_all();
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state();
        let fence = vk::Fence::from_raw(state.handle());
        state.fences.insert(fence, signaled);
        state.note_fence_state();
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.state().fences.remove(&fence);
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> RhiResult<()> {
        let mut state = self.state();
        state.stats.fence_waits += 1;

        for fence in fences {
            match state.fences.get(fence) {
                Some(true) => continue,
                Some(false) => {}
                None => return Err(RhiError::InvalidHandle(format!("unknown fence {fence:?}"))),
            }

            let before = state.pending.len();
            state.pending.retain(|submission| submission.fence != *fence);
            if state.pending.len() == before {
                return Err(RhiError::FenceTimeout { timeout_ns });
            }
            state.stats.blocking_fence_waits += 1;
            state.fences.insert(*fence, true);
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> RhiResult<()> {
        let mut state = self.state();
        state.stats.fence_resets += 1;
        for fence in fences {
            state.fences.insert(*fence, false);
        }
        state.note_fence_state();
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let mut state = self.state();
        let semaphore = vk::Semaphore::from_raw(state.handle());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().semaphores.remove(&semaphore);
    }

    fn create_command_pool(
        &self,
        _queue_family: u32,
        _transient: bool,
    ) -> RhiResult<vk::CommandPool> {
        let mut state = self.state();
        let pool = vk::CommandPool::from_raw(state.handle());
        state.command_pools.insert(pool);
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state().command_pools.remove(&pool);
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> RhiResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state();
        if !state.command_pools.contains(&pool) {
            return Err(RhiError::InvalidHandle(format!("unknown command pool {pool:?}")));
        }
        let buffers: Vec<vk::CommandBuffer> = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.handle()))
            .collect();
        for buffer in &buffers {
            state.command_buffers.insert(*buffer, Vec::new());
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state();
        for buffer in buffers {
            state.command_buffers.remove(buffer);
        }
    }

    fn begin_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        _usage: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        match self.state().command_buffers.get_mut(&command_buffer) {
            Some(commands) => {
                commands.clear();
                Ok(())
            }
            None => Err(RhiError::InvalidHandle(format!(
                "unknown command buffer {command_buffer:?}"
            ))),
        }
    }

    fn end_command_buffer(&self, _command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        Ok(())
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> RhiResult<()> {
        if let Some(commands) = self.state().command_buffers.get_mut(&command_buffer) {
            commands.clear();
        }
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
        self.state().record(
            command_buffer,
            RecordedCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                width: render_area.extent.width,
                height: render_area.extent.height,
                clear_value_count: clear_values.len(),
            },
        );
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state()
            .record(command_buffer, RecordedCommand::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state()
            .record(command_buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_set_viewport(&self, command_buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state().record(
            command_buffer,
            RecordedCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
        );
    }

    fn cmd_set_scissor(&self, command_buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state().record(
            command_buffer,
            RecordedCommand::SetScissor {
                width: scissor.extent.width,
                height: scissor.extent.height,
            },
        );
    }

    fn cmd_bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.state()
            .record(command_buffer, RecordedCommand::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        self.state().record(
            command_buffer,
            RecordedCommand::BindIndexBuffer(buffer, index_type),
        );
    }

    fn cmd_bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.state()
            .record(command_buffer, RecordedCommand::BindDescriptorSet(set));
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.state().record(
            command_buffer,
            RecordedCommand::PushConstants {
                stages,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        self.state()
            .record(command_buffer, RecordedCommand::DrawIndexed(index_count));
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        self.state()
            .record(command_buffer, RecordedCommand::CopyBuffer { src, dst, size });
    }

    fn queue_submit(
        &self,
        _queue: QueueRole,
        submit: &SubmitDesc,
        fence: vk::Fence,
    ) -> RhiResult<()> {
        let mut state = self.state();
        state.stats.submit_calls += 1;

        if let Some(result) = state.fail_next_submit.take() {
            return Err(RhiError::from(result));
        }

        let images = state.images_targeted_by(submit.command_buffer);
        let races = state
            .pending
            .iter()
            .filter(|pending| pending.images.iter().any(|image| images.contains(image)))
            .count();
        state.stats.image_races += races;

        state.execute_copies(submit.command_buffer);

        if fence != vk::Fence::null() {
            if state.fences.get(&fence) == Some(&true) {
                state.stats.submits_with_signaled_fence += 1;
            }
            state.pending.push(PendingSubmission { fence, images });
        }
        state.note_fence_state();
        Ok(())
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<vk::SwapchainKHR> {
        let mut state = self.state();
        let swapchain = vk::SwapchainKHR::from_raw(state.handle());
        let count = state.image_count_override.unwrap_or(desc.min_image_count);
        let images: Vec<vk::Image> = (0..count)
            .map(|_| vk::Image::from_raw(state.handle()))
            .collect();
        state.swapchains.insert(
            swapchain,
            SwapchainRecord {
                images,
                next_image: 0,
            },
        );
        state.last_swapchain_desc = Some(*desc);
        state.stats.swapchains_created += 1;
        Ok(swapchain)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> RhiResult<Vec<vk::Image>> {
        self.state()
            .swapchains
            .get(&swapchain)
            .map(|record| record.images.clone())
            .ok_or_else(|| RhiError::InvalidHandle(format!("unknown swapchain {swapchain:?}")))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        if state.swapchains.remove(&swapchain).is_some() {
            state.stats.swapchains_destroyed += 1;
        }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        _signal: vk::Semaphore,
    ) -> Result<(u32, bool), vk::Result> {
        let mut state = self.state();
        state.stats.acquire_calls += 1;

        if let Some(scripted) = state.acquire_script.pop_front() {
            return match scripted {
                ScriptedAcquire::Image(index) => Ok((index, false)),
                ScriptedAcquire::Suboptimal(index) => Ok((index, true)),
                ScriptedAcquire::OutOfDate => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
                ScriptedAcquire::Error(result) => Err(result),
            };
        }

        let record = state
            .swapchains
            .get_mut(&swapchain)
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)?;
        if record.images.is_empty() {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        let index = record.next_image;
        record.next_image = (index + 1) % record.images.len() as u32;
        Ok((index, false))
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        _image_index: u32,
        _wait: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let mut state = self.state();
        state.stats.present_calls += 1;
        match state.present_script.pop_front() {
            None | Some(ScriptedPresent::Presented) => Ok(false),
            Some(ScriptedPresent::Suboptimal) => Ok(true),
            Some(ScriptedPresent::OutOfDate) => Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
            Some(ScriptedPresent::Error(result)) => Err(result),
        }
    }

    fn create_image(
        &self,
        _format: vk::Format,
        _extent: vk::Extent2D,
        _usage: vk::ImageUsageFlags,
        _name: &str,
    ) -> RhiResult<(vk::Image, MockAllocation)> {
        let mut state = self.state();
        if let Some(result) = state.fail_next_allocation.take() {
            return Err(RhiError::from(result));
        }
        let image = vk::Image::from_raw(state.handle());
        let id = state.handle();
        state.images.insert(image, id);
        Ok((image, MockAllocation { id, mapped: false }))
    }

    fn destroy_image(&self, image: vk::Image, _allocation: MockAllocation) {
        self.state().images.remove(&image);
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> RhiResult<vk::ImageView> {
        let mut state = self.state();
        let view = vk::ImageView::from_raw(state.handle());
        state.views.insert(view, image);
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().views.remove(&view);
    }

    fn create_framebuffer(
        &self,
        _render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        _extent: vk::Extent2D,
    ) -> RhiResult<vk::Framebuffer> {
        let mut state = self.state();
        let framebuffer = vk::Framebuffer::from_raw(state.handle());
        state.framebuffers.insert(framebuffer, attachments.to_vec());
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().framebuffers.remove(&framebuffer);
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        _name: &str,
    ) -> RhiResult<(vk::Buffer, MockAllocation)> {
        let mut state = self.state();
        if let Some(result) = state.fail_next_allocation.take() {
            return Err(RhiError::from(result));
        }
        let buffer = vk::Buffer::from_raw(state.handle());
        let id = state.handle();
        state.memory.insert(id, vec![0; size as usize]);
        state.buffers.insert(
            buffer,
            BufferRecord {
                allocation: id,
                size,
            },
        );
        let mapped = matches!(location, MemoryLocation::CpuToGpu | MemoryLocation::GpuToCpu);
        Ok((buffer, MockAllocation { id, mapped }))
    }

    fn write_buffer(
        &self,
        allocation: &mut MockAllocation,
        offset: usize,
        data: &[u8],
    ) -> RhiResult<()> {
        if !allocation.mapped {
            return Err(RhiError::InvalidHandle("Buffer memory is not mapped".to_string()));
        }
        let mut state = self.state();
        let memory = state
            .memory
            .get_mut(&allocation.id)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer allocation was freed".to_string()))?;
        let end = offset + data.len();
        if end > memory.len() {
            return Err(RhiError::InvalidHandle(format!(
                "Write of {} bytes at {} exceeds allocation of {}",
                data.len(),
                offset,
                memory.len()
            )));
        }
        memory[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: MockAllocation) {
        let mut state = self.state();
        state.buffers.remove(&buffer);
        state.memory.remove(&allocation.id);
    }

    fn create_descriptor_pool(
        &self,
        _max_sets: u32,
        _uniform_descriptors: u32,
    ) -> RhiResult<vk::DescriptorPool> {
        let mut state = self.state();
        let pool = vk::DescriptorPool::from_raw(state.handle());
        state.descriptor_pools.insert(pool);
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().descriptor_pools.remove(&pool);
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state();
        if !state.descriptor_pools.contains(&pool) {
            return Err(RhiError::InvalidHandle(format!("unknown descriptor pool {pool:?}")));
        }
        let sets: Vec<vk::DescriptorSet> = (0..count)
            .map(|_| vk::DescriptorSet::from_raw(state.handle()))
            .collect();
        for set in &sets {
            state.descriptor_sets.insert(*set, HashMap::new());
        }
        Ok(sets)
    }

    fn write_uniform_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        _range: vk::DeviceSize,
    ) {
        if let Some(bindings) = self.state().descriptor_sets.get_mut(&set) {
            bindings.insert(binding, buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wait_retires_pending_submission() {
        let device = MockDevice::new();
        let pool = device.create_command_pool(0, false).unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let fence = device.create_fence(false).unwrap();

        device
            .queue_submit(QueueRole::Graphics, &SubmitDesc::standalone(cmd), fence)
            .unwrap();
        assert_eq!(device.pending_submission_count(), 1);

        device.wait_for_fences(&[fence], u64::MAX).unwrap();
        assert_eq!(device.pending_submission_count(), 0);
        assert_eq!(device.stats().blocking_fence_waits, 1);
    }

    #[test]
    fn test_waiting_on_orphaned_unsignaled_fence_times_out() {
        let device = MockDevice::new();
        let fence = device.create_fence(false).unwrap();
        let result = device.wait_for_fences(&[fence], 1_000);
        assert!(matches!(result, Err(RhiError::FenceTimeout { timeout_ns: 1_000 })));
    }

    #[test]
    fn test_scripted_acquire_and_present() {
        let device = MockDevice::new();
        device.script_acquire(ScriptedAcquire::OutOfDate);
        device.script_present(ScriptedPresent::Suboptimal);

        let acquired =
            device.acquire_next_image(vk::SwapchainKHR::null(), 0, vk::Semaphore::null());
        assert_eq!(acquired, Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let presented = device.queue_present(vk::SwapchainKHR::null(), 0, vk::Semaphore::null());
        assert_eq!(presented, Ok(true));
    }

    #[test]
    fn test_submit_failure_is_classified() {
        let device = MockDevice::new();
        device.fail_next_submit(vk::Result::ERROR_DEVICE_LOST);
        let result = device.queue_submit(
            QueueRole::Graphics,
            &SubmitDesc::standalone(vk::CommandBuffer::null()),
            vk::Fence::null(),
        );
        assert!(matches!(result, Err(RhiError::DeviceLost)));
    }
}
