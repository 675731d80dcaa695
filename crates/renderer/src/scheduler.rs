//! Frame scheduling over a surface image chain.
//!
//! [`FrameScheduler`] owns `K` frame slots and drives one frame per
//! [`render_frame`](FrameScheduler::render_frame) call:
//!
//! ```text
//! wait slot fence → acquire → wait image owner → claim image → reset fence
//!     → write uniforms → record → submit → present → (recreate) → advance
//! ```
//!
//! What the scheduler allocates per slot is decided once by a
//! [`FrameCapabilities`] descriptor instead of by separate renderer types.
//!
//! # Thread Safety
//!
//! One thread drives the scheduler. The image-in-flight table and the chain's
//! image list have exactly one writer.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use vkframe_platform::DrawableSource;
use vkframe_rhi::command::{
    CommandRecorder, DrawResources, DrawTarget, PipelineBinding, PushConstants,
};
use vkframe_rhi::descriptor::UniformDescriptorPool;
use vkframe_rhi::facade::{DeviceFacade, QueueRole, SubmitDesc};
use vkframe_rhi::swapchain::{
    AcquireOutcome, ChainState, PresentOutcome, RenderTargetLayout, SurfaceImageChain,
};
use vkframe_rhi::{RhiError, RhiResult};

use crate::frame::{FrameSlot, ImagesInFlight};
use crate::uniform::{UniformData, UniformSnapshot};

/// Static description of what each frame slot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCapabilities {
    /// The chain has a depth attachment and the recorder clears it.
    pub has_depth: bool,
    /// Each slot binds its own descriptor set.
    pub has_descriptor_sets: bool,
    /// Each slot owns a uniform snapshot written every frame.
    pub has_uniforms: bool,
}

impl FrameCapabilities {
    /// Depth, per-slot descriptor sets and uniforms.
    pub const FULL: Self = Self {
        has_depth: true,
        has_descriptor_sets: true,
        has_uniforms: true,
    };

    /// Color only, no per-slot resources beyond sync primitives.
    pub const MINIMAL: Self = Self {
        has_depth: false,
        has_descriptor_sets: false,
        has_uniforms: false,
    };

    /// Rejects combinations that cannot work.
    ///
    /// A descriptor set without a uniform buffer behind it has nothing to
    /// point at. Uniforms without sets are accepted; they are written but
    /// never bound.
    pub fn validate(&self) -> RhiResult<()> {
        if self.has_descriptor_sets && !self.has_uniforms {
            return Err(RhiError::InvalidConfig(
                "descriptor sets require uniform buffers".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for FrameCapabilities {
    fn default() -> Self {
        Self::FULL
    }
}

/// Scheduler construction parameters.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Number of frame slots (`K`).
    pub frames_in_flight: usize,
    /// Upper bound for every fence wait and for image acquisition.
    pub fence_timeout_ns: u64,
    pub clear_color: [f32; 4],
    pub capabilities: FrameCapabilities,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: crate::MAX_FRAMES_IN_FLIGHT,
            fence_timeout_ns: 5_000_000_000,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            capabilities: FrameCapabilities::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> RhiResult<()> {
        if self.frames_in_flight == 0 {
            return Err(RhiError::InvalidConfig(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout_ns == 0 {
            return Err(RhiError::InvalidConfig(
                "fence timeout must be non-zero".to_string(),
            ));
        }
        self.capabilities.validate()
    }
}

/// Geometry drawn every frame.
#[derive(Clone, Copy, Debug)]
pub struct MeshBinding {
    pub vertex_buffer: vk::Buffer,
    /// 32-bit indices.
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Per-tick inputs of [`FrameScheduler::render_frame`].
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    pub mesh: MeshBinding,
    /// Written into the slot's uniform snapshot when the slot has one.
    pub uniforms: UniformData,
    pub push_constants: Option<&'a PushConstants>,
}

/// What one [`FrameScheduler::render_frame`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented.
    Presented,
    /// The frame was submitted and the chain was rebuilt afterwards.
    /// `presented` is false when presentation reported a stale surface.
    Recreated { presented: bool },
    /// Acquisition found a stale surface. The chain was rebuilt, nothing
    /// was submitted and the frame counter did not move.
    Skipped,
    /// A close was requested. Nothing was submitted.
    Closed,
}

/// Drives the acquire, record, submit and present cycle over `K` frame slots.
pub struct FrameScheduler<D: DeviceFacade> {
    device: Arc<D>,
    config: SchedulerConfig,
    chain: SurfaceImageChain<D>,
    layout: RenderTargetLayout,
    recorder: CommandRecorder,
    pipeline: PipelineBinding,
    command_pool: vk::CommandPool,
    slots: Vec<FrameSlot>,
    uniforms: Vec<UniformSnapshot<D>>,
    descriptors: Option<UniformDescriptorPool<D>>,
    images_in_flight: ImagesInFlight,
    frame_counter: u64,
    recreate_count: usize,
    shut_down: bool,
}

impl<D: DeviceFacade> FrameScheduler<D> {
    /// Takes ownership of a built chain and allocates the frame slots.
    ///
    /// `descriptor_set_layout` is required when the capabilities ask for
    /// descriptor sets. Slot fences start signaled.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidConfig`] for a contradictory configuration or a
    ///   chain that is not built, before any device call
    /// - Any device error while allocating slots. Everything allocated so far,
    ///   including the chain, is released.
    pub fn new(
        device: Arc<D>,
        chain: SurfaceImageChain<D>,
        layout: RenderTargetLayout,
        pipeline: PipelineBinding,
        descriptor_set_layout: Option<vk::DescriptorSetLayout>,
        config: SchedulerConfig,
    ) -> RhiResult<Self> {
        config.validate()?;

        let capabilities = config.capabilities;
        if capabilities.has_depth != layout.depth_format.is_some() {
            return Err(RhiError::InvalidConfig(format!(
                "has_depth is {} but the render target layout depth format is {:?}",
                capabilities.has_depth, layout.depth_format
            )));
        }
        if capabilities.has_descriptor_sets && descriptor_set_layout.is_none() {
            return Err(RhiError::InvalidConfig(
                "descriptor sets requested without a descriptor set layout".to_string(),
            ));
        }
        if chain.state() != ChainState::Ready {
            return Err(RhiError::InvalidConfig(format!(
                "surface image chain must be built first (state {:?})",
                chain.state()
            )));
        }

        let image_count = chain.image_count();
        let mut scheduler = Self {
            device,
            config,
            chain,
            layout,
            recorder: CommandRecorder::new(config.clear_color).with_depth(capabilities.has_depth),
            pipeline,
            command_pool: vk::CommandPool::null(),
            slots: Vec::with_capacity(config.frames_in_flight),
            uniforms: Vec::new(),
            descriptors: None,
            images_in_flight: ImagesInFlight::new(image_count),
            frame_counter: 0,
            recreate_count: 0,
            shut_down: false,
        };

        // On failure `scheduler` is dropped, which releases the partial state.
        scheduler.allocate_slots(descriptor_set_layout)?;

        info!(
            "Frame scheduler created: {} slot(s), {} drawable image(s), {:?}",
            scheduler.slots.len(),
            image_count,
            capabilities
        );

        Ok(scheduler)
    }

    fn allocate_slots(
        &mut self,
        descriptor_set_layout: Option<vk::DescriptorSetLayout>,
    ) -> RhiResult<()> {
        let count = self.config.frames_in_flight;
        let capabilities = self.config.capabilities;

        let family = self.device.queue_families().graphics;
        self.command_pool = self.device.create_command_pool(family, false)?;
        let command_buffers = self
            .device
            .allocate_command_buffers(self.command_pool, count as u32)?;

        for command_buffer in command_buffers {
            match FrameSlot::create(&*self.device, command_buffer) {
                Ok(slot) => self.slots.push(slot),
                Err(e) => {
                    self.device
                        .free_command_buffers(self.command_pool, &[command_buffer]);
                    return Err(e);
                }
            }
        }

        if capabilities.has_uniforms {
            for _ in 0..count {
                self.uniforms.push(UniformSnapshot::new(self.device.clone())?);
            }
        }

        if capabilities.has_descriptor_sets
            && let Some(set_layout) = descriptor_set_layout
        {
            let pool = UniformDescriptorPool::new(self.device.clone(), set_layout, count as u32)?;
            for (index, uniform) in self.uniforms.iter().enumerate() {
                pool.bind_uniform(index, uniform.handle(), uniform.size())?;
            }
            self.descriptors = Some(pool);
        }

        debug!("Allocated {} frame slot(s)", count);
        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// `resize_requested` comes from the host's event queue; when set, the
    /// chain is rebuilt after this frame's present. A stale surface at
    /// acquisition rebuilds the chain and returns [`FrameStatus::Skipped`];
    /// the caller simply tries again next tick.
    ///
    /// # Errors
    ///
    /// Everything except surface staleness is fatal: fence timeouts, device
    /// loss, memory exhaustion and other device failures.
    pub fn render_frame<S: DrawableSource + ?Sized>(
        &mut self,
        resize_requested: bool,
        drawable: &mut S,
        input: &FrameInput<'_>,
    ) -> RhiResult<FrameStatus> {
        if self.shut_down {
            return Err(RhiError::InvalidHandle(
                "Frame scheduler was already shut down".to_string(),
            ));
        }
        if drawable.close_requested() {
            return Ok(FrameStatus::Closed);
        }

        let slot_index = (self.frame_counter % self.slots.len() as u64) as usize;
        let slot = self.slots[slot_index];
        let timeout = self.config.fence_timeout_ns;

        self.device.wait_for_fences(&[slot.in_flight], timeout)?;

        let acquired = self.chain.acquire_next(timeout, slot.image_acquired)?;
        let (image_index, suboptimal) = match acquired {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::Invalidated => {
                debug!("Surface stale at acquisition; rebuilding before the next frame");
                return Ok(if self.recreate(drawable)? {
                    FrameStatus::Skipped
                } else {
                    FrameStatus::Closed
                });
            }
        };

        // Another slot may still be rendering into this image.
        if let Some(owner) = self.images_in_flight.owner(image_index)
            && owner != slot.in_flight
        {
            self.device.wait_for_fences(&[owner], timeout)?;
        }
        self.images_in_flight.claim(image_index, slot.in_flight);

        self.device.reset_fences(&[slot.in_flight])?;

        if let Some(snapshot) = self.uniforms.get_mut(slot_index) {
            snapshot.write(&input.uniforms)?;
        }

        let framebuffer = self
            .chain
            .drawable(image_index)
            .map(|image| image.framebuffer)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "Acquired image index {} out of range ({} images)",
                    image_index,
                    self.chain.image_count()
                ))
            })?;

        let target = DrawTarget {
            render_pass: self.layout.render_pass,
            framebuffer,
            extent: self.chain.extent(),
        };
        let resources = DrawResources {
            vertex_buffer: input.mesh.vertex_buffer,
            index_buffer: input.mesh.index_buffer,
            index_count: input.mesh.index_count,
            descriptor_set: self
                .descriptors
                .as_ref()
                .and_then(|pool| pool.set(slot_index)),
            push_constants: input.push_constants.cloned(),
        };
        self.recorder.record(
            &*self.device,
            slot.command_buffer,
            &target,
            &self.pipeline,
            &resources,
        )?;

        let submit = SubmitDesc {
            command_buffer: slot.command_buffer,
            wait_semaphore: Some(slot.image_acquired),
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: Some(slot.render_finished),
        };
        self.device
            .queue_submit(QueueRole::Graphics, &submit, slot.in_flight)?;

        let presented = self.chain.present(image_index, slot.render_finished)?;

        let status = if presented.needs_recreate() || suboptimal || resize_requested {
            debug!(
                "Rebuilding chain after present ({:?}, suboptimal acquire: {}, resize: {})",
                presented, suboptimal, resize_requested
            );
            if self.recreate(drawable)? {
                FrameStatus::Recreated {
                    presented: presented != PresentOutcome::Invalidated,
                }
            } else {
                FrameStatus::Closed
            }
        } else {
            FrameStatus::Presented
        };

        self.frame_counter += 1;
        Ok(status)
    }

    /// Drains the device and rebuilds the chain for the current drawable size.
    ///
    /// While the drawable or the surface has zero area this keeps waiting for
    /// window events; the old chain stays in place meanwhile. Returns
    /// `Ok(false)` without touching the chain if a close is requested during
    /// that wait.
    ///
    /// # Errors
    ///
    /// Device errors from the idle wait or the rebuild.
    pub fn recreate<S: DrawableSource + ?Sized>(&mut self, drawable: &mut S) -> RhiResult<bool> {
        let mut drained = false;
        loop {
            let size = drawable.drawable_size();
            if !size.is_zero() {
                if !drained {
                    self.device.wait_idle()?;
                    drained = true;
                }

                let extent = vk::Extent2D {
                    width: size.width,
                    height: size.height,
                };
                match self.chain.recreate(&self.layout, extent) {
                    Ok(()) => break,
                    // The surface can report zero area before the window does.
                    Err(RhiError::ZeroExtent { width, height }) => {
                        debug!("Surface extent is {}x{}; waiting", width, height);
                    }
                    Err(error) => return Err(error),
                }
            }

            if drawable.close_requested() {
                info!("Close requested while minimized; skipping chain rebuild");
                return Ok(false);
            }
            drawable.wait_events();
        }

        self.images_in_flight.reset(self.chain.image_count());
        self.recreate_count += 1;

        Ok(true)
    }

    /// Waits for the device and releases everything the scheduler owns.
    ///
    /// Order: slot fences and semaphores, uniform snapshots, descriptor pool,
    /// command buffers and their pool, then the chain. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.device.wait_idle() {
            warn!("Device wait idle failed during scheduler shutdown: {}", e);
        }

        let command_buffers: Vec<vk::CommandBuffer> =
            self.slots.iter().map(|slot| slot.command_buffer).collect();
        for slot in self.slots.drain(..) {
            slot.destroy(&*self.device);
        }

        self.uniforms.clear();
        self.descriptors = None;

        if self.command_pool != vk::CommandPool::null() {
            if !command_buffers.is_empty() {
                self.device
                    .free_command_buffers(self.command_pool, &command_buffers);
            }
            self.device.destroy_command_pool(self.command_pool);
            self.command_pool = vk::CommandPool::null();
        }

        self.chain.teardown();

        info!(
            "Frame scheduler shut down after {} frame(s) and {} rebuild(s)",
            self.frame_counter, self.recreate_count
        );
    }

    /// Number of frames submitted so far.
    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    #[inline]
    pub fn capabilities(&self) -> FrameCapabilities {
        self.config.capabilities
    }

    #[inline]
    pub fn chain(&self) -> &SurfaceImageChain<D> {
        &self.chain
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot> {
        self.slots.get(index)
    }

    #[inline]
    pub fn images_in_flight(&self) -> &ImagesInFlight {
        &self.images_in_flight
    }

    /// Number of completed chain rebuilds.
    #[inline]
    pub fn recreate_count(&self) -> usize {
        self.recreate_count
    }

    pub fn uniform_buffer(&self, slot_index: usize) -> Option<vk::Buffer> {
        self.uniforms.get(slot_index).map(UniformSnapshot::handle)
    }

    pub fn descriptor_set(&self, slot_index: usize) -> Option<vk::DescriptorSet> {
        self.descriptors
            .as_ref()
            .and_then(|pool| pool.set(slot_index))
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<D: DeviceFacade> Drop for FrameScheduler<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
