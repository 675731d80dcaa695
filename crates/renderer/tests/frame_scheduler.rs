//! Frame lifecycle tests against the in-memory device.

use std::sync::Arc;

use ash::vk::{self, Handle};
use glam::{Mat4, Vec3};

use vkframe_platform::{DrawableSize, DrawableSource, StaticDrawable};
use vkframe_renderer::{
    FrameCapabilities, FrameInput, FrameScheduler, FrameStatus, MeshBinding, SchedulerConfig,
    UniformData,
};
use vkframe_rhi::RhiError;
use vkframe_rhi::buffer::{BufferUsage, DeviceBuffer};
use vkframe_rhi::command::{PipelineBinding, PushConstants};
use vkframe_rhi::mock::{MockDevice, RecordedCommand, ScriptedAcquire, ScriptedPresent};
use vkframe_rhi::swapchain::{ChainPreferences, ChainState, RenderTargetLayout, SurfaceImageChain};
use vkframe_rhi::transfer::TransferUploader;

struct Fixture {
    device: Arc<MockDevice>,
    scheduler: FrameScheduler<MockDevice>,
    mesh: MeshBinding,
    buffers: Vec<DeviceBuffer<MockDevice>>,
    uploader: TransferUploader<MockDevice>,
}

impl Fixture {
    fn new(device: Arc<MockDevice>, config: SchedulerConfig) -> Self {
        let uploader = TransferUploader::new(device.clone()).unwrap();
        let positions = [0.0f32, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0];
        let indices = [0u32, 1, 2];
        let vertices = uploader
            .upload_slice(&positions, BufferUsage::Vertex)
            .unwrap();
        let index_buffer = uploader.upload_slice(&indices, BufferUsage::Index).unwrap();
        let mesh = MeshBinding {
            vertex_buffer: vertices.handle(),
            index_buffer: index_buffer.handle(),
            index_count: indices.len() as u32,
        };

        let layout = RenderTargetLayout {
            render_pass: vk::RenderPass::from_raw(0x70_0001),
            depth_format: config
                .capabilities
                .has_depth
                .then_some(vk::Format::D32_SFLOAT),
        };
        let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
        chain
            .build(
                &layout,
                vk::Extent2D {
                    width: 800,
                    height: 600,
                },
            )
            .unwrap();

        let scheduler = FrameScheduler::new(
            device.clone(),
            chain,
            layout,
            pipeline(),
            Some(vk::DescriptorSetLayout::from_raw(0x70_0004)),
            config,
        )
        .unwrap();

        Self {
            device,
            scheduler,
            mesh,
            buffers: vec![vertices, index_buffer],
            uploader,
        }
    }

    fn with_defaults() -> Self {
        Self::new(MockDevice::shared(), SchedulerConfig::default())
    }

    fn input(&self) -> FrameInput<'static> {
        FrameInput {
            mesh: self.mesh,
            uniforms: UniformData::default(),
            push_constants: None,
        }
    }

    fn render(&mut self, drawable: &mut StaticDrawable) -> Result<FrameStatus, RhiError> {
        let input = self.input();
        self.scheduler.render_frame(false, drawable, &input)
    }
}

fn pipeline() -> PipelineBinding {
    PipelineBinding {
        pipeline: vk::Pipeline::from_raw(0x70_0002),
        layout: vk::PipelineLayout::from_raw(0x70_0003),
    }
}

fn config_with_slots(frames_in_flight: usize) -> SchedulerConfig {
    SchedulerConfig {
        frames_in_flight,
        ..Default::default()
    }
}

#[test]
fn test_800x600_chain_renders_and_presents() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    let chain = fixture.scheduler.chain();
    assert_eq!(chain.state(), ChainState::Ready);
    assert!((2..=3).contains(&chain.image_count()));
    assert_eq!(chain.extent().width, 800);
    assert_eq!(chain.extent().height, 600);

    let status = fixture.render(&mut drawable).unwrap();
    assert_eq!(status, FrameStatus::Presented);
    assert_eq!(fixture.scheduler.frame_counter(), 1);

    let stats = fixture.device.stats();
    assert_eq!(stats.acquire_calls, 1);
    assert_eq!(stats.present_calls, 1);
    assert_eq!(stats.submits_with_signaled_fence, 0);
}

#[test]
fn test_unsignaled_fences_never_exceed_frames_in_flight() {
    for frames_in_flight in 1..=3 {
        let device = MockDevice::shared();
        device.set_swapchain_image_count(Some(2));
        let mut fixture = Fixture::new(device, config_with_slots(frames_in_flight));
        let mut drawable = StaticDrawable::new(800, 600);

        for _ in 0..12 {
            assert_eq!(
                fixture.render(&mut drawable).unwrap(),
                FrameStatus::Presented
            );
            assert!(fixture.device.unsignaled_fence_count() <= frames_in_flight);
        }

        let stats = fixture.device.stats();
        assert!(
            stats.max_unsignaled_fences <= frames_in_flight,
            "K={} saw {} unsignaled fences",
            frames_in_flight,
            stats.max_unsignaled_fences
        );
        assert!(stats.max_pending_submissions <= frames_in_flight);
        assert_eq!(fixture.scheduler.frame_counter(), 12);
    }
}

#[test]
fn test_no_image_races_when_images_and_slots_differ() {
    for (frames_in_flight, image_count) in [(2, 1), (2, 3), (3, 2), (3, 1), (1, 3)] {
        let device = MockDevice::shared();
        device.set_swapchain_image_count(Some(image_count));
        let mut fixture = Fixture::new(device, config_with_slots(frames_in_flight));
        let mut drawable = StaticDrawable::new(800, 600);

        for _ in 0..10 {
            fixture.render(&mut drawable).unwrap();
        }

        assert_eq!(
            fixture.device.stats().image_races,
            0,
            "K={} with {} image(s)",
            frames_in_flight,
            image_count
        );
    }
}

#[test]
fn test_single_image_forces_owner_wait_on_second_frame() {
    let device = MockDevice::shared();
    device.set_swapchain_image_count(Some(1));
    let mut fixture = Fixture::new(device, config_with_slots(2));
    let mut drawable = StaticDrawable::new(800, 600);

    // Uploads already waited on their own fences.
    let baseline = fixture.device.stats().blocking_fence_waits;

    fixture.render(&mut drawable).unwrap();
    assert_eq!(fixture.device.stats().blocking_fence_waits, baseline);

    let first_owner = fixture.scheduler.images_in_flight().owner(0);
    assert_eq!(
        first_owner,
        fixture.scheduler.slot(0).map(|slot| slot.in_flight)
    );

    fixture.render(&mut drawable).unwrap();
    let stats = fixture.device.stats();
    assert_eq!(stats.blocking_fence_waits, baseline + 1);
    assert_eq!(stats.image_races, 0);
    assert_eq!(
        fixture.scheduler.images_in_flight().owner(0),
        fixture.scheduler.slot(1).map(|slot| slot.in_flight)
    );
}

#[test]
fn test_invalidated_acquire_recreates_without_presenting() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);
    fixture.render(&mut drawable).unwrap();

    let before = fixture.device.stats();
    fixture.device.script_acquire(ScriptedAcquire::OutOfDate);

    let status = fixture.render(&mut drawable).unwrap();
    assert_eq!(status, FrameStatus::Skipped);

    let after = fixture.device.stats();
    assert_eq!(after.present_calls, before.present_calls);
    assert_eq!(after.submit_calls, before.submit_calls);
    assert_eq!(after.swapchains_created, before.swapchains_created + 1);
    assert_eq!(fixture.scheduler.frame_counter(), 1);
    assert_eq!(fixture.scheduler.recreate_count(), 1);

    // The skipped slot's fence was never reset, so the retry does not hang.
    assert_eq!(
        fixture.render(&mut drawable).unwrap(),
        FrameStatus::Presented
    );
    assert_eq!(fixture.scheduler.frame_counter(), 2);
}

#[test]
fn test_stale_present_recreates_after_submitting() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    fixture.device.script_present(ScriptedPresent::Suboptimal);
    assert_eq!(
        fixture.render(&mut drawable).unwrap(),
        FrameStatus::Recreated { presented: true }
    );

    fixture.device.script_present(ScriptedPresent::OutOfDate);
    assert_eq!(
        fixture.render(&mut drawable).unwrap(),
        FrameStatus::Recreated { presented: false }
    );

    assert_eq!(fixture.scheduler.frame_counter(), 2);
    assert_eq!(fixture.scheduler.recreate_count(), 2);
    assert_eq!(fixture.device.live_swapchain_count(), 1);
}

#[test]
fn test_suboptimal_acquire_renders_then_recreates() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    fixture.device.script_acquire(ScriptedAcquire::Suboptimal(0));
    assert_eq!(
        fixture.render(&mut drawable).unwrap(),
        FrameStatus::Recreated { presented: true }
    );
    assert_eq!(fixture.device.stats().present_calls, 1);
    assert_eq!(fixture.scheduler.recreate_count(), 1);
}

#[test]
fn test_resize_flag_recreates_with_new_extent() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);
    fixture.render(&mut drawable).unwrap();

    fixture.device.set_surface_extent(1280, 720);
    drawable.set_size(1280, 720);

    let input = fixture.input();
    let status = fixture
        .scheduler
        .render_frame(true, &mut drawable, &input)
        .unwrap();
    assert_eq!(status, FrameStatus::Recreated { presented: true });

    let extent = fixture.scheduler.chain().extent();
    assert_eq!((extent.width, extent.height), (1280, 720));
    assert_eq!(
        fixture.scheduler.images_in_flight().len(),
        fixture.scheduler.chain().image_count()
    );

    // Viewport follows the new extent on the next frame.
    fixture.render(&mut drawable).unwrap();
    let slot = *fixture.scheduler.slot(0).unwrap();
    let commands = fixture.device.recorded_commands(slot.command_buffer);
    assert!(commands.contains(&RecordedCommand::SetViewport {
        width: 1280.0,
        height: 720.0,
    }));
}

#[test]
fn test_recreate_twice_is_idempotent() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    assert!(fixture.scheduler.recreate(&mut drawable).unwrap());
    let image_count = fixture.scheduler.chain().image_count();
    let extent = fixture.scheduler.chain().extent();
    let live_objects = fixture.device.live_object_count();

    assert!(fixture.scheduler.recreate(&mut drawable).unwrap());
    let chain = fixture.scheduler.chain();
    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(chain.image_count(), image_count);
    assert_eq!(
        (chain.extent().width, chain.extent().height),
        (extent.width, extent.height)
    );
    assert_eq!(fixture.device.live_object_count(), live_objects);
    assert_eq!(fixture.device.live_swapchain_count(), 1);

    assert_eq!(
        fixture.render(&mut drawable).unwrap(),
        FrameStatus::Presented
    );
}

#[test]
fn test_recreate_waits_out_a_minimized_window() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(0, 0);
    drawable.queue_size(0, 0);
    drawable.queue_size(1024, 768);
    fixture.device.set_surface_extent(1024, 768);

    let created_before = fixture.device.stats().swapchains_created;
    assert!(fixture.scheduler.recreate(&mut drawable).unwrap());

    assert_eq!(drawable.waits(), 2);
    assert_eq!(
        fixture.device.stats().swapchains_created,
        created_before + 1
    );
    let extent = fixture.scheduler.chain().extent();
    assert_eq!((extent.width, extent.height), (1024, 768));
}

/// Window that already reports its restored size while the surface still
/// reads 0x0; the surface catches up on the first event wait.
struct LaggingSurface {
    device: Arc<MockDevice>,
    size: DrawableSize,
    close_after_wait: bool,
    waits: usize,
}

impl LaggingSurface {
    fn new(device: Arc<MockDevice>) -> Self {
        device.set_surface_extent(0, 0);
        Self {
            device,
            size: DrawableSize::new(1024, 768),
            close_after_wait: false,
            waits: 0,
        }
    }
}

impl DrawableSource for LaggingSurface {
    fn drawable_size(&self) -> DrawableSize {
        self.size
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if !self.close_after_wait {
            self.device
                .set_surface_extent(self.size.width, self.size.height);
        }
    }

    fn close_requested(&self) -> bool {
        self.close_after_wait && self.waits > 0
    }
}

#[test]
fn test_zero_surface_extent_is_waited_out() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = LaggingSurface::new(fixture.device.clone());
    let images = fixture.scheduler.chain().image_count();

    assert!(fixture.scheduler.recreate(&mut drawable).unwrap());

    assert_eq!(drawable.waits, 1);
    assert_eq!(fixture.scheduler.recreate_count(), 1);
    let chain = fixture.scheduler.chain();
    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(chain.image_count(), images);
    assert_eq!((chain.extent().width, chain.extent().height), (1024, 768));
}

#[test]
fn test_close_during_surface_wait_keeps_chain() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = LaggingSurface::new(fixture.device.clone());
    drawable.close_after_wait = true;
    let images = fixture.scheduler.chain().image_count();

    assert!(!fixture.scheduler.recreate(&mut drawable).unwrap());
    assert_eq!(fixture.scheduler.recreate_count(), 0);
    assert_eq!(fixture.device.stats().swapchains_destroyed, 0);
    assert_eq!(fixture.scheduler.chain().state(), ChainState::Ready);
    assert_eq!(fixture.scheduler.chain().image_count(), images);

    fixture.device.set_surface_extent(800, 600);
    let mut restored = StaticDrawable::new(800, 600);
    assert_eq!(
        fixture.render(&mut restored).unwrap(),
        FrameStatus::Presented
    );
}

#[test]
fn test_close_while_minimized_abandons_recreate() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(0, 0);
    drawable.request_close();

    let created_before = fixture.device.stats().swapchains_created;
    assert!(!fixture.scheduler.recreate(&mut drawable).unwrap());
    assert_eq!(fixture.device.stats().swapchains_created, created_before);
    assert_eq!(fixture.scheduler.chain().state(), ChainState::Ready);
}

#[test]
fn test_close_request_is_honored_before_acquire() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);
    drawable.request_close();

    assert_eq!(fixture.render(&mut drawable).unwrap(), FrameStatus::Closed);
    assert_eq!(fixture.device.stats().acquire_calls, 0);
    assert_eq!(fixture.scheduler.frame_counter(), 0);
}

#[test]
fn test_device_loss_propagates() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    fixture.device.fail_next_submit(vk::Result::ERROR_DEVICE_LOST);
    let error = fixture.render(&mut drawable).unwrap_err();
    assert!(error.is_device_lost());
    assert_eq!(fixture.scheduler.recreate_count(), 0);
    assert_eq!(fixture.device.stats().present_calls, 0);
}

#[test]
fn test_acquire_failure_other_than_staleness_is_fatal() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    fixture
        .device
        .script_acquire(ScriptedAcquire::Error(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
    let error = fixture.render(&mut drawable).unwrap_err();
    assert!(error.is_resource_exhaustion());
    assert_eq!(fixture.scheduler.recreate_count(), 0);
}

#[test]
fn test_slot_resources_are_bound_and_written() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);

    for index in 0..2 {
        let set = fixture.scheduler.descriptor_set(index).unwrap();
        assert_eq!(
            fixture.device.descriptor_binding(set, 0),
            fixture.scheduler.uniform_buffer(index)
        );
    }

    let uniforms = UniformData::new(
        Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
        Mat4::look_at_rh(Vec3::new(-2.0, -2.0, 2.0), Vec3::ZERO, Vec3::Z),
        Mat4::IDENTITY,
    );
    let push = PushConstants::from_value(vk::ShaderStageFlags::FRAGMENT, &1u32);
    let input = FrameInput {
        mesh: fixture.mesh,
        uniforms,
        push_constants: Some(&push),
    };
    fixture
        .scheduler
        .render_frame(false, &mut drawable, &input)
        .unwrap();

    let buffer = fixture.scheduler.uniform_buffer(0).unwrap();
    let contents = fixture.device.buffer_contents(buffer).unwrap();
    assert_eq!(contents.as_slice(), bytemuck::bytes_of(&uniforms));

    let slot = *fixture.scheduler.slot(0).unwrap();
    let commands = fixture.device.recorded_commands(slot.command_buffer);
    let set = fixture.scheduler.descriptor_set(0).unwrap();
    assert!(commands.contains(&RecordedCommand::BindDescriptorSet(set)));
    assert!(commands.contains(&RecordedCommand::PushConstants {
        stages: vk::ShaderStageFlags::FRAGMENT,
        data: 1u32.to_ne_bytes().to_vec(),
    }));
    assert!(commands.contains(&RecordedCommand::DrawIndexed(3)));
    assert!(matches!(
        commands.first(),
        Some(RecordedCommand::BeginRenderPass {
            clear_value_count: 2,
            ..
        })
    ));
}

#[test]
fn test_minimal_capabilities_allocate_no_slot_resources() {
    let device = MockDevice::shared();
    let config = SchedulerConfig {
        capabilities: FrameCapabilities::MINIMAL,
        ..Default::default()
    };
    let mut fixture = Fixture::new(device, config);
    let mut drawable = StaticDrawable::new(800, 600);

    assert!(fixture.scheduler.uniform_buffer(0).is_none());
    assert!(fixture.scheduler.descriptor_set(0).is_none());
    assert!(!fixture.scheduler.chain().has_depth());

    fixture.render(&mut drawable).unwrap();
    let slot = *fixture.scheduler.slot(0).unwrap();
    let commands = fixture.device.recorded_commands(slot.command_buffer);
    assert!(
        !commands
            .iter()
            .any(|command| matches!(command, RecordedCommand::BindDescriptorSet(_)))
    );
    assert!(matches!(
        commands.first(),
        Some(RecordedCommand::BeginRenderPass {
            clear_value_count: 1,
            ..
        })
    ));
}

#[test]
fn test_contradictory_configuration_is_rejected() {
    let device = MockDevice::shared();
    let layout = RenderTargetLayout {
        render_pass: vk::RenderPass::from_raw(0x70_0001),
        depth_format: None,
    };
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain
        .build(
            &layout,
            vk::Extent2D {
                width: 800,
                height: 600,
            },
        )
        .unwrap();
    let live_before = device.live_object_count();

    // Depth requested, but the layout has no depth attachment.
    let result = FrameScheduler::new(
        device.clone(),
        chain,
        layout,
        pipeline(),
        Some(vk::DescriptorSetLayout::from_raw(0x70_0004)),
        SchedulerConfig::default(),
    );
    assert!(matches!(result, Err(RhiError::InvalidConfig(_))));

    // Rejected before any device call; the chain was dropped with the error.
    assert!(device.live_object_count() < live_before);
    assert_eq!(device.live_fence_count(), 0);
    assert_eq!(device.live_command_pool_count(), 0);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut fixture = Fixture::with_defaults();
    let mut drawable = StaticDrawable::new(800, 600);
    for _ in 0..5 {
        fixture.render(&mut drawable).unwrap();
    }
    fixture.scheduler.recreate(&mut drawable).unwrap();

    fixture.scheduler.shutdown();
    fixture.scheduler.shutdown();
    assert!(fixture.scheduler.is_shut_down());
    assert_eq!(fixture.scheduler.chain().state(), ChainState::Destroyed);
    assert!(matches!(
        fixture.render(&mut drawable),
        Err(RhiError::InvalidHandle(_))
    ));

    let Fixture {
        device,
        scheduler,
        buffers,
        mut uploader,
        ..
    } = fixture;
    drop(scheduler);
    drop(buffers);
    uploader.destroy();

    assert_eq!(device.live_object_count(), 0);
    assert_eq!(device.pending_submission_count(), 0);
}

#[test]
fn test_dropping_scheduler_shuts_it_down() {
    let device = MockDevice::shared();
    {
        let mut fixture = Fixture::new(device.clone(), SchedulerConfig::default());
        let mut drawable = StaticDrawable::new(800, 600);
        fixture.render(&mut drawable).unwrap();
    }
    assert_eq!(device.live_object_count(), 0);
}
