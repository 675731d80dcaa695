use ash::vk::{self, Handle};

use vkframe_rhi::RhiError;
use vkframe_rhi::facade::QueueFamilies;
use vkframe_rhi::mock::{MockDevice, ScriptedAcquire, ScriptedPresent};
use vkframe_rhi::swapchain::{
    AcquireOutcome, ChainPreferences, ChainState, PresentOutcome, RenderTargetLayout,
    SurfaceImageChain,
};

const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

fn layout(depth: bool) -> RenderTargetLayout {
    RenderTargetLayout {
        render_pass: vk::RenderPass::from_raw(0x50_0001),
        depth_format: depth.then_some(vk::Format::D32_SFLOAT),
    }
}

#[test]
fn test_build_creates_one_framebuffer_per_image() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    assert_eq!(chain.state(), ChainState::Uninitialized);

    chain.build(&layout(false), EXTENT).unwrap();

    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(chain.image_count(), 3);
    assert_eq!(chain.present_mode(), vk::PresentModeKHR::MAILBOX);
    assert_eq!(chain.format(), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(device.live_framebuffer_count(), 3);
    assert_eq!(device.live_view_count(), 3);

    for drawable in chain.drawables() {
        assert_eq!(
            device.framebuffer_attachments(drawable.framebuffer),
            vec![drawable.view]
        );
    }

    chain.teardown();
}

#[test]
fn test_depth_attachment_is_shared_by_all_framebuffers() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(true), EXTENT).unwrap();

    assert!(chain.has_depth());
    assert_eq!(device.live_image_count(), 1);

    let depth_views: Vec<vk::ImageView> = chain
        .drawables()
        .iter()
        .map(|drawable| device.framebuffer_attachments(drawable.framebuffer)[1])
        .collect();
    assert!(depth_views.windows(2).all(|pair| pair[0] == pair[1]));

    chain.recreate(&layout(true), EXTENT).unwrap();
    assert_eq!(device.live_image_count(), 1);

    chain.teardown();
    assert_eq!(device.live_image_count(), 0);
}

#[test]
fn test_unified_queue_family_uses_exclusive_sharing() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(false), EXTENT).unwrap();

    let desc = device.last_swapchain_desc().unwrap();
    assert_eq!(
        desc.queue_families.image_sharing(),
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    );
    chain.teardown();
}

#[test]
fn test_separate_queue_families_use_concurrent_sharing() {
    let device = MockDevice::shared();
    device.set_queue_families(QueueFamilies {
        graphics: 0,
        present: 2,
    });
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(false), EXTENT).unwrap();

    let desc = device.last_swapchain_desc().unwrap();
    assert!(!desc.queue_families.is_unified());
    assert_eq!(
        desc.queue_families.image_sharing(),
        (vk::SharingMode::CONCURRENT, vec![0, 2])
    );
    chain.teardown();
}

#[test]
fn test_zero_extent_is_rejected_before_device_calls() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());

    let result = chain.build(
        &layout(false),
        vk::Extent2D {
            width: 0,
            height: 600,
        },
    );
    assert!(matches!(result, Err(RhiError::ZeroExtent { width: 0, .. })));
    assert_eq!(device.stats().swapchains_created, 0);
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_recreate_with_zero_extent_keeps_existing_chain() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(false), EXTENT).unwrap();
    let live = device.live_object_count();

    let result = chain.recreate(
        &layout(false),
        vk::Extent2D {
            width: 800,
            height: 0,
        },
    );
    assert!(matches!(result, Err(RhiError::ZeroExtent { .. })));
    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(device.live_object_count(), live);
    chain.teardown();
}

#[test]
fn test_failed_depth_allocation_releases_partial_chain() {
    let device = MockDevice::shared();
    device.fail_next_allocation(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());

    let error = chain.build(&layout(true), EXTENT).unwrap_err();
    assert!(error.is_resource_exhaustion());
    assert_eq!(chain.state(), ChainState::Uninitialized);
    assert_eq!(chain.image_count(), 0);
    assert_eq!(device.live_swapchain_count(), 0);
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_zero_surface_extent_keeps_existing_chain() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(true), EXTENT).unwrap();
    let live = device.live_object_count();
    let images = chain.image_count();

    // The window still reports a size, but the surface already shrank to 0x0.
    device.set_surface_extent(0, 0);
    let result = chain.recreate(&layout(true), EXTENT);
    assert!(matches!(
        result,
        Err(RhiError::ZeroExtent {
            width: 0,
            height: 0
        })
    ));
    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(chain.image_count(), images);
    assert_eq!(device.live_object_count(), live);
    assert_eq!(device.stats().swapchains_destroyed, 0);

    device.set_surface_extent(1024, 768);
    chain.recreate(&layout(true), EXTENT).unwrap();
    assert_eq!(chain.extent().width, 1024);
    assert_eq!(chain.extent().height, 768);
    assert_eq!(chain.image_count(), images);

    chain.teardown();
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_color_format_is_fixed_across_rebuilds() {
    let device = MockDevice::shared();
    device.set_surface_formats(vec![
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ]);
    let preferences = ChainPreferences {
        surface_format: vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        ..Default::default()
    };
    let mut chain = SurfaceImageChain::new(device.clone(), preferences);
    chain.build(&layout(false), EXTENT).unwrap();
    assert_eq!(chain.format(), vk::Format::R8G8B8A8_UNORM);

    // The fallback order changes; the chain keeps what it was built with.
    device.set_surface_formats(vec![
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ]);
    chain.recreate(&layout(false), EXTENT).unwrap();
    assert_eq!(chain.format(), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(
        device.last_swapchain_desc().unwrap().surface_format.format,
        vk::Format::R8G8B8A8_UNORM
    );

    // Once the format is gone the rebuild is refused and the chain survives.
    device.set_surface_formats(vec![vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }]);
    let live = device.live_object_count();
    let result = chain.recreate(&layout(false), EXTENT);
    assert!(matches!(result, Err(RhiError::SwapchainError(_))));
    assert_eq!(chain.state(), ChainState::Ready);
    assert_eq!(chain.format(), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(device.live_object_count(), live);

    chain.teardown();
}

#[test]
fn test_staleness_is_reported_as_values() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(false), EXTENT).unwrap();
    let semaphore = vk::Semaphore::from_raw(0x50_0002);

    device.script_acquire(ScriptedAcquire::OutOfDate);
    assert_eq!(
        chain.acquire_next(u64::MAX, semaphore).unwrap(),
        AcquireOutcome::Invalidated
    );
    assert_eq!(chain.state(), ChainState::Ready);

    assert_eq!(
        chain.acquire_next(u64::MAX, semaphore).unwrap(),
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        }
    );

    device.script_present(ScriptedPresent::Suboptimal);
    assert_eq!(
        chain.present(0, semaphore).unwrap(),
        PresentOutcome::Suboptimal
    );
    device.script_present(ScriptedPresent::OutOfDate);
    assert_eq!(
        chain.present(0, semaphore).unwrap(),
        PresentOutcome::Invalidated
    );

    device.script_present(ScriptedPresent::Error(vk::Result::ERROR_DEVICE_LOST));
    assert!(chain.present(0, semaphore).unwrap_err().is_device_lost());

    chain.teardown();
}

#[test]
fn test_teardown_is_idempotent() {
    let device = MockDevice::shared();
    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.teardown();
    assert_eq!(chain.state(), ChainState::Destroyed);

    let mut chain = SurfaceImageChain::new(device.clone(), ChainPreferences::default());
    chain.build(&layout(true), EXTENT).unwrap();
    chain.teardown();
    chain.teardown();

    assert_eq!(chain.state(), ChainState::Destroyed);
    assert_eq!(chain.image_count(), 0);
    assert_eq!(device.stats().swapchains_destroyed, 1);
    assert_eq!(device.live_object_count(), 0);
}
