//! Surface image chain management.
//!
//! This module owns the swapchain, its drawable images and everything built on
//! top of them (image views, an optional depth attachment, framebuffers).
//!
//! # Overview
//!
//! The [`SurfaceImageChain`] provides:
//! - Negotiation of format, present mode, extent and image count from the
//!   surface capabilities ([`negotiate`])
//! - Image acquisition and presentation with staleness reported as values
//!   ([`AcquireOutcome`], [`PresentOutcome`]) rather than errors
//! - Full teardown and rebuild on surface invalidation ([`SurfaceImageChain::recreate`])
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --build--> Ready --recreate--> Ready --teardown--> Destroyed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::swapchain::{
//!     AcquireOutcome, ChainPreferences, RenderTargetLayout, SurfaceImageChain,
//! };
//! use ash::vk;
//!
//! # fn example(
//! #     device: Arc<Device>,
//! #     render_pass: vk::RenderPass,
//! #     acquired: vk::Semaphore,
//! # ) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = RenderTargetLayout { render_pass, depth_format: None };
//! let drawable = vk::Extent2D { width: 800, height: 600 };
//!
//! let mut chain = SurfaceImageChain::new(device, ChainPreferences::default());
//! chain.build(&layout, drawable)?;
//!
//! match chain.acquire_next(u64::MAX, acquired)? {
//!     AcquireOutcome::Acquired { image_index, .. } => {
//!         println!("render into image {image_index}");
//!     }
//!     AcquireOutcome::Invalidated => chain.recreate(&layout, drawable)?,
//! }
//!
//! chain.teardown();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::facade::{DeviceFacade, SwapchainDesc};

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Checks if the swapchain support is adequate for rendering.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// What the chain asks the surface for. Unsupported choices fall back.
#[derive(Clone, Copy, Debug)]
pub struct ChainPreferences {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl Default for ChainPreferences {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::MAILBOX,
        }
    }
}

/// Parameters chosen from the surface capabilities.
#[derive(Clone, Copy, Debug)]
pub struct NegotiatedChain {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

/// How the framebuffers of the chain are laid out.
#[derive(Clone, Copy, Debug)]
pub struct RenderTargetLayout {
    /// Render pass every framebuffer must be compatible with.
    pub render_pass: vk::RenderPass,
    /// Format of the shared depth attachment, if any.
    pub depth_format: Option<vk::Format>,
}

/// One presentable image and what renders into it.
#[derive(Clone, Copy, Debug)]
pub struct DrawableImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

/// Lifecycle state of a [`SurfaceImageChain`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
    Uninitialized,
    Ready,
    Destroyed,
}

/// Result of [`SurfaceImageChain::acquire_next`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image at `image_index` will be ready once the semaphore signals.
    /// `suboptimal` asks for a rebuild at the next convenient point.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface no longer matches the chain. Nothing was acquired.
    Invalidated,
}

/// Result of [`SurfaceImageChain::present`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the chain should be rebuilt.
    Suboptimal,
    /// Not presented; the chain must be rebuilt.
    Invalidated,
}

impl PresentOutcome {
    /// Returns true when the chain should be rebuilt after this present.
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

struct DepthTarget<A> {
    image: vk::Image,
    view: vk::ImageView,
    allocation: A,
}

/// Swapchain plus per-image views and framebuffers.
///
/// All drawable images share one format and one extent. The chain is never
/// patched in place: [`recreate`](Self::recreate) tears everything down and
/// builds it again.
///
/// # Thread Safety
///
/// Only the scheduling thread touches the chain. The image list is mutated
/// only inside `build`, `recreate` and `teardown`.
pub struct SurfaceImageChain<D: DeviceFacade> {
    device: Arc<D>,
    preferences: ChainPreferences,
    state: ChainState,
    swapchain: vk::SwapchainKHR,
    drawables: Vec<DrawableImage>,
    depth: Option<DepthTarget<D::Allocation>>,
    surface_format: vk::SurfaceFormatKHR,
    format_fixed: bool,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl<D: DeviceFacade> SurfaceImageChain<D> {
    /// Creates an empty chain. Nothing is allocated until [`build`](Self::build).
    pub fn new(device: Arc<D>, preferences: ChainPreferences) -> Self {
        Self {
            device,
            preferences,
            state: ChainState::Uninitialized,
            swapchain: vk::SwapchainKHR::null(),
            drawables: Vec::new(),
            depth: None,
            surface_format: preferences.surface_format,
            format_fixed: false,
            present_mode: preferences.present_mode,
            extent: vk::Extent2D::default(),
        }
    }

    /// Negotiates parameters and allocates the swapchain, image views, the
    /// optional depth target and one framebuffer per image.
    ///
    /// Once a build has succeeded, the color format is fixed for the life of
    /// the chain so that the render pass stays compatible.
    ///
    /// # Errors
    ///
    /// - [`RhiError::ZeroExtent`] for a zero-area drawable, before any device call
    /// - [`RhiError::SwapchainError`] if the surface reports no formats or modes,
    ///   or no longer supports the fixed color format
    /// - Any device error while creating objects. Objects created before the
    ///   failure are released and the chain is left `Uninitialized`.
    pub fn build(&mut self, layout: &RenderTargetLayout, drawable: vk::Extent2D) -> RhiResult<()> {
        if drawable.width == 0 || drawable.height == 0 {
            return Err(RhiError::ZeroExtent {
                width: drawable.width,
                height: drawable.height,
            });
        }

        let (support, negotiated) = self.negotiate_for(drawable)?;
        self.release();
        self.allocate_or_reset(layout, &support, &negotiated)
    }

    fn allocate_or_reset(
        &mut self,
        layout: &RenderTargetLayout,
        support: &SwapchainSupportDetails,
        negotiated: &NegotiatedChain,
    ) -> RhiResult<()> {
        if let Err(error) = self.allocate(layout, support, negotiated) {
            self.release();
            self.state = ChainState::Uninitialized;
            return Err(error);
        }

        self.format_fixed = true;
        self.state = ChainState::Ready;
        Ok(())
    }

    /// Queries the surface and picks parameters without touching the
    /// existing chain.
    fn negotiate_for(
        &self,
        drawable: vk::Extent2D,
    ) -> RhiResult<(SwapchainSupportDetails, NegotiatedChain)> {
        let support = self.device.surface_support()?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let mut preferences = self.preferences;
        if self.format_fixed {
            preferences.surface_format = self.surface_format;
        }

        let negotiated = negotiate(&support, &preferences, drawable);
        if negotiated.extent.width == 0 || negotiated.extent.height == 0 {
            return Err(RhiError::ZeroExtent {
                width: negotiated.extent.width,
                height: negotiated.extent.height,
            });
        }

        if self.format_fixed && !same_surface_format(negotiated.surface_format, self.surface_format)
        {
            return Err(RhiError::SwapchainError(format!(
                "Surface no longer supports {:?} ({:?}); the render pass was built for it",
                self.surface_format.format, self.surface_format.color_space
            )));
        }

        Ok((support, negotiated))
    }

    fn allocate(
        &mut self,
        layout: &RenderTargetLayout,
        support: &SwapchainSupportDetails,
        negotiated: &NegotiatedChain,
    ) -> RhiResult<()> {
        let queue_families = self.device.queue_families();
        info!(
            "Creating surface image chain: {}x{}, format {:?}, present mode {:?}, {} images, {}",
            negotiated.extent.width,
            negotiated.extent.height,
            negotiated.surface_format.format,
            negotiated.present_mode,
            negotiated.image_count,
            if queue_families.is_unified() {
                "exclusive sharing"
            } else {
                "concurrent sharing"
            }
        );

        self.swapchain = self.device.create_swapchain(&SwapchainDesc {
            surface_format: negotiated.surface_format,
            present_mode: negotiated.present_mode,
            extent: negotiated.extent,
            min_image_count: negotiated.image_count,
            pre_transform: support.capabilities.current_transform,
            queue_families,
        })?;
        self.surface_format = negotiated.surface_format;
        self.present_mode = negotiated.present_mode;
        self.extent = negotiated.extent;

        let images = self.device.swapchain_images(self.swapchain)?;

        if let Some(depth_format) = layout.depth_format {
            let (image, allocation) = self.device.create_image(
                depth_format,
                negotiated.extent,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                "depth",
            )?;
            let view = match self.device.create_image_view(
                image,
                depth_format,
                vk::ImageAspectFlags::DEPTH,
            ) {
                Ok(view) => view,
                Err(error) => {
                    self.device.destroy_image(image, allocation);
                    return Err(error);
                }
            };
            self.depth = Some(DepthTarget {
                image,
                view,
                allocation,
            });
            debug!("Created depth attachment ({:?})", depth_format);
        }

        for (i, &image) in images.iter().enumerate() {
            let view = self.device.create_image_view(
                image,
                negotiated.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;

            let mut attachments = vec![view];
            if let Some(depth) = &self.depth {
                attachments.push(depth.view);
            }

            let framebuffer = match self.device.create_framebuffer(
                layout.render_pass,
                &attachments,
                negotiated.extent,
            ) {
                Ok(framebuffer) => framebuffer,
                Err(error) => {
                    self.device.destroy_image_view(view);
                    return Err(error);
                }
            };

            debug!("Created drawable image {}", i);
            self.drawables.push(DrawableImage {
                image,
                view,
                framebuffer,
            });
        }

        info!("Surface image chain ready with {} images", self.drawables.len());
        Ok(())
    }

    /// Requests the next presentable image.
    ///
    /// `signal` is signaled when the image is actually ready for rendering.
    /// A stale surface yields [`AcquireOutcome::Invalidated`] and leaves the
    /// chain untouched.
    ///
    /// # Errors
    ///
    /// Any failure other than surface staleness.
    pub fn acquire_next(&self, timeout_ns: u64, signal: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        match self
            .device
            .acquire_next_image(self.swapchain, timeout_ns, signal)
        {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire reported an out-of-date surface");
                Ok(AcquireOutcome::Invalidated)
            }
            Err(error) => Err(RhiError::from(error)),
        }
    }

    /// Hands `image_index` to the presentation engine once `wait` signals.
    ///
    /// # Errors
    ///
    /// Any failure other than surface staleness.
    pub fn present(&self, image_index: u32, wait: vk::Semaphore) -> RhiResult<PresentOutcome> {
        match self
            .device
            .queue_present(self.swapchain, image_index, wait)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Invalidated),
            Err(error) => Err(RhiError::from(error)),
        }
    }

    /// Tears the chain down completely and builds it again for `drawable`.
    ///
    /// Must only be called while the device is idle. Calling it twice in a row
    /// leaves the chain in the same `Ready` state as calling it once.
    ///
    /// # Errors
    ///
    /// [`RhiError::ZeroExtent`] when either the drawable or the surface's
    /// current extent has zero area, and [`RhiError::SwapchainError`] when the
    /// fixed color format is gone. In both cases the existing chain is kept.
    /// Device errors during allocation behave as in [`build`](Self::build).
    pub fn recreate(&mut self, layout: &RenderTargetLayout, drawable: vk::Extent2D) -> RhiResult<()> {
        if drawable.width == 0 || drawable.height == 0 {
            return Err(RhiError::ZeroExtent {
                width: drawable.width,
                height: drawable.height,
            });
        }

        // A surface that reports zero area or dropped the format keeps the
        // old chain alive.
        let (support, negotiated) = self.negotiate_for(drawable)?;

        info!(
            "Recreating surface image chain for {}x{}",
            negotiated.extent.width, negotiated.extent.height
        );
        self.release();
        self.allocate_or_reset(layout, &support, &negotiated)
    }

    /// Destroys framebuffers, views, the depth target and the swapchain.
    ///
    /// Idempotent; safe on a chain that was never built.
    pub fn teardown(&mut self) {
        self.release();
        if self.state != ChainState::Uninitialized {
            info!("Surface image chain destroyed");
        }
        self.state = ChainState::Destroyed;
    }

    // Framebuffers first, then the depth target, then image views, then the
    // swapchain that owns the images.
    fn release(&mut self) {
        for drawable in &self.drawables {
            self.device.destroy_framebuffer(drawable.framebuffer);
        }
        if let Some(depth) = self.depth.take() {
            self.device.destroy_image_view(depth.view);
            self.device.destroy_image(depth.image, depth.allocation);
        }
        for drawable in self.drawables.drain(..) {
            self.device.destroy_image_view(drawable.view);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }

    #[inline]
    pub fn state(&self) -> ChainState {
        self.state
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Returns the extent shared by all drawable images.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of drawable images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.drawables.len()
    }

    #[inline]
    pub fn drawables(&self) -> &[DrawableImage] {
        &self.drawables
    }

    /// Returns the drawable image at `index`, if it exists.
    #[inline]
    pub fn drawable(&self, index: u32) -> Option<&DrawableImage> {
        self.drawables.get(index as usize)
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }
}

impl<D: DeviceFacade> Drop for SurfaceImageChain<D> {
    fn drop(&mut self) {
        if self.state == ChainState::Ready {
            warn!("Surface image chain dropped without teardown; releasing now");
            self.teardown();
        }
    }
}

/// Picks format, present mode, extent and image count for `drawable`.
pub fn negotiate(
    support: &SwapchainSupportDetails,
    preferences: &ChainPreferences,
    drawable: vk::Extent2D,
) -> NegotiatedChain {
    NegotiatedChain {
        surface_format: choose_surface_format(&support.formats, preferences.surface_format),
        present_mode: choose_present_mode(&support.present_modes, preferences.present_mode),
        extent: choose_extent(&support.capabilities, drawable.width, drawable.height),
        image_count: determine_image_count(&support.capabilities),
    }
}

/// Chooses the surface format from the available formats.
///
/// Uses the preferred format when supported, or when the surface reports a
/// single UNDEFINED entry (no restriction). Falls back to the first supported
/// format otherwise.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> vk::SurfaceFormatKHR {
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        debug!("Surface accepts any format, using {:?}", preferred.format);
        return preferred;
    }

    let supported = formats
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space);

    if let Some(&format) = supported {
        debug!(
            "Selected preferred surface format: {:?} with {:?}",
            format.format, format.color_space
        );
        return format;
    }

    match formats.first() {
        Some(&fallback) => {
            warn!(
                "Preferred surface format {:?} unavailable, using {:?}",
                preferred.format, fallback.format
            );
            fallback
        }
        None => {
            warn!(
                "Surface reported no formats, keeping {:?}",
                preferred.format
            );
            preferred
        }
    }
}

fn same_surface_format(a: vk::SurfaceFormatKHR, b: vk::SurfaceFormatKHR) -> bool {
    a.format == b.format && a.color_space == b.color_space
}

/// Present modes tried, in order, when the preferred one is unavailable.
const PRESENT_MODE_FALLBACK: [vk::PresentModeKHR; 3] = [
    vk::PresentModeKHR::MAILBOX,
    vk::PresentModeKHR::IMMEDIATE,
    vk::PresentModeKHR::FIFO,
];

/// Chooses the present mode.
///
/// Uses the preferred mode if available, then MAILBOX (triple buffering),
/// IMMEDIATE (lowest latency) and finally FIFO, which every surface supports.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        debug!("Selected preferred present mode {:?}", preferred);
        return preferred;
    }

    let mode = PRESENT_MODE_FALLBACK
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO);
    warn!(
        "Present mode {:?} unavailable, falling back to {:?}",
        preferred, mode
    );
    mode
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the requested size to the surface's min/max extents.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// Determines the number of swapchain images.
///
/// One more than the minimum, capped by the maximum when one is reported.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // 0 means no maximum
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_requested() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            srgb(),
        ];

        let selected = choose_surface_format(&formats, srgb());
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_falls_back_to_first() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = choose_surface_format(&formats, srgb());
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_undefined_means_any() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let selected = choose_surface_format(&formats, srgb());
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_negotiate_with_no_formats_keeps_preference() {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                ..Default::default()
            },
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let negotiated = negotiate(
            &support,
            &ChainPreferences::default(),
            vk::Extent2D {
                width: 640,
                height: 480,
            },
        );
        assert!(same_surface_format(negotiated.surface_format, srgb()));
        assert_eq!(negotiated.extent.width, 640);
    }

    #[test]
    fn test_choose_present_mode_uses_preference() {
        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let selected = choose_present_mode(&modes, vk::PresentModeKHR::FIFO);
        assert_eq!(selected, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_fallback_order() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        let selected = choose_present_mode(&modes, vk::PresentModeKHR::FIFO_RELAXED);
        assert_eq!(selected, vk::PresentModeKHR::MAILBOX);

        let modes = vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        let selected = choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX);
        assert_eq!(selected, vk::PresentModeKHR::IMMEDIATE);

        let modes = vec![vk::PresentModeKHR::FIFO];
        let selected = choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX);
        assert_eq!(selected, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 1920);
        assert_eq!(extent.height, 1080);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!(extent.width, 2000);
        assert_eq!(extent.height, 2000);

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!(extent.width, 100);
        assert_eq!(extent.height, 100);

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);
    }

    #[test]
    fn test_negotiate_800x600_scenario() {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                current_extent: vk::Extent2D {
                    width: 800,
                    height: 600,
                },
                ..Default::default()
            },
            formats: vec![srgb()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let negotiated = negotiate(
            &support,
            &ChainPreferences::default(),
            vk::Extent2D {
                width: 1024,
                height: 768,
            },
        );
        assert_eq!(negotiated.extent.width, 800);
        assert_eq!(negotiated.extent.height, 600);
        assert!((2..=3).contains(&negotiated.image_count));
        assert_eq!(negotiated.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![],
        };
        assert!(!no_modes.is_adequate());
    }

    #[test]
    fn test_present_outcome_needs_recreate() {
        assert!(!PresentOutcome::Presented.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::Invalidated.needs_recreate());
    }
}
