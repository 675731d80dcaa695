//! The winit window and the Vulkan surface presented to it.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{HandleError, HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkframe_core::{Error, Result};

use crate::drawable::DrawableSize;

fn handle_error(what: &str, e: HandleError) -> Error {
    Error::Window(format!("{} handle unavailable: {}", what, e))
}

/// `VkSurfaceKHR` destroyed on drop.
///
/// The instance must outlive it, and every swapchain built on it must be
/// destroyed first.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: created from the instance the loader wraps; destroyed only here.
        unsafe { self.loader.destroy_surface(self.handle, None) };
        debug!("Vulkan surface destroyed");
    }
}

/// Resizable window that a Vulkan surface can be created for.
pub struct Window {
    window: WinitWindow,
}

impl Window {
    /// Opens a window. Only callable while the event loop is active.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;
        info!("Window created: {}x{}", width, height);

        Ok(Self { window })
    }

    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Size of the drawable area in physical pixels; zero while minimized.
    pub fn drawable_size(&self) -> DrawableSize {
        match self.window.is_minimized() {
            Some(true) => DrawableSize::default(),
            _ => self.window.inner_size().into(),
        }
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    /// Instance extensions this window's display needs for surface creation.
    ///
    /// The pointers reference static strings owned by `ash_window`.
    pub fn surface_extensions(&self) -> Result<Vec<*const c_char>> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| handle_error("Display", e))?;
        let extensions = ash_window::enumerate_required_extensions(display.as_raw())
            .map_err(|e| Error::Vulkan(format!("No surface support for this display: {}", e)))?;

        debug!(
            "Surface extensions: {:?}",
            extensions
                .iter()
                // SAFETY: static NUL-terminated names.
                .map(|&name| unsafe { CStr::from_ptr(name) })
                .collect::<Vec<_>>()
        );
        Ok(extensions.to_vec())
    }

    /// Creates the surface this window presents through.
    ///
    /// # Errors
    ///
    /// [`Error::Window`] when the raw handles are unavailable,
    /// [`Error::Vulkan`] when the driver refuses the surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| handle_error("Display", e))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| handle_error("Window", e))?;

        // SAFETY: both handles come from the live winit window, which outlives
        // the surface for as long as the renderer holds it.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Vulkan(format!("Surface creation failed: {}", e)))?;

        info!("Vulkan surface created");
        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }
}
