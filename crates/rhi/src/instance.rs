//! Vulkan instance and validation messenger.
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), vkframe_rhi::RhiError> {
//! let instance = Instance::new(c"vkframe", &[], cfg!(debug_assertions))?;
//! assert_eq!(instance.has_validation(), instance.debug_messenger_active());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// API version requested from the loader.
pub const API_VERSION: u32 = vk::API_VERSION_1_2;

/// Validation messenger; destroyed before the instance that created it.
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_tracing));

        let handle = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        Ok(Self { loader, handle })
    }

    fn destroy(&self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

/// Owns the loader entry, the instance and, when validation is on, its
/// messenger.
///
/// Must outlive every surface and logical device created from it.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
}

impl Instance {
    /// Loads the Vulkan library and creates an instance.
    ///
    /// `surface_extensions` are whatever the window system needs;
    /// `VK_KHR_surface` is added if missing. Validation is enabled only if
    /// requested and the layer is installed; a missing layer is a warning.
    ///
    /// # Errors
    ///
    /// [`RhiError::LoadingError`](crate::RhiError::LoadingError) when no
    /// loader is found, or the device error reported by instance or
    /// messenger creation.
    pub fn new(
        application_name: &CStr,
        surface_extensions: &[*const c_char],
        request_validation: bool,
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = request_validation && validation_layer_installed(&entry)?;
        if request_validation && !validation {
            warn!(
                "{:?} requested but not installed; continuing without validation",
                VALIDATION_LAYER
            );
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkframe")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(API_VERSION);

        let extensions = instance_extensions(surface_extensions, validation);
        let layers: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            match DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created for {:?} ({} extension(s), validation {})",
            application_name,
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether the validation layer was enabled at creation.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }

    #[inline]
    pub fn debug_messenger_active(&self) -> bool {
        self.messenger
            .as_ref()
            .is_some_and(|messenger| messenger.handle != vk::DebugUtilsMessengerEXT::null())
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(messenger) = self.messenger.take() {
            messenger.destroy();
        }
        unsafe { self.instance.destroy_instance(None) };
        debug!("Vulkan instance destroyed");
    }
}

fn validation_layer_installed(entry: &Entry) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER)
    }))
}

/// Window-system extensions plus surface and, with validation, debug utils.
fn instance_extensions(
    surface_extensions: &[*const c_char],
    validation: bool,
) -> Vec<*const c_char> {
    let mut extensions = surface_extensions.to_vec();
    let mut require = |name: &'static CStr| {
        let present = extensions
            .iter()
            .any(|&existing| unsafe { CStr::from_ptr(existing) } == name);
        if !present {
            extensions.push(name.as_ptr());
        }
    };
    require(ash::khr::surface::NAME);
    if validation {
        require(ash::ext::debug_utils::NAME);
    }
    extensions
}

/// Tracing level for a validation message.
fn level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Level::ERROR
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Level::WARN
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Level::DEBUG
    } else {
        Level::TRACE
    }
}

/// Routes validation messages into `tracing` under the `vulkan` target.
unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the loader passes either null or a pointer valid for this call.
    let message = match unsafe { callback_data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("<empty>"),
    };

    let level = level_for(severity);
    if level == Level::ERROR {
        error!(target: "vulkan", ?kind, "{}", message);
    } else if level == Level::WARN {
        warn!(target: "vulkan", ?kind, "{}", message);
    } else if level == Level::DEBUG {
        debug!(target: "vulkan", ?kind, "{}", message);
    } else {
        trace!(target: "vulkan", ?kind, "{}", message);
    }

    vk::FALSE
}
