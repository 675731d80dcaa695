//! Top-level renderer owning the whole Vulkan object graph.
//!
//! [`Renderer`] builds instance, surface, device, render pass, pipeline,
//! mesh buffers and the [`FrameScheduler`] for one window, and tears them
//! down again in a fixed order from [`Renderer::shutdown`].

use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use vkframe_core::AppConfig;
use vkframe_core::config::{FormatPreference, PresentModePreference};
use vkframe_platform::{DrawableSource, Surface, Window};
use vkframe_rhi::buffer::{BufferUsage, DeviceBuffer};
use vkframe_rhi::command::{PipelineBinding, PushConstants};
use vkframe_rhi::descriptor::DescriptorSetLayout;
use vkframe_rhi::device::Device;
use vkframe_rhi::facade::DeviceFacade;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout, RenderPass};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::swapchain::{ChainPreferences, RenderTargetLayout, SurfaceImageChain, negotiate};
use vkframe_rhi::transfer::TransferUploader;
use vkframe_rhi::vertex::Vertex;
use vkframe_rhi::{RhiError, RhiResult};

use crate::scheduler::{
    FrameCapabilities, FrameInput, FrameScheduler, FrameStatus, MeshBinding, SchedulerConfig,
};
use crate::uniform::UniformData;

/// Depth attachment format used when depth is enabled.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const APPLICATION_NAME: &std::ffi::CStr = c"vkframe";

/// Size of the fragment push-constant block (one shading-mode `u32`).
const SHADING_MODE_PUSH_SIZE: u32 = std::mem::size_of::<u32>() as u32;

/// Maps the configured present mode onto Vulkan.
pub fn present_mode_for(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

/// Maps the configured surface format onto Vulkan. All choices use the
/// sRGB non-linear color space.
pub fn surface_format_for(preference: FormatPreference) -> vk::SurfaceFormatKHR {
    let format = match preference {
        FormatPreference::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        FormatPreference::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        FormatPreference::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        FormatPreference::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
    };
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

struct MeshBuffers {
    vertices: DeviceBuffer<Device>,
    indices: DeviceBuffer<Device>,
    index_count: u32,
}

impl MeshBuffers {
    fn binding(&self) -> MeshBinding {
        MeshBinding {
            vertex_buffer: self.vertices.handle(),
            index_buffer: self.indices.handle(),
            index_count: self.index_count,
        }
    }
}

// Declaration order only matters as a fallback; `Renderer::shutdown`
// destructures this and drops every field explicitly.
struct RendererParts {
    scheduler: FrameScheduler<Device>,
    mesh: MeshBuffers,
    uploader: TransferUploader<Device>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    descriptor_set_layout: DescriptorSetLayout,
    render_pass: RenderPass,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

/// Owns every Vulkan object used to draw one mesh into one window.
///
/// # Resource Destruction Order
///
/// [`shutdown`](Self::shutdown) releases resources in reverse dependency order:
/// 1. Wait for the device to go idle
/// 2. Frame slots, then the surface image chain
/// 3. Mesh buffers, then the transfer uploader
/// 4. Pipeline, pipeline layout, descriptor set layout, render pass
/// 5. Logical device
/// 6. Surface
/// 7. Instance
///
/// Dropping a renderer that was not shut down runs the same sequence.
pub struct Renderer {
    parts: Option<RendererParts>,
    shading_mode: PushConstants,
}

impl Renderer {
    /// Creates the full object graph for `window` and uploads the mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created, the shaders
    /// cannot be loaded, or the mesh is empty.
    pub fn new(
        window: &Window,
        config: &AppConfig,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> RhiResult<Self> {
        let drawable = window.drawable_size();
        info!(
            "Initializing Vulkan renderer ({}x{})",
            drawable.width, drawable.height
        );

        let settings = &config.renderer;

        let surface_extensions = window
            .surface_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(APPLICATION_NAME, &surface_extensions, settings.validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info, surface.handle())?;

        let depth_format = settings.depth.then_some(DEPTH_FORMAT);

        let preferences = ChainPreferences {
            surface_format: surface_format_for(settings.preferred_format),
            present_mode: present_mode_for(settings.preferred_present_mode),
        };
        let extent = vk::Extent2D {
            width: drawable.width,
            height: drawable.height,
        };

        // Framebuffers need the render pass and the render pass needs the
        // color format, so negotiate the format before building the chain.
        let negotiated = negotiate(&device.surface_support()?, &preferences, extent);
        let render_pass =
            RenderPass::new(device.clone(), negotiated.surface_format.format, depth_format)?;

        let layout = RenderTargetLayout {
            render_pass: render_pass.handle(),
            depth_format,
        };
        // The chain keeps this format for every rebuild.
        let preferences = ChainPreferences {
            surface_format: negotiated.surface_format,
            ..preferences
        };
        let mut chain = SurfaceImageChain::new(device.clone(), preferences);
        chain.build(&layout, extent)?;

        let descriptor_set_layout = DescriptorSetLayout::uniform_only(device.clone())?;
        let push_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: SHADING_MODE_PUSH_SIZE,
        };
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[descriptor_set_layout.handle()],
            &[push_range],
        )?;

        let pipeline = {
            let vertex_shader = Shader::from_spirv_file(
                device.clone(),
                &config.shaders.vertex,
                ShaderStage::Vertex,
                "main",
            )?;
            let fragment_shader = Shader::from_spirv_file(
                device.clone(),
                &config.shaders.fragment,
                ShaderStage::Fragment,
                "main",
            )?;
            let attributes = Vertex::attribute_descriptions();

            // Shader modules are only needed until the pipeline exists.
            GraphicsPipelineBuilder::new()
                .vertex_shader(&vertex_shader)
                .fragment_shader(&fragment_shader)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&attributes)
                .build(device.clone(), &render_pass, &pipeline_layout)?
        };

        let uploader = TransferUploader::new(device.clone())?;
        let mesh = MeshBuffers {
            vertices: uploader.upload_slice(vertices, BufferUsage::Vertex)?,
            indices: uploader.upload_slice(indices, BufferUsage::Index)?,
            index_count: indices.len() as u32,
        };

        let scheduler = FrameScheduler::new(
            device.clone(),
            chain,
            layout,
            PipelineBinding {
                pipeline: pipeline.handle(),
                layout: pipeline_layout.handle(),
            },
            Some(descriptor_set_layout.handle()),
            SchedulerConfig {
                frames_in_flight: settings.frames_in_flight as usize,
                fence_timeout_ns: settings.fence_timeout_ns(),
                clear_color: settings.clear_color,
                capabilities: FrameCapabilities {
                    has_depth: settings.depth,
                    has_descriptor_sets: true,
                    has_uniforms: true,
                },
            },
        )?;

        info!(
            "Renderer initialized: {} drawable image(s), {} frame(s) in flight, {} vertices, {} indices",
            scheduler.chain().image_count(),
            scheduler.frames_in_flight(),
            vertices.len(),
            indices.len()
        );

        Ok(Self {
            parts: Some(RendererParts {
                scheduler,
                mesh,
                uploader,
                pipeline,
                pipeline_layout,
                descriptor_set_layout,
                render_pass,
                device,
                surface,
                instance,
            }),
            shading_mode: PushConstants::from_value(vk::ShaderStageFlags::FRAGMENT, &0u32),
        })
    }

    fn parts_mut(&mut self) -> RhiResult<&mut RendererParts> {
        self.parts
            .as_mut()
            .ok_or_else(|| RhiError::InvalidHandle("Renderer was already shut down".to_string()))
    }

    /// Renders one frame with the given transforms.
    ///
    /// # Errors
    ///
    /// Fatal device errors; see [`FrameScheduler::render_frame`].
    pub fn render_frame<S: DrawableSource + ?Sized>(
        &mut self,
        resize_requested: bool,
        drawable: &mut S,
        uniforms: &UniformData,
    ) -> RhiResult<FrameStatus> {
        let push_constants = self.shading_mode.clone();
        let parts = self.parts_mut()?;
        let input = FrameInput {
            mesh: parts.mesh.binding(),
            uniforms: *uniforms,
            push_constants: Some(&push_constants),
        };
        parts.scheduler.render_frame(resize_requested, drawable, &input)
    }

    /// Selects the fragment shader's shading mode for subsequent frames.
    pub fn set_shading_mode(&mut self, mode: u32) {
        self.shading_mode = PushConstants::from_value(vk::ShaderStageFlags::FRAGMENT, &mode);
    }

    /// Current extent of the drawable images, zero after shutdown.
    pub fn extent(&self) -> vk::Extent2D {
        self.parts
            .as_ref()
            .map(|parts| parts.scheduler.chain().extent())
            .unwrap_or_default()
    }

    pub fn frame_counter(&self) -> u64 {
        self.parts
            .as_ref()
            .map_or(0, |parts| parts.scheduler.frame_counter())
    }

    /// Releases every Vulkan object in reverse dependency order. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(parts) = self.parts.take() else {
            return;
        };
        info!("Shutting down renderer");

        let RendererParts {
            mut scheduler,
            mesh,
            mut uploader,
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            render_pass,
            device,
            surface,
            instance,
        } = parts;

        if let Err(e) = device.wait_idle() {
            warn!("Device wait idle failed during shutdown: {}", e);
        }

        scheduler.shutdown();
        drop(scheduler);

        drop(mesh);
        uploader.destroy();
        drop(uploader);

        drop(pipeline);
        drop(pipeline_layout);
        drop(descriptor_set_layout);
        drop(render_pass);

        match Arc::try_unwrap(device) {
            Ok(device) => drop(device),
            Err(shared) => {
                warn!(
                    "Logical device still has {} other owner(s) at shutdown",
                    Arc::strong_count(&shared) - 1
                );
                drop(shared);
            }
        }

        drop(surface);
        drop(instance);

        info!("Renderer shut down");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(
            present_mode_for(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode_for(PresentModePreference::FifoRelaxed),
            vk::PresentModeKHR::FIFO_RELAXED
        );
        assert_eq!(
            present_mode_for(PresentModePreference::default()),
            ChainPreferences::default().present_mode
        );
    }

    #[test]
    fn test_surface_format_mapping() {
        let format = surface_format_for(FormatPreference::Rgba8Unorm);
        assert_eq!(format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(format.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        let default = surface_format_for(FormatPreference::default());
        let expected = ChainPreferences::default().surface_format;
        assert_eq!(default.format, expected.format);
        assert_eq!(default.color_space, expected.color_space);
    }

    #[test]
    fn test_shading_mode_push_constant() {
        let push = PushConstants::from_value(vk::ShaderStageFlags::FRAGMENT, &1u32);
        assert_eq!(push.data.len() as u32, SHADING_MODE_PUSH_SIZE);
        assert_eq!(push.data, 1u32.to_ne_bytes());
    }
}
