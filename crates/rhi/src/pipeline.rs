//! Render pass and graphics pipeline management.
//!
//! # Overview
//!
//! - [`RenderPass`] wraps a single-subpass VkRenderPass with a color attachment
//!   and an optional depth attachment
//! - [`PipelineLayout`] wraps VkPipelineLayout for descriptor set and push constant configuration
//! - [`Pipeline`] wraps a graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] configures the fixed-function state
//!
//! Pipelines are built viewport-agnostic: viewport and scissor are dynamic
//! state, so a resize rebuilds framebuffers but never the pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::shader::{Shader, ShaderStage};
//! use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout, RenderPass};
//! use vkframe_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/mesh.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let fragment_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/mesh.frag.spv"),
//!     ShaderStage::Fragment,
//!     "main",
//! )?;
//!
//! let render_pass = RenderPass::new(device.clone(), vk::Format::B8G8R8A8_SRGB, None)?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vertex_shader)
//!     .fragment_shader(&fragment_shader)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .build(device.clone(), &render_pass, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Attachment descriptions of the render pass, color first.
///
/// Color is cleared, stored and left in PRESENT_SRC. Depth is cleared and
/// discarded.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Vec<vk::AttachmentDescription> {
    let mut attachments = vec![
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
    ];

    if let Some(depth_format) = depth_format {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    attachments
}

/// External-to-subpass dependency covering color output and, with depth,
/// the shared depth attachment.
///
/// The depth image is reused by every frame, so the previous frame's late
/// fragment test writes must finish before this frame's early tests clear it.
pub fn subpass_dependency(has_depth: bool) -> vk::SubpassDependency {
    let mut src_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut src_access = vk::AccessFlags::empty();
    let mut dst_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut dst_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if has_depth {
        src_stages |= vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        src_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        dst_stages |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(src_stages)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stages)
        .dst_access_mask(dst_access)
}

/// Single-subpass render pass the drawable framebuffers are built against.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
}

impl RenderPass {
    /// Creates a render pass for `color_format` plus an optional depth attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
    ) -> RhiResult<Self> {
        let attachments = attachment_descriptions(color_format, depth_format);

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let subpasses = [subpass];
        let dependencies = [subpass_dependency(depth_format.is_some())];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: color {:?}, depth {:?}",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// Vulkan pipeline layout wrapper.
///
/// A pipeline layout describes the complete set of resources that can be
/// accessed by a pipeline. This includes descriptor set layouts and push
/// constant ranges.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Slice of descriptor set layout handles
    /// * `push_constant_ranges` - Slice of push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use vkframe_rhi::device::Device;
    /// use vkframe_rhi::pipeline::PipelineLayout;
    /// use ash::vk;
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
    /// // Shading mode integer for the fragment stage
    /// let push_constant_range = vk::PushConstantRange {
    ///     stage_flags: vk::ShaderStageFlags::FRAGMENT,
    ///     offset: 0,
    ///     size: 4,
    /// };
    ///
    /// let layout = PipelineLayout::new(device, &[], &[push_constant_range])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding order of front-facing triangles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Builder for the graphics pipeline.
///
/// Defaults: triangle list, fill mode, back-face culling, counter-clockwise
/// front face, no blending, dynamic viewport and scissor. Depth testing is
/// enabled automatically when the render pass has a depth attachment.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: CullMode,
    front_face: FrontFace,
    depth_compare_op: CompareOp,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a new graphics pipeline builder with default settings.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            depth_compare_op: CompareOp::default(),
        }
    }

    /// Sets the vertex shader.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    /// Sets the depth compare operation (only used with a depth attachment).
    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Builds the graphics pipeline for subpass 0 of `render_pass`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vertex shader is not set
    /// - Fragment shader is not set
    /// - Pipeline creation fails
    pub fn build(
        self,
        device: Arc<Device>,
        render_pass: &RenderPass,
        layout: &PipelineLayout,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;

        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk());

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = render_pass.depth_format().is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created (cull {:?}, depth {})",
            self.cull_mode,
            if has_depth { "on" } else { "off" }
        );

        Ok(Pipeline { device, pipeline })
    }
}
