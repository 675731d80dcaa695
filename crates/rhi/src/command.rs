//! Per-frame command recording.
//!
//! [`CommandRecorder`] turns a drawable target, a pipeline and a set of draw
//! resources into the command sequence of one frame. It keeps no state between
//! calls: re-recording the same inputs yields the same commands, so a frame
//! slot can re-record its buffer every frame once its fence has signaled.
//!
//! # Recorded sequence
//!
//! ```text
//! reset → begin → begin render pass (clear) → bind pipeline
//!       → set viewport/scissor → bind vertex/index → bind descriptor set
//!       → push constants → draw indexed → end render pass → end
//! ```
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::command::{CommandRecorder, DrawResources, DrawTarget, PipelineBinding};
//! use vkframe_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(
//! #     device: &Device,
//! #     cmd: vk::CommandBuffer,
//! #     target: DrawTarget,
//! #     pipeline: PipelineBinding,
//! #     resources: DrawResources,
//! # ) -> Result<(), vkframe_rhi::RhiError> {
//! let recorder = CommandRecorder::new([0.0, 0.0, 0.0, 1.0]).with_depth(true);
//! recorder.record(device, cmd, &target, &pipeline, &resources)?;
//! # Ok(())
//! # }
//! ```

use ash::vk;

use crate::error::RhiResult;
use crate::facade::DeviceFacade;

/// Framebuffer and render pass a frame draws into.
#[derive(Clone, Copy, Debug)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    /// Current extent of the drawable; viewport and scissor follow it.
    pub extent: vk::Extent2D,
}

/// Graphics pipeline and the layout its resources are bound through.
#[derive(Clone, Copy, Debug)]
pub struct PipelineBinding {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Push-constant block pushed right before the draw.
#[derive(Clone, Debug)]
pub struct PushConstants {
    pub stages: vk::ShaderStageFlags,
    pub data: Vec<u8>,
}

impl PushConstants {
    /// Builds a block from any plain-old-data value.
    pub fn from_value<T: bytemuck::Pod>(stages: vk::ShaderStageFlags, value: &T) -> Self {
        Self {
            stages,
            data: bytemuck::bytes_of(value).to_vec(),
        }
    }
}

/// Geometry and bindings of one indexed draw.
#[derive(Clone, Debug)]
pub struct DrawResources {
    pub vertex_buffer: vk::Buffer,
    /// 32-bit index buffer.
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    /// Per-slot descriptor set, if the pipeline layout has one.
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub push_constants: Option<PushConstants>,
}

/// Records the draw commands of one frame.
#[derive(Clone, Copy, Debug)]
pub struct CommandRecorder {
    clear_color: [f32; 4],
    clear_depth: bool,
}

impl CommandRecorder {
    /// Creates a recorder that clears the color attachment to `clear_color`.
    pub fn new(clear_color: [f32; 4]) -> Self {
        Self {
            clear_color,
            clear_depth: false,
        }
    }

    /// Also clears a depth attachment (to 1.0) in the second slot.
    pub fn with_depth(mut self, clear_depth: bool) -> Self {
        self.clear_depth = clear_depth;
        self
    }

    /// Clear values in attachment order.
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        if self.clear_depth {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }
        values
    }

    /// Re-records `command_buffer` from scratch.
    ///
    /// The caller guarantees the GPU has finished with the previous contents
    /// of the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be reset, begun or ended.
    pub fn record<D: DeviceFacade + ?Sized>(
        &self,
        device: &D,
        command_buffer: vk::CommandBuffer,
        target: &DrawTarget,
        pipeline: &PipelineBinding,
        resources: &DrawResources,
    ) -> RhiResult<()> {
        device.reset_command_buffer(command_buffer)?;
        device.begin_command_buffer(command_buffer, vk::CommandBufferUsageFlags::empty())?;

        let clear_values = self.clear_values();
        device.cmd_begin_render_pass(
            command_buffer,
            target.render_pass,
            target.framebuffer,
            scissor_for(target.extent),
            &clear_values,
        );

        device.cmd_bind_pipeline(command_buffer, pipeline.pipeline);
        device.cmd_set_viewport(command_buffer, viewport_for(target.extent));
        device.cmd_set_scissor(command_buffer, scissor_for(target.extent));

        device.cmd_bind_vertex_buffer(command_buffer, resources.vertex_buffer);
        device.cmd_bind_index_buffer(command_buffer, resources.index_buffer, vk::IndexType::UINT32);

        if let Some(set) = resources.descriptor_set {
            device.cmd_bind_descriptor_set(command_buffer, pipeline.layout, set);
        }
        if let Some(push) = &resources.push_constants {
            device.cmd_push_constants(command_buffer, pipeline.layout, push.stages, &push.data);
        }

        device.cmd_draw_indexed(command_buffer, resources.index_count);
        device.cmd_end_render_pass(command_buffer);
        device.end_command_buffer(command_buffer)
    }
}

/// Full-extent viewport with the standard 0..1 depth range.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent.
pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, RecordedCommand};
    use ash::vk::Handle;

    fn fixture() -> (DrawTarget, PipelineBinding, DrawResources) {
        let target = DrawTarget {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
        };
        let pipeline = PipelineBinding {
            pipeline: vk::Pipeline::from_raw(3),
            layout: vk::PipelineLayout::from_raw(4),
        };
        let resources = DrawResources {
            vertex_buffer: vk::Buffer::from_raw(5),
            index_buffer: vk::Buffer::from_raw(6),
            index_count: 36,
            descriptor_set: Some(vk::DescriptorSet::from_raw(7)),
            push_constants: Some(PushConstants::from_value(
                vk::ShaderStageFlags::FRAGMENT,
                &1i32,
            )),
        };
        (target, pipeline, resources)
    }

    #[test]
    fn test_viewport_follows_extent() {
        let viewport = viewport_for(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = scissor_for(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent.width, 1280);
    }

    #[test]
    fn test_clear_values_with_depth() {
        assert_eq!(CommandRecorder::new([0.0; 4]).clear_values().len(), 1);
        assert_eq!(
            CommandRecorder::new([0.0; 4])
                .with_depth(true)
                .clear_values()
                .len(),
            2
        );
    }

    #[test]
    fn test_record_sequence() {
        let device = MockDevice::new();
        let pool = device.create_command_pool(0, false).unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let (target, pipeline, resources) = fixture();

        CommandRecorder::new([0.1, 0.1, 0.1, 1.0])
            .with_depth(true)
            .record(&device, cmd, &target, &pipeline, &resources)
            .unwrap();

        let commands = device.recorded_commands(cmd);
        assert_eq!(
            commands,
            vec![
                RecordedCommand::BeginRenderPass {
                    render_pass: target.render_pass,
                    framebuffer: target.framebuffer,
                    width: 640,
                    height: 480,
                    clear_value_count: 2,
                },
                RecordedCommand::BindPipeline(pipeline.pipeline),
                RecordedCommand::SetViewport {
                    width: 640.0,
                    height: 480.0,
                },
                RecordedCommand::SetScissor {
                    width: 640,
                    height: 480,
                },
                RecordedCommand::BindVertexBuffer(resources.vertex_buffer),
                RecordedCommand::BindIndexBuffer(resources.index_buffer, vk::IndexType::UINT32),
                RecordedCommand::BindDescriptorSet(vk::DescriptorSet::from_raw(7)),
                RecordedCommand::PushConstants {
                    stages: vk::ShaderStageFlags::FRAGMENT,
                    data: 1i32.to_ne_bytes().to_vec(),
                },
                RecordedCommand::DrawIndexed(36),
                RecordedCommand::EndRenderPass,
            ]
        );
    }

    #[test]
    fn test_rerecording_replaces_previous_contents() {
        let device = MockDevice::new();
        let pool = device.create_command_pool(0, false).unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let (target, pipeline, mut resources) = fixture();
        resources.descriptor_set = None;
        resources.push_constants = None;

        let recorder = CommandRecorder::new([0.0; 4]);
        recorder
            .record(&device, cmd, &target, &pipeline, &resources)
            .unwrap();
        let first = device.recorded_commands(cmd);
        recorder
            .record(&device, cmd, &target, &pipeline, &resources)
            .unwrap();

        assert_eq!(device.recorded_commands(cmd), first);
        assert_eq!(first.len(), 8);
    }
}
