//! Vertex format and input descriptions.
//!
//! [`Vertex`] is the one interleaved layout the pipeline consumes:
//!
//! | location | field       | format              | offset |
//! |----------|-------------|---------------------|--------|
//! | 0        | `position`  | `R32G32B32_SFLOAT`  | 0      |
//! | 1        | `color`     | `R32G32B32_SFLOAT`  | 12     |
//! | 2        | `normal`    | `R32G32B32_SFLOAT`  | 24     |
//! | 3        | `tex_coord` | `R32G32_SFLOAT`     | 36     |
//!
//! Index data is always 32-bit.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved mesh vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Returns the vertex input binding description.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Returns the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset: offset as u32,
        };

        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
        ]
    }
}
