//! Procedural demo geometry.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use vkframe_rhi::vertex::Vertex;

/// Indexed triangle list with 32-bit indices.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Appends `other`, rebasing its indices.
    pub fn append(&mut self, other: MeshData) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.indices
            .extend(other.indices.into_iter().map(|index| index + base));
    }
}

/// UV sphere around `center`, Z-up.
///
/// `segments` slices around the Z axis (at least 3), `rings` stacks from pole
/// to pole (at least 2). Triangles wind counter-clockwise seen from outside.
pub fn uv_sphere(center: Vec3, radius: f32, segments: u32, rings: u32, color: Vec3) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);

    let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let polar = v * PI;
        let (polar_sin, polar_cos) = polar.sin_cos();

        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let (azimuth_sin, azimuth_cos) = (u * TAU).sin_cos();

            let normal = Vec3::new(polar_sin * azimuth_cos, polar_sin * azimuth_sin, polar_cos);
            vertices.push(Vertex::new(
                center + normal * radius,
                color,
                normal,
                Vec2::new(u, v),
            ));
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
    for ring in 0..rings {
        for segment in 0..segments {
            let top_left = ring * stride + segment;
            let bottom_left = top_left + stride;

            indices.extend_from_slice(&[top_left, bottom_left, top_left + 1]);
            indices.extend_from_slice(&[top_left + 1, bottom_left, bottom_left + 1]);
        }
    }

    MeshData { vertices, indices }
}

/// `columns` x `rows` spheres on the XY plane, colored by grid position.
pub fn sphere_grid(columns: u32, rows: u32, spacing: f32, radius: f32) -> MeshData {
    let mut mesh = MeshData::default();
    let x_offset = (columns.saturating_sub(1)) as f32 * spacing * 0.5;
    let y_offset = (rows.saturating_sub(1)) as f32 * spacing * 0.5;

    for row in 0..rows {
        for column in 0..columns {
            let center = Vec3::new(
                column as f32 * spacing - x_offset,
                row as f32 * spacing - y_offset,
                0.0,
            );
            let color = Vec3::new(
                (column + 1) as f32 / columns as f32,
                (row + 1) as f32 / rows as f32,
                0.6,
            );
            mesh.append(uv_sphere(center, radius, 24, 16, color));
        }
    }

    mesh
}
