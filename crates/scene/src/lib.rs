//! Scene content for the demo.
//!
//! This crate provides:
//! - A Z-up fly camera driven by keyboard state
//! - Procedural sphere geometry

pub mod camera;
pub mod mesh;

pub use camera::{FlyCamera, Perspective, WORLD_UP};
pub use mesh::{MeshData, sphere_grid, uv_sphere};
