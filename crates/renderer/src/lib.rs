//! Frame scheduling and the top-level renderer.
//!
//! This crate provides:
//! - [`FrameScheduler`]: frame slots, the image-in-flight table and the
//!   acquire/record/submit/present cycle over a surface image chain
//! - [`Renderer`]: the whole Vulkan object graph for one window, with an
//!   explicit shutdown order
//! - [`UniformData`]: the per-frame transform block

pub mod frame;
pub mod renderer;
pub mod scheduler;
pub mod uniform;

pub use frame::{FrameSlot, ImagesInFlight};
pub use renderer::Renderer;
pub use scheduler::{
    FrameCapabilities, FrameInput, FrameScheduler, FrameStatus, MeshBinding, SchedulerConfig,
};
pub use uniform::{UniformData, UniformSnapshot, vulkan_perspective};

/// Default number of frames that can be in flight simultaneously.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
