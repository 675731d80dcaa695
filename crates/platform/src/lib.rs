//! Platform layer for the Vulkan renderer.
//!
//! This crate provides:
//! - Window management via winit, pumped one tick at a time
//! - Keyboard state
//! - Vulkan surface creation and the instance extensions it needs
//! - [`DrawableSource`], the window facts the frame scheduler consumes

mod drawable;
mod host;
mod input;
mod window;

pub use drawable::{DrawableSize, DrawableSource, StaticDrawable};
pub use host::WindowHost;
pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};
