//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation and physical device selection
//! - Queue family negotiation for graphics and presentation
//! - The surface image chain and its recreation
//! - Command recording and one-shot transfers
//! - Buffer management and pipeline creation
//!
//! Everything above the raw ash device talks to a [`facade::DeviceFacade`], so
//! the frame lifecycle can be exercised against the in-memory device in
//! [`mock`] (enabled with the `mock` feature).

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod facade;
pub mod instance;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod transfer;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
