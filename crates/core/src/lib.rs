//! Core utilities shared across the vkframe crates.
//!
//! This crate provides foundational types and utilities:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

pub mod config;
mod error;
pub mod logging;
mod timer;

pub use config::{AppConfig, ConfigError};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTimeCounter, Timer};
