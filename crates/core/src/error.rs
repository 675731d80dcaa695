//! Error types shared by the host-side crates.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised outside the Vulkan layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan surface or extension setup failed
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or event loop errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias using the core [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
