//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Unknown keys are rejected to catch typos early.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! frames_in_flight = 2
//! preferred_present_mode = "fifo"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "VKFRAME_CONFIG";

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Presentation policy requested by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Immediate,
    Fifo,
    FifoRelaxed,
}

/// Color format requested for the drawable images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatPreference {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "vkframe".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Number of frame slots recorded ahead of the GPU.
    pub frames_in_flight: u32,
    /// Upper bound on every frame fence wait.
    pub fence_timeout_ms: u64,
    pub preferred_present_mode: PresentModePreference,
    pub preferred_format: FormatPreference,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub depth: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout_ms: 5_000,
            preferred_present_mode: PresentModePreference::default(),
            preferred_format: FormatPreference::default(),
            validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth: true,
        }
    }
}

impl RendererConfig {
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ms.saturating_mul(1_000_000)
    }
}

/// Precompiled SPIR-V blobs for the mesh pipeline.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/mesh.vert.spv"),
            fragment: PathBuf::from("shaders/mesh.frag.spv"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraConfig {
    /// Units per second.
    pub move_speed: f32,
    /// Degrees per second while an arrow key is held.
    pub look_speed: f32,
    pub fov_degrees: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 2.5,
            look_speed: 60.0,
            fov_degrees: 45.0,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub shaders: ShaderConfig,
    pub camera: CameraConfig,
}

impl AppConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => {
                let config = Self::from_toml_str(&source)?;
                info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads the file named by `VKFRAME_CONFIG`, or `config.toml`.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renderer.frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "renderer.frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.renderer.fence_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "renderer.fence_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} has zero area",
                self.window.width, self.window.height
            )));
        }
        if !(1.0..180.0).contains(&self.camera.fov_degrees) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_degrees {} is outside 1..180",
                self.camera.fov_degrees
            )));
        }
        Ok(())
    }
}
