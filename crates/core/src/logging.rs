//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,vkframe=debug";

/// Initialize the logging system with tracing.
///
/// This sets up tracing-subscriber with:
/// - Environment-based filtering (`RUST_LOG` wins over `default_filter`)
/// - A fmt layer with targets and thread ids
///
/// Calling it a second time is a no-op.
///
/// # Example
/// ```
/// vkframe_core::init_logging(vkframe_core::logging::DEFAULT_FILTER);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
