//! Demo host: a grid of spheres under a fly camera.
//!
//! The host loop owns the window and calls into the renderer once per tick.
//! Resizes are forwarded as a flag; the scheduler decides when to rebuild.

use std::time::Duration;

use anyhow::{Context, Result};
use glam::Mat4;
use tracing::{debug, error, info, warn};

use vkframe_core::logging::DEFAULT_FILTER;
use vkframe_core::{AppConfig, FrameTimeCounter, Timer, init_logging};
use vkframe_platform::{DrawableSource, KeyCode, WindowHost};
use vkframe_renderer::{FrameStatus, Renderer, UniformData};
use vkframe_scene::{FlyCamera, sphere_grid};

/// Window over which the title's frame time is averaged.
const FRAME_TIME_WINDOW: Duration = Duration::from_secs(1);

/// Shading modes understood by `mesh.frag`.
const SHADING_MODES: u32 = 3;

fn main() -> Result<()> {
    init_logging(DEFAULT_FILTER);
    info!("Starting vkframe");

    let config = AppConfig::load_default().context("Failed to load configuration")?;

    let mut host = WindowHost::new(
        config.window.width,
        config.window.height,
        &config.window.title,
    )
    .context("Failed to create window")?;

    let mesh = sphere_grid(5, 5, 1.2, 0.45);
    debug!(
        "Generated {} vertices, {} triangles",
        mesh.vertices.len(),
        mesh.triangle_count()
    );

    let mut renderer = Renderer::new(host.window(), &config, &mesh.vertices, &mesh.indices)
        .context("Failed to initialize renderer")?;

    let mut camera = FlyCamera::default()
        .with_speeds(config.camera.move_speed, config.camera.look_speed)
        .with_fov(config.camera.fov_degrees);

    let mut shading_mode = 1;
    renderer.set_shading_mode(shading_mode);

    let result = run(&mut host, &mut renderer, &mut camera, &config, &mut shading_mode);

    // Shut down before the window goes away, whatever the loop returned.
    renderer.shutdown();
    info!("Exited cleanly");
    result
}

fn run(
    host: &mut WindowHost,
    renderer: &mut Renderer,
    camera: &mut FlyCamera,
    config: &AppConfig,
    shading_mode: &mut u32,
) -> Result<()> {
    let mut timer = Timer::new();
    let mut frame_times = FrameTimeCounter::new(FRAME_TIME_WINDOW);

    loop {
        host.poll_events();

        if host.input().is_key_just_pressed(KeyCode::Escape) {
            host.request_close();
        }
        if host.close_requested() {
            info!("Close requested");
            return Ok(());
        }

        if host.input().is_key_just_pressed(KeyCode::Space) {
            *shading_mode = (*shading_mode + 1) % SHADING_MODES;
            renderer.set_shading_mode(*shading_mode);
            debug!("Shading mode {}", shading_mode);
        }

        let delta = timer.tick();
        camera.update(host.input(), delta.as_secs_f32());

        let extent = renderer.extent();
        let aspect_ratio = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };
        let uniforms = UniformData {
            model: Mat4::IDENTITY,
            view: camera.view_matrix(),
            proj: camera.projection_matrix(aspect_ratio),
        };

        let resized = host.take_resized();
        match renderer.render_frame(resized, host, &uniforms) {
            Ok(FrameStatus::Presented) => {}
            Ok(FrameStatus::Recreated { presented }) => {
                let extent = renderer.extent();
                debug!(
                    "Drawable images rebuilt at {}x{} (frame presented: {})",
                    extent.width, extent.height, presented
                );
            }
            Ok(FrameStatus::Skipped) => debug!("Frame skipped"),
            Ok(FrameStatus::Closed) => {
                info!("Window closed while waiting for a drawable size");
                return Ok(());
            }
            Err(e) if e.is_device_lost() => {
                error!("Device lost: {}", e);
                return Err(e).context("Rendering stopped");
            }
            Err(e) => {
                warn!("Frame failed: {}", e);
                return Err(e).context("Rendering stopped");
            }
        }

        if let Some(average_ms) = frame_times.record(delta) {
            host.window().set_title(&format!(
                "{} | {:.2} ms",
                config.window.title, average_ms
            ));
        }
    }
}
