//! Event loop host driven one tick at a time.
//!
//! [`WindowHost`] owns the winit event loop and pumps it with
//! `pump_app_events` instead of handing control to `run_app`. The render loop
//! stays in charge, and the minimized-window wait inside surface recreation
//! can keep processing window events through [`DrawableSource::wait_events`].

use std::time::Duration;

use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::WindowId;

use vkframe_core::{Error, Result};

use crate::drawable::{DrawableSize, DrawableSource};
use crate::input::InputState;
use crate::window::Window;

/// Longest a single [`DrawableSource::wait_events`] call blocks.
const WAIT_EVENTS_TIMEOUT: Duration = Duration::from_millis(100);

/// Pumps allowed for the platform to deliver the first resume.
const MAX_STARTUP_PUMPS: usize = 100;

struct HostState {
    width: u32,
    height: u32,
    title: String,
    created: Option<Window>,
    creation_error: Option<Error>,
    window_requested: bool,
    input: InputState,
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_requested {
            return;
        }
        self.window_requested = true;

        match Window::new(event_loop, self.width, self.height, &self.title) {
            Ok(window) => self.created = Some(window),
            Err(e) => {
                self.creation_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            WindowEvent::KeyboardInput { event, .. } => self.input.on_keyboard_event(&event),
            WindowEvent::Focused(false) => self.input.release_all(),
            _ => {}
        }
    }
}

/// A window plus the event loop feeding it.
pub struct WindowHost {
    event_loop: EventLoop<()>,
    state: HostState,
    window: Window,
}

impl WindowHost {
    /// Creates the event loop and pumps it until the window exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop or the window cannot be
    /// created.
    pub fn new(width: u32, height: u32, title: &str) -> Result<Self> {
        let mut event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
        let mut state = HostState {
            width,
            height,
            title: title.to_string(),
            created: None,
            creation_error: None,
            window_requested: false,
            input: InputState::new(),
            resized: false,
            close_requested: false,
        };

        for _ in 0..MAX_STARTUP_PUMPS {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut state);
            if let Some(e) = state.creation_error.take() {
                return Err(e);
            }
            if let Some(window) = state.created.take() {
                // Resizes reported during startup are already reflected in
                // the initial drawable size.
                state.resized = false;
                return Ok(Self {
                    event_loop,
                    state,
                    window,
                });
            }
            if let PumpStatus::Exit(code) = status {
                return Err(Error::Window(format!(
                    "Event loop exited with code {} before the window was created",
                    code
                )));
            }
        }

        Err(Error::Window(
            "Event loop never resumed; no window was created".to_string(),
        ))
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("Event loop exited with code {}", code);
            self.state.close_requested = true;
        }
    }

    /// Processes pending events without blocking. Call once per tick.
    pub fn poll_events(&mut self) {
        self.state.input.begin_frame();
        self.pump(Some(Duration::ZERO));
    }

    /// Returns whether a resize arrived since the last call, and clears it.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }

    pub fn request_close(&mut self) {
        self.state.close_requested = true;
    }

    #[inline]
    pub fn input(&self) -> &InputState {
        &self.state.input
    }

    #[inline]
    pub fn window(&self) -> &Window {
        &self.window
    }
}

impl DrawableSource for WindowHost {
    fn drawable_size(&self) -> DrawableSize {
        self.window.drawable_size()
    }

    fn wait_events(&mut self) {
        self.pump(Some(WAIT_EVENTS_TIMEOUT));
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }
}
