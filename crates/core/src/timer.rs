//! High-resolution timer for frame timing.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Get the delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Averages frame times over a reporting window.
///
/// Feed it one delta per frame; once at least `window` has accumulated,
/// [`record`](Self::record) returns the average frame time in milliseconds
/// and starts a new window.
#[derive(Debug)]
pub struct FrameTimeCounter {
    window: Duration,
    accumulated: Duration,
    frames: u32,
}

impl FrameTimeCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Adds one frame. Returns the average in milliseconds when a window closes.
    pub fn record(&mut self, delta: Duration) -> Option<f64> {
        self.accumulated += delta;
        self.frames += 1;

        if self.accumulated < self.window {
            return None;
        }

        let average_ms = self.accumulated.as_secs_f64() * 1000.0 / f64::from(self.frames);
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(average_ms)
    }
}

impl Default for FrameTimeCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
