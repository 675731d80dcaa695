//! What the frame scheduler needs to know about the window.

/// Size of the drawable area in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawableSize {
    pub width: u32,
    pub height: u32,
}

impl DrawableSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports zero area.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl From<winit::dpi::PhysicalSize<u32>> for DrawableSize {
    fn from(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Self::new(size.width, size.height)
    }
}

/// Source of the current drawable size.
///
/// While the window is minimized the scheduler calls
/// [`wait_events`](Self::wait_events) in a loop until the size becomes
/// non-zero or a close is requested.
pub trait DrawableSource {
    fn drawable_size(&self) -> DrawableSize;

    /// Blocks until window events arrive (or a short timeout passes) and
    /// processes them.
    fn wait_events(&mut self);

    fn close_requested(&self) -> bool;
}

/// Fixed-size source for headless callers.
///
/// `wait_events` pops the next size from a queue so that a minimize and
/// restore sequence can be replayed.
#[derive(Debug, Default)]
pub struct StaticDrawable {
    size: DrawableSize,
    upcoming: std::collections::VecDeque<DrawableSize>,
    close_requested: bool,
    waits: usize,
}

impl StaticDrawable {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: DrawableSize::new(width, height),
            ..Default::default()
        }
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = DrawableSize::new(width, height);
    }

    /// Size reported after the next `wait_events`.
    pub fn queue_size(&mut self, width: u32, height: u32) {
        self.upcoming.push_back(DrawableSize::new(width, height));
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Number of times `wait_events` was called.
    pub fn waits(&self) -> usize {
        self.waits
    }
}

impl DrawableSource for StaticDrawable {
    fn drawable_size(&self) -> DrawableSize {
        self.size
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if let Some(next) = self.upcoming.pop_front() {
            self.size = next;
        }
    }

    fn close_requested(&self) -> bool {
        self.close_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_area() {
        assert!(DrawableSize::new(0, 600).is_zero());
        assert!(DrawableSize::new(800, 0).is_zero());
        assert!(!DrawableSize::new(800, 600).is_zero());
    }

    #[test]
    fn test_aspect_ratio_handles_zero_height() {
        assert_eq!(DrawableSize::new(800, 400).aspect_ratio(), 2.0);
        assert_eq!(DrawableSize::new(800, 0).aspect_ratio(), 1.0);
    }

    #[test]
    fn test_static_drawable_replays_queued_sizes() {
        let mut source = StaticDrawable::new(0, 0);
        source.queue_size(0, 0);
        source.queue_size(1024, 768);

        source.wait_events();
        assert!(source.drawable_size().is_zero());
        source.wait_events();
        assert_eq!(source.drawable_size(), DrawableSize::new(1024, 768));
        source.wait_events();
        assert_eq!(source.drawable_size(), DrawableSize::new(1024, 768));
        assert_eq!(source.waits(), 3);
    }
}
