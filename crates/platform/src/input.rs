//! Keyboard state polled by the camera and the host loop.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Tracks which keys are held, plus the edges seen since the last frame.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: HashSet<KeyCode>,
    /// Keys that were just released this frame
    just_released_keys: HashSet<KeyCode>,
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
    }

    /// Feeds a winit keyboard event. Keys without a physical code are ignored.
    pub fn on_keyboard_event(&mut self, event: &KeyEvent) {
        if let PhysicalKey::Code(key) = event.physical_key {
            match event.state {
                ElementState::Pressed => self.on_key_pressed(key),
                ElementState::Released => self.on_key_released(key),
            }
        }
    }

    /// Handle a key press event.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    /// Handle a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        if self.pressed_keys.remove(&key) {
            self.just_released_keys.insert(key);
        }
    }

    /// Drops all held keys, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.just_released_keys.extend(self.pressed_keys.drain());
    }

    /// Check if a key is currently pressed.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Check if a key was just pressed this frame.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Check if a key was just released this frame.
    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    /// +1 while `positive` is held, -1 while `negative` is held, 0 for both or neither.
    pub fn axis(&self, positive: KeyCode, negative: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_pressed(positive) {
            value += 1.0;
        }
        if self.is_key_pressed(negative) {
            value -= 1.0;
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release_edges() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.begin_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));

        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_released(KeyCode::KeyW));
    }

    #[test]
    fn test_repeat_press_is_not_a_new_edge() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Escape);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Escape);
        assert!(!input.is_key_just_pressed(KeyCode::Escape));
    }

    #[test]
    fn test_axis() {
        let mut input = InputState::new();
        assert_eq!(input.axis(KeyCode::KeyW, KeyCode::KeyS), 0.0);

        input.on_key_pressed(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyW, KeyCode::KeyS), 1.0);

        input.on_key_pressed(KeyCode::KeyS);
        assert_eq!(input.axis(KeyCode::KeyW, KeyCode::KeyS), 0.0);

        input.on_key_released(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyW, KeyCode::KeyS), -1.0);
    }

    #[test]
    fn test_release_all() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        input.on_key_pressed(KeyCode::KeyD);
        input.release_all();
        assert!(!input.is_key_pressed(KeyCode::KeyA));
        assert!(input.is_key_just_released(KeyCode::KeyD));
    }
}
