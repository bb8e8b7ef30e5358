//! Keyboard and mouse state between frames.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Held keys plus what happened since the last [`InputState::end_frame`].
#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
    /// Raw mouse motion accumulated over the frame.
    mouse_delta: (f64, f64),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Held keys stay held.
    pub fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        // Key repeat delivers presses for held keys; those are not new presses.
        if self.held.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.held.remove(&key);
    }

    /// Accumulate relative motion from `DeviceEvent::MouseMotion`.
    pub fn on_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.mouse_delta.0 += dx;
        self.mouse_delta.1 += dy;
    }

    /// Forget everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.held.clear();
        self.end_frame();
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn is_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    /// `1.0`, `-1.0` or `0.0` depending on which of the two keys is held.
    pub fn axis(&self, positive: KeyCode, negative: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_held(positive) {
            value += 1.0;
        }
        if self.is_held(negative) {
            value -= 1.0;
        }
        value
    }

    pub fn mouse_delta(&self) -> (f64, f64) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_repeat_is_not_a_new_press() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::AltLeft);
        assert!(input.is_just_pressed(KeyCode::AltLeft));

        input.end_frame();
        input.on_key_pressed(KeyCode::AltLeft);
        assert!(!input.is_just_pressed(KeyCode::AltLeft));
        assert!(input.is_held(KeyCode::AltLeft));

        input.on_key_released(KeyCode::AltLeft);
        input.on_key_pressed(KeyCode::AltLeft);
        assert!(input.is_just_pressed(KeyCode::AltLeft));
    }

    #[test]
    fn test_axis() {
        let mut input = InputState::new();
        assert_eq!(input.axis(KeyCode::KeyD, KeyCode::KeyA), 0.0);
        input.on_key_pressed(KeyCode::KeyD);
        assert_eq!(input.axis(KeyCode::KeyD, KeyCode::KeyA), 1.0);
        input.on_key_pressed(KeyCode::KeyA);
        assert_eq!(input.axis(KeyCode::KeyD, KeyCode::KeyA), 0.0);
        input.on_key_released(KeyCode::KeyD);
        assert_eq!(input.axis(KeyCode::KeyD, KeyCode::KeyA), -1.0);
    }

    #[test]
    fn test_mouse_motion_accumulates_until_end_frame() {
        let mut input = InputState::new();
        input.on_mouse_motion(3.0, -1.0);
        input.on_mouse_motion(2.0, 4.0);
        assert_eq!(input.mouse_delta(), (5.0, 3.0));
        input.end_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_clear_releases_held_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.clear();
        assert!(!input.is_held(KeyCode::KeyW));
    }
}
