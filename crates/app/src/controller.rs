//! Keyboard and mouse fly camera.

use std::f32::consts::TAU;

use glam::Vec3;

use dither_platform::{InputState, KeyCode};
use dither_scene::Camera;

const MOVE_SPEED: f32 = 3.0;
const LOOK_SPEED: f32 = 1.5;
const MOUSE_SENSITIVITY: f32 = 0.002;
const PITCH_LIMIT: f32 = 1.5;

/// Position plus Y-X-Z Euler rotation, driven by WASD/QE, arrow keys and
/// (while captured) the mouse.
#[derive(Debug, Clone)]
pub struct CameraController {
    pub position: Vec3,
    /// `x` is pitch, `y` is yaw.
    pub rotation: Vec3,
    mouse_look: bool,
}

impl CameraController {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            rotation: Vec3::ZERO,
            mouse_look: false,
        }
    }

    #[inline]
    pub fn mouse_look(&self) -> bool {
        self.mouse_look
    }

    /// Apply one frame of input. Returns `true` when mouse look was toggled.
    pub fn update(&mut self, input: &InputState, dt: f32) -> bool {
        let toggled = input.is_just_pressed(KeyCode::AltLeft);
        if toggled {
            self.mouse_look = !self.mouse_look;
        }

        let turn = Vec3::new(
            input.axis(KeyCode::ArrowUp, KeyCode::ArrowDown),
            input.axis(KeyCode::ArrowRight, KeyCode::ArrowLeft),
            0.0,
        );
        if turn.length_squared() > f32::EPSILON {
            self.rotation += LOOK_SPEED * dt * turn.normalize();
        }

        if self.mouse_look {
            let (dx, dy) = input.mouse_delta();
            self.rotation.y += dx as f32 * MOUSE_SENSITIVITY;
            self.rotation.x -= dy as f32 * MOUSE_SENSITIVITY;
        }

        self.rotation.x = self.rotation.x.clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.rotation.y = self.rotation.y.rem_euclid(TAU);

        let yaw = self.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let up = Vec3::NEG_Y;

        let movement = forward * input.axis(KeyCode::KeyW, KeyCode::KeyS)
            + right * input.axis(KeyCode::KeyD, KeyCode::KeyA)
            + up * input.axis(KeyCode::KeyE, KeyCode::KeyQ);
        if movement.length_squared() > f32::EPSILON {
            self.position += MOVE_SPEED * dt * movement.normalize();
        }

        toggled
    }

    pub fn apply(&self, camera: &mut Camera) {
        camera.set_view_yxz(self.position, self.rotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_forward_at_zero_yaw_is_positive_z() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        let mut controller = CameraController::new(Vec3::new(0.0, 0.0, -2.5));
        controller.update(&input, 0.5);
        assert_abs_diff_eq!(controller.position, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_e_moves_up_the_negative_y_axis() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyE);
        let mut controller = CameraController::new(Vec3::ZERO);
        controller.update(&input, 1.0);
        assert_abs_diff_eq!(controller.position, Vec3::new(0.0, -MOVE_SPEED, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyD);
        let mut controller = CameraController::new(Vec3::ZERO);
        controller.update(&input, 1.0);
        assert_abs_diff_eq!(controller.position.length(), MOVE_SPEED, epsilon = 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::ArrowUp);
        let mut controller = CameraController::new(Vec3::ZERO);
        controller.update(&input, 10.0);
        assert_abs_diff_eq!(controller.rotation.x, PITCH_LIMIT);
    }

    #[test]
    fn test_yaw_wraps_into_one_turn() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::ArrowLeft);
        let mut controller = CameraController::new(Vec3::ZERO);
        controller.update(&input, 1.0);
        assert_abs_diff_eq!(controller.rotation.y, TAU - LOOK_SPEED, epsilon = 1e-5);
    }

    #[test]
    fn test_mouse_only_turns_while_captured() {
        let mut input = InputState::new();
        input.on_mouse_motion(100.0, -50.0);
        let mut controller = CameraController::new(Vec3::ZERO);
        assert!(!controller.update(&input, 0.016));
        assert_eq!(controller.rotation, Vec3::ZERO);

        input.on_key_pressed(KeyCode::AltLeft);
        assert!(controller.update(&input, 0.016));
        assert!(controller.mouse_look());
        assert_abs_diff_eq!(controller.rotation.y, 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(controller.rotation.x, 0.1, epsilon = 1e-5);
    }
}
