//! Camera controller
//!
//! - W/S/A/D: move forward/backward/left/right
//! - R/F: move up/down
//! - Mouse: look around while the left button is held

use glam::Vec2;

use super::Camera;

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Mouse delta since last frame (in pixels)
    pub mouse_delta: Vec2,

    /// Whether mouse look is active (left mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
    }
}

/// Free-fly camera controller (FPS-style)
#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// Planar movement speed in units per second
    pub move_speed: f32,
    /// Vertical movement speed in units per second
    pub vertical_speed: f32,
    /// Degrees per pixel per second of mouse motion
    pub mouse_sensitivity: f32,
    pub pitch_limit: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            move_speed: 2.5,
            vertical_speed: 20.0,
            mouse_sensitivity: 20.0,
            pitch_limit: 89.0,
        }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.mouse_sensitivity = sensitivity;
        self
    }

    pub fn update(&self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            camera.yaw += input.mouse_delta.x * dt * self.mouse_sensitivity;
            camera.pitch -= input.mouse_delta.y * dt * self.mouse_sensitivity;
            camera.pitch = camera.pitch.clamp(-self.pitch_limit, self.pitch_limit);
            camera.update_vectors();
        }

        let step = self.move_speed * dt;
        let right = camera.front.cross(camera.world_up).normalize_or_zero();
        if input.forward {
            camera.position += camera.front * step;
        }
        if input.backward {
            camera.position -= camera.front * step;
        }
        if input.left {
            camera.position -= right * step;
        }
        if input.right {
            camera.position += right * step;
        }

        let lift = self.vertical_speed * dt;
        if input.up {
            camera.position += camera.world_up * lift;
        }
        if input.down {
            camera.position -= camera.world_up * lift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_forward_moves_along_front() {
        let controller = FreeFlyController::new();
        let mut camera = Camera::new(Vec3::ZERO);
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 2.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let controller = FreeFlyController::new();
        let mut camera = Camera::default();
        let input = CameraInput {
            mouse_delta: Vec2::new(0.0, -1000.0),
            mouse_look_active: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert_eq!(camera.pitch, 89.0);
        assert!(camera.front.y > 0.99);
    }

    #[test]
    fn test_mouse_ignored_without_button() {
        let controller = FreeFlyController::new();
        let mut camera = Camera::default();
        let input = CameraInput {
            mouse_delta: Vec2::new(50.0, 50.0),
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert_eq!(camera.yaw, -90.0);
        assert_eq!(camera.pitch, 0.0);
    }
}
