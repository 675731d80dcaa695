//! Z-up fly camera.

use glam::{Mat4, Vec3};

use vkframe_platform::{InputState, KeyCode};

/// World up axis.
pub const WORLD_UP: Vec3 = Vec3::Z;

/// Pitch limit in degrees; keeps the view from flipping over the poles.
const PITCH_LIMIT: f32 = 89.0;

/// Perspective projection settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Perspective {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Perspective {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Free-flying camera steered with the keyboard.
///
/// # Controls
///
/// - `W`/`S`: forward/backward along the view direction
/// - `A`/`D`: strafe left/right
/// - `E`/`Q`: rise/fall along world up
/// - Arrow keys: turn
#[derive(Clone, Debug)]
pub struct FlyCamera {
    /// Position in world space.
    pub position: Vec3,
    /// Degrees counter-clockwise from +X around world up.
    yaw: f32,
    /// Degrees above the horizon.
    pitch: f32,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    /// Units per second.
    pub move_speed: f32,
    /// Degrees per second.
    pub look_speed: f32,
    pub perspective: Perspective,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Vec3::new(-2.0, -2.0, 2.0), 45.0, -30.0)
    }
}

impl FlyCamera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT, PITCH_LIMIT),
            forward: Vec3::X,
            right: Vec3::NEG_Y,
            up: WORLD_UP,
            move_speed: 2.5,
            look_speed: 60.0,
            perspective: Perspective::default(),
        };
        camera.update_vectors();
        camera
    }

    /// Sets movement and turn speeds.
    pub fn with_speeds(mut self, move_speed: f32, look_speed: f32) -> Self {
        self.move_speed = move_speed;
        self.look_speed = look_speed;
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.perspective.fov_degrees = fov_degrees;
        self
    }

    /// Applies held keys over `delta_secs`.
    pub fn update(&mut self, input: &InputState, delta_secs: f32) {
        let step = self.move_speed * delta_secs;
        let forward = input.axis(KeyCode::KeyW, KeyCode::KeyS);
        let strafe = input.axis(KeyCode::KeyD, KeyCode::KeyA);
        let rise = input.axis(KeyCode::KeyE, KeyCode::KeyQ);

        self.position += (self.forward * forward + self.right * strafe + WORLD_UP * rise) * step;

        let turn = self.look_speed * delta_secs;
        let yaw = input.axis(KeyCode::ArrowLeft, KeyCode::ArrowRight);
        let pitch = input.axis(KeyCode::ArrowUp, KeyCode::ArrowDown);
        if yaw != 0.0 || pitch != 0.0 {
            self.rotate(yaw * turn, pitch * turn);
        }
    }

    /// Turns by the given angles in degrees. Pitch is clamped to ±89°.
    pub fn rotate(&mut self, yaw_degrees: f32, pitch_degrees: f32) {
        self.yaw += yaw_degrees;
        self.pitch = (self.pitch + pitch_degrees).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_vectors();
    }

    fn update_vectors(&mut self) {
        let (yaw_sin, yaw_cos) = self.yaw.to_radians().sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.to_radians().sin_cos();

        self.forward = Vec3::new(yaw_cos * pitch_cos, yaw_sin * pitch_cos, pitch_sin).normalize();
        self.right = self.forward.cross(WORLD_UP).normalize();
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, self.up)
    }

    /// Projection matrix with the Y axis flipped for Vulkan.
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.perspective.fov_degrees.to_radians(),
            aspect_ratio,
            self.perspective.near,
            self.perspective.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_default_looks_down_toward_origin() {
        let camera = FlyCamera::default();
        assert_eq!(camera.position, Vec3::new(-2.0, -2.0, 2.0));

        let forward = camera.forward();
        assert!(forward.x > 0.0 && forward.y > 0.0 && forward.z < 0.0);
        assert!((forward.x - forward.y).abs() < EPSILON);
        assert!((forward.length() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_basis_is_orthonormal() {
        let camera = FlyCamera::new(Vec3::ZERO, 120.0, 40.0);
        assert!(camera.forward().dot(camera.right()).abs() < EPSILON);
        assert!(camera.forward().dot(camera.up()).abs() < EPSILON);
        assert!(camera.right().dot(WORLD_UP).abs() < EPSILON);
        assert!(camera.up().z > 0.0);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = FlyCamera::default();
        camera.rotate(0.0, 500.0);
        assert_eq!(camera.pitch(), 89.0);
        camera.rotate(0.0, -1000.0);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn test_movement_follows_keys() {
        let mut camera = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        let mut input = InputState::new();

        input.on_key_pressed(KeyCode::KeyW);
        camera.update(&input, 1.0);
        assert!((camera.position - Vec3::new(2.5, 0.0, 0.0)).length() < EPSILON);

        input.on_key_released(KeyCode::KeyW);
        input.on_key_pressed(KeyCode::KeyE);
        camera.update(&input, 2.0);
        assert!((camera.position - Vec3::new(2.5, 0.0, 5.0)).length() < EPSILON);

        input.on_key_released(KeyCode::KeyE);
        input.on_key_pressed(KeyCode::KeyD);
        camera.update(&input, 1.0);
        assert!((camera.position - Vec3::new(2.5, -2.5, 5.0)).length() < EPSILON);
    }

    #[test]
    fn test_turn_rate_is_frame_rate_independent() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::ArrowLeft);

        let mut coarse = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        coarse.update(&input, 0.5);

        let mut fine = FlyCamera::new(Vec3::ZERO, 0.0, 0.0);
        for _ in 0..50 {
            fine.update(&input, 0.01);
        }

        assert!((coarse.yaw() - 30.0).abs() < 1e-3);
        assert!((coarse.yaw() - fine.yaw()).abs() < 1e-3);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = FlyCamera::default();
        let proj = camera.projection_matrix(800.0 / 600.0);
        let reference = Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, 0.1, 100.0);
        assert_eq!(proj.y_axis.y, -reference.y_axis.y);
    }
}
