//! Cameras.
//!
//! The render driver only needs a view and a projection matrix each frame,
//! plus a way to let the camera move itself. [`Camera`] is that seam;
//! [`FlyCamera`] is the free-flying camera the binary uses.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec2, Vec3};

use crate::input::{Input, KeyCode, MouseButton};

/// The view the particles are drawn from.
pub trait Camera {
    fn view_matrix(&self) -> Mat4;

    fn projection_matrix(&self) -> Mat4;

    /// Advance by `dt` wall-clock seconds using whatever input was fed in.
    ///
    /// Only called while input is enabled.
    fn update(&mut self, dt: f32);

    fn enable_input(&mut self);

    fn disable_input(&mut self);

    fn input_enabled(&self) -> bool;

    /// Window aspect ratio changed.
    fn set_aspect(&mut self, _aspect: f32) {}

    /// Capture this frame's keys and cursor motion for the next `update`.
    fn feed(&mut self, _input: &Input) {}
}

/// Perspective projection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 55.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 10_000.0,
        }
    }
}

/// Pitch stops just short of straight up/down so the view never flips.
const MAX_PITCH: f32 = FRAC_PI_2 - 0.01;

/// Free-flying camera.
///
/// WASD moves along the view direction and its right vector, Space/Shift
/// along the camera's up vector. Holding the right mouse button turns the
/// view with the cursor.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    /// Horizontal angle in radians; zero looks down +Z.
    pub yaw: f32,
    /// Vertical angle in radians.
    pub pitch: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of cursor motion.
    pub sensitivity: f32,
    pub projection: Projection,
    input_enabled: bool,
    /// Pending movement in camera space: x right, y up, z forward.
    movement: Vec3,
    /// Pending cursor motion in pixels.
    look: Vec2,
}

impl FlyCamera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: pitch.clamp(-MAX_PITCH, MAX_PITCH),
            speed: 5.0,
            sensitivity: 0.003,
            projection: Projection::default(),
            input_enabled: true,
            movement: Vec3::ZERO,
            look: Vec2::ZERO,
        }
    }

    /// Unit vector the camera looks along.
    pub fn direction(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        )
    }

    pub fn right(&self) -> Vec3 {
        let yaw = self.yaw - FRAC_PI_2;
        Vec3::new(yaw.sin(), 0.0, yaw.cos())
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.direction())
    }
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, -15.0), 0.0, 0.0)
    }
}

impl Camera for FlyCamera {
    fn view_matrix(&self) -> Mat4 {
        let direction = self.direction();
        Mat4::look_at_rh(self.position, self.position + direction, self.up())
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    fn update(&mut self, dt: f32) {
        // Moving the cursor right turns right, moving it down looks down.
        self.yaw -= self.look.x * self.sensitivity;
        self.pitch = (self.pitch - self.look.y * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
        self.look = Vec2::ZERO;

        let step = self.speed * dt;
        self.position += self.right() * self.movement.x * step
            + self.up() * self.movement.y * step
            + self.direction() * self.movement.z * step;
    }

    fn enable_input(&mut self) {
        self.input_enabled = true;
    }

    fn disable_input(&mut self) {
        self.input_enabled = false;
        self.movement = Vec3::ZERO;
        self.look = Vec2::ZERO;
    }

    fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.projection.aspect = aspect;
        }
    }

    fn feed(&mut self, input: &Input) {
        if !self.input_enabled {
            return;
        }
        let axis = |positive: KeyCode, negative: KeyCode| {
            (input.key_held(positive) as i32 - input.key_held(negative) as i32) as f32
        };
        self.movement = Vec3::new(
            axis(KeyCode::D, KeyCode::A),
            axis(KeyCode::Space, KeyCode::Shift),
            axis(KeyCode::W, KeyCode::S),
        );
        self.look = if input.mouse_held(MouseButton::Right) {
            input.mouse_delta()
        } else {
            Vec2::ZERO
        };
    }
}
