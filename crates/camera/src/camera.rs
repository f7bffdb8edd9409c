use crate::config::CameraConfig;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Movement requested for one camera update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Upward,
    Downward,
    Nowhere,
}

/// Free-fly camera driven by yaw/pitch angles in degrees.
///
/// `front`, `right` and `up` are derived from the angles and `world_up` and are
/// only ever recomputed together. Pitch is not clamped unless a limit was
/// configured; past ±90° the basis flips, and exactly at the poles the right
/// vector is normalized from a near-zero cross product.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationCamera {
    position: Vec3,
    front: Vec3,
    right: Vec3,
    up: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    movement_speed: f32,
    mouse_sensitivity: f32,
    pitch_limit: Option<f32>,
}

impl Default for OrientationCamera {
    fn default() -> Self {
        Self::from_config(&CameraConfig::default())
    }
}

impl OrientationCamera {
    pub fn new(
        position: Vec3,
        world_up: Vec3,
        yaw: f32,
        pitch: f32,
        movement_speed: f32,
        mouse_sensitivity: f32,
    ) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
            world_up,
            yaw,
            pitch,
            movement_speed,
            mouse_sensitivity,
            pitch_limit: None,
        };
        camera.update_vectors();
        camera
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        let mut camera = Self::new(
            config.position,
            config.world_up,
            config.yaw,
            config.pitch,
            config.movement_speed,
            config.mouse_sensitivity,
        );
        if let Some(limit) = config.pitch_limit {
            camera = camera.with_pitch_limit(limit);
        }
        camera
    }

    /// Current state expressed as a config, suitable for saving and restoring.
    pub fn config(&self) -> CameraConfig {
        CameraConfig {
            position: self.position,
            world_up: self.world_up,
            yaw: self.yaw,
            pitch: self.pitch,
            movement_speed: self.movement_speed,
            mouse_sensitivity: self.mouse_sensitivity,
            pitch_limit: self.pitch_limit,
        }
    }

    /// Clamp pitch to `[-limit, limit]` degrees on every update.
    ///
    /// The current pitch is clamped immediately. A non-finite limit leaves
    /// pitch unclamped.
    pub fn with_pitch_limit(mut self, limit: f32) -> Self {
        if !limit.is_finite() {
            self.pitch_limit = None;
            return self;
        }
        let limit = limit.abs();
        self.pitch_limit = Some(limit);
        self.pitch = self.pitch.clamp(-limit, limit);
        self.update_vectors();
        self
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn world_up(&self) -> Vec3 {
        self.world_up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn movement_speed(&self) -> f32 {
        self.movement_speed
    }

    pub fn mouse_sensitivity(&self) -> f32 {
        self.mouse_sensitivity
    }

    pub fn pitch_limit(&self) -> Option<f32> {
        self.pitch_limit
    }

    /// Right-handed look-at transform from the eye along `front`.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Advance one frame: translate along the current basis, then apply the
    /// look deltas (scaled by mouse sensitivity) and re-derive the basis.
    ///
    /// Translation uses the basis from before the look deltas are applied.
    pub fn update(&mut self, direction: Direction, delta_time: f32, look_dx: f32, look_dy: f32) {
        let magnitude = self.movement_speed * delta_time;
        match direction {
            Direction::Forward => self.position += self.front * magnitude,
            Direction::Backward => self.position -= self.front * magnitude,
            Direction::Left => self.position -= self.right * magnitude,
            Direction::Right => self.position += self.right * magnitude,
            Direction::Upward => self.position += self.up * magnitude,
            Direction::Downward => self.position -= self.up * magnitude,
            Direction::Nowhere => {}
        }

        self.yaw += look_dx * self.mouse_sensitivity;
        self.pitch += look_dy * self.mouse_sensitivity;
        if let Some(limit) = self.pitch_limit {
            self.pitch = self.pitch.clamp(-limit, limit);
        }

        self.update_vectors();
    }

    fn update_vectors(&mut self) {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        self.front = Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }
}
