use glam::Mat4;
use serde::{Deserialize, Serialize};

/// Perspective projection parameters paired with the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Projection {
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    /// Update the aspect ratio from a viewport size. A zero height is ignored
    /// (minimized windows report 0x0).
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    /// Right-handed perspective matrix with a 0..1 depth range.
    pub fn matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_degrees.to_radians(), self.aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn viewport_updates_aspect() {
        let mut proj = Projection::default();
        proj.set_viewport(800, 400);
        assert_eq!(proj.aspect, 2.0);
        proj.set_viewport(800, 0);
        assert_eq!(proj.aspect, 2.0);
    }

    #[test]
    fn near_and_far_planes_map_to_depth_range() {
        let proj = Projection::default();
        let m = proj.matrix();
        let near = m.project_point3(Vec3::new(0.0, 0.0, -proj.near));
        let far = m.project_point3(Vec3::new(0.0, 0.0, -proj.far));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }
}
