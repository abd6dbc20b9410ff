//! Look-at camera used to frame the resident entry.

use glam::{Mat4, Vec3};

use crate::catalog::CameraPose;

const NEAR: f32 = 0.05;
const FAR: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl CameraRig {
    pub fn from_pose(pose: &CameraPose) -> Self {
        Self {
            eye: Vec3::from_array(pose.position),
            target: Vec3::from_array(pose.look_at),
            up: Vec3::from_array(pose.up),
            fov: pose.fov,
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, NEAR, FAR)
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// The camera's actual up vector (may differ from world up).
    pub fn camera_up(&self) -> Vec3 {
        self.right().cross(self.forward())
    }

    /// Billboard uniform block: view_proj (16) + camera_right (4) + camera_up (4).
    pub fn billboard_uniforms(&self, aspect: f32) -> [f32; 24] {
        let right = self.right();
        let up = self.camera_up();

        let mut data = [0.0; 24];
        data[0..16].copy_from_slice(&self.view_projection_matrix(aspect).to_cols_array());
        data[16..20].copy_from_slice(&[right.x, right.y, right.z, 0.0]);
        data[20..24].copy_from_slice(&[up.x, up.y, up.z, 0.0]);
        data
    }
}

impl Default for CameraRig {
    fn default() -> Self {
        Self::from_pose(&CameraPose::default())
    }
}
