// Probe and view cameras.
//
// Camera model (left-handed, Y up):
//   - `rotation` maps camera space to world space; its columns are the
//     camera's right (+X), up (+Y) and forward (+Z) axes
//   - perspective projection with vertical fov, depth mapped to [0, 1]
//
// Cube-face cameras share the probe's position and orientation and add a
// fixed side rotation per face with a 90° square frustum.

use glam::{Mat3, Mat4, Vec3};
use std::f32::consts::FRAC_PI_2;

use super::cubemap::CubeFace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    /// Camera-to-world rotation.
    pub rotation: Mat3,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Width / height.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

/// Orthonormal camera-to-world basis for a forward direction and an up hint.
/// Falls back to +Z forward / +Y up for degenerate input.
pub fn orientation(forward: Vec3, up: Vec3) -> Mat3 {
    let z = forward.try_normalize().unwrap_or(Vec3::Z);
    let x = up.cross(z).try_normalize().unwrap_or_else(|| z.any_orthonormal_vector());
    let y = z.cross(x);
    Mat3::from_cols(x, y, z)
}

impl Camera {
    pub fn new(position: Vec3, rotation: Mat3, fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self { position, rotation, fov, aspect, near, far }
    }

    /// Camera at `position` looking toward `target`.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        Self {
            position,
            rotation: orientation(target - position, up),
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
        }
    }

    /// One of the six 90° cameras of a probe cube map.
    pub fn cube_face(position: Vec3, probe_rotation: Mat3, face: CubeFace, near: f32, far: f32) -> Self {
        Self {
            position,
            rotation: probe_rotation * face.side_rotation(),
            fov: FRAC_PI_2,
            aspect: 1.0,
            near,
            far,
        }
    }

    pub fn right(&self) -> Vec3 { self.rotation.x_axis }
    pub fn up(&self) -> Vec3 { self.rotation.y_axis }
    pub fn forward(&self) -> Vec3 { self.rotation.z_axis }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_mat3(self.rotation.transpose()) * Mat4::from_translation(-self.position)
    }

    /// Left-handed perspective projection.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov, self.aspect, self.near, self.far)
    }

    /// Combined view-projection matrix ready to upload to the GPU.
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// World-space frustum corners: the 4 near-plane corners, then the 4
    /// far-plane corners, each as (-x -y), (+x -y), (+x +y), (-x +y).
    pub fn frustum_corners(&self) -> [Vec3; 8] {
        let tan_half = (0.5 * self.fov).tan();
        let corner = |i: usize| {
            let depth = if i < 4 { self.near } else { self.far };
            let h = tan_half * depth;
            let w = h * self.aspect;
            let (sx, sy) = match i % 4 {
                0 => (-1.0, -1.0),
                1 => (1.0, -1.0),
                2 => (1.0, 1.0),
                _ => (-1.0, 1.0),
            };
            self.position + self.rotation * Vec3::new(sx * w, sy * h, depth)
        };
        std::array::from_fn(corner)
    }
}
