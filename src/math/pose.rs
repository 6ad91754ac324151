//! Rigid camera pose

use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::core::types::{Mat3, Mat4, Vec3, Vec4};

/// Rigid transform taking world coordinates to camera coordinates:
/// `p_cam = r * p_world + t`.
///
/// This is the tracker's internal convention. External poses arrive in
/// either direction and are converted once by [`Pose::from_camera_to_world`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub r: Mat3,
    pub t: Vec3,
}

impl Pose {
    pub const IDENTITY: Pose = Pose { r: Mat3::IDENTITY, t: Vec3::ZERO };

    /// World-to-camera pose from rotation and translation
    pub fn from_rt(r: Mat3, t: Vec3) -> Self {
        Self { r, t }
    }

    /// Build from a camera-to-world rotation/translation (the camera's
    /// placement in the world).
    pub fn from_camera_to_world(r: Mat3, t: Vec3) -> Self {
        Pose { r, t }.inverse()
    }

    /// Pure translation of the world frame
    pub fn from_translation(t: Vec3) -> Self {
        Self { r: Mat3::IDENTITY, t }
    }

    pub fn from_mat4(m: &Mat4) -> Self {
        Self {
            r: Mat3::from_mat4(*m),
            t: m.w_axis.truncate(),
        }
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            self.r.x_axis.extend(0.0),
            self.r.y_axis.extend(0.0),
            self.r.z_axis.extend(0.0),
            Vec4::new(self.t.x, self.t.y, self.t.z, 1.0),
        )
    }

    /// Inverse transform (camera to world)
    pub fn inverse(&self) -> Pose {
        let rt = self.r.transpose();
        Pose { r: rt, t: -(rt * self.t) }
    }

    /// World point into camera coordinates
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.r * p + self.t
    }

    /// Direction into camera coordinates (rotation only)
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.r * v
    }

    /// Camera center in world coordinates
    pub fn camera_center(&self) -> Vec3 {
        -(self.r.transpose() * self.t)
    }

    /// Re-orthonormalize the rotation after accumulated updates
    pub fn coerce(&mut self) {
        let x = self.r.x_axis.normalize();
        let y = (self.r.y_axis - x * x.dot(self.r.y_axis)).normalize();
        let z = x.cross(y);
        self.r = Mat3::from_cols(x, y, z);
    }

    /// Left-multiply by the exponential of a twist `[wx, wy, wz, tx, ty, tz]`
    /// expressed in camera coordinates.
    pub fn apply_twist(&self, twist: &[f32; 6]) -> Pose {
        let w = Vec3::new(twist[0], twist[1], twist[2]);
        let v = Vec3::new(twist[3], twist[4], twist[5]);
        let angle = w.length();
        let dr = if angle > 1e-12 {
            Mat3::from_axis_angle(w / angle, angle)
        } else {
            Mat3::IDENTITY
        };
        let mut out = Pose { r: dr, t: v } * *self;
        out.coerce();
        out
    }

    /// Rotation angle (radians) and translation distance between two poses
    pub fn distance(&self, other: &Pose) -> (f32, f32) {
        let delta = *self * other.inverse();
        let trace = delta.r.x_axis.x + delta.r.y_axis.y + delta.r.z_axis.z;
        let angle = ((trace - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        (angle, delta.t.length())
    }

    /// Approximate equality with separate rotation/translation tolerances
    pub fn approx_eq(&self, other: &Pose, angle_tol: f32, dist_tol: f32) -> bool {
        let (angle, dist) = self.distance(other);
        angle <= angle_tol && dist <= dist_tol
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `a * b` applies `b` first, then `a`
impl Mul for Pose {
    type Output = Pose;

    fn mul(self, rhs: Pose) -> Pose {
        Pose {
            r: self.r * rhs.r,
            t: self.r * rhs.t + self.t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pose() -> Pose {
        Pose::from_rt(
            Mat3::from_axis_angle(Vec3::new(0.3, 1.0, -0.2).normalize(), 0.7),
            Vec3::new(0.1, -0.4, 2.0),
        )
    }

    #[test]
    fn test_inverse_roundtrip() {
        let pose = sample_pose();
        let p = Vec3::new(1.0, 2.0, 3.0);
        let back = pose.inverse().transform_point(pose.transform_point(p));
        assert!((back - p).length() < 1e-5);
        assert!((pose * pose.inverse()).approx_eq(&Pose::IDENTITY, 1e-2, 1e-5));
    }

    #[test]
    fn test_camera_center_maps_to_origin() {
        let pose = sample_pose();
        assert!(pose.transform_point(pose.camera_center()).length() < 1e-5);
    }

    #[test]
    fn test_from_camera_to_world() {
        // Camera sitting at (0, 0, -2) looking down +z
        let pose = Pose::from_camera_to_world(Mat3::IDENTITY, Vec3::new(0.0, 0.0, -2.0));
        assert!((pose.transform_point(Vec3::ZERO) - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6);
        assert!((pose.camera_center() - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-6);
    }

    #[test]
    fn test_mat4_roundtrip() {
        let pose = sample_pose();
        let back = Pose::from_mat4(&pose.to_mat4());
        assert!(pose.approx_eq(&back, 1e-2, 1e-6));
        let p = Vec3::new(-1.0, 0.5, 4.0);
        assert!((pose.to_mat4().transform_point3(p) - pose.transform_point(p)).length() < 1e-5);
    }

    #[test]
    fn test_composition_order() {
        let a = Pose::from_translation(Vec3::X);
        let b = Pose::from_rt(Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2), Vec3::ZERO);
        // b first: X -> Y, then a: Y + X
        let p = (a * b).transform_point(Vec3::X);
        assert!((p - Vec3::new(1.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_apply_twist_small_translation() {
        let moved = Pose::IDENTITY.apply_twist(&[0.0, 0.0, 0.0, 0.01, 0.0, -0.02]);
        assert!((moved.t - Vec3::new(0.01, 0.0, -0.02)).length() < 1e-7);
        let (angle, _) = moved.distance(&Pose::IDENTITY);
        assert!(angle < 1e-6);
    }

    #[test]
    fn test_coerce_keeps_rotation_orthonormal() {
        let mut pose = sample_pose();
        pose.r.x_axis *= 1.01;
        pose.coerce();
        let should_be_identity = pose.r * pose.r.transpose();
        assert!(should_be_identity.abs_diff_eq(Mat3::IDENTITY, 1e-5));
    }
}
