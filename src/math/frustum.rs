//! View frustum for block visibility tests

use crate::core::types::Vec3;
use crate::math::{Aabb, Pose};
use crate::view::calib::Intrinsics;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let len = normal.length();
        Self { normal: normal / len, distance: distance / len }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Same plane after the world-to-camera `pose` is undone
    fn to_world(self, pose: &Pose) -> Plane {
        // n.(R p + t) + d = (R^T n).p + (n.t + d)
        Plane {
            normal: pose.r.transpose() * self.normal,
            distance: self.normal.dot(pose.t) + self.distance,
        }
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// World-space frustum of a pinhole camera looking at a `width` x
    /// `height` image, enlarged by `margin_px` on every side.
    pub fn from_intrinsics(
        intrinsics: &Intrinsics,
        width: u32,
        height: u32,
        pose: &Pose,
        near: f32,
        far: f32,
        margin_px: f32,
    ) -> Self {
        let Intrinsics { fx, fy, px, py } = *intrinsics;
        let (w, h, m) = (width as f32, height as f32, margin_px);

        let camera_planes = [
            Plane::new(Vec3::Z, -near),
            Plane::new(-Vec3::Z, far),
            // u >= -m  <=>  fx*x + (px + m)*z >= 0
            Plane::new(Vec3::new(fx, 0.0, px + m), 0.0),
            // u <= w + m
            Plane::new(Vec3::new(-fx, 0.0, w + m - px), 0.0),
            // v >= -m
            Plane::new(Vec3::new(0.0, fy, py + m), 0.0),
            // v <= h + m
            Plane::new(Vec3::new(0.0, -fy, h + m - py), 0.0),
        ];

        Self {
            planes: camera_planes.map(|p| p.to_world(pose)),
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(point) >= 0.0)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // Find the corner most aligned with plane normal (p-vertex)
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            // If p-vertex is outside, AABB is completely outside
            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}
