//! Ray type and operations

use crate::core::types::Vec3;
use crate::math::{Aabb, Pose};
use crate::view::calib::Intrinsics;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    /// Precomputed 1/direction for fast AABB intersection
    pub inv_direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// World-space ray through the center of pixel (u, v).
    ///
    /// Also returns the metric length along the ray per meter of camera
    /// depth, so that a depth range maps to `t = z * scale`.
    pub fn through_pixel(intrinsics: &Intrinsics, pose: &Pose, u: f32, v: f32) -> (Ray, f32) {
        let dir_cam = intrinsics.unproject(u, v, 1.0);
        let scale = dir_cam.length();
        let camera_to_world = pose.inverse();
        let ray = Ray::new(
            camera_to_world.t,
            camera_to_world.transform_vector(dir_cam / scale),
        );
        (ray, scale)
    }

    /// Get point along ray at parameter t
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray-AABB intersection using slab method
    /// Returns Some((t_near, t_far)) if intersection, None otherwise
    pub fn intersects_aabb(&self, aabb: &Aabb) -> Option<(f32, f32)> {
        let t1 = (aabb.min - self.origin) * self.inv_direction;
        let t2 = (aabb.max - self.origin) * self.inv_direction;

        let t_near = t1.min(t2).max_element();
        let t_far = t1.max(t2).min_element();

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.at(5.0), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_intersects_aabb_hit() {
        let ray = Ray::new(Vec3::new(-2.0, 0.5, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert!((t_near - 2.0).abs() < 0.001);
        assert!((t_far - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_intersects_aabb_miss() {
        let ray = Ray::new(Vec3::new(-2.0, 5.0, 0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(ray.intersects_aabb(&aabb).is_none());
    }

    #[test]
    fn test_exit_from_inside() {
        let ray = Ray::new(Vec3::splat(0.5), Vec3::X);
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (t_near, t_far) = ray.intersects_aabb(&aabb).unwrap();
        assert_eq!(t_near, 0.0);
        assert!((t_far - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_through_pixel_depth_scale() {
        let k = Intrinsics::new(100.0, 100.0, 50.0, 50.0);
        let (ray, scale) = Ray::through_pixel(&k, &Pose::IDENTITY, 150.0, 50.0);
        // Pixel 100 px right of center at f=100 is 45 degrees off axis
        assert!((scale - 2f32.sqrt()).abs() < 1e-5);
        let p = ray.at(2.0 * scale);
        assert!((p.z - 2.0).abs() < 1e-5);
        assert!((p.x - 2.0).abs() < 1e-5);
    }
}
