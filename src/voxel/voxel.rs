//! TSDF voxel

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::types::Vec3;

/// Fixed-point scale of the stored signed distance
pub const SDF_MAX: i16 = i16::MAX;

/// Signed distance in truncation-band units ([-1, 1]) from fixed point
#[inline]
pub fn sdf_to_float(sdf: i16) -> f32 {
    sdf as f32 / SDF_MAX as f32
}

/// Signed distance in truncation-band units to fixed point, clamped
#[inline]
pub fn float_to_sdf(f: f32) -> i16 {
    (f.clamp(-1.0, 1.0) * SDF_MAX as f32).round() as i16
}

/// Single TSDF voxel - exactly 8 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct Voxel {
    /// Signed distance, fixed point over [-1, 1] of the truncation band
    pub sdf: i16,
    /// Number of depth observations fused, capped at the scene's max_w
    pub w_depth: u8,
    /// Number of color observations fused, capped at the scene's max_w
    pub w_color: u8,
    /// RGB color
    pub clr: [u8; 3],
    pub _pad: u8,
}

impl Voxel {
    /// Unseen voxel: far in front of any surface, zero confidence
    pub const EMPTY: Voxel = Voxel {
        sdf: SDF_MAX,
        w_depth: 0,
        w_color: 0,
        clr: [0; 3],
        _pad: 0,
    };

    /// Signed distance in truncation-band units
    #[inline]
    pub fn sdf(&self) -> f32 {
        sdf_to_float(self.sdf)
    }

    /// Color as floats in [0, 255]
    #[inline]
    pub fn color(&self) -> Vec3 {
        Vec3::new(self.clr[0] as f32, self.clr[1] as f32, self.clr[2] as f32)
    }

    /// Check if any depth observation has been fused
    #[inline]
    pub fn is_observed(&self) -> bool {
        self.w_depth > 0
    }

    /// Fuse one depth observation `f` (signed distance over mu, in [-1, 1])
    /// with weight 1.
    ///
    /// Below the ceiling this is a running average. At the ceiling the old
    /// value keeps weight `max_w` and every new sample still contributes
    /// `1 / (max_w + 1)`, so the field keeps adapting.
    #[inline]
    pub fn fuse_depth(&mut self, f: f32, max_w: u8) {
        let old_w = self.w_depth as f32;
        let fused = (self.sdf() * old_w + f.clamp(-1.0, 1.0)) / (old_w + 1.0);
        self.sdf = float_to_sdf(fused);
        self.w_depth = self.w_depth.saturating_add(1).min(max_w);
    }

    /// Fuse one color observation with weight 1, same blending as depth
    #[inline]
    pub fn fuse_color(&mut self, rgb: Vec3, max_w: u8) {
        let old_w = self.w_color as f32;
        let fused = (self.color() * old_w + rgb) / (old_w + 1.0);
        let fused = fused.round().clamp(Vec3::ZERO, Vec3::splat(255.0));
        self.clr = [fused.x as u8, fused.y as u8, fused.z as u8];
        self.w_color = self.w_color.saturating_add(1).min(max_w);
    }
}

impl Default for Voxel {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<Voxel>(), 8);
    }

    #[test]
    fn test_fixed_point_roundtrip() {
        for f in [-1.0, -0.5, 0.0, 0.25, 1.0] {
            assert!((sdf_to_float(float_to_sdf(f)) - f).abs() < 1e-4);
        }
        assert_eq!(float_to_sdf(3.0), SDF_MAX);
        assert_eq!(float_to_sdf(-3.0), -SDF_MAX);
    }

    #[test]
    fn test_first_observation_replaces_empty() {
        let mut v = Voxel::EMPTY;
        assert!(!v.is_observed());
        v.fuse_depth(-0.3, 100);
        assert!((v.sdf() + 0.3).abs() < 1e-4);
        assert_eq!(v.w_depth, 1);
    }

    #[test]
    fn test_running_average() {
        let mut v = Voxel::EMPTY;
        v.fuse_depth(0.2, 100);
        v.fuse_depth(0.4, 100);
        assert!((v.sdf() - 0.3).abs() < 1e-3);
        assert_eq!(v.w_depth, 2);
    }

    #[test]
    fn test_weight_never_exceeds_ceiling() {
        let mut v = Voxel::EMPTY;
        for i in 0..500 {
            v.fuse_depth(if i % 2 == 0 { 0.5 } else { -0.5 }, 7);
            assert!(v.w_depth <= 7);
        }
        assert_eq!(v.w_depth, 7);
    }

    #[test]
    fn test_saturated_voxel_still_adapts() {
        let mut v = Voxel::EMPTY;
        for _ in 0..10 {
            v.fuse_depth(1.0, 4);
        }
        let before = v.sdf();
        v.fuse_depth(-1.0, 4);
        let after = v.sdf();
        // 4 old + 1 new: (4 * 1 - 1) / 5
        assert!((after - 0.6).abs() < 1e-3);
        assert!(after < before);
        assert_eq!(v.w_depth, 4);
    }

    #[test]
    fn test_color_blend() {
        let mut v = Voxel::EMPTY;
        v.fuse_color(Vec3::new(200.0, 0.0, 100.0), 100);
        v.fuse_color(Vec3::new(100.0, 50.0, 100.0), 100);
        assert_eq!(v.clr, [150, 25, 100]);
        assert_eq!(v.w_color, 2);
    }
}
