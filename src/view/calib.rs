//! RGB-D camera calibration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::types::{Result, Vec2, Vec3};
use crate::math::Pose;

/// Pinhole intrinsics. Camera looks down +z, x right, y down.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub px: f32,
    pub py: f32,
}

impl Intrinsics {
    pub fn new(fx: f32, fy: f32, px: f32, py: f32) -> Self {
        Self { fx, fy, px, py }
    }

    /// Camera-space point to pixel coordinates. Caller checks `p.z > 0`.
    #[inline]
    pub fn project(&self, p: Vec3) -> Vec2 {
        Vec2::new(self.fx * p.x / p.z + self.px, self.fy * p.y / p.z + self.py)
    }

    /// Pixel plus metric depth to camera-space point
    #[inline]
    pub fn unproject(&self, u: f32, v: f32, depth: f32) -> Vec3 {
        Vec3::new(
            (u - self.px) * depth / self.fx,
            (v - self.py) * depth / self.fy,
            depth,
        )
    }

    /// Intrinsics for an image resized by `ratio`
    pub fn scaled(&self, ratio: f32) -> Self {
        Self {
            fx: self.fx * ratio,
            fy: self.fy * ratio,
            px: self.px * ratio,
            py: self.py * ratio,
        }
    }

    /// Intrinsics for pyramid level `level` (each level halves resolution)
    pub fn at_level(&self, level: usize) -> Self {
        self.scaled(1.0 / (1u32 << level) as f32)
    }
}

/// Kinect-style disparity model: `depth = 8 * b * fx / (a - disparity)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisparityCalib {
    pub a: f32,
    pub b: f32,
}

impl Default for DisparityCalib {
    fn default() -> Self {
        Self { a: 1135.09, b: 0.0819 }
    }
}

impl DisparityCalib {
    /// Metric depth for a raw disparity value, 0.0 when undefined
    #[inline]
    pub fn to_depth(&self, disparity: u16, fx_depth: f32) -> f32 {
        let denom = self.a - disparity as f32;
        if denom == 0.0 {
            return 0.0;
        }
        let depth = 8.0 * self.b * fx_depth / denom;
        if depth > 0.0 { depth } else { 0.0 }
    }
}

/// Full RGB-D rig calibration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RgbdCalib {
    pub rgb: Intrinsics,
    pub depth: Intrinsics,
    /// Rigid transform from depth-camera coordinates to rgb-camera coordinates
    pub depth_to_rgb: Pose,
    pub disparity: DisparityCalib,
    /// Meters per raw unit for integer depth images (1 mm by default)
    pub depth_scale: f32,
}

impl Default for RgbdCalib {
    fn default() -> Self {
        Self {
            rgb: Intrinsics::new(532.57, 531.54, 320.0, 240.0),
            depth: Intrinsics::new(573.71, 574.39, 346.47, 249.03),
            depth_to_rgb: Pose::IDENTITY,
            disparity: DisparityCalib::default(),
            depth_scale: 0.001,
        }
    }
}

impl RgbdCalib {
    /// Same intrinsics for both cameras, identity extrinsic
    pub fn aligned(intrinsics: Intrinsics) -> Self {
        Self {
            rgb: intrinsics,
            depth: intrinsics,
            ..Default::default()
        }
    }

    /// Calibration for images resized by `ratio`
    pub fn resized(&self, ratio: f32) -> Self {
        Self {
            rgb: self.rgb.scaled(ratio),
            depth: self.depth.scaled(ratio),
            ..self.clone()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_unproject_roundtrip() {
        let k = Intrinsics::new(500.0, 510.0, 320.0, 240.0);
        let p = k.unproject(100.0, 50.0, 2.5);
        let uv = k.project(p);
        assert!((uv - Vec2::new(100.0, 50.0)).length() < 1e-3);
        assert!((p.z - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_principal_point_on_axis() {
        let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0);
        let p = k.unproject(320.0, 240.0, 1.0);
        assert_eq!(p, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_scaled_halves() {
        let k = Intrinsics::new(500.0, 500.0, 320.0, 240.0).at_level(1);
        assert_eq!(k, Intrinsics::new(250.0, 250.0, 160.0, 120.0));
    }

    #[test]
    fn test_disparity_conversion() {
        let calib = DisparityCalib::default();
        let fx = 573.71;
        let d = calib.to_depth(600, fx);
        let expected = 8.0 * 0.0819 * 573.71 / (1135.09 - 600.0);
        assert!((d - expected).abs() < 1e-4);
        // Beyond the singular point depth would be negative
        assert_eq!(calib.to_depth(1200, fx), 0.0);
    }

    #[test]
    fn test_calib_json_defaults() {
        let calib: RgbdCalib = serde_json::from_str(r#"{ "depth_scale": 0.0002 }"#).unwrap();
        assert_eq!(calib.depth_scale, 0.0002);
        assert_eq!(calib.rgb, RgbdCalib::default().rgb);
    }
}
